//! Owns the chain, UTXO set, mempool, p2p transport, and wallets; dispatches
//! incoming p2p messages and runs the mining worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use rand::Rng;

use crate::chain::Chain;
use crate::config::NodeConfig;
use crate::consensus::Consensus;
use crate::mempool::Mempool;
use crate::miner::Miner;
use crate::net::{Message, MessageType, PeerAddr, Transport};
use crate::transaction::Transaction;
use crate::utxo::UtxoSet;
use crate::wallet::Wallet;

const MINER_BACKOFF_MIN: f64 = 2.0;
const MINER_BACKOFF_MAX: f64 = 5.0;

struct ChainState {
    chain: Chain,
    utxo: UtxoSet,
}

pub struct Node {
    pub config: NodeConfig,
    consensus: Consensus,
    state: Mutex<ChainState>,
    wallets: Mutex<HashMap<String, Wallet>>,
    primary_wallet: Wallet,
    mempool: Arc<Mempool>,
    transport: Arc<Transport>,
    mining_stop: Arc<(Mutex<bool>, Condvar)>,
    miner_thread: Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
}

impl Node {
    pub fn new(config: NodeConfig) -> Arc<Node> {
        let consensus = Consensus::new(config.difficulty);
        let chain = if config.chain_file.exists() {
            Chain::load_from_file(&config.chain_file, &consensus)
        } else {
            Chain::new(&consensus)
        };
        let mut utxo = UtxoSet::new();
        utxo.rebuild(&chain.blocks);

        let primary_wallet = Wallet::generate();
        let mempool = Arc::new(Mempool::default());

        Arc::new_cyclic(|weak: &Weak<Node>| {
            let weak = weak.clone();
            let handler: crate::net::MessageHandler = Arc::new(move |peer, msg| {
                if let Some(node) = weak.upgrade() {
                    node.handle_message(peer, msg);
                }
            });
            let transport = Arc::new(Transport::new(config.host.clone(), config.p2p_port, handler));

            Node {
                config,
                consensus,
                state: Mutex::new(ChainState { chain, utxo }),
                wallets: Mutex::new(HashMap::new()),
                primary_wallet,
                mempool,
                transport,
                mining_stop: Arc::new((Mutex::new(false), Condvar::new())),
                miner_thread: Mutex::new(None),
                initialized: AtomicBool::new(false),
            }
        })
    }

    pub fn primary_address(&self) -> String {
        self.primary_wallet.address.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn start(self: &Arc<Self>) {
        self.transport.start().expect("p2p transport failed to bind");
        thread::sleep(Duration::from_millis(200));
        for (host, port) in &self.config.bootstrap_peers {
            self.transport.connect_to_peer(host, *port);
        }
        self.start_mining();
        self.initialized.store(true, Ordering::SeqCst);
        info!("node: started at {}:{}", self.config.host, self.config.p2p_port);
    }

    pub fn stop(&self) {
        self.stop_mining();
        self.transport.stop();
        let state = self.state.lock().unwrap();
        if let Err(e) = state.chain.save_to_file(&self.config.chain_file) {
            warn!("node: failed to save chain: {}", e);
        }
        info!("node: stopped");
    }

    fn start_mining(self: &Arc<Self>) {
        *self.mining_stop.0.lock().unwrap() = false;
        let this = Arc::clone(self);
        let handle = thread::spawn(move || this.mining_loop());
        *self.miner_thread.lock().unwrap() = Some(handle);
    }

    fn stop_mining(&self) {
        *self.mining_stop.0.lock().unwrap() = true;
        self.mining_stop.1.notify_all();
        if let Some(handle) = self.miner_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn mining_loop(self: Arc<Self>) {
        let miner = Miner::new(self.primary_address());
        loop {
            if *self.mining_stop.0.lock().unwrap() {
                break;
            }

            let (utxo_snapshot, tail) = {
                let state = self.state.lock().unwrap();
                (state.utxo.snapshot(), state.chain.last_block().clone())
            };

            if *self.mining_stop.0.lock().unwrap() {
                break;
            }

            let timestamp = now_secs();
            let block = miner.mine_block(&self.mempool, &utxo_snapshot, &tail, &self.consensus, timestamp);

            let committed = {
                let mut guard = self.state.lock().unwrap();
                let ChainState { chain, utxo } = &mut *guard;
                chain.add_block(block.clone(), utxo, &self.consensus)
            };

            if committed {
                info!("node: mined block {}", block.index);
                let mined_ids: Vec<String> = block.transactions[1..].iter().map(|t| t.transaction_id.clone()).collect();
                self.mempool.remove(&mined_ids);
                let msg = Message::new(MessageType::NewBlock, Some(serde_json::to_value(&block).unwrap()));
                self.transport.broadcast(&msg, None);
            } else {
                let backoff = rand::thread_rng().gen_range(MINER_BACKOFF_MIN..MINER_BACKOFF_MAX);
                let (lock, cvar) = &*self.mining_stop;
                let guard = lock.lock().unwrap();
                let _ = cvar.wait_timeout(guard, Duration::from_secs_f64(backoff)).unwrap();
            }
        }
    }

    pub fn get_balance(&self, address: &str) -> f64 {
        self.state.lock().unwrap().utxo.get_balance(address)
    }

    pub fn get_all_balances(&self) -> HashMap<String, f64> {
        let state = self.state.lock().unwrap();
        let addresses: std::collections::HashSet<String> = state
            .chain
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .flat_map(|t| t.outputs.iter())
            .map(|o| o.lock_script.clone())
            .collect();
        addresses.into_iter().map(|addr| { let bal = state.utxo.get_balance(&addr); (addr, bal) }).collect()
    }

    pub fn create_wallet(&self) -> String {
        let wallet = Wallet::generate();
        let address = wallet.address.clone();
        self.wallets.lock().unwrap().insert(address.clone(), wallet);
        address
    }

    pub fn managed_wallet_addresses(&self) -> Vec<String> {
        self.wallets.lock().unwrap().keys().cloned().collect()
    }

    /// Submits a transaction from a wallet managed by this node (the
    /// primary wallet or one created via `create_wallet`).
    pub fn create_and_submit_transaction(
        &self,
        sender: &str,
        recipient: &str,
        amount: f64,
        fee: f64,
    ) -> Result<Transaction, String> {
        let tx = {
            let state = self.state.lock().unwrap();
            if sender == self.primary_wallet.address {
                self.primary_wallet.create_transaction(recipient, amount, fee, &state.utxo)
            } else {
                let wallets = self.wallets.lock().unwrap();
                let wallet = wallets.get(sender).ok_or_else(|| format!("no wallet managed for address {}", sender))?;
                wallet.create_transaction(recipient, amount, fee, &state.utxo)
            }
            .map_err(|e| e.to_string())?
        };

        if !self.mempool.add(tx.clone()) {
            return Err("transaction rejected by mempool".to_string());
        }
        let msg = Message::new(MessageType::NewTransaction, Some(serde_json::to_value(&tx).unwrap()));
        self.transport.broadcast(&msg, None);
        Ok(tx)
    }

    fn handle_message(&self, from: PeerAddr, msg: Message) {
        match msg.msg_type {
            MessageType::NewTransaction => {
                let Some(payload) = msg.payload else { return };
                let Ok(tx) = serde_json::from_value::<Transaction>(payload) else { return };
                if self.mempool.add(tx.clone()) {
                    let rebroadcast = Message::new(MessageType::NewTransaction, Some(serde_json::to_value(&tx).unwrap()));
                    self.transport.broadcast(&rebroadcast, Some(&from));
                }
            }
            MessageType::NewBlock => {
                let Some(payload) = msg.payload else { return };
                let Ok(block) = serde_json::from_value::<crate::block::Block>(payload) else { return };
                let committed = {
                    let mut state = self.state.lock().unwrap();
                    let state = &mut *state;
                    state.chain.add_block(block.clone(), &mut state.utxo, &self.consensus)
                };
                if committed {
                    let mined_ids: Vec<String> = block.transactions.iter().map(|t| t.transaction_id.clone()).collect();
                    self.mempool.remove(&mined_ids);
                    let rebroadcast = Message::new(MessageType::NewBlock, Some(serde_json::to_value(&block).unwrap()));
                    self.transport.broadcast(&rebroadcast, Some(&from));
                }
            }
            MessageType::GetPeers => {
                let peers = self.transport.get_peer_list();
                self.transport.send(&from, &Message::send_peers(&peers));
            }
            MessageType::SendPeers => {
                let Some(payload) = msg.payload else { return };
                for (host, port) in crate::net::message::parse_peer_list(&payload) {
                    self.transport.connect_to_peer(&host, port);
                }
            }
            MessageType::Ping => {
                self.transport.send(&from, &Message::pong());
            }
            MessageType::Pong | MessageType::GetBlocks | MessageType::SendBlocks | MessageType::Error => {
                // GET_BLOCKS/SEND_BLOCKS are reserved but unimplemented;
                // PONG and ERROR carry no action beyond liveness tracking.
            }
        }
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
