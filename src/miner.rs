//! Candidate block assembly and Proof-of-Work search.
//!
//! A `Miner` never mutates shared state: it works from a snapshot handed
//! to it, and returns a finished block for the node to attempt to commit.
//! Whether that commit succeeds (the chain may have moved on meanwhile) is
//! entirely the node's concern.

use log::debug;

use crate::block::Block;
use crate::chain::{apply_transaction, round8, validate_transaction};
use crate::consensus::Consensus;
use crate::mempool::Mempool;
use crate::transaction::{Transaction, TransactionInput, TransactionOutput};
use crate::utxo::UtxoSet;

pub const BLOCK_REWARD: f64 = 50.0;
const CANDIDATE_LIMIT: usize = 50;

pub struct Miner {
    pub reward_address: String,
}

impl Miner {
    pub fn new(reward_address: String) -> Self {
        Miner { reward_address }
    }

    /// Builds and mines a candidate block extending `prev`, drawing
    /// candidate transactions from `mempool` and validating each against
    /// a local copy of `utxo_snapshot`.
    pub fn mine_block(
        &self,
        mempool: &Mempool,
        utxo_snapshot: &UtxoSet,
        prev: &Block,
        consensus: &Consensus,
        timestamp: f64,
    ) -> Block {
        let mut working = utxo_snapshot.snapshot();
        let next_index = prev.index + 1;

        let mut admitted = Vec::new();
        let mut total_fees = 0.0f64;
        for tx in mempool.get(CANDIDATE_LIMIT) {
            match validate_transaction(&tx, &working) {
                Ok(fee) => {
                    apply_transaction(&tx, &mut working);
                    total_fees += fee;
                    admitted.push(tx);
                }
                Err(e) => {
                    debug!("miner: dropping candidate {}: {}", tx.transaction_id, e);
                }
            }
        }

        let coinbase = Transaction::new(
            vec![TransactionInput::coinbase(format!("Block {} reward", next_index))],
            vec![TransactionOutput::new(round8(BLOCK_REWARD + total_fees), self.reward_address.clone())],
        );

        let mut candidates = Vec::with_capacity(admitted.len() + 1);
        candidates.push(coinbase);
        candidates.extend(admitted);

        let ids: Vec<String> = candidates.iter().map(|t| t.transaction_id.clone()).collect();
        let merkle_root = crate::crypto::merkle_root(&ids);
        let nonce = consensus.prove(next_index, timestamp, &prev.hash, &merkle_root);

        Block::new(next_index, timestamp, prev.hash.clone(), nonce, candidates, Some(merkle_root), None)
    }
}
