//! The pending-transaction pool. Validates signatures but deliberately
//! does not consult the UTXO set — chain-level validation is the only
//! place double-spends are actually caught.

use std::collections::HashMap;
use std::sync::Mutex;

use log::warn;

use crate::transaction::Transaction;

const DEFAULT_MAX_SIZE: usize = 1000;
const DEFAULT_GET_LIMIT: usize = 50;

pub struct Mempool {
    max_size: usize,
    pending: Mutex<HashMap<String, Transaction>>,
}

impl Mempool {
    pub fn new(max_size: usize) -> Self {
        Mempool { max_size, pending: Mutex::new(HashMap::new()) }
    }

    /// Admits `tx` if it passes basic structural and signature checks and
    /// there is room. Returns `false` (and logs why) on any rejection.
    pub fn add(&self, tx: Transaction) -> bool {
        let mut pending = self.pending.lock().unwrap();

        if pending.contains_key(&tx.transaction_id) {
            warn!("mempool: transaction {} already present", tx.transaction_id);
            return false;
        }
        if pending.len() >= self.max_size {
            warn!("mempool: at capacity ({}), rejecting {}", self.max_size, tx.transaction_id);
            return false;
        }
        if tx.is_coinbase() {
            warn!("mempool: rejecting coinbase transaction {}", tx.transaction_id);
            return false;
        }
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            warn!("mempool: rejecting empty-sided transaction {}", tx.transaction_id);
            return false;
        }

        let data_to_sign = tx.get_data_to_sign();
        for input in &tx.inputs {
            let Some((signature, public_key)) = input.unlock_script.as_signature() else {
                warn!("mempool: malformed unlock script on {}", tx.transaction_id);
                return false;
            };
            if !crate::crypto::verify(public_key, &data_to_sign, signature) {
                warn!("mempool: bad signature on {}", tx.transaction_id);
                return false;
            }
        }

        pending.insert(tx.transaction_id.clone(), tx);
        true
    }

    pub fn get(&self, limit: usize) -> Vec<Transaction> {
        let pending = self.pending.lock().unwrap();
        pending.values().take(limit).cloned().collect()
    }

    pub fn get_default(&self) -> Vec<Transaction> {
        self.get(DEFAULT_GET_LIMIT)
    }

    pub fn remove(&self, ids: &[String]) {
        let mut pending = self.pending.lock().unwrap();
        for id in ids {
            pending.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Mempool::new(DEFAULT_MAX_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{generate_keypair, sign};
    use crate::transaction::{Transaction, TransactionInput, TransactionOutput, UnlockScript};

    fn signed_tx(priv_hex: &str, pub_hex: &str, prev_tx: &str) -> Transaction {
        let input = TransactionInput {
            transaction_id: prev_tx.to_string(),
            output_index: 0,
            unlock_script: UnlockScript::empty(),
        };
        let unsigned = Transaction::new(vec![input], vec![TransactionOutput::new(1.0, "dst".into())]);
        let data = unsigned.get_data_to_sign();
        let sig = sign(priv_hex, &data).unwrap();
        let mut tx = unsigned;
        tx.inputs[0].unlock_script = UnlockScript::Signature { signature: sig, public_key: pub_hex.to_string() };
        tx
    }

    #[test]
    fn add_accepts_valid_signed_transaction() {
        let (priv_hex, pub_hex) = generate_keypair();
        let tx = signed_tx(&priv_hex, &pub_hex, &"a".repeat(64));
        let pool = Mempool::new(10);
        assert!(pool.add(tx));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn add_rejects_coinbase() {
        let pool = Mempool::new(10);
        let tx = Transaction::new(
            vec![TransactionInput::coinbase("x".into())],
            vec![TransactionOutput::new(50.0, "addr".into())],
        );
        assert!(!pool.add(tx));
    }

    #[test]
    fn add_rejects_bad_signature_without_changing_txid() {
        let (priv_hex, pub_hex) = generate_keypair();
        let mut tx = signed_tx(&priv_hex, &pub_hex, &"a".repeat(64));
        let original_id = tx.transaction_id.clone();
        tx.inputs[0].unlock_script = UnlockScript::Signature {
            signature: "00".repeat(64),
            public_key: pub_hex,
        };
        let pool = Mempool::new(10);
        assert!(!pool.add(tx.clone()));
        assert_eq!(tx.transaction_id, original_id);
    }

    #[test]
    fn add_rejects_duplicate_and_respects_capacity() {
        let (priv_hex, pub_hex) = generate_keypair();
        let pool = Mempool::new(1);
        let tx1 = signed_tx(&priv_hex, &pub_hex, &"a".repeat(64));
        assert!(pool.add(tx1.clone()));
        assert!(!pool.add(tx1));

        let tx2 = signed_tx(&priv_hex, &pub_hex, &"b".repeat(64));
        assert!(!pool.add(tx2));
    }
}
