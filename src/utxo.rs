//! The unspent-transaction-output set.

use std::collections::HashMap;

use log::warn;

use crate::block::Block;
use crate::transaction::TransactionOutput;

pub type UtxoKey = (String, i64);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UtxoSet {
    utxos: HashMap<UtxoKey, TransactionOutput>,
}

impl UtxoSet {
    pub fn new() -> Self {
        UtxoSet::default()
    }

    pub fn add(&mut self, tx_id: String, index: i64, output: TransactionOutput) {
        if self.utxos.contains_key(&(tx_id.clone(), index)) {
            warn!("overwriting existing utxo {}:{}", tx_id, index);
        }
        self.utxos.insert((tx_id, index), output);
    }

    pub fn remove(&mut self, tx_id: &str, index: i64) -> Option<TransactionOutput> {
        self.utxos.remove(&(tx_id.to_string(), index))
    }

    pub fn get(&self, tx_id: &str, index: i64) -> Option<&TransactionOutput> {
        self.utxos.get(&(tx_id.to_string(), index))
    }

    pub fn find_for_address(&self, address: &str) -> HashMap<UtxoKey, TransactionOutput> {
        self.utxos
            .iter()
            .filter(|(_, out)| out.lock_script == address)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn get_balance(&self, address: &str) -> f64 {
        self.utxos.values().filter(|o| o.lock_script == address).map(|o| o.amount).sum()
    }

    /// Applies a committed block's effects: non-coinbase transactions
    /// remove their inputs then add their outputs; coinbase only adds.
    /// Transactions are processed in block order.
    pub fn update_from_block(&mut self, block: &Block) {
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    self.remove(&input.transaction_id, input.output_index);
                }
            }
            for (idx, output) in tx.outputs.iter().enumerate() {
                self.add(tx.transaction_id.clone(), idx as i64, output.clone());
            }
        }
    }

    /// Clears the set and replays every block from genesis.
    pub fn rebuild(&mut self, blocks: &[Block]) {
        self.utxos.clear();
        for block in blocks {
            self.update_from_block(block);
        }
    }

    /// A fully independent copy; mutating it never affects `self`.
    pub fn snapshot(&self) -> UtxoSet {
        self.clone()
    }

    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Transaction, TransactionInput, TransactionOutput, UnlockScript};

    fn output(amount: f64, addr: &str) -> TransactionOutput {
        TransactionOutput::new(amount, addr.to_string())
    }

    #[test]
    fn add_remove_get_roundtrip() {
        let mut set = UtxoSet::new();
        set.add("tx1".into(), 0, output(5.0, "addr"));
        assert_eq!(set.get("tx1", 0), Some(&output(5.0, "addr")));
        let removed = set.remove("tx1", 0);
        assert_eq!(removed, Some(output(5.0, "addr")));
        assert_eq!(set.get("tx1", 0), None);
    }

    #[test]
    fn update_from_block_applies_coinbase_then_spend_in_order() {
        let mut set = UtxoSet::new();
        let coinbase = Transaction::new(
            vec![TransactionInput::coinbase("Block 1 reward".into())],
            vec![output(50.0, "miner")],
        );
        let spend = Transaction::new(
            vec![TransactionInput {
                transaction_id: coinbase.transaction_id.clone(),
                output_index: 0,
                unlock_script: UnlockScript::empty(),
            }],
            vec![output(10.0, "bob"), output(39.0, "miner")],
        );
        let block = Block::new(1, 1.0, "0".repeat(64), 0, vec![coinbase.clone(), spend.clone()], None, None);
        set.update_from_block(&block);

        assert_eq!(set.get(&coinbase.transaction_id, 0), None);
        assert_eq!(set.get_balance("bob"), 10.0);
        assert_eq!(set.get_balance("miner"), 39.0);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut set = UtxoSet::new();
        set.add("tx1".into(), 0, output(5.0, "addr"));
        let mut snap = set.snapshot();
        snap.remove("tx1", 0);
        assert_eq!(set.get("tx1", 0), Some(&output(5.0, "addr")));
        assert_eq!(snap.get("tx1", 0), None);
    }

    #[test]
    fn rebuild_equals_incremental() {
        let mut incremental = UtxoSet::new();
        let coinbase = Transaction::new(
            vec![TransactionInput::coinbase("Block 1 reward".into())],
            vec![output(50.0, "miner")],
        );
        let block = Block::new(0, 1.0, "0".repeat(64), 0, vec![coinbase], None, None);
        incremental.update_from_block(&block);

        let mut rebuilt = UtxoSet::new();
        rebuilt.rebuild(std::slice::from_ref(&block));

        assert_eq!(incremental.get_balance("miner"), rebuilt.get_balance("miner"));
        assert_eq!(incremental.len(), rebuilt.len());
    }
}
