//! Block header and transaction list.

use serde::{Deserialize, Serialize};

use crate::crypto::{merkle_root, sha256_hex};
use crate::transaction::Transaction;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Block {
    pub index: u64,
    pub timestamp: f64,
    pub previous_hash: String,
    pub merkle_root: String,
    pub nonce: u64,
    pub hash: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Builds a block, computing `merkle_root`/`hash` from the other
    /// fields when the caller hasn't supplied them (pass empty strings).
    pub fn new(
        index: u64,
        timestamp: f64,
        previous_hash: String,
        nonce: u64,
        transactions: Vec<Transaction>,
        merkle_root_override: Option<String>,
        hash_override: Option<String>,
    ) -> Self {
        let merkle_root = merkle_root_override.unwrap_or_else(|| {
            let ids: Vec<String> = transactions.iter().map(|t| t.transaction_id.clone()).collect();
            merkle_root(&ids)
        });
        let hash = hash_override.unwrap_or_else(|| {
            header_hash(index, timestamp, &previous_hash, &merkle_root, nonce)
        });
        Block { index, timestamp, previous_hash, merkle_root, nonce, hash, transactions }
    }

    pub fn recompute_merkle_root(&self) -> String {
        let ids: Vec<String> = self.transactions.iter().map(|t| t.transaction_id.clone()).collect();
        merkle_root(&ids)
    }

    pub fn recompute_hash(&self) -> String {
        header_hash(self.index, self.timestamp, &self.previous_hash, &self.merkle_root, self.nonce)
    }
}

/// The textual concatenation hashed to produce a block's header hash.
pub fn header_hash(index: u64, timestamp: f64, previous_hash: &str, merkle_root: &str, nonce: u64) -> String {
    let payload = format!("{}{}{}{}{}", index, format_timestamp(timestamp), previous_hash, merkle_root, nonce);
    sha256_hex(payload.as_bytes())
}

/// Matches Python's `str(float)` rendering closely enough to be stable
/// across a node's own hash computations (the value always originates
/// from this crate, never parsed back from another language).
fn format_timestamp(ts: f64) -> String {
    if ts.fract() == 0.0 {
        format!("{:.1}", ts)
    } else {
        format!("{}", ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Transaction, TransactionInput, TransactionOutput};

    fn coinbase_tx() -> Transaction {
        Transaction::new(
            vec![TransactionInput::coinbase("Genesis Block Marker".into())],
            vec![TransactionOutput::new(0.0, "0".repeat(64))],
        )
    }

    #[test]
    fn hash_is_recomputable_from_fields() {
        let block = Block::new(0, 100.0, "0".repeat(64), 0, vec![coinbase_tx()], None, None);
        assert_eq!(block.hash, block.recompute_hash());
    }

    #[test]
    fn merkle_root_is_recomputable_from_transactions() {
        let block = Block::new(0, 100.0, "0".repeat(64), 0, vec![coinbase_tx()], None, None);
        assert_eq!(block.merkle_root, block.recompute_merkle_root());
    }

    #[test]
    fn roundtrips_preserving_stored_hash_and_merkle_root() {
        let block = Block::new(0, 100.0, "0".repeat(64), 0, vec![coinbase_tx()], None, None);
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);
        assert_eq!(back.hash, block.hash);
        assert_eq!(back.merkle_root, block.merkle_root);
    }
}
