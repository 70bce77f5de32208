//! Proof-of-Work: nonce search and header validation against a simple
//! leading-zero-hex-digit difficulty target. No dynamic retargeting.

use crate::block::{header_hash, Block};

#[derive(Debug, Clone)]
pub struct Consensus {
    pub difficulty: u32,
}

impl Consensus {
    pub fn new(difficulty: u32) -> Self {
        assert!(difficulty >= 1, "difficulty must be at least 1");
        Consensus { difficulty }
    }

    fn target_prefix(&self) -> String {
        "0".repeat(self.difficulty as usize)
    }

    /// Searches nonces from 0 upward until the header hash meets the
    /// target prefix, returning the winning nonce.
    pub fn prove(&self, index: u64, timestamp: f64, previous_hash: &str, merkle_root: &str) -> u64 {
        let prefix = self.target_prefix();
        let mut nonce: u64 = 0;
        loop {
            let hash = header_hash(index, timestamp, previous_hash, merkle_root, nonce);
            if hash.starts_with(&prefix) {
                return nonce;
            }
            nonce += 1;
        }
    }

    /// Recomputes the header hash and checks both equality to the stored
    /// hash and the difficulty prefix.
    pub fn validate_header(&self, block: &Block) -> bool {
        let recomputed = block.recompute_hash();
        recomputed == block.hash && recomputed.starts_with(&self.target_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prove_finds_a_nonce_meeting_the_target() {
        let consensus = Consensus::new(1);
        let nonce = consensus.prove(0, 1.0, &"0".repeat(64), "root");
        let hash = header_hash(0, 1.0, &"0".repeat(64), "root", nonce);
        assert!(hash.starts_with('0'));
    }

    #[test]
    fn validate_header_rejects_tampered_nonce() {
        let consensus = Consensus::new(1);
        let nonce = consensus.prove(0, 1.0, &"0".repeat(64), "root");
        let hash = header_hash(0, 1.0, &"0".repeat(64), "root", nonce);
        let block = Block::new(0, 1.0, "0".repeat(64), nonce, vec![], Some("root".into()), Some(hash));
        assert!(consensus.validate_header(&block));

        let mut tampered = block.clone();
        tampered.nonce ^= 1;
        assert!(!consensus.validate_header(&tampered));
    }
}
