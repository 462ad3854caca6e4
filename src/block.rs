//! Block structure and proof-of-work mining

use crate::blockchain::Blockchain;
use crate::crypto;
use crate::transaction::Transaction;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Current wall-clock time in milliseconds, the chain's timestamp unit.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// An ordered batch of transactions chained to its predecessor by hash.
/// `prev_hash` is empty only for the genesis block. The stored `hash` is
/// recomputed after every mutation, so `hash == compute_hash()` holds for any
/// sealed block.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub prev_hash: String,
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    pub fn new(timestamp: u64, transactions: Vec<Transaction>) -> Self {
        let mut block = Block {
            timestamp,
            transactions,
            prev_hash: String::new(),
            hash: String::new(),
            nonce: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Hex-encoded SHA-256 over the canonical encoding of the block: previous
    /// hash, timestamp, transactions in insertion order, nonce.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        for tx in &self.transactions {
            hasher.update(tx.canonical_bytes());
        }
        hasher.update(self.nonce.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    /// Searches nonces upward until the hash has `difficulty` leading zero hex
    /// digits. Starting from nonce 0 this finds the minimal satisfying nonce.
    /// CPU-bound and unbounded: the search runs until it succeeds, so callers
    /// must isolate it from the event loop.
    pub fn mine(&mut self, difficulty: u32) {
        let target = "0".repeat(difficulty as usize);
        while !self.hash.starts_with(&target) {
            self.nonce += 1;
            self.hash = self.compute_hash();
        }
        debug!(nonce = self.nonce, hash = %self.hash, "sealed block");
    }

    /// Whether the hash satisfies the given difficulty target.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.hash.starts_with(&"0".repeat(difficulty as usize))
    }

    /// Block-level transaction rules: exactly one mint-origin transaction, its
    /// amount minus the gas collected from the others must equal the chain's
    /// configured reward, and every transaction must validate individually.
    pub fn has_valid_transactions(&self, chain: &Blockchain) -> bool {
        let mint = crypto::mint_address();
        let mut gas: u64 = 0;
        let mut reward: u64 = 0;
        let mut mint_count = 0usize;

        for tx in &self.transactions {
            if tx.from == mint {
                reward = tx.amount;
                mint_count += 1;
            } else {
                gas = gas.saturating_add(tx.gas);
            }
        }

        mint_count == 1
            && (reward as i128 - gas as i128) == chain.reward as i128
            && self
                .transactions
                .iter()
                .all(|tx| tx.validate(chain).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_hash_covers_every_field() {
        let block = Block::new(1_700_000_000_000, vec![]);
        assert_eq!(block.hash, block.compute_hash());

        let mut tampered = block.clone();
        tampered.timestamp += 1;
        assert_ne!(tampered.compute_hash(), block.hash);

        let mut tampered = block.clone();
        tampered.prev_hash = "ff".to_string();
        assert_ne!(tampered.compute_hash(), block.hash);

        let mut tampered = block.clone();
        tampered.nonce += 1;
        assert_ne!(tampered.compute_hash(), block.hash);
    }

    #[test]
    fn test_hash_depends_on_transaction_order() {
        let a = KeyPair::generate().unwrap();
        let b = KeyPair::generate().unwrap();
        let tx1 = Transaction::new(a.address(), b.address(), 1, 0);
        let tx2 = Transaction::new(b.address(), a.address(), 2, 0);

        let forward = Block::new(1_700_000_000_000, vec![tx1.clone(), tx2.clone()]);
        let reversed = Block::new(1_700_000_000_000, vec![tx2, tx1]);
        assert_ne!(forward.hash, reversed.hash);
    }

    #[test]
    fn test_mine_finds_minimal_nonce() {
        let mut block = Block::new(1_700_000_000_000, vec![]);
        block.mine(1);

        assert!(block.meets_difficulty(1));
        assert_eq!(block.hash, block.compute_hash());

        // No smaller nonce satisfies the target: the scan started at zero.
        let mined_nonce = block.nonce;
        for nonce in 0..mined_nonce {
            let mut probe = block.clone();
            probe.nonce = nonce;
            probe.hash = probe.compute_hash();
            assert!(!probe.meets_difficulty(1));
        }
    }

    #[test]
    fn test_mining_is_deterministic() {
        let mut first = Block::new(1_700_000_000_000, vec![]);
        let mut second = Block::new(1_700_000_000_000, vec![]);
        first.mine(1);
        second.mine(1);

        assert_eq!(first.nonce, second.nonce);
        assert_eq!(first.hash, second.hash);
    }
}
