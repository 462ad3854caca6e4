//! Chain state: the authoritative block sequence, the pending transaction
//! list, difficulty retargeting and balance accounting.

use crate::block::{now_ms, Block};
use crate::crypto;
use crate::error::ChainError;
use crate::transaction::Transaction;
use tracing::info;

/// Coins issued to the genesis recipient.
pub const GENESIS_ISSUANCE: u64 = 100_000;
/// Coins minted per block, before collected gas.
pub const DEFAULT_REWARD: u64 = 297;
/// Target interval between blocks, in milliseconds.
pub const DEFAULT_BLOCK_TIME_MS: u64 = 30_000;
/// Fixed genesis timestamp so every node derives the same genesis hash.
const GENESIS_TIMESTAMP: u64 = 1_672_531_200_000;

pub struct Blockchain {
    pub blocks: Vec<Block>,
    pub difficulty: u32,
    pub block_time_ms: u64,
    pub pending: Vec<Transaction>,
    pub reward: u64,
}

impl Blockchain {
    /// Create a new chain with default parameters. The genesis block issues
    /// [`GENESIS_ISSUANCE`] coins from the mint identity to `genesis_address`.
    pub fn new(genesis_address: &str) -> Result<Self, ChainError> {
        Self::with_params(genesis_address, 1, DEFAULT_BLOCK_TIME_MS, DEFAULT_REWARD)
    }

    pub fn with_params(
        genesis_address: &str,
        initial_difficulty: u32,
        block_time_ms: u64,
        reward: u64,
    ) -> Result<Self, ChainError> {
        let mut issuance = Transaction::new(
            crypto::mint_address(),
            genesis_address.to_string(),
            GENESIS_ISSUANCE,
            0,
        );
        issuance.sign(crypto::mint_keypair())?;

        let genesis = Block::new(GENESIS_TIMESTAMP, vec![issuance]);

        Ok(Blockchain {
            blocks: vec![genesis],
            difficulty: initial_difficulty.max(1),
            block_time_ms,
            pending: Vec::new(),
            reward,
        })
    }

    /// The chain tip. O(1); the chain is never empty after construction.
    pub fn last_block(&self) -> &Block {
        self.blocks
            .last()
            .expect("chain contains at least the genesis block")
    }

    /// Links `block` to the tip, mines it at the current difficulty, appends
    /// it and retargets: +1 when the block was produced faster than the
    /// target interval, otherwise -1, floored at 1.
    pub fn add_block(&mut self, mut block: Block) {
        block.prev_hash = self.last_block().hash.clone();
        block.hash = block.compute_hash();
        block.mine(self.difficulty);
        self.blocks.push(block);

        let elapsed = now_ms().saturating_sub(self.last_block().timestamp);
        if elapsed < self.block_time_ms {
            self.difficulty += 1;
        } else {
            self.difficulty = self.difficulty.saturating_sub(1).max(1);
        }
    }

    /// Queues a transaction after validating it against current balances.
    /// Invalid transactions are rejected and never enter `pending`.
    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        tx.validate(self)?;
        self.pending.push(tx);
        Ok(())
    }

    /// Drains the pending list into a new block headed by a single mint-origin
    /// reward transaction carrying the block reward plus all collected gas,
    /// then mines and appends the block.
    pub fn mine_pending(&mut self, reward_address: &str) -> Result<&Block, ChainError> {
        let gas: u64 = self.pending.iter().map(|tx| tx.gas).sum();

        let mut reward_tx = Transaction::new(
            crypto::mint_address(),
            reward_address.to_string(),
            self.reward + gas,
            0,
        );
        reward_tx.sign(crypto::mint_keypair())?;

        let mut transactions = vec![reward_tx];
        transactions.append(&mut self.pending);

        self.add_block(Block::new(now_ms(), transactions));

        let sealed = self.last_block();
        info!(
            height = self.blocks.len() - 1,
            hash = %sealed.hash,
            transactions = sealed.transactions.len(),
            "mined block"
        );
        Ok(sealed)
    }

    /// The authoritative chain-acceptance check: for every block after
    /// genesis, the stored hash must match its recomputation, the previous
    /// hash must link to the predecessor, and the block's transaction rules
    /// must hold. Short-circuits on the first failure.
    pub fn is_valid(&self) -> bool {
        for i in 1..self.blocks.len() {
            let current = &self.blocks[i];
            let previous = &self.blocks[i - 1];

            if current.hash != current.compute_hash()
                || current.prev_hash != previous.hash
                || !current.has_valid_transactions(self)
            {
                return false;
            }
        }
        true
    }

    /// Chain-derived balance: a full scan subtracting `amount + gas` where
    /// `address` is the sender and adding `amount` where it is the recipient.
    /// The mint identity's balance goes negative as coins are issued.
    pub fn balance_of(&self, address: &str) -> i64 {
        let mut balance: i64 = 0;
        for block in &self.blocks {
            for tx in &block.transactions {
                if tx.from == address {
                    balance -= tx.amount as i64;
                    balance -= tx.gas as i64;
                }
                if tx.to == address {
                    balance += tx.amount as i64;
                }
            }
        }
        balance
    }

    /// Adopts `candidate` iff it is strictly longer than the local chain and
    /// passes [`Blockchain::is_valid`]. This is the hook a chain-exchange
    /// layer must call; no such layer is built here.
    pub fn try_replace_chain(&mut self, candidate: Vec<Block>) -> Result<(), ChainError> {
        if candidate.len() <= self.blocks.len() {
            return Err(ChainError::InvalidBlock(
                "Candidate chain is not longer than the local chain".to_string(),
            ));
        }

        let probe = Blockchain {
            blocks: candidate,
            difficulty: self.difficulty,
            block_time_ms: self.block_time_ms,
            pending: Vec::new(),
            reward: self.reward,
        };
        if !probe.is_valid() {
            return Err(ChainError::InvalidBlock(
                "Candidate chain failed validation".to_string(),
            ));
        }

        info!(height = probe.blocks.len() - 1, "adopted longer valid chain");
        self.blocks = probe.blocks;
        Ok(())
    }
}
