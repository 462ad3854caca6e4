//! Node orchestration: wires the ledger, the peer service and the miner loop.

use crate::blockchain::Blockchain;
use crate::config::Config;
use crate::crypto::KeyPair;
use crate::error::ChainError;
use crate::network::NodeService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Ready,
}

pub struct Node {
    pub config: Config,
    pub keys: KeyPair,
    pub blockchain: Arc<RwLock<Blockchain>>,
    pub service: Arc<NodeService>,
    pub state: Arc<RwLock<NodeState>>,
}

impl Node {
    pub fn init(config: Config) -> Result<Self, ChainError> {
        let keys = match &config.keys.secret_key_hex {
            Some(hex_str) => KeyPair::from_secret_hex(hex_str)?,
            None => KeyPair::generate()?,
        };
        info!(address = %keys.address(), "node identity loaded");

        let blockchain = Blockchain::with_params(
            &config.ledger.genesis_address,
            config.ledger.initial_difficulty,
            config.ledger.block_time_ms,
            config.ledger.reward,
        )?;

        let service = Arc::new(NodeService::new(config.network.self_address.clone()));

        Ok(Self {
            config,
            keys,
            blockchain: Arc::new(RwLock::new(blockchain)),
            service,
            state: Arc::new(RwLock::new(NodeState::Booting)),
        })
    }

    pub async fn start(self: Arc<Self>) -> Result<(), ChainError> {
        let port = self.service.listen(self.config.network.p2p_port).await?;
        info!(port, "listening for peers");

        for peer in &self.config.network.bootstrap_peers {
            self.service.spawn_connect(peer.clone());
        }

        *self.state.write().await = NodeState::Ready;

        if self.config.miner.enabled {
            self.spawn_miner_loop();
        }

        // Node main loop - health logging
        loop {
            let height = self.blockchain.read().await.blocks.len();
            let peers = self.service.table().peer_count().await;
            info!(height, peers, "node running");
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    /// Periodically drains the pending list into a mined block. The
    /// proof-of-work search is unbounded, so it runs on a dedicated blocking
    /// thread; the chain lock is held for the duration, serializing chain
    /// mutation on a single owner.
    fn spawn_miner_loop(self: &Arc<Self>) {
        let blockchain = self.blockchain.clone();
        let reward_address = self
            .config
            .miner
            .reward_address
            .clone()
            .unwrap_or_else(|| self.keys.address());
        let interval = self.config.miner.interval_secs;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(interval)).await;

                if blockchain.read().await.pending.is_empty() {
                    continue;
                }

                let chain = blockchain.clone();
                let beneficiary = reward_address.clone();
                let mined = tokio::task::spawn_blocking(move || {
                    let mut chain = chain.blocking_write();
                    chain
                        .mine_pending(&beneficiary)
                        .map(|block| (block.hash.clone(), block.nonce))
                })
                .await;

                match mined {
                    Ok(Ok((hash, nonce))) => info!(%hash, nonce, "sealed block from miner loop"),
                    Ok(Err(e)) => warn!("mining failed: {}", e),
                    Err(e) => error!("mining task aborted: {}", e),
                }
            }
        });
    }
}
