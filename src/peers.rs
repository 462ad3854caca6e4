//! Peer connection table
//!
//! Tracks the node's view of the mesh: `opened` holds a live handle per
//! outbound connection, `connected` the set of known peer addresses used for
//! dedup and handshake payloads. Handshake completion happens asynchronously
//! relative to the dial, so [`PeerTable::register`] re-checks membership
//! immediately before inserting; concurrent handshakes for the same address
//! collapse to a single entry.

use crate::network::WireMessage;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, RwLock};

/// Outbound side of one peer connection. Messages are queued on a channel
/// drained by the connection's writer task, so table operations never block
/// on socket I/O.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    pub address: String,
    sender: mpsc::UnboundedSender<WireMessage>,
}

impl PeerHandle {
    pub fn new(address: String, sender: mpsc::UnboundedSender<WireMessage>) -> Self {
        Self { address, sender }
    }

    /// Queue a message for delivery. Returns false when the writer task has
    /// already shut down.
    pub fn send(&self, message: &WireMessage) -> bool {
        self.sender.send(message.clone()).is_ok()
    }
}

pub struct PeerTable {
    self_address: String,
    opened: RwLock<HashMap<String, PeerHandle>>,
    connected: RwLock<HashSet<String>>,
}

impl PeerTable {
    pub fn new(self_address: String) -> Self {
        Self {
            self_address,
            opened: RwLock::new(HashMap::new()),
            connected: RwLock::new(HashSet::new()),
        }
    }

    pub fn self_address(&self) -> &str {
        &self.self_address
    }

    /// Whether a dial to `address` should be attempted at all: never to
    /// ourselves, never to an address we already know.
    pub async fn should_dial(&self, address: &str) -> bool {
        address != self.self_address && !self.connected.read().await.contains(address)
    }

    /// Insert a completed connection into both sets. Membership is re-checked
    /// here because another handshake for the same address may have finished
    /// between the dial check and now. Returns true when the address was new.
    pub async fn register(&self, handle: PeerHandle) -> bool {
        if handle.address == self.self_address {
            return false;
        }

        let mut opened = self.opened.write().await;
        let mut connected = self.connected.write().await;

        let address = handle.address.clone();
        let fresh = connected.insert(address.clone());
        opened.entry(address).or_insert(handle);
        fresh
    }

    /// Disconnect cleanup: drop the address from both sets. Local only; the
    /// departure is not propagated to other peers.
    pub async fn remove(&self, address: &str) {
        self.opened.write().await.remove(address);
        self.connected.write().await.remove(address);
    }

    /// Queue `message` on every open connection.
    pub async fn broadcast(&self, message: &WireMessage) {
        for handle in self.opened.read().await.values() {
            handle.send(message);
        }
    }

    /// Snapshot of all known peer addresses.
    pub async fn peers(&self) -> Vec<String> {
        self.connected.read().await.iter().cloned().collect()
    }

    pub async fn peer_count(&self) -> usize {
        self.connected.read().await.len()
    }
}
