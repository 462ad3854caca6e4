//! WebSocket transport and the handshake flooding protocol
//!
//! Wire messages are JSON objects `{ "type": ..., "data": ... }`. The only
//! type this node understands is [`TYPE_HANDSHAKE`], whose data is an ordered
//! list of peer addresses; unknown types are ignored and a malformed message
//! only costs itself, never the handling loop.

use crate::error::ChainError;
use crate::peers::{PeerHandle, PeerTable};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};
use tracing::{debug, info, warn};

pub const TYPE_HANDSHAKE: &str = "TYPE_HANDSHAKE";

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WireMessage {
    pub fn handshake(addresses: &[String]) -> Self {
        WireMessage {
            kind: TYPE_HANDSHAKE.to_string(),
            data: serde_json::json!(addresses),
        }
    }

    /// The address list carried by a handshake message, if well-formed.
    pub fn peer_list(&self) -> Option<Vec<String>> {
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Accepts inbound connections, dials outbound ones and converges the peer
/// table through handshake flooding.
pub struct NodeService {
    table: PeerTable,
}

impl NodeService {
    pub fn new(self_address: String) -> Self {
        Self {
            table: PeerTable::new(self_address),
        }
    }

    pub fn table(&self) -> &PeerTable {
        &self.table
    }

    /// Bind the listener and start serving. Returns the actual port, which
    /// differs from the requested one when `port` is 0.
    pub async fn listen(self: &Arc<Self>, port: u16) -> Result<u16, ChainError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| ChainError::NetworkError(format!("Failed to bind port {}: {}", port, e)))?;
        let local_port = listener
            .local_addr()
            .map_err(|e| ChainError::NetworkError(e.to_string()))?
            .port();
        self.serve(listener);
        Ok(local_port)
    }

    /// Spawn the accept loop on an already-bound listener.
    pub fn serve(self: &Arc<Self>, listener: TcpListener) {
        let service = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        let service = service.clone();
                        tokio::spawn(async move {
                            match accept_async(stream).await {
                                Ok(socket) => service.run_inbound(socket, remote).await,
                                Err(e) => debug!(%remote, "websocket upgrade failed: {}", e),
                            }
                        });
                    }
                    Err(e) => warn!("accept failed: {}", e),
                }
            }
        });
    }

    /// Read loop for a connection a peer opened towards us. Inbound sockets
    /// carry messages only; the table tracks the connections we dial.
    async fn run_inbound(self: Arc<Self>, socket: WebSocketStream<TcpStream>, remote: SocketAddr) {
        debug!(%remote, "inbound connection");
        let (_write, mut read) = socket.split();
        while let Some(frame) = read.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => self.handle_raw(&text).await,
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
        debug!(%remote, "inbound connection closed");
    }

    /// Dispatch one raw frame. Parse failures and unknown types are dropped
    /// per message.
    async fn handle_raw(self: &Arc<Self>, text: &str) {
        let message: WireMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping malformed message: {}", e);
                return;
            }
        };

        match message.kind.as_str() {
            TYPE_HANDSHAKE => {
                let Some(addresses) = message.peer_list() else {
                    warn!("dropping handshake with malformed address list");
                    return;
                };
                for address in addresses {
                    self.spawn_connect(address);
                }
            }
            other => debug!(kind = other, "ignoring message of unknown type"),
        }
    }

    /// Fire-and-forget dial; failures are logged and otherwise local.
    pub fn spawn_connect(self: &Arc<Self>, address: String) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.connect(&address).await {
                debug!(peer = %address, "dial failed: {}", e);
            }
        });
    }

    /// Open a connection to `address` and run the handshake: greet the peer
    /// with our own address plus everyone we know, tell every open peer about
    /// the newcomer, then register it. Registration re-checks membership, so
    /// concurrent handshakes for the same address stay deduplicated.
    pub async fn connect(self: &Arc<Self>, address: &str) -> Result<(), ChainError> {
        if !self.table.should_dial(address).await {
            return Ok(());
        }

        let (socket, _response) = connect_async(address)
            .await
            .map_err(|e| ChainError::NetworkError(format!("Failed to connect: {}", e)))?;
        let (mut write, mut read) = socket.split();

        let mut known = vec![self.table.self_address().to_string()];
        known.extend(self.table.peers().await);
        let greeting = serde_json::to_string(&WireMessage::handshake(&known))?;
        write
            .send(WsMessage::Text(greeting))
            .await
            .map_err(|e| ChainError::NetworkError(format!("Failed to send handshake: {}", e)))?;

        let newcomer = [address.to_string()];
        self.table.broadcast(&WireMessage::handshake(&newcomer)).await;

        // Writer task: drain queued messages into the socket.
        let (sender, mut receiver) = mpsc::unbounded_channel::<WireMessage>();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let Ok(text) = serde_json::to_string(&message) else {
                    continue;
                };
                if write.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        if self
            .table
            .register(PeerHandle::new(address.to_string(), sender))
            .await
        {
            info!(peer = %address, "peer connected");
        }

        // Reader task: dispatch until the socket closes, then clean up.
        let service = self.clone();
        let peer_address = address.to_string();
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => service.handle_raw(&text).await,
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            service.table.remove(&peer_address).await;
            info!(peer = %peer_address, "peer disconnected");
        });

        Ok(())
    }
}
