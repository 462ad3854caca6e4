//! Integration tests for handshake flooding between real node services

use meshchain::network::NodeService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

/// Start a service on an ephemeral localhost port and return it with the
/// address it advertises.
async fn start_service() -> (Arc<NodeService>, String) {
    let listener = TcpListener::bind(("127.0.0.1", 0))
        .await
        .expect("ephemeral port available");
    let port = listener.local_addr().expect("local addr").port();
    let address = format!("ws://127.0.0.1:{}", port);

    let service = Arc::new(NodeService::new(address.clone()));
    service.serve(listener);
    (service, address)
}

async fn wait_until_knows(service: &Arc<NodeService>, address: &str) {
    loop {
        if service.table().peers().await.contains(&address.to_string()) {
            return;
        }
        sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn test_two_nodes_converge_bidirectionally() {
    timeout(Duration::from_secs(10), async {
        let (node_a, addr_a) = start_service().await;
        let (node_b, addr_b) = start_service().await;

        node_b.connect(&addr_a).await.expect("dial succeeds");

        // B learns A directly; A learns B from the handshake and dials back.
        wait_until_knows(&node_b, &addr_a).await;
        wait_until_knows(&node_a, &addr_b).await;

        assert_eq!(node_a.table().peer_count().await, 1);
        assert_eq!(node_b.table().peer_count().await, 1);
    })
    .await
    .expect("test_two_nodes_converge_bidirectionally timed out");
}

#[tokio::test]
async fn test_flooding_converges_three_node_mesh() {
    timeout(Duration::from_secs(15), async {
        let (node_a, addr_a) = start_service().await;
        let (node_b, addr_b) = start_service().await;
        let (node_c, addr_c) = start_service().await;

        // A and B pair up first.
        node_b.connect(&addr_a).await.expect("dial succeeds");
        wait_until_knows(&node_a, &addr_b).await;
        wait_until_knows(&node_b, &addr_a).await;

        // C only knows B; flooding must introduce it to A and vice versa.
        node_c.connect(&addr_b).await.expect("dial succeeds");

        wait_until_knows(&node_c, &addr_b).await;
        wait_until_knows(&node_c, &addr_a).await;
        wait_until_knows(&node_b, &addr_c).await;
        wait_until_knows(&node_a, &addr_c).await;

        assert_eq!(node_a.table().peer_count().await, 2);
        assert_eq!(node_b.table().peer_count().await, 2);
        assert_eq!(node_c.table().peer_count().await, 2);
    })
    .await
    .expect("test_flooding_converges_three_node_mesh timed out");
}

#[tokio::test]
async fn test_duplicate_connect_is_idempotent() {
    timeout(Duration::from_secs(10), async {
        let (node_a, addr_a) = start_service().await;
        let (node_b, addr_b) = start_service().await;

        node_b.connect(&addr_a).await.expect("dial succeeds");
        wait_until_knows(&node_b, &addr_a).await;
        wait_until_knows(&node_a, &addr_b).await;

        // Second dial to a known peer is a no-op.
        node_b.connect(&addr_a).await.expect("repeat dial succeeds");
        sleep(Duration::from_millis(200)).await;

        assert_eq!(node_b.table().peer_count().await, 1);
        assert_eq!(node_a.table().peer_count().await, 1);
    })
    .await
    .expect("test_duplicate_connect_is_idempotent timed out");
}

#[tokio::test]
async fn test_node_never_connects_to_itself() {
    timeout(Duration::from_secs(10), async {
        let (node_a, addr_a) = start_service().await;

        node_a.connect(&addr_a).await.expect("self dial is a no-op");
        sleep(Duration::from_millis(100)).await;

        assert_eq!(node_a.table().peer_count().await, 0);
    })
    .await
    .expect("test_node_never_connects_to_itself timed out");
}
