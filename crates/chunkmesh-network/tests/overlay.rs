//! Multi-peer overlay tests over loopback TCP

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use chunkmesh_network::{MessageHandler, NetworkError, Overlay, OverlayConfig, Peer, PeerState};
use chunkmesh_protocol::{read_frame, write_frame, Message, MessageType};
use chunkmesh_registry::NodeRegistry;

fn create_test_overlay(name: &str) -> Overlay {
    let config = OverlayConfig {
        bind_addr: "127.0.0.1".to_string(),
        port: 0,
        ..Default::default()
    };
    Overlay::new(config, name.to_string(), Arc::new(NodeRegistry::new()))
}

async fn start_test_overlay(name: &str) -> (Overlay, String) {
    let overlay = create_test_overlay(name);
    overlay.start().await.unwrap();
    let address = format!("127.0.0.1:{}", overlay.port().await);
    (overlay, address)
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached in time");
}

async fn recv_message(stream: &mut TcpStream) -> Message {
    let bytes = tokio::time::timeout(Duration::from_secs(5), read_frame(stream))
        .await
        .expect("timed out waiting for a frame")
        .unwrap();
    Message::decode(&bytes).unwrap()
}

/// Forwards every message it sees to a channel
struct Recorder(mpsc::UnboundedSender<(String, Message)>);

#[async_trait::async_trait]
impl MessageHandler for Recorder {
    async fn handle(
        &self,
        _overlay: &Overlay,
        peer: &Arc<Peer>,
        message: Message,
    ) -> chunkmesh_network::Result<()> {
        let _ = self.0.send((peer.id().to_string(), message));
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_connect_returns_same_peer() {
    let (a, _) = start_test_overlay("a").await;
    let (_b, b_addr) = start_test_overlay("b").await;

    let (first, second) = tokio::join!(a.connect(&b_addr), a.connect(&b_addr));
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(a.peer_count().await, 1);

    let again = a.connect(&b_addr).await.unwrap();
    assert_eq!(again.id(), first.id());

    // Exactly one node was registered for the address
    let nodes = a.registry().list().await;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].address, b_addr);
    assert_eq!(nodes[0].storage_max, 0);
    assert_eq!(first.node_id(), Some(nodes[0].id.as_str()));
}

#[tokio::test]
async fn test_connect_reuses_known_node() {
    let (a, _) = start_test_overlay("a").await;
    let (_b, b_addr) = start_test_overlay("b").await;

    a.registry().register("node-b", &b_addr, 1000).await.unwrap();
    let peer = a.connect(&b_addr).await.unwrap();

    assert_eq!(peer.node_id(), Some("node-b"));
    assert_eq!(a.registry().len().await, 1);
    assert_eq!(a.registry().get("node-b").await.unwrap().storage_max, 1000);
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let a = create_test_overlay("a");
    let (tx, mut rx) = mpsc::unbounded_channel();
    a.register_handler(MessageType::Pong, Arc::new(Recorder(tx)))
        .await;
    a.start().await.unwrap();

    let (_b, b_addr) = start_test_overlay("b").await;
    let peer = a.connect(&b_addr).await.unwrap();
    peer.send(&Message::empty(MessageType::Ping)).await.unwrap();

    let (from, message) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(from, peer.id());
    assert_eq!(message.message_type, MessageType::Pong);
}

#[tokio::test]
async fn test_pong_refreshes_dialed_node() {
    let (a, _) = start_test_overlay("a").await;
    let (b, b_addr) = start_test_overlay("b").await;

    let peer = a.connect(&b_addr).await.unwrap();
    let node_id = peer.node_id().unwrap().to_string();
    let before = a.registry().get(&node_id).await.unwrap().last_seen;

    tokio::time::sleep(Duration::from_millis(50)).await;
    peer.send(&Message::empty(MessageType::Ping)).await.unwrap();

    wait_until(|| {
        let a = a.clone();
        let node_id = node_id.clone();
        async move { a.registry().get(&node_id).await.unwrap().last_seen > before }
    })
    .await;

    // The answering side only knows an inbound peer
    assert!(b.registry().is_empty().await);
}

#[tokio::test]
async fn test_inbound_ping_leaves_registry_alone() {
    let (a, a_addr) = start_test_overlay("a").await;
    let mut raw = TcpStream::connect(&a_addr).await.unwrap();

    write_frame(&mut raw, &Message::empty(MessageType::Ping))
        .await
        .unwrap();
    assert_eq!(recv_message(&mut raw).await.message_type, MessageType::Pong);

    write_frame(&mut raw, &Message::empty(MessageType::Pong))
        .await
        .unwrap();
    write_frame(&mut raw, &Message::empty(MessageType::Ping))
        .await
        .unwrap();
    assert_eq!(recv_message(&mut raw).await.message_type, MessageType::Pong);

    assert!(a.registry().is_empty().await);
    let peers = a.list_peers().await;
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].node_id, None);
}

#[tokio::test]
async fn test_undecodable_frame_keeps_connection() {
    let (a, a_addr) = start_test_overlay("a").await;
    let mut raw = TcpStream::connect(&a_addr).await.unwrap();

    let garbage = br#"{"type":99,"payload":null}"#;
    raw.write_all(&(garbage.len() as u32).to_be_bytes())
        .await
        .unwrap();
    raw.write_all(garbage).await.unwrap();
    write_frame(&mut raw, &Message::empty(MessageType::Ping))
        .await
        .unwrap();

    let reply = recv_message(&mut raw).await;
    assert_eq!(reply.message_type, MessageType::Pong);
    assert_eq!(a.peer_count().await, 1);
}

#[tokio::test]
async fn test_discovery_excludes_requester() {
    let (a, a_addr) = start_test_overlay("a").await;
    let (b, _) = start_test_overlay("b").await;

    b.connect(&a_addr).await.unwrap();
    wait_until(|| {
        let a = a.clone();
        async move { a.peer_count().await == 1 }
    })
    .await;

    let mut raw = TcpStream::connect(&a_addr).await.unwrap();
    let raw_addr = raw.local_addr().unwrap().to_string();
    wait_until(|| {
        let a = a.clone();
        async move { a.peer_count().await == 2 }
    })
    .await;

    write_frame(&mut raw, &Message::empty(MessageType::NodeDiscovery))
        .await
        .unwrap();

    let reply = recv_message(&mut raw).await;
    assert_eq!(reply.message_type, MessageType::NodeAnnouncement);

    let addresses = reply.announced_addresses().unwrap();
    assert_eq!(addresses.len(), 1);
    assert!(!addresses.contains(&raw_addr));
}

#[tokio::test]
async fn test_announcement_dials_advertised_peers() {
    let (a, a_addr) = start_test_overlay("a").await;
    let (_c, c_addr) = start_test_overlay("c").await;

    let mut raw = TcpStream::connect(&a_addr).await.unwrap();
    let announcement = Message::announcement(&[a_addr.clone(), c_addr.clone()]).unwrap();
    write_frame(&mut raw, &announcement).await.unwrap();

    wait_until(|| {
        let a = a.clone();
        let c_addr = c_addr.clone();
        async move { a.registry().find_by_address(&c_addr).await.is_some() }
    })
    .await;

    let peers = a.list_peers().await;
    assert!(peers.iter().any(|p| p.address == c_addr));
    assert!(peers.iter().all(|p| p.address != a_addr));
    assert!(a.registry().find_by_address(&a_addr).await.is_none());
}

#[tokio::test]
async fn test_disconnect_leaves_other_peers() {
    let (a, _) = start_test_overlay("a").await;
    let (b, b_addr) = start_test_overlay("b").await;
    let (_c, c_addr) = start_test_overlay("c").await;

    let to_b = a.connect(&b_addr).await.unwrap();
    let to_c = a.connect(&c_addr).await.unwrap();
    wait_until(|| {
        let b = b.clone();
        async move { b.peer_count().await == 1 }
    })
    .await;

    assert!(matches!(
        a.disconnect("no-such-peer").await,
        Err(NetworkError::NotFound(_))
    ));
    assert_eq!(a.peer_count().await, 2);

    a.disconnect(to_b.id()).await.unwrap();
    assert_eq!(to_b.state().await, PeerState::Inactive);
    assert!(to_c.is_active().await);

    let peers = a.list_peers().await;
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].id, to_c.id());

    // The remote side sees the close and evicts its inbound peer
    wait_until(|| {
        let b = b.clone();
        async move { b.peer_count().await == 0 }
    })
    .await;
}

#[tokio::test]
async fn test_remote_close_evicts_peer() {
    let (a, a_addr) = start_test_overlay("a").await;

    let raw = TcpStream::connect(&a_addr).await.unwrap();
    wait_until(|| {
        let a = a.clone();
        async move { a.peer_count().await == 1 }
    })
    .await;

    drop(raw);
    wait_until(|| {
        let a = a.clone();
        async move { a.peer_count().await == 0 }
    })
    .await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_peer() {
    let (a, _) = start_test_overlay("a").await;

    let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
    a.connect(&first.local_addr().unwrap().to_string())
        .await
        .unwrap();
    a.connect(&second.local_addr().unwrap().to_string())
        .await
        .unwrap();

    let (mut s1, _) = first.accept().await.unwrap();
    let (mut s2, _) = second.accept().await.unwrap();

    let sent = a.broadcast(Message::empty(MessageType::NodeDiscovery)).await;
    assert_eq!(sent, 2);

    assert_eq!(recv_message(&mut s1).await.message_type, MessageType::NodeDiscovery);
    assert_eq!(recv_message(&mut s2).await.message_type, MessageType::NodeDiscovery);
}

#[tokio::test]
async fn test_broadcast_survives_dead_peer() {
    let (a, _) = start_test_overlay("a").await;

    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_peer = a
        .connect(&dead.local_addr().unwrap().to_string())
        .await
        .unwrap();
    a.connect(&live.local_addr().unwrap().to_string())
        .await
        .unwrap();

    let (dead_stream, _) = dead.accept().await.unwrap();
    let (mut live_stream, _) = live.accept().await.unwrap();
    drop(dead_stream);
    drop(dead);

    for _ in 0..5 {
        a.broadcast(Message::empty(MessageType::Ping)).await;
        assert_eq!(recv_message(&mut live_stream).await.message_type, MessageType::Ping);
    }

    // The dead peer ends up inactive and out of the table
    wait_until(|| {
        let a = a.clone();
        async move { a.peer_count().await == 1 }
    })
    .await;
    assert_eq!(dead_peer.state().await, PeerState::Inactive);
}

#[tokio::test]
async fn test_stop_closes_peers() {
    let (a, _) = start_test_overlay("a").await;
    let (_b, b_addr) = start_test_overlay("b").await;

    let peer = a.connect(&b_addr).await.unwrap();
    a.stop().await.unwrap();

    assert_eq!(peer.state().await, PeerState::Inactive);
    assert_eq!(a.peer_count().await, 0);
    assert!(matches!(
        peer.send(&Message::empty(MessageType::Ping)).await,
        Err(NetworkError::PeerNotActive { .. })
    ));
}
