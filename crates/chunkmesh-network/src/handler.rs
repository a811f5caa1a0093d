//! Message handlers
//!
//! Incoming messages are dispatched by type through an explicit handler
//! table. A handler runs on the reader task of the peer that sent the
//! message, so messages from one peer are handled in arrival order.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use chunkmesh_protocol::{Message, MessageType};

use crate::error::Result;
use crate::overlay::Overlay;
use crate::peer::Peer;

/// Handler for one message type
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, overlay: &Overlay, peer: &Arc<Peer>, message: Message) -> Result<()>;
}

/// Message type -> handler
pub type HandlerTable = HashMap<MessageType, Arc<dyn MessageHandler>>;

/// Handlers installed by `Overlay::start`
pub fn default_handlers() -> Vec<(MessageType, Arc<dyn MessageHandler>)> {
    vec![
        (MessageType::Ping, Arc::new(PingHandler)),
        (MessageType::Pong, Arc::new(PongHandler)),
        (MessageType::NodeDiscovery, Arc::new(DiscoveryHandler)),
        (MessageType::NodeAnnouncement, Arc::new(AnnouncementHandler)),
    ]
}

/// Refresh the registry node behind a peer, if it has one
async fn heartbeat_node(overlay: &Overlay, peer: &Peer) {
    let Some(node_id) = peer.node_id() else {
        return;
    };

    if let Err(e) = overlay.registry().heartbeat(node_id).await {
        debug!("Heartbeat for node {} via peer {} skipped: {}", node_id, peer.id(), e);
    }
}

/// Ping: heartbeat and reply with Pong
pub struct PingHandler;

#[async_trait::async_trait]
impl MessageHandler for PingHandler {
    async fn handle(&self, overlay: &Overlay, peer: &Arc<Peer>, _message: Message) -> Result<()> {
        heartbeat_node(overlay, peer).await;
        peer.send(&Message::empty(MessageType::Pong)).await
    }
}

/// Pong: heartbeat
pub struct PongHandler;

#[async_trait::async_trait]
impl MessageHandler for PongHandler {
    async fn handle(&self, overlay: &Overlay, peer: &Arc<Peer>, _message: Message) -> Result<()> {
        heartbeat_node(overlay, peer).await;
        Ok(())
    }
}

/// NodeDiscovery: answer with every other active peer address
pub struct DiscoveryHandler;

#[async_trait::async_trait]
impl MessageHandler for DiscoveryHandler {
    async fn handle(&self, overlay: &Overlay, peer: &Arc<Peer>, _message: Message) -> Result<()> {
        let mut addresses = Vec::new();
        for other in overlay.active_peers().await {
            if other.id() == peer.id() || overlay.is_self_address(other.address()).await {
                continue;
            }
            addresses.push(other.address().to_string());
        }

        debug!(
            "Answering discovery from {} with {} addresses",
            peer.address(),
            addresses.len()
        );

        peer.send(&Message::announcement(&addresses)?).await
    }
}

/// NodeAnnouncement: dial every advertised address in the background
pub struct AnnouncementHandler;

#[async_trait::async_trait]
impl MessageHandler for AnnouncementHandler {
    async fn handle(&self, overlay: &Overlay, peer: &Arc<Peer>, message: Message) -> Result<()> {
        let addresses = message.announced_addresses()?;
        info!(
            "Peer {} announced {} addresses",
            peer.address(),
            addresses.len()
        );

        for address in addresses {
            if overlay.is_self_address(&address).await {
                continue;
            }

            let overlay = overlay.clone();
            tokio::spawn(async move {
                if let Err(e) = overlay.connect(&address).await {
                    warn!("Failed to connect to announced peer {}: {}", address, e);
                }
            });
        }

        Ok(())
    }
}
