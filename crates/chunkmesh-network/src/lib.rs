//! ChunkMesh Overlay Network
//!
//! Maintains live TCP connections to peers and grows them toward a full mesh
//! by flood discovery.
//!
//! Features:
//! - Length-prefixed framed connections, one reader task per peer
//! - Explicit message-type handler table
//! - Ping/Pong liveness feeding the node registry
//! - NodeDiscovery / NodeAnnouncement flood discovery with self-loop
//!   suppression

pub mod error;
pub mod handler;
pub mod local;
pub mod overlay;
pub mod peer;

pub use error::{NetworkError, Result};
pub use handler::{default_handlers, HandlerTable, MessageHandler};
pub use overlay::{Overlay, OverlayConfig};
pub use peer::{Peer, PeerState, PeerSummary};
