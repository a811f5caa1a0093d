//! Live peer connections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

use chunkmesh_protocol::{write_frame, FrameError, Message};

use crate::error::{NetworkError, Result};

/// Connection state of a peer
///
/// `Connecting -> Active -> Inactive`. Inactive is terminal: a reconnect
/// produces a new peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    /// Socket established, not yet serving traffic
    Connecting,
    /// Reader running, sends allowed
    Active,
    /// Closed or failed
    Inactive,
}

impl PeerState {
    /// Validate a state change and return the new state
    pub fn transition(self, to: PeerState) -> Result<PeerState> {
        use PeerState::*;

        match (self, to) {
            (Connecting, Active) | (Connecting, Inactive) | (Active, Inactive) => Ok(to),
            (Inactive, Inactive) => Ok(Inactive),
            (from, to) => Err(NetworkError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerState::Connecting => write!(f, "connecting"),
            PeerState::Active => write!(f, "active"),
            PeerState::Inactive => write!(f, "inactive"),
        }
    }
}

/// Serializable snapshot of a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub id: String,
    pub address: String,
    pub state: PeerState,
    pub node_id: Option<String>,
    pub last_active: DateTime<Utc>,
}

/// A live connection to one remote endpoint
pub struct Peer {
    id: String,
    address: String,
    node_id: Option<String>,
    state: RwLock<PeerState>,
    last_active: RwLock<DateTime<Utc>>,

    /// Held for the duration of one frame write
    writer: Mutex<OwnedWriteHalf>,

    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Peer {
    pub(crate) fn new(address: String, node_id: Option<String>, writer: OwnedWriteHalf) -> Self {
        Peer {
            id: uuid::Uuid::new_v4().to_string(),
            address,
            node_id,
            state: RwLock::new(PeerState::Connecting),
            last_active: RwLock::new(Utc::now()),
            writer: Mutex::new(writer),
            reader: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Remote address, used as the key in the peer table
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Registry node this peer was dialed for; `None` for inbound peers
    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub async fn state(&self) -> PeerState {
        *self.state.read().await
    }

    pub async fn is_active(&self) -> bool {
        self.state().await == PeerState::Active
    }

    pub async fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.read().await
    }

    pub(crate) async fn touch(&self) {
        *self.last_active.write().await = Utc::now();
    }

    pub(crate) async fn set_state(&self, to: PeerState) -> Result<()> {
        let mut state = self.state.write().await;
        *state = state.transition(to)?;
        Ok(())
    }

    pub(crate) async fn set_reader(&self, handle: JoinHandle<()>) {
        *self.reader.lock().await = Some(handle);
    }

    /// Send one message as a single frame
    ///
    /// A socket write failure leaves the peer `Inactive`.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let state = self.state().await;
        if state != PeerState::Active {
            return Err(NetworkError::PeerNotActive {
                peer: self.id.clone(),
                state,
            });
        }

        let mut writer = self.writer.lock().await;
        if let Err(e) = write_frame(&mut *writer, message).await {
            if matches!(e, FrameError::Io(_)) {
                debug!("Write to peer {} ({}) failed: {}", self.id, self.address, e);
                drop(writer);
                let _ = self.set_state(PeerState::Inactive).await;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Mark inactive, stop the reader and shut the socket down
    pub(crate) async fn close(&self) {
        // Inactive is reachable from every state
        let _ = self.set_state(PeerState::Inactive).await;

        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }

        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!("Shutdown of peer {} ({}) failed: {}", self.id, self.address, e);
        }
    }

    pub async fn summary(&self) -> PeerSummary {
        PeerSummary {
            id: self.id.clone(),
            address: self.address.clone(),
            state: self.state().await,
            node_id: self.node_id.clone(),
            last_active: self.last_active().await,
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("node_id", &self.node_id)
            .finish()
    }
}
