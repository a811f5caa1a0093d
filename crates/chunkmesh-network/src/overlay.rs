//! P2P overlay: listener, peer table and message dispatch

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use chunkmesh_protocol::{read_frame, Message, MessageType};
use chunkmesh_registry::{validate_address, NodeRegistry};

use crate::error::{NetworkError, Result};
use crate::handler::{default_handlers, HandlerTable, MessageHandler};
use crate::local;
use crate::peer::{Peer, PeerState, PeerSummary};

/// Overlay configuration
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Interface to listen on
    pub bind_addr: String,

    /// TCP port to listen on (0 picks a free port)
    pub port: u16,

    /// Soft peer limit; exceeding it is logged, never refused
    pub max_peers: usize,

    /// Dial timeout for outbound connections
    pub connect_timeout: Duration,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 9000,
            max_peers: 50,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// The set of live peers plus the machinery that grows it
///
/// Cloning is cheap; clones share the same peer table, handlers and
/// listener.
#[derive(Clone)]
pub struct Overlay {
    config: OverlayConfig,
    node_id: String,
    registry: Arc<NodeRegistry>,

    /// Peers keyed by remote address
    peers: Arc<RwLock<HashMap<String, Arc<Peer>>>>,

    handlers: Arc<RwLock<HandlerTable>>,

    /// Serializes dials per address
    dialing: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,

    local_addr: Arc<RwLock<Option<SocketAddr>>>,
    accept_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Overlay {
    pub fn new(config: OverlayConfig, node_id: String, registry: Arc<NodeRegistry>) -> Self {
        Overlay {
            config,
            node_id,
            registry,
            peers: Arc::new(RwLock::new(HashMap::new())),
            handlers: Arc::new(RwLock::new(HashMap::new())),
            dialing: Arc::new(Mutex::new(HashMap::new())),
            local_addr: Arc::new(RwLock::new(None)),
            accept_task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Bound port once started, configured port before
    pub async fn port(&self) -> u16 {
        self.local_addr
            .read()
            .await
            .map(|addr| addr.port())
            .unwrap_or(self.config.port)
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read().await
    }

    pub async fn is_running(&self) -> bool {
        self.accept_task.lock().await.is_some()
    }

    /// Bind the listener, install the default handlers and start accepting
    ///
    /// Handlers registered before `start` take precedence over the defaults.
    pub async fn start(&self) -> Result<()> {
        let mut accept_task = self.accept_task.lock().await;
        if accept_task.is_some() {
            return Err(NetworkError::AlreadyRunning);
        }

        {
            let mut handlers = self.handlers.write().await;
            for (message_type, handler) in default_handlers() {
                handlers.entry(message_type).or_insert(handler);
            }
        }

        let bind_addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        let listener = TcpListener::bind(&bind_addr).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.write().await = Some(local_addr);

        let overlay = self.clone();
        *accept_task = Some(tokio::spawn(async move {
            overlay.accept_loop(listener).await;
        }));

        info!("Overlay listening on {} (node {})", local_addr, self.node_id);
        Ok(())
    }

    /// Stop accepting and close every peer
    pub async fn stop(&self) -> Result<()> {
        let Some(accept_task) = self.accept_task.lock().await.take() else {
            return Err(NetworkError::NotRunning);
        };
        accept_task.abort();

        let peers: Vec<Arc<Peer>> = self.peers.write().await.drain().map(|(_, p)| p).collect();
        for peer in &peers {
            peer.close().await;
        }

        info!("Overlay stopped, closed {} peers", peers.len());
        Ok(())
    }

    /// Install or replace the handler for a message type
    pub async fn register_handler(&self, message_type: MessageType, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().await.insert(message_type, handler);
    }

    /// Connect to `address`, or return the live peer already connected there
    ///
    /// A successful dial also records the address in the node registry: a
    /// known address has its node heartbeated, an unknown one is registered
    /// under a fresh id with zero capacity.
    pub async fn connect(&self, address: &str) -> Result<Arc<Peer>> {
        validate_address(address).map_err(|e| NetworkError::InvalidAddress(e.to_string()))?;

        let gate = self
            .dialing
            .lock()
            .await
            .entry(address.to_string())
            .or_default()
            .clone();
        let result = {
            let _dial = gate.lock().await;
            self.dial(address).await
        };

        {
            // Clones are only taken or dropped under this lock, so the
            // last holder out removes the gate
            let mut dialing = self.dialing.lock().await;
            let ours = dialing
                .get(address)
                .is_some_and(|current| Arc::ptr_eq(current, &gate));
            drop(gate);
            if ours
                && dialing
                    .get(address)
                    .is_some_and(|current| Arc::strong_count(current) == 1)
            {
                dialing.remove(address);
            }
        }

        result
    }

    async fn dial(&self, address: &str) -> Result<Arc<Peer>> {
        if let Some(peer) = self.active_peer(address).await {
            return Ok(peer);
        }

        let stream = timeout(self.config.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| NetworkError::Timeout(address.to_string()))?
            .map_err(|e| NetworkError::ConnectFailed {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        let node_id = self.upsert_node(address).await?;
        let peer = self.attach(stream, address.to_string(), Some(node_id)).await?;

        info!("Connected to peer {} ({})", address, peer.id());
        Ok(peer)
    }

    async fn upsert_node(&self, address: &str) -> Result<String> {
        if let Some(node_id) = self.registry.find_by_address(address).await {
            self.registry.heartbeat(&node_id).await?;
            return Ok(node_id);
        }

        let node_id = uuid::Uuid::new_v4().to_string();
        self.registry.register(&node_id, address, 0).await?;
        debug!("Registered node {} for {}", node_id, address);
        Ok(node_id)
    }

    /// Turn a fresh socket into an active peer with its own reader
    async fn attach(
        &self,
        stream: TcpStream,
        address: String,
        node_id: Option<String>,
    ) -> Result<Arc<Peer>> {
        let (reader, writer) = stream.into_split();
        let peer = Arc::new(Peer::new(address.clone(), node_id, writer));

        let (replaced, count) = {
            let mut peers = self.peers.write().await;
            let replaced = peers.insert(address, peer.clone());
            (replaced, peers.len())
        };

        if let Some(old) = replaced {
            old.close().await;
        }
        if count > self.config.max_peers {
            warn!(
                "Peer count {} exceeds configured maximum of {}",
                count, self.config.max_peers
            );
        }

        peer.set_state(PeerState::Active).await?;

        let overlay = self.clone();
        let reader_peer = peer.clone();
        let handle = tokio::spawn(async move {
            overlay.read_loop(reader_peer, reader).await;
        });
        peer.set_reader(handle).await;

        Ok(peer)
    }

    async fn accept_loop(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    info!("Accepted connection from {}", remote);
                    if let Err(e) = self.attach(stream, remote.to_string(), None).await {
                        warn!("Failed to attach inbound peer {}: {}", remote, e);
                    }
                }
                Err(e) => {
                    error!("Accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn read_loop(&self, peer: Arc<Peer>, mut reader: OwnedReadHalf) {
        loop {
            let bytes = match read_frame(&mut reader).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_connection_closed() => {
                    info!("Peer {} closed the connection", peer.address());
                    break;
                }
                Err(e) => {
                    warn!("Connection to peer {} lost: {}", peer.address(), e);
                    break;
                }
            };

            peer.touch().await;

            match Message::decode(&bytes) {
                Ok(message) => self.dispatch(&peer, message).await,
                Err(e) => warn!("Dropping undecodable message from {}: {}", peer.address(), e),
            }

            // A handler's reply hit a dead socket
            if !peer.is_active().await {
                debug!("Peer {} went inactive, stopping reader", peer.address());
                break;
            }
        }

        self.evict(&peer).await;
    }

    async fn dispatch(&self, peer: &Arc<Peer>, message: Message) {
        let message_type = message.message_type;
        let handler = self.handlers.read().await.get(&message_type).cloned();

        let Some(handler) = handler else {
            warn!("No handler for {} from {}", message_type, peer.address());
            return;
        };

        if let Err(e) = handler.handle(self, peer, message).await {
            warn!(
                "Handler for {} from {} failed: {}",
                message_type,
                peer.address(),
                e
            );
        }
    }

    /// Remove a dead peer unless it has already been replaced
    async fn evict(&self, peer: &Arc<Peer>) {
        let _ = peer.set_state(PeerState::Inactive).await;

        let mut peers = self.peers.write().await;
        if peers
            .get(peer.address())
            .is_some_and(|current| Arc::ptr_eq(current, peer))
        {
            peers.remove(peer.address());
            debug!("Evicted peer {} ({})", peer.address(), peer.id());
        }
    }

    /// Evict a peer whose send failed and close its socket
    async fn retire(&self, peer: &Arc<Peer>) {
        self.evict(peer).await;
        peer.close().await;
    }

    /// Close and remove a peer by id
    pub async fn disconnect(&self, peer_id: &str) -> Result<()> {
        let peer = {
            let mut peers = self.peers.write().await;
            let address = peers
                .iter()
                .find(|(_, peer)| peer.id() == peer_id)
                .map(|(address, _)| address.clone())
                .ok_or_else(|| NetworkError::NotFound(peer_id.to_string()))?;
            peers.remove(&address)
        };

        if let Some(peer) = peer {
            peer.close().await;
            info!("Disconnected peer {} ({})", peer.address(), peer_id);
        }
        Ok(())
    }

    /// Look up a peer by id
    pub async fn get_peer(&self, peer_id: &str) -> Option<Arc<Peer>> {
        self.peers
            .read()
            .await
            .values()
            .find(|peer| peer.id() == peer_id)
            .cloned()
    }

    pub async fn list_peers(&self) -> Vec<PeerSummary> {
        let peers: Vec<Arc<Peer>> = self.peers.read().await.values().cloned().collect();

        let mut summaries = Vec::with_capacity(peers.len());
        for peer in peers {
            summaries.push(peer.summary().await);
        }
        summaries
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub(crate) async fn active_peer(&self, address: &str) -> Option<Arc<Peer>> {
        let peer = self.peers.read().await.get(address).cloned()?;
        peer.is_active().await.then_some(peer)
    }

    pub(crate) async fn active_peers(&self) -> Vec<Arc<Peer>> {
        let peers: Vec<Arc<Peer>> = self.peers.read().await.values().cloned().collect();

        let mut active = Vec::with_capacity(peers.len());
        for peer in peers {
            if peer.is_active().await {
                active.push(peer);
            }
        }
        active
    }

    /// Send `message` to every active peer from a background task
    ///
    /// Returns the number of peers targeted. Per-peer failures are logged
    /// and peers left inactive by a failed write are evicted.
    pub async fn broadcast(&self, message: Message) -> usize {
        let targets = self.active_peers().await;
        let count = targets.len();

        let overlay = self.clone();
        tokio::spawn(async move {
            for peer in targets {
                if let Err(e) = peer.send(&message).await {
                    warn!(
                        "Broadcast of {} to {} failed: {}",
                        message.message_type,
                        peer.address(),
                        e
                    );
                    if !peer.is_active().await {
                        overlay.retire(&peer).await;
                    }
                }
            }
        });

        count
    }

    /// Whether `address` points back at this overlay's listener
    pub async fn is_self_address(&self, address: &str) -> bool {
        match self.local_addr().await {
            Some(listener) => local::is_self_address(address, listener).await,
            None => false,
        }
    }
}
