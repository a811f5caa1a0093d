use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use chunkmesh_core::network::Overlay;
use chunkmesh_core::registry::NodeRegistry;
use chunkmesh_core::store::ChunkStore;

use crate::config::{Config, NetworkConfig};
use crate::monitor::NetworkMonitor;

/// Main node orchestrator
pub struct Node {
    config: Config,
    registry: Arc<NodeRegistry>,
    store: Arc<ChunkStore>,
    overlay: Overlay,
    monitor: NetworkMonitor,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Node {
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing node components...");

        tokio::fs::create_dir_all(&config.data_directory)
            .await
            .with_context(|| {
                format!(
                    "Failed to create data directory {}",
                    config.data_directory.display()
                )
            })?;

        let store = ChunkStore::new(config.chunk_directory(), config.storage.chunk_size)
            .await
            .context("Failed to open chunk store")?;
        info!("✓ Chunk store initialized");

        let registry = Arc::new(NodeRegistry::new());
        info!("✓ Node registry initialized");

        let overlay = Overlay::new(
            config.network.overlay_config(),
            config.node.id.clone(),
            registry.clone(),
        );
        let monitor = NetworkMonitor::new(config.network.clone(), overlay.clone());
        info!("✓ Overlay initialized");

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Ok(Self {
            config,
            registry,
            store: Arc::new(store),
            overlay,
            monitor,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        self.wait_for_shutdown().await;

        info!("Shutting down ChunkNode...");
        self.shutdown().await
    }

    /// Start the overlay, bootstrap dialing and periodic tasks
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting ChunkNode services...");

        if self.config.network.enabled {
            self.overlay
                .start()
                .await
                .context("Failed to start overlay")?;
            info!("✓ Overlay running");

            for address in &self.config.network.bootstrap_peers {
                connect_with_retry(self.overlay.clone(), address.clone(), &self.config.network);
            }

            self.monitor.start().await?;
            info!("✓ Network monitor running");
        } else {
            info!("P2P networking disabled");
        }

        info!("═══════════════════════════════════════════════");
        info!("  ChunkNode is now running");
        info!("═══════════════════════════════════════════════");
        info!("  Node ID: {}", self.config.node.id);
        info!("  Name: {}", self.config.node.name);
        if self.config.network.enabled {
            info!("  P2P Port: {}", self.overlay.port().await);
            info!("  Peer Discovery: {}", self.config.network.discovery_enabled);
        }
        info!("  Data Dir: {}", self.config.data_directory.display());
        info!("═══════════════════════════════════════════════");

        Ok(())
    }

    async fn wait_for_shutdown(&mut self) {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C signal");
            }
            _ = self.shutdown_rx.recv() => {
                info!("Received shutdown signal");
            }
        }
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if self.monitor.is_running() {
            info!("Stopping network monitor...");
            self.monitor.stop().await?;
        }

        if self.overlay.is_running().await {
            info!("Stopping overlay...");
            self.overlay.stop().await?;
        }

        let summary = self.registry.summary().await;
        info!("Cluster summary: {}", serde_json::to_string(&summary)?);

        info!("Shutdown complete");
        Ok(())
    }

    pub fn shutdown_handle(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }
}

/// Dial a bootstrap peer in the background, retrying on failure
pub fn connect_with_retry(overlay: Overlay, address: String, config: &NetworkConfig) -> JoinHandle<bool> {
    let attempts = config.connect_retries.max(1);
    let delay = config.connect_retry_delay();

    tokio::spawn(async move {
        for attempt in 1..=attempts {
            info!("Connecting to peer {} (attempt {}/{})", address, attempt, attempts);

            match overlay.connect(&address).await {
                Ok(peer) => {
                    info!("Connected to bootstrap peer {} ({})", address, peer.id());
                    return true;
                }
                Err(e) => {
                    warn!("Failed to connect to {}: {}", address, e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        error!("Giving up on bootstrap peer {} after {} attempts", address, attempts);
        false
    })
}
