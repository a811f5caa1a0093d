use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

use chunkmesh_core::network::Overlay;
use chunkmesh_core::protocol::{Message, MessageType};

use crate::config::NetworkConfig;

/// Periodic liveness and discovery traffic
pub struct NetworkMonitor {
    config: NetworkConfig,
    overlay: Overlay,
    ping_task: Option<JoinHandle<()>>,
    discovery_task: Option<JoinHandle<()>>,
}

impl NetworkMonitor {
    pub fn new(config: NetworkConfig, overlay: Overlay) -> Self {
        Self {
            config,
            overlay,
            ping_task: None,
            discovery_task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.ping_task.is_some()
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Starting network monitoring tasks...");

        let ping_interval = self.config.ping_interval_secs.max(1);
        let node_timeout = chrono::Duration::seconds(self.config.node_timeout_secs as i64);
        let overlay = self.overlay.clone();
        self.ping_task = Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(ping_interval));
            loop {
                ticker.tick().await;
                Self::run_ping(&overlay, node_timeout).await;
            }
        }));
        debug!("Ping monitor started (interval: {}s)", ping_interval);

        if self.config.discovery_enabled {
            let discovery_interval = self.config.discovery_interval_secs.max(1);
            let overlay = self.overlay.clone();
            self.discovery_task = Some(tokio::spawn(async move {
                let mut ticker = interval(Duration::from_secs(discovery_interval));
                loop {
                    ticker.tick().await;
                    Self::run_discovery(&overlay).await;
                }
            }));
            debug!("Discovery monitor started (interval: {}s)", discovery_interval);
        } else {
            info!("Peer discovery disabled");
        }

        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping network monitoring tasks...");

        if let Some(task) = self.ping_task.take() {
            task.abort();
        }

        if let Some(task) = self.discovery_task.take() {
            task.abort();
        }

        Ok(())
    }

    async fn run_ping(overlay: &Overlay, node_timeout: chrono::Duration) {
        let sent = overlay.broadcast(Message::empty(MessageType::Ping)).await;
        debug!("Pinged {} peers", sent);

        let stale = overlay.registry().stale_nodes(node_timeout).await;
        if !stale.is_empty() {
            debug!("{} nodes not seen recently: {:?}", stale.len(), stale);
        }
    }

    async fn run_discovery(overlay: &Overlay) {
        let sent = overlay
            .broadcast(Message::empty(MessageType::NodeDiscovery))
            .await;
        debug!("Sent discovery request to {} peers", sent);
    }
}
