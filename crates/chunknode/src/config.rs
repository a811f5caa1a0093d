use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chunkmesh_core::network::OverlayConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,

    #[serde(skip)]
    config_file_path: PathBuf,
    #[serde(skip)]
    pub data_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node id; generated on load when empty
    #[serde(default)]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
    pub max_peers: usize,
    pub ping_interval_secs: u64,
    pub discovery_interval_secs: u64,
    pub discovery_enabled: bool,
    /// Nodes not heard from for this long are reported as stale
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    pub connect_retries: u32,
    pub connect_retry_delay_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_node_timeout() -> u64 {
    300
}

impl NetworkConfig {
    pub fn overlay_config(&self) -> OverlayConfig {
        OverlayConfig {
            bind_addr: self.bind.clone(),
            port: self.port,
            max_peers: self.max_peers,
            ..Default::default()
        }
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_delay_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".to_string(),
            port: 9000,
            max_peers: 50,
            ping_interval_secs: 30,
            discovery_interval_secs: 60,
            discovery_enabled: true,
            node_timeout_secs: 300,
            bootstrap_peers: Vec::new(),
            connect_retries: 3,
            connect_retry_delay_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Overrides the platform data directory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Chunk size in bytes (0 = default)
    pub chunk_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            chunk_size: chunkmesh_core::store::DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// The data directory is taken from `data_dir`, then `storage.data_dir`,
    /// then the platform default.
    pub fn load(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);

        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {}\nRun with --init to create a new configuration",
                config_path.display()
            );
        }

        let contents =
            fs::read_to_string(&config_path).context("Failed to read configuration file")?;
        let mut config: Config =
            serde_yaml::from_str(&contents).context("Failed to parse configuration file")?;

        if config.node.id.is_empty() {
            config.node.id = uuid::Uuid::new_v4().to_string();
        }

        config.data_directory = data_dir
            .or_else(|| config.storage.data_dir.clone())
            .unwrap_or_else(Self::default_data_dir);
        config.config_file_path = config_path;

        Ok(config)
    }

    /// Create a new default configuration and write it to disk
    pub fn create_default(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(Self::default_config_path);
        let data_dir = data_dir.unwrap_or_else(Self::default_data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&data_dir)?;

        let node_id = uuid::Uuid::new_v4().to_string();
        let config = Config {
            node: NodeConfig {
                name: format!("chunknode-{}", &node_id[..8]),
                id: node_id,
            },
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            config_file_path: config_path.clone(),
            data_directory: data_dir,
        };

        let yaml = serde_yaml::to_string(&config)?;
        fs::write(&config_path, yaml)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;

        Ok(config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file_path
    }

    pub fn chunk_directory(&self) -> PathBuf {
        self.data_directory.join("chunks")
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chunknode")
            .join("config.yaml")
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("chunknode")
    }
}
