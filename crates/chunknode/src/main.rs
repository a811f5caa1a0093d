use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chunknode::{Config, Node};

#[derive(Parser, Debug)]
#[command(name = "chunknode")]
#[command(about = "ChunkMesh storage node", version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "CHUNKNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, env = "CHUNKNODE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Write a default configuration and exit
    #[arg(long)]
    init: bool,

    /// P2P listen port
    #[arg(short, long, env = "CHUNKNODE_PORT")]
    port: Option<u16>,

    /// Node id (generated when empty)
    #[arg(long, env = "CHUNKNODE_ID")]
    node_id: Option<String>,

    /// Comma-separated bootstrap peers (host:port)
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Disable periodic peer discovery
    #[arg(long)]
    no_discovery: bool,

    /// Run without the P2P overlay
    #[arg(long)]
    no_p2p: bool,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(node_id) = args.node_id.as_ref().filter(|id| !id.is_empty()) {
        config.node.id = node_id.clone();
    }
    if !args.peers.is_empty() {
        config.network.bootstrap_peers = args
            .peers
            .iter()
            .map(|peer| peer.trim().to_string())
            .filter(|peer| !peer.is_empty())
            .collect();
    }
    if args.no_discovery {
        config.network.discovery_enabled = false;
    }
    if args.no_p2p {
        config.network.enabled = false;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.init {
        let config = Config::create_default(args.config.clone(), args.data_dir.clone())?;
        println!("Configuration written to {}", config.config_path().display());
        println!("Node ID: {}", config.node.id);
        return Ok(());
    }

    let mut config = Config::load(args.config.clone(), args.data_dir.clone())?;
    apply_overrides(&mut config, &args);
    init_logging(&config);

    info!("Starting ChunkNode v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config.config_path().display());

    let mut node = Node::new(config).await?;
    node.run().await
}
