//! ChunkNode daemon
//!
//! Runs one ChunkMesh node: chunk store, node registry and P2P overlay, plus
//! bootstrap dialing and periodic ping/discovery traffic.

pub mod config;
pub mod monitor;
pub mod node;

pub use config::Config;
pub use node::Node;
