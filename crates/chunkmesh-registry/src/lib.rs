//! ChunkMesh Node Registry
//!
//! This module implements the durable directory of storage nodes:
//! - Registration, heartbeats, status and capacity bookkeeping
//! - Address uniqueness (one node id per address)
//! - Advisory replica placement over a registry snapshot

pub mod error;
pub mod node;
pub mod placement;
pub mod registry;

pub use error::{RegistryError, Result};
pub use node::{validate_address, Node, NodeStatus};
pub use registry::{ClusterSummary, NodeRegistry};
