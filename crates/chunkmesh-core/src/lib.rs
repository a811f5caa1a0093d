//! ChunkMesh Core Library
//!
//! Ties together the ChunkMesh components:
//! - Protocol (message envelope, length-prefixed framing)
//! - Registry (storage nodes, replica placement)
//! - Store (content-addressed chunk storage)
//! - Network (peer overlay, flood discovery)

pub use chunkmesh_network as network;
pub use chunkmesh_protocol as protocol;
pub use chunkmesh_registry as registry;
pub use chunkmesh_store as store;

pub use network::NetworkError;
pub use protocol::ProtocolError;
pub use registry::RegistryError;
pub use store::StoreError;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[tokio::test]
    async fn test_module_exports() {
        let msg = protocol::Message::empty(protocol::MessageType::Ping);
        assert_eq!(msg.message_type.to_u64(), 0);

        let nodes = Arc::new(registry::NodeRegistry::new());
        nodes.register("n1", "10.0.0.1:9000", 4096).await.unwrap();
        assert_eq!(registry::placement::select(&nodes, 1024, 1).await, vec!["n1"]);

        let dir = tempfile::TempDir::new().unwrap();
        let chunks = store::ChunkStore::new(dir.path(), 0).await.unwrap();
        assert_eq!(chunks.chunk_size(), store::DEFAULT_CHUNK_SIZE);

        let overlay = network::Overlay::new(
            network::OverlayConfig::default(),
            "n0".to_string(),
            nodes.clone(),
        );
        assert_eq!(overlay.node_id(), "n0");
        assert_eq!(overlay.port().await, 9000);
    }
}
