//! ChunkMesh Chunk Store
//!
//! Splits files into fixed-size, content-addressed chunks on local disk and
//! reassembles them. Chunk ids are SHA-256 digests of the chunk bytes, so
//! identical chunks share an id across files.

pub mod chunk;
pub mod error;
pub mod hash;
pub mod store;

pub use chunk::ChunkInfo;
pub use error::{Result, StoreError};
pub use hash::{content_id, ContentHasher};
pub use store::ChunkStore;

/// Default chunk size (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum chunk size (1 MiB)
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;
