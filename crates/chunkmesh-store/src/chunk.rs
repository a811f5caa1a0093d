//! Chunk metadata

use serde::{Deserialize, Serialize};

/// Metadata about one stored chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    /// Content hash of the chunk bytes
    pub id: String,

    /// Position within the file (0-based)
    pub index: usize,

    /// Chunk length in bytes
    pub size: usize,

    /// Content hash of the whole file
    pub file_id: String,

    /// Node id holding the chunk, empty when only stored locally
    #[serde(default)]
    pub location: String,
}

impl ChunkInfo {
    pub fn new(id: String, index: usize, size: usize, file_id: String) -> Self {
        ChunkInfo {
            id,
            index,
            size,
            file_id,
            location: String::new(),
        }
    }
}
