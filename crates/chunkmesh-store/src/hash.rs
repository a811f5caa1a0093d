//! Content hashing

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `bytes`
pub fn content_id(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Incremental hasher for content that is read in pieces
#[derive(Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Finish and return the hex digest
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}
