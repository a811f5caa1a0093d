//! Content-addressed chunk storage on the local filesystem
//!
//! Layout: `<root>/<file_id>/<chunk_id>`, one file per chunk. Writes are
//! plain whole-file writes; they are neither fsynced nor renamed into place,
//! so `verify` is the way to detect a chunk torn by a crash.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::chunk::ChunkInfo;
use crate::error::{Result, StoreError};
use crate::hash::{content_id, ContentHasher};
use crate::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

/// Read buffer used while hashing a whole file
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Local chunk store
pub struct ChunkStore {
    /// Base directory
    root: PathBuf,

    /// Chunk size used by `split`
    chunk_size: usize,

    /// Chunk metadata by chunk id
    metadata: RwLock<HashMap<String, ChunkInfo>>,
}

impl ChunkStore {
    /// Open a store rooted at `root`, creating the directory if needed
    ///
    /// A chunk size of 0 selects the 64 KiB default; sizes above 1 MiB are
    /// clamped to 1 MiB.
    pub async fn new(root: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let chunk_size = match chunk_size {
            0 => DEFAULT_CHUNK_SIZE,
            size => size.min(MAX_CHUNK_SIZE),
        };

        info!(
            "Chunk store opened at {} (chunk size {} bytes)",
            root.display(),
            chunk_size
        );

        Ok(ChunkStore {
            root,
            chunk_size,
            metadata: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split a file using the store's chunk size
    pub async fn split(&self, file_path: impl AsRef<Path>) -> Result<(String, Vec<ChunkInfo>)> {
        self.split_chunks(file_path.as_ref(), self.chunk_size).await
    }

    /// Split a file using an explicit chunk size in `1..=MAX_CHUNK_SIZE`
    pub async fn split_with(
        &self,
        file_path: impl AsRef<Path>,
        chunk_size: usize,
    ) -> Result<(String, Vec<ChunkInfo>)> {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(StoreError::InvalidInput(format!(
                "chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, chunk_size
            )));
        }

        self.split_chunks(file_path.as_ref(), chunk_size).await
    }

    async fn split_chunks(
        &self,
        file_path: &Path,
        chunk_size: usize,
    ) -> Result<(String, Vec<ChunkInfo>)> {
        let mut file = File::open(file_path)
            .await
            .map_err(|e| StoreError::io_for(file_path.display().to_string(), e))?;

        // First pass: file id
        let mut hasher = ContentHasher::new();
        let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        let file_id = hasher.finish();

        // Second pass: chunks
        file.seek(SeekFrom::Start(0)).await?;
        let file_dir = self.root.join(&file_id);
        fs::create_dir_all(&file_dir).await?;

        let mut chunks = Vec::new();
        let mut buffer = vec![0u8; chunk_size];
        loop {
            let n = read_full(&mut file, &mut buffer).await?;
            if n == 0 {
                break;
            }

            let bytes = &buffer[..n];
            let chunk_id = content_id(bytes);
            fs::write(file_dir.join(&chunk_id), bytes).await?;

            chunks.push(ChunkInfo::new(chunk_id, chunks.len(), n, file_id.clone()));

            if n < chunk_size {
                break;
            }
        }

        {
            let mut metadata = self.metadata.write().await;
            for chunk in &chunks {
                metadata.insert(chunk.id.clone(), chunk.clone());
            }
        }

        info!(
            "Split {} into {} chunks (file {})",
            file_path.display(),
            chunks.len(),
            file_id
        );

        Ok((file_id, chunks))
    }

    /// Rebuild a file from its chunks
    ///
    /// `chunks` may be in any order, but their indices must cover exactly
    /// `0..chunks.len()`. The output is created or truncated only after the
    /// index set has been validated.
    pub async fn reassemble(
        &self,
        file_id: &str,
        chunks: &[ChunkInfo],
        output_path: impl AsRef<Path>,
    ) -> Result<()> {
        validate_component("file id", file_id)?;

        let mut ordered: Vec<Option<&ChunkInfo>> = vec![None; chunks.len()];
        for chunk in chunks {
            let slot = ordered.get_mut(chunk.index).ok_or_else(|| {
                StoreError::InvalidInput(format!(
                    "chunk index {} out of range for {} chunks",
                    chunk.index,
                    chunks.len()
                ))
            })?;

            if slot.is_some() {
                return Err(StoreError::InvalidInput(format!(
                    "duplicate chunk index {}",
                    chunk.index
                )));
            }
            *slot = Some(chunk);
        }

        let output_path = output_path.as_ref();
        let mut output = File::create(output_path).await?;

        // Dense by construction: every slot was filled exactly once
        for chunk in ordered.into_iter().flatten() {
            let bytes = self.get(file_id, &chunk.id).await?;
            output.write_all(&bytes).await?;
        }
        output.flush().await?;

        info!(
            "Reassembled file {} from {} chunks into {}",
            file_id,
            chunks.len(),
            output_path.display()
        );

        Ok(())
    }

    /// Read one chunk
    pub async fn get(&self, file_id: &str, chunk_id: &str) -> Result<Vec<u8>> {
        let path = self.chunk_path(file_id, chunk_id)?;

        fs::read(&path)
            .await
            .map_err(|e| StoreError::io_for(format!("chunk {}/{}", file_id, chunk_id), e))
    }

    /// Write one chunk, creating the file's directory if needed
    ///
    /// The bytes are stored as given; no check is made that they hash to
    /// `chunk_id`.
    pub async fn put(&self, file_id: &str, chunk_id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.chunk_path(file_id, chunk_id)?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&path, bytes).await?;

        debug!("Stored chunk {}/{} ({} bytes)", file_id, chunk_id, bytes.len());
        Ok(())
    }

    /// Metadata recorded for a chunk by a previous split
    pub async fn chunk_info(&self, chunk_id: &str) -> Option<ChunkInfo> {
        self.metadata.read().await.get(chunk_id).cloned()
    }

    /// Check that a stored chunk still hashes to its id
    pub async fn verify(&self, file_id: &str, chunk_id: &str) -> Result<bool> {
        let bytes = self.get(file_id, chunk_id).await?;
        let intact = content_id(&bytes) == chunk_id;

        if !intact {
            warn!("Chunk {}/{} failed verification", file_id, chunk_id);
        }

        Ok(intact)
    }

    fn chunk_path(&self, file_id: &str, chunk_id: &str) -> Result<PathBuf> {
        validate_component("file id", file_id)?;
        validate_component("chunk id", chunk_id)?;
        Ok(self.root.join(file_id).join(chunk_id))
    }
}

/// Reject ids that would escape or alias the store layout
fn validate_component(what: &str, value: &str) -> Result<()> {
    let mut components = Path::new(value).components();

    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == value && !value.contains('\\') => Ok(()),
        _ => Err(StoreError::InvalidInput(format!(
            "{} must be a single path component: {:?}",
            what, value
        ))),
    }
}

/// Fill `buffer` from `reader`, stopping early only at end of stream
async fn read_full<R>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
