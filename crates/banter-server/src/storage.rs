//! Local-disk object store.
//!
//! The default [`ObjectStore`] collaborator: uploaded payloads land as
//! plain files under a configured directory and are served back from
//! `/uploads/{name}`. Writes and reads are chunked; nothing requires the
//! whole payload in memory.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use banter_core::{ByteStream, ObjectStore};
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// Read/write chunk size.
const CHUNK_SIZE: usize = 64 * 1024;

/// Disk-backed object store.
pub struct LocalStore {
    root: PathBuf,
    public_base: String,
}

impl LocalStore {
    /// Create a store rooted at `root`, advertising URLs under
    /// `{public_base}/uploads/`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        let public_base: String = public_base.into();
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    /// Open a stored object as a chunked stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or cannot be opened.
    pub async fn read(&self, name: &str) -> std::io::Result<ByteStream<'static>> {
        let file = fs::File::open(self.root.join(name)).await?;
        let chunks = stream::unfold(file, |mut file| async move {
            let mut buf = vec![0u8; CHUNK_SIZE];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(Bytes::from(buf)), file))
                }
                Err(e) => Some((Err(e), file)),
            }
        });
        Ok(chunks.boxed())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, name: &str, mut payload: ByteStream<'_>) -> anyhow::Result<String> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Failed to create upload dir {}", self.root.display()))?;

        let path = self.root.join(name);
        let written = match write_object(&path, &mut payload).await {
            Ok(written) => written,
            Err(e) => {
                // A half-written object is never served; drop it from disk.
                let _ = fs::remove_file(&path).await;
                return Err(e);
            }
        };

        debug!(object = %name, bytes = written, "Stored upload");
        Ok(format!("{}/uploads/{}", self.public_base, name))
    }
}

/// Stream a payload into a new file, returning the byte count.
async fn write_object(path: &std::path::Path, payload: &mut ByteStream<'_>) -> anyhow::Result<usize> {
    let mut file = fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut written = 0usize;
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.context("Upload stream failed")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        written += chunk.len();
    }
    file.flush().await.context("Failed to flush upload")?;
    Ok(written)
}
