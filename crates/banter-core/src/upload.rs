//! Upload coordination for out-of-band binary payloads.
//!
//! Images and files never travel through the chat channel. A client posts
//! the bytes to the [`UploadCoordinator`], which streams them into an
//! [`ObjectStore`] collaborator and hands back a URL; the client then sends
//! that URL as an ordinary chat message tagged `[image]` or `[file]`.
//!
//! The coordinator is stateless per request and shares nothing with the
//! messaging path; an upload in progress never blocks chat fan-out.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream, StreamExt};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// A chunked binary payload. The full payload is never buffered in memory;
/// there is no upper size limit in the coordinator.
pub type ByteStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

/// Longest extension carried over onto a stored name.
const MAX_EXTENSION_LEN: usize = 16;

/// Upload failures surfaced to the uploading client.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The payload stream yielded zero bytes; nothing was stored.
    #[error("Empty payload")]
    EmptyPayload,

    /// The payload stream itself failed, e.g. the client dropped the
    /// connection mid-upload. The store may or may not have been touched.
    #[error("Payload read failed: {0}")]
    Payload(#[source] std::io::Error),

    /// The object store rejected or failed the write. Propagated, not
    /// retried; no partial artifact is ever linked into chat.
    #[error("Storage failure: {0}")]
    Storage(anyhow::Error),
}

/// A stored binary object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadArtifact {
    /// Filename as the client supplied it (display only, never a key).
    pub original_filename: String,
    /// Collision-resistant name the object was stored under.
    pub stored_name: String,
    /// Publicly dereferenceable URL for the stored object.
    pub url: String,
}

/// Persistence collaborator for uploaded payloads.
///
/// `put` must consume the stream chunk by chunk; uploads have no size cap.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Persist a payload under `name` and return a retrievable URL.
    async fn put(&self, name: &str, payload: ByteStream<'_>) -> anyhow::Result<String>;
}

/// Receives binary payloads and places them in the object store.
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
}

impl UploadCoordinator {
    /// Create a coordinator over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Store one payload and return its artifact.
    ///
    /// The client-supplied filename is never used as the storage key: the
    /// stored name is a random token plus the sanitized original extension,
    /// so concurrent uploads of identically named files cannot collide and
    /// a hostile filename cannot traverse paths.
    ///
    /// # Errors
    ///
    /// [`UploadError::EmptyPayload`] if the stream ends before yielding any
    /// bytes (checked before the store is touched), [`UploadError::Payload`]
    /// if reading the payload fails, [`UploadError::Storage`] if the store
    /// write fails.
    pub async fn upload(
        &self,
        filename: &str,
        mut payload: ByteStream<'_>,
    ) -> Result<UploadArtifact, UploadError> {
        // Pull until the first real chunk so an empty upload never reaches
        // the store at all.
        let first = loop {
            match payload.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break chunk,
                Some(Err(e)) => return Err(UploadError::Payload(e)),
                None => return Err(UploadError::EmptyPayload),
            }
        };

        let stored_name = storage_name(filename);
        debug!(original = %filename, stored = %stored_name, "Storing upload");

        let payload = stream::once(async move { Ok(first) }).chain(payload).boxed();
        let url = self
            .store
            .put(&stored_name, payload)
            .await
            .map_err(UploadError::Storage)?;

        Ok(UploadArtifact {
            original_filename: filename.to_string(),
            stored_name,
            url,
        })
    }
}

/// Build a collision-resistant storage name for an upload.
fn storage_name(filename: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    match sanitized_extension(filename) {
        Some(ext) => format!("{token}.{ext}"),
        None => token,
    }
}

/// Extract a storage-safe extension: ASCII alphanumerics only, lowercased.
fn sanitized_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?;
    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_EXTENSION_LEN)
        .collect();
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// In-memory store recording every completed write.
    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put(&self, name: &str, mut payload: ByteStream<'_>) -> anyhow::Result<String> {
            let mut data = Vec::new();
            while let Some(chunk) = payload.next().await {
                data.extend_from_slice(&chunk?);
            }
            self.objects
                .lock()
                .unwrap()
                .push((name.to_string(), data));
            Ok(format!("mem://uploads/{name}"))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ObjectStore for FailingStore {
        async fn put(&self, _name: &str, _payload: ByteStream<'_>) -> anyhow::Result<String> {
            Err(anyhow!("disk full"))
        }
    }

    fn chunks(parts: &[&[u8]]) -> ByteStream<'static> {
        let parts: Vec<std::io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(parts).boxed()
    }

    #[tokio::test]
    async fn test_upload_streams_all_chunks() {
        let store = Arc::new(MemoryStore::default());
        let coordinator = UploadCoordinator::new(store.clone());

        let artifact = coordinator
            .upload("photo.PNG", chunks(&[b"abc", b"", b"def"]))
            .await
            .unwrap();

        assert_eq!(artifact.original_filename, "photo.PNG");
        assert!(artifact.stored_name.ends_with(".png"));
        assert_ne!(artifact.stored_name, "photo.PNG");
        assert_eq!(artifact.url, format!("mem://uploads/{}", artifact.stored_name));

        let objects = store.objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].1, b"abcdef");
    }

    #[tokio::test]
    async fn test_empty_payload_skips_store() {
        let store = Arc::new(MemoryStore::default());
        let coordinator = UploadCoordinator::new(store.clone());

        // A fully empty stream and a stream of only empty chunks both count
        // as empty.
        for payload in [chunks(&[]), chunks(&[b"", b""])] {
            match coordinator.upload("empty.txt", payload).await {
                Err(UploadError::EmptyPayload) => {}
                other => panic!("Expected EmptyPayload, got {other:?}"),
            }
        }
        assert!(store.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_same_filename_uploads_do_not_collide() {
        let store = Arc::new(MemoryStore::default());
        let coordinator = UploadCoordinator::new(store.clone());

        let (a, b) = tokio::join!(
            coordinator.upload("report.pdf", chunks(&[b"first"])),
            coordinator.upload("report.pdf", chunks(&[b"second"])),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.stored_name, b.stored_name);
        assert_ne!(a.url, b.url);
        assert_eq!(store.objects.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_aborted_payload_is_not_a_storage_failure() {
        let store = Arc::new(MemoryStore::default());
        let coordinator = UploadCoordinator::new(store.clone());

        // A client dropping mid-upload surfaces as a payload error, not as
        // a fault of the store.
        let payload = stream::iter([Err(std::io::Error::other("connection reset"))]).boxed();
        match coordinator.upload("a.txt", payload).await {
            Err(UploadError::Payload(e)) => {
                assert!(e.to_string().contains("connection reset"));
            }
            other => panic!("Expected Payload error, got {other:?}"),
        }
        assert!(store.objects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_propagates() {
        let coordinator = UploadCoordinator::new(Arc::new(FailingStore));
        match coordinator.upload("a.txt", chunks(&[b"x"])).await {
            Err(UploadError::Storage(e)) => assert!(e.to_string().contains("disk full")),
            other => panic!("Expected Storage error, got {other:?}"),
        }
    }

    #[test]
    fn test_storage_name_is_traversal_safe() {
        let name = storage_name("../../etc/passwd");
        assert!(!name.contains('/'));
        assert!(!name.contains(".."));

        // Hostile extensions are stripped down to safe characters.
        let name = storage_name("x.p/../g");
        assert!(!name.contains('/'));

        // No extension at all is fine.
        let name = storage_name("README");
        assert!(!name.contains('.'));
    }
}
