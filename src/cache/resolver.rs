use anyhow::Result;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::metadata::MetadataStore;
use crate::models::ContentId;
use crate::store::BlobStore;

/// A consumable handle for an already-downloaded content item.
///
/// Must be released exactly once via [`LocalResolver::release`] (or dropped
/// as a [`ScopedContent`]) so the resolver can free the backing resource.
#[derive(Debug, Clone)]
pub struct LocalContent {
    handle_id: String,
    pub content_id: ContentId,
    pub data: Bytes,
    pub mime_type: String,
}

impl LocalContent {
    pub fn handle_id(&self) -> &str {
        &self.handle_id
    }
}

/// Bridges "this content is downloaded" and "here is something the UI can
/// play right now", without leaking handles.
pub struct LocalResolver {
    metadata: Arc<RwLock<MetadataStore>>,
    blobs: Arc<dyn BlobStore>,
    active: Arc<StdMutex<HashMap<String, ContentId>>>,
}

impl LocalResolver {
    pub fn new(metadata: Arc<RwLock<MetadataStore>>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            metadata,
            blobs,
            active: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Resolve a content id into a local handle.
    ///
    /// Returns `None` when metadata does not read `downloaded`, or when the
    /// blob is missing despite the metadata (evicted by the OS) — the caller
    /// must treat that as "not actually available offline" and prompt a
    /// re-download.
    pub async fn resolve(&self, content_id: &ContentId) -> Result<Option<LocalContent>> {
        let mime_type = {
            let metadata = self.metadata.read().await;
            match metadata.get(content_id) {
                Some(record) if record.is_downloaded() => record.mime_type.clone(),
                _ => return Ok(None),
            }
        };

        let Some(data) = self.blobs.read(content_id).await? else {
            warn!(
                "Metadata says {} is downloaded but the blob is missing",
                content_id
            );
            return Ok(None);
        };

        let handle = LocalContent {
            handle_id: uuid::Uuid::new_v4().to_string(),
            content_id: content_id.clone(),
            data,
            mime_type,
        };

        // Registered only after the last await, so a caller that abandons
        // the resolution mid-flight cannot leak a tracked handle.
        self.active
            .lock()
            .map_err(|_| anyhow::anyhow!("Handle registry poisoned"))?
            .insert(handle.handle_id.clone(), content_id.clone());

        debug!("Resolved {} into handle {}", content_id, handle.handle_id);
        Ok(Some(handle))
    }

    /// Resolve into an RAII guard that releases on drop, covering every exit
    /// path including early returns.
    pub async fn resolve_scoped(&self, content_id: &ContentId) -> Result<Option<ScopedContent>> {
        Ok(self.resolve(content_id).await?.map(|content| ScopedContent {
            content,
            registry: self.active.clone(),
        }))
    }

    /// Release a handle obtained from [`resolve`](Self::resolve). Releasing
    /// a handle twice is logged and otherwise ignored.
    pub fn release(&self, handle: &LocalContent) {
        let Ok(mut active) = self.active.lock() else {
            return;
        };

        if active.remove(&handle.handle_id).is_none() {
            warn!("Handle {} was already released", handle.handle_id);
        } else {
            debug!("Released handle {}", handle.handle_id);
        }
    }

    /// Number of live handles. Zero after every consumer has cleaned up.
    pub fn active_handles(&self) -> usize {
        self.active.lock().map(|active| active.len()).unwrap_or(0)
    }
}

/// RAII wrapper around a resolved handle.
pub struct ScopedContent {
    content: LocalContent,
    registry: Arc<StdMutex<HashMap<String, ContentId>>>,
}

impl ScopedContent {
    pub fn content(&self) -> &LocalContent {
        &self.content
    }
}

impl std::ops::Deref for ScopedContent {
    type Target = LocalContent;

    fn deref(&self) -> &Self::Target {
        &self.content
    }
}

impl Drop for ScopedContent {
    fn drop(&mut self) {
        if let Ok(mut active) = self.registry.lock() {
            active.remove(&self.content.handle_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::metadata::FileMetadata;
    use crate::models::ContentType;
    use crate::store::FilesystemBlobStore;
    use tempfile::TempDir;

    async fn test_resolver() -> (LocalResolver, Arc<RwLock<MetadataStore>>, Arc<dyn BlobStore>, TempDir)
    {
        let temp_dir = TempDir::new().unwrap();
        let metadata = Arc::new(RwLock::new(
            MetadataStore::load(temp_dir.path()).await.unwrap(),
        ));
        let blobs: Arc<dyn BlobStore> =
            Arc::new(FilesystemBlobStore::new(temp_dir.path()).await.unwrap());
        let resolver = LocalResolver::new(metadata.clone(), blobs.clone());
        (resolver, metadata, blobs, temp_dir)
    }

    async fn mark_downloaded(
        metadata: &Arc<RwLock<MetadataStore>>,
        blobs: &Arc<dyn BlobStore>,
        id: &ContentId,
        payload: &[u8],
    ) {
        blobs.store(id, Bytes::copy_from_slice(payload)).await.unwrap();

        let mut store = metadata.write().await;
        store
            .upsert(FileMetadata::new_downloading(
                id.clone(),
                ContentType::Video,
                "https://cdn.example.com/v1.mp4",
            ))
            .await
            .unwrap();
        store.mark_downloaded(id, payload.len() as u64).await.unwrap();
    }

    #[tokio::test]
    async fn test_resolve_never_downloaded_returns_none() {
        let (resolver, _metadata, _blobs, _temp_dir) = test_resolver().await;
        let result = resolver.resolve(&ContentId::from("ghost")).await.unwrap();
        assert!(result.is_none());
        assert_eq!(resolver.active_handles(), 0);
    }

    #[tokio::test]
    async fn test_resolve_and_release() {
        let (resolver, metadata, blobs, _temp_dir) = test_resolver().await;
        let id = ContentId::from("v1");
        mark_downloaded(&metadata, &blobs, &id, b"payload").await;

        let handle = resolver.resolve(&id).await.unwrap().unwrap();
        assert_eq!(handle.data.as_ref(), b"payload");
        assert_eq!(handle.mime_type, "video/mp4");
        assert_eq!(resolver.active_handles(), 1);

        resolver.release(&handle);
        assert_eq!(resolver.active_handles(), 0);

        // Double release must not underflow or panic
        resolver.release(&handle);
        assert_eq!(resolver.active_handles(), 0);
    }

    #[tokio::test]
    async fn test_missing_blob_resolves_to_none() {
        let (resolver, metadata, blobs, _temp_dir) = test_resolver().await;
        let id = ContentId::from("v1");
        mark_downloaded(&metadata, &blobs, &id, b"payload").await;

        // Simulate eviction behind the metadata's back
        blobs.delete(&id).await.unwrap();

        assert!(resolver.resolve(&id).await.unwrap().is_none());
        assert_eq!(resolver.active_handles(), 0);
    }

    #[tokio::test]
    async fn test_scoped_handle_releases_on_drop() {
        let (resolver, metadata, blobs, _temp_dir) = test_resolver().await;
        let id = ContentId::from("v1");
        mark_downloaded(&metadata, &blobs, &id, b"payload").await;

        {
            let scoped = resolver.resolve_scoped(&id).await.unwrap().unwrap();
            assert_eq!(scoped.data.as_ref(), b"payload");
            assert_eq!(resolver.active_handles(), 1);
            // Early return path: the guard goes out of scope here
        }

        assert_eq!(resolver.active_handles(), 0);
    }

    #[tokio::test]
    async fn test_distinct_resolutions_get_distinct_handles() {
        let (resolver, metadata, blobs, _temp_dir) = test_resolver().await;
        let id = ContentId::from("v1");
        mark_downloaded(&metadata, &blobs, &id, b"payload").await;

        let a = resolver.resolve(&id).await.unwrap().unwrap();
        let b = resolver.resolve(&id).await.unwrap().unwrap();
        assert_ne!(a.handle_id(), b.handle_id());
        assert_eq!(resolver.active_handles(), 2);

        resolver.release(&a);
        resolver.release(&b);
        assert_eq!(resolver.active_handles(), 0);
    }
}
