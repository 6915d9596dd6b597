use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs as tokio_fs;
use tracing::debug;

use super::BlobStore;
use crate::constants::BLOB_DIR;
use crate::models::ContentId;

/// Filesystem-backed blob store.
///
/// Payloads are written base64-encoded, one file per content id. The
/// encode/decode roundtrip is byte-exact, which media playback depends on.
#[derive(Debug)]
pub struct FilesystemBlobStore {
    blob_dir: PathBuf,
}

impl FilesystemBlobStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let blob_dir = data_dir.join(BLOB_DIR);

        tokio_fs::create_dir_all(&blob_dir)
            .await
            .with_context(|| format!("Failed to create blob directory {:?}", blob_dir))?;

        Ok(Self { blob_dir })
    }

    fn blob_path(&self, content_id: &ContentId) -> PathBuf {
        let filename = format!(
            "{}.b64",
            content_id
                .as_str()
                .replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
        );
        self.blob_dir.join(filename)
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn store(&self, content_id: &ContentId, data: Bytes) -> Result<()> {
        let path = self.blob_path(content_id);
        let encoded = BASE64.encode(&data);

        tokio_fs::write(&path, encoded)
            .await
            .with_context(|| format!("Failed to write blob file {:?}", path))?;

        debug!(
            "Stored blob for {} ({} bytes raw) at {:?}",
            content_id,
            data.len(),
            path
        );
        Ok(())
    }

    async fn read(&self, content_id: &ContentId) -> Result<Option<Bytes>> {
        let path = self.blob_path(content_id);

        if !path.exists() {
            return Ok(None);
        }

        let encoded = tokio_fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read blob file {:?}", path))?;

        let data = BASE64
            .decode(encoded.trim_end())
            .with_context(|| format!("Failed to decode blob file {:?}", path))?;

        Ok(Some(Bytes::from(data)))
    }

    async fn delete(&self, content_id: &ContentId) -> Result<()> {
        let path = self.blob_path(content_id);

        if path.exists() {
            tokio_fs::remove_file(&path)
                .await
                .with_context(|| format!("Failed to remove blob file {:?}", path))?;
            debug!("Deleted blob for {}", content_id);
        }

        Ok(())
    }

    async fn contains(&self, content_id: &ContentId) -> Result<bool> {
        Ok(self.blob_path(content_id).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (FilesystemBlobStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FilesystemBlobStore::new(temp_dir.path()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_roundtrip_is_byte_exact() {
        let (store, _temp_dir) = test_store().await;
        let id = ContentId::from("v1");

        // Every byte value, repeated across chunk boundaries
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        store.store(&id, Bytes::from(payload.clone())).await.unwrap();

        let read_back = store.read(&id).await.unwrap().unwrap();
        assert_eq!(read_back.as_ref(), payload.as_slice());
    }

    #[tokio::test]
    async fn test_on_disk_representation_is_text_safe() {
        let (store, temp_dir) = test_store().await;
        let id = ContentId::from("v1");

        store
            .store(&id, Bytes::from_static(&[0u8, 255, 10, 13]))
            .await
            .unwrap();

        let path = temp_dir.path().join(BLOB_DIR).join("v1.b64");
        let on_disk = std::fs::read(&path).unwrap();
        assert!(on_disk.iter().all(|b| b.is_ascii()));
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let (store, _temp_dir) = test_store().await;
        let id = ContentId::from("v1");

        store.store(&id, Bytes::from_static(b"first")).await.unwrap();
        store.store(&id, Bytes::from_static(b"second")).await.unwrap();

        let read_back = store.read(&id).await.unwrap().unwrap();
        assert_eq!(read_back.as_ref(), b"second");
    }

    #[tokio::test]
    async fn test_read_missing_returns_none() {
        let (store, _temp_dir) = test_store().await;
        assert!(store.read(&ContentId::from("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _temp_dir) = test_store().await;
        let id = ContentId::from("v1");

        store.delete(&id).await.unwrap();

        store.store(&id, Bytes::from_static(b"data")).await.unwrap();
        store.delete(&id).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(!store.contains(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_hostile_content_ids_are_sanitized() {
        let (store, _temp_dir) = test_store().await;
        let id = ContentId::from("a/b:c*d?e");

        store.store(&id, Bytes::from_static(b"data")).await.unwrap();
        assert!(store.contains(&id).await.unwrap());
        assert_eq!(
            store.read(&id).await.unwrap().unwrap().as_ref(),
            b"data"
        );
    }
}
