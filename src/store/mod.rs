pub mod db_store;
pub mod fs_store;

pub use db_store::DatabaseBlobStore;
pub use fs_store::FilesystemBlobStore;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::BlobBackendKind;
use crate::db::DatabaseConnection;
use crate::models::ContentId;

/// Durable binary storage keyed by content id.
///
/// Implementations must make `store` an overwrite, `read` return the exact
/// bytes that were stored, and `delete` tolerate absence.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist a payload, overwriting any existing blob for the id.
    async fn store(&self, content_id: &ContentId, data: Bytes) -> Result<()>;

    /// Read a payload back, `None` when absent.
    async fn read(&self, content_id: &ContentId) -> Result<Option<Bytes>>;

    /// Remove a payload. Absence is not an error.
    async fn delete(&self, content_id: &ContentId) -> Result<()>;

    /// Cheap existence check without materializing the payload.
    async fn contains(&self, content_id: &ContentId) -> Result<bool>;
}

/// Select a blob backend once at startup.
///
/// `Auto` probes the database connection and falls back to the filesystem
/// store when the database is unavailable. The choice is not re-checked per
/// call.
pub async fn select_backend(
    kind: BlobBackendKind,
    db: Option<DatabaseConnection>,
    data_dir: &Path,
) -> Result<Arc<dyn BlobStore>> {
    match kind {
        BlobBackendKind::Database => {
            let db = db.ok_or_else(|| {
                anyhow::anyhow!("Database blob backend requested but no database available")
            })?;
            info!("Using database blob store");
            Ok(Arc::new(DatabaseBlobStore::new(db)))
        }
        BlobBackendKind::Filesystem => {
            info!("Using filesystem blob store at {:?}", data_dir);
            Ok(Arc::new(FilesystemBlobStore::new(data_dir).await?))
        }
        BlobBackendKind::Auto => {
            if let Some(db) = db
                && db.ping().await.is_ok()
            {
                info!("Blob backend probe: database available");
                return Ok(Arc::new(DatabaseBlobStore::new(db)));
            }

            warn!("Blob backend probe: database unavailable, falling back to filesystem");
            Ok(Arc::new(FilesystemBlobStore::new(data_dir).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_auto_prefers_database() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let store = select_backend(
            BlobBackendKind::Auto,
            Some(db.get_connection()),
            temp_dir.path(),
        )
        .await
        .unwrap();

        // The selected backend must behave like a database store: a write is
        // visible through a second store created over the same connection.
        let id = ContentId::from("probe");
        store.store(&id, Bytes::from_static(b"x")).await.unwrap();

        let second = DatabaseBlobStore::new(db.get_connection());
        assert!(second.contains(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_auto_falls_back_to_filesystem() {
        let temp_dir = TempDir::new().unwrap();

        let store = select_backend(BlobBackendKind::Auto, None, temp_dir.path())
            .await
            .unwrap();

        let id = ContentId::from("probe");
        store.store(&id, Bytes::from_static(b"x")).await.unwrap();
        assert!(temp_dir.path().join(crate::constants::BLOB_DIR).exists());
    }

    #[tokio::test]
    async fn test_database_kind_requires_connection() {
        let temp_dir = TempDir::new().unwrap();
        let result = select_backend(BlobBackendKind::Database, None, temp_dir.path()).await;
        assert!(result.is_err());
    }
}
