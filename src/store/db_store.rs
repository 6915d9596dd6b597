use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use tracing::debug;

use super::BlobStore;
use crate::db::DatabaseConnection;
use crate::db::entities::{ContentBlob, ContentBlobActiveModel, content_blobs};
use crate::models::ContentId;

/// Blob store backed by a SQLite table, the embedded key-value variant.
#[derive(Debug)]
pub struct DatabaseBlobStore {
    db: DatabaseConnection,
}

impl DatabaseBlobStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BlobStore for DatabaseBlobStore {
    async fn store(&self, content_id: &ContentId, data: Bytes) -> Result<()> {
        // Replace, not duplicate: the content id is the primary key
        ContentBlob::delete_many()
            .filter(content_blobs::Column::ContentId.eq(content_id.as_str()))
            .exec(self.db.as_ref())
            .await
            .context("Failed to clear existing blob row")?;

        let size = data.len() as i64;
        let active_model = ContentBlobActiveModel {
            content_id: Set(content_id.as_str().to_string()),
            data: Set(data.to_vec()),
            size_bytes: Set(size),
            updated_at: Set(chrono::Utc::now().naive_utc()),
        };

        active_model
            .insert(self.db.as_ref())
            .await
            .context("Failed to insert blob row")?;

        debug!("Stored blob for {} ({} bytes)", content_id, size);
        Ok(())
    }

    async fn read(&self, content_id: &ContentId) -> Result<Option<Bytes>> {
        let row = ContentBlob::find_by_id(content_id.as_str())
            .one(self.db.as_ref())
            .await
            .context("Failed to read blob row")?;

        Ok(row.map(|model| Bytes::from(model.data)))
    }

    async fn delete(&self, content_id: &ContentId) -> Result<()> {
        ContentBlob::delete_many()
            .filter(content_blobs::Column::ContentId.eq(content_id.as_str()))
            .exec(self.db.as_ref())
            .await
            .context("Failed to delete blob row")?;

        Ok(())
    }

    async fn contains(&self, content_id: &ContentId) -> Result<bool> {
        use sea_orm::PaginatorTrait;

        let count = ContentBlob::find()
            .filter(content_blobs::Column::ContentId.eq(content_id.as_str()))
            .count(self.db.as_ref())
            .await?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn test_store() -> DatabaseBlobStore {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        DatabaseBlobStore::new(db.get_connection())
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let store = test_store().await;
        let id = ContentId::from("v1");

        let payload: Vec<u8> = (0..=255u8).collect();
        store.store(&id, Bytes::from(payload.clone())).await.unwrap();

        let read_back = store.read(&id).await.unwrap().unwrap();
        assert_eq!(read_back.as_ref(), payload.as_slice());
        assert!(store.contains(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let store = test_store().await;
        let id = ContentId::from("v1");

        store.store(&id, Bytes::from_static(b"first")).await.unwrap();
        store.store(&id, Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(
            store.read(&id).await.unwrap().unwrap().as_ref(),
            b"second"
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = test_store().await;
        let id = ContentId::from("ghost");

        store.delete(&id).await.unwrap();
        assert!(!store.contains(&id).await.unwrap());
        assert!(store.read(&id).await.unwrap().is_none());
    }
}
