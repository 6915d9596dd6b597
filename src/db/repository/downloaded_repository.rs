use super::{BaseRepository, Repository};
use crate::db::entities::{
    DownloadedContent, DownloadedContentActiveModel, DownloadedContentModel, downloaded_content,
};
use crate::models::{ContentId, ContentType};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, Set,
};
use std::sync::Arc;

/// Repository for the offline-readiness index
#[async_trait]
pub trait DownloadedRepository: Repository<DownloadedContentModel> {
    /// Insert an index entry for a content id, replacing any existing one.
    async fn replace(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
    ) -> Result<DownloadedContentModel>;

    async fn find_by_content_id(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<DownloadedContentModel>>;

    /// Remove the index entry. Absence is not an error.
    async fn remove_by_content_id(&self, content_id: &ContentId) -> Result<()>;

    /// Stamp `last_accessed` with the current time.
    async fn touch_accessed(&self, content_id: &ContentId) -> Result<()>;

    async fn is_downloaded(&self, content_id: &ContentId) -> Result<bool>;
}

#[derive(Debug)]
pub struct DownloadedRepositoryImpl {
    base: BaseRepository,
}

impl DownloadedRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl Repository<DownloadedContentModel> for DownloadedRepositoryImpl {
    type Entity = DownloadedContent;

    async fn find_by_id(&self, id: &str) -> Result<Option<DownloadedContentModel>> {
        let id_parsed = id.parse::<i32>().unwrap_or(0);
        Ok(DownloadedContent::find_by_id(id_parsed)
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<DownloadedContentModel>> {
        Ok(DownloadedContent::find().all(self.base.db.as_ref()).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id_parsed = id.parse::<i32>().unwrap_or(0);
        DownloadedContent::delete_by_id(id_parsed)
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(DownloadedContent::find()
            .count(self.base.db.as_ref())
            .await?)
    }
}

#[async_trait]
impl DownloadedRepository for DownloadedRepositoryImpl {
    async fn replace(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
    ) -> Result<DownloadedContentModel> {
        // Old entry for the same id is replaced, not duplicated
        DownloadedContent::delete_many()
            .filter(downloaded_content::Column::ContentId.eq(content_id.as_str()))
            .exec(self.base.db.as_ref())
            .await?;

        let active_model = DownloadedContentActiveModel {
            id: NotSet,
            content_id: Set(content_id.as_str().to_string()),
            content_type: Set(content_type.as_str().to_string()),
            downloaded_at: Set(chrono::Utc::now().naive_utc()),
            last_accessed: Set(None),
        };

        Ok(active_model.insert(self.base.db.as_ref()).await?)
    }

    async fn find_by_content_id(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<DownloadedContentModel>> {
        Ok(DownloadedContent::find()
            .filter(downloaded_content::Column::ContentId.eq(content_id.as_str()))
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn remove_by_content_id(&self, content_id: &ContentId) -> Result<()> {
        DownloadedContent::delete_many()
            .filter(downloaded_content::Column::ContentId.eq(content_id.as_str()))
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    async fn touch_accessed(&self, content_id: &ContentId) -> Result<()> {
        if let Some(model) = self.find_by_content_id(content_id).await? {
            let mut active_model: DownloadedContentActiveModel = model.into();
            active_model.last_accessed = Set(Some(chrono::Utc::now().naive_utc()));
            active_model.update(self.base.db.as_ref()).await?;
        }
        Ok(())
    }

    async fn is_downloaded(&self, content_id: &ContentId) -> Result<bool> {
        Ok(self.find_by_content_id(content_id).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn test_repo() -> DownloadedRepositoryImpl {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        DownloadedRepositoryImpl::new(db.get_connection())
    }

    #[tokio::test]
    async fn test_replace_does_not_duplicate() {
        let repo = test_repo().await;
        let id = ContentId::from("v1");

        repo.replace(&id, ContentType::Video).await.unwrap();
        repo.replace(&id, ContentType::Video).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.is_downloaded(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let repo = test_repo().await;
        let id = ContentId::from("missing");

        // Removing something that was never added must not error
        repo.remove_by_content_id(&id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);

        repo.replace(&id, ContentType::Resource).await.unwrap();
        repo.remove_by_content_id(&id).await.unwrap();
        repo.remove_by_content_id(&id).await.unwrap();
        assert!(!repo.is_downloaded(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_touch_accessed_sets_timestamp() {
        let repo = test_repo().await;
        let id = ContentId::from("v1");

        repo.replace(&id, ContentType::Video).await.unwrap();
        repo.touch_accessed(&id).await.unwrap();

        let model = repo.find_by_content_id(&id).await.unwrap().unwrap();
        assert!(model.last_accessed.is_some());
    }
}
