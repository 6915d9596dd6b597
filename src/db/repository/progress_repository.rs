use super::BaseRepository;
use crate::db::entities::{
    LearningProgress, LearningProgressActiveModel, LearningProgressModel, learning_progress,
};
use crate::models::{ContentId, ContentType, ProgressUpdate};
use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter, Set,
};
use std::sync::Arc;

/// Repository for per-item learning progress
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn find_by_content_id(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<LearningProgressModel>>;

    /// Merge a partial update into the row for this content id, creating a
    /// default row first when none exists. Merge is last-write-wins per
    /// field; fields absent from the update keep their current value.
    async fn merge_update(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        update: &ProgressUpdate,
    ) -> Result<LearningProgressModel>;

    async fn find_all(&self) -> Result<Vec<LearningProgressModel>>;
}

#[derive(Debug)]
pub struct ProgressRepositoryImpl {
    base: BaseRepository,
}

impl ProgressRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl ProgressRepository for ProgressRepositoryImpl {
    async fn find_by_content_id(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<LearningProgressModel>> {
        Ok(LearningProgress::find()
            .filter(learning_progress::Column::ContentId.eq(content_id.as_str()))
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn merge_update(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        update: &ProgressUpdate,
    ) -> Result<LearningProgressModel> {
        let now = chrono::Utc::now().naive_utc();

        let mut active_model: LearningProgressActiveModel =
            match self.find_by_content_id(content_id).await? {
                Some(existing) => existing.into(),
                None => LearningProgressActiveModel {
                    id: NotSet,
                    content_id: Set(content_id.as_str().to_string()),
                    content_type: Set(content_type.as_str().to_string()),
                    progress: Set(0),
                    completed: Set(false),
                    completed_at: Set(None),
                    last_position_secs: Set(None),
                    quiz_completed: Set(false),
                    quiz_score: Set(None),
                    updated_at: Set(now),
                },
            };

        if let Some(progress) = update.progress {
            active_model.progress = Set(i32::from(progress.min(100)));
        }
        if let Some(completed) = update.completed {
            active_model.completed = Set(completed);
        }
        if let Some(completed_at) = update.completed_at {
            active_model.completed_at = Set(Some(completed_at.naive_utc()));
        }
        if let Some(position) = update.last_position_secs {
            active_model.last_position_secs = Set(Some(position));
        }
        if let Some(quiz_completed) = update.quiz_completed {
            active_model.quiz_completed = Set(quiz_completed);
        }
        if let Some(quiz_score) = update.quiz_score {
            active_model.quiz_score = Set(Some(i32::from(quiz_score.min(100))));
        }
        active_model.updated_at = Set(now);

        let model = if active_model.id.is_not_set() {
            active_model.insert(self.base.db.as_ref()).await?
        } else {
            active_model.update(self.base.db.as_ref()).await?
        };

        Ok(model)
    }

    async fn find_all(&self) -> Result<Vec<LearningProgressModel>> {
        Ok(LearningProgress::find().all(self.base.db.as_ref()).await?)
    }
}
