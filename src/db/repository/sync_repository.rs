use super::{BaseRepository, Repository};
use crate::db::entities::{
    SyncItemStatus, SyncQueue, SyncQueueActiveModel, SyncQueueModel, sync_queue,
};
use crate::models::SyncAction;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, Order, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

/// Repository for the pending remote mutation queue
#[async_trait]
pub trait SyncRepository: Repository<SyncQueueModel> {
    /// Append a new pending action.
    async fn enqueue(&self, action: &SyncAction) -> Result<SyncQueueModel>;

    /// All pending items ordered by creation time.
    async fn get_pending(&self) -> Result<Vec<SyncQueueModel>>;

    /// Mark an item as syncing, stamping the attempt.
    async fn mark_syncing(&self, id: i32) -> Result<()>;

    /// Mark an item as successfully replayed.
    async fn mark_synced(&self, id: i32) -> Result<()>;

    /// Mark an item as failed with an error message.
    async fn mark_failed(&self, id: i32, error_message: &str) -> Result<()>;

    /// Failed items still within the attempt budget.
    async fn get_failed_retryable(&self, max_attempts: i32) -> Result<Vec<SyncQueueModel>>;

    /// Delete synced items older than the given age.
    async fn cleanup_synced(&self, days: i64) -> Result<u64>;

    /// Number of items still waiting for replay.
    async fn count_pending(&self) -> Result<u64>;

    /// When the most recent successful replay happened, `None` when nothing
    /// has synced yet.
    async fn latest_synced_at(&self) -> Result<Option<chrono::NaiveDateTime>>;

    /// Delete a queue item by ID.
    async fn delete_by_id(&self, id: i32) -> Result<()>;
}

#[derive(Debug)]
pub struct SyncRepositoryImpl {
    base: BaseRepository,
}

impl SyncRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl Repository<SyncQueueModel> for SyncRepositoryImpl {
    type Entity = SyncQueue;

    async fn find_by_id(&self, id: &str) -> Result<Option<SyncQueueModel>> {
        let id_parsed = id.parse::<i32>().unwrap_or(0);
        Ok(SyncQueue::find_by_id(id_parsed)
            .one(self.base.db.as_ref())
            .await?)
    }

    async fn find_all(&self) -> Result<Vec<SyncQueueModel>> {
        Ok(SyncQueue::find().all(self.base.db.as_ref()).await?)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id_parsed = id.parse::<i32>().unwrap_or(0);
        SyncQueue::delete_by_id(id_parsed)
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(SyncQueue::find().count(self.base.db.as_ref()).await?)
    }
}

#[async_trait]
impl SyncRepository for SyncRepositoryImpl {
    async fn enqueue(&self, action: &SyncAction) -> Result<SyncQueueModel> {
        let payload =
            serde_json::to_string(action).context("Failed to serialize sync action payload")?;

        let active_model = SyncQueueActiveModel {
            id: NotSet,
            action: Set(action.kind().to_string()),
            payload: Set(payload),
            created_at: Set(chrono::Utc::now().naive_utc()),
            last_attempt_at: Set(None),
            attempt_count: Set(0),
            error_message: Set(None),
            status: Set(SyncItemStatus::Pending.to_string()),
        };

        Ok(active_model.insert(self.base.db.as_ref()).await?)
    }

    async fn get_pending(&self) -> Result<Vec<SyncQueueModel>> {
        Ok(SyncQueue::find()
            .filter(sync_queue::Column::Status.eq(SyncItemStatus::Pending.to_string()))
            .order_by(sync_queue::Column::CreatedAt, Order::Asc)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn mark_syncing(&self, id: i32) -> Result<()> {
        if let Some(item) = SyncQueue::find_by_id(id).one(self.base.db.as_ref()).await? {
            let attempt_count = item.attempt_count;
            let mut active_model: SyncQueueActiveModel = item.into();
            active_model.status = Set(SyncItemStatus::Syncing.to_string());
            active_model.last_attempt_at = Set(Some(chrono::Utc::now().naive_utc()));
            active_model.attempt_count = Set(attempt_count + 1);
            active_model.update(self.base.db.as_ref()).await?;
        }
        Ok(())
    }

    async fn mark_synced(&self, id: i32) -> Result<()> {
        if let Some(item) = SyncQueue::find_by_id(id).one(self.base.db.as_ref()).await? {
            let mut active_model: SyncQueueActiveModel = item.into();
            active_model.status = Set(SyncItemStatus::Synced.to_string());
            active_model.error_message = Set(None);
            active_model.update(self.base.db.as_ref()).await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i32, error_message: &str) -> Result<()> {
        if let Some(item) = SyncQueue::find_by_id(id).one(self.base.db.as_ref()).await? {
            let mut active_model: SyncQueueActiveModel = item.into();
            active_model.status = Set(SyncItemStatus::Failed.to_string());
            active_model.error_message = Set(Some(error_message.to_string()));
            active_model.update(self.base.db.as_ref()).await?;
        }
        Ok(())
    }

    async fn get_failed_retryable(&self, max_attempts: i32) -> Result<Vec<SyncQueueModel>> {
        Ok(SyncQueue::find()
            .filter(sync_queue::Column::Status.eq(SyncItemStatus::Failed.to_string()))
            .filter(sync_queue::Column::AttemptCount.lt(max_attempts))
            .order_by(sync_queue::Column::LastAttemptAt, Order::Asc)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn cleanup_synced(&self, days: i64) -> Result<u64> {
        let cutoff_date = chrono::Utc::now().naive_utc() - chrono::Duration::days(days);

        let result = SyncQueue::delete_many()
            .filter(sync_queue::Column::Status.eq(SyncItemStatus::Synced.to_string()))
            .filter(sync_queue::Column::CreatedAt.lt(cutoff_date))
            .exec(self.base.db.as_ref())
            .await?;

        Ok(result.rows_affected)
    }

    async fn count_pending(&self) -> Result<u64> {
        Ok(SyncQueue::find()
            .filter(sync_queue::Column::Status.eq(SyncItemStatus::Pending.to_string()))
            .count(self.base.db.as_ref())
            .await?)
    }

    async fn latest_synced_at(&self) -> Result<Option<chrono::NaiveDateTime>> {
        let newest = SyncQueue::find()
            .filter(sync_queue::Column::Status.eq(SyncItemStatus::Synced.to_string()))
            .order_by(sync_queue::Column::LastAttemptAt, Order::Desc)
            .one(self.base.db.as_ref())
            .await?;

        Ok(newest.and_then(|item| item.last_attempt_at))
    }

    async fn delete_by_id(&self, id: i32) -> Result<()> {
        SyncQueue::delete_by_id(id)
            .exec(self.base.db.as_ref())
            .await?;
        Ok(())
    }
}
