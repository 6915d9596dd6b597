pub mod downloaded_repository;
pub mod progress_repository;
pub mod quiz_repository;
pub mod sync_repository;

use anyhow::Result;
use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;

/// Base repository trait that all repositories should implement
#[async_trait]
pub trait Repository<T> {
    type Entity: EntityTrait;

    /// Find an entity by ID
    async fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Find all entities
    async fn find_all(&self) -> Result<Vec<T>>;

    /// Delete an entity by ID
    async fn delete(&self, id: &str) -> Result<()>;

    /// Count all entities
    async fn count(&self) -> Result<u64>;
}

/// Base repository implementation holder
#[derive(Debug)]
pub struct BaseRepository {
    pub db: Arc<DatabaseConnection>,
}

impl BaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

// Re-export specific repositories
pub use downloaded_repository::{DownloadedRepository, DownloadedRepositoryImpl};
pub use progress_repository::{ProgressRepository, ProgressRepositoryImpl};
pub use quiz_repository::{QuizRepository, QuizRepositoryImpl};
pub use sync_repository::{SyncRepository, SyncRepositoryImpl};
