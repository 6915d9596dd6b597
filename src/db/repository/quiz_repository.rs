use super::BaseRepository;
use crate::db::entities::{QuizAttemptActiveModel, QuizAttemptModel, QuizAttemptRow, quiz_attempts};
use crate::models::{QuizAttempt, QuizId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, Order, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;

/// Repository for the append-only quiz attempt history
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Append an attempt. Attempts are immutable once stored.
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttemptModel>;

    /// All attempts for a quiz, oldest first.
    async fn find_by_quiz(&self, quiz_id: &QuizId) -> Result<Vec<QuizAttemptModel>>;

    /// Highest score across all attempts for a quiz, `None` without attempts.
    async fn best_score(&self, quiz_id: &QuizId) -> Result<Option<u8>>;

    async fn count(&self) -> Result<u64>;
}

#[derive(Debug)]
pub struct QuizRepositoryImpl {
    base: BaseRepository,
}

impl QuizRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

#[async_trait]
impl QuizRepository for QuizRepositoryImpl {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<QuizAttemptModel> {
        let answers =
            serde_json::to_string(&attempt.answers).context("Failed to serialize quiz answers")?;

        let active_model = QuizAttemptActiveModel {
            id: NotSet,
            attempt_id: Set(attempt.id.clone()),
            quiz_id: Set(attempt.quiz_id.as_str().to_string()),
            answers: Set(answers),
            score: Set(i32::from(attempt.score.min(100))),
            passed: Set(attempt.passed),
            completed_at: Set(attempt.completed_at.naive_utc()),
        };

        Ok(active_model.insert(self.base.db.as_ref()).await?)
    }

    async fn find_by_quiz(&self, quiz_id: &QuizId) -> Result<Vec<QuizAttemptModel>> {
        Ok(QuizAttemptRow::find()
            .filter(quiz_attempts::Column::QuizId.eq(quiz_id.as_str()))
            .order_by(quiz_attempts::Column::CompletedAt, Order::Asc)
            .all(self.base.db.as_ref())
            .await?)
    }

    async fn best_score(&self, quiz_id: &QuizId) -> Result<Option<u8>> {
        let attempts = self.find_by_quiz(quiz_id).await?;

        Ok(attempts
            .iter()
            .map(|a| a.score.clamp(0, 100) as u8)
            .max())
    }

    async fn count(&self) -> Result<u64> {
        Ok(QuizAttemptRow::find().count(self.base.db.as_ref()).await?)
    }
}
