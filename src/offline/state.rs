use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use crate::db::DatabaseConnection;
use crate::db::entities::{DownloadedContentModel, LearningProgressModel};
use crate::db::repository::{
    DownloadedRepository, DownloadedRepositoryImpl, ProgressRepository, ProgressRepositoryImpl,
    QuizRepository, QuizRepositoryImpl, Repository, SyncRepository, SyncRepositoryImpl,
};
use crate::models::{
    ContentId, ContentType, OfflineStatus, ProgressUpdate, QuizAttempt, QuizId, SyncAction,
    TicketId, TicketMessagePayload, TicketPayload,
};

/// Durable source of truth for the downloaded-content index, learning
/// progress, quiz history and the pending sync queue.
///
/// Every mutation writes locally and enqueues a sync action; only the flush
/// worker talks to the remote backend. Immediate UI feedback comes from the
/// local write.
pub struct OfflineStore {
    downloads: DownloadedRepositoryImpl,
    progress: ProgressRepositoryImpl,
    quizzes: QuizRepositoryImpl,
    queue: SyncRepositoryImpl,
}

impl OfflineStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            downloads: DownloadedRepositoryImpl::new(db.clone()),
            progress: ProgressRepositoryImpl::new(db.clone()),
            quizzes: QuizRepositoryImpl::new(db.clone()),
            queue: SyncRepositoryImpl::new(db),
        }
    }

    /// Index a content item as offline-ready. Idempotent per content id:
    /// an existing entry is replaced, not duplicated.
    pub async fn mark_downloaded(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
    ) -> Result<DownloadedContentModel> {
        let model = self.downloads.replace(content_id, content_type).await?;

        self.queue
            .enqueue(&SyncAction::Download {
                content_id: content_id.clone(),
                content_type,
                downloaded_at: model.downloaded_at.and_utc(),
            })
            .await?;

        debug!("Marked {} as downloaded", content_id);
        Ok(model)
    }

    /// Drop the local index entry. Remote history is not revoked.
    pub async fn remove_download(&self, content_id: &ContentId) -> Result<()> {
        self.downloads.remove_by_content_id(content_id).await
    }

    pub async fn is_downloaded(&self, content_id: &ContentId) -> Result<bool> {
        self.downloads.is_downloaded(content_id).await
    }

    pub async fn list_downloads(&self) -> Result<Vec<DownloadedContentModel>> {
        self.downloads.find_all().await
    }

    /// Stamp a content item as opened just now.
    pub async fn touch_accessed(&self, content_id: &ContentId) -> Result<()> {
        self.downloads.touch_accessed(content_id).await
    }

    /// Merge a partial progress update into the local row and queue it for
    /// replay against the backend.
    pub async fn update_progress(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        update: ProgressUpdate,
    ) -> Result<LearningProgressModel> {
        let model = self
            .progress
            .merge_update(content_id, content_type, &update)
            .await?;

        self.queue
            .enqueue(&SyncAction::Progress {
                content_id: content_id.clone(),
                content_type,
                update,
            })
            .await?;

        Ok(model)
    }

    /// Mark a content item fully completed (triggered around the ~90%
    /// watched/viewed threshold by the caller).
    pub async fn mark_completed(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
    ) -> Result<LearningProgressModel> {
        self.update_progress(content_id, content_type, ProgressUpdate::completed_now())
            .await
    }

    pub async fn get_progress(
        &self,
        content_id: &ContentId,
    ) -> Result<Option<LearningProgressModel>> {
        self.progress.find_by_content_id(content_id).await
    }

    /// Append a quiz attempt. The stored attempt (with generated id and
    /// timestamp) is returned and queued for replay.
    pub async fn save_quiz_attempt(
        &self,
        quiz_id: &QuizId,
        answers: Vec<String>,
        score: u8,
        passed: bool,
    ) -> Result<QuizAttempt> {
        let attempt = QuizAttempt {
            id: uuid::Uuid::new_v4().to_string(),
            quiz_id: quiz_id.clone(),
            answers,
            score: score.min(100),
            passed,
            completed_at: Utc::now(),
        };

        self.quizzes.insert_attempt(&attempt).await?;
        self.queue
            .enqueue(&SyncAction::Quiz {
                attempt: attempt.clone(),
            })
            .await?;

        Ok(attempt)
    }

    /// Highest score across all attempts for a quiz, `None` without
    /// attempts.
    pub async fn get_best_quiz_score(&self, quiz_id: &QuizId) -> Result<Option<u8>> {
        self.quizzes.best_score(quiz_id).await
    }

    pub async fn get_quiz_attempts(&self, quiz_id: &QuizId) -> Result<Vec<QuizAttempt>> {
        let models = self.quizzes.find_by_quiz(quiz_id).await?;
        models.iter().map(|m| m.to_attempt()).collect()
    }

    /// Derive the display status for a content item. Purely a function of
    /// the downloaded index and the caller's flag.
    pub async fn get_offline_status(
        &self,
        content_id: &ContentId,
        requires_internet: bool,
    ) -> Result<OfflineStatus> {
        if self.downloads.is_downloaded(content_id).await? {
            Ok(OfflineStatus::OfflineReady)
        } else if requires_internet {
            Ok(OfflineStatus::NeedsInternet)
        } else {
            Ok(OfflineStatus::NotDownloaded)
        }
    }

    /// File a support ticket while offline; carried to the backend by the
    /// flush worker.
    pub async fn file_ticket(&self, subject: &str, body: &str) -> Result<TicketPayload> {
        let ticket = TicketPayload {
            ticket_id: TicketId::new(uuid::Uuid::new_v4().to_string()),
            subject: subject.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
        };

        self.queue
            .enqueue(&SyncAction::Ticket {
                ticket: ticket.clone(),
            })
            .await?;

        Ok(ticket)
    }

    /// Append a message to an existing ticket.
    pub async fn add_ticket_message(&self, ticket_id: &TicketId, body: &str) -> Result<()> {
        self.queue
            .enqueue(&SyncAction::TicketMessage {
                message: TicketMessagePayload {
                    ticket_id: ticket_id.clone(),
                    body: body.to_string(),
                    created_at: Utc::now(),
                },
            })
            .await?;

        Ok(())
    }

    /// Number of queued mutations not yet replayed, for UI display.
    pub async fn sync_pending_count(&self) -> Result<u64> {
        self.queue.count_pending().await
    }

    /// When the most recent queued mutation reached the backend, `None`
    /// until the first successful flush.
    pub async fn last_synced_at(&self) -> Result<Option<chrono::DateTime<Utc>>> {
        Ok(self
            .queue
            .latest_synced_at()
            .await?
            .map(|naive| naive.and_utc()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn test_store() -> OfflineStore {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        OfflineStore::new(db.get_connection())
    }

    #[tokio::test]
    async fn test_mark_downloaded_is_idempotent_and_enqueues() {
        let store = test_store().await;
        let id = ContentId::from("v1");

        store.mark_downloaded(&id, ContentType::Video).await.unwrap();
        store.mark_downloaded(&id, ContentType::Video).await.unwrap();

        assert_eq!(store.list_downloads().await.unwrap().len(), 1);
        // Each call records its own sync action
        assert_eq!(store.sync_pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_remove_download_keeps_queue_untouched() {
        let store = test_store().await;
        let id = ContentId::from("v1");

        store.mark_downloaded(&id, ContentType::Video).await.unwrap();
        store.remove_download(&id).await.unwrap();
        store.remove_download(&id).await.unwrap();

        assert!(!store.is_downloaded(&id).await.unwrap());
        assert_eq!(store.sync_pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_completed_survives_later_partial_update() {
        let store = test_store().await;
        let id = ContentId::from("v1");

        store.mark_completed(&id, ContentType::Video).await.unwrap();
        let model = store
            .update_progress(
                &id,
                ContentType::Video,
                ProgressUpdate {
                    progress: Some(50),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(model.progress, 50);
        assert!(model.completed);
    }

    #[tokio::test]
    async fn test_best_quiz_score() {
        let store = test_store().await;
        let quiz = QuizId::from("quiz_42");

        store
            .save_quiz_attempt(&quiz, vec!["a".into()], 60, false)
            .await
            .unwrap();
        let second = store
            .save_quiz_attempt(&quiz, vec!["b".into()], 85, true)
            .await
            .unwrap();

        assert!(!second.id.is_empty());
        assert_eq!(store.get_best_quiz_score(&quiz).await.unwrap(), Some(85));
        assert_eq!(
            store
                .get_best_quiz_score(&QuizId::from("quiz_unseen"))
                .await
                .unwrap(),
            None
        );
        assert_eq!(store.get_quiz_attempts(&quiz).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_offline_status_derivation() {
        let store = test_store().await;
        let id = ContentId::from("v1");

        assert_eq!(
            store.get_offline_status(&id, false).await.unwrap(),
            OfflineStatus::NotDownloaded
        );
        assert_eq!(
            store.get_offline_status(&id, true).await.unwrap(),
            OfflineStatus::NeedsInternet
        );

        store.mark_downloaded(&id, ContentType::Video).await.unwrap();

        // Downloaded wins regardless of the requires-internet flag
        assert_eq!(
            store.get_offline_status(&id, true).await.unwrap(),
            OfflineStatus::OfflineReady
        );
        assert_eq!(
            store.get_offline_status(&id, false).await.unwrap(),
            OfflineStatus::OfflineReady
        );
    }

    #[tokio::test]
    async fn test_ticket_actions_enqueue() {
        let store = test_store().await;

        let ticket = store
            .file_ticket("Playback issue", "Video v1 stutters offline")
            .await
            .unwrap();
        store
            .add_ticket_message(&ticket.ticket_id, "It also affects v2")
            .await
            .unwrap();

        assert_eq!(store.sync_pending_count().await.unwrap(), 2);
    }
}
