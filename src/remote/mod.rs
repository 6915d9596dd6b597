pub mod http;

pub use http::HttpBackend;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    ContentId, ContentType, ProgressUpdate, QuizAttempt, TicketMessagePayload, TicketPayload,
};

/// The narrow surface of the hosted backend this subsystem consumes.
///
/// The backend itself (auth, catalog CRUD, realtime, AI endpoints) is an
/// external collaborator; only the write-back calls driven by the sync queue
/// and the health probe live behind this trait.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Record that a content item was downloaded on this device.
    async fn record_download(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        downloaded_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Upsert the authenticated user's progress row for a content item.
    async fn upsert_progress(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        update: &ProgressUpdate,
    ) -> Result<()>;

    /// Append a quiz attempt row.
    async fn insert_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<()>;

    /// File a support ticket.
    async fn create_ticket(&self, ticket: &TicketPayload) -> Result<()>;

    /// Append a message to an existing ticket.
    async fn add_ticket_message(&self, message: &TicketMessagePayload) -> Result<()>;

    /// Cheap reachability probe used by the connectivity monitor.
    async fn health(&self) -> Result<()>;
}
