pub mod identifiers;

pub use identifiers::{ContentId, QuizId, TicketId, UserId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of a content item shared with the remote catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Video,
    Resource,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Video => "video",
            ContentType::Resource => "resource",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(ContentType::Video),
            "resource" => Ok(ContentType::Resource),
            _ => Err(format!("Invalid content type: {}", s)),
        }
    }
}

/// Download lifecycle state for a content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Downloading,
    Downloaded,
    Failed,
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::Downloading => write!(f, "downloading"),
            DownloadStatus::Downloaded => write!(f, "downloaded"),
            DownloadStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Display status for a content item derived from the downloaded index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OfflineStatus {
    OfflineReady,
    NeedsInternet,
    NotDownloaded,
}

/// Partial update merged into a learning progress row.
///
/// Fields left as `None` keep their current value; merge is last-write-wins
/// per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Playback position in seconds, video only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_position_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<u8>,
}

impl ProgressUpdate {
    /// The update written by `mark_completed`.
    pub fn completed_now() -> Self {
        Self {
            progress: Some(100),
            completed: Some(true),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }
}

/// A single graded quiz attempt. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: String,
    pub quiz_id: QuizId,
    /// Index-aligned to the quiz questions.
    pub answers: Vec<String>,
    /// 0-100.
    pub score: u8,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
}

/// Support ticket filed while offline, carried through the sync queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketPayload {
    pub ticket_id: TicketId,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Message appended to an existing support ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketMessagePayload {
    pub ticket_id: TicketId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Typed payload of a queued remote mutation.
///
/// One variant per action kind so the flush worker dispatches without
/// runtime shape-guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncAction {
    Download {
        content_id: ContentId,
        content_type: ContentType,
        downloaded_at: DateTime<Utc>,
    },
    Progress {
        content_id: ContentId,
        content_type: ContentType,
        update: ProgressUpdate,
    },
    Quiz {
        attempt: QuizAttempt,
    },
    Ticket {
        ticket: TicketPayload,
    },
    TicketMessage {
        message: TicketMessagePayload,
    },
}

impl SyncAction {
    /// Stable kind string stored alongside the JSON payload.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncAction::Download { .. } => "download",
            SyncAction::Progress { .. } => "progress",
            SyncAction::Quiz { .. } => "quiz",
            SyncAction::Ticket { .. } => "ticket",
            SyncAction::TicketMessage { .. } => "ticket_message",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parse() {
        assert_eq!("video".parse::<ContentType>().unwrap(), ContentType::Video);
        assert_eq!(
            "resource".parse::<ContentType>().unwrap(),
            ContentType::Resource
        );
        assert!("audio".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_sync_action_roundtrip() {
        let action = SyncAction::Progress {
            content_id: ContentId::from("v1"),
            content_type: ContentType::Video,
            update: ProgressUpdate {
                progress: Some(50),
                ..Default::default()
            },
        };

        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("\"action\":\"progress\""));

        let parsed: SyncAction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, action);
        assert_eq!(parsed.kind(), "progress");
    }

    #[test]
    fn test_completed_now_sets_all_completion_fields() {
        let update = ProgressUpdate::completed_now();
        assert_eq!(update.progress, Some(100));
        assert_eq!(update.completed, Some(true));
        assert!(update.completed_at.is_some());
        assert!(update.last_position_secs.is_none());
    }
}
