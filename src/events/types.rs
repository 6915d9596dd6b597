use serde::{Deserialize, Serialize};

use crate::models::ContentId;

/// Events published by the offline subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OfflineEvent {
    DownloadStarted {
        content_id: ContentId,
    },
    DownloadProgress {
        content_id: ContentId,
        /// 0-100.
        percent: u8,
    },
    DownloadCompleted {
        content_id: ContentId,
        size_bytes: u64,
    },
    DownloadFailed {
        content_id: ContentId,
        error: String,
    },
    ConnectivityChanged {
        online: bool,
    },
    SyncStarted {
        pending: usize,
    },
    SyncItemFailed {
        item_id: i32,
        error: String,
        attempt_count: i32,
    },
    SyncCompleted {
        synced: usize,
        failed: usize,
    },
}

/// Discriminant used for filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    DownloadStarted,
    DownloadProgress,
    DownloadCompleted,
    DownloadFailed,
    ConnectivityChanged,
    SyncStarted,
    SyncItemFailed,
    SyncCompleted,
}

impl OfflineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            OfflineEvent::DownloadStarted { .. } => EventKind::DownloadStarted,
            OfflineEvent::DownloadProgress { .. } => EventKind::DownloadProgress,
            OfflineEvent::DownloadCompleted { .. } => EventKind::DownloadCompleted,
            OfflineEvent::DownloadFailed { .. } => EventKind::DownloadFailed,
            OfflineEvent::ConnectivityChanged { .. } => EventKind::ConnectivityChanged,
            OfflineEvent::SyncStarted { .. } => EventKind::SyncStarted,
            OfflineEvent::SyncItemFailed { .. } => EventKind::SyncItemFailed,
            OfflineEvent::SyncCompleted { .. } => EventKind::SyncCompleted,
        }
    }
}
