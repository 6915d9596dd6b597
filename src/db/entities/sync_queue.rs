use anyhow::{Context, Result};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::SyncAction;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Action kind: 'download' | 'progress' | 'quiz' | 'ticket' | 'ticket_message'
    pub action: String,
    /// Tagged JSON payload matching the action kind.
    pub payload: String,
    pub created_at: DateTime,
    pub last_attempt_at: Option<DateTime>,
    pub attempt_count: i32,
    pub error_message: Option<String>,
    pub status: String, // 'pending' | 'syncing' | 'synced' | 'failed'
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle status for queue items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncItemStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl std::fmt::Display for SyncItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncItemStatus::Pending => write!(f, "pending"),
            SyncItemStatus::Syncing => write!(f, "syncing"),
            SyncItemStatus::Synced => write!(f, "synced"),
            SyncItemStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SyncItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncItemStatus::Pending),
            "syncing" => Ok(SyncItemStatus::Syncing),
            "synced" => Ok(SyncItemStatus::Synced),
            "failed" => Ok(SyncItemStatus::Failed),
            _ => Err(format!("Invalid sync status: {}", s)),
        }
    }
}

impl Model {
    /// Decode the stored payload into its typed action.
    pub fn get_action(&self) -> Result<SyncAction> {
        serde_json::from_str(&self.payload).context("Failed to parse sync queue payload")
    }

    /// Get the status as an enum
    pub fn get_status(&self) -> Result<SyncItemStatus, String> {
        self.status.parse()
    }

    /// Check if this item can still be retried
    pub fn is_retryable(&self, max_attempts: i32) -> bool {
        self.status == SyncItemStatus::Failed.to_string() && self.attempt_count < max_attempts
    }
}
