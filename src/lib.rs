//! Offline content cache and sync engine for an e-learning client.
//!
//! Persists large binary lesson assets locally across two storage backends,
//! tracks per-item download lifecycle, mirrors learning progress and quiz
//! history into SQLite, and drains a durable queue of pending mutations
//! against the hosted backend whenever connectivity returns.

pub mod cache;
pub mod config;
pub mod constants;
pub mod db;
pub mod errors;
pub mod events;
pub mod models;
pub mod offline;
pub mod remote;
pub mod service;
pub mod shell;
pub mod store;
pub mod workers;

pub use cache::{ContentCacheHandle, FileMetadata, LocalContent};
pub use config::SatchelConfig;
pub use errors::OfflineError;
pub use events::{EventBus, OfflineEvent};
pub use models::{ContentId, ContentType, DownloadStatus, OfflineStatus};
pub use offline::OfflineStore;
pub use service::OfflineService;

/// Initialize tracing for embedders that don't bring their own subscriber.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("satchel=debug")),
        )
        .init();
}
