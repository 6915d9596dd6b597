use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tracing::info;

use crate::cache::{ContentCache, ContentCacheHandle, MetadataStore};
use crate::config::SatchelConfig;
use crate::db::Database;
use crate::events::{EventBus, EventSubscriber};
use crate::offline::{OfflineStore, SyncWorker, SyncWorkerHandle};
use crate::remote::{HttpBackend, RemoteBackend};
use crate::shell::ShellCache;
use crate::store::select_backend;
use crate::workers::{BackendProbe, ConnectivityMonitor};

/// Fully wired offline subsystem.
///
/// Owns the content cache actor, the offline state store, the connectivity
/// monitor and the sync flush worker. The embedding shell keeps one instance
/// per session and drives it through the handles exposed here.
pub struct OfflineService {
    cache: ContentCacheHandle,
    store: Arc<OfflineStore>,
    shell: ShellCache,
    sync: SyncWorkerHandle,
    events: EventBus,
    online_rx: watch::Receiver<bool>,
}

impl OfflineService {
    /// Load persisted state and start the background tasks.
    pub async fn start(config: SatchelConfig) -> Result<Self> {
        config.validate()?;
        let data_dir = config.data_dir()?;
        info!("Starting offline service with data dir {:?}", data_dir);

        let events = EventBus::default();

        let database = Database::open(&data_dir).await?;
        database.migrate().await?;
        let connection = database.get_connection();

        let metadata = Arc::new(RwLock::new(MetadataStore::load(&data_dir).await?));
        let blobs = select_backend(
            config.storage.backend,
            Some(connection.clone()),
            &data_dir,
        )
        .await?;

        let (cache_handle, cache) = ContentCache::new(
            &config.download,
            metadata,
            blobs,
            events.clone(),
        )?;
        tokio::spawn(cache.run());

        let store = Arc::new(OfflineStore::new(connection.clone()));

        let backend: Arc<dyn RemoteBackend> = Arc::new(
            HttpBackend::new(&config.remote).context("Failed to create backend client")?,
        );

        let (online_rx, monitor) = ConnectivityMonitor::new(
            Arc::new(BackendProbe::new(backend.clone())),
            Duration::from_secs(config.remote.probe_interval_secs),
            events.clone(),
        );
        tokio::spawn(monitor.run());

        let (sync_handle, sync_worker) = SyncWorker::new(
            connection,
            backend,
            config.sync.clone(),
            events.clone(),
            online_rx.clone(),
        );
        tokio::spawn(sync_worker.run());

        let shell = ShellCache::new(config.shell.clone(), &config.remote.base_url)
            .context("Failed to create shell cache")?;

        Ok(Self {
            cache: cache_handle,
            store,
            shell,
            sync: sync_handle,
            events,
            online_rx,
        })
    }

    /// Handle for downloads, removal and local resolution.
    pub fn cache(&self) -> &ContentCacheHandle {
        &self.cache
    }

    /// Downloaded index, progress, quiz history and the pending queue.
    pub fn store(&self) -> &OfflineStore {
        &self.store
    }

    /// Application shell cache.
    pub fn shell(&self) -> &ShellCache {
        &self.shell
    }

    /// Whether the backend is currently reachable.
    pub fn is_online(&self) -> bool {
        *self.online_rx.borrow()
    }

    /// Subscribe to download, connectivity and sync events.
    pub fn subscribe(&self) -> EventSubscriber {
        self.events.subscribe()
    }

    /// Request an immediate sync queue flush.
    pub fn flush_sync_queue(&self) -> Result<()> {
        self.sync.flush_now()
    }

    /// Stop the background tasks.
    pub fn shutdown(&self) -> Result<()> {
        self.cache.shutdown()?;
        self.sync.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = SatchelConfig::default();
        config.storage = StorageConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            ..StorageConfig::default()
        };
        // Nothing listens here; the service still starts offline
        config.remote.base_url = "http://127.0.0.1:1/".to_string();

        let service = OfflineService::start(config).await.unwrap();
        assert!(!service.is_online());
        assert_eq!(service.store().sync_pending_count().await.unwrap(), 0);

        service.shutdown().unwrap();
    }
}
