use anyhow::{Context, Result};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::metadata::{FileMetadata, MetadataStore};
use crate::config::DownloadConfig;
use crate::errors::OfflineError;
use crate::events::{EventBus, OfflineEvent};
use crate::models::{ContentId, ContentType};
use crate::store::BlobStore;

/// Streams remote content into the blob store while keeping the metadata
/// store the single source of truth for UI status.
///
/// State machine per content id: downloading -> downloaded | failed.
/// Re-invoking from a terminal state passes through downloading again. There
/// is no pause and no mid-transfer cancellation.
pub struct ContentDownloader {
    client: Client,
    metadata: Arc<RwLock<MetadataStore>>,
    blobs: Arc<dyn BlobStore>,
    events: EventBus,
    /// Content ids with a transfer currently running. At most one in-flight
    /// download per id.
    in_flight: Arc<StdMutex<HashSet<String>>>,
    transfer_permits: Arc<Semaphore>,
    transfer_timeout: Duration,
}

/// Removes the content id from the in-flight registry on every exit path.
struct InFlightGuard {
    registry: Arc<StdMutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(&self.key);
        }
    }
}

impl ContentDownloader {
    pub fn new(
        config: &DownloadConfig,
        metadata: Arc<RwLock<MetadataStore>>,
        blobs: Arc<dyn BlobStore>,
        events: EventBus,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            metadata,
            blobs,
            events,
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
            transfer_permits: Arc::new(Semaphore::new(config.max_concurrent_downloads as usize)),
            transfer_timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Download a remote resource and materialize it locally.
    ///
    /// On success the content is readable from the blob store and metadata
    /// reads `downloaded`. On failure metadata reads `failed` with a message
    /// and no blob is retrievable for the id.
    pub async fn download(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        url: &str,
    ) -> Result<()> {
        let _guard = self.register_in_flight(content_id)?;

        let _permit = self
            .transfer_permits
            .acquire()
            .await
            .context("Downloader shut down")?;

        info!("Starting download for {} from {}", content_id, url);

        // Status is visible to the UI before the first byte arrives
        {
            let mut metadata = self.metadata.write().await;
            metadata
                .upsert(FileMetadata::new_downloading(
                    content_id.clone(),
                    content_type,
                    url,
                ))
                .await?;
        }
        self.events.publish(OfflineEvent::DownloadStarted {
            content_id: content_id.clone(),
        });

        let result = timeout(self.transfer_timeout, self.transfer(content_id, url)).await;

        let outcome = match result {
            Ok(Ok(data)) => self.finish(content_id, data).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(OfflineError::Timeout(self.transfer_timeout.as_secs()).into()),
        };

        if let Err(e) = outcome {
            self.fail(content_id, &e).await;
            return Err(e);
        }

        info!("Download completed for {}", content_id);
        Ok(())
    }

    /// Retry a failed or stale download. Any existing blob and metadata for
    /// the id are cleared first so old bytes never mix with the new attempt.
    pub async fn retry(
        &self,
        content_id: &ContentId,
        content_type: ContentType,
        url: &str,
    ) -> Result<()> {
        {
            if self.is_in_flight(content_id) {
                return Err(OfflineError::AlreadyInProgress.into());
            }

            debug!("Clearing stale state for {} before retry", content_id);
            self.blobs.delete(content_id).await?;
            let mut metadata = self.metadata.write().await;
            metadata.remove(content_id).await?;
        }

        self.download(content_id, content_type, url).await
    }

    pub async fn is_downloaded(&self, content_id: &ContentId) -> bool {
        self.metadata.read().await.is_downloaded(content_id)
    }

    fn is_in_flight(&self, content_id: &ContentId) -> bool {
        self.in_flight
            .lock()
            .map(|registry| registry.contains(content_id.as_str()))
            .unwrap_or(false)
    }

    fn register_in_flight(&self, content_id: &ContentId) -> Result<InFlightGuard> {
        let mut registry = self
            .in_flight
            .lock()
            .map_err(|_| anyhow::anyhow!("In-flight registry poisoned"))?;

        if !registry.insert(content_id.as_str().to_string()) {
            return Err(OfflineError::AlreadyInProgress.into());
        }

        Ok(InFlightGuard {
            registry: self.in_flight.clone(),
            key: content_id.as_str().to_string(),
        })
    }

    /// Stream the response body, reporting integer progress percentages.
    /// Without a Content-Length the percentage stays at 0 until completion.
    async fn transfer(&self, content_id: &ContentId, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send HTTP request")?;

        if !response.status().is_success() {
            return Err(OfflineError::Http(response.status().as_u16()).into());
        }

        let total_size = response.content_length();
        debug!(
            "Streaming {} (content length: {:?})",
            content_id, total_size
        );

        let mut stream = response.bytes_stream();
        let mut data: Vec<u8> = Vec::with_capacity(total_size.unwrap_or(0) as usize);
        let mut last_percent = 0u8;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.context("Failed to read chunk from response")?;
            data.extend_from_slice(&chunk);

            if let Some(total) = total_size
                && total > 0
            {
                let percent = ((data.len() as u64 * 100) / total).min(100) as u8;
                if percent > last_percent {
                    last_percent = percent;
                    self.report_progress(content_id, percent).await;
                }
            }
        }

        Ok(data)
    }

    async fn report_progress(&self, content_id: &ContentId, percent: u8) {
        {
            let mut metadata = self.metadata.write().await;
            if let Err(e) = metadata.set_progress(content_id, percent).await {
                warn!("Failed to persist progress for {}: {}", content_id, e);
            }
        }

        self.events.publish(OfflineEvent::DownloadProgress {
            content_id: content_id.clone(),
            percent,
        });
    }

    /// Hand the complete payload to the blob store, then write the terminal
    /// metadata record. A store failure rolls back to the failed path.
    async fn finish(&self, content_id: &ContentId, data: Vec<u8>) -> Result<()> {
        let size_bytes = data.len() as u64;

        self.blobs
            .store(content_id, Bytes::from(data))
            .await
            .context("Failed to persist downloaded content")?;

        {
            let mut metadata = self.metadata.write().await;
            metadata.mark_downloaded(content_id, size_bytes).await?;
        }

        self.events.publish(OfflineEvent::DownloadCompleted {
            content_id: content_id.clone(),
            size_bytes,
        });

        Ok(())
    }

    /// Terminal failure write. No partial blob survives.
    async fn fail(&self, content_id: &ContentId, error: &anyhow::Error) {
        error!("Download failed for {}: {:#}", content_id, error);

        if let Err(e) = self.blobs.delete(content_id).await {
            warn!("Failed to clear partial blob for {}: {}", content_id, e);
        }

        {
            let mut metadata = self.metadata.write().await;
            if let Err(e) = metadata.mark_failed(content_id, &format!("{:#}", error)).await {
                warn!("Failed to record download failure for {}: {}", content_id, e);
            }
        }

        self.events.publish(OfflineEvent::DownloadFailed {
            content_id: content_id.clone(),
            error: format!("{:#}", error),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DownloadStatus;
    use crate::store::FilesystemBlobStore;
    use tempfile::TempDir;

    async fn test_downloader() -> (ContentDownloader, EventBus, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let metadata = Arc::new(RwLock::new(
            MetadataStore::load(temp_dir.path()).await.unwrap(),
        ));
        let blobs: Arc<dyn BlobStore> =
            Arc::new(FilesystemBlobStore::new(temp_dir.path()).await.unwrap());
        let events = EventBus::new(512);

        let downloader = ContentDownloader::new(
            &DownloadConfig::default(),
            metadata,
            blobs,
            events.clone(),
        )
        .unwrap();

        (downloader, events, temp_dir)
    }

    #[tokio::test]
    async fn test_download_success_writes_terminal_metadata() {
        let (downloader, _events, _temp_dir) = test_downloader().await;
        let mut server = mockito::Server::new_async().await;
        let body: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

        let mock = server
            .mock("GET", "/lessons/intro.mp4")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let id = ContentId::from("v1");
        downloader
            .download(
                &id,
                ContentType::Video,
                &format!("{}/lessons/intro.mp4", server.url()),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(downloader.is_downloaded(&id).await);

        let metadata = downloader.metadata.read().await;
        let record = metadata.get(&id).unwrap();
        assert_eq!(record.status, DownloadStatus::Downloaded);
        assert_eq!(record.size_bytes, body.len() as u64);
        assert_eq!(record.progress, 100);
        assert_eq!(record.file_name, "intro.mp4");

        drop(metadata);
        let stored = downloader.blobs.read(&id).await.unwrap().unwrap();
        assert_eq!(stored.as_ref(), body.as_slice());
    }

    #[tokio::test]
    async fn test_progress_events_are_monotone_and_end_at_100() {
        let (downloader, events, _temp_dir) = test_downloader().await;
        let mut subscriber = events.subscribe();
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", "/v1.mp4")
            .with_status(200)
            .with_body(vec![7u8; 256 * 1024])
            .create_async()
            .await;

        let id = ContentId::from("v1");
        downloader
            .download(&id, ContentType::Video, &format!("{}/v1.mp4", server.url()))
            .await
            .unwrap();

        let mut percents = Vec::new();
        let mut completed = false;
        while let Some(event) = subscriber.try_recv().unwrap() {
            match event {
                OfflineEvent::DownloadProgress { percent, .. } => percents.push(percent),
                OfflineEvent::DownloadCompleted { .. } => completed = true,
                _ => {}
            }
        }

        assert!(completed);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percents.last().copied(), Some(100));
    }

    #[tokio::test]
    async fn test_http_error_leaves_failed_metadata_and_no_blob() {
        let (downloader, _events, _temp_dir) = test_downloader().await;
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", "/v1.mp4")
            .with_status(500)
            .create_async()
            .await;

        let id = ContentId::from("v1");
        let result = downloader
            .download(&id, ContentType::Video, &format!("{}/v1.mp4", server.url()))
            .await;

        assert!(result.is_err());
        assert!(!downloader.is_downloaded(&id).await);

        let metadata = downloader.metadata.read().await;
        let record = metadata.get(&id).unwrap();
        assert_eq!(record.status, DownloadStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("500"));

        drop(metadata);
        assert!(downloader.blobs.read(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_leaves_failed_metadata() {
        let (downloader, _events, _temp_dir) = test_downloader().await;

        let id = ContentId::from("v1");
        let result = downloader
            // Nothing listens on port 1, the connection is refused immediately
            .download(&id, ContentType::Video, "http://127.0.0.1:1/v1.mp4")
            .await;

        assert!(result.is_err());

        let metadata = downloader.metadata.read().await;
        let record = metadata.get(&id).unwrap();
        assert_eq!(record.status, DownloadStatus::Failed);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn test_retry_clears_stale_state_then_succeeds() {
        let (downloader, _events, _temp_dir) = test_downloader().await;
        let mut server = mockito::Server::new_async().await;

        let failing = server
            .mock("GET", "/v1.mp4")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let id = ContentId::from("v1");
        let url = format!("{}/v1.mp4", server.url());
        assert!(downloader.download(&id, ContentType::Video, &url).await.is_err());
        failing.assert_async().await;

        let succeeding = server
            .mock("GET", "/v1.mp4")
            .with_status(200)
            .with_body(b"fresh bytes".to_vec())
            .create_async()
            .await;

        downloader.retry(&id, ContentType::Video, &url).await.unwrap();
        succeeding.assert_async().await;

        assert!(downloader.is_downloaded(&id).await);
        let stored = downloader.blobs.read(&id).await.unwrap().unwrap();
        assert_eq!(stored.as_ref(), b"fresh bytes");
    }

    #[tokio::test]
    async fn test_second_download_for_same_id_fails_fast() {
        let (downloader, _events, _temp_dir) = test_downloader().await;

        let id = ContentId::from("v1");
        let _guard = downloader.register_in_flight(&id).unwrap();

        let result = downloader
            .download(&id, ContentType::Video, "http://192.0.2.1/v1.mp4")
            .await;
        assert!(result.unwrap_err().to_string().contains("already in progress"));
    }

    #[tokio::test]
    async fn test_in_flight_guard_releases_on_drop() {
        let (downloader, _events, _temp_dir) = test_downloader().await;
        let id = ContentId::from("v1");

        {
            let _guard = downloader.register_in_flight(&id).unwrap();
            assert!(downloader.is_in_flight(&id));
        }
        assert!(!downloader.is_in_flight(&id));
    }
}
