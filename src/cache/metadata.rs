use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs as tokio_fs;
use tracing::{debug, info, warn};

use crate::constants::METADATA_FILE;
use crate::models::{ContentId, ContentType, DownloadStatus};

/// Download record for one content item.
///
/// At most one record exists per content id. The record determines whether a
/// local blob should exist: `Downloaded` means the blob is present and
/// servable, anything else means it must not be served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub content_id: ContentId,
    pub content_type: ContentType,
    pub file_name: String,
    pub mime_type: String,
    /// Total bytes once complete; 0 while downloading.
    pub size_bytes: u64,
    pub status: DownloadStatus,
    /// 0-100, meaningful only while downloading.
    pub progress: u8,
    /// Set only on success.
    pub downloaded_at: Option<DateTime<Utc>>,
    /// Set only on failure.
    pub error: Option<String>,
}

impl FileMetadata {
    /// Fresh record for a download that is about to start. File name and
    /// mime type are derived from the source URL.
    pub fn new_downloading(content_id: ContentId, content_type: ContentType, url: &str) -> Self {
        let file_name = file_name_from_url(url);
        let mime_type = mime_type_for(&file_name).to_string();

        Self {
            content_id,
            content_type,
            file_name,
            mime_type,
            size_bytes: 0,
            status: DownloadStatus::Downloading,
            progress: 0,
            downloaded_at: None,
            error: None,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.status == DownloadStatus::Downloaded
    }
}

/// Derive a file name from the last path segment of a URL.
pub fn file_name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("content.bin")
        .to_string()
}

/// Map a file extension to a mime type. Unknown extensions fall back to an
/// opaque binary type.
pub fn mime_type_for(file_name: &str) -> &'static str {
    let extension = file_name.rsplit('.').next().unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain",
        "html" => "text/html",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// Persisted index of download records.
///
/// Loaded into memory at init and written back to a JSON sidecar after each
/// mutation.
#[derive(Debug)]
pub struct MetadataStore {
    metadata_file: PathBuf,
    entries: HashMap<String, FileMetadata>,
}

impl MetadataStore {
    /// Load the store from the data directory, starting empty when no
    /// sidecar exists yet.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let metadata_file = data_dir.join(METADATA_FILE);

        tokio_fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let mut entries = if metadata_file.exists() {
            Self::read_sidecar(&metadata_file).await.unwrap_or_else(|e| {
                warn!(
                    "Failed to load download metadata: {}, starting with empty index",
                    e
                );
                HashMap::new()
            })
        } else {
            HashMap::new()
        };

        // A record still marked downloading belongs to an interrupted
        // session; no complete blob can exist for it.
        let mut interrupted = 0;
        for metadata in entries.values_mut() {
            if metadata.status == DownloadStatus::Downloading {
                metadata.status = DownloadStatus::Failed;
                metadata.progress = 0;
                metadata.error = Some("Download interrupted".to_string());
                interrupted += 1;
            }
        }

        let store = Self {
            metadata_file,
            entries,
        };

        if interrupted > 0 {
            warn!("Marked {} interrupted downloads as failed", interrupted);
            store.save().await?;
        }

        info!(
            "Download metadata loaded with {} entries",
            store.entries.len()
        );
        Ok(store)
    }

    async fn read_sidecar(path: &Path) -> Result<HashMap<String, FileMetadata>> {
        let contents = tokio_fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read metadata file {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse metadata file {:?}", path))
    }

    async fn save(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize download metadata")?;

        tokio_fs::write(&self.metadata_file, contents)
            .await
            .with_context(|| format!("Failed to write metadata file {:?}", self.metadata_file))
    }

    pub fn get(&self, content_id: &ContentId) -> Option<&FileMetadata> {
        self.entries.get(content_id.as_str())
    }

    pub fn list(&self) -> Vec<FileMetadata> {
        self.entries.values().cloned().collect()
    }

    pub fn is_downloaded(&self, content_id: &ContentId) -> bool {
        self.get(content_id).is_some_and(FileMetadata::is_downloaded)
    }

    /// Insert or replace the record for a content id.
    pub async fn upsert(&mut self, metadata: FileMetadata) -> Result<()> {
        self.entries
            .insert(metadata.content_id.as_str().to_string(), metadata);
        self.save().await
    }

    /// Remove the record for a content id. Absence is not an error.
    pub async fn remove(&mut self, content_id: &ContentId) -> Result<Option<FileMetadata>> {
        let removed = self.entries.remove(content_id.as_str());
        if removed.is_some() {
            self.save().await?;
            debug!("Removed metadata record for {}", content_id);
        }
        Ok(removed)
    }

    /// Update progress on a downloading record.
    pub async fn set_progress(&mut self, content_id: &ContentId, progress: u8) -> Result<()> {
        if let Some(metadata) = self.entries.get_mut(content_id.as_str()) {
            metadata.progress = progress.min(100);
            self.save().await?;
        }
        Ok(())
    }

    /// Terminal success write: size, progress 100, timestamp.
    pub async fn mark_downloaded(&mut self, content_id: &ContentId, size_bytes: u64) -> Result<()> {
        if let Some(metadata) = self.entries.get_mut(content_id.as_str()) {
            metadata.status = DownloadStatus::Downloaded;
            metadata.size_bytes = size_bytes;
            metadata.progress = 100;
            metadata.downloaded_at = Some(Utc::now());
            metadata.error = None;
            self.save().await?;
        }
        Ok(())
    }

    /// Terminal failure write: status + message, no timestamp.
    pub async fn mark_failed(&mut self, content_id: &ContentId, error: &str) -> Result<()> {
        if let Some(metadata) = self.entries.get_mut(content_id.as_str()) {
            metadata.status = DownloadStatus::Failed;
            metadata.error = Some(error.to_string());
            self.save().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://cdn.example.com/lessons/intro.mp4?token=abc"),
            "intro.mp4"
        );
        assert_eq!(file_name_from_url("https://example.com/"), "content.bin");
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for("intro.mp4"), "video/mp4");
        assert_eq!(mime_type_for("notes.PDF"), "application/pdf");
        assert_eq!(mime_type_for("mystery"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_upsert_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = MetadataStore::load(temp_dir.path()).await.unwrap();
        let id = ContentId::from("v1");

        let metadata = FileMetadata::new_downloading(
            id.clone(),
            ContentType::Video,
            "https://cdn.example.com/v1.mp4",
        );
        store.upsert(metadata).await.unwrap();

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, DownloadStatus::Downloading);
        assert_eq!(record.mime_type, "video/mp4");
        assert_eq!(record.size_bytes, 0);

        assert!(store.remove(&id).await.unwrap().is_some());
        assert!(store.remove(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_downloaded_sets_terminal_fields() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = MetadataStore::load(temp_dir.path()).await.unwrap();
        let id = ContentId::from("v1");

        store
            .upsert(FileMetadata::new_downloading(
                id.clone(),
                ContentType::Video,
                "https://cdn.example.com/v1.mp4",
            ))
            .await
            .unwrap();

        store.mark_downloaded(&id, 10_485_760).await.unwrap();

        let record = store.get(&id).unwrap();
        assert!(record.is_downloaded());
        assert_eq!(record.size_bytes, 10_485_760);
        assert_eq!(record.progress, 100);
        assert!(record.downloaded_at.is_some());
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reload() {
        let temp_dir = TempDir::new().unwrap();
        let id = ContentId::from("v1");

        {
            let mut store = MetadataStore::load(temp_dir.path()).await.unwrap();
            store
                .upsert(FileMetadata::new_downloading(
                    id.clone(),
                    ContentType::Resource,
                    "https://cdn.example.com/notes.pdf",
                ))
                .await
                .unwrap();
            store.mark_downloaded(&id, 42).await.unwrap();
        }

        let store = MetadataStore::load(temp_dir.path()).await.unwrap();
        assert!(store.is_downloaded(&id));
        assert_eq!(store.get(&id).unwrap().file_name, "notes.pdf");
    }

    #[tokio::test]
    async fn test_interrupted_downloads_become_failed_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let id = ContentId::from("v1");

        {
            let mut store = MetadataStore::load(temp_dir.path()).await.unwrap();
            store
                .upsert(FileMetadata::new_downloading(
                    id.clone(),
                    ContentType::Video,
                    "https://cdn.example.com/v1.mp4",
                ))
                .await
                .unwrap();
            // Simulated crash: record stays in downloading state
        }

        let store = MetadataStore::load(temp_dir.path()).await.unwrap();
        let record = store.get(&id).unwrap();
        assert_eq!(record.status, DownloadStatus::Failed);
        assert!(record.error.is_some());
    }
}
