use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use super::downloader::ContentDownloader;
use super::metadata::{FileMetadata, MetadataStore};
use super::resolver::{LocalContent, LocalResolver};
use crate::config::DownloadConfig;
use crate::events::EventBus;
use crate::models::{ContentId, ContentType};
use crate::store::BlobStore;

/// Commands for the content cache
#[derive(Debug)]
pub enum ContentCacheCommand {
    /// Download a content item for offline use
    Download {
        content_id: ContentId,
        content_type: ContentType,
        url: String,
        respond_to: mpsc::UnboundedSender<Result<()>>,
    },
    /// Clear any stale state for a content item and download it fresh
    Retry {
        content_id: ContentId,
        content_type: ContentType,
        url: String,
        respond_to: mpsc::UnboundedSender<Result<()>>,
    },
    /// Remove a content item from the cache
    Remove {
        content_id: ContentId,
        respond_to: mpsc::UnboundedSender<Result<()>>,
    },
    /// Check whether a content item is fully downloaded
    IsDownloaded {
        content_id: ContentId,
        respond_to: mpsc::UnboundedSender<bool>,
    },
    /// Get the download record for a content item
    Metadata {
        content_id: ContentId,
        respond_to: mpsc::UnboundedSender<Option<FileMetadata>>,
    },
    /// List all download records
    ListDownloads {
        respond_to: mpsc::UnboundedSender<Vec<FileMetadata>>,
    },
    /// Resolve a downloaded item into a consumable local handle
    Resolve {
        content_id: ContentId,
        respond_to: mpsc::UnboundedSender<Result<Option<LocalContent>>>,
    },
    /// Release a handle obtained through Resolve
    Release {
        handle: LocalContent,
        respond_to: mpsc::UnboundedSender<()>,
    },
    /// Shutdown the cache
    Shutdown,
}

/// Offline content cache: owns the metadata store, blob store, downloader
/// and resolver, and serializes command handling through one task.
pub struct ContentCache {
    metadata: Arc<RwLock<MetadataStore>>,
    blobs: Arc<dyn BlobStore>,
    downloader: Arc<ContentDownloader>,
    resolver: Arc<LocalResolver>,
    command_receiver: mpsc::UnboundedReceiver<ContentCacheCommand>,
}

impl ContentCache {
    pub fn new(
        config: &DownloadConfig,
        metadata: Arc<RwLock<MetadataStore>>,
        blobs: Arc<dyn BlobStore>,
        events: EventBus,
    ) -> Result<(ContentCacheHandle, Self)> {
        let downloader = Arc::new(ContentDownloader::new(
            config,
            metadata.clone(),
            blobs.clone(),
            events,
        )?);
        let resolver = Arc::new(LocalResolver::new(metadata.clone(), blobs.clone()));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = ContentCacheHandle::new(cmd_tx);

        let cache = Self {
            metadata,
            blobs,
            downloader,
            resolver,
            command_receiver: cmd_rx,
        };

        Ok((handle, cache))
    }

    pub fn resolver(&self) -> Arc<LocalResolver> {
        self.resolver.clone()
    }

    /// Run the content cache event loop
    pub async fn run(mut self) {
        info!("ContentCache: starting event loop");

        while let Some(command) = self.command_receiver.recv().await {
            match command {
                ContentCacheCommand::Download {
                    content_id,
                    content_type,
                    url,
                    respond_to,
                } => {
                    // Downloads run as their own tasks so a long transfer
                    // never blocks command handling
                    let downloader = self.downloader.clone();
                    tokio::spawn(async move {
                        let result = downloader.download(&content_id, content_type, &url).await;
                        let _ = respond_to.send(result);
                    });
                }
                ContentCacheCommand::Retry {
                    content_id,
                    content_type,
                    url,
                    respond_to,
                } => {
                    let downloader = self.downloader.clone();
                    tokio::spawn(async move {
                        let result = downloader.retry(&content_id, content_type, &url).await;
                        let _ = respond_to.send(result);
                    });
                }
                ContentCacheCommand::Remove {
                    content_id,
                    respond_to,
                } => {
                    let result = self.remove(&content_id).await;
                    let _ = respond_to.send(result);
                }
                ContentCacheCommand::IsDownloaded {
                    content_id,
                    respond_to,
                } => {
                    let result = self.metadata.read().await.is_downloaded(&content_id);
                    let _ = respond_to.send(result);
                }
                ContentCacheCommand::Metadata {
                    content_id,
                    respond_to,
                } => {
                    let result = self.metadata.read().await.get(&content_id).cloned();
                    let _ = respond_to.send(result);
                }
                ContentCacheCommand::ListDownloads { respond_to } => {
                    let result = self.metadata.read().await.list();
                    let _ = respond_to.send(result);
                }
                ContentCacheCommand::Resolve {
                    content_id,
                    respond_to,
                } => {
                    let resolver = self.resolver.clone();
                    tokio::spawn(async move {
                        let result = resolver.resolve(&content_id).await;
                        let _ = respond_to.send(result);
                    });
                }
                ContentCacheCommand::Release { handle, respond_to } => {
                    self.resolver.release(&handle);
                    let _ = respond_to.send(());
                }
                ContentCacheCommand::Shutdown => {
                    info!("ContentCache: shutting down");
                    break;
                }
            }
        }
    }

    /// Delete blob and metadata for a content id. Idempotent.
    async fn remove(&self, content_id: &ContentId) -> Result<()> {
        self.blobs.delete(content_id).await?;

        let mut metadata = self.metadata.write().await;
        metadata.remove(content_id).await?;

        debug!("Removed cached content for {}", content_id);
        Ok(())
    }
}

/// Handle for communicating with the content cache
#[derive(Debug, Clone)]
pub struct ContentCacheHandle {
    command_sender: mpsc::UnboundedSender<ContentCacheCommand>,
}

impl ContentCacheHandle {
    pub fn new(command_sender: mpsc::UnboundedSender<ContentCacheCommand>) -> Self {
        Self { command_sender }
    }

    /// Download a content item, resolving when the transfer finishes
    pub async fn download(
        &self,
        content_id: ContentId,
        content_type: ContentType,
        url: String,
    ) -> Result<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(ContentCacheCommand::Download {
                content_id,
                content_type,
                url,
                respond_to: sender,
            })
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No response from content cache"))?
    }

    /// Clear stale state for a content item and download it fresh
    pub async fn retry(
        &self,
        content_id: ContentId,
        content_type: ContentType,
        url: String,
    ) -> Result<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(ContentCacheCommand::Retry {
                content_id,
                content_type,
                url,
                respond_to: sender,
            })
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No response from content cache"))?
    }

    /// Remove a content item from the cache
    pub async fn remove(&self, content_id: ContentId) -> Result<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(ContentCacheCommand::Remove {
                content_id,
                respond_to: sender,
            })
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No response from content cache"))?
    }

    /// Check whether a content item is fully downloaded
    pub async fn is_downloaded(&self, content_id: ContentId) -> Result<bool> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(ContentCacheCommand::IsDownloaded {
                content_id,
                respond_to: sender,
            })
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No response from content cache"))
    }

    /// Get the download record for a content item
    pub async fn metadata(&self, content_id: ContentId) -> Result<Option<FileMetadata>> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(ContentCacheCommand::Metadata {
                content_id,
                respond_to: sender,
            })
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No response from content cache"))
    }

    /// List all download records
    pub async fn list_downloads(&self) -> Result<Vec<FileMetadata>> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(ContentCacheCommand::ListDownloads { respond_to: sender })
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No response from content cache"))
    }

    /// Resolve a downloaded item into a local handle. `None` means the item
    /// is not servable offline and the UI should offer a download instead.
    pub async fn resolve(&self, content_id: ContentId) -> Result<Option<LocalContent>> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(ContentCacheCommand::Resolve {
                content_id,
                respond_to: sender,
            })
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No response from content cache"))?
    }

    /// Release a handle obtained through [`resolve`](Self::resolve)
    pub async fn release(&self, handle: LocalContent) -> Result<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        self.command_sender
            .send(ContentCacheCommand::Release {
                handle,
                respond_to: sender,
            })
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))?;

        receiver
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("No response from content cache"))
    }

    /// Shutdown the content cache
    pub fn shutdown(&self) -> Result<()> {
        self.command_sender
            .send(ContentCacheCommand::Shutdown)
            .map_err(|_| anyhow::anyhow!("Content cache disconnected"))
    }
}
