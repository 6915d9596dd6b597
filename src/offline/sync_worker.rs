use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::db::DatabaseConnection;
use crate::db::entities::SyncQueueModel;
use crate::db::repository::{SyncRepository, SyncRepositoryImpl};
use crate::events::{EventBus, OfflineEvent};
use crate::models::SyncAction;
use crate::remote::RemoteBackend;

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub synced: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub enum SyncWorkerCommand {
    /// Run a flush pass immediately
    FlushNow,
    /// Shutdown the worker
    Shutdown,
}

/// Drains the sync queue against the remote backend.
///
/// Each pending item's actual remote call is replayed; items are dequeued
/// only on success. Failures are retried with exponential backoff and
/// dropped with a warning once the attempt budget is exhausted. Triggered by
/// the offline-to-online connectivity edge and a periodic poll tick.
pub struct SyncWorker {
    queue: SyncRepositoryImpl,
    backend: Arc<dyn RemoteBackend>,
    config: SyncConfig,
    events: EventBus,
    online_rx: watch::Receiver<bool>,
    command_receiver: mpsc::UnboundedReceiver<SyncWorkerCommand>,
}

impl SyncWorker {
    pub fn new(
        db: DatabaseConnection,
        backend: Arc<dyn RemoteBackend>,
        config: SyncConfig,
        events: EventBus,
        online_rx: watch::Receiver<bool>,
    ) -> (SyncWorkerHandle, Self) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let worker = Self {
            queue: SyncRepositoryImpl::new(db),
            backend,
            config,
            events,
            online_rx,
            command_receiver: cmd_rx,
        };

        (SyncWorkerHandle::new(cmd_tx), worker)
    }

    /// Run the worker loop until shutdown.
    pub async fn run(mut self) {
        info!("SyncWorker: starting");
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut was_online = *self.online_rx.borrow();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *self.online_rx.borrow() {
                        self.flush_once().await.ok();
                    } else {
                        debug!("Skipping flush tick while offline");
                    }
                }
                changed = self.online_rx.changed() => {
                    if changed.is_err() {
                        warn!("Connectivity channel closed, stopping sync worker");
                        break;
                    }
                    let online = *self.online_rx.borrow();
                    if online && !was_online {
                        info!("Connectivity restored, flushing sync queue");
                        self.flush_once().await.ok();
                    }
                    was_online = online;
                }
                command = self.command_receiver.recv() => {
                    match command {
                        Some(SyncWorkerCommand::FlushNow) => {
                            self.flush_once().await.ok();
                        }
                        Some(SyncWorkerCommand::Shutdown) | None => {
                            info!("SyncWorker: shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// One full flush pass: replay pending items, retry eligible failures,
    /// drop exhausted ones, clean up old synced rows.
    pub async fn flush_once(&self) -> Result<FlushSummary> {
        let mut summary = self.process_pending().await?;

        let retried = self.retry_failed().await?;
        summary.synced += retried.synced;
        summary.failed += retried.failed;
        summary.skipped += retried.skipped;

        self.drop_exhausted().await?;

        if let Err(e) = self.queue.cleanup_synced(self.config.cleanup_after_days).await {
            warn!("Failed to clean up synced queue rows: {}", e);
        }

        Ok(summary)
    }

    async fn process_pending(&self) -> Result<FlushSummary> {
        let pending = self.queue.get_pending().await?;
        if pending.is_empty() {
            debug!("No pending items in sync queue");
            return Ok(FlushSummary::default());
        }

        info!("Processing {} pending sync items", pending.len());
        self.events.publish(OfflineEvent::SyncStarted {
            pending: pending.len(),
        });

        let (items, superseded) = Self::deduplicate(pending);
        let mut summary = FlushSummary::default();

        // Superseded progress items are covered by a newer one in the same
        // batch; dequeue them without a remote call
        for item in superseded {
            debug!("Skipping superseded sync item {}", item.id);
            self.queue.mark_synced(item.id).await?;
            summary.skipped += 1;
        }

        for item in items {
            self.replay_item(&item, &mut summary).await;
        }

        info!(
            "Sync flush completed: {} synced, {} failed, {} superseded",
            summary.synced, summary.failed, summary.skipped
        );
        self.events.publish(OfflineEvent::SyncCompleted {
            synced: summary.synced,
            failed: summary.failed,
        });

        Ok(summary)
    }

    async fn replay_item(&self, item: &SyncQueueModel, summary: &mut FlushSummary) {
        if let Err(e) = self.queue.mark_syncing(item.id).await {
            error!("Failed to mark item {} as syncing: {}", item.id, e);
            return;
        }

        match self.dispatch(item).await {
            Ok(()) => {
                debug!("Synced queue item {}", item.id);
                if let Err(e) = self.queue.mark_synced(item.id).await {
                    error!("Failed to mark item {} as synced: {}", item.id, e);
                }
                summary.synced += 1;
            }
            Err(e) => {
                warn!("Failed to sync queue item {}: {:#}", item.id, e);
                let error_msg = format!("{:#}", e);
                if let Err(e) = self.queue.mark_failed(item.id, &error_msg).await {
                    error!("Failed to mark item {} as failed: {}", item.id, e);
                }
                summary.failed += 1;

                self.events.publish(OfflineEvent::SyncItemFailed {
                    item_id: item.id,
                    error: error_msg,
                    attempt_count: item.attempt_count + 1,
                });
            }
        }
    }

    /// Replay a single queue item's remote call.
    async fn dispatch(&self, item: &SyncQueueModel) -> Result<()> {
        match item.get_action()? {
            SyncAction::Download {
                content_id,
                content_type,
                downloaded_at,
            } => {
                self.backend
                    .record_download(&content_id, content_type, downloaded_at)
                    .await
            }
            SyncAction::Progress {
                content_id,
                content_type,
                update,
            } => {
                self.backend
                    .upsert_progress(&content_id, content_type, &update)
                    .await
            }
            SyncAction::Quiz { attempt } => self.backend.insert_quiz_attempt(&attempt).await,
            SyncAction::Ticket { ticket } => self.backend.create_ticket(&ticket).await,
            SyncAction::TicketMessage { message } => {
                self.backend.add_ticket_message(&message).await
            }
        }
    }

    /// Keep only the newest progress item per content id; everything else
    /// replays as-is. Returns (to_replay, superseded).
    fn deduplicate(items: Vec<SyncQueueModel>) -> (Vec<SyncQueueModel>, Vec<SyncQueueModel>) {
        let mut newest_progress: HashMap<String, i32> = HashMap::new();

        for item in &items {
            if let Ok(SyncAction::Progress { content_id, .. }) = item.get_action() {
                let entry = newest_progress
                    .entry(content_id.as_str().to_string())
                    .or_insert(item.id);
                if item.id > *entry {
                    *entry = item.id;
                }
            }
        }

        let mut to_replay = Vec::new();
        let mut superseded = Vec::new();

        for item in items {
            let is_superseded = match item.get_action() {
                Ok(SyncAction::Progress { content_id, .. }) => newest_progress
                    .get(content_id.as_str())
                    .is_some_and(|&newest| newest != item.id),
                _ => false,
            };

            if is_superseded {
                superseded.push(item);
            } else {
                to_replay.push(item);
            }
        }

        (to_replay, superseded)
    }

    async fn retry_failed(&self) -> Result<FlushSummary> {
        let failed = self.queue.get_failed_retryable(self.config.max_attempts).await?;
        let mut summary = FlushSummary::default();

        if failed.is_empty() {
            return Ok(summary);
        }

        info!("Retrying {} failed sync items", failed.len());

        for item in failed {
            let backoff = Self::calculate_backoff(&self.config, item.attempt_count);

            if let Some(last_attempt) = item.last_attempt_at {
                let elapsed = chrono::Utc::now().naive_utc() - last_attempt;
                let elapsed = Duration::from_secs(elapsed.num_seconds().max(0) as u64);

                if elapsed < backoff {
                    debug!(
                        "Skipping item {} - backoff not elapsed ({:?} < {:?})",
                        item.id, elapsed, backoff
                    );
                    continue;
                }
            }

            self.replay_item(&item, &mut summary).await;
        }

        Ok(summary)
    }

    /// Items past the attempt budget are dropped with a surfaced warning.
    async fn drop_exhausted(&self) -> Result<()> {
        use crate::db::repository::Repository;

        let all = self.queue.find_all().await?;
        for item in all {
            if item.get_status().ok() == Some(crate::db::entities::SyncItemStatus::Failed)
                && item.attempt_count >= self.config.max_attempts
            {
                warn!(
                    "Dropping sync item {} ({}) after {} attempts: {}",
                    item.id,
                    item.action,
                    item.attempt_count,
                    item.error_message.as_deref().unwrap_or("unknown error")
                );
                self.queue.delete_by_id(item.id).await?;
            }
        }

        Ok(())
    }

    /// Exponential backoff: base * 2^(attempts-1), capped.
    fn calculate_backoff(config: &SyncConfig, attempt_count: i32) -> Duration {
        let multiplier = 2_u32.pow(attempt_count.saturating_sub(1).max(0) as u32);
        let delay = config.base_backoff() * multiplier;
        delay.min(config.max_backoff())
    }
}

/// Handle for communicating with the sync worker
#[derive(Debug, Clone)]
pub struct SyncWorkerHandle {
    command_sender: mpsc::UnboundedSender<SyncWorkerCommand>,
}

impl SyncWorkerHandle {
    pub fn new(command_sender: mpsc::UnboundedSender<SyncWorkerCommand>) -> Self {
        Self { command_sender }
    }

    /// Request an immediate flush pass
    pub fn flush_now(&self) -> Result<()> {
        self.command_sender
            .send(SyncWorkerCommand::FlushNow)
            .map_err(|_| anyhow::anyhow!("Sync worker disconnected"))
    }

    /// Shutdown the worker
    pub fn shutdown(&self) -> Result<()> {
        self.command_sender
            .send(SyncWorkerCommand::Shutdown)
            .map_err(|_| anyhow::anyhow!("Sync worker disconnected"))
    }
}
