//! Store sync worker - persists snapshots off the scan path
//!
//! Saves and renames enqueue a request via a bounded mpsc channel and move
//! on. The worker writes the snapshot; a failed write is logged and never
//! rolls back the routing that triggered it.

use crate::infra::metrics::Metrics;
use crate::io::store::InventoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    AutoSave,
    /// Operator saved the form explicitly
    FormSave,
    Rename,
    InlineEdit,
}

impl SyncReason {
    pub fn as_str(&self) -> &str {
        match self {
            SyncReason::AutoSave => "auto_save",
            SyncReason::FormSave => "form_save",
            SyncReason::Rename => "rename",
            SyncReason::InlineEdit => "inline_edit",
        }
    }
}

#[derive(Debug)]
pub struct SyncRequest {
    pub reason: SyncReason,
    /// When the request was enqueued (for queue delay measurement)
    pub enqueued_at: Instant,
}

/// Non-blocking handle used by the scan path
#[derive(Clone)]
pub struct SyncSender {
    tx: mpsc::Sender<SyncRequest>,
    metrics: Arc<Metrics>,
}

impl SyncSender {
    pub fn new(tx: mpsc::Sender<SyncRequest>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Fire-and-forget; drops are counted, never retried
    pub fn request(&self, reason: SyncReason) {
        let request = SyncRequest { reason, enqueued_at: Instant::now() };
        match self.tx.try_send(request) {
            Ok(()) => debug!(reason = %reason.as_str(), "sync_requested"),
            Err(TrySendError::Full(_)) => {
                warn!(reason = %reason.as_str(), "sync_queue_full");
                self.metrics.record_sync_dropped();
            }
            Err(TrySendError::Closed(_)) => {
                debug!(reason = %reason.as_str(), "sync_worker_gone");
            }
        }
    }
}

pub struct SyncWorker {
    store: InventoryStore,
    path: PathBuf,
    rx: mpsc::Receiver<SyncRequest>,
}

impl SyncWorker {
    pub fn new(store: InventoryStore, path: PathBuf, rx: mpsc::Receiver<SyncRequest>) -> Self {
        Self { store, path, rx }
    }

    /// Run the worker, processing requests until the channel closes
    pub async fn run(mut self) {
        info!(path = %self.path.display(), "sync_worker_started");

        while let Some(request) = self.rx.recv().await {
            // Requests queued behind this one would write the same snapshot
            let mut coalesced = 0usize;
            while self.rx.try_recv().is_ok() {
                coalesced += 1;
            }

            let queue_delay_us = request.enqueued_at.elapsed().as_micros() as u64;
            let store = self.store.clone();
            let path = self.path.clone();
            let written = tokio::task::spawn_blocking(move || store.save_to_file(&path)).await;

            match written {
                Ok(Ok(bytes)) => info!(
                    reason = %request.reason.as_str(),
                    bytes = %bytes,
                    coalesced = %coalesced,
                    queue_delay_us = %queue_delay_us,
                    "store_synced"
                ),
                Ok(Err(e)) => error!(
                    reason = %request.reason.as_str(),
                    error = %format!("{:#}", e),
                    "store_sync_failed"
                ),
                Err(e) => error!(error = %e, "store_sync_task_failed"),
            }
        }

        info!("sync_worker_stopped");
    }
}

/// Create a sync channel and worker
///
/// Returns the sender (for the scan path) and the worker (to be spawned)
pub fn create_sync_worker(
    store: InventoryStore,
    path: PathBuf,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (SyncSender, SyncWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (SyncSender::new(tx, metrics), SyncWorker::new(store, path, rx))
}
