use std::collections::{BTreeSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use rusqlite::Connection;

use crate::config::SyncConfig;
use crate::db::watch::TableWatcher;
use crate::db::{self, AttachmentRecord, AttachmentState};
use crate::store::{self, LocalStorage, RemoteStorage};
use crate::thumbnail;

/// Directory (relative to the app dir / local tier root) holding attachment
/// bytes and thumbnails.
pub const ATTACHMENTS_DIR: &str = "attachments";

pub fn attachment_rel_path(filename: &str) -> String {
    format!("{ATTACHMENTS_DIR}/{filename}")
}

/// Read-only snapshot of queue health, aggregated by record state plus the
/// outbound row-write queue's own statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub pending_uploads: u64,
    pub pending_downloads: u64,
    pub pending_sync: u64,
    pub synced: u64,
    pub remote_queue_count: u64,
    pub remote_queue_size: u64,
    pub last_sync_ms: Option<i64>,
}

/// The attachment queue engine: derives the desired attachment-id set from
/// logical content rows, reconciles it against stored records, and drives
/// upload/download passes.
///
/// Exactly one instance may run against a given local store per process. Two
/// instances would race on state transitions; the in-memory download queue
/// and in-flight set belong to this instance alone.
pub struct AttachmentQueue {
    app_dir: PathBuf,
    local: Arc<dyn LocalStorage>,
    remote: Arc<dyn RemoteStorage>,
    watcher: Arc<TableWatcher>,
    config: SyncConfig,
    download_in_progress: AtomicBool,
    in_flight: Mutex<BTreeSet<String>>,
    stop: AtomicBool,
    periodic: Mutex<Option<thread::JoinHandle<()>>>,
    watch_id: Mutex<Option<u64>>,
    started: AtomicBool,
}

impl AttachmentQueue {
    pub fn new(
        app_dir: PathBuf,
        local: Arc<dyn LocalStorage>,
        remote: Arc<dyn RemoteStorage>,
        watcher: Arc<TableWatcher>,
        config: SyncConfig,
    ) -> Self {
        Self {
            app_dir,
            local,
            remote,
            watcher,
            config,
            download_in_progress: AtomicBool::new(false),
            in_flight: Mutex::new(BTreeSet::new()),
            stop: AtomicBool::new(false),
            periodic: Mutex::new(None),
            watch_id: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn local(&self) -> &Arc<dyn LocalStorage> {
        &self.local
    }

    /// Idempotent startup: registers the desired-id watch on the `images`
    /// table and spawns the periodic trigger thread. Only the first call
    /// takes effect.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let queue = Arc::clone(self);
        let watch_id = self.watcher.watch(&["images"], move || match db::open(&queue.app_dir) {
            Ok(conn) => queue.trigger_sync(&conn),
            Err(e) => tracing::error!("watch trigger could not open db: {e:#}"),
        });
        *self.watch_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(watch_id);

        let queue = Arc::clone(self);
        let handle = thread::spawn(move || queue.periodic_loop());
        *self.periodic.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self
            .periodic
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        let watch_id = self
            .watch_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(watch_id) = watch_id {
            self.watcher.unwatch(watch_id);
        }
    }

    /// Event-driven paths can miss work (debounced notifications, silent
    /// connectivity transitions), so a timer re-runs the full pass.
    fn periodic_loop(&self) {
        let interval = self.config.health_check_interval();
        loop {
            let mut waited = Duration::ZERO;
            while waited < interval {
                if self.stop.load(Ordering::Relaxed) {
                    return;
                }
                let step = Duration::from_millis(200).min(interval - waited);
                thread::sleep(step);
                waited += step;
            }
            match db::open(&self.app_dir) {
                Ok(conn) => self.trigger_sync(&conn),
                Err(e) => tracing::error!("periodic trigger could not open db: {e:#}"),
            }
        }
    }

    /// One full pass: re-derive the desired-id set, reconcile records, then
    /// run the upload and download passes. Never panics or unwinds into the
    /// caller; failures are logged.
    pub fn trigger_sync(&self, conn: &Connection) {
        if let Err(e) = self.run_sync_pass(conn) {
            tracing::error!("sync pass failed: {e:#}");
        }
    }

    fn run_sync_pass(&self, conn: &Connection) -> Result<()> {
        let desired = compute_desired_ids(conn)?;
        self.apply_desired_ids(conn, &desired)?;

        if let Err(e) = self.trigger_uploads(conn) {
            tracing::error!("upload pass failed: {e:#}");
        }
        if let Err(e) = self.trigger_downloads(conn) {
            tracing::error!("download pass failed: {e:#}");
        }
        db::mark_sync_pass(conn)?;
        Ok(())
    }

    /// Manual recovery for stuck items: queued records drop back to
    /// `queued_sync` so the next pass re-derives their disposition.
    pub fn force_sync(&self, conn: &Connection) -> Result<u64> {
        let reset = db::reset_queued_records(conn)?;
        self.trigger_sync(conn);
        Ok(reset)
    }

    pub fn sync_status(&self, conn: &Connection) -> Result<SyncStatus> {
        let (remote_queue_count, remote_queue_size) = db::pending_ops_stats(conn)?;
        Ok(SyncStatus {
            pending_uploads: db::count_records_in_state(conn, AttachmentState::QueuedUpload)?,
            pending_downloads: db::count_records_in_state(conn, AttachmentState::QueuedDownload)?,
            pending_sync: db::count_records_in_state(conn, AttachmentState::QueuedSync)?,
            synced: db::count_records_in_state(conn, AttachmentState::Synced)?,
            remote_queue_count,
            remote_queue_size,
            last_sync_ms: db::last_sync_ms(conn)?,
        })
    }
}

include!("parts/01_records.rs");
include!("parts/02_derive.rs");
include!("parts/03_upload.rs");
include!("parts/04_download.rs");
