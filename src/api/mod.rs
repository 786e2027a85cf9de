use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::config::SyncConfig;
use crate::db::watch::TableWatcher;
use crate::db::{self, AttachmentState, ImageAssociation, ImageRow, NewImage};
use crate::queue::{
    attachment_rel_path, extension_for_media_type, filename_stem, new_attachment_record,
    AttachmentQueue, PartialAttachment, SyncStatus, ATTACHMENTS_DIR,
};
use crate::store::{LocalStorage, RemoteStorage};
use crate::thumbnail;

/// Application-facing surface over the attachment queue and image rows.
///
/// Construct exactly one service per process for a given app dir and inject
/// the handle wherever it is needed; a second instance would run a second
/// queue engine against the same record store and race its state
/// transitions.
pub struct ImageSyncService {
    app_dir: PathBuf,
    local: Arc<dyn LocalStorage>,
    remote: Arc<dyn RemoteStorage>,
    watcher: Arc<TableWatcher>,
    queue: Arc<AttachmentQueue>,
}

impl ImageSyncService {
    pub fn new(
        app_dir: PathBuf,
        local: Arc<dyn LocalStorage>,
        remote: Arc<dyn RemoteStorage>,
        config: SyncConfig,
    ) -> Self {
        let watcher = Arc::new(TableWatcher::new());
        let queue = Arc::new(AttachmentQueue::new(
            app_dir.clone(),
            Arc::clone(&local),
            Arc::clone(&remote),
            Arc::clone(&watcher),
            config,
        ));
        Self {
            app_dir,
            local,
            remote,
            watcher,
            queue,
        }
    }

    /// Idempotent: safe to call multiple times, only the first call takes
    /// effect. Registers the desired-id watch and starts the periodic
    /// trigger.
    pub fn initialize(&self) {
        self.queue.start();
    }

    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    pub fn queue(&self) -> &Arc<AttachmentQueue> {
        &self.queue
    }

    /// The row-sync engine (and tests) notify through this hub when
    /// replicated rows land locally.
    pub fn watcher(&self) -> &Arc<TableWatcher> {
        &self.watcher
    }

    /// Persist newly captured content: local bytes, an attachment record in
    /// `queued_upload`, and the logical image row referencing the generated
    /// filename. Returns once everything is persisted locally; the actual
    /// upload happens on the next trigger, so this never fails on
    /// connectivity.
    pub fn upload_image(
        &self,
        bytes: &[u8],
        media_type: &str,
        association: ImageAssociation,
        site_id: Option<String>,
    ) -> Result<ImageRow> {
        let conn = db::open(&self.app_dir)?;

        let id = uuid::Uuid::new_v4().to_string();
        let filename = format!("{id}.{}", extension_for_media_type(media_type));
        let rel = attachment_rel_path(&filename);

        self.local.make_dir(ATTACHMENTS_DIR)?;
        self.local.write_file(&rel, bytes)?;

        let record = new_attachment_record(PartialAttachment {
            id: Some(id),
            filename: Some(filename.clone()),
            media_type: Some(media_type.to_string()),
            state: Some(AttachmentState::QueuedUpload),
            size: Some(bytes.len() as i64),
            local_uri: Some(rel),
        });

        // The record and the logical row must commit together: a reconcile
        // pass that saw the record without the row would archive the capture
        // before it ever uploaded.
        let row = db::with_immediate_transaction(&conn, || {
            db::upsert_attachment_record(&conn, &record)?;
            db::insert_image_in_tx(
                &conn,
                &NewImage {
                    image_id: filename,
                    image_url: None,
                    association,
                    site_id,
                },
            )
        })?;

        self.watcher.notify(&["images"]);
        Ok(row)
    }

    /// Soft delete: flips `enabled` off and removes the local thumbnail.
    /// The attachment record and remote blob stay; other rows or replicas
    /// may still reference the content.
    pub fn delete_image(&self, row_id: &str) -> Result<()> {
        let conn = db::open(&self.app_dir)?;
        let row = db::disable_image(&conn, row_id)?;

        if let Some(filename) = &row.image_id {
            if let Err(e) = thumbnail::delete_thumbnail(self.local.as_ref(), filename) {
                tracing::debug!(filename = %filename, "thumbnail cleanup failed: {e:#}");
            }
        }

        self.watcher.notify(&["images"]);
        Ok(())
    }

    /// Manual nudge for the upload pass ("force sync" UX, connectivity
    /// restored). Per-item network failures are absorbed by the pass itself.
    pub fn trigger_uploads(&self) -> Result<u64> {
        let conn = db::open(&self.app_dir)?;
        self.queue.trigger_uploads(&conn)
    }

    pub fn force_sync(&self) -> Result<u64> {
        let conn = db::open(&self.app_dir)?;
        self.queue.force_sync(&conn)
    }

    pub fn sync_status(&self) -> Result<SyncStatus> {
        let conn = db::open(&self.app_dir)?;
        self.queue.sync_status(&conn)
    }

    /// Best renderable reference for an image row, in order: local bytes
    /// (thumbnail first when asked; covers synced records and fresh captures
    /// still waiting to upload), remote resized variant URL, remote original
    /// URL, the row's legacy stored URL, empty string.
    pub fn image_uri(&self, row: &ImageRow, prefer_thumbnail: bool) -> Result<String> {
        let Some(filename) = &row.image_id else {
            return Ok(row.image_url.clone().unwrap_or_default());
        };

        let conn = db::open(&self.app_dir)?;
        let record = db::get_attachment_record(&conn, filename_stem(filename))?;

        if let Some(record) = &record {
            let rel = record
                .local_uri
                .clone()
                .unwrap_or_else(|| attachment_rel_path(&record.filename));
            if record.state != AttachmentState::Archived && self.local.file_exists(&rel)? {
                if prefer_thumbnail {
                    if let Ok(thumb) =
                        thumbnail::ensure_thumbnail(self.local.as_ref(), &record.filename)
                    {
                        return Ok(thumb);
                    }
                }
                return Ok(rel);
            }
            if record.state == AttachmentState::Synced {
                // Synced but local bytes are gone: remote is confirmed, so
                // the resized variant is the best next bet.
                return Ok(self
                    .remote
                    .public_url(&format!("{}{}", crate::store::RESIZED_PREFIX, record.filename)));
            }
            if record.state == AttachmentState::QueuedDownload {
                // Remote content is known to exist; local bytes are not here
                // yet. Point at the original.
                return Ok(self.remote.public_url(&record.filename));
            }
        }

        Ok(row.image_url.clone().unwrap_or_default())
    }
}
