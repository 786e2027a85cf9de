impl AttachmentQueue {
    /// Upload pass. Resolves `queued_sync` records first (local bytes present
    /// means upload, absent means download), then pushes every `queued_upload`
    /// record to the remote tier. Each record's upload is isolated: a failure
    /// leaves that record queued for the next trigger and never aborts its
    /// siblings.
    pub fn trigger_uploads(&self, conn: &Connection) -> Result<u64> {
        for record in db::list_records_in_state(conn, AttachmentState::QueuedSync)? {
            let rel = record
                .local_uri
                .clone()
                .unwrap_or_else(|| attachment_rel_path(&record.filename));
            let next = if self.local.file_exists(&rel)? {
                AttachmentState::QueuedUpload
            } else {
                AttachmentState::QueuedDownload
            };
            db::set_record_state(conn, &record.id, next)?;
        }

        let mut uploaded = 0u64;
        for record in db::list_records_in_state(conn, AttachmentState::QueuedUpload)? {
            match self.upload_one(conn, &record) {
                Ok(true) => uploaded += 1,
                Ok(false) => {}
                Err(e) if store::is_offline(&e) => {
                    tracing::debug!(id = %record.id, "upload deferred: offline");
                }
                Err(e) => {
                    tracing::warn!(id = %record.id, "attachment upload failed: {e:#}");
                }
            }
        }
        Ok(uploaded)
    }

    fn upload_one(&self, conn: &Connection, record: &AttachmentRecord) -> Result<bool> {
        let rel = record
            .local_uri
            .clone()
            .unwrap_or_else(|| attachment_rel_path(&record.filename));

        let bytes = match self.local.read_file(&rel) {
            Ok(bytes) => bytes,
            Err(e) if store::is_not_found(&e) => {
                // Local bytes vanished out from under a queued upload; the
                // content may still exist remotely, so hand it to the
                // download side instead of failing forever.
                db::set_record_state(conn, &record.id, AttachmentState::QueuedDownload)?;
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match self
            .remote
            .upload_file(&record.filename, &bytes, &record.media_type, false)
        {
            Ok(()) => {}
            Err(e) if store::is_already_exists(&e) => {
                // Content filenames are uuid-stemmed, so an existing remote
                // object is this same content from an earlier attempt.
                // Skip rather than overwrite.
                tracing::warn!(id = %record.id, filename = %record.filename,
                    "remote object already exists, skipping upload");
            }
            Err(e) => return Err(e),
        }

        db::mark_record_synced(conn, &record.id, &rel, Some(bytes.len() as i64))?;
        Ok(true)
    }
}
