struct DownloadItem {
    id: String,
    filename: String,
}

/// Releases the single-flight guard and clears in-flight bookkeeping on
/// every exit path, including early returns and errors.
struct DownloadPassGuard<'a> {
    queue: &'a AttachmentQueue,
}

impl Drop for DownloadPassGuard<'_> {
    fn drop(&mut self) {
        self.queue
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.queue
            .download_in_progress
            .store(false, Ordering::SeqCst);
    }
}

impl AttachmentQueue {
    /// Bounded-concurrency download pass.
    ///
    /// Single-flight: a trigger while a pass is running returns immediately.
    /// Within a pass, at most `download_concurrency` downloads are in flight;
    /// the first to finish frees a slot for the next queued id. Per-id
    /// failures are logged and never abort sibling downloads.
    pub fn trigger_downloads(&self, conn: &Connection) -> Result<u64> {
        if self.download_in_progress.swap(true, Ordering::SeqCst) {
            tracing::debug!("download pass already running, skipping");
            return Ok(0);
        }
        let _guard = DownloadPassGuard { queue: self };

        let mut work: VecDeque<DownloadItem> = VecDeque::new();
        for record in db::list_records_in_state(conn, AttachmentState::QueuedDownload)? {
            let record = self.reconcile_filename(conn, record)?;
            let rel = attachment_rel_path(&record.filename);
            if self.local.file_exists(&rel)? {
                let size = self.local.read_file(&rel).ok().map(|b| b.len() as i64);
                db::mark_record_synced(conn, &record.id, &rel, size)?;
                continue;
            }
            work.push_back(DownloadItem {
                id: record.id,
                filename: record.filename,
            });
        }

        if work.is_empty() {
            return Ok(0);
        }

        let workers = self.config.download_concurrency.max(1).min(work.len());
        let work = Mutex::new(work);
        let results: Mutex<Vec<(DownloadItem, Result<i64>)>> = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let item = {
                        let mut queue = work.lock().unwrap_or_else(|e| e.into_inner());
                        match queue.pop_front() {
                            Some(item) => item,
                            None => break,
                        }
                    };
                    self.in_flight
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .insert(item.id.clone());

                    let stored = self.fetch_and_store(&item);

                    self.in_flight
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&item.id);
                    results
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push((item, stored));
                });
            }
        });

        let mut downloaded = 0u64;
        for (item, stored) in results.into_inner().unwrap_or_else(|e| e.into_inner()) {
            match stored {
                Ok(size) => {
                    let rel = attachment_rel_path(&item.filename);
                    match db::mark_record_synced(conn, &item.id, &rel, Some(size)) {
                        Ok(()) => downloaded += 1,
                        Err(e) => {
                            tracing::warn!(id = %item.id, "recording downloaded attachment failed: {e:#}");
                        }
                    }
                }
                Err(e) if store::is_offline(&e) => {
                    tracing::debug!(id = %item.id, "download deferred: offline");
                }
                Err(e) => {
                    tracing::warn!(id = %item.id, "attachment download failed: {e:#}");
                }
            }
        }

        Ok(downloaded)
    }

    /// Worker-side half of a download: fetch, persist to the local tier,
    /// derive the thumbnail, drop the bytes. Only the byte count travels back
    /// to the caller's thread, which owns the record transition. A pass that
    /// dies between the write and the transition is repaired by the
    /// local-bytes short-circuit on the next pass.
    fn fetch_and_store(&self, item: &DownloadItem) -> Result<i64> {
        let bytes = store::download_preferring_resized(self.remote.as_ref(), &item.filename)?;
        let rel = attachment_rel_path(&item.filename);
        self.local.write_file(&rel, &bytes)?;

        // Opportunistic: derive the thumbnail now so first display is fast.
        // Failure is non-fatal; display falls back to the full image.
        if let Err(e) = thumbnail::ensure_thumbnail_from(self.local.as_ref(), &item.filename, &bytes)
        {
            tracing::debug!(filename = %item.filename, "thumbnail generation skipped: {e:#}");
        }
        Ok(bytes.len() as i64)
    }

    /// The authoritative remote name lives on the logical row (`image_id`),
    /// which can diverge from the record's own filename for historical data.
    /// Correct the record before fetching; no match is non-fatal.
    fn reconcile_filename(
        &self,
        conn: &Connection,
        record: AttachmentRecord,
    ) -> Result<AttachmentRecord> {
        match db::find_image_filename_by_stem(conn, &record.id)? {
            Some(actual) if actual != record.filename => {
                tracing::debug!(id = %record.id, from = %record.filename, to = %actual,
                    "correcting attachment filename from logical row");
                db::update_record_filename(conn, &record.id, &actual)?;
                Ok(AttachmentRecord {
                    filename: actual,
                    ..record
                })
            }
            _ => Ok(record),
        }
    }
}
