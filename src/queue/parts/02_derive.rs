/// The complete set of attachment ids that should exist locally: uuid stems
/// of every enabled logical row's content filename, deduplicated. Always a
/// full snapshot, never a delta, so applying snapshots in any order (or with
/// duplicates) converges.
pub fn compute_desired_ids(conn: &Connection) -> Result<BTreeSet<String>> {
    let filenames = db::list_enabled_image_filenames(conn)?;
    Ok(filenames
        .iter()
        .map(|f| filename_stem(f).to_string())
        .collect())
}

impl AttachmentQueue {
    /// Diff a desired-id snapshot against stored records: create missing
    /// records in `queued_sync` (disposition decided by the next pass) and
    /// archive records whose id is no longer referenced. Archived records
    /// are terminal and never resurrected here.
    pub fn apply_desired_ids(&self, conn: &Connection, desired: &BTreeSet<String>) -> Result<()> {
        let existing = db::list_attachment_records(conn)?;
        let known: BTreeSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();

        for record in &existing {
            if record.state != AttachmentState::Archived && !desired.contains(&record.id) {
                tracing::debug!(id = %record.id, "archiving attachment no longer referenced");
                db::set_record_state(conn, &record.id, AttachmentState::Archived)?;
            }
        }

        for id in desired {
            if known.contains(id.as_str()) {
                continue;
            }
            // The authoritative filename lives on the logical row; fall back
            // to the factory default when the row is not visible yet.
            let filename = db::find_image_filename_by_stem(conn, id)?;
            let record = new_attachment_record(PartialAttachment {
                id: Some(id.clone()),
                filename,
                state: Some(AttachmentState::QueuedSync),
                ..PartialAttachment::default()
            });
            db::upsert_attachment_record(conn, &record)?;
        }

        Ok(())
    }
}
