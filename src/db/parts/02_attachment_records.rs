fn row_to_attachment(row: &rusqlite::Row<'_>) -> rusqlite::Result<(AttachmentRecord, String)> {
    let state_raw: String = row.get(3)?;
    Ok((
        AttachmentRecord {
            id: row.get(0)?,
            filename: row.get(1)?,
            media_type: row.get(2)?,
            state: AttachmentState::QueuedSync,
            size: row.get(4)?,
            local_uri: row.get(5)?,
            timestamp_ms: row.get(6)?,
        },
        state_raw,
    ))
}

fn attachment_from_row(row: &rusqlite::Row<'_>) -> Result<AttachmentRecord> {
    let (mut record, state_raw) = row_to_attachment(row)?;
    record.state = AttachmentState::parse(&state_raw)?;
    Ok(record)
}

const ATTACHMENT_COLUMNS: &str = "id, filename, media_type, state, size, local_uri, timestamp";

pub fn upsert_attachment_record(conn: &Connection, record: &AttachmentRecord) -> Result<()> {
    conn.execute(
        r#"INSERT INTO attachment_queue(id, filename, media_type, state, size, local_uri, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(id) DO UPDATE SET
             filename = excluded.filename,
             media_type = excluded.media_type,
             state = excluded.state,
             size = excluded.size,
             local_uri = excluded.local_uri,
             timestamp = excluded.timestamp"#,
        params![
            record.id,
            record.filename,
            record.media_type,
            record.state.as_str(),
            record.size,
            record.local_uri,
            record.timestamp_ms
        ],
    )?;
    Ok(())
}

pub fn get_attachment_record(conn: &Connection, id: &str) -> Result<Option<AttachmentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM attachment_queue WHERE id = ?1"
    ))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(attachment_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn list_attachment_records(conn: &Connection) -> Result<Vec<AttachmentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM attachment_queue ORDER BY timestamp ASC, id ASC"
    ))?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(attachment_from_row(row)?);
    }
    Ok(out)
}

pub fn list_records_in_state(
    conn: &Connection,
    state: AttachmentState,
) -> Result<Vec<AttachmentRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ATTACHMENT_COLUMNS} FROM attachment_queue WHERE state = ?1 ORDER BY timestamp ASC, id ASC"
    ))?;
    let mut rows = stmt.query(params![state.as_str()])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(attachment_from_row(row)?);
    }
    Ok(out)
}

pub fn set_record_state(conn: &Connection, id: &str, state: AttachmentState) -> Result<()> {
    let changed = conn.execute(
        r#"UPDATE attachment_queue SET state = ?2, timestamp = ?3 WHERE id = ?1"#,
        params![id, state.as_str(), now_ms()],
    )?;
    if changed == 0 {
        return Err(anyhow!("attachment record not found: {id}"));
    }
    Ok(())
}

pub fn update_record_filename(conn: &Connection, id: &str, filename: &str) -> Result<()> {
    conn.execute(
        r#"UPDATE attachment_queue SET filename = ?2, timestamp = ?3 WHERE id = ?1"#,
        params![id, filename, now_ms()],
    )?;
    Ok(())
}

pub fn mark_record_synced(
    conn: &Connection,
    id: &str,
    local_uri: &str,
    size: Option<i64>,
) -> Result<()> {
    let changed = conn.execute(
        r#"UPDATE attachment_queue SET state = ?2, local_uri = ?3, size = ?4, timestamp = ?5
           WHERE id = ?1"#,
        params![
            id,
            AttachmentState::Synced.as_str(),
            local_uri,
            size,
            now_ms()
        ],
    )?;
    if changed == 0 {
        return Err(anyhow!("attachment record not found: {id}"));
    }
    Ok(())
}

/// Force-sync reset: queued records go back to `queued_sync` so the next pass
/// re-derives their disposition. Synced and archived records are left alone.
pub fn reset_queued_records(conn: &Connection) -> Result<u64> {
    let changed = conn.execute(
        r#"UPDATE attachment_queue SET state = ?1, timestamp = ?2
           WHERE state IN (?3, ?4)"#,
        params![
            AttachmentState::QueuedSync.as_str(),
            now_ms(),
            AttachmentState::QueuedUpload.as_str(),
            AttachmentState::QueuedDownload.as_str()
        ],
    )?;
    Ok(changed as u64)
}

pub fn count_records_in_state(conn: &Connection, state: AttachmentState) -> Result<u64> {
    let count: i64 = conn.query_row(
        r#"SELECT count(*) FROM attachment_queue WHERE state = ?1"#,
        params![state.as_str()],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}
