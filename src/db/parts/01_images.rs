#[derive(Clone, Debug)]
pub struct NewImage {
    pub image_id: String,
    pub image_url: Option<String>,
    pub association: ImageAssociation,
    pub site_id: Option<String>,
}

fn row_to_image(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageRow> {
    Ok(ImageRow {
        id: row.get(0)?,
        image_id: row.get(1)?,
        image_url: row.get(2)?,
        asset_id: row.get(3)?,
        point_id: row.get(4)?,
        gateway_id: row.get(5)?,
        site_id: row.get(6)?,
        enabled: row.get::<_, i64>(7)? != 0,
        created_at_ms: row.get(8)?,
        updated_at_ms: row.get(9)?,
    })
}

const IMAGE_COLUMNS: &str =
    "id, image_id, image_url, asset_id, point_id, gateway_id, site_id, enabled, created_at, updated_at";

pub fn insert_image(conn: &Connection, new: &NewImage) -> Result<ImageRow> {
    with_immediate_transaction(conn, || insert_image_in_tx(conn, new))
}

/// Body of [`insert_image`] for callers that already hold an open transaction
/// and need other writes to land in the same commit.
pub(crate) fn insert_image_in_tx(conn: &Connection, new: &NewImage) -> Result<ImageRow> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = now_ms();

    let (asset_id, point_id, gateway_id) = match &new.association {
        ImageAssociation::Asset(v) => (Some(v.as_str()), None, None),
        ImageAssociation::Point(v) => (None, Some(v.as_str()), None),
        ImageAssociation::Gateway(v) => (None, None, Some(v.as_str())),
    };

    conn.execute(
        r#"INSERT INTO images(id, image_id, image_url, asset_id, point_id, gateway_id, site_id, enabled, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)"#,
        params![
            id,
            new.image_id,
            new.image_url,
            asset_id,
            point_id,
            gateway_id,
            new.site_id,
            now
        ],
    )?;

    let payload = serde_json::json!({
        "id": id,
        "image_id": new.image_id,
        "image_url": new.image_url,
        "asset_id": asset_id,
        "point_id": point_id,
        "gateway_id": gateway_id,
        "site_id": new.site_id,
        "enabled": true,
        "created_at": now,
        "updated_at": now,
    });
    queue_pending_op(conn, "images", "put", &id, &payload)?;

    get_image_opt(conn, &id)?.ok_or_else(|| anyhow!("failed to retrieve created image row: {id}"))
}

/// Used by tests and by the row-sync engine when a replicated image row lands
/// locally. Does not queue an outbound op: the write originated remotely.
pub fn insert_replicated_image(conn: &Connection, row: &ImageRow) -> Result<()> {
    conn.execute(
        r#"INSERT OR REPLACE INTO images(id, image_id, image_url, asset_id, point_id, gateway_id, site_id, enabled, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
        params![
            row.id,
            row.image_id,
            row.image_url,
            row.asset_id,
            row.point_id,
            row.gateway_id,
            row.site_id,
            row.enabled as i64,
            row.created_at_ms,
            row.updated_at_ms
        ],
    )?;
    Ok(())
}

pub fn get_image_opt(conn: &Connection, id: &str) -> Result<Option<ImageRow>> {
    let row = conn
        .query_row(
            &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1"),
            params![id],
            |row| row_to_image(row),
        )
        .optional()?;
    Ok(row)
}

pub fn get_image(conn: &Connection, id: &str) -> Result<ImageRow> {
    get_image_opt(conn, id)?.ok_or_else(|| anyhow!("image row not found: {id}"))
}

/// Soft delete. The attachment record and any remote blob stay untouched:
/// other rows or replicas may still reference the same content.
pub fn disable_image(conn: &Connection, id: &str) -> Result<ImageRow> {
    let now = now_ms();
    with_immediate_transaction(conn, || {
        let changed = conn.execute(
            r#"UPDATE images SET enabled = 0, updated_at = ?2 WHERE id = ?1"#,
            params![id, now],
        )?;
        if changed == 0 {
            return Err(anyhow!("image row not found: {id}"));
        }
        let payload = serde_json::json!({ "enabled": false, "updated_at": now });
        queue_pending_op(conn, "images", "patch", id, &payload)?;
        Ok(())
    })?;
    get_image(conn, id)
}

/// Content filenames of every enabled logical row, in no particular order.
pub fn list_enabled_image_filenames(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        r#"SELECT image_id FROM images WHERE image_id IS NOT NULL AND enabled = 1"#,
    )?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row.get(0)?);
    }
    Ok(out)
}

/// The authoritative filename for an attachment id lives on the logical row,
/// not on the attachment record. Prefix match on `<stem>.`; newest row wins.
pub fn find_image_filename_by_stem(conn: &Connection, stem: &str) -> Result<Option<String>> {
    let pattern = format!("{stem}.%");
    let filename: Option<String> = conn
        .query_row(
            r#"SELECT image_id FROM images
               WHERE image_id LIKE ?1 AND enabled = 1
               ORDER BY updated_at DESC
               LIMIT 1"#,
            params![pattern],
            |row| row.get(0),
        )
        .optional()?;
    Ok(filename)
}
