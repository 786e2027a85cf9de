pub fn queue_pending_op(
    conn: &Connection,
    tbl: &str,
    op: &str,
    row_id: &str,
    payload: &serde_json::Value,
) -> Result<()> {
    conn.execute(
        r#"INSERT INTO pending_ops(tbl, op, row_id, payload, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
        params![tbl, op, row_id, payload.to_string(), now_ms()],
    )?;
    Ok(())
}

/// The "next pending write batch" cursor: oldest ops first, up to `limit`.
pub fn next_pending_ops(conn: &Connection, limit: usize) -> Result<Vec<PendingOp>> {
    let mut stmt = conn.prepare(
        r#"SELECT seq, tbl, op, row_id, payload
           FROM pending_ops
           ORDER BY seq ASC
           LIMIT ?1"#,
    )?;
    let mut rows = stmt.query(params![limit as i64])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let payload_raw: String = row.get(4)?;
        out.push(PendingOp {
            seq: row.get(0)?,
            tbl: row.get(1)?,
            op: row.get(2)?,
            row_id: row.get(3)?,
            payload: serde_json::from_str(&payload_raw)?,
        });
    }
    Ok(out)
}

pub fn delete_pending_ops(conn: &Connection, seqs: &[i64]) -> Result<()> {
    for seq in seqs {
        conn.execute(r#"DELETE FROM pending_ops WHERE seq = ?1"#, params![seq])?;
    }
    Ok(())
}

/// (count, total payload bytes) of everything still waiting to be pushed.
pub fn pending_ops_stats(conn: &Connection) -> Result<(u64, u64)> {
    let (count, size): (i64, Option<i64>) = conn.query_row(
        r#"SELECT count(*), sum(length(payload)) FROM pending_ops"#,
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok((count as u64, size.unwrap_or(0) as u64))
}
