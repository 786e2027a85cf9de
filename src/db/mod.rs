use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};

pub mod watch;

/// A logical content row: the application-level "image" record that ties an
/// attachment's content filename to exactly one asset, measurement point or
/// gateway. Rows are never hard-deleted; `enabled = false` is the delete.
#[derive(Clone, Debug)]
pub struct ImageRow {
    pub id: String,
    pub image_id: Option<String>,
    pub image_url: Option<String>,
    pub asset_id: Option<String>,
    pub point_id: Option<String>,
    pub gateway_id: Option<String>,
    pub site_id: Option<String>,
    pub enabled: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Which entity a new image belongs to.
#[derive(Clone, Debug)]
pub enum ImageAssociation {
    Asset(String),
    Point(String),
    Gateway(String),
}

/// Lifecycle of an attachment record. Transitions are forward-only except the
/// explicit force-sync reset back to `QueuedSync`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachmentState {
    QueuedSync,
    QueuedUpload,
    QueuedDownload,
    Synced,
    Archived,
}

impl AttachmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentState::QueuedSync => "queued_sync",
            AttachmentState::QueuedUpload => "queued_upload",
            AttachmentState::QueuedDownload => "queued_download",
            AttachmentState::Synced => "synced",
            AttachmentState::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "queued_sync" => Ok(AttachmentState::QueuedSync),
            "queued_upload" => Ok(AttachmentState::QueuedUpload),
            "queued_download" => Ok(AttachmentState::QueuedDownload),
            "synced" => Ok(AttachmentState::Synced),
            "archived" => Ok(AttachmentState::Archived),
            other => Err(anyhow!("unknown attachment state: {other}")),
        }
    }
}

/// Metadata for one tracked attachment. `id` is the uuid stem of the content
/// filename; `filename` must not change after creation for a given id, except
/// for the download-time reconciliation against the logical row's `image_id`.
#[derive(Clone, Debug)]
pub struct AttachmentRecord {
    pub id: String,
    pub filename: String,
    pub media_type: String,
    pub state: AttachmentState,
    pub size: Option<i64>,
    pub local_uri: Option<String>,
    pub timestamp_ms: i64,
}

/// One queued outbound row write, waiting to be pushed to the backend.
#[derive(Clone, Debug)]
pub struct PendingOp {
    pub seq: i64,
    pub tbl: String,
    pub op: String,
    pub row_id: String,
    pub payload: serde_json::Value,
}

fn db_path(app_dir: &Path) -> PathBuf {
    app_dir.join("sitetrace.sqlite3")
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

pub fn open(app_dir: &Path) -> Result<Connection> {
    fs::create_dir_all(app_dir)?;
    let conn = Connection::open(db_path(app_dir))?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    migrate(&conn)?;
    Ok(conn)
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let user_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if user_version < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS images (
  id TEXT PRIMARY KEY,
  image_id TEXT,
  image_url TEXT,
  asset_id TEXT,
  point_id TEXT,
  gateway_id TEXT,
  site_id TEXT,
  enabled INTEGER NOT NULL DEFAULT 1,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_image_id ON images(image_id);

CREATE TABLE IF NOT EXISTS attachment_queue (
  id TEXT PRIMARY KEY,
  filename TEXT NOT NULL,
  media_type TEXT NOT NULL,
  state TEXT NOT NULL,
  size INTEGER,
  local_uri TEXT,
  timestamp INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attachment_queue_state ON attachment_queue(state);

CREATE TABLE IF NOT EXISTS pending_ops (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  tbl TEXT NOT NULL,
  op TEXT NOT NULL,
  row_id TEXT NOT NULL,
  payload TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);
"#,
        )?;
        conn.execute_batch("PRAGMA user_version = 1;")?;
    }

    Ok(())
}

pub(crate) fn kv_get_i64(conn: &Connection, key: &str) -> Result<Option<i64>> {
    let value: Option<String> = conn
        .query_row(
            r#"SELECT value FROM kv WHERE key = ?1"#,
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse::<i64>().ok()))
}

pub(crate) fn kv_set_i64(conn: &Connection, key: &str, value: i64) -> Result<()> {
    conn.execute(
        r#"INSERT INTO kv(key, value) VALUES (?1, ?2)
           ON CONFLICT(key) DO UPDATE SET value = excluded.value"#,
        params![key, value.to_string()],
    )?;
    Ok(())
}

const LAST_SYNC_KEY: &str = "last_sync_at";

/// Stamp the completion of a full sync pass.
pub fn mark_sync_pass(conn: &Connection) -> Result<()> {
    kv_set_i64(conn, LAST_SYNC_KEY, now_ms())
}

pub fn last_sync_ms(conn: &Connection) -> Result<Option<i64>> {
    kv_get_i64(conn, LAST_SYNC_KEY)
}

pub(crate) fn with_immediate_transaction<T>(
    conn: &Connection,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;
    match f() {
        Ok(v) => {
            conn.execute_batch("COMMIT;")?;
            Ok(v)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(e)
        }
    }
}

include!("parts/01_images.rs");
include!("parts/02_attachment_records.rs");
include!("parts/03_pending_ops.rs");
