use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use rusqlite::Connection;

use crate::config::SyncConfig;
use crate::db;
use crate::store::StoreError;

/// Row operations the managed backend accepts. Puts and deletes support
/// batching; updates are one call per row.
pub trait RemoteBackend: Send + Sync {
    fn upsert_rows(&self, table: &str, rows: &[serde_json::Value]) -> Result<()>;
    fn patch_row(&self, table: &str, row_id: &str, patch: &serde_json::Value) -> Result<()>;
    fn delete_rows(&self, table: &str, row_ids: &[String]) -> Result<()>;
}

/// Push locally queued row writes to the backend.
///
/// Ops are consumed in sequence order. Runs of the same (table, op) collapse
/// into one batched call for puts and deletes; patches are serialized in
/// chunks of `patch_batch_size`, which bounds outbound concurrency the same
/// way the download side is bounded. Ops are removed only after the backend
/// accepted them, so a failure retries the whole run on the next push.
pub fn push_pending_ops(
    conn: &Connection,
    backend: &dyn RemoteBackend,
    config: &SyncConfig,
) -> Result<u64> {
    let ops = db::next_pending_ops(conn, config.push_batch_limit)?;
    if ops.is_empty() {
        return Ok(0);
    }

    let mut pushed = 0u64;
    let mut i = 0;
    while i < ops.len() {
        let tbl = ops[i].tbl.clone();
        let op = ops[i].op.clone();
        let mut j = i;
        while j < ops.len() && ops[j].tbl == tbl && ops[j].op == op {
            j += 1;
        }
        let run = &ops[i..j];

        match op.as_str() {
            "put" => {
                let rows: Vec<serde_json::Value> =
                    run.iter().map(|o| o.payload.clone()).collect();
                backend.upsert_rows(&tbl, &rows)?;
            }
            "delete" => {
                let ids: Vec<String> = run.iter().map(|o| o.row_id.clone()).collect();
                backend.delete_rows(&tbl, &ids)?;
            }
            "patch" => {
                for chunk in run.chunks(config.patch_batch_size.max(1)) {
                    for pending in chunk {
                        backend.patch_row(&tbl, &pending.row_id, &pending.payload)?;
                    }
                }
            }
            other => return Err(anyhow!("unknown pending op type: {other}")),
        }

        let seqs: Vec<i64> = run.iter().map(|o| o.seq).collect();
        db::delete_pending_ops(conn, &seqs)?;
        pushed += run.len() as u64;
        i = j;
    }

    Ok(pushed)
}

/// HTTP backend speaking the managed service's row API.
pub struct HttpRowBackend {
    http: Client,
    base_url: String,
    token: String,
}

impl HttpRowBackend {
    pub fn new(base_url: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn classify_transport(err: reqwest::Error) -> anyhow::Error {
        if err.is_connect() || err.is_timeout() {
            StoreError::Offline(err.to_string()).into()
        } else {
            err.into()
        }
    }

    fn check_status(resp: reqwest::blocking::Response, what: &str) -> Result<()> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(anyhow!("{what} failed: HTTP {status} {text}"));
        }
        Ok(())
    }
}

impl RemoteBackend for HttpRowBackend {
    fn upsert_rows(&self, table: &str, rows: &[serde_json::Value]) -> Result<()> {
        let resp = self
            .http
            .post(self.table_url(table))
            .bearer_auth(&self.token)
            .header("prefer", "resolution=merge-duplicates")
            .json(rows)
            .send()
            .map_err(Self::classify_transport)?;
        Self::check_status(resp, "row upsert")
    }

    fn patch_row(&self, table: &str, row_id: &str, patch: &serde_json::Value) -> Result<()> {
        let url = format!("{}?id=eq.{row_id}", self.table_url(table));
        let resp = self
            .http
            .patch(url)
            .bearer_auth(&self.token)
            .json(patch)
            .send()
            .map_err(Self::classify_transport)?;
        Self::check_status(resp, "row update")
    }

    fn delete_rows(&self, table: &str, row_ids: &[String]) -> Result<()> {
        let url = format!("{}?id=in.({})", self.table_url(table), row_ids.join(","));
        let resp = self
            .http
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(Self::classify_transport)?;
        Self::check_status(resp, "row delete")
    }
}

/// Recording backend double for tests.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    calls: Mutex<Vec<BackendCall>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    Upsert { table: String, row_count: usize },
    Patch { table: String, row_id: String },
    Delete { table: String, row_ids: Vec<String> },
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RemoteBackend for InMemoryBackend {
    fn upsert_rows(&self, table: &str, rows: &[serde_json::Value]) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(BackendCall::Upsert {
                table: table.to_string(),
                row_count: rows.len(),
            });
        Ok(())
    }

    fn patch_row(&self, table: &str, row_id: &str, _patch: &serde_json::Value) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(BackendCall::Patch {
                table: table.to_string(),
                row_id: row_id.to_string(),
            });
        Ok(())
    }

    fn delete_rows(&self, table: &str, row_ids: &[String]) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(BackendCall::Delete {
                table: table.to_string(),
                row_ids: row_ids.to_vec(),
            });
        Ok(())
    }
}
