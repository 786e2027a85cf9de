use std::time::Duration;

use serde::Deserialize;

/// Tuning knobs for the attachment queue and the outbound write pusher.
///
/// The defaults are deliberately conservative: high download parallelism has
/// exhausted backend connections in the field, so `download_concurrency`
/// stays small unless a deployment overrides it.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum simultaneously in-flight attachment downloads.
    pub download_concurrency: usize,
    /// Per-request timeout applied to every remote upload/download attempt.
    pub request_timeout_secs: u64,
    /// Cadence of the periodic trigger that re-runs upload/download passes.
    pub health_check_interval_secs: u64,
    /// Per-row updates against the backend are serialized in chunks this wide.
    pub patch_batch_size: usize,
    /// Maximum pending ops consumed per push pass.
    pub push_batch_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 5,
            request_timeout_secs: 30,
            health_check_interval_secs: 30,
            patch_batch_size: 10,
            push_batch_limit: 200,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}
