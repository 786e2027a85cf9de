use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;

use anyhow::Result;

pub mod http;
pub mod localfs;

/// Server-side resized renditions of uploaded originals live under this
/// parallel path convention.
pub const RESIZED_PREFIX: &str = "resized/";

/// Error taxonomy of the storage boundary. Classification happens where the
/// underlying I/O call fails, never by inspecting message text downstream.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Connectivity-related failure. Expected in normal operation; queued
    /// work resolves once connectivity returns.
    #[error("offline: {0}")]
    Offline(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The remote store refused a non-overwriting upload because the object
    /// already exists. A conflict, not a success.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Every candidate path of a download attempt failed.
    #[error("all download paths failed: {}", format_attempts(attempts))]
    AllPathsFailed { attempts: Vec<(String, String)> },
}

fn format_attempts(attempts: &[(String, String)]) -> String {
    attempts
        .iter()
        .map(|(path, reason)| format!("{path}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn is_offline(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::Offline(_)))
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound(_)))
}

pub fn is_already_exists(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::AlreadyExists(_))
    )
}

/// Device-local blob tier. Must work fully offline. Two backings exist
/// (filesystem and in-memory); callers only ever see this trait.
pub trait LocalStorage: Send + Sync {
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;
    fn read_file(&self, path: &str) -> Result<Vec<u8>>;
    fn file_exists(&self, path: &str) -> Result<bool>;
    fn delete_file(&self, path: &str) -> Result<()>;
    fn copy_file(&self, src: &str, dst: &str) -> Result<()>;
    fn make_dir(&self, path: &str) -> Result<()>;
}

/// Remote object-store tier, keyed by opaque paths.
pub trait RemoteStorage: Send + Sync {
    fn upload_file(&self, path: &str, bytes: &[u8], media_type: &str, overwrite: bool)
        -> Result<()>;
    fn download_file(&self, path: &str) -> Result<Vec<u8>>;
    fn public_url(&self, path: &str) -> String;
}

/// Fetch `resized/<filename>` and `<filename>` in parallel and return the
/// first success, preferring the resized variant when both exist. A total
/// miss aggregates every path tried with its reason into one error.
pub fn download_preferring_resized(
    remote: &dyn RemoteStorage,
    filename: &str,
) -> Result<Vec<u8>> {
    let paths = [format!("{RESIZED_PREFIX}{filename}"), filename.to_string()];

    let mut results: Vec<Option<Result<Vec<u8>>>> = Vec::new();
    thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| scope.spawn(move || remote.download_file(path)))
            .collect();
        for handle in handles {
            results.push(Some(match handle.join() {
                Ok(res) => res,
                Err(_) => Err(anyhow::anyhow!("download thread panicked")),
            }));
        }
    });

    let mut attempts: Vec<(String, String)> = Vec::new();
    for (path, slot) in paths.iter().zip(results.iter_mut()) {
        match slot.take().expect("result slot filled above") {
            Ok(bytes) => return Ok(bytes),
            Err(e) => attempts.push((path.clone(), e.to_string())),
        }
    }

    Err(StoreError::AllPathsFailed { attempts }.into())
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// In-memory local tier: the durable key/value backing used where no real
/// filesystem is available. Also the storage double in tests.
pub struct InMemoryLocalStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    dirs: Mutex<BTreeSet<String>>,
}

impl InMemoryLocalStorage {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            dirs: Mutex::new(BTreeSet::new()),
        }
    }
}

impl Default for InMemoryLocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage for InMemoryLocalStorage {
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(normalize(path), data.to_vec());
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let path = normalize(path);
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files
            .get(&path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path).into())
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        Ok(files.contains_key(&normalize(path)))
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.remove(&normalize(path));
        Ok(())
    }

    fn copy_file(&self, src: &str, dst: &str) -> Result<()> {
        let bytes = self.read_file(src)?;
        self.write_file(dst, &bytes)
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        let mut dirs = self.dirs.lock().unwrap_or_else(|e| e.into_inner());
        dirs.insert(normalize(path));
        Ok(())
    }
}

/// In-memory remote tier for tests, with a connectivity switch so offline
/// behavior can be simulated deterministically.
pub struct InMemoryRemoteStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    offline: AtomicBool,
}

impl InMemoryRemoteStorage {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    pub fn contains(&self, path: &str) -> bool {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.contains_key(&normalize(path))
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(StoreError::Offline("simulated network unreachable".into()).into());
        }
        Ok(())
    }
}

impl Default for InMemoryRemoteStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStorage for InMemoryRemoteStorage {
    fn upload_file(
        &self,
        path: &str,
        bytes: &[u8],
        _media_type: &str,
        overwrite: bool,
    ) -> Result<()> {
        self.check_online()?;
        let path = normalize(path);
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if !overwrite && files.contains_key(&path) {
            return Err(StoreError::AlreadyExists(path).into());
        }
        files.insert(path, bytes.to_vec());
        Ok(())
    }

    fn download_file(&self, path: &str) -> Result<Vec<u8>> {
        self.check_online()?;
        let path = normalize(path);
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files
            .get(&path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path).into())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{}", normalize(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resized_variant_wins_when_both_exist() {
        let remote = InMemoryRemoteStorage::new();
        remote
            .upload_file("resized/a.jpg", b"small", "image/jpeg", true)
            .expect("put resized");
        remote
            .upload_file("a.jpg", b"original", "image/jpeg", true)
            .expect("put original");

        let bytes = download_preferring_resized(&remote, "a.jpg").expect("download");
        assert_eq!(bytes, b"small");
    }

    #[test]
    fn falls_back_to_original_when_no_resized_variant() {
        let remote = InMemoryRemoteStorage::new();
        remote
            .upload_file("a.jpg", b"original", "image/jpeg", true)
            .expect("put original");

        let bytes = download_preferring_resized(&remote, "a.jpg").expect("download");
        assert_eq!(bytes, b"original");
    }

    #[test]
    fn total_miss_aggregates_every_path() {
        let remote = InMemoryRemoteStorage::new();
        let err = download_preferring_resized(&remote, "a.jpg").expect_err("must fail");
        let Some(StoreError::AllPathsFailed { attempts }) = err.downcast_ref::<StoreError>()
        else {
            panic!("expected AllPathsFailed, got: {err}");
        };
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].0, "resized/a.jpg");
        assert_eq!(attempts[1].0, "a.jpg");
    }

    #[test]
    fn duplicate_upload_is_a_distinct_error() {
        let remote = InMemoryRemoteStorage::new();
        remote
            .upload_file("a.jpg", b"one", "image/jpeg", false)
            .expect("first put");
        let err = remote
            .upload_file("a.jpg", b"two", "image/jpeg", false)
            .expect_err("duplicate must fail");
        assert!(is_already_exists(&err));

        remote
            .upload_file("a.jpg", b"two", "image/jpeg", true)
            .expect("overwrite put");
        assert_eq!(remote.download_file("a.jpg").expect("get"), b"two");
    }
}
