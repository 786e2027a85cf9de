use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;

use super::{LocalStorage, StoreError};

/// Filesystem backing for the local blob tier. Paths are relative suffixes
/// resolved under `root` (the device's app directory).
#[derive(Clone, Debug)]
pub struct FsLocalStorage {
    root: PathBuf,
}

impl FsLocalStorage {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl LocalStorage for FsLocalStorage {
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, data)?;
        Ok(())
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match fs::read(self.resolve(path)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path).is_file())
    }

    fn delete_file(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn copy_file(&self, src: &str, dst: &str) -> Result<()> {
        let to = self.resolve(dst);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::copy(self.resolve(src), to) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(src.to_string()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn make_dir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }
}
