//! Sidecar lock files.
//!
//! Files that are replaced by rename cannot carry their own lock: a writer
//! waiting on the old inode would end up writing to a file that is no longer
//! on disk. Readers and writers of `<name>` instead lock `<name>.lock`,
//! which is never replaced.

use crate::Result;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held lock on the sidecar of a data file.
///
/// The lock is released when the guard is dropped and the file closed.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

impl FileLock {
    /// Block until no other process or thread holds any lock on `path`
    pub fn exclusive(path: &Path) -> Result<Self> {
        let file = open_sidecar(path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }

    /// Block until no writer holds the lock on `path`
    pub fn shared(path: &Path) -> Result<Self> {
        let file = open_sidecar(path)?;
        file.lock_shared()?;
        Ok(Self { _file: file })
    }
}

/// `<path>.lock`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn open_sidecar(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(sidecar_path(path))?;
    Ok(file)
}
