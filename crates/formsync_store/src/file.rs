//! File-based snapshot backend for persistent storage.

use crate::backend::StoreBackend;
use crate::error::StoreResult;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A file-based snapshot backend.
///
/// The snapshot is written to a sibling temporary file, synced, then
/// renamed over the target, so a crash mid-write keeps the old snapshot.
///
/// # Example
///
/// ```no_run
/// use formsync_store::{FileBackend, StoreBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("formsync.json")).unwrap();
/// backend.persist(b"{}").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Opens a file backend at the given path. The file need not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the path exists but is a directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if path.is_dir() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            )
            .into());
        }
        Ok(Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    /// Opens a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StoreBackend for FileBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, snapshot: &[u8]) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp)?;
            file.write_all(snapshot)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}
