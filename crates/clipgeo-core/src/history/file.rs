// # File History Store
//
// File-based implementation of HistoryStore with crash recovery.
//
// ## Concurrency
//
// The daemon and one-shot `clipgeod history ...` commands open the same file
// from different processes. The file is therefore the only state: every call
// takes an advisory lock on a sibling `.lock` file, re-reads the history,
// applies its change to that fresh copy and writes it back before releasing
// the lock. A delete made by one process can never be undone by another
// process writing out an older copy.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of the previous good file
// - Recovery: Falls back to backup if corruption detected
//
// A failed write leaves both the file and the caller's view unchanged, so a
// retried call is applied exactly once.
//
// See the `history` module docs for the file layout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::HistoryCollections;
use crate::Error;
use crate::config::HistoryStoreConfig;
use crate::traits::{
    AddressRecord, ClipboardSnapshot, HistoryStats, HistoryStore, HistoryStoreFactory, RecordKey,
    RecordKind,
};

/// File-based history store with crash recovery
///
/// Every mutation is written through to disk before the call returns.
///
/// # Example
///
/// ```rust,no_run
/// use clipgeo_core::history::FileHistoryStore;
/// use clipgeo_core::traits::{ClipboardSnapshot, HistoryStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileHistoryStore::new("/var/lib/clipgeo/history.json").await?;
///     store.add_snapshot(ClipboardSnapshot::new("203.0.113.5", true)).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileHistoryStore {
    path: PathBuf,
    /// Serializes callers within this process; the lock file covers other processes
    local_lock: Mutex<()>,
}

/// Exclusive advisory lock on the history's `.lock` file, released on drop
struct FileLock {
    _file: std::fs::File,
}

impl FileHistoryStore {
    /// Create or load a file history store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing history file
    /// 3. If it is corrupted, try the backup
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create history directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let store = Self {
            path,
            local_lock: Mutex::new(()),
        };

        let history = store.read().await?;
        tracing::debug!(
            "Opened history file {}: {} rows",
            store.path.display(),
            history.len()
        );

        Ok(store)
    }

    /// Path of the history file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load history with automatic recovery
    ///
    /// Only a parse failure counts as corruption; other I/O errors are returned.
    async fn load_with_recovery(path: &Path) -> Result<HistoryCollections, Error> {
        let err = match Self::load(path).await {
            Ok(history) => return Ok(history),
            Err(Error::Json(err)) => err,
            Err(other) => return Err(other),
        };

        tracing::warn!(
            "History file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty history.");
            return Ok(HistoryCollections::default());
        }

        match Self::load(&backup_path).await {
            Ok(history) => {
                tracing::info!("Recovered history from backup: {} rows", history.len());

                if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!(
                        "Failed to restore history file from backup: {}",
                        restore_err
                    );
                }

                Ok(history)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also unreadable: {}. Starting with empty history.",
                    backup_err
                );
                Ok(HistoryCollections::default())
            }
        }
    }

    async fn load(path: &Path) -> Result<HistoryCollections, Error> {
        if !path.exists() {
            tracing::trace!("History file does not exist: {}", path.display());
            return Ok(HistoryCollections::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::history(format!(
                "Failed to read history file {}: {}",
                path.display(),
                e
            ))
        })?;

        HistoryCollections::from_document(&content)
    }

    /// Write history to file atomically
    ///
    /// Callers hold the file lock.
    async fn write_history(&self, history: &HistoryCollections) -> Result<(), Error> {
        let json = history.to_document()?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::history(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.write_all(json.as_bytes()).await.map_err(|e| {
                Error::history(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            temp.flush().await.map_err(|e| {
                Error::history(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create history backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::history(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("History written to file: {}", self.path.display());
        Ok(())
    }

    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::history(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored history file from backup");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    fn lock_path(&self) -> PathBuf {
        let mut lock = self.path.clone();
        lock.set_extension("lock");
        lock
    }

    /// Block until this process holds the lock file
    async fn lock_file(&self) -> Result<FileLock, Error> {
        let lock_path = self.lock_path();

        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)?;
            file.lock()?;
            Ok::<_, std::io::Error>(FileLock { _file: file })
        })
        .await
        .map_err(|e| Error::history(format!("History lock task failed: {}", e)))?
        .map_err(|e| Error::history(format!("Failed to lock history file: {}", e)))
    }

    /// Current history as stored on disk
    async fn read(&self) -> Result<HistoryCollections, Error> {
        let _local = self.local_lock.lock().await;
        let _file = self.lock_file().await?;
        Self::load_with_recovery(&self.path).await
    }

    /// Apply a change to the stored history
    ///
    /// The change runs on a freshly loaded copy that is only written when `f`
    /// reports a change. Nothing is kept when the write fails.
    async fn update<T>(
        &self,
        f: impl FnOnce(&mut HistoryCollections) -> (T, bool),
    ) -> Result<T, Error> {
        let _local = self.local_lock.lock().await;
        let _file = self.lock_file().await?;

        let mut history = Self::load_with_recovery(&self.path).await?;
        let (out, changed) = f(&mut history);
        if changed {
            self.write_history(&history).await?;
        }
        Ok(out)
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn add_address_record(&self, record: AddressRecord) -> Result<(), Error> {
        self.update(|history| {
            history.push_record(record);
            ((), true)
        })
        .await
    }

    async fn add_snapshot(&self, snapshot: ClipboardSnapshot) -> Result<(), Error> {
        self.update(|history| {
            history.push_snapshot(snapshot);
            ((), true)
        })
        .await
    }

    async fn list_address_records(&self, limit: usize) -> Result<Vec<AddressRecord>, Error> {
        Ok(self.read().await?.latest_records(limit))
    }

    async fn list_snapshots(&self, limit: usize) -> Result<Vec<ClipboardSnapshot>, Error> {
        Ok(self.read().await?.latest_snapshots(limit))
    }

    async fn search_address_records(&self, keyword: &str) -> Result<Vec<AddressRecord>, Error> {
        Ok(self.read().await?.search_records(keyword))
    }

    async fn search_snapshots(&self, keyword: &str) -> Result<Vec<ClipboardSnapshot>, Error> {
        Ok(self.read().await?.search_snapshots(keyword))
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool, Error> {
        self.update(|history| {
            let removed = history.delete(key);
            (removed, removed)
        })
        .await
    }

    async fn clear(&self, kind: RecordKind) -> Result<usize, Error> {
        self.update(|history| {
            let removed = history.clear(kind);
            (removed, removed > 0)
        })
        .await
    }

    async fn statistics(&self) -> Result<HistoryStats, Error> {
        Ok(self.read().await?.statistics())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every change is already on disk
        Ok(())
    }

    async fn backup_to(&self, path: &Path) -> Result<(), Error> {
        let document = self.read().await?.to_document()?;
        fs::write(path, document).await.map_err(|e| {
            Error::history(format!("Failed to write backup {}: {}", path.display(), e))
        })?;

        tracing::info!("History backed up to {}", path.display());
        Ok(())
    }

    async fn restore_from(&self, path: &Path) -> Result<usize, Error> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::history(format!("Failed to read backup {}: {}", path.display(), e))
        })?;
        let restored = HistoryCollections::from_document(&content)?;

        let rows = self
            .update(move |history| {
                *history = restored;
                (history.len(), true)
            })
            .await?;

        tracing::info!("History restored from {}: {} rows", path.display(), rows);
        Ok(rows)
    }
}

/// Factory for [`FileHistoryStore`]
#[derive(Debug, Default)]
pub struct FileHistoryStoreFactory;

#[async_trait]
impl HistoryStoreFactory for FileHistoryStoreFactory {
    async fn create(&self, config: &HistoryStoreConfig) -> Result<Box<dyn HistoryStore>, Error> {
        match config {
            HistoryStoreConfig::File { path } => Ok(Box::new(FileHistoryStore::new(path).await?)),
            other => Err(Error::config(format!(
                "File history factory cannot build a '{}' store",
                other.type_name()
            ))),
        }
    }
}
