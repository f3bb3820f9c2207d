// # Memory History Store
//
// In-memory implementation of HistoryStore.
//
// Nothing survives a restart. Used by tests and by runs where history is
// not wanted on disk.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

use super::HistoryCollections;
use crate::Error;
use crate::config::HistoryStoreConfig;
use crate::traits::{
    AddressRecord, ClipboardSnapshot, HistoryStats, HistoryStore, HistoryStoreFactory, RecordKey,
    RecordKind,
};

/// In-memory history store
///
/// # Example
///
/// ```rust,no_run
/// use clipgeo_core::history::MemoryHistoryStore;
/// use clipgeo_core::traits::{ClipboardSnapshot, HistoryStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryHistoryStore::new();
///     store.add_snapshot(ClipboardSnapshot::new("hello", false)).await?;
///     assert_eq!(store.list_snapshots(10).await?.len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    inner: Arc<RwLock<HistoryCollections>>,
}

impl MemoryHistoryStore {
    /// Create a new empty memory history store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across both collections
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn add_address_record(&self, record: AddressRecord) -> Result<(), Error> {
        self.inner.write().await.push_record(record);
        Ok(())
    }

    async fn add_snapshot(&self, snapshot: ClipboardSnapshot) -> Result<(), Error> {
        self.inner.write().await.push_snapshot(snapshot);
        Ok(())
    }

    async fn list_address_records(&self, limit: usize) -> Result<Vec<AddressRecord>, Error> {
        Ok(self.inner.read().await.latest_records(limit))
    }

    async fn list_snapshots(&self, limit: usize) -> Result<Vec<ClipboardSnapshot>, Error> {
        Ok(self.inner.read().await.latest_snapshots(limit))
    }

    async fn search_address_records(&self, keyword: &str) -> Result<Vec<AddressRecord>, Error> {
        Ok(self.inner.read().await.search_records(keyword))
    }

    async fn search_snapshots(&self, keyword: &str) -> Result<Vec<ClipboardSnapshot>, Error> {
        Ok(self.inner.read().await.search_snapshots(keyword))
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool, Error> {
        Ok(self.inner.write().await.delete(key))
    }

    async fn clear(&self, kind: RecordKind) -> Result<usize, Error> {
        Ok(self.inner.write().await.clear(kind))
    }

    async fn statistics(&self) -> Result<HistoryStats, Error> {
        Ok(self.inner.read().await.statistics())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing to persist
        Ok(())
    }

    async fn backup_to(&self, path: &Path) -> Result<(), Error> {
        let document = self.inner.read().await.to_document()?;
        fs::write(path, document).await.map_err(|e| {
            Error::history(format!("Failed to write backup {}: {}", path.display(), e))
        })
    }

    async fn restore_from(&self, path: &Path) -> Result<usize, Error> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::history(format!("Failed to read backup {}: {}", path.display(), e))
        })?;
        let restored = HistoryCollections::from_document(&content)?;
        let rows = restored.len();
        *self.inner.write().await = restored;
        Ok(rows)
    }
}

/// Factory for [`MemoryHistoryStore`]
#[derive(Debug, Default)]
pub struct MemoryHistoryStoreFactory;

#[async_trait]
impl HistoryStoreFactory for MemoryHistoryStoreFactory {
    async fn create(&self, _config: &HistoryStoreConfig) -> Result<Box<dyn HistoryStore>, Error> {
        Ok(Box::new(MemoryHistoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{AddressFamily, GeoInfo};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryHistoryStore::new();
        assert!(store.is_empty().await);

        let info = GeoInfo {
            country: "Japan".to_string(),
            ..GeoInfo::default()
        };
        assert_ok!(
            store
                .add_address_record(AddressRecord::from_lookup("1.2.3.4", AddressFamily::V4, &info))
                .await
        );
        assert_ok!(store.add_snapshot(ClipboardSnapshot::new("1.2.3.4", true)).await);
        assert_eq!(store.len().await, 2);

        let records = store.list_address_records(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].country, "Japan");

        // Delete by address + timestamp
        assert!(store.delete(&records[0].key()).await.unwrap());
        assert!(!store.delete(&records[0].key()).await.unwrap());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_newest_first() {
        let store = MemoryHistoryStore::new();
        for text in ["first", "second", "third"] {
            store
                .add_snapshot(ClipboardSnapshot::new(text, false))
                .await
                .unwrap();
        }

        let snapshots = store.list_snapshots(2).await.unwrap();
        let texts: Vec<&str> = snapshots.iter().map(|s| s.raw_text.as_str()).collect();
        assert_eq!(texts, vec!["third", "second"]);
    }

    #[tokio::test]
    async fn test_memory_store_clear_and_export() {
        let store = MemoryHistoryStore::new();
        store
            .add_snapshot(ClipboardSnapshot::new("Hello 10.0.0.1", true))
            .await
            .unwrap();
        store
            .add_snapshot(ClipboardSnapshot::new("plain", false))
            .await
            .unwrap();

        let hits = store.search_snapshots("HELLO").await.unwrap();
        assert_eq!(hits.len(), 1);

        let exported = store.export_json(RecordKind::Snapshots, 1000).await.unwrap();
        let parsed: Vec<ClipboardSnapshot> = serde_json::from_str(&exported).unwrap();
        assert_eq!(parsed.len(), 2);

        assert_eq!(store.clear(RecordKind::Snapshots).await.unwrap(), 2);
        assert_eq!(store.clear(RecordKind::Addresses).await.unwrap(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_csv_export() {
        let store = MemoryHistoryStore::new();
        let info = GeoInfo {
            country: "Japan".to_string(),
            isp: "Example, Inc.".to_string(),
            latency_ms: Some(42),
            ..GeoInfo::default()
        };
        store
            .add_address_record(AddressRecord::from_lookup("1.2.3.4", AddressFamily::V4, &info))
            .await
            .unwrap();

        let csv = store.export_csv(RecordKind::Addresses, 1000).await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "timestamp,address,family,country,region,city,isp,latency_ms"
        );
        assert!(lines[1].contains(",1.2.3.4,IPv4,Japan,Unknown,Unknown,\"Example, Inc.\",42"));
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_backup_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup.json");

        let store = MemoryHistoryStore::new();
        store
            .add_snapshot(ClipboardSnapshot::new("keep me", false))
            .await
            .unwrap();
        store.backup_to(&backup).await.unwrap();

        store.clear(RecordKind::Snapshots).await.unwrap();
        assert_eq!(store.restore_from(&backup).await.unwrap(), 1);
        assert_eq!(store.list_snapshots(10).await.unwrap()[0].raw_text, "keep me");

        // A broken backup leaves the store alone
        std::fs::write(&backup, "not a backup").unwrap();
        assert!(store.restore_from(&backup).await.is_err());
        assert_eq!(store.len().await, 1);
    }
}
