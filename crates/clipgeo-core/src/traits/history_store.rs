// # History Store Trait
//
// Defines the interface for persisting lookup results and clipboard
// snapshots.
//
// ## Collections
//
// - Address records: one per successful lookup
// - Clipboard snapshots: one per distinct clipboard change
//
// Both are append-only apart from explicit delete/clear.
//
// ## Implementations
//
// - In-memory: `history::MemoryHistoryStore`
// - JSON file: `history::FileHistoryStore`
//
// ## Usage
//
// ```rust,ignore
// use clipgeo_core::traits::{HistoryStore, RecordKind};
// use std::path::Path;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* HistoryStore implementation */;
//
//     for record in store.search_address_records("tokyo").await? {
//         println!("{} {}", record.timestamp, record.address);
//     }
//     println!("{}", store.export_json(RecordKind::Addresses, 1000).await?);
//     store.backup_to(Path::new("/tmp/history-backup.json")).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::geo_lookup::{AddressFamily, GeoInfo};

/// Maximum number of results a search returns
pub const SEARCH_LIMIT: usize = 100;

/// Default number of rows listed when the caller does not say
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Default number of rows included in an export
pub const DEFAULT_EXPORT_LIMIT: usize = 1000;

/// How many days the per-day lookup breakdown covers
pub const RECENT_DAYS: i64 = 7;

/// Placeholder written for empty location fields in CSV exports
const CSV_UNKNOWN: &str = "Unknown";

/// A successful lookup, as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Synthetic id, assigned by the store
    #[serde(default)]
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub address: String,
    pub family: AddressFamily,
    pub country: String,
    pub region: String,
    pub city: String,
    pub isp: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub lookup_latency_ms: Option<u64>,
}

impl AddressRecord {
    /// Build a record from a lookup result, stamped with the current time
    pub fn from_lookup(address: impl Into<String>, family: AddressFamily, info: &GeoInfo) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            address: address.into(),
            family,
            country: info.country.clone(),
            region: info.region.clone(),
            city: info.city.clone(),
            isp: info.isp.clone(),
            latitude: info.latitude,
            longitude: info.longitude,
            lookup_latency_ms: info.latency_ms,
        }
    }

    /// Key that identifies this record for deletion
    pub fn key(&self) -> RecordKey {
        RecordKey::Address {
            address: self.address.clone(),
            timestamp: self.timestamp,
        }
    }

    /// Case-insensitive substring match over the searchable fields
    ///
    /// `needle` must already be lowercase.
    pub(crate) fn matches(&self, needle: &str) -> bool {
        [
            &self.address,
            &self.country,
            &self.region,
            &self.city,
            &self.isp,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// A distinct clipboard content, as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardSnapshot {
    /// Synthetic id, assigned by the store
    #[serde(default)]
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub raw_text: String,
    pub contains_address: bool,
}

impl ClipboardSnapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(raw_text: impl Into<String>, contains_address: bool) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            raw_text: raw_text.into(),
            contains_address,
        }
    }

    /// Key that identifies this snapshot for deletion
    pub fn key(&self) -> RecordKey {
        RecordKey::Snapshot {
            timestamp: self.timestamp,
        }
    }
}

/// Which collection an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Address lookup records
    Addresses,
    /// Clipboard snapshots
    Snapshots,
}

impl std::str::FromStr for RecordKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "records" | "addresses" | "lookups" => Ok(RecordKind::Addresses),
            "snapshots" | "clipboard" => Ok(RecordKind::Snapshots),
            other => Err(crate::Error::invalid_input(format!(
                "Unknown history kind: {} (expected records or snapshots)",
                other
            ))),
        }
    }
}

/// Deletion key
///
/// Address records are keyed by address and timestamp, snapshots by
/// timestamp alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Address {
        address: String,
        timestamp: DateTime<Utc>,
    },
    Snapshot {
        timestamp: DateTime<Utc>,
    },
}

impl RecordKey {
    /// Collection this key belongs to
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordKey::Address { .. } => RecordKind::Addresses,
            RecordKey::Snapshot { .. } => RecordKind::Snapshots,
        }
    }
}

/// Lookups recorded on one UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

/// Aggregate counts over both collections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_records: usize,
    pub ipv4_records: usize,
    pub ipv6_records: usize,
    pub total_snapshots: usize,
    pub snapshots_with_address: usize,
    /// Lookups per day over the last [`RECENT_DAYS`] days, oldest first
    ///
    /// Days without lookups are left out.
    #[serde(default)]
    pub recent_days: Vec<DailyCount>,
}

/// Trait for history store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks; each
/// call is one atomic unit of work.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking for thread safety
///
/// ## Forbidden Capabilities
/// - ❌ Decide what gets recorded (owned by `ClipboardMonitor`)
/// - ❌ Spawn background tasks
///
/// Failures surface as [`crate::Error::History`]; the monitor logs them and
/// keeps polling.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an address record
    ///
    /// The store assigns the synthetic id; the id on `record` is ignored.
    async fn add_address_record(&self, record: AddressRecord) -> Result<(), crate::Error>;

    /// Append a clipboard snapshot
    ///
    /// The store assigns the synthetic id; the id on `snapshot` is ignored.
    async fn add_snapshot(&self, snapshot: ClipboardSnapshot) -> Result<(), crate::Error>;

    /// Most recent address records, newest first
    async fn list_address_records(&self, limit: usize)
    -> Result<Vec<AddressRecord>, crate::Error>;

    /// Most recent clipboard snapshots, newest first
    async fn list_snapshots(&self, limit: usize) -> Result<Vec<ClipboardSnapshot>, crate::Error>;

    /// Case-insensitive substring search over address, country, region,
    /// city and ISP, newest first, at most [`SEARCH_LIMIT`] results
    async fn search_address_records(
        &self,
        keyword: &str,
    ) -> Result<Vec<AddressRecord>, crate::Error>;

    /// Case-insensitive substring search over snapshot text, newest first,
    /// at most [`SEARCH_LIMIT`] results
    async fn search_snapshots(&self, keyword: &str)
    -> Result<Vec<ClipboardSnapshot>, crate::Error>;

    /// Delete one row
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: A row was removed
    /// - `Ok(false)`: Nothing matched the key
    /// - `Err(Error)`: Storage error
    async fn delete(&self, key: &RecordKey) -> Result<bool, crate::Error>;

    /// Remove every row of one collection, returning how many were removed
    async fn clear(&self, kind: RecordKind) -> Result<usize, crate::Error>;

    /// Aggregate counts
    async fn statistics(&self) -> Result<HistoryStats, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;

    /// Write every row to `path` as a history document
    ///
    /// The document has the same layout as the file store's history file, so
    /// a backup can be opened directly as a file store.
    async fn backup_to(&self, path: &Path) -> Result<(), crate::Error>;

    /// Replace every row with the contents of a history document
    ///
    /// The document is validated before anything is replaced. Returns the
    /// number of rows now held.
    async fn restore_from(&self, path: &Path) -> Result<usize, crate::Error>;

    /// Export the newest `limit` rows of one collection as pretty JSON
    async fn export_json(&self, kind: RecordKind, limit: usize) -> Result<String, crate::Error> {
        let json = match kind {
            RecordKind::Addresses => {
                serde_json::to_string_pretty(&self.list_address_records(limit).await?)?
            }
            RecordKind::Snapshots => serde_json::to_string_pretty(&self.list_snapshots(limit).await?)?,
        };
        Ok(json)
    }

    /// Export the newest `limit` rows of one collection as CSV with a header row
    async fn export_csv(&self, kind: RecordKind, limit: usize) -> Result<String, crate::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        match kind {
            RecordKind::Addresses => {
                writer
                    .write_record([
                        "timestamp", "address", "family", "country", "region", "city", "isp",
                        "latency_ms",
                    ])
                    .map_err(csv_error)?;
                for record in self.list_address_records(limit).await? {
                    let latency = record
                        .lookup_latency_ms
                        .map(|ms| ms.to_string())
                        .unwrap_or_default();
                    writer
                        .write_record([
                            record.timestamp.to_rfc3339().as_str(),
                            record.address.as_str(),
                            record.family.label(),
                            or_unknown(&record.country),
                            or_unknown(&record.region),
                            or_unknown(&record.city),
                            or_unknown(&record.isp),
                            latency.as_str(),
                        ])
                        .map_err(csv_error)?;
                }
            }
            RecordKind::Snapshots => {
                writer
                    .write_record(["timestamp", "contains_address", "text"])
                    .map_err(csv_error)?;
                for snapshot in self.list_snapshots(limit).await? {
                    writer
                        .write_record([
                            snapshot.timestamp.to_rfc3339().as_str(),
                            if snapshot.contains_address { "true" } else { "false" },
                            snapshot.raw_text.as_str(),
                        ])
                        .map_err(csv_error)?;
                }
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| crate::Error::history(format!("Failed to finish CSV export: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| crate::Error::history(format!("CSV export is not UTF-8: {}", e)))
    }
}

fn csv_error(err: csv::Error) -> crate::Error {
    crate::Error::history(format!("Failed to write CSV row: {}", err))
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { CSV_UNKNOWN } else { value }
}

/// Helper trait for constructing history stores from configuration
#[async_trait]
pub trait HistoryStoreFactory: Send + Sync {
    /// Create a HistoryStore instance from configuration
    async fn create(
        &self,
        config: &crate::config::HistoryStoreConfig,
    ) -> Result<Box<dyn HistoryStore>, crate::Error>;
}
