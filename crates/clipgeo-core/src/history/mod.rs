// # History Store Implementations
//
// This module provides implementations of the HistoryStore trait for
// different persistence strategies. Both operate on the same collections;
// the memory store keeps them in process, the file store keeps them only on
// disk and re-reads them for every call.
//
// ## History Document
//
// The file store's history file, backups and restores all use one layout:
//
// ```json
// {
//   "version": "1.0",
//   "history": {
//     "next_id": 2,
//     "records": [
//       {
//         "id": 1,
//         "timestamp": "2025-01-09T12:00:00Z",
//         "address": "203.0.113.5",
//         "family": "IPv4",
//         "country": "...", "region": "...", "city": "...", "isp": "...",
//         "latitude": 35.6, "longitude": 139.7, "lookup_latency_ms": 42
//       }
//     ],
//     "snapshots": [
//       { "id": 2, "timestamp": "...", "raw_text": "...", "contains_address": true }
//     ]
//   }
// }
// ```

pub mod file;
pub mod memory;

pub use file::{FileHistoryStore, FileHistoryStoreFactory};
pub use memory::{MemoryHistoryStore, MemoryHistoryStoreFactory};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Error;
use crate::traits::history_store::SEARCH_LIMIT;
use crate::traits::{
    AddressFamily, AddressRecord, ClipboardSnapshot, DailyCount, HistoryStats, RECENT_DAYS,
    RecordKey, RecordKind,
};

/// History document format version
const HISTORY_DOCUMENT_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocument {
    version: String,
    history: HistoryCollections,
}

/// Both record collections, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct HistoryCollections {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    records: Vec<AddressRecord>,
    #[serde(default)]
    snapshots: Vec<ClipboardSnapshot>,
}

impl HistoryCollections {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn push_record(&mut self, mut record: AddressRecord) {
        record.id = self.allocate_id();
        self.records.push(record);
    }

    pub(crate) fn push_snapshot(&mut self, mut snapshot: ClipboardSnapshot) {
        snapshot.id = self.allocate_id();
        self.snapshots.push(snapshot);
    }

    pub(crate) fn latest_records(&self, limit: usize) -> Vec<AddressRecord> {
        self.records.iter().rev().take(limit).cloned().collect()
    }

    pub(crate) fn latest_snapshots(&self, limit: usize) -> Vec<ClipboardSnapshot> {
        self.snapshots.iter().rev().take(limit).cloned().collect()
    }

    pub(crate) fn search_records(&self, keyword: &str) -> Vec<AddressRecord> {
        let needle = keyword.to_lowercase();
        self.records
            .iter()
            .rev()
            .filter(|record| record.matches(&needle))
            .take(SEARCH_LIMIT)
            .cloned()
            .collect()
    }

    pub(crate) fn search_snapshots(&self, keyword: &str) -> Vec<ClipboardSnapshot> {
        let needle = keyword.to_lowercase();
        self.snapshots
            .iter()
            .rev()
            .filter(|snapshot| snapshot.raw_text.to_lowercase().contains(&needle))
            .take(SEARCH_LIMIT)
            .cloned()
            .collect()
    }

    /// Remove every row matching the key
    pub(crate) fn delete(&mut self, key: &RecordKey) -> bool {
        match key {
            RecordKey::Address { address, timestamp } => {
                let before = self.records.len();
                self.records
                    .retain(|r| !(r.address == *address && r.timestamp == *timestamp));
                self.records.len() != before
            }
            RecordKey::Snapshot { timestamp } => {
                let before = self.snapshots.len();
                self.snapshots.retain(|s| s.timestamp != *timestamp);
                self.snapshots.len() != before
            }
        }
    }

    pub(crate) fn clear(&mut self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Addresses => std::mem::take(&mut self.records).len(),
            RecordKind::Snapshots => std::mem::take(&mut self.snapshots).len(),
        }
    }

    pub(crate) fn statistics(&self) -> HistoryStats {
        self.statistics_at(Utc::now())
    }

    fn statistics_at(&self, now: DateTime<Utc>) -> HistoryStats {
        let ipv4_records = self
            .records
            .iter()
            .filter(|r| r.family == AddressFamily::V4)
            .count();

        HistoryStats {
            total_records: self.records.len(),
            ipv4_records,
            ipv6_records: self.records.len() - ipv4_records,
            total_snapshots: self.snapshots.len(),
            snapshots_with_address: self
                .snapshots
                .iter()
                .filter(|s| s.contains_address)
                .count(),
            recent_days: self.recent_days(now),
        }
    }

    /// Lookups per UTC day since `now` minus [`RECENT_DAYS`]
    fn recent_days(&self, now: DateTime<Utc>) -> Vec<DailyCount> {
        let since = now - Duration::days(RECENT_DAYS);
        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for record in self.records.iter().filter(|r| r.timestamp >= since) {
            *per_day.entry(record.timestamp.date_naive()).or_default() += 1;
        }

        per_day
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len() + self.snapshots.len()
    }

    /// Serialize as a pretty history document
    pub(crate) fn to_document(&self) -> Result<String, Error> {
        let document = HistoryDocument {
            version: HISTORY_DOCUMENT_VERSION.to_string(),
            history: self.clone(),
        };
        serde_json::to_string_pretty(&document)
            .map_err(|e| Error::history(format!("Failed to serialize history: {}", e)))
    }

    /// Parse a history document
    ///
    /// A parse failure is returned as [`Error::Json`] so callers can tell
    /// corruption apart from I/O errors.
    pub(crate) fn from_document(content: &str) -> Result<Self, Error> {
        let document: HistoryDocument = serde_json::from_str(content)?;

        if document.version != HISTORY_DOCUMENT_VERSION {
            tracing::warn!(
                "History document version mismatch: expected {}, got {}. Attempting to load anyway.",
                HISTORY_DOCUMENT_VERSION,
                document.version
            );
        }

        Ok(document.history)
    }
}
