//! Core traits for clipgeo
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`ClipboardSource`]: Read the current clipboard text
//! - [`GeoLookup`]: Resolve an address to location data
//! - [`HistoryStore`]: Persist lookups and clipboard snapshots
//! - [`NotificationBackend`]: Deliver one notification through one channel

pub mod clipboard_source;
pub mod geo_lookup;
pub mod history_store;
pub mod notification_backend;

pub use clipboard_source::{ClipboardSource, ClipboardSourceFactory};
pub use geo_lookup::{AddressFamily, GeoInfo, GeoLookup, GeoLookupFactory, LookupRequest};
pub use history_store::{
    AddressRecord, ClipboardSnapshot, DEFAULT_EXPORT_LIMIT, DEFAULT_LIST_LIMIT, DailyCount,
    HistoryStats, HistoryStore, HistoryStoreFactory, RECENT_DAYS, RecordKey, RecordKind,
    SEARCH_LIMIT,
};
pub use notification_backend::{BackendFactory, NotificationBackend, NotificationContext};
