// # clipgeo-core
//
// Core library for the clipboard address monitor.
//
// ## Architecture Overview
//
// - **AddressMatcher**: Finds valid IPv4/IPv6 literals in free-form text
// - **ClipboardSource**: Trait for reading the clipboard
// - **GeoLookup**: Trait for resolving an address to location data
// - **HistoryStore**: Trait for persisting lookups and clipboard snapshots
// - **NotificationDispatcher**: Ordered notification fallback chain
// - **ClipboardMonitor**: Polls the clipboard and drives everything above
// - **ComponentRegistry**: Plugin-based registry for sources, lookups and stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from platform and network code
// 2. **Never block the poll loop**: Lookups run on their own tasks
// 3. **Plugin-Based**: Implementations are registered, not hardcoded
// 4. **Library-First**: Everything the daemon does is available as a library
// 5. **Failure isolation**: No subsystem failure stops polling

pub mod config;
pub mod error;
pub mod history;
pub mod matcher;
pub mod monitor;
pub mod notify;
pub mod registry;
pub mod traits;

// Re-export core types for convenience
pub use config::{ClipgeoConfig, HistoryStoreConfig, LookupConfig, MonitorSettings, NotificationConfig};
pub use error::{Error, LookupFailureKind, Result};
pub use history::{FileHistoryStore, MemoryHistoryStore};
pub use matcher::{AddressMatcher, DetectedAddress, FamilyFilters, find_addresses};
pub use monitor::{ClipboardMonitor, LookupCompletion, MonitorEvent, MonitorPhase, MonitorState};
pub use notify::{BackendRegistry, DeliveryAttemptResult, NotificationDispatcher};
pub use registry::ComponentRegistry;
pub use traits::{ClipboardSource, GeoLookup, HistoryStore, NotificationBackend};
