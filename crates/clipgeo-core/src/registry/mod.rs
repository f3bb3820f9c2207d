//! Plugin-based component registry
//!
//! The registry lets clipboard sources, geo lookups and history stores be
//! registered at runtime, so the daemon never hardcodes which implementation
//! it builds. Notification backends have their own ordered registry in
//! [`crate::notify::BackendRegistry`].
//!
//! ## Registration
//!
//! Implementations register themselves during initialization:
//!
//! ```rust,ignore
//! // In clipgeo-geo-http
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_geo_lookup("http", Box::new(HttpGeoLookupFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{HistoryStoreConfig, LookupConfig};
use crate::error::{Error, Result};
use crate::history::{FileHistoryStoreFactory, MemoryHistoryStoreFactory};
use crate::traits::{ClipboardSource, GeoLookup, HistoryStore};
use crate::traits::{ClipboardSourceFactory, GeoLookupFactory, HistoryStoreFactory};

/// Registry for plugin-based component creation
///
/// Uses interior mutability with RwLock, allowing concurrent reads and
/// exclusive writes.
#[derive(Default)]
pub struct ComponentRegistry {
    clipboard_sources: RwLock<HashMap<String, Box<dyn ClipboardSourceFactory>>>,
    geo_lookups: RwLock<HashMap<String, Box<dyn GeoLookupFactory>>>,
    history_stores: RwLock<HashMap<String, Arc<dyn HistoryStoreFactory>>>,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in history stores ("memory", "file")
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_history_store("memory", Box::new(MemoryHistoryStoreFactory));
        registry.register_history_store("file", Box::new(FileHistoryStoreFactory));
        registry
    }

    /// Register a clipboard source factory
    pub fn register_clipboard_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn ClipboardSourceFactory>,
    ) {
        self.clipboard_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a geo lookup factory
    pub fn register_geo_lookup(&self, name: impl Into<String>, factory: Box<dyn GeoLookupFactory>) {
        self.geo_lookups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Register a history store factory
    pub fn register_history_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn HistoryStoreFactory>,
    ) {
        self.history_stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::from(factory));
    }

    /// Create a clipboard source by name
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn ClipboardSource>)`: Created source
    /// - `Err(Error)`: If the name is not registered or creation fails
    pub fn create_clipboard_source(&self, name: &str) -> Result<Box<dyn ClipboardSource>> {
        let sources = self
            .clipboard_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown clipboard source: {}", name)))?;

        factory.create()
    }

    /// Create a geo lookup by name
    pub fn create_geo_lookup(&self, name: &str, config: &LookupConfig) -> Result<Box<dyn GeoLookup>> {
        let lookups = self
            .geo_lookups
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = lookups
            .get(name)
            .ok_or_else(|| Error::config(format!("Unknown geo lookup: {}", name)))?;

        factory.create(config)
    }

    /// Create a history store from configuration
    pub async fn create_history_store(
        &self,
        config: &HistoryStoreConfig,
    ) -> Result<Box<dyn HistoryStore>> {
        let store_type = config.type_name();

        // Release the lock before calling async create
        let factory = {
            let stores = self
                .history_stores
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            stores
                .get(store_type)
                .ok_or_else(|| Error::config(format!("Unknown history store type: {}", store_type)))?
                .clone()
        };

        factory.create(config).await
    }

    /// List registered clipboard source names
    pub fn list_clipboard_sources(&self) -> Vec<String> {
        self.clipboard_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// List registered geo lookup names
    pub fn list_geo_lookups(&self) -> Vec<String> {
        self.geo_lookups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Check if a history store type is registered
    pub fn has_history_store(&self, name: &str) -> bool {
        self.history_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
