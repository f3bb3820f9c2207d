//! Test doubles and common utilities for contract tests
//!
//! Every double counts its calls through shared `Arc` counters so a test can
//! hand one instance to the monitor and keep a twin for assertions.

#![allow(dead_code)]

use clipgeo_core::config::{ClipgeoConfig, MonitorSettings};
use clipgeo_core::error::{Error, LookupFailureKind, Result};
use clipgeo_core::history::MemoryHistoryStore;
use clipgeo_core::monitor::{ClipboardMonitor, MonitorEvent};
use clipgeo_core::notify::NotificationDispatcher;
use clipgeo_core::traits::{
    AddressRecord, ClipboardSnapshot, ClipboardSource, GeoInfo, GeoLookup, HistoryStats,
    HistoryStore, LookupRequest, NotificationBackend, NotificationContext, RecordKey, RecordKind,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// A clipboard whose content the test sets directly
#[derive(Clone, Default)]
pub struct ScriptedClipboard {
    text: Arc<Mutex<Option<String>>>,
    failing: Arc<Mutex<bool>>,
    read_count: Arc<AtomicUsize>,
}

impl ScriptedClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the clipboard content
    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = Some(text.to_string());
    }

    /// Make every read fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn read_count(&self) -> usize {
        self.read_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ClipboardSource for ScriptedClipboard {
    async fn read_text(&self) -> Result<Option<String>> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(Error::clipboard("clipboard is locked by another process"));
        }
        Ok(self.text.lock().unwrap().clone())
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A lookup that records every request
///
/// Addresses can be given a delay or a forced failure.
#[derive(Clone, Default)]
pub struct CountingLookup {
    call_count: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<String>>>,
    delays: Arc<Mutex<HashMap<String, Duration>>>,
    failures: Arc<Mutex<HashMap<String, LookupFailureKind>>>,
    panics: Arc<Mutex<HashSet<String>>>,
}

impl CountingLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay the response for one address
    pub fn with_delay(self, address: &str, delay: Duration) -> Self {
        self.delays
            .lock()
            .unwrap()
            .insert(address.to_string(), delay);
        self
    }

    /// Fail every lookup of one address
    pub fn with_failure(self, address: &str, kind: LookupFailureKind) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(address.to_string(), kind);
        self
    }

    /// Panic inside every lookup of one address
    pub fn with_panic(self, address: &str) -> Self {
        self.panics.lock().unwrap().insert(address.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GeoLookup for CountingLookup {
    async fn lookup(&self, request: &LookupRequest) -> Result<GeoInfo> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .unwrap()
            .push(request.address.clone());

        let delay = self.delays.lock().unwrap().get(&request.address).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.panics.lock().unwrap().contains(&request.address) {
            panic!("lookup double told to panic for {}", request.address);
        }

        let failure = self.failures.lock().unwrap().get(&request.address).copied();
        if let Some(kind) = failure {
            return Err(Error::lookup(kind, "scripted failure"));
        }

        Ok(GeoInfo {
            country: "Testland".to_string(),
            region: "Region".to_string(),
            city: format!("City of {}", request.address),
            isp: "Test ISP".to_string(),
            latitude: Some(1.5),
            longitude: Some(2.5),
            latency_ms: Some(7),
        })
    }

    fn lookup_name(&self) -> &'static str {
        "counting"
    }
}

/// A notification backend that logs every attempt into a shared list
pub struct RecordingBackend {
    name: &'static str,
    works: bool,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl RecordingBackend {
    pub fn new(name: &'static str, works: bool, attempts: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name,
            works,
            attempts: Arc::clone(attempts),
        }
    }
}

#[async_trait::async_trait]
impl NotificationBackend for RecordingBackend {
    async fn attempt(
        &self,
        _title: &str,
        _message: &str,
        _context: &NotificationContext,
    ) -> Result<()> {
        self.attempts.lock().unwrap().push(self.name.to_string());
        if self.works {
            Ok(())
        } else {
            Err(Error::notification(self.name, "scripted failure"))
        }
    }

    fn backend_name(&self) -> &str {
        self.name
    }
}

/// Memory store wrapper that counts flushes
#[derive(Clone, Default)]
pub struct FlushCountingStore {
    inner: MemoryHistoryStore,
    flush_count: Arc<AtomicUsize>,
}

impl FlushCountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HistoryStore for FlushCountingStore {
    async fn add_address_record(&self, record: AddressRecord) -> Result<()> {
        self.inner.add_address_record(record).await
    }

    async fn add_snapshot(&self, snapshot: ClipboardSnapshot) -> Result<()> {
        self.inner.add_snapshot(snapshot).await
    }

    async fn list_address_records(&self, limit: usize) -> Result<Vec<AddressRecord>> {
        self.inner.list_address_records(limit).await
    }

    async fn list_snapshots(&self, limit: usize) -> Result<Vec<ClipboardSnapshot>> {
        self.inner.list_snapshots(limit).await
    }

    async fn search_address_records(&self, keyword: &str) -> Result<Vec<AddressRecord>> {
        self.inner.search_address_records(keyword).await
    }

    async fn search_snapshots(&self, keyword: &str) -> Result<Vec<ClipboardSnapshot>> {
        self.inner.search_snapshots(keyword).await
    }

    async fn delete(&self, key: &RecordKey) -> Result<bool> {
        self.inner.delete(key).await
    }

    async fn clear(&self, kind: RecordKind) -> Result<usize> {
        self.inner.clear(kind).await
    }

    async fn statistics(&self) -> Result<HistoryStats> {
        self.inner.statistics().await
    }

    async fn flush(&self) -> Result<()> {
        self.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn backup_to(&self, path: &Path) -> Result<()> {
        self.inner.backup_to(path).await
    }

    async fn restore_from(&self, path: &Path) -> Result<usize> {
        self.inner.restore_from(path).await
    }
}

/// Everything a contract test needs to drive and observe a monitor
pub struct Harness {
    pub monitor: ClipboardMonitor,
    pub events: mpsc::Receiver<MonitorEvent>,
    pub settings_tx: watch::Sender<MonitorSettings>,
    pub clipboard: ScriptedClipboard,
    pub lookup: CountingLookup,
    pub history: FlushCountingStore,
    pub notifications: Arc<Mutex<Vec<String>>>,
}

/// Default configuration used by the contract tests
pub fn minimal_config() -> ClipgeoConfig {
    ClipgeoConfig::new()
}

/// Build a monitor over scripted doubles with one working notification backend
pub fn harness(lookup: CountingLookup, settings: MonitorSettings) -> Harness {
    let notifications = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = NotificationDispatcher::new(vec![Box::new(RecordingBackend::new(
        "recording",
        true,
        &notifications,
    ))]);

    harness_with_dispatcher(lookup, settings, dispatcher, notifications)
}

/// Build a monitor with a caller-supplied notification chain
pub fn harness_with_dispatcher(
    lookup: CountingLookup,
    settings: MonitorSettings,
    dispatcher: NotificationDispatcher,
    notifications: Arc<Mutex<Vec<String>>>,
) -> Harness {
    harness_with_store(
        lookup,
        settings,
        FlushCountingStore::new(),
        dispatcher,
        notifications,
    )
}

/// Build a monitor over a store the caller already shares with its doubles
pub fn harness_with_store(
    lookup: CountingLookup,
    settings: MonitorSettings,
    history: FlushCountingStore,
    dispatcher: NotificationDispatcher,
    notifications: Arc<Mutex<Vec<String>>>,
) -> Harness {
    let clipboard = ScriptedClipboard::new();
    let (settings_tx, settings_rx) = watch::channel(settings);

    let (monitor, events) = ClipboardMonitor::new(
        Box::new(clipboard.clone()),
        Arc::new(lookup.clone()),
        Arc::new(history.clone()),
        Arc::new(dispatcher),
        &minimal_config(),
        settings_rx,
    )
    .expect("monitor construction succeeds");

    Harness {
        monitor,
        events,
        settings_tx,
        clipboard,
        lookup,
        history,
        notifications,
    }
}

/// Drain every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
