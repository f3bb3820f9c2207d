//! Contract Test: Notification Fallback Chain
//!
//! Constraints verified:
//! - Backends are tried strictly in registration order
//! - The first success stops the chain
//! - A failing backend or probe never prevents the others
//! - Disabled notifications mean no backend is touched
//! - The lookup record is stored before any backend is tried
//!
//! If this test fails, users may miss notifications or get duplicates.

mod common;

use clipgeo_core::config::MonitorSettings;
use clipgeo_core::error::Error;
use clipgeo_core::monitor::MonitorEvent;
use clipgeo_core::notify::{BackendRegistry, NotificationDispatcher};
use clipgeo_core::traits::{
    BackendFactory, HistoryStore, NotificationBackend, NotificationContext,
};
use common::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn context() -> NotificationContext {
    NotificationContext::for_address(
        "203.0.113.5",
        "https://ipv4.ink/203.0.113.5",
        Duration::from_secs(10),
    )
}

#[tokio::test]
async fn third_backend_delivers_after_two_failures() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = NotificationDispatcher::new(vec![
        Box::new(RecordingBackend::new("native", false, &attempts)),
        Box::new(RecordingBackend::new("tray", false, &attempts)),
        Box::new(RecordingBackend::new("console", true, &attempts)),
    ]);

    let delivered = dispatcher.notify("title", "message", &context()).await;

    assert!(delivered);
    assert_eq!(
        *attempts.lock().unwrap(),
        vec!["native".to_string(), "tray".to_string(), "console".to_string()]
    );
}

#[tokio::test]
async fn report_lists_every_attempt() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = NotificationDispatcher::new(vec![
        Box::new(RecordingBackend::new("native", false, &attempts)),
        Box::new(RecordingBackend::new("tray", true, &attempts)),
        Box::new(RecordingBackend::new("console", true, &attempts)),
    ]);

    let report = dispatcher
        .notify_with_report("title", "message", &context())
        .await;

    assert_eq!(report.len(), 2);
    assert!(!report[0].succeeded);
    assert!(report[0].error.as_deref().unwrap().contains("native"));
    assert!(report[1].succeeded);
    assert_eq!(attempts.lock().unwrap().len(), 2, "console must not be tried");
}

#[tokio::test]
async fn all_backends_failing_is_not_an_error() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = NotificationDispatcher::new(vec![
        Box::new(RecordingBackend::new("native", false, &attempts)),
        Box::new(RecordingBackend::new("console", false, &attempts)),
    ]);

    assert!(!dispatcher.notify("title", "message", &context()).await);
    assert_eq!(attempts.lock().unwrap().len(), 2);
}

struct ProbeFactory {
    name: &'static str,
    available: bool,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl BackendFactory for ProbeFactory {
    fn probe(&self) -> Result<Box<dyn NotificationBackend>, Error> {
        if self.available {
            Ok(Box::new(RecordingBackend::new(self.name, true, &self.attempts)))
        } else {
            Err(Error::notification(self.name, "helper not installed"))
        }
    }
}

#[tokio::test]
async fn failed_probe_only_removes_that_backend() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let mut registry = BackendRegistry::new();
    for (name, available) in [("native", false), ("tray", true), ("console", true)] {
        registry.register_backend(
            name,
            Box::new(ProbeFactory {
                name,
                available,
                attempts: Arc::clone(&attempts),
            }),
        );
    }

    let dispatcher = registry.build();
    assert_eq!(dispatcher.backend_names(), vec!["tray", "console"]);

    assert!(dispatcher.notify("title", "message", &context()).await);
    assert_eq!(*attempts.lock().unwrap(), vec!["tray".to_string()]);
}

#[tokio::test]
async fn monitor_uses_chain_after_recording() {
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = NotificationDispatcher::new(vec![
        Box::new(RecordingBackend::new("native", false, &attempts)),
        Box::new(RecordingBackend::new("console", true, &attempts)),
    ]);
    let mut h = harness_with_dispatcher(
        CountingLookup::new(),
        MonitorSettings::default(),
        dispatcher,
        Arc::clone(&attempts),
    );

    h.clipboard.set_text("203.0.113.5");
    h.monitor.poll_once().await;
    h.monitor.settle_lookups().await;

    assert_eq!(
        *attempts.lock().unwrap(),
        vec!["native".to_string(), "console".to_string()]
    );
    let events = drain_events(&mut h.events);
    assert!(events.contains(&MonitorEvent::NotificationSent {
        address: "203.0.113.5".to_string(),
        delivered: true,
    }));
}

/// Backend that notes how many lookup records the store holds when it runs
struct HistoryCheckingBackend {
    history: FlushCountingStore,
    seen: Arc<Mutex<Vec<usize>>>,
}

#[async_trait::async_trait]
impl NotificationBackend for HistoryCheckingBackend {
    async fn attempt(
        &self,
        _title: &str,
        _message: &str,
        _context: &NotificationContext,
    ) -> Result<(), Error> {
        let stored = self.history.list_address_records(10).await?.len();
        self.seen.lock().unwrap().push(stored);
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "history-checking"
    }
}

#[tokio::test]
async fn record_is_stored_before_notification() {
    let history = FlushCountingStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = NotificationDispatcher::new(vec![Box::new(HistoryCheckingBackend {
        history: history.clone(),
        seen: Arc::clone(&seen),
    })]);
    let mut h = harness_with_store(
        CountingLookup::new(),
        MonitorSettings::default(),
        history,
        dispatcher,
        Arc::new(Mutex::new(Vec::new())),
    );

    h.clipboard.set_text("203.0.113.5");
    h.monitor.poll_once().await;
    h.monitor.settle_lookups().await;

    assert_eq!(*seen.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn disabled_notifications_skip_the_chain() {
    let settings = MonitorSettings {
        notifications: false,
        ..MonitorSettings::default()
    };
    let mut h = harness(CountingLookup::new(), settings);

    h.clipboard.set_text("203.0.113.5");
    h.monitor.poll_once().await;
    h.monitor.settle_lookups().await;

    assert_eq!(h.lookup.call_count(), 1);
    assert!(h.notifications.lock().unwrap().is_empty());
}
