//! Contract Test: Run Loop Lifecycle
//!
//! Constraints verified:
//! - The run loop polls on its own and stops promptly on shutdown
//! - History is flushed exactly once on the way out
//! - Settings updates are applied while running
//!
//! If this test fails, shutdown may lose history or hang.

mod common;

use clipgeo_core::config::MonitorSettings;
use clipgeo_core::monitor::MonitorEvent;
use clipgeo_core::traits::HistoryStore;
use common::*;
use std::time::Duration;

#[tokio::test]
async fn shutdown_flushes_history_once() {
    let h = harness(CountingLookup::new(), MonitorSettings::default());
    let Harness {
        mut monitor,
        mut events,
        settings_tx: _settings_tx,
        clipboard,
        lookup,
        history,
        ..
    } = h;

    clipboard.set_text("uplink 203.0.113.77");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { monitor.run_with_shutdown(Some(shutdown_rx)).await });

    // First tick fires immediately
    tokio::time::sleep(Duration::from_millis(100)).await;

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("monitor stops promptly")
        .unwrap()
        .unwrap();

    assert_eq!(history.flush_count(), 1);
    assert_eq!(history.list_snapshots(10).await.unwrap().len(), 1);
    assert_eq!(lookup.call_count(), 1);

    let events = drain_events(&mut events);
    assert!(matches!(events.first(), Some(MonitorEvent::Started { .. })));
    assert!(matches!(events.last(), Some(MonitorEvent::Stopped { .. })));
}

#[tokio::test]
async fn idle_monitor_does_no_lookups() {
    let h = harness(CountingLookup::new(), MonitorSettings::default());
    let Harness {
        mut monitor,
        settings_tx: _settings_tx,
        clipboard,
        lookup,
        history,
        ..
    } = h;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { monitor.run_with_shutdown(Some(shutdown_rx)).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert!(clipboard.read_count() >= 1);
    assert_eq!(lookup.call_count(), 0);
    assert_eq!(history.list_snapshots(10).await.unwrap().len(), 0);
}

#[tokio::test]
async fn settings_update_is_applied_while_running() {
    let h = harness(CountingLookup::new(), MonitorSettings::default());
    let Harness {
        mut monitor,
        mut events,
        settings_tx,
        ..
    } = h;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move {
        monitor.run_with_shutdown(Some(shutdown_rx)).await?;
        Ok::<_, clipgeo_core::Error>(monitor)
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    settings_tx
        .send(MonitorSettings {
            check_interval: 0.1,
            enable_ipv6: false,
            ..MonitorSettings::default()
        })
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(()).unwrap();
    let monitor = handle.await.unwrap().unwrap();

    // Interval clamped to the lower bound
    assert_eq!(monitor.state().polling_interval, Duration::from_millis(500));
    assert!(!monitor.state().filters.ipv6);

    let applied = drain_events(&mut events)
        .into_iter()
        .find(|e| matches!(e, MonitorEvent::SettingsApplied { .. }));
    assert!(matches!(
        applied,
        Some(MonitorEvent::SettingsApplied {
            interval,
            ..
        }) if interval == Duration::from_millis(500)
    ));
}

#[tokio::test]
async fn dropped_settings_sender_keeps_monitor_running() {
    let h = harness(CountingLookup::new(), MonitorSettings::default());
    let Harness {
        mut monitor,
        settings_tx,
        clipboard,
        lookup,
        ..
    } = h;
    drop(settings_tx);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move { monitor.run_with_shutdown(Some(shutdown_rx)).await });

    clipboard.set_text("10.9.8.7");
    tokio::time::sleep(Duration::from_millis(100)).await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(lookup.call_count(), 1);
}
