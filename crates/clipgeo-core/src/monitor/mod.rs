//! Clipboard monitor
//!
//! The ClipboardMonitor is responsible for:
//! - Polling the clipboard on a fixed cadence
//! - Recording every distinct clipboard content
//! - Detecting the first address in new content
//! - Spawning a lookup for each newly tracked address
//! - Applying lookup results to the display state
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   tick   ┌──────────────────┐
//! │ ClipboardSource │◀─────────│ ClipboardMonitor │◀── settings (watch)
//! └─────────────────┘          └──────────────────┘
//!                                │      ▲
//!                       snapshot │      │ LookupCompletion
//!                                ▼      │
//!                        ┌────────────┐ │
//!                        │HistoryStore│ │
//!                        └────────────┘ │
//!                                ▲      │
//!                         record │      │
//!                      ┌─────────┴──────┴─────────┐
//!                      │ lookup task (tokio::spawn)│──▶ NotificationDispatcher
//!                      └──────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! For one address the record is written before the notification is sent,
//! and both happen before the completion reaches the monitor. A completion
//! for an address that is no longer tracked is still recorded and notified
//! but never replaces the current detail.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ClipgeoConfig, LookupConfig, MonitorSettings};
use crate::error::{Error, LookupFailureKind, Result};
use crate::matcher::{AddressMatcher, DetectedAddress, FamilyFilters};
use crate::notify::NotificationDispatcher;
use crate::traits::{
    AddressFamily, AddressRecord, ClipboardSnapshot, ClipboardSource, GeoInfo, GeoLookup,
    HistoryStore, LookupRequest, NotificationContext,
};

/// Capacity of the internal lookup completion channel
const COMPLETION_CHANNEL_CAPACITY: usize = 64;

/// Minimum time between two warnings about an unreadable clipboard
const READ_FAILURE_WARN_INTERVAL: Duration = Duration::from_secs(60);

/// Events emitted by the ClipboardMonitor
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Monitor started polling
    Started { interval: Duration },

    /// A distinct clipboard content was seen
    SnapshotRecorded { contains_address: bool },

    /// A new address became the tracked address
    AddressDetected {
        address: String,
        family: AddressFamily,
    },

    /// New content had no address; tracking was cleared
    AddressCleared,

    /// Lookup finished successfully
    LookupSucceeded {
        address: String,
        family: AddressFamily,
        info: GeoInfo,
    },

    /// Lookup finished after a different address became tracked
    StaleLookupDiscarded { address: String },

    /// Lookup failed; it is not retried
    LookupFailed {
        address: String,
        kind: Option<LookupFailureKind>,
        error: String,
    },

    /// Notification chain ran for an address
    NotificationSent { address: String, delivered: bool },

    /// A history write failed; polling continues
    HistoryWriteFailed { error: String },

    /// The clipboard could not be read (rate limited)
    ClipboardUnavailable { error: String },

    /// New settings took effect
    SettingsApplied {
        interval: Duration,
        filters: FamilyFilters,
        notifications: bool,
    },

    /// Monitor stopped
    Stopped { reason: String },
}

/// Where the monitor is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Idle,
    Polling,
    Detecting,
    LookupInFlight,
}

/// Display detail for the tracked address
#[derive(Debug, Clone, PartialEq)]
pub struct AddressDetail {
    pub address: String,
    pub family: AddressFamily,
    pub info: GeoInfo,
    pub details_url: String,
    pub looked_up_at: DateTime<Utc>,
}

impl AddressDetail {
    /// Multi-line description of the address
    pub fn summary(&self) -> String {
        let mut text = format!(
            "IP: {}\nLocation: {}\nISP: {}\n",
            self.address,
            location_text(&self.info),
            or_unknown(&self.info.isp)
        );
        if let Some(coordinates) = coordinates_text(&self.info) {
            text.push_str(&format!("Coordinates: {}\n", coordinates));
        }
        if let Some(ms) = self.info.latency_ms {
            text.push_str(&format!("Query time: {}ms\n", ms));
        }
        text.push_str(&format!(
            "Looked up: {}",
            self.looked_up_at.format("%Y-%m-%d %H:%M:%S")
        ));
        text
    }
}

/// State owned by the monitor
#[derive(Debug, Clone)]
pub struct MonitorState {
    pub phase: MonitorPhase,
    pub last_seen_text: Option<String>,
    pub current_tracked_address: Option<DetectedAddress>,
    pub polling_interval: Duration,
    pub filters: FamilyFilters,
    pub current_detail: Option<AddressDetail>,
}

/// Result of one lookup task, sent back to the monitor
#[derive(Debug)]
pub struct LookupCompletion {
    pub address: String,
    pub family: AddressFamily,
    pub outcome: Result<GeoInfo>,
}

/// Tracks consecutive clipboard read failures for rate-limited logging
#[derive(Debug, Default)]
struct ReadFailureLog {
    consecutive: u64,
    last_warned: Option<Instant>,
}

impl ReadFailureLog {
    /// Returns true when this failure should be surfaced
    fn record(&mut self, err: &Error) -> bool {
        self.consecutive += 1;
        let due = self
            .last_warned
            .is_none_or(|at| at.elapsed() >= READ_FAILURE_WARN_INTERVAL);

        if due {
            warn!(
                "Clipboard read failed ({} consecutive): {}",
                self.consecutive, err
            );
            self.last_warned = Some(Instant::now());
        } else {
            debug!("Clipboard read failed: {}", err);
        }
        due
    }

    fn reset(&mut self) {
        if self.consecutive > 0 {
            info!(
                "Clipboard readable again after {} failed reads",
                self.consecutive
            );
        }
        self.consecutive = 0;
        self.last_warned = None;
    }
}

/// Clipboard polling orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`ClipboardMonitor::new()`]
/// 2. Start with [`ClipboardMonitor::run()`]
/// 3. Runs until SIGINT (or the test shutdown signal)
/// 4. History is flushed on the way out
///
/// ## Threading
///
/// Polling and state changes happen on the task that runs the monitor.
/// Each lookup runs on its own spawned task and reports back over a channel,
/// so a slow API never delays the next poll.
pub struct ClipboardMonitor {
    source: Box<dyn ClipboardSource>,
    lookup: Arc<dyn GeoLookup>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<NotificationDispatcher>,
    lookup_config: LookupConfig,

    settings: MonitorSettings,
    settings_rx: watch::Receiver<MonitorSettings>,
    state: MonitorState,

    in_flight: usize,
    completion_tx: mpsc::Sender<LookupCompletion>,
    completion_rx: mpsc::Receiver<LookupCompletion>,

    read_failures: ReadFailureLog,
    event_tx: mpsc::Sender<MonitorEvent>,
}

impl ClipboardMonitor {
    /// Create a new clipboard monitor
    ///
    /// # Parameters
    ///
    /// - `source`: Clipboard to poll
    /// - `lookup`: Geolocation lookup
    /// - `history`: History store shared with lookup tasks
    /// - `notifier`: Notification fallback chain
    /// - `config`: Full configuration (validated here)
    /// - `settings_rx`: Runtime settings; its current value replaces `config.settings`
    ///
    /// # Returns
    ///
    /// A tuple of (monitor, event_receiver)
    pub fn new(
        source: Box<dyn ClipboardSource>,
        lookup: Arc<dyn GeoLookup>,
        history: Arc<dyn HistoryStore>,
        notifier: Arc<NotificationDispatcher>,
        config: &ClipgeoConfig,
        mut settings_rx: watch::Receiver<MonitorSettings>,
    ) -> Result<(Self, mpsc::Receiver<MonitorEvent>)> {
        config.validate()?;

        let settings = settings_rx.borrow_and_update().clone();
        settings.validate()?;

        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);

        let state = MonitorState {
            phase: MonitorPhase::Idle,
            last_seen_text: None,
            current_tracked_address: None,
            polling_interval: settings.poll_interval(),
            filters: settings.filters(),
            current_detail: None,
        };

        let monitor = Self {
            source,
            lookup,
            history,
            notifier,
            lookup_config: config.lookup.clone(),
            settings,
            settings_rx,
            state,
            in_flight: 0,
            completion_tx,
            completion_rx,
            read_failures: ReadFailureLog::default(),
            event_tx,
        };

        Ok((monitor, event_rx))
    }

    /// Current monitor state
    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// Settings currently in effect
    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Number of lookups whose completion has not been applied yet
    pub fn lookups_in_flight(&self) -> usize {
        self.in_flight
    }

    /// Run the monitor until SIGINT
    pub async fn run(&mut self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the monitor with a controlled shutdown signal
    ///
    /// With `None` this behaves like [`run`](Self::run). Dropping the sender
    /// of `shutdown_rx` also stops the monitor.
    pub async fn run_with_shutdown(
        &mut self,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&mut self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        info!(
            "Clipboard monitor started (interval {:?}, source {}, lookup {})",
            self.state.polling_interval,
            self.source.source_name(),
            self.lookup.lookup_name()
        );
        self.emit_event(MonitorEvent::Started {
            interval: self.state.polling_interval,
        });

        let mut ticker = Self::ticker(self.state.polling_interval, Instant::now());

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for ctrl-c: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let mut settings_open = true;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }

                Some(completion) = self.completion_rx.recv() => {
                    self.apply_completion(completion);
                }

                changed = self.settings_rx.changed(), if settings_open => {
                    match changed {
                        Ok(()) => {
                            let settings = self.settings_rx.borrow_and_update().clone();
                            if self.apply_settings(settings) {
                                // Never adjust a running interval; start a fresh one
                                let period = self.state.polling_interval;
                                ticker = Self::ticker(period, Instant::now() + period);
                            }
                        }
                        Err(_) => {
                            debug!("Settings channel closed, keeping current settings");
                            settings_open = false;
                        }
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(MonitorEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        self.history.flush().await?;
        info!("History flushed, monitor stopped");

        Ok(())
    }

    fn ticker(period: Duration, start: Instant) -> Interval {
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Run one polling cycle
    ///
    /// Reads the clipboard, records a snapshot if the content changed and
    /// starts a lookup when a new address becomes tracked. Never fails:
    /// read and history errors are logged and the cycle ends.
    pub async fn poll_once(&mut self) {
        self.state.phase = MonitorPhase::Polling;

        let text = match self.source.read_text().await {
            Ok(text) => {
                self.read_failures.reset();
                text
            }
            Err(e) => {
                if self.read_failures.record(&e) {
                    self.emit_event(MonitorEvent::ClipboardUnavailable {
                        error: e.to_string(),
                    });
                }
                None
            }
        };

        let Some(text) = text else {
            self.settle();
            return;
        };

        let text = text.trim();
        if text.is_empty() || self.state.last_seen_text.as_deref() == Some(text) {
            self.settle();
            return;
        }

        self.state.phase = MonitorPhase::Detecting;
        self.state.last_seen_text = Some(text.to_string());

        let first = AddressMatcher::new(self.state.filters).first_address(text);
        let contains_address = first.is_some();

        match self
            .history
            .add_snapshot(ClipboardSnapshot::new(text, contains_address))
            .await
        {
            Ok(()) => self.emit_event(MonitorEvent::SnapshotRecorded { contains_address }),
            Err(e) => {
                warn!("Failed to record clipboard snapshot: {}", e);
                self.emit_event(MonitorEvent::HistoryWriteFailed {
                    error: e.to_string(),
                });
            }
        }

        match first {
            None => {
                if self.state.current_tracked_address.take().is_some() {
                    debug!("No address in new clipboard content, clearing tracked address");
                    self.emit_event(MonitorEvent::AddressCleared);
                }
                self.state.current_detail = None;
            }
            Some(detected)
                if self
                    .state
                    .current_tracked_address
                    .as_ref()
                    .is_some_and(|tracked| tracked.address == detected.address) =>
            {
                debug!("Address {} already tracked, skipping lookup", detected.address);
            }
            Some(detected) => {
                info!("Detected {} address {}", detected.family, detected.address);
                self.emit_event(MonitorEvent::AddressDetected {
                    address: detected.address.clone(),
                    family: detected.family,
                });
                self.state.current_detail = None;
                self.spawn_lookup(&detected);
                self.state.current_tracked_address = Some(detected);
            }
        }

        self.settle();
    }

    /// Wait for every in-flight lookup and apply its completion
    pub async fn settle_lookups(&mut self) {
        while self.in_flight > 0 {
            match self.completion_rx.recv().await {
                Some(completion) => self.apply_completion(completion),
                None => break,
            }
        }
    }

    fn spawn_lookup(&mut self, detected: &DetectedAddress) {
        let address = detected.address.clone();
        let family = detected.family;

        let lookup = Arc::clone(&self.lookup);
        let history = Arc::clone(&self.history);
        let notifier = Arc::clone(&self.notifier);
        let completion_tx = self.completion_tx.clone();
        let event_tx = self.event_tx.clone();

        let notify = self.settings.notifications;
        let context = NotificationContext::for_address(
            address.clone(),
            self.lookup_config.details_url(&address),
            self.settings.notification_duration(),
        );

        self.in_flight += 1;

        tokio::spawn(async move {
            // Inner task so a panicking lookup, store or backend still yields a completion
            let work = tokio::spawn(lookup_and_report(
                lookup,
                history,
                notify.then_some((notifier, context)),
                event_tx,
                address.clone(),
                family,
            ));

            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Lookup task for {} aborted: {}", address, e);
                    Err(Error::Other(format!("lookup task aborted: {}", e)))
                }
            };

            let completion = LookupCompletion {
                address,
                family,
                outcome,
            };
            if completion_tx.send(completion).await.is_err() {
                debug!("Monitor gone, dropping lookup completion");
            }
        });
    }

    fn apply_completion(&mut self, completion: LookupCompletion) {
        self.in_flight = self.in_flight.saturating_sub(1);

        let LookupCompletion {
            address,
            family,
            outcome,
        } = completion;

        match outcome {
            Ok(info) => {
                info!("Lookup for {} succeeded: {}", address, info.location_line());
                self.emit_event(MonitorEvent::LookupSucceeded {
                    address: address.clone(),
                    family,
                    info: info.clone(),
                });

                let still_tracked = self
                    .state
                    .current_tracked_address
                    .as_ref()
                    .is_some_and(|tracked| tracked.address == address);

                if still_tracked {
                    self.state.current_detail = Some(AddressDetail {
                        details_url: self.lookup_config.details_url(&address),
                        address,
                        family,
                        info,
                        looked_up_at: Utc::now(),
                    });
                } else {
                    debug!("Discarding stale lookup result for {}", address);
                    self.emit_event(MonitorEvent::StaleLookupDiscarded { address });
                }
            }
            Err(e) => {
                warn!("Lookup for {} failed: {}", address, e);
                self.emit_event(MonitorEvent::LookupFailed {
                    address,
                    kind: e.lookup_kind(),
                    error: e.to_string(),
                });
            }
        }

        self.settle();
    }

    /// Apply new settings, returning whether the polling interval changed
    fn apply_settings(&mut self, settings: MonitorSettings) -> bool {
        if let Err(e) = settings.validate() {
            warn!("Ignoring invalid settings update: {}", e);
            return false;
        }

        let interval = settings.poll_interval();
        let interval_changed = interval != self.state.polling_interval;

        self.state.polling_interval = interval;
        self.state.filters = settings.filters();
        self.settings = settings;

        info!(
            "Settings applied (interval {:?}, ipv4 {}, ipv6 {}, notifications {})",
            interval,
            self.state.filters.ipv4,
            self.state.filters.ipv6,
            self.settings.notifications
        );
        self.emit_event(MonitorEvent::SettingsApplied {
            interval,
            filters: self.state.filters,
            notifications: self.settings.notifications,
        });

        interval_changed
    }

    fn settle(&mut self) {
        self.state.phase = if self.in_flight > 0 {
            MonitorPhase::LookupInFlight
        } else {
            MonitorPhase::Idle
        };
    }

    fn emit_event(&self, event: MonitorEvent) {
        emit(&self.event_tx, event);
    }
}

/// Send an event, dropping it with a warning if the channel is full
/// Look up one address, record it, then notify
async fn lookup_and_report(
    lookup: Arc<dyn GeoLookup>,
    history: Arc<dyn HistoryStore>,
    notification: Option<(Arc<NotificationDispatcher>, NotificationContext)>,
    event_tx: mpsc::Sender<MonitorEvent>,
    address: String,
    family: AddressFamily,
) -> Result<GeoInfo> {
    let info = lookup
        .lookup(&LookupRequest::new(address.clone(), family))
        .await?;

    let record = AddressRecord::from_lookup(address.clone(), family, &info);
    if let Err(e) = history.add_address_record(record).await {
        warn!("Failed to record lookup for {}: {}", address, e);
        emit(
            &event_tx,
            MonitorEvent::HistoryWriteFailed {
                error: e.to_string(),
            },
        );
    }

    if let Some((notifier, context)) = notification {
        let (title, message) = notification_text(&address, &info);
        let delivered = notifier.notify(&title, &message, &context).await;
        emit(
            &event_tx,
            MonitorEvent::NotificationSent {
                address,
                delivered,
            },
        );
    }

    Ok(info)
}

fn emit(tx: &mpsc::Sender<MonitorEvent>, event: MonitorEvent) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
        warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
    }
}

/// Title and body for an address notification
pub fn notification_text(address: &str, info: &GeoInfo) -> (String, String) {
    let title = format!("IP address detected - {}", address);
    let mut message = format!(
        "IP: {}\nLocation: {}\nISP: {}",
        address,
        location_text(info),
        or_unknown(&info.isp)
    );
    if let Some(coordinates) = coordinates_text(info) {
        message.push_str(&format!("\nCoordinates: {}", coordinates));
    }
    (title, message)
}

fn location_text(info: &GeoInfo) -> String {
    format!(
        "{} - {} - {}",
        or_unknown(&info.country),
        or_unknown(&info.region),
        or_unknown(&info.city)
    )
}

fn coordinates_text(info: &GeoInfo) -> Option<String> {
    match (info.latitude, info.longitude) {
        (Some(lat), Some(lon)) => Some(format!("{}, {}", lat, lon)),
        _ => None,
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { "Unknown" } else { value }
}
