// # clipgeod - clipboard address monitor
//
// This daemon is a THIN integration layer:
// - Loading configuration (file + environment, see `config.rs`)
// - Initializing logging and the runtime
// - Registering the clipboard source, geo lookup and notification backends
// - Running the ClipboardMonitor until SIGINT/SIGTERM
//
// Detection, lookup, history and notification logic lives in clipgeo-core.
//
// ## Commands
//
// ```bash
// clipgeod                       # same as `clipgeod run`
// clipgeod run
// clipgeod history list --kind snapshots --limit 20
// clipgeod history search 203.0.113
// clipgeod history delete --timestamp 2024-05-01T10:00:00.123Z --address 203.0.113.5
// clipgeod history clear --kind records --yes
// clipgeod history export --output lookups.json
// clipgeod history export --format csv > lookups.csv
// clipgeod history backup history-backup.json
// clipgeod history restore history-backup.json --yes
// clipgeod history stats
// clipgeod check-api
// ```
//
// On Unix, SIGHUP reloads the configuration and applies the monitor settings
// (interval, address families, notifications) without a restart.

mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clipgeo_core::config::MonitorSettings;
use clipgeo_core::notify::BackendRegistry;
use clipgeo_core::traits::{
    DEFAULT_EXPORT_LIMIT, DEFAULT_LIST_LIMIT, GeoLookup, HistoryStore, RecordKind,
};
use clipgeo_core::{ClipboardMonitor, ComponentRegistry, MonitorEvent};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::commands::{ExportFormat, HistoryCommand};
use crate::config::{ConfigLoader, DaemonConfig};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum ClipgeoExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<ClipgeoExitCode> for ExitCode {
    fn from(code: ClipgeoExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

#[derive(Parser, Debug)]
#[command(name = "clipgeod", version, about = "Watch the clipboard for IP addresses and look them up")]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor the clipboard (default)
    Run,

    /// Inspect or edit the saved history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Check that the geolocation API is reachable
    CheckApi,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Show the newest entries
    List {
        /// records or snapshots
        #[arg(long, default_value = "records")]
        kind: RecordKind,
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Case-insensitive substring search (newest 100 matches)
    Search {
        keyword: String,
        #[arg(long, default_value = "records")]
        kind: RecordKind,
    },

    /// Delete one entry by its timestamp (and address, for records)
    Delete {
        #[arg(long, default_value = "records")]
        kind: RecordKind,
        /// RFC 3339 timestamp as printed by `history list`
        #[arg(long)]
        timestamp: String,
        #[arg(long)]
        address: Option<String>,
    },

    /// Delete every entry of one collection
    Clear {
        #[arg(long, default_value = "records")]
        kind: RecordKind,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Export entries as JSON or CSV
    Export {
        #[arg(long, default_value = "records")]
        kind: RecordKind,
        #[arg(long, default_value_t = DEFAULT_EXPORT_LIMIT)]
        limit: usize,
        /// Output format; defaults to CSV for a `.csv` output file, else JSON
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Copy the whole history into a backup file
    Backup {
        /// Destination file
        output: PathBuf,
    },

    /// Replace the whole history with a backup file
    Restore {
        /// Backup file written by `history backup`
        input: PathBuf,
        /// Confirm the replacement
        #[arg(long)]
        yes: bool,
    },

    /// Show entry counts and lookups per day for the last week
    Stats,
}

impl From<HistoryAction> for HistoryCommand {
    fn from(action: HistoryAction) -> Self {
        match action {
            HistoryAction::List { kind, limit } => HistoryCommand::List { kind, limit },
            HistoryAction::Search { keyword, kind } => HistoryCommand::Search { kind, keyword },
            HistoryAction::Delete {
                kind,
                timestamp,
                address,
            } => HistoryCommand::Delete {
                kind,
                timestamp,
                address,
            },
            HistoryAction::Clear { kind, yes } => HistoryCommand::Clear {
                kind,
                confirmed: yes,
            },
            HistoryAction::Export {
                kind,
                limit,
                format,
                output,
            } => HistoryCommand::Export {
                kind,
                limit,
                format: ExportFormat::resolve(format, output.as_deref()),
                output,
            },
            HistoryAction::Backup { output } => HistoryCommand::Backup { output },
            HistoryAction::Restore { input, yes } => HistoryCommand::Restore {
                input,
                confirmed: yes,
            },
            HistoryAction::Stats => HistoryCommand::Stats,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let loader = ConfigLoader::new(cli.config.clone());
    let loaded = match loader.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ClipgeoExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let log_level = match loaded.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so `history export` output stays clean
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ClipgeoExitCode::ConfigError.into();
    }

    match &loaded.loaded_from {
        Some(path) => debug!("Configuration loaded from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ClipgeoExitCode::RuntimeError.into();
        }
    };

    let command = cli.command.unwrap_or(Command::Run);
    let result = rt.block_on(async {
        match command {
            Command::Run => run_daemon(loader, loaded).await,
            Command::History { action } => {
                let mut stdout = std::io::stdout();
                commands::run_history(&loaded.config, action.into(), &mut stdout).await
            }
            Command::CheckApi => {
                let mut stdout = std::io::stdout();
                match commands::check_api(&loaded.config, &mut stdout).await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(anyhow::anyhow!("Geolocation API is not reachable")),
                    Err(e) => Err(e),
                }
            }
        }
    });

    match result {
        Ok(()) => ClipgeoExitCode::CleanShutdown.into(),
        Err(e) => {
            error!("{:#}", e);
            ClipgeoExitCode::RuntimeError.into()
        }
    }
}

/// Run the monitor until a shutdown signal arrives
async fn run_daemon(loader: ConfigLoader, loaded: DaemonConfig) -> Result<()> {
    let config = loaded.config;
    info!("Starting clipgeod");

    if config.settings.auto_start {
        debug!("auto_start is set; start-on-login is handled by the installer");
    }

    let registry = ComponentRegistry::with_builtin_stores();
    clipgeo_clipboard::register(&registry);
    clipgeo_geo_http::register(&registry);

    let source = registry
        .create_clipboard_source(clipgeo_clipboard::SOURCE_NAME)
        .context("Failed to open the clipboard")?;
    let lookup: Arc<dyn GeoLookup> = Arc::from(
        registry.create_geo_lookup(clipgeo_geo_http::LOOKUP_NAME, &config.lookup)?,
    );
    let history: Arc<dyn HistoryStore> = Arc::from(
        registry
            .create_history_store(&config.history)
            .await
            .context("Failed to open history store")?,
    );
    info!("History store: {}", config.history.type_name());

    let mut backends = BackendRegistry::new();
    clipgeo_notify::register(&mut backends);
    let dispatcher = backends.build_ordered(&config.notify.backends);
    if dispatcher.is_empty() {
        warn!("No notification backend is available; lookups will only be logged");
    } else {
        info!("Notification chain: {}", dispatcher.backend_names().join(" -> "));
    }

    let (settings_tx, settings_rx) = watch::channel(config.settings.clone());
    let (mut monitor, events) = ClipboardMonitor::new(
        source,
        lookup,
        history,
        Arc::new(dispatcher),
        &config,
        settings_rx,
    )?;

    let event_task = tokio::spawn(log_events(events));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let signal_task = tokio::spawn(async move {
        if let Err(e) = wait_for_signals(loader, settings_tx, shutdown_tx).await {
            error!("Signal handling failed: {:#}", e);
        }
    });

    let result = monitor.run_with_shutdown(Some(shutdown_rx)).await;

    signal_task.abort();
    drop(monitor);
    if let Err(e) = event_task.await {
        warn!("Event logger ended abnormally: {}", e);
    }

    result?;
    info!("clipgeod stopped");
    Ok(())
}

/// Trace every monitor event
///
/// The monitor and dispatcher already log detections, failures and settings
/// changes; this stream is only visible with `CLIPGEO_LOG_LEVEL=debug`.
async fn log_events(mut events: mpsc::Receiver<MonitorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            MonitorEvent::LookupSucceeded {
                address, info: geo, ..
            } => debug!(
                target: "clipgeo::events",
                "{} -> {} ({}, {}ms)",
                address,
                geo.location_line(),
                geo.isp,
                geo.latency_ms.unwrap_or_default()
            ),
            other => debug!(target: "clipgeo::events", "{:?}", other),
        }
    }
}

/// Reload the configuration and push the monitor settings
fn reload_settings(loader: &ConfigLoader, settings_tx: &watch::Sender<MonitorSettings>) {
    match loader.load() {
        Ok(reloaded) => {
            info!("Configuration reloaded; lookup, history and backend changes need a restart");
            settings_tx.send_replace(reloaded.config.settings);
        }
        Err(e) => warn!("Configuration reload failed, keeping current settings: {:#}", e),
    }
}

/// Wait for SIGTERM/SIGINT, reloading on SIGHUP
#[cfg(unix)]
async fn wait_for_signals(
    loader: ConfigLoader,
    settings_tx: watch::Sender<MonitorSettings>,
    shutdown_tx: oneshot::Sender<()>,
) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;

    let name = loop {
        tokio::select! {
            _ = sigterm.recv() => break "SIGTERM",
            _ = sigint.recv() => break "SIGINT",
            _ = sighup.recv() => reload_settings(&loader, &settings_tx),
        }
    };

    info!("Received {}, shutting down", name);
    let _ = shutdown_tx.send(());
    Ok(())
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms; there is no reload signal.
#[cfg(not(unix))]
async fn wait_for_signals(
    _loader: ConfigLoader,
    _settings_tx: watch::Sender<MonitorSettings>,
    shutdown_tx: oneshot::Sender<()>,
) -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;

    info!("Received CTRL-C, shutting down");
    let _ = shutdown_tx.send(());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::try_parse_from(["clipgeod"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_history_kind_parsing() {
        let cli = Cli::try_parse_from(["clipgeod", "history", "list", "--kind", "snapshots"]).unwrap();
        match cli.command {
            Some(Command::History {
                action: HistoryAction::List { kind, limit },
            }) => {
                assert_eq!(kind, RecordKind::Snapshots);
                assert_eq!(limit, DEFAULT_LIST_LIMIT);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["clipgeod", "history", "list", "--kind", "files"]).is_err());
    }

    #[test]
    fn test_clear_maps_confirmation() {
        let cli = Cli::try_parse_from(["clipgeod", "history", "clear", "--yes"]).unwrap();
        let Some(Command::History { action }) = cli.command else {
            panic!("expected history command");
        };
        assert!(matches!(
            HistoryCommand::from(action),
            HistoryCommand::Clear {
                kind: RecordKind::Addresses,
                confirmed: true
            }
        ));
    }

    #[test]
    fn test_export_format_follows_output_extension() {
        let cli = Cli::try_parse_from(["clipgeod", "history", "export", "-o", "lookups.csv"]).unwrap();
        let Some(Command::History { action }) = cli.command else {
            panic!("expected history command");
        };
        assert!(matches!(
            HistoryCommand::from(action),
            HistoryCommand::Export {
                format: ExportFormat::Csv,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["clipgeod", "history", "export", "--format", "csv"]).unwrap();
        let Some(Command::History { action }) = cli.command else {
            panic!("expected history command");
        };
        assert!(matches!(
            HistoryCommand::from(action),
            HistoryCommand::Export {
                format: ExportFormat::Csv,
                output: None,
                ..
            }
        ));
    }

    #[test]
    fn test_restore_takes_path_and_confirmation() {
        let cli =
            Cli::try_parse_from(["clipgeod", "history", "restore", "saved.json", "--yes"]).unwrap();
        let Some(Command::History { action }) = cli.command else {
            panic!("expected history command");
        };
        match HistoryCommand::from(action) {
            HistoryCommand::Restore { input, confirmed } => {
                assert_eq!(input, PathBuf::from("saved.json"));
                assert!(confirmed);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["clipgeod", "check-api", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
        assert!(matches!(cli.command, Some(Command::CheckApi)));
    }

    #[test]
    fn test_reload_pushes_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"check_interval": 4.0, "enable_ipv6": false}"#).unwrap();

        let loader = ConfigLoader::with_paths(Some(path), None);
        let (tx, rx) = watch::channel(MonitorSettings::default());
        reload_settings(&loader, &tx);

        let settings = rx.borrow();
        assert_eq!(settings.check_interval, 4.0);
        assert!(!settings.enable_ipv6);
    }
}
