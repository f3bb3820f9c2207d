// One-shot commands: history management and API check
//
// These run against the configured history store and lookup, then exit.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use clipgeo_core::traits::{
    AddressRecord, ClipboardSnapshot, HistoryStore, RECENT_DAYS, RecordKey, RecordKind,
};
use clipgeo_core::{ClipgeoConfig, ComponentRegistry};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Longest slice of snapshot text printed per line
const SNAPSHOT_PREVIEW_CHARS: usize = 60;

/// Output format of `history export`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// Explicit format, else CSV for a `.csv` output file, else JSON
    pub fn resolve(explicit: Option<ExportFormat>, output: Option<&Path>) -> Self {
        explicit.unwrap_or_else(|| {
            let is_csv = output
                .and_then(|path| path.extension())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if is_csv { ExportFormat::Csv } else { ExportFormat::Json }
        })
    }
}

/// History operations exposed on the command line
#[derive(Debug, Clone)]
pub enum HistoryCommand {
    List { kind: RecordKind, limit: usize },
    Search { kind: RecordKind, keyword: String },
    Delete { kind: RecordKind, timestamp: String, address: Option<String> },
    Clear { kind: RecordKind, confirmed: bool },
    Export { kind: RecordKind, limit: usize, format: ExportFormat, output: Option<PathBuf> },
    Backup { output: PathBuf },
    Restore { input: PathBuf, confirmed: bool },
    Stats,
}

/// Open the configured history store
async fn open_history(config: &ClipgeoConfig) -> Result<Box<dyn HistoryStore>> {
    let registry = ComponentRegistry::with_builtin_stores();
    let store = registry
        .create_history_store(&config.history)
        .await
        .context("Failed to open history store")?;

    if config.history.type_name() == "memory" {
        tracing::warn!("History store is in-memory; there is no saved history to show");
    }
    Ok(store)
}

/// Run one history command, writing its output to `out`
pub async fn run_history(
    config: &ClipgeoConfig,
    command: HistoryCommand,
    out: &mut impl Write,
) -> Result<()> {
    let store = open_history(config).await?;
    execute(store.as_ref(), command, out).await?;
    store.flush().await.context("Failed to flush history store")?;
    Ok(())
}

async fn execute(
    store: &dyn HistoryStore,
    command: HistoryCommand,
    out: &mut impl Write,
) -> Result<()> {
    match command {
        HistoryCommand::List { kind, limit } => match kind {
            RecordKind::Addresses => {
                print_records(out, &store.list_address_records(limit).await?)?
            }
            RecordKind::Snapshots => print_snapshots(out, &store.list_snapshots(limit).await?)?,
        },
        HistoryCommand::Search { kind, keyword } => match kind {
            RecordKind::Addresses => {
                print_records(out, &store.search_address_records(&keyword).await?)?
            }
            RecordKind::Snapshots => {
                print_snapshots(out, &store.search_snapshots(&keyword).await?)?
            }
        },
        HistoryCommand::Delete {
            kind,
            timestamp,
            address,
        } => {
            let key = record_key(kind, &timestamp, address)?;
            if store.delete(&key).await? {
                writeln!(out, "Deleted 1 entry")?;
            } else {
                anyhow::bail!("No matching entry for {}", timestamp);
            }
        }
        HistoryCommand::Clear { kind, confirmed } => {
            if !confirmed {
                anyhow::bail!("Refusing to clear history without --yes");
            }
            let removed = store.clear(kind).await?;
            writeln!(out, "Removed {} entries", removed)?;
        }
        HistoryCommand::Export {
            kind,
            limit,
            format,
            output,
        } => {
            let exported = match format {
                ExportFormat::Json => store.export_json(kind, limit).await?,
                ExportFormat::Csv => store.export_csv(kind, limit).await?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, exported)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    writeln!(out, "Exported to {}", path.display())?;
                }
                None => writeln!(out, "{}", exported.trim_end())?,
            }
        }
        HistoryCommand::Backup { output } => {
            store.backup_to(&output).await?;
            writeln!(out, "Backed up to {}", output.display())?;
        }
        HistoryCommand::Restore { input, confirmed } => {
            if !confirmed {
                anyhow::bail!("Refusing to replace history without --yes");
            }
            let rows = store.restore_from(&input).await?;
            writeln!(out, "Restored {} entries from {}", rows, input.display())?;
        }
        HistoryCommand::Stats => {
            let stats = store.statistics().await?;
            writeln!(out, "Lookups:   {}", stats.total_records)?;
            writeln!(out, "  IPv4:    {}", stats.ipv4_records)?;
            writeln!(out, "  IPv6:    {}", stats.ipv6_records)?;
            writeln!(out, "Snapshots: {}", stats.total_snapshots)?;
            writeln!(out, "  with an address: {}", stats.snapshots_with_address)?;
            writeln!(out, "Last {} days:", RECENT_DAYS)?;
            if stats.recent_days.is_empty() {
                writeln!(out, "  no lookups")?;
            }
            for day in &stats.recent_days {
                writeln!(out, "  {}  {}", day.date, day.count)?;
            }
        }
    }
    Ok(())
}

/// Build a deletion key from command line values
fn record_key(kind: RecordKind, timestamp: &str, address: Option<String>) -> Result<RecordKey> {
    let timestamp = DateTime::parse_from_rfc3339(timestamp.trim())
        .with_context(|| format!("Invalid RFC 3339 timestamp: {}", timestamp))?
        .with_timezone(&Utc);

    match kind {
        RecordKind::Addresses => {
            let address = address.context("--address is required to delete a lookup record")?;
            Ok(RecordKey::Address { address, timestamp })
        }
        RecordKind::Snapshots => Ok(RecordKey::Snapshot { timestamp }),
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn print_records(out: &mut impl Write, records: &[AddressRecord]) -> Result<()> {
    if records.is_empty() {
        writeln!(out, "No records")?;
        return Ok(());
    }
    for record in records {
        let location = [&record.country, &record.region, &record.city]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let latency = record
            .lookup_latency_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());

        writeln!(
            out,
            "{}  {:<4}  {:<39}  {}  {}  {}",
            format_timestamp(&record.timestamp),
            record.family.label(),
            record.address,
            if location.is_empty() { "Unknown" } else { location.as_str() },
            if record.isp.is_empty() { "-" } else { record.isp.as_str() },
            latency
        )?;
    }
    Ok(())
}

fn print_snapshots(out: &mut impl Write, snapshots: &[ClipboardSnapshot]) -> Result<()> {
    if snapshots.is_empty() {
        writeln!(out, "No snapshots")?;
        return Ok(());
    }
    for snapshot in snapshots {
        let mut preview: String = snapshot
            .raw_text
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .take(SNAPSHOT_PREVIEW_CHARS)
            .collect();
        if snapshot.raw_text.chars().count() > SNAPSHOT_PREVIEW_CHARS {
            preview.push_str("...");
        }

        writeln!(
            out,
            "{}  {}  {}",
            format_timestamp(&snapshot.timestamp),
            if snapshot.contains_address { "IP" } else { "--" },
            preview
        )?;
    }
    Ok(())
}

/// Probe the geolocation API
///
/// Returns `Ok(true)` when the API answered with a success status.
pub async fn check_api(config: &ClipgeoConfig, out: &mut impl Write) -> Result<bool> {
    let registry = ComponentRegistry::new();
    clipgeo_geo_http::register(&registry);
    let lookup = registry.create_geo_lookup(clipgeo_geo_http::LOOKUP_NAME, &config.lookup)?;

    match lookup.check_health().await {
        Ok(true) => {
            writeln!(out, "API reachable: {}", config.lookup.base_url)?;
            Ok(true)
        }
        Ok(false) => {
            writeln!(out, "API answered with an error status: {}", config.lookup.base_url)?;
            Ok(false)
        }
        Err(e) => {
            writeln!(out, "API unreachable: {} ({})", config.lookup.base_url, e)?;
            Ok(false)
        }
    }
}
