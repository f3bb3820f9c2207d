// # Clipboard Source Trait
//
// Defines the interface for reading the shared text buffer.
//
// ## Implementations
//
// - System clipboard: `clipgeo-clipboard` crate
// - Scripted sources in the contract tests
//
// ## Usage
//
// ```rust,ignore
// use clipgeo_core::ClipboardSource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* ClipboardSource implementation */;
//
//     if let Some(text) = source.read_text().await? {
//         println!("clipboard: {}", text);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

/// Trait for clipboard source implementations
///
/// A source is an observer only: it returns whatever text the buffer
/// currently holds and leaves change detection to the `ClipboardMonitor`.
///
/// # Forbidden Capabilities
/// - ❌ Polling loops or timers (the monitor owns the cadence)
/// - ❌ Caching the previous value to suppress duplicates
/// - ❌ Writing to the clipboard
#[async_trait]
pub trait ClipboardSource: Send + Sync {
    /// Read the current clipboard text
    ///
    /// # Returns
    ///
    /// - `Ok(Some(String))`: The buffer holds text
    /// - `Ok(None)`: The buffer is empty or holds non-text content
    /// - `Err(Error)`: The clipboard could not be opened or read
    async fn read_text(&self) -> Result<Option<String>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing clipboard sources
pub trait ClipboardSourceFactory: Send + Sync {
    /// Create a ClipboardSource instance
    fn create(&self) -> Result<Box<dyn ClipboardSource>, crate::Error>;
}
