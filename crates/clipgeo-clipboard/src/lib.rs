// # System Clipboard Source
//
// This crate provides a `ClipboardSource` over the operating system
// clipboard, using `arboard` for cross-platform access.
//
// ## Blocking Access
//
// `arboard` calls are synchronous and may briefly block while another
// application owns the clipboard, so every read runs on the blocking pool.
// A fresh handle is opened per read; holding one open for the lifetime of
// the daemon keeps the X11 selection connection busy.
//
// ## Empty Clipboard
//
// An empty clipboard, or one holding an image or files, reads as `None`
// rather than as an error.

use clipgeo_core::registry::ComponentRegistry;
use clipgeo_core::traits::{ClipboardSource, ClipboardSourceFactory};
use clipgeo_core::{Error, Result};

/// Registered name of the system clipboard source
pub const SOURCE_NAME: &str = "system";

/// Clipboard source backed by the system clipboard
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl SystemClipboard {
    /// Create a new system clipboard source
    pub fn new() -> Self {
        Self
    }

    fn read_blocking() -> Result<Option<String>> {
        let mut clipboard = arboard::Clipboard::new().map_err(map_arboard_error)?;
        match clipboard.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(map_arboard_error(e)),
        }
    }
}

#[async_trait::async_trait]
impl ClipboardSource for SystemClipboard {
    async fn read_text(&self) -> Result<Option<String>> {
        tokio::task::spawn_blocking(Self::read_blocking)
            .await
            .map_err(|e| Error::clipboard(format!("Clipboard read task failed: {}", e)))?
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}

fn map_arboard_error(err: arboard::Error) -> Error {
    match err {
        arboard::Error::ContentNotAvailable => Error::clipboard("Clipboard holds no text"),
        arboard::Error::ClipboardNotSupported => {
            Error::clipboard("Clipboard is not supported in this environment")
        }
        arboard::Error::ClipboardOccupied => {
            Error::clipboard("Clipboard is occupied by another application")
        }
        other => Error::clipboard(other.to_string()),
    }
}

/// Factory for [`SystemClipboard`]
///
/// Opens the clipboard once so a missing display server is reported at
/// startup instead of on every poll.
#[derive(Debug, Default)]
pub struct SystemClipboardFactory;

impl ClipboardSourceFactory for SystemClipboardFactory {
    fn create(&self) -> Result<Box<dyn ClipboardSource>> {
        arboard::Clipboard::new().map_err(|e| {
            Error::clipboard(format!("System clipboard unavailable: {}", map_arboard_error(e)))
        })?;
        tracing::debug!("System clipboard opened");
        Ok(Box::new(SystemClipboard::new()))
    }
}

/// Register the system clipboard source with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_clipboard_source(SOURCE_NAME, Box::new(SystemClipboardFactory));
}
