// # Notification Backend Trait
//
// Defines the interface for a single notification delivery channel.
//
// Backends are chained by `notify::NotificationDispatcher`, which tries them
// in priority order and stops at the first success.
//
// ## Implementations
//
// - `clipgeo-notify` crate: native toast, tray log, console banner

use async_trait::async_trait;
use std::time::Duration;

/// Extra information handed to every backend alongside title and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContext {
    /// Address the notification is about, if any
    pub address: Option<String>,
    /// Page with more detail about the address
    pub details_url: Option<String>,
    /// How long the notification should stay visible
    pub duration: Duration,
}

impl NotificationContext {
    /// Context that is not tied to an address
    pub fn plain(duration: Duration) -> Self {
        Self {
            address: None,
            details_url: None,
            duration,
        }
    }

    /// Context for a looked-up address
    pub fn for_address(
        address: impl Into<String>,
        details_url: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            address: Some(address.into()),
            details_url: Some(details_url.into()),
            duration,
        }
    }
}

/// Trait for notification backend implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Talk to one delivery channel (OS helper, log sink, terminal)
/// - ✅ Report failure
///
/// ## Forbidden Capabilities
/// - ❌ Fall back to another channel (owned by the dispatcher)
/// - ❌ Panic on delivery failure
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Try to deliver one notification
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The notification was handed to the channel
    /// - `Err(Error::Notification)`: This channel failed; the dispatcher moves on
    async fn attempt(
        &self,
        title: &str,
        message: &str,
        context: &NotificationContext,
    ) -> Result<(), crate::Error>;

    /// Get the backend name (for logging/debugging)
    fn backend_name(&self) -> &str;
}

/// Helper trait for constructing notification backends
///
/// `probe` runs once at startup. A probe failure only removes this backend
/// from the chain.
pub trait BackendFactory: Send + Sync {
    /// Check the backend is usable here and create it
    fn probe(&self) -> Result<Box<dyn NotificationBackend>, crate::Error>;
}
