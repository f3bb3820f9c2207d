//! Tray/log surface
//!
//! Emits the notification as a WARN event on [`TRAY_TARGET`] so any log sink
//! (or a tray frontend filtering on the target) can show it.

use async_trait::async_trait;
use clipgeo_core::Error;
use clipgeo_core::traits::{BackendFactory, NotificationBackend, NotificationContext};

use crate::TRAY_BACKEND;

/// Tracing target carrying tray notifications
pub const TRAY_TARGET: &str = "clipgeo::tray";

/// Notification backend that writes to the tracing pipeline
#[derive(Debug, Default)]
pub struct TrayBackend;

#[async_trait]
impl NotificationBackend for TrayBackend {
    async fn attempt(
        &self,
        title: &str,
        message: &str,
        context: &NotificationContext,
    ) -> Result<(), Error> {
        tracing::warn!(
            target: "clipgeo::tray",
            address = context.address.as_deref().unwrap_or(""),
            details_url = context.details_url.as_deref().unwrap_or(""),
            duration_secs = context.duration.as_secs(),
            "{}: {}",
            title,
            message
        );
        Ok(())
    }

    fn backend_name(&self) -> &str {
        TRAY_BACKEND
    }
}

/// Factory for [`TrayBackend`]
///
/// Only usable once a global subscriber is installed; without one the event
/// would go nowhere.
pub struct TrayBackendFactory;

impl BackendFactory for TrayBackendFactory {
    fn probe(&self) -> Result<Box<dyn NotificationBackend>, Error> {
        if !tracing::dispatcher::has_been_set() {
            return Err(Error::notification(TRAY_BACKEND, "no log sink installed"));
        }
        Ok(Box::new(TrayBackend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_attempt_succeeds() {
        let backend = TrayBackend;
        let ctx = NotificationContext::plain(Duration::from_secs(3));
        assert!(backend.attempt("title", "message", &ctx).await.is_ok());
        assert_eq!(backend.backend_name(), "tray");
    }

    #[test]
    fn test_probe_follows_subscriber() {
        let probed = TrayBackendFactory.probe();
        assert_eq!(probed.is_ok(), tracing::dispatcher::has_been_set());
    }
}
