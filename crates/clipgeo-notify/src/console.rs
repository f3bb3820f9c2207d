//! Console banner, the last resort of the chain

use async_trait::async_trait;
use clipgeo_core::Error;
use clipgeo_core::traits::{BackendFactory, NotificationBackend, NotificationContext};
use std::io::Write;

use crate::{CONSOLE_BACKEND, body_with_link};

const BANNER_WIDTH: usize = 60;

/// Render the banner written to stderr
pub fn format_banner(title: &str, message: &str, context: &NotificationContext) -> String {
    let rule = "=".repeat(BANNER_WIDTH);
    let mut banner = format!("{}\n{}\n{}\n", rule, title, "-".repeat(BANNER_WIDTH));
    for line in body_with_link(message, context).lines() {
        banner.push_str(line);
        banner.push('\n');
    }
    banner.push_str(&rule);
    banner.push('\n');
    banner
}

/// Notification backend that prints a banner to stderr
#[derive(Debug, Default)]
pub struct ConsoleBackend;

#[async_trait]
impl NotificationBackend for ConsoleBackend {
    async fn attempt(
        &self,
        title: &str,
        message: &str,
        context: &NotificationContext,
    ) -> Result<(), Error> {
        let banner = format_banner(title, message, context);
        let mut stderr = std::io::stderr().lock();
        stderr
            .write_all(banner.as_bytes())
            .and_then(|_| stderr.flush())
            .map_err(|e| Error::notification(CONSOLE_BACKEND, e.to_string()))
    }

    fn backend_name(&self) -> &str {
        CONSOLE_BACKEND
    }
}

/// Factory for [`ConsoleBackend`]; the probe never fails
pub struct ConsoleBackendFactory;

impl BackendFactory for ConsoleBackendFactory {
    fn probe(&self) -> Result<Box<dyn NotificationBackend>, Error> {
        Ok(Box::new(ConsoleBackend))
    }
}
