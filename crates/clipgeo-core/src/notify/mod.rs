//! Notification fallback chain
//!
//! A [`BackendRegistry`] collects backend factories at startup. Building a
//! [`NotificationDispatcher`] probes each factory once, in order, and keeps
//! the backends that are usable on this machine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use clipgeo_core::notify::BackendRegistry;
//!
//! let mut registry = BackendRegistry::new();
//! clipgeo_notify::register(&mut registry);
//!
//! let dispatcher = registry.build();
//! let delivered = dispatcher.notify("IP detected", "203.0.113.5", &context).await;
//! ```

use crate::traits::{BackendFactory, NotificationBackend, NotificationContext};

/// Outcome of one backend attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttemptResult {
    pub backend_name: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Ordered chain of notification backends
///
/// Backends are tried strictly in order and the first success stops the
/// chain. A failing backend never stops the next one from being tried.
#[derive(Default)]
pub struct NotificationDispatcher {
    backends: Vec<Box<dyn NotificationBackend>>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over an already-built chain
    pub fn new(backends: Vec<Box<dyn NotificationBackend>>) -> Self {
        Self { backends }
    }

    /// Names of the backends in the chain, in order
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.backend_name()).collect()
    }

    /// Check if the chain has no backends
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Deliver a notification through the first backend that accepts it
    ///
    /// Returns `false` when every backend failed (or there are none). Never
    /// returns an error.
    pub async fn notify(&self, title: &str, message: &str, context: &NotificationContext) -> bool {
        self.notify_with_report(title, message, context)
            .await
            .iter()
            .any(|attempt| attempt.succeeded)
    }

    /// Like [`notify`](Self::notify), returning every attempt made
    pub async fn notify_with_report(
        &self,
        title: &str,
        message: &str,
        context: &NotificationContext,
    ) -> Vec<DeliveryAttemptResult> {
        let mut attempts = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let backend_name = backend.backend_name().to_string();
            match backend.attempt(title, message, context).await {
                Ok(()) => {
                    tracing::debug!("Notification delivered via {}", backend_name);
                    attempts.push(DeliveryAttemptResult {
                        backend_name,
                        succeeded: true,
                        error: None,
                    });
                    return attempts;
                }
                Err(e) => {
                    tracing::debug!("Notification backend {} failed: {}", backend_name, e);
                    attempts.push(DeliveryAttemptResult {
                        backend_name,
                        succeeded: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::warn!(
            "All {} notification backends failed for '{}'",
            attempts.len(),
            title
        );
        attempts
    }
}

/// Registry of notification backend factories, kept in registration order
#[derive(Default)]
pub struct BackendRegistry {
    factories: Vec<(String, Box<dyn BackendFactory>)>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend factory
    ///
    /// Registering a name twice replaces the factory but keeps its position.
    pub fn register_backend(&mut self, name: impl Into<String>, factory: Box<dyn BackendFactory>) {
        let name = name.into();
        if let Some(slot) = self.factories.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = factory;
        } else {
            self.factories.push((name, factory));
        }
    }

    /// Registered backend names, in registration order
    pub fn list_backends(&self) -> Vec<String> {
        self.factories.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Check if a backend is registered
    pub fn has_backend(&self, name: &str) -> bool {
        self.factories.iter().any(|(n, _)| n == name)
    }

    /// Probe every registered factory in registration order
    pub fn build(&self) -> NotificationDispatcher {
        let names = self.list_backends();
        self.build_ordered(&names)
    }

    /// Probe the named factories in the given order
    ///
    /// Unknown names and failed probes are logged and skipped.
    pub fn build_ordered(&self, order: &[String]) -> NotificationDispatcher {
        let mut backends = Vec::new();

        for name in order {
            let Some((_, factory)) = self.factories.iter().find(|(n, _)| n == name) else {
                tracing::warn!("Unknown notification backend '{}', skipping", name);
                continue;
            };

            match factory.probe() {
                Ok(backend) => {
                    tracing::info!("Notification backend '{}' available", name);
                    backends.push(backend);
                }
                Err(e) => {
                    tracing::warn!("Notification backend '{}' unavailable: {}", name, e);
                }
            }
        }

        NotificationDispatcher::new(backends)
    }
}
