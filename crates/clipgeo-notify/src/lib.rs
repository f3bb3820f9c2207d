// # clipgeo notification backends
//
// Concrete backends for the notification fallback chain, registered in
// priority order:
//
// 1. `native`: platform toast through the OS helper command
//    (`notify-send`, `osascript`, PowerShell)
// 2. `tray`: WARN event on the `clipgeo::tray` tracing target
// 3. `console`: banner written to stderr
//
// ## Usage
//
// ```rust,ignore
// use clipgeo_core::notify::BackendRegistry;
//
// let mut registry = BackendRegistry::new();
// clipgeo_notify::register(&mut registry);
// let dispatcher = registry.build();
// ```

mod console;
mod native;
mod tray;

pub use console::{ConsoleBackend, ConsoleBackendFactory, format_banner};
pub use native::{NativeBackend, NativeBackendFactory, NativePlatform, helper_invocation};
pub use tray::{TRAY_TARGET, TrayBackend, TrayBackendFactory};

use clipgeo_core::notify::BackendRegistry;

/// Name of the native toast backend
pub const NATIVE_BACKEND: &str = "native";

/// Name of the tray/log backend
pub const TRAY_BACKEND: &str = "tray";

/// Name of the console banner backend
pub const CONSOLE_BACKEND: &str = "console";

/// Register every backend, in fallback order
pub fn register(registry: &mut BackendRegistry) {
    registry.register_backend(NATIVE_BACKEND, Box::new(NativeBackendFactory::detect()));
    registry.register_backend(TRAY_BACKEND, Box::new(TrayBackendFactory));
    registry.register_backend(CONSOLE_BACKEND, Box::new(ConsoleBackendFactory));
}

/// Message body with the details link appended, if there is one
pub(crate) fn body_with_link(
    message: &str,
    context: &clipgeo_core::traits::NotificationContext,
) -> String {
    match &context.details_url {
        Some(url) => format!("{}\n{}", message, url),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipgeo_core::traits::NotificationContext;
    use std::time::Duration;

    #[test]
    fn test_register_order() {
        let mut registry = BackendRegistry::new();
        register(&mut registry);
        assert_eq!(
            registry.list_backends(),
            vec![NATIVE_BACKEND, TRAY_BACKEND, CONSOLE_BACKEND]
        );
    }

    #[test]
    fn test_console_always_survives_probing() {
        let mut registry = BackendRegistry::new();
        register(&mut registry);
        let dispatcher = registry.build();
        assert_eq!(dispatcher.backend_names().last(), Some(&CONSOLE_BACKEND));
    }

    #[test]
    fn test_body_with_link() {
        let ctx = NotificationContext::for_address(
            "203.0.113.5",
            "https://ipv4.ink/203.0.113.5",
            Duration::from_secs(5),
        );
        assert_eq!(body_with_link("Japan", &ctx), "Japan\nhttps://ipv4.ink/203.0.113.5");

        let plain = NotificationContext::plain(Duration::from_secs(5));
        assert_eq!(body_with_link("Japan", &plain), "Japan");
    }
}
