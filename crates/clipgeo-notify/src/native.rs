//! Native desktop toast through the platform's helper command
//!
//! | Platform      | Helper                                 |
//! |---------------|----------------------------------------|
//! | Linux / BSD   | `notify-send`                          |
//! | macOS         | `osascript -e 'display notification'`  |
//! | Windows       | `powershell` with a WinRT toast script |

use async_trait::async_trait;
use clipgeo_core::Error;
use clipgeo_core::traits::{BackendFactory, NotificationBackend, NotificationContext};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::{NATIVE_BACKEND, body_with_link};

/// Upper bound on how long the helper may run
const HELPER_TIMEOUT: Duration = Duration::from_secs(10);

const APP_NAME: &str = "clipgeo";

/// Which helper command delivers toasts on this machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativePlatform {
    NotifySend,
    Osascript,
    PowerShell,
}

impl NativePlatform {
    /// Helper for the platform this binary was built for
    pub fn current() -> Option<Self> {
        if cfg!(target_os = "macos") {
            Some(NativePlatform::Osascript)
        } else if cfg!(target_os = "windows") {
            Some(NativePlatform::PowerShell)
        } else if cfg!(unix) {
            Some(NativePlatform::NotifySend)
        } else {
            None
        }
    }

    /// Executable the helper runs
    pub fn program(&self) -> &'static str {
        match self {
            NativePlatform::NotifySend => "notify-send",
            NativePlatform::Osascript => "osascript",
            NativePlatform::PowerShell => "powershell",
        }
    }
}

/// Program and arguments for one toast
pub fn helper_invocation(
    platform: NativePlatform,
    title: &str,
    message: &str,
    context: &NotificationContext,
) -> (&'static str, Vec<String>) {
    let body = body_with_link(message, context);

    let args = match platform {
        NativePlatform::NotifySend => vec![
            format!("--app-name={}", APP_NAME),
            format!("--expire-time={}", context.duration.as_millis()),
            title.to_string(),
            body,
        ],
        NativePlatform::Osascript => vec![
            "-e".to_string(),
            format!(
                "display notification \"{}\" with title \"{}\"",
                applescript_escape(&body),
                applescript_escape(title)
            ),
        ],
        NativePlatform::PowerShell => vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            powershell_toast_script(title, &body),
        ],
    };

    (platform.program(), args)
}

fn applescript_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn powershell_toast_script(title: &str, body: &str) -> String {
    // Text is XML-escaped first, so no single quote survives into the literal
    let xml = format!(
        "<toast><visual><binding template=\"ToastGeneric\"><text>{}</text><text>{}</text></binding></visual></toast>",
        xml_escape(title),
        xml_escape(body)
    );
    format!(
        "[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null; \
         [Windows.Data.Xml.Dom.XmlDocument, Windows.Data.Xml.Dom.XmlDocument, ContentType = WindowsRuntime] | Out-Null; \
         $xml = New-Object Windows.Data.Xml.Dom.XmlDocument; \
         $xml.LoadXml('{}'); \
         $toast = [Windows.UI.Notifications.ToastNotification]::new($xml); \
         [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('{}').Show($toast)",
        xml,
        APP_NAME
    )
}

/// Look for an executable on `PATH`
fn find_on_path(program: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        let with_exe = dir.join(format!("{}.exe", program));
        with_exe.is_file().then_some(with_exe)
    })
}

/// Toast backend that shells out to the platform helper
#[derive(Debug)]
pub struct NativeBackend {
    platform: NativePlatform,
    program: PathBuf,
}

impl NativeBackend {
    pub fn new(platform: NativePlatform, program: PathBuf) -> Self {
        Self { platform, program }
    }

    pub fn platform(&self) -> NativePlatform {
        self.platform
    }
}

#[async_trait]
impl NotificationBackend for NativeBackend {
    async fn attempt(
        &self,
        title: &str,
        message: &str,
        context: &NotificationContext,
    ) -> Result<(), Error> {
        let (_, args) = helper_invocation(self.platform, title, message, context);

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(HELPER_TIMEOUT, command.output())
            .await
            .map_err(|_| Error::notification(NATIVE_BACKEND, "helper timed out"))?
            .map_err(|e| {
                Error::notification(
                    NATIVE_BACKEND,
                    format!("Failed to run {}: {}", self.platform.program(), e),
                )
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::notification(
                NATIVE_BACKEND,
                format!(
                    "{} exited with {}: {}",
                    self.platform.program(),
                    output.status,
                    stderr.trim()
                ),
            ))
        }
    }

    fn backend_name(&self) -> &str {
        NATIVE_BACKEND
    }
}

/// Factory for [`NativeBackend`]
///
/// Probing fails when the platform has no known helper or the helper is not
/// installed.
pub struct NativeBackendFactory {
    platform: Option<NativePlatform>,
}

impl NativeBackendFactory {
    /// Factory for the platform this binary was built for
    pub fn detect() -> Self {
        Self {
            platform: NativePlatform::current(),
        }
    }

    /// Factory for a specific helper
    pub fn for_platform(platform: NativePlatform) -> Self {
        Self {
            platform: Some(platform),
        }
    }
}

impl BackendFactory for NativeBackendFactory {
    fn probe(&self) -> Result<Box<dyn NotificationBackend>, Error> {
        let platform = self
            .platform
            .ok_or_else(|| Error::notification(NATIVE_BACKEND, "no toast helper for this platform"))?;

        let program = find_on_path(platform.program()).ok_or_else(|| {
            Error::notification(
                NATIVE_BACKEND,
                format!("{} not found on PATH", platform.program()),
            )
        })?;

        tracing::debug!("Native notifications via {}", program.display());
        Ok(Box::new(NativeBackend::new(platform, program)))
    }
}
