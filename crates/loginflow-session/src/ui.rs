//! UI-facing collaborators.
//!
//! All of these are fire-and-forget: the workflow calls them and never
//! waits on or inspects a result. They are object-safe so the engine can
//! hold them as `Arc<dyn Trait>`.

use std::fmt;

use crate::{FieldErrors, SessionContext};

/// How loud an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Danger,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "alert-info"),
            Self::Warning => write!(f, "alert-warning"),
            Self::Danger => write!(f, "alert-danger"),
        }
    }
}

/// A user-visible alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

impl Alert {
    /// A `Danger` alert titled "Error".
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: "Error".to_string(),
            message: message.into(),
            severity: Severity::Danger,
        }
    }
}

/// Shows alerts to the user.
pub trait AlertSink: Send + Sync {
    fn show(&self, alert: Alert);
}

/// Changes the current route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// The "please wait" spinner.
pub trait BusyIndicator: Send + Sync {
    fn start(&self) {}
    fn stop(&self) {}
}

/// The login form's input fields.
pub trait LoginForm: Send + Sync {
    /// Clears both inputs.
    fn reset(&self) {}
    /// Puts the cursor back in the username field.
    fn focus_username(&self) {}
    /// Shows messages next to their fields.
    fn show_field_errors(&self, _errors: &FieldErrors) {}
}

/// Startup work that hangs off a successful login (sockets, analytics,
/// feature flags).
pub trait LoginHooks: Send + Sync {
    /// The user is known and the session timer is running.
    fn user_ready(&self, _context: &SessionContext) {}
    /// The license check passed.
    fn licensed(&self, _context: &SessionContext) {}
}

impl BusyIndicator for () {}
impl LoginForm for () {}
impl LoginHooks for () {}

/// An [`AlertSink`] that writes alerts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn show(&self, alert: Alert) {
        match alert.severity {
            Severity::Danger => {
                tracing::error!(title = %alert.title, "{}", alert.message);
            }
            Severity::Warning => {
                tracing::warn!(title = %alert.title, "{}", alert.message);
            }
            Severity::Info => {
                tracing::info!(title = %alert.title, "{}", alert.message);
            }
        }
    }
}

/// A [`Navigator`] that only logs where it would go.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        tracing::info!(path, "navigate");
    }
}
