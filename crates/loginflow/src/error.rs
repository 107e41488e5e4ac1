//! Unified error type for loginflow.

use loginflow_session::SessionError;

/// Top-level error that wraps the crate-specific errors.
///
/// The `#[from]` attributes let `?` convert session and configuration
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum LoginflowError {
    /// A login, logout or expiry error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The workflow configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
