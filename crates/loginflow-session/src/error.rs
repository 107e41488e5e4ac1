//! Error types for the session layer.

use std::fmt;

use crate::{CredentialRejection, SessionAttempt};

/// A failed call to a collaborator's HTTP endpoint.
///
/// Only the status is acted on; the message is for logs and alerts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (status {status})")]
pub struct HttpError {
    /// HTTP status code. 0 when the request never got a response.
    pub status: u16,
    /// Human-readable detail.
    pub message: String,
}

impl HttpError {
    /// Creates an error with the given status and message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates an error that only carries a status.
    pub fn status(status: u16) -> Self {
        Self::new(status, "request failed")
    }
}

/// Errors returned by [`Authenticator::retrieve_token`](crate::Authenticator::retrieve_token).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The server rejected the credentials and said why.
    #[error("credentials rejected")]
    Rejected(CredentialRejection),

    /// The token request failed without a usable rejection payload.
    #[error("token request failed: {0}")]
    Unavailable(#[from] HttpError),
}

/// The post-token stages that can fail after a token exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAuthStage {
    /// Fetching the authenticated user's profile.
    UserFetch,
    /// Fetching and validating the license.
    LicenseFetch,
}

impl PostAuthStage {
    /// What the stage was trying to load, as shown to the user.
    pub fn subject(self) -> &'static str {
        match self {
            Self::UserFetch => "user information",
            Self::LicenseFetch => "license information",
        }
    }
}

impl fmt::Display for PostAuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserFetch => write!(f, "user fetch"),
            Self::LicenseFetch => write!(f, "license fetch"),
        }
    }
}

/// Errors that end a login cycle or reject an operation on the workflow.
///
/// Pre-token failures ([`Validation`](Self::Validation),
/// [`Credential`](Self::Credential)) carry the resolved
/// [`SessionAttempt`] with its credentials already discarded, so callers
/// can show `attempt_failed` and per-field messages.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Username or password was empty. No network call was made.
    #[error("username and password are required")]
    Validation(SessionAttempt),

    /// The token exchange rejected the credentials. No session exists.
    #[error("login rejected")]
    Credential(SessionAttempt),

    /// A stage after token acquisition failed. The session was invalidated.
    #[error("{stage} failed: {source}")]
    PostAuth {
        stage: PostAuthStage,
        source: HttpError,
    },

    /// The session timer reported the session as idle.
    #[error("session expired")]
    SessionExpired,

    /// Another login attempt is still in flight.
    #[error("a login attempt is already in flight")]
    AttemptInFlight,

    /// A session is already authenticated; log out first.
    #[error("already authenticated")]
    AlreadyAuthenticated,

    /// The operation needs an authenticated session and there is none.
    #[error("no authenticated session")]
    NotAuthenticated,

    /// The login cycle was superseded (by a logout) while it was waiting.
    #[error("login attempt superseded")]
    Cancelled,

    /// The session was cleared locally but the server-side logout failed.
    #[error("logout failed: {0}")]
    LogoutFailed(HttpError),
}

impl SessionError {
    /// The resolved attempt, for pre-token failures.
    pub fn attempt(&self) -> Option<&SessionAttempt> {
        match self {
            Self::Validation(attempt) | Self::Credential(attempt) => Some(attempt),
            _ => None,
        }
    }

    /// HTTP status of a post-token failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::PostAuth { source, .. } | Self::LogoutFailed(source) => {
                Some(source.status)
            }
            _ => None,
        }
    }
}
