//! Session data model and collaborator contracts for loginflow.
//!
//! This crate holds everything the workflow engine talks about but does
//! not own the behavior of:
//!
//! 1. **Collaborators**: the [`Authenticator`], the [`LicenseChecker`],
//!    the [`NavigationStore`] and the UI-facing sinks ([`AlertSink`],
//!    [`Navigator`], [`BusyIndicator`], [`LoginForm`], [`LoginHooks`]).
//! 2. **Data**: a [`SessionAttempt`] per submission, the [`SessionContext`]
//!    of an authenticated session, the [`NavigationIntent`] carried over
//!    from the previous session.
//! 3. **Errors**: the [`SessionError`] taxonomy and the collaborator error
//!    types.
//!
//! # How it fits in the stack
//!
//! ```text
//! Workflow engine (loginflow)   ← sequences the login stages
//!     ↕
//! Session layer (this crate)    ← data model + collaborator contracts
//!     ↕
//! Session timer (loginflow-timer) ← idle expiry
//! ```

#![allow(async_fn_in_trait)]

mod attempt;
mod auth;
mod error;
mod license;
mod navigation;
mod session;
mod ui;

pub use attempt::{
    CredentialRejection, Credentials, FieldErrors, Messages, RejectionKind,
    SessionAttempt,
};
pub use auth::Authenticator;
pub use error::{AuthError, HttpError, PostAuthStage, SessionError};
pub use license::LicenseChecker;
pub use navigation::{
    Destination, MemoryNavigationStore, NavigationIntent, NavigationStore,
    resolve_destination,
};
pub use session::{SessionContext, TokenGrant, UserId, UserProfile, WorkflowState};
pub use ui::{
    Alert, AlertSink, BusyIndicator, LogAlertSink, LogNavigator, LoginForm,
    LoginHooks, Navigator, Severity,
};

pub use loginflow_timer::{SessionGeneration, TimerHandle};
