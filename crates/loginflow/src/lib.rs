//! # loginflow
//!
//! Client-side login session workflow.
//!
//! A login takes a username and password through a fixed sequence of
//! stages: token exchange, user lookup, session timer start, license
//! check and post-login navigation. loginflow sequences those stages and
//! owns the resulting session; the application plugs in how each stage
//! talks to its backend and UI by implementing the collaborator traits
//! re-exported from [`loginflow_session`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loginflow::prelude::*;
//!
//! // Implement Authenticator and LicenseChecker for your backend, then:
//! // let workflow = SessionWorkflowBuilder::new()
//! //     .config(WorkflowConfig::from_json(&config_file)?)
//! //     .navigator(router)
//! //     .build(auth, license);
//! // let success = workflow.submit("admin", "secret").await?;
//! ```
//!
//! ## Failures
//!
//! - Bad input never reaches the network.
//! - A refused token leaves the user on the form, either with per-field
//!   messages or with the inputs cleared.
//! - Once a token exists, any failure logs the session out, raises an
//!   error alert and redirects to the logout route after
//!   [`LOGOUT_REDIRECT_DELAY`].

mod config;
mod error;
mod failure;
mod redirect;
mod workflow;

pub use config::WorkflowConfig;
pub use error::LoginflowError;
pub use redirect::LOGOUT_REDIRECT_DELAY;
pub use workflow::{LoginSuccess, SessionWorkflow, SessionWorkflowBuilder};

pub use loginflow_session as session;
pub use loginflow_timer as timer;

/// Convenience re-exports for applications wiring up a workflow.
pub mod prelude {
    pub use crate::{
        LOGOUT_REDIRECT_DELAY, LoginSuccess, LoginflowError, SessionWorkflow,
        SessionWorkflowBuilder, WorkflowConfig,
    };
    pub use loginflow_session::{
        Alert, AlertSink, AuthError, Authenticator, BusyIndicator,
        CredentialRejection, Destination, HttpError, LicenseChecker, LoginForm,
        LoginHooks, NavigationIntent, NavigationStore, Navigator, PostAuthStage,
        SessionContext, SessionError, Severity, TokenGrant, UserId, UserProfile,
        WorkflowState,
    };
    pub use loginflow_timer::{SessionGeneration, TimerConfig, TimerExpiry};
}
