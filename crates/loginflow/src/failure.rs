//! The failure router: one place every failed login stage ends up.
//!
//! Pre-token failures only touch the form. Post-token failures invalidate
//! the session on the server, raise an alert and schedule the forced
//! redirect to the logout route.

use std::sync::Arc;

use loginflow_session::{Alert, Authenticator, FieldErrors, HttpError, PostAuthStage};
use loginflow_timer::SessionGeneration;

use crate::redirect::RedirectScheduler;
use crate::workflow::Collaborators;

pub(crate) struct FailureRouter<'a, A: Authenticator> {
    pub(crate) auth: &'a A,
    pub(crate) collab: &'a Collaborators,
    pub(crate) redirects: &'a RedirectScheduler,
    pub(crate) logout_route: &'a str,
}

impl<A: Authenticator> FailureRouter<'_, A> {
    /// Generic credential rejection: clear the inputs and start over.
    pub(crate) fn input_rejected(&self) {
        self.collab.busy.stop();
        self.collab.form.reset();
        self.collab.form.focus_username();
    }

    /// Field-specific credential rejection: keep the inputs, show messages.
    pub(crate) fn field_errors(&self, errors: &FieldErrors) {
        self.collab.busy.stop();
        self.collab.form.show_field_errors(errors);
    }

    /// The attempt was superseded; only the spinner needs cleaning up.
    pub(crate) fn cancelled(&self) {
        self.collab.busy.stop();
    }

    /// Forces a server-side logout. A failing logout is logged and
    /// otherwise ignored; the local session is already gone.
    pub(crate) async fn invalidate_session(&self, generation: SessionGeneration) {
        if let Err(error) = self.auth.logout().await {
            tracing::warn!(%generation, %error, "forced logout failed");
        }
    }

    /// Alerts the user and schedules the redirect to the logout route.
    pub(crate) fn escalate(
        &self,
        generation: SessionGeneration,
        stage: PostAuthStage,
        error: &HttpError,
    ) {
        self.collab.busy.stop();
        self.collab.alerts.show(Alert::error(format!(
            "Failed to access {}. GET returned status: {}",
            stage.subject(),
            error.status
        )));
        self.redirects.schedule(
            generation,
            Arc::clone(&self.collab.navigator),
            self.logout_route.to_string(),
        );
    }
}
