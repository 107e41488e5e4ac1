//! The session workflow engine.
//!
//! A login runs as one straight sequence of awaited stages:
//!
//! ```text
//! submit ─→ token ─→ user ─→ timer ─→ license ─→ destination
//!   │         │        │                 │
//!   ▼         ▼        ▼                 ▼
//!  (validation) (credential)  (post-auth: logout + alert + redirect)
//! ```
//!
//! Each stage returns a single `Result`. The first failure stops the
//! sequence and goes to the [`FailureRouter`](crate::failure::FailureRouter).
//! Between stages the engine re-checks the login generation so a cycle
//! superseded by a logout never writes to the session.

use std::mem;
use std::sync::Arc;

use loginflow_session::{
    AlertSink, AuthError, Authenticator, BusyIndicator, Credentials, Destination,
    HttpError, LicenseChecker, LogAlertSink, LogNavigator, LoginForm, LoginHooks,
    MemoryNavigationStore, NavigationStore, Navigator, PostAuthStage, RejectionKind,
    SessionAttempt, SessionContext, SessionError, UserId, WorkflowState,
    resolve_destination,
};
use loginflow_timer::{SessionGeneration, SessionTimer, TimerExpiry, TimerStatus};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::WorkflowConfig;
use crate::failure::FailureRouter;
use crate::redirect::RedirectScheduler;

/// The fire-and-forget collaborators, shared by the engine and the router.
pub(crate) struct Collaborators {
    pub(crate) alerts: Arc<dyn AlertSink>,
    pub(crate) navigator: Arc<dyn Navigator>,
    pub(crate) store: Arc<dyn NavigationStore>,
    pub(crate) busy: Arc<dyn BusyIndicator>,
    pub(crate) form: Arc<dyn LoginForm>,
    pub(crate) hooks: Arc<dyn LoginHooks>,
}

/// What a successful login resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    pub user_id: UserId,
    pub destination: Destination,
    pub generation: SessionGeneration,
}

/// Why the stage sequence stopped early.
enum StageFailure {
    Credential(AuthError),
    PostAuth(PostAuthStage, HttpError),
    /// The session went idle before the login finished.
    Expired,
    Cancelled,
}

/// Everything the engine mutates. Only ever locked briefly, never across
/// a collaborator call.
#[derive(Default)]
struct EngineState {
    state: WorkflowState,
    context: Option<SessionContext>,
    generation: SessionGeneration,
}

struct Shared<A, L> {
    auth: A,
    license: L,
    collab: Collaborators,
    timer: SessionTimer,
    redirects: RedirectScheduler,
    config: WorkflowConfig,
    inner: Mutex<EngineState>,
}

/// The login session state machine.
///
/// Cheap to clone; clones share the same session. At most one login
/// attempt runs at a time: a [`submit`](Self::submit) while another is in
/// flight fails with [`SessionError::AttemptInFlight`] before any
/// collaborator is called.
pub struct SessionWorkflow<A: Authenticator, L: LicenseChecker> {
    shared: Arc<Shared<A, L>>,
}

impl<A: Authenticator, L: LicenseChecker> Clone for SessionWorkflow<A, L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A, L> SessionWorkflow<A, L>
where
    A: Authenticator,
    L: LicenseChecker,
{
    fn router(&self) -> FailureRouter<'_, A> {
        FailureRouter {
            auth: &self.shared.auth,
            collab: &self.shared.collab,
            redirects: &self.shared.redirects,
            logout_route: &self.shared.config.logout_route,
        }
    }

    // ---------------------------------------------------------------------
    // Login
    // ---------------------------------------------------------------------

    /// Runs a full login: token, user, timer, license, navigation.
    ///
    /// # Errors
    /// - [`SessionError::AttemptInFlight`]: another login is running
    /// - [`SessionError::AlreadyAuthenticated`]: log out first
    /// - [`SessionError::Validation`]: empty username or password
    /// - [`SessionError::Credential`]: the token exchange was refused
    /// - [`SessionError::PostAuth`]: user or license fetch failed; the
    ///   session was invalidated and a logout redirect is scheduled
    /// - [`SessionError::SessionExpired`]: the session went idle before the
    ///   license check finished
    /// - [`SessionError::Cancelled`]: a logout superseded this attempt
    pub async fn submit(
        &self,
        username: &str,
        password: &str,
    ) -> Result<LoginSuccess, SessionError> {
        let mut attempt = SessionAttempt::new(username, password);
        let (generation, credentials) = self.begin(&mut attempt).await?;

        match self.run_stages(generation, credentials).await {
            Ok(success) => Ok(success),
            Err(failure) => Err(self.route_failure(generation, attempt, failure).await),
        }
    }

    /// Guard, generation bump and input validation.
    async fn begin(
        &self,
        attempt: &mut SessionAttempt,
    ) -> Result<(SessionGeneration, Credentials), SessionError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.state.is_in_flight() {
            warn!(state = %inner.state, "login rejected, another attempt is in flight");
            return Err(SessionError::AttemptInFlight);
        }
        if !inner.state.accepts_submit() {
            warn!(state = %inner.state, "login rejected, already authenticated");
            return Err(SessionError::AlreadyAuthenticated);
        }

        // Any accepted submit supersedes work scheduled by older cycles.
        inner.generation = inner.generation.next();
        let generation = inner.generation;
        self.shared.redirects.cancel();

        match attempt.take_credentials().filter(Credentials::is_complete) {
            Some(credentials) => {
                inner.state = WorkflowState::Submitting;
                debug!(%generation, "login submitted");
                Ok((generation, credentials))
            }
            None => {
                inner.state = WorkflowState::Idle;
                drop(inner);
                attempt.reject_input();
                self.shared.collab.form.reset();
                self.shared.collab.form.focus_username();
                debug!(%generation, "login rejected, username and password are required");
                Err(SessionError::Validation(mem::take(attempt)))
            }
        }
    }

    async fn run_stages(
        &self,
        generation: SessionGeneration,
        credentials: Credentials,
    ) -> Result<LoginSuccess, StageFailure> {
        let shared = &*self.shared;
        shared.collab.busy.start();
        let intent = shared.collab.store.load();

        // --- Stage 1: token ---
        let grant = shared
            .auth
            .retrieve_token(credentials.username(), credentials.password())
            .await
            .map_err(StageFailure::Credential)?;
        drop(credentials);
        shared.auth.set_token(grant.expires);
        self.advance(generation, WorkflowState::TokenAcquired, |inner| {
            inner.context = Some(SessionContext::from_grant(generation, grant));
        })
        .await?;

        // --- Stage 2: user, then the session timer ---
        self.advance(generation, WorkflowState::FetchingUser, |_| ()).await?;
        let profile = shared
            .auth
            .get_user()
            .await
            .map_err(|e| StageFailure::PostAuth(PostAuthStage::UserFetch, e))?;
        shared.auth.set_user_info(&profile);
        let context = self
            .advance(generation, WorkflowState::UserReady, |inner| {
                inner.context.as_mut().map(|ctx| {
                    ctx.set_user(&profile);
                    ctx.set_timer(shared.timer.start(generation));
                    ctx.clone()
                })
            })
            .await?
            .ok_or(StageFailure::Cancelled)?;
        info!(%generation, user_id = %profile.id, "user loaded, session timer started");
        shared.collab.hooks.user_ready(&context);

        // --- Stage 3: license ---
        self.advance(generation, WorkflowState::FetchingLicense, |_| ()).await?;
        shared
            .license
            .get_config()
            .await
            .map_err(|e| StageFailure::PostAuth(PostAuthStage::LicenseFetch, e))?;
        shared.license.test();

        // --- Destination ---
        let destination =
            resolve_destination(intent, profile.id, &shared.config.landing_route);
        // The timer runs from UserReady on, so a slow license check can use
        // up the whole idle window. Its expiry was dropped as in-flight.
        let idle = self
            .advance(generation, WorkflowState::Authenticated, |inner| {
                let expired = shared.timer.is_expired()
                    && shared
                        .timer
                        .current()
                        .is_some_and(|h| h.generation() == generation);
                if expired {
                    inner.context = None;
                    inner.state = WorkflowState::Expired;
                }
                expired
            })
            .await?;
        if idle {
            return Err(StageFailure::Expired);
        }
        shared.collab.busy.stop();
        shared.collab.hooks.licensed(&context);
        if destination.consumes_pre_auth_url() {
            shared.collab.store.clear_pre_auth_url();
        }
        shared.collab.navigator.navigate(destination.path());

        info!(
            %generation,
            user_id = %profile.id,
            destination = destination.path(),
            "login complete"
        );
        Ok(LoginSuccess {
            user_id: profile.id,
            destination,
            generation,
        })
    }

    /// Moves to `next` if `generation` is still current, applying `apply`
    /// under the same lock.
    async fn advance<T>(
        &self,
        generation: SessionGeneration,
        next: WorkflowState,
        apply: impl FnOnce(&mut EngineState) -> T,
    ) -> Result<T, StageFailure> {
        let mut inner = self.shared.inner.lock().await;
        if inner.generation != generation {
            debug!(
                %generation,
                current = %inner.generation,
                "dropping stage result of superseded attempt"
            );
            return Err(StageFailure::Cancelled);
        }
        debug!(%generation, from = %inner.state, to = %next, "transition");
        inner.state = next;
        Ok(apply(&mut inner))
    }

    /// Sets `state` if `generation` is still current.
    async fn settle(&self, generation: SessionGeneration, state: WorkflowState) -> bool {
        let mut inner = self.shared.inner.lock().await;
        if inner.generation != generation {
            return false;
        }
        debug!(%generation, from = %inner.state, to = %state, "transition");
        inner.state = state;
        true
    }

    async fn is_current(&self, generation: SessionGeneration) -> bool {
        self.shared.inner.lock().await.generation == generation
    }

    // ---------------------------------------------------------------------
    // Failures
    // ---------------------------------------------------------------------

    async fn route_failure(
        &self,
        generation: SessionGeneration,
        mut attempt: SessionAttempt,
        failure: StageFailure,
    ) -> SessionError {
        attempt.discard_credentials();
        let router = self.router();
        let stale = !self.is_current(generation).await;

        match failure {
            StageFailure::Cancelled => {
                router.cancelled();
                SessionError::Cancelled
            }
            _ if stale => {
                router.cancelled();
                SessionError::Cancelled
            }
            StageFailure::Expired => {
                info!(%generation, "session expired before login completed");
                router.cancelled();
                SessionError::SessionExpired
            }
            StageFailure::Credential(error) => {
                self.credential_failure(generation, attempt, error, &router)
                    .await
            }
            StageFailure::PostAuth(stage, error) => {
                self.post_auth_failure(generation, stage, error, &router)
                    .await
            }
        }
    }

    async fn credential_failure(
        &self,
        generation: SessionGeneration,
        mut attempt: SessionAttempt,
        error: AuthError,
        router: &FailureRouter<'_, A>,
    ) -> SessionError {
        self.settle(generation, WorkflowState::Idle).await;

        match error {
            AuthError::Rejected(rejection) => match attempt.apply_rejection(&rejection) {
                RejectionKind::FieldSpecific(errors) => {
                    warn!(
                        %generation,
                        fields = ?errors.keys().collect::<Vec<_>>(),
                        "login rejected with field errors"
                    );
                    router.field_errors(&errors);
                }
                RejectionKind::Generic => {
                    warn!(
                        %generation,
                        reason = rejection.generic_message().unwrap_or("unspecified"),
                        "login rejected"
                    );
                    router.input_rejected();
                }
            },
            AuthError::Unavailable(error) => {
                warn!(%generation, %error, "token request failed");
                attempt.reject_input();
                router.input_rejected();
            }
        }

        SessionError::Credential(attempt)
    }

    async fn post_auth_failure(
        &self,
        generation: SessionGeneration,
        stage: PostAuthStage,
        error: HttpError,
        router: &FailureRouter<'_, A>,
    ) -> SessionError {
        warn!(
            %generation,
            %stage,
            status = error.status,
            "post-auth stage failed, invalidating session"
        );

        let current = {
            let mut inner = self.shared.inner.lock().await;
            let current = inner.generation == generation;
            if current {
                inner.context = None;
            }
            current
        };
        if !current {
            // A logout got here first and already ended the server session.
            router.cancelled();
            return SessionError::Cancelled;
        }
        self.stop_timer_for(generation);
        router.invalidate_session(generation).await;

        let failed = WorkflowState::Failed {
            stage,
            reason: error.to_string(),
        };
        if self.settle(generation, failed).await {
            router.escalate(generation, stage, &error);
        } else {
            router.cancelled();
        }

        SessionError::PostAuth {
            stage,
            source: error,
        }
    }

    fn stop_timer_for(&self, generation: SessionGeneration) {
        let timer = &self.shared.timer;
        if timer.current().is_some_and(|h| h.generation() == generation) {
            timer.stop();
        }
    }

    // ---------------------------------------------------------------------
    // Logout and expiry
    // ---------------------------------------------------------------------

    /// Ends the session (or an attempt still in flight) and returns to `Idle`.
    ///
    /// Local state is cleared before the server is told, so even a failing
    /// server-side logout leaves no session behind.
    ///
    /// # Errors
    /// - [`SessionError::NotAuthenticated`]: nothing to log out of
    /// - [`SessionError::LogoutFailed`]: the server-side logout failed
    pub async fn logout(&self) -> Result<(), SessionError> {
        let generation = {
            let mut inner = self.shared.inner.lock().await;
            let active = inner.context.is_some()
                || inner.state.is_in_flight()
                || inner.state == WorkflowState::Expired;
            if !active {
                return Err(SessionError::NotAuthenticated);
            }
            inner.generation = inner.generation.next();
            inner.context = None;
            inner.state = WorkflowState::Idle;
            inner.generation
        };
        self.shared.redirects.cancel();
        self.shared.timer.stop();

        self.shared
            .auth
            .logout()
            .await
            .map_err(SessionError::LogoutFailed)?;
        info!(%generation, "logged out");
        Ok(())
    }

    /// Applies a timer expiry. Returns `false` if the expiry belongs to a
    /// session that is no longer the authenticated one.
    pub async fn handle_timer_expired(&self, expiry: TimerExpiry) -> bool {
        let expired = {
            let mut inner = self.shared.inner.lock().await;
            let current = inner.state.is_authenticated()
                && inner
                    .context
                    .as_ref()
                    .is_some_and(|ctx| ctx.generation() == expiry.generation);
            if current {
                inner.context = None;
                inner.state = WorkflowState::Expired;
            }
            current
        };

        if expired {
            info!(
                generation = %expiry.generation,
                idle_secs = expiry.idle_for.as_secs(),
                "session expired"
            );
        } else {
            debug!(generation = %expiry.generation, "ignoring stale timer expiry");
        }
        expired
    }

    /// Waits for the session timer to expire the current session.
    ///
    /// Pends while nobody is logged in, so it can sit in a `tokio::select!`
    /// loop for the lifetime of the application.
    pub async fn watch_expiry(&self) -> TimerExpiry {
        loop {
            let expiry = self.shared.timer.wait_for_expiry().await;
            if self.handle_timer_expired(expiry).await {
                return expiry;
            }
        }
    }

    /// Records user activity, pushing the idle deadline forward.
    ///
    /// # Errors
    /// - [`SessionError::SessionExpired`]: the session went idle; the
    ///   workflow is now `Expired`
    /// - [`SessionError::NotAuthenticated`]: no session to extend
    pub async fn record_activity(&self) -> Result<(), SessionError> {
        let generation = {
            let inner = self.shared.inner.lock().await;
            match (&inner.state, &inner.context) {
                (WorkflowState::Authenticated, Some(ctx)) => ctx.generation(),
                (WorkflowState::Expired, _) => return Err(SessionError::SessionExpired),
                _ => return Err(SessionError::NotAuthenticated),
            }
        };

        match self.shared.timer.touch() {
            TimerStatus::Running { .. } => Ok(()),
            TimerStatus::Expired => {
                let expiry = TimerExpiry {
                    generation,
                    idle_for: self.shared.timer.idle_timeout(),
                };
                self.handle_timer_expired(expiry).await;
                Err(SessionError::SessionExpired)
            }
            TimerStatus::Stopped => Err(SessionError::NotAuthenticated),
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    /// Current workflow state.
    pub async fn state(&self) -> WorkflowState {
        self.shared.inner.lock().await.state.clone()
    }

    /// A copy of the current session, if one exists.
    pub async fn context(&self) -> Option<SessionContext> {
        self.shared.inner.lock().await.context.clone()
    }

    /// The generation of the most recent login cycle.
    pub async fn generation(&self) -> SessionGeneration {
        self.shared.inner.lock().await.generation
    }

    pub async fn is_authenticated(&self) -> bool {
        self.shared.inner.lock().await.state.is_authenticated()
    }

    /// Whether the previous session ended by expiring, per the navigation
    /// store. Login forms use it to explain why the user is back.
    pub fn last_session_expired(&self) -> bool {
        self.shared.collab.store.session_expired()
    }

    /// Whether a forced logout redirect is still waiting to fire.
    pub fn redirect_pending(&self) -> bool {
        self.shared.redirects.is_pending()
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.shared.timer
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.shared.config
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`SessionWorkflow`].
///
/// Every collaborator has a default: alerts and navigation go to the log,
/// the navigation store is an empty in-memory one, and the busy indicator,
/// login form and hooks do nothing.
///
/// # Example
///
/// ```rust,ignore
/// let workflow = SessionWorkflowBuilder::new()
///     .config(WorkflowConfig::default())
///     .navigator(router.clone())
///     .alerts(toaster.clone())
///     .build(auth, license);
/// ```
pub struct SessionWorkflowBuilder {
    config: WorkflowConfig,
    alerts: Arc<dyn AlertSink>,
    navigator: Arc<dyn Navigator>,
    store: Arc<dyn NavigationStore>,
    busy: Arc<dyn BusyIndicator>,
    form: Arc<dyn LoginForm>,
    hooks: Arc<dyn LoginHooks>,
}

impl SessionWorkflowBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: WorkflowConfig::default(),
            alerts: Arc::new(LogAlertSink),
            navigator: Arc::new(LogNavigator),
            store: Arc::new(MemoryNavigationStore::default()),
            busy: Arc::new(()),
            form: Arc::new(()),
            hooks: Arc::new(()),
        }
    }

    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn store(mut self, store: Arc<dyn NavigationStore>) -> Self {
        self.store = store;
        self
    }

    pub fn busy(mut self, busy: Arc<dyn BusyIndicator>) -> Self {
        self.busy = busy;
        self
    }

    pub fn form(mut self, form: Arc<dyn LoginForm>) -> Self {
        self.form = form;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LoginHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Builds the workflow around the given authenticator and license
    /// checker. The session timer starts out stopped.
    pub fn build<A, L>(self, auth: A, license: L) -> SessionWorkflow<A, L>
    where
        A: Authenticator,
        L: LicenseChecker,
    {
        let timer = SessionTimer::new(self.config.timer.clone());
        SessionWorkflow {
            shared: Arc::new(Shared {
                auth,
                license,
                collab: Collaborators {
                    alerts: self.alerts,
                    navigator: self.navigator,
                    store: self.store,
                    busy: self.busy,
                    form: self.form,
                    hooks: self.hooks,
                },
                timer,
                redirects: RedirectScheduler::new(),
                config: self.config,
                inner: Mutex::new(EngineState::default()),
            }),
        }
    }
}

impl Default for SessionWorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}
