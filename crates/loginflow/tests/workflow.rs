//! Integration tests for the session workflow: login stages, failure
//! routing, logout and idle expiry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use loginflow::prelude::*;
use loginflow::session::{FieldErrors, MemoryNavigationStore};
use tokio::sync::Notify;

// =========================================================================
// Mock authenticator and license checker
// =========================================================================

#[derive(Clone)]
enum TokenReply {
    Grant,
    Reject(CredentialRejection),
    Unavailable(u16),
}

/// What the mock authenticator answers and how often it was asked.
struct AuthProbe {
    user: Mutex<UserProfile>,
    token_reply: Mutex<TokenReply>,
    user_failure: Mutex<Option<u16>>,
    logout_failure: Mutex<Option<u16>>,
    gate: Mutex<Option<Arc<Notify>>>,
    user_gate: Mutex<Option<Arc<Notify>>>,
    retrieve_calls: AtomicUsize,
    set_token_calls: AtomicUsize,
    get_user_calls: AtomicUsize,
    set_user_info_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl AuthProbe {
    fn new(user: UserProfile) -> Self {
        Self {
            user: Mutex::new(user),
            token_reply: Mutex::new(TokenReply::Grant),
            user_failure: Mutex::new(None),
            logout_failure: Mutex::new(None),
            gate: Mutex::new(None),
            user_gate: Mutex::new(None),
            retrieve_calls: AtomicUsize::new(0),
            set_token_calls: AtomicUsize::new(0),
            get_user_calls: AtomicUsize::new(0),
            set_user_info_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    fn reply_with(&self, reply: TokenReply) {
        *self.token_reply.lock().unwrap() = reply;
    }

    fn fail_user_fetch(&self, status: Option<u16>) {
        *self.user_failure.lock().unwrap() = status;
    }

    fn fail_logout(&self, status: u16) {
        *self.logout_failure.lock().unwrap() = Some(status);
    }

    fn login_as(&self, user: UserProfile) {
        *self.user.lock().unwrap() = user;
    }

    /// Makes `retrieve_token` wait until the returned gate is notified.
    fn hold_token_requests(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Makes `get_user` wait until the returned gate is notified.
    fn hold_user_requests(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.user_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

struct MockAuth(Arc<AuthProbe>);

impl Authenticator for MockAuth {
    async fn retrieve_token(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<TokenGrant, AuthError> {
        self.0.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.0.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self.0.token_reply.lock().unwrap().clone();
        match reply {
            TokenReply::Grant => Ok(TokenGrant::new(
                "token-abc",
                SystemTime::now() + Duration::from_secs(1800),
            )),
            TokenReply::Reject(rejection) => Err(AuthError::Rejected(rejection)),
            TokenReply::Unavailable(status) => {
                Err(AuthError::Unavailable(HttpError::status(status)))
            }
        }
    }

    fn set_token(&self, _expires: SystemTime) {
        self.0.set_token_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn get_user(&self) -> Result<UserProfile, HttpError> {
        self.0.get_user_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.0.user_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let failure = *self.0.user_failure.lock().unwrap();
        match failure {
            Some(status) => Err(HttpError::status(status)),
            None => Ok(self.0.user.lock().unwrap().clone()),
        }
    }

    fn set_user_info(&self, _profile: &UserProfile) {
        self.0.set_user_info_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn logout(&self) -> Result<(), HttpError> {
        self.0.logout_calls.fetch_add(1, Ordering::SeqCst);
        let failure = *self.0.logout_failure.lock().unwrap();
        match failure {
            Some(status) => Err(HttpError::status(status)),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
struct LicenseProbe {
    failure: Mutex<Option<u16>>,
    delay: Mutex<Option<Duration>>,
    config_calls: AtomicUsize,
    test_calls: AtomicUsize,
}

struct MockLicense(Arc<LicenseProbe>);

impl LicenseChecker for MockLicense {
    async fn get_config(&self) -> Result<(), HttpError> {
        self.0.config_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.0.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = *self.0.failure.lock().unwrap();
        match failure {
            Some(status) => Err(HttpError::status(status)),
            None => Ok(()),
        }
    }

    fn test(&self) {
        self.0.test_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// =========================================================================
// Recording UI
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum UiEvent {
    BusyStart,
    BusyStop,
    FormReset,
    FocusUsername,
    FieldErrors(FieldErrors),
    UserReady(Option<UserId>),
    Licensed,
    Alert(Alert),
    Navigate(String),
}

/// Implements every UI-facing collaborator and records what it was told.
#[derive(Default)]
struct Ui {
    events: Mutex<Vec<UiEvent>>,
}

impl Ui {
    fn push(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    fn navigations(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Navigate(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    fn alerts(&self) -> Vec<Alert> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Alert(alert) => Some(alert),
                _ => None,
            })
            .collect()
    }
}

impl AlertSink for Ui {
    fn show(&self, alert: Alert) {
        self.push(UiEvent::Alert(alert));
    }
}

impl Navigator for Ui {
    fn navigate(&self, path: &str) {
        self.push(UiEvent::Navigate(path.to_string()));
    }
}

impl BusyIndicator for Ui {
    fn start(&self) {
        self.push(UiEvent::BusyStart);
    }

    fn stop(&self) {
        self.push(UiEvent::BusyStop);
    }
}

impl LoginForm for Ui {
    fn reset(&self) {
        self.push(UiEvent::FormReset);
    }

    fn focus_username(&self) {
        self.push(UiEvent::FocusUsername);
    }

    fn show_field_errors(&self, errors: &FieldErrors) {
        self.push(UiEvent::FieldErrors(errors.clone()));
    }
}

impl LoginHooks for Ui {
    fn user_ready(&self, context: &SessionContext) {
        self.push(UiEvent::UserReady(context.user_id()));
    }

    fn licensed(&self, _context: &SessionContext) {
        self.push(UiEvent::Licensed);
    }
}

// =========================================================================
// Harness
// =========================================================================

const USER: UserId = UserId(7);

struct Harness {
    workflow: SessionWorkflow<MockAuth, MockLicense>,
    auth: Arc<AuthProbe>,
    license: Arc<LicenseProbe>,
    ui: Arc<Ui>,
    store: Arc<MemoryNavigationStore>,
}

fn harness() -> Harness {
    harness_with(WorkflowConfig::default(), NavigationIntent::default())
}

fn harness_with(config: WorkflowConfig, intent: NavigationIntent) -> Harness {
    let auth = Arc::new(AuthProbe::new(UserProfile::new(USER, "admin")));
    let license = Arc::new(LicenseProbe::default());
    let ui = Arc::new(Ui::default());
    let store = Arc::new(MemoryNavigationStore::new(intent));

    let workflow = SessionWorkflowBuilder::new()
        .config(config)
        .alerts(ui.clone())
        .navigator(ui.clone())
        .busy(ui.clone())
        .form(ui.clone())
        .hooks(ui.clone())
        .store(store.clone())
        .build(MockAuth(Arc::clone(&auth)), MockLicense(Arc::clone(&license)));

    Harness {
        workflow,
        auth,
        license,
        ui,
        store,
    }
}

fn short_timeout(secs: u64) -> WorkflowConfig {
    WorkflowConfig {
        timer: TimerConfig::with_timeout(secs),
        ..WorkflowConfig::default()
    }
}

fn logout_calls(h: &Harness) -> usize {
    AuthProbe::count(&h.auth.logout_calls)
}

// =========================================================================
// Successful login
// =========================================================================

#[tokio::test]
async fn test_submit_valid_credentials_lands_on_home() {
    let h = harness();

    let success = h.workflow.submit("admin", "secret").await.unwrap();

    assert_eq!(success.user_id, USER);
    assert_eq!(success.destination, Destination::Landing("/home".into()));
    assert_eq!(h.workflow.state().await, WorkflowState::Authenticated);
    assert!(h.workflow.is_authenticated().await);

    let context = h.workflow.context().await.expect("session should exist");
    assert_eq!(context.user_id(), Some(USER));
    assert_eq!(context.token(), "token-abc");
    assert_eq!(context.generation(), success.generation);
    assert_eq!(
        context.timer().map(|t| t.generation()),
        Some(success.generation)
    );
    assert!(h.workflow.timer().is_running());

    assert_eq!(
        h.ui.events(),
        vec![
            UiEvent::BusyStart,
            UiEvent::UserReady(Some(USER)),
            UiEvent::BusyStop,
            UiEvent::Licensed,
            UiEvent::Navigate("/home".into()),
        ]
    );
}

#[tokio::test]
async fn test_submit_calls_each_collaborator_once() {
    let h = harness();

    h.workflow.submit("admin", "secret").await.unwrap();

    assert_eq!(AuthProbe::count(&h.auth.retrieve_calls), 1);
    assert_eq!(AuthProbe::count(&h.auth.set_token_calls), 1);
    assert_eq!(AuthProbe::count(&h.auth.get_user_calls), 1);
    assert_eq!(AuthProbe::count(&h.auth.set_user_info_calls), 1);
    assert_eq!(AuthProbe::count(&h.license.config_calls), 1);
    assert_eq!(AuthProbe::count(&h.license.test_calls), 1);
    assert_eq!(logout_calls(&h), 0);
}

#[tokio::test]
async fn test_submit_pre_auth_url_wins_and_is_cleared() {
    let h = harness_with(
        WorkflowConfig::default(),
        NavigationIntent {
            pre_auth_url: Some("/templates/42".into()),
            last_path: Some("/inventories".into()),
            last_user_id: Some(USER),
        },
    );

    let success = h.workflow.submit("admin", "secret").await.unwrap();

    assert_eq!(
        success.destination,
        Destination::PreAuthUrl("/templates/42".into())
    );
    assert_eq!(h.ui.navigations(), vec!["/templates/42".to_string()]);
    assert_eq!(h.store.snapshot().pre_auth_url, None);
}

#[tokio::test]
async fn test_submit_same_user_returns_to_last_path() {
    let h = harness_with(
        WorkflowConfig::default(),
        NavigationIntent {
            pre_auth_url: None,
            last_path: Some("/inventories".into()),
            last_user_id: Some(USER),
        },
    );

    h.workflow.submit("admin", "secret").await.unwrap();

    assert_eq!(h.ui.navigations(), vec!["/inventories".to_string()]);
}

#[tokio::test]
async fn test_submit_other_user_ignores_last_path() {
    let h = harness_with(
        WorkflowConfig::default(),
        NavigationIntent {
            pre_auth_url: None,
            last_path: Some("/inventories".into()),
            last_user_id: Some(UserId(99)),
        },
    );

    h.workflow.submit("admin", "secret").await.unwrap();

    assert_eq!(h.ui.navigations(), vec!["/home".to_string()]);
}

#[tokio::test]
async fn test_submit_uses_configured_landing_route() {
    let config = WorkflowConfig::from_json(r#"{ "landing_route": "/dashboard" }"#).unwrap();
    let h = harness_with(config, NavigationIntent::default());

    h.workflow.submit("admin", "secret").await.unwrap();

    assert_eq!(h.ui.navigations(), vec!["/dashboard".to_string()]);
}

// =========================================================================
// Validation and concurrency guard
// =========================================================================

#[tokio::test]
async fn test_submit_empty_username_makes_no_network_call() {
    let h = harness();

    let err = h.workflow.submit("", "secret").await.unwrap_err();

    let SessionError::Validation(attempt) = err else {
        panic!("expected validation error, got {err:?}");
    };
    assert!(attempt.attempt_failed);
    assert!(!attempt.has_credentials());
    assert_eq!(AuthProbe::count(&h.auth.retrieve_calls), 0);
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
    assert_eq!(
        h.ui.events(),
        vec![UiEvent::FormReset, UiEvent::FocusUsername]
    );
}

#[tokio::test]
async fn test_submit_empty_password_makes_no_network_call() {
    let h = harness();

    let err = h.workflow.submit("admin", "").await.unwrap_err();

    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(AuthProbe::count(&h.auth.retrieve_calls), 0);
}

#[tokio::test]
async fn test_submit_while_in_flight_is_rejected() {
    let h = harness();
    let gate = h.auth.hold_token_requests();

    let (first, second, ()) = tokio::join!(
        h.workflow.submit("admin", "secret"),
        h.workflow.submit("admin", "secret"),
        async { gate.notify_one() },
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(SessionError::AttemptInFlight)));
    assert_eq!(AuthProbe::count(&h.auth.retrieve_calls), 1);
    assert_eq!(h.ui.navigations(), vec!["/home".to_string()]);
}

#[tokio::test]
async fn test_submit_while_authenticated_is_rejected() {
    let h = harness();
    h.workflow.submit("admin", "secret").await.unwrap();

    let err = h.workflow.submit("admin", "secret").await.unwrap_err();

    assert!(matches!(err, SessionError::AlreadyAuthenticated));
    assert_eq!(AuthProbe::count(&h.auth.retrieve_calls), 1);
    assert!(h.workflow.is_authenticated().await);
}

// =========================================================================
// Credential failures
// =========================================================================

#[tokio::test]
async fn test_field_rejection_shows_messages_and_keeps_inputs() {
    let h = harness();
    h.auth.reply_with(TokenReply::Reject(CredentialRejection::for_fields([(
        "password",
        "This field may not be blank.",
    )])));

    let err = h.workflow.submit("admin", "secret").await.unwrap_err();

    let SessionError::Credential(attempt) = err else {
        panic!("expected credential error, got {err:?}");
    };
    assert!(!attempt.attempt_failed);
    assert_eq!(
        attempt.field_errors.get("password").map(String::as_str),
        Some("This field may not be blank.")
    );

    let expected: FieldErrors = [(
        "password".to_string(),
        "This field may not be blank.".to_string(),
    )]
    .into_iter()
    .collect();
    assert_eq!(
        h.ui.events(),
        vec![
            UiEvent::BusyStart,
            UiEvent::BusyStop,
            UiEvent::FieldErrors(expected),
        ]
    );
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
    assert!(h.workflow.context().await.is_none());
    assert_eq!(logout_calls(&h), 0);
}

#[tokio::test]
async fn test_generic_rejection_resets_form() {
    let h = harness();
    h.auth.reply_with(TokenReply::Reject(CredentialRejection::generic(
        "Unable to log in with provided credentials.",
    )));

    let err = h.workflow.submit("admin", "wrong").await.unwrap_err();

    let SessionError::Credential(attempt) = err else {
        panic!("expected credential error, got {err:?}");
    };
    assert!(attempt.attempt_failed);
    assert!(attempt.field_errors.is_empty());
    assert_eq!(
        h.ui.events(),
        vec![
            UiEvent::BusyStart,
            UiEvent::BusyStop,
            UiEvent::FormReset,
            UiEvent::FocusUsername,
        ]
    );
    assert_eq!(AuthProbe::count(&h.auth.get_user_calls), 0);
    assert_eq!(logout_calls(&h), 0);
    assert!(h.ui.alerts().is_empty());
}

#[tokio::test]
async fn test_token_service_unavailable_is_generic_rejection() {
    let h = harness();
    h.auth.reply_with(TokenReply::Unavailable(502));

    let err = h.workflow.submit("admin", "secret").await.unwrap_err();

    let SessionError::Credential(attempt) = err else {
        panic!("expected credential error, got {err:?}");
    };
    assert!(attempt.attempt_failed);
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
    assert!(h.ui.events().contains(&UiEvent::FormReset));
}

#[tokio::test]
async fn test_retry_after_rejection_succeeds() {
    let h = harness();
    h.auth.reply_with(TokenReply::Reject(CredentialRejection::generic("nope")));
    h.workflow.submit("admin", "wrong").await.unwrap_err();

    h.auth.reply_with(TokenReply::Grant);
    let success = h.workflow.submit("admin", "secret").await.unwrap();

    assert_eq!(success.user_id, USER);
    assert!(h.workflow.is_authenticated().await);
}

// =========================================================================
// Post-auth failures
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_user_fetch_failure_logs_out_and_redirects() {
    let h = harness();
    h.auth.fail_user_fetch(Some(500));

    let err = h.workflow.submit("admin", "secret").await.unwrap_err();

    match err {
        SessionError::PostAuth { stage, source } => {
            assert_eq!(stage, PostAuthStage::UserFetch);
            assert_eq!(source.status, 500);
        }
        other => panic!("expected post-auth error, got {other:?}"),
    }
    assert_eq!(logout_calls(&h), 1);
    assert!(h.workflow.context().await.is_none());
    assert!(matches!(
        h.workflow.state().await,
        WorkflowState::Failed {
            stage: PostAuthStage::UserFetch,
            ..
        }
    ));
    assert!(!h.workflow.timer().is_running());
    assert_eq!(AuthProbe::count(&h.license.config_calls), 0);

    let alerts = h.ui.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].title, "Error");
    assert_eq!(alerts[0].severity, Severity::Danger);
    assert_eq!(
        alerts[0].message,
        "Failed to access user information. GET returned status: 500"
    );

    // The alert shows first; the redirect follows after the delay.
    assert!(h.ui.navigations().is_empty());
    assert!(h.workflow.redirect_pending());
    tokio::time::sleep(LOGOUT_REDIRECT_DELAY + Duration::from_millis(100)).await;
    assert_eq!(h.ui.navigations(), vec!["/logout".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_license_failure_logs_out_and_stops_timer() {
    let h = harness();
    *h.license.failure.lock().unwrap() = Some(403);

    let err = h.workflow.submit("admin", "secret").await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::PostAuth {
            stage: PostAuthStage::LicenseFetch,
            ..
        }
    ));
    assert_eq!(logout_calls(&h), 1);
    assert_eq!(AuthProbe::count(&h.license.test_calls), 0);
    assert!(h.workflow.context().await.is_none());
    assert!(!h.workflow.timer().is_running());
    assert!(!h.ui.events().contains(&UiEvent::Licensed));
    assert_eq!(
        h.ui.alerts()[0].message,
        "Failed to access license information. GET returned status: 403"
    );

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.ui.navigations(), vec!["/logout".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_post_auth_failure_still_redirects_when_logout_fails() {
    let h = harness();
    h.auth.fail_user_fetch(Some(500));
    h.auth.fail_logout(503);

    h.workflow.submit("admin", "secret").await.unwrap_err();

    assert_eq!(logout_calls(&h), 1);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.ui.navigations(), vec!["/logout".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_new_submit_cancels_pending_redirect() {
    let h = harness();
    h.auth.fail_user_fetch(Some(500));
    h.workflow.submit("admin", "secret").await.unwrap_err();
    assert!(h.workflow.redirect_pending());

    h.auth.fail_user_fetch(None);
    h.workflow.submit("admin", "secret").await.unwrap();
    assert!(!h.workflow.redirect_pending());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.ui.navigations(), vec!["/home".to_string()]);
    assert!(h.workflow.is_authenticated().await);
}

// =========================================================================
// Logout
// =========================================================================

#[tokio::test]
async fn test_logout_clears_session() {
    let h = harness();
    h.workflow.submit("admin", "secret").await.unwrap();

    h.workflow.logout().await.unwrap();

    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
    assert!(h.workflow.context().await.is_none());
    assert!(!h.workflow.timer().is_running());
    assert_eq!(logout_calls(&h), 1);
}

#[tokio::test]
async fn test_logout_without_session_is_rejected() {
    let h = harness();

    let err = h.workflow.logout().await.unwrap_err();

    assert!(matches!(err, SessionError::NotAuthenticated));
    assert_eq!(logout_calls(&h), 0);
}

#[tokio::test]
async fn test_logout_server_failure_still_clears_session() {
    let h = harness();
    h.workflow.submit("admin", "secret").await.unwrap();
    h.auth.fail_logout(503);

    let err = h.workflow.logout().await.unwrap_err();

    assert!(matches!(err, SessionError::LogoutFailed(ref e) if e.status == 503));
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
    assert!(h.workflow.context().await.is_none());
}

#[tokio::test]
async fn test_logout_during_login_cancels_attempt() {
    let h = harness();
    let gate = h.auth.hold_token_requests();

    let (login, logout) = tokio::join!(h.workflow.submit("admin", "secret"), async {
        let result = h.workflow.logout().await;
        gate.notify_one();
        result
    });

    assert!(logout.is_ok());
    assert!(matches!(login, Err(SessionError::Cancelled)));
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
    assert!(h.workflow.context().await.is_none());
    assert_eq!(AuthProbe::count(&h.auth.get_user_calls), 0);
    assert!(h.ui.navigations().is_empty());
    assert_eq!(h.ui.events().last(), Some(&UiEvent::BusyStop));
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_failing_user_fetch_logs_out_once() {
    let h = harness();
    h.auth.fail_user_fetch(Some(500));
    let gate = h.auth.hold_user_requests();

    let (login, logout) = tokio::join!(h.workflow.submit("admin", "secret"), async {
        let result = h.workflow.logout().await;
        gate.notify_one();
        result
    });

    assert!(logout.is_ok());
    assert!(matches!(login, Err(SessionError::Cancelled)));
    assert_eq!(logout_calls(&h), 1);
    assert!(h.ui.alerts().is_empty());
    assert!(!h.workflow.redirect_pending());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.ui.navigations().is_empty());
    assert_eq!(h.workflow.state().await, WorkflowState::Idle);
}

#[tokio::test]
async fn test_relogin_after_logout_starts_timer_once_per_session() {
    let h = harness();
    let first = h.workflow.submit("admin", "secret").await.unwrap();
    h.workflow.logout().await.unwrap();

    h.auth.login_as(UserProfile::new(UserId(8), "auditor"));
    let second = h.workflow.submit("auditor", "secret").await.unwrap();

    assert_ne!(first.generation, second.generation);
    assert_eq!(second.user_id, UserId(8));
    let metrics = h.workflow.timer().metrics();
    assert_eq!(metrics.starts, 2);
    assert_eq!(metrics.duplicate_starts, 0);
    assert_eq!(
        h.workflow.timer().current().map(|t| t.generation()),
        Some(second.generation)
    );
}

// =========================================================================
// Idle expiry and activity
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_watch_expiry_moves_session_to_expired() {
    let h = harness_with(short_timeout(60), NavigationIntent::default());
    let success = h.workflow.submit("admin", "secret").await.unwrap();
    h.ui.clear();

    let expiry = tokio::time::timeout(Duration::from_secs(120), h.workflow.watch_expiry())
        .await
        .expect("session should expire");

    assert_eq!(expiry.generation, success.generation);
    assert_eq!(h.workflow.state().await, WorkflowState::Expired);
    assert!(h.workflow.context().await.is_none());
    // Expiry is silent; the application decides where to go.
    assert!(h.ui.events().is_empty());
    assert!(matches!(
        h.workflow.record_activity().await,
        Err(SessionError::SessionExpired)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_submit_after_expiry_starts_new_session() {
    let h = harness_with(short_timeout(60), NavigationIntent::default());
    let first = h.workflow.submit("admin", "secret").await.unwrap();
    h.workflow.watch_expiry().await;

    let second = h.workflow.submit("admin", "secret").await.unwrap();

    assert!(second.generation > first.generation);
    assert!(h.workflow.is_authenticated().await);
    assert!(h.workflow.timer().is_running());
}

#[tokio::test(start_paused = true)]
async fn test_slow_license_check_past_idle_timeout_expires_session() {
    let h = harness_with(short_timeout(1), NavigationIntent::default());
    *h.license.delay.lock().unwrap() = Some(Duration::from_secs(3));

    // The watcher sees the timer fire mid-login and drops it as in-flight.
    let (login, watched) = tokio::join!(
        h.workflow.submit("admin", "secret"),
        tokio::time::timeout(Duration::from_secs(60), h.workflow.watch_expiry()),
    );

    assert!(matches!(login, Err(SessionError::SessionExpired)));
    assert!(watched.is_err());
    assert_eq!(h.workflow.state().await, WorkflowState::Expired);
    assert!(h.workflow.context().await.is_none());
    assert!(h.ui.navigations().is_empty());
    assert!(!h.ui.events().contains(&UiEvent::Licensed));
    assert_eq!(h.ui.events().last(), Some(&UiEvent::BusyStop));
    assert!(matches!(
        h.workflow.record_activity().await,
        Err(SessionError::SessionExpired)
    ));

    *h.license.delay.lock().unwrap() = None;
    h.workflow.submit("admin", "secret").await.unwrap();
    assert!(h.workflow.is_authenticated().await);
}

#[tokio::test(start_paused = true)]
async fn test_slow_license_check_without_watcher_expires_on_activity() {
    let h = harness_with(short_timeout(1), NavigationIntent::default());
    *h.license.delay.lock().unwrap() = Some(Duration::from_secs(3));

    h.workflow.submit("admin", "secret").await.unwrap();
    let err = h.workflow.record_activity().await.unwrap_err();

    assert!(matches!(err, SessionError::SessionExpired));
    assert_eq!(h.workflow.state().await, WorkflowState::Expired);
    assert!(h.workflow.context().await.is_none());
}

#[tokio::test]
async fn test_stale_expiry_is_ignored() {
    let h = harness();
    let first = h.workflow.submit("admin", "secret").await.unwrap();
    h.workflow.logout().await.unwrap();
    h.workflow.submit("admin", "secret").await.unwrap();

    let applied = h
        .workflow
        .handle_timer_expired(TimerExpiry {
            generation: first.generation,
            idle_for: Duration::from_secs(1800),
        })
        .await;

    assert!(!applied);
    assert!(h.workflow.is_authenticated().await);
}

#[tokio::test(start_paused = true)]
async fn test_record_activity_extends_session() {
    let h = harness_with(short_timeout(60), NavigationIntent::default());
    h.workflow.submit("admin", "secret").await.unwrap();

    tokio::time::sleep(Duration::from_secs(50)).await;
    h.workflow.record_activity().await.unwrap();
    tokio::time::sleep(Duration::from_secs(50)).await;
    h.workflow.record_activity().await.unwrap();

    assert!(h.workflow.is_authenticated().await);
    assert_eq!(h.workflow.timer().metrics().touches, 2);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let err = h.workflow.record_activity().await.unwrap_err();

    assert!(matches!(err, SessionError::SessionExpired));
    assert_eq!(h.workflow.state().await, WorkflowState::Expired);
}

#[tokio::test]
async fn test_record_activity_without_session_is_rejected() {
    let h = harness();

    let err = h.workflow.record_activity().await.unwrap_err();

    assert!(matches!(err, SessionError::NotAuthenticated));
}

#[tokio::test]
async fn test_last_session_expired_reads_store() {
    let h = harness();
    assert!(!h.workflow.last_session_expired());

    h.store.set_session_expired(true);

    assert!(h.workflow.last_session_expired());
}
