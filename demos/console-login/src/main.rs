use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use loginflow::prelude::*;
use loginflow::session::{FieldErrors, MemoryNavigationStore};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Backend stand-ins
// ---------------------------------------------------------------------------

struct Account {
    username: &'static str,
    password: &'static str,
    /// `None` simulates a user whose record cannot be loaded.
    profile: Option<UserProfile>,
}

/// Authenticates against a fixed account list.
struct DirectoryAuth {
    accounts: Vec<Account>,
    signed_in: Mutex<Option<Option<UserProfile>>>,
}

impl DirectoryAuth {
    fn new() -> Self {
        let mut admin = UserProfile::new(UserId(1), "admin");
        admin.is_superuser = true;
        Self {
            accounts: vec![
                Account { username: "admin", password: "password", profile: Some(admin) },
                Account { username: "ghost", password: "password", profile: None },
            ],
            signed_in: Mutex::new(None),
        }
    }
}

impl Authenticator for DirectoryAuth {
    async fn retrieve_token(&self, username: &str, password: &str) -> Result<TokenGrant, AuthError> {
        if password.len() < 4 {
            return Err(AuthError::Rejected(CredentialRejection::for_fields([(
                "password",
                "Ensure this field has at least 4 characters.",
            )])));
        }
        let Some(account) = self
            .accounts
            .iter()
            .find(|a| a.username == username && a.password == password)
        else {
            return Err(AuthError::Rejected(CredentialRejection::generic(
                "Unable to log in with provided credentials.",
            )));
        };

        *self.signed_in.lock().map_err(|_| HttpError::status(500))? = Some(account.profile.clone());
        Ok(TokenGrant::new(
            format!("token-{username}"),
            SystemTime::now() + Duration::from_secs(1800),
        ))
    }

    fn set_token(&self, expires: SystemTime) {
        tracing::debug!(?expires, "token stored");
    }

    async fn get_user(&self) -> Result<UserProfile, HttpError> {
        let signed_in = self.signed_in.lock().map_err(|_| HttpError::status(500))?;
        match signed_in.as_ref() {
            Some(Some(profile)) => Ok(profile.clone()),
            Some(None) => Err(HttpError::new(500, "user record missing")),
            None => Err(HttpError::new(401, "not signed in")),
        }
    }

    async fn logout(&self) -> Result<(), HttpError> {
        *self.signed_in.lock().map_err(|_| HttpError::status(500))? = None;
        Ok(())
    }
}

/// A license that can be revoked at runtime.
struct SwitchableLicense {
    valid: Arc<AtomicBool>,
}

impl LicenseChecker for SwitchableLicense {
    async fn get_config(&self) -> Result<(), HttpError> {
        if self.valid.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(HttpError::new(402, "license expired"))
        }
    }

    fn test(&self) {
        tracing::debug!("license valid");
    }
}

// ---------------------------------------------------------------------------
// Console UI
// ---------------------------------------------------------------------------

struct ConsoleUi;

impl AlertSink for ConsoleUi {
    fn show(&self, alert: Alert) {
        println!("  [{}] {}: {}", alert.severity, alert.title, alert.message);
    }
}

impl Navigator for ConsoleUi {
    fn navigate(&self, path: &str) {
        println!("  -> {path}");
    }
}

impl LoginForm for ConsoleUi {
    fn reset(&self) {
        println!("  (form cleared)");
    }

    fn show_field_errors(&self, errors: &FieldErrors) {
        for (field, message) in errors {
            println!("  {field}: {message}");
        }
    }
}

fn report(step: &str, result: &Result<LoginSuccess, SessionError>) {
    match result {
        Ok(success) => println!("{step}: logged in as {} ({})", success.user_id, success.generation),
        Err(err) => println!("{step}: {err}"),
    }
}

// ---------------------------------------------------------------------------
// Scripted session
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("LOGINFLOW_CONFIG") {
        Ok(path) => WorkflowConfig::from_json(&std::fs::read_to_string(path)?)?,
        Err(_) => WorkflowConfig {
            timer: TimerConfig::with_timeout(2),
            ..WorkflowConfig::default()
        },
    };

    let ui = Arc::new(ConsoleUi);
    let store = Arc::new(MemoryNavigationStore::default());
    store.set_pre_auth_url("/templates/7");
    let license_valid = Arc::new(AtomicBool::new(true));

    let workflow = SessionWorkflowBuilder::new()
        .config(config)
        .alerts(ui.clone())
        .navigator(ui.clone())
        .form(ui)
        .store(store.clone())
        .build(
            DirectoryAuth::new(),
            SwitchableLicense { valid: Arc::clone(&license_valid) },
        );

    report("empty password", &workflow.submit("admin", "").await);
    report("short password", &workflow.submit("admin", "abc").await);
    report("wrong password", &workflow.submit("admin", "wrong-password").await);

    report("missing user record", &workflow.submit("ghost", "password").await);
    tokio::time::sleep(LOGOUT_REDIRECT_DELAY + Duration::from_millis(100)).await;

    license_valid.store(false, Ordering::SeqCst);
    report("revoked license", &workflow.submit("admin", "password").await);
    license_valid.store(true, Ordering::SeqCst);
    // Logging in again right away cancels the pending logout redirect.
    report("valid login", &workflow.submit("admin", "password").await);

    workflow.record_activity().await?;
    println!("activity recorded, waiting for the session to go idle");
    tokio::select! {
        expiry = workflow.watch_expiry() => {
            println!("session {} expired after {:?}", expiry.generation, expiry.idle_for);
        }
        _ = tokio::time::sleep(workflow.timer().idle_timeout() * 2) => {
            println!("session still active");
        }
    }

    report("login after expiry", &workflow.submit("admin", "password").await);
    workflow.logout().await?;
    println!("logged out, state: {}", workflow.state().await);
    Ok(())
}
