//! Post-login navigation: what the previous session left behind, and
//! where a fresh login should land.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Navigation state carried over from before the login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationIntent {
    /// The protected URL that redirected the user to the login page.
    pub pre_auth_url: Option<String>,
    /// The last path visited in the previous session.
    pub last_path: Option<String>,
    /// Whose session `last_path` belongs to.
    pub last_user_id: Option<UserId>,
}

/// Persisted navigation state (cookies, local storage, ...).
///
/// Written by the application's routing layer. The workflow reads it once
/// per login and only ever clears the pre-auth URL after consuming it.
pub trait NavigationStore: Send + Sync {
    /// Reads the current intent.
    fn load(&self) -> NavigationIntent;

    /// Forgets the pre-auth URL once it has been used.
    fn clear_pre_auth_url(&self);

    /// Whether the previous session ended by expiring.
    fn session_expired(&self) -> bool {
        false
    }
}

/// A [`NavigationStore`] kept in memory.
#[derive(Debug, Default)]
pub struct MemoryNavigationStore {
    state: Mutex<(NavigationIntent, bool)>,
}

impl MemoryNavigationStore {
    pub fn new(intent: NavigationIntent) -> Self {
        Self {
            state: Mutex::new((intent, false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, (NavigationIntent, bool)> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_pre_auth_url(&self, url: impl Into<String>) {
        self.lock().0.pre_auth_url = Some(url.into());
    }

    /// Records the path a user was on, as the routing layer would.
    pub fn record_last_path(&self, path: impl Into<String>, user: UserId) {
        let mut state = self.lock();
        state.0.last_path = Some(path.into());
        state.0.last_user_id = Some(user);
    }

    pub fn set_session_expired(&self, expired: bool) {
        self.lock().1 = expired;
    }

    pub fn snapshot(&self) -> NavigationIntent {
        self.lock().0.clone()
    }
}

impl NavigationStore for MemoryNavigationStore {
    fn load(&self) -> NavigationIntent {
        self.snapshot()
    }

    fn clear_pre_auth_url(&self) {
        self.lock().0.pre_auth_url = None;
    }

    fn session_expired(&self) -> bool {
        self.lock().1
    }
}

// ---------------------------------------------------------------------------
// Destination resolution
// ---------------------------------------------------------------------------

/// Where a successful login navigates to, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Back to the deep link that triggered the login.
    PreAuthUrl(String),
    /// Back to where this same user left off.
    LastPath(String),
    /// The default landing route.
    Landing(String),
}

impl Destination {
    pub fn path(&self) -> &str {
        match self {
            Self::PreAuthUrl(p) | Self::LastPath(p) | Self::Landing(p) => p,
        }
    }

    /// Whether the pre-auth URL was consumed and must be cleared.
    pub fn consumes_pre_auth_url(&self) -> bool {
        matches!(self, Self::PreAuthUrl(_))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Picks the post-login destination for `user`.
///
/// 1. A non-empty pre-auth URL wins.
/// 2. Otherwise the last path, but only if it belongs to `user`.
/// 3. Otherwise the landing route.
pub fn resolve_destination(
    intent: NavigationIntent,
    user: UserId,
    landing_route: &str,
) -> Destination {
    if let Some(url) = non_empty(intent.pre_auth_url) {
        return Destination::PreAuthUrl(url);
    }
    match (non_empty(intent.last_path), intent.last_user_id) {
        (Some(path), Some(last_user)) if last_user == user => Destination::LastPath(path),
        _ => Destination::Landing(landing_route.to_string()),
    }
}
