//! Session types: who is logged in, with which token, and where the
//! workflow currently is.

use std::fmt;
use std::time::SystemTime;

use loginflow_timer::{SessionGeneration, TimerHandle};
use serde::{Deserialize, Serialize};

use crate::PostAuthStage;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A user's numeric id, as reported by the user endpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// The authenticated user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_system_auditor: bool,
}

impl UserProfile {
    /// A regular user with no elevated flags.
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_superuser: false,
            is_system_auditor: false,
        }
    }
}

/// A token as returned by the token exchange.
///
/// `Debug` never prints the token value.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub token: String,
    pub expires: SystemTime,
}

impl TokenGrant {
    pub fn new(token: impl Into<String>, expires: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires,
        }
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("token", &"<redacted>")
            .field("expires", &self.expires)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// The authenticated session.
///
/// Created the moment a token is acquired and filled in as later stages
/// complete: user fields after the user fetch, the timer handle right
/// after. Only the workflow engine creates or mutates one; callers get
/// clones.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionContext {
    generation: SessionGeneration,
    token: String,
    token_expiry: SystemTime,
    user_id: Option<UserId>,
    is_superuser: bool,
    is_system_auditor: bool,
    timer: Option<TimerHandle>,
}

impl SessionContext {
    /// A fresh context for the token acquired in `generation`.
    pub fn from_grant(generation: SessionGeneration, grant: TokenGrant) -> Self {
        Self {
            generation,
            token: grant.token,
            token_expiry: grant.expires,
            user_id: None,
            is_superuser: false,
            is_system_auditor: false,
            timer: None,
        }
    }

    /// Records the fetched user.
    pub fn set_user(&mut self, profile: &UserProfile) {
        self.user_id = Some(profile.id);
        self.is_superuser = profile.is_superuser;
        self.is_system_auditor = profile.is_system_auditor;
    }

    /// Records the running session timer.
    pub fn set_timer(&mut self, handle: TimerHandle) {
        self.timer = Some(handle);
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_expiry(&self) -> SystemTime {
        self.token_expiry
    }

    /// `None` until the user fetch completes.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn is_superuser(&self) -> bool {
        self.is_superuser
    }

    pub fn is_system_auditor(&self) -> bool {
        self.is_system_auditor
    }

    /// `None` until the timer starts.
    pub fn timer(&self) -> Option<TimerHandle> {
        self.timer
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("generation", &self.generation)
            .field("token", &"<redacted>")
            .field("token_expiry", &self.token_expiry)
            .field("user_id", &self.user_id)
            .field("is_superuser", &self.is_superuser)
            .field("is_system_auditor", &self.is_system_auditor)
            .field("timer", &self.timer)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

/// Where the login workflow currently is.
///
/// ```text
///   Idle ──submit──→ Submitting ──→ TokenAcquired ──→ FetchingUser
///     ↑                  │                                 │
///     └─(bad creds)──────┘                                 ▼
///                                FetchingLicense ←── UserReady
///                                      │
///                                      ▼
///                               Authenticated ──(idle)──→ Expired
///
///   Failed { stage, reason } ← any post-token stage
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    Idle,
    Submitting,
    TokenAcquired,
    FetchingUser,
    UserReady,
    FetchingLicense,
    Authenticated,
    Failed {
        stage: PostAuthStage,
        reason: String,
    },
    Expired,
}

impl WorkflowState {
    /// Returns `true` while a login attempt is between submit and outcome.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            Self::Submitting
                | Self::TokenAcquired
                | Self::FetchingUser
                | Self::UserReady
                | Self::FetchingLicense
        )
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Returns `true` if a new login may start from this state.
    pub fn accepts_submit(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed { .. } | Self::Expired)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Submitting => write!(f, "Submitting"),
            Self::TokenAcquired => write!(f, "TokenAcquired"),
            Self::FetchingUser => write!(f, "FetchingUser"),
            Self::UserReady => write!(f, "UserReady"),
            Self::FetchingLicense => write!(f, "FetchingLicense"),
            Self::Authenticated => write!(f, "Authenticated"),
            Self::Failed { stage, .. } => write!(f, "Failed({stage})"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}
