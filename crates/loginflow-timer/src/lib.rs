//! Client-side idle session timer for loginflow.
//!
//! The server keeps its own session clock; this timer is the client's
//! view of it. Every successful login arms the timer for one
//! [`SessionGeneration`]. Activity pushes the deadline forward, and once
//! the idle timeout passes without activity the timer reports a single
//! [`TimerExpiry`] for that generation.
//!
//! # Integration
//!
//! [`SessionTimer::wait_for_expiry`] pends while the timer is stopped, so
//! it can sit inside a `tokio::select!` loop next to other event sources:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(event) = ui_rx.recv() => { /* handle UI events */ }
//!         expiry = timer.wait_for_expiry() => {
//!             workflow.handle_timer_expired(expiry).await;
//!         }
//!     }
//! }
//! ```

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

// ---------------------------------------------------------------------------
// Generations
// ---------------------------------------------------------------------------

/// Identifies one login cycle.
///
/// Every accepted login attempt gets a fresh generation. Anything scheduled
/// on behalf of an older generation (a timer, a delayed redirect) is stale
/// once a newer one exists.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionGeneration(pub u64);

impl SessionGeneration {
    /// The generation that follows this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the session timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Seconds of inactivity before the session is considered expired.
    pub idle_timeout_secs: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1_800,
        }
    }
}

impl TimerConfig {
    /// Shortest accepted idle timeout.
    pub const MIN_IDLE_TIMEOUT_SECS: u64 = 1;
    /// Longest accepted idle timeout (one day).
    pub const MAX_IDLE_TIMEOUT_SECS: u64 = 86_400;

    /// Create a config with the given idle timeout.
    pub fn with_timeout(idle_timeout_secs: u64) -> Self {
        Self { idle_timeout_secs }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`SessionTimer::new`].
    pub fn validated(mut self) -> Self {
        let clamped = self
            .idle_timeout_secs
            .clamp(Self::MIN_IDLE_TIMEOUT_SECS, Self::MAX_IDLE_TIMEOUT_SECS);
        if clamped != self.idle_timeout_secs {
            warn!(
                requested = self.idle_timeout_secs,
                clamped, "idle_timeout_secs out of range, clamping"
            );
            self.idle_timeout_secs = clamped;
        }
        self
    }

    /// The idle timeout as a [`Duration`].
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Handles and signals
// ---------------------------------------------------------------------------

/// Returned by [`SessionTimer::start`]. Starting twice for the same
/// generation returns the same handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle {
    generation: SessionGeneration,
    started_at: Instant,
}

impl TimerHandle {
    /// The login cycle this timer belongs to.
    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    /// When the timer was armed.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

/// The expiry signal. Emitted at most once per generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerExpiry {
    /// Generation whose session went idle.
    pub generation: SessionGeneration,
    /// Time since the last recorded activity.
    pub idle_for: Duration,
}

/// Snapshot of the timer's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerStatus {
    /// Not armed (no session, or stopped on logout).
    Stopped,
    /// Armed; `remaining` until the idle deadline.
    Running { remaining: Duration },
    /// The idle deadline passed.
    Expired,
}

/// Counters for timer activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerMetrics {
    /// Times the timer was armed for a new generation.
    pub starts: u64,
    /// `start` calls ignored because the generation was already armed.
    pub duplicate_starts: u64,
    /// Deadline extensions from recorded activity.
    pub touches: u64,
    /// Expiry signals emitted.
    pub expirations: u64,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

struct Armed {
    handle: TimerHandle,
    deadline: Instant,
    last_activity: Instant,
    expired: bool,
}

impl Armed {
    fn fire(&mut self, now: Instant, metrics: &mut TimerMetrics) -> TimerExpiry {
        self.expired = true;
        metrics.expirations += 1;
        let expiry = TimerExpiry {
            generation: self.handle.generation,
            idle_for: now.saturating_duration_since(self.last_activity),
        };
        info!(
            generation = %expiry.generation,
            idle_secs = expiry.idle_for.as_secs(),
            "session timer expired"
        );
        expiry
    }
}

#[derive(Default)]
struct TimerState {
    armed: Option<Armed>,
    metrics: TimerMetrics,
}

/// Idle-timeout tracker for the authenticated session.
///
/// Interior state sits behind a short-lived lock that is never held across
/// an await, so the timer can be shared by reference with whatever drives
/// [`wait_for_expiry`](Self::wait_for_expiry).
pub struct SessionTimer {
    config: TimerConfig,
    state: Mutex<TimerState>,
    changed: Notify,
}

impl SessionTimer {
    /// Create a stopped timer.
    pub fn new(config: TimerConfig) -> Self {
        let config = config.validated();
        debug!(
            idle_timeout_secs = config.idle_timeout_secs,
            "session timer created"
        );
        Self {
            config,
            state: Mutex::new(TimerState::default()),
            changed: Notify::new(),
        }
    }

    /// Create a stopped timer with the given idle timeout.
    pub fn with_timeout(idle_timeout_secs: u64) -> Self {
        Self::new(TimerConfig::with_timeout(idle_timeout_secs))
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the timer for `generation`.
    ///
    /// Idempotent per generation: a second call for the generation that is
    /// already armed returns the existing handle and leaves the deadline
    /// alone. A different generation replaces whatever was armed before.
    pub fn start(&self, generation: SessionGeneration) -> TimerHandle {
        let handle = {
            let mut state = self.lock();
            if let Some(armed) = &state.armed {
                if armed.handle.generation == generation {
                    let handle = armed.handle;
                    state.metrics.duplicate_starts += 1;
                    debug!(%generation, "session timer already running");
                    return handle;
                }
            }

            let now = Instant::now();
            let handle = TimerHandle {
                generation,
                started_at: now,
            };
            if let Some(previous) = state.armed.replace(Armed {
                handle,
                deadline: now + self.config.idle_timeout(),
                last_activity: now,
                expired: false,
            }) {
                debug!(
                    previous = %previous.handle.generation,
                    %generation,
                    "session timer replaced"
                );
            }
            state.metrics.starts += 1;
            handle
        };

        debug!(
            %generation,
            idle_timeout_secs = self.config.idle_timeout_secs,
            "session timer started"
        );
        self.changed.notify_waiters();
        handle
    }

    /// Record activity.
    ///
    /// If the timer is running and its deadline has not passed, the
    /// deadline moves to `now + idle_timeout`. If the deadline already
    /// passed, the timer expires here and the expiry is not reported again
    /// by [`wait_for_expiry`](Self::wait_for_expiry).
    pub fn touch(&self) -> TimerStatus {
        let mut state = self.lock();
        let TimerState { armed, metrics } = &mut *state;
        let Some(armed) = armed.as_mut() else {
            return TimerStatus::Stopped;
        };
        if armed.expired {
            return TimerStatus::Expired;
        }

        let now = Instant::now();
        if now >= armed.deadline {
            armed.fire(now, metrics);
            return TimerStatus::Expired;
        }

        armed.last_activity = now;
        armed.deadline = now + self.config.idle_timeout();
        metrics.touches += 1;
        trace!(generation = %armed.handle.generation, "session timer extended");
        TimerStatus::Running {
            remaining: self.config.idle_timeout(),
        }
    }

    /// Disarm the timer. Safe to call when already stopped.
    pub fn stop(&self) {
        let previous = self.lock().armed.take();
        if let Some(previous) = previous {
            debug!(generation = %previous.handle.generation, "session timer stopped");
            self.changed.notify_waiters();
        }
    }

    /// Wait for the armed session to go idle.
    ///
    /// Pends while the timer is stopped or already expired, and re-arms
    /// itself when [`start`](Self::start) or [`stop`](Self::stop) changes
    /// the timer underneath it. Resolves at most once per generation.
    pub async fn wait_for_expiry(&self) -> TimerExpiry {
        loop {
            // Registered before the state check so a concurrent start/stop
            // cannot slip between the check and the wait.
            let changed = self.changed.notified();

            let target = {
                let state = self.lock();
                state
                    .armed
                    .as_ref()
                    .filter(|armed| !armed.expired)
                    .map(|armed| (armed.handle.generation, armed.deadline))
            };

            let Some((generation, deadline)) = target else {
                changed.await;
                continue;
            };

            tokio::select! {
                _ = time::sleep_until(deadline) => {}
                _ = changed => continue,
            }

            let fired = {
                let mut state = self.lock();
                let TimerState { armed, metrics } = &mut *state;
                let now = Instant::now();
                match armed.as_mut() {
                    Some(armed)
                        if armed.handle.generation == generation
                            && !armed.expired
                            && now >= armed.deadline =>
                    {
                        Some(armed.fire(now, metrics))
                    }
                    // Touched or replaced while we slept.
                    _ => None,
                }
            };

            if let Some(expiry) = fired {
                return expiry;
            }
        }
    }

    /// Current status.
    pub fn status(&self) -> TimerStatus {
        let state = self.lock();
        match &state.armed {
            None => TimerStatus::Stopped,
            Some(armed) if armed.expired => TimerStatus::Expired,
            Some(armed) => TimerStatus::Running {
                remaining: armed.deadline.saturating_duration_since(Instant::now()),
            },
        }
    }

    /// Handle of the currently armed generation, if any.
    pub fn current(&self) -> Option<TimerHandle> {
        self.lock().armed.as_ref().map(|armed| armed.handle)
    }

    /// Whether the timer is armed and not expired.
    pub fn is_running(&self) -> bool {
        matches!(self.status(), TimerStatus::Running { .. })
    }

    /// Whether the armed generation has expired.
    pub fn is_expired(&self) -> bool {
        matches!(self.status(), TimerStatus::Expired)
    }

    /// Snapshot of the counters.
    pub fn metrics(&self) -> TimerMetrics {
        self.lock().metrics.clone()
    }

    /// The configured idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        self.config.idle_timeout()
    }
}

impl fmt::Debug for SessionTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTimer")
            .field("config", &self.config)
            .field("current", &self.current())
            .finish()
    }
}
