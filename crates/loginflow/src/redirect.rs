//! Delayed forced navigation to the logout route.
//!
//! After a post-auth failure the alert has to be visible before the page
//! changes, so the redirect runs on a short fixed delay. The delay is a
//! spawned task that any newer login cycle can cancel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use loginflow_session::Navigator;
use loginflow_timer::SessionGeneration;
use tokio::task::JoinHandle;

/// How long a post-auth failure waits before navigating to the logout route.
pub const LOGOUT_REDIRECT_DELAY: Duration = Duration::from_secs(1);

/// Owns at most one pending redirect.
///
/// Every [`cancel`](Self::cancel) bumps an epoch; a redirect task only
/// navigates if the epoch it was scheduled under is still current when its
/// delay runs out, so a cancel that races the timer still wins.
pub(crate) struct RedirectScheduler {
    epoch: Arc<AtomicU64>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl RedirectScheduler {
    pub(crate) fn new() -> Self {
        Self {
            epoch: Arc::new(AtomicU64::new(0)),
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules navigation to `path` after [`LOGOUT_REDIRECT_DELAY`],
    /// replacing any redirect already pending.
    pub(crate) fn schedule(
        &self,
        generation: SessionGeneration,
        navigator: Arc<dyn Navigator>,
        path: String,
    ) {
        self.cancel();
        let scheduled_epoch = self.epoch.load(Ordering::SeqCst);
        let epoch = Arc::clone(&self.epoch);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(LOGOUT_REDIRECT_DELAY).await;
            if epoch.load(Ordering::SeqCst) != scheduled_epoch {
                return;
            }
            tracing::info!(%generation, path, "forced redirect after login failure");
            navigator.navigate(&path);
        });

        tracing::debug!(
            %generation,
            delay = ?LOGOUT_REDIRECT_DELAY,
            "logout redirect scheduled"
        );
        *self.pending() = Some(handle);
    }

    /// Cancels the pending redirect, if any. Returns `true` if one was
    /// still waiting.
    pub(crate) fn cancel(&self) -> bool {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let Some(handle) = self.pending().take() else {
            return false;
        };
        if handle.is_finished() {
            return false;
        }
        handle.abort();
        tracing::debug!("pending logout redirect cancelled");
        true
    }

    /// Whether a redirect is scheduled and has not run yet.
    pub(crate) fn is_pending(&self) -> bool {
        self.pending().as_ref().is_some_and(|h| !h.is_finished())
    }
}
