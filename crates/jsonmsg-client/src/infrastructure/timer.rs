//! One-shot cancellable timers that report into the engine's event queue.
//!
//! # How it works
//!
//! [`TimerScheduler::schedule`] computes an absolute deadline, spawns a tiny
//! task that sleeps until that deadline and then pushes a
//! [`TimerFired`] event carrying a unique token.  It returns a [`TimerGuard`]
//! that owns the task.
//!
//! Cancelling (or dropping) the guard aborts the task.  A fire that was
//! already queued before cancellation still reaches the engine, so the engine
//! asks the live guard [`matches`](TimerGuard::matches) before acting on it.
//! Tokens are never reused, which makes a queued fire from an old guard a
//! no-op even if a new guard of the same kind has been armed since.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

use crate::domain::events::{EngineEvent, TimerFired, TimerKind};

/// Deadline used when `now + after` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Creates timers that deliver into one engine queue.
#[derive(Debug)]
pub struct TimerScheduler {
    events: UnboundedSender<EngineEvent>,
    next_token: u64,
}

impl TimerScheduler {
    pub fn new(events: UnboundedSender<EngineEvent>) -> Self {
        Self {
            events,
            next_token: 1,
        }
    }

    /// Arms a one-shot timer of `kind` that fires after `after`.
    ///
    /// Durations too large to represent are clamped to about thirty years.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&mut self, kind: TimerKind, after: Duration) -> TimerGuard {
        let token = self.next_token;
        self.next_token += 1;

        let now = Instant::now();
        let deadline = now
            .checked_add(after)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            sleep_until(deadline).await;
            trace!("timer {token} ({kind:?}) fired");
            // The engine may already be gone; nothing to do then.
            let _ = events.send(EngineEvent::Timer(TimerFired { kind, token }));
        });

        TimerGuard {
            kind,
            token,
            handle: Some(handle),
        }
    }
}

/// Owning handle for one scheduled timer.  Dropping it cancels the timer.
#[derive(Debug)]
pub struct TimerGuard {
    kind: TimerKind,
    token: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerGuard {
    /// Stops the timer.  Idempotent, and harmless after the timer fired.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_none()
    }

    /// Returns `true` if `fired` was produced by this guard and the guard has
    /// not been cancelled.
    pub fn matches(&self, fired: &TimerFired) -> bool {
        !self.is_cancelled() && fired.token == self.token && fired.kind == self.kind
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
