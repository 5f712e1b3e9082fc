//! Keepalive liveness monitor.
//!
//! The monitor keeps one timer armed for the keepalive interval while the
//! session is `Connected`, plus a liveness flag:
//!
//! - Any inbound frame calls [`reset`](KeepAliveMonitor::reset): the flag is
//!   set and the timer restarts from now.
//! - When the timer fires with the flag set, the server has been heard from
//!   since the last check, so the engine sends a `Ping`, the flag is cleared
//!   and the timer restarts.
//! - When the timer fires with the flag clear, a whole interval passed after
//!   the last probe without a single inbound frame: the session is dead.
//!
//! With an interval of `I` seconds and a silent server this gives a `Ping` at
//! `I` and `PING_TIMEOUT` at `2I` after the last inbound frame.  An interval of
//! 0 disables the monitor entirely.

use std::time::Duration;

use tracing::debug;

use crate::domain::events::{TimerFired, TimerKind};
use crate::infrastructure::timer::{TimerGuard, TimerScheduler};

/// What the engine should do about a keepalive timer fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveVerdict {
    /// The fire came from a cancelled or replaced timer; ignore it.
    Stale,
    /// Traffic was seen; send a `Ping` probe.  The timer is already re-armed.
    SendPing,
    /// No traffic for a full interval after the last probe.
    Expired,
}

#[derive(Debug)]
pub struct KeepAliveMonitor {
    interval: Option<Duration>,
    alive: bool,
    timer: Option<TimerGuard>,
}

impl KeepAliveMonitor {
    /// Creates a disarmed monitor.  `interval_secs == 0` disables it.
    pub fn new(interval_secs: u32) -> Self {
        Self {
            interval: (interval_secs > 0).then(|| Duration::from_secs(u64::from(interval_secs))),
            alive: false,
            timer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Starts monitoring with the liveness flag clear.
    pub fn arm(&mut self, timers: &mut TimerScheduler) {
        self.alive = false;
        self.restart(timers);
    }

    /// Records inbound traffic and restarts the interval.  No-op while
    /// disarmed.
    pub fn reset(&mut self, timers: &mut TimerScheduler) {
        if self.timer.is_none() {
            return;
        }
        self.alive = true;
        self.restart(timers);
    }

    /// Classifies a keepalive timer fire.
    pub fn on_fire(&mut self, fired: &TimerFired, timers: &mut TimerScheduler) -> KeepAliveVerdict {
        if !self.timer.as_ref().is_some_and(|t| t.matches(fired)) {
            return KeepAliveVerdict::Stale;
        }
        if self.alive {
            self.alive = false;
            self.restart(timers);
            KeepAliveVerdict::SendPing
        } else {
            debug!("keepalive expired");
            self.timer = None;
            KeepAliveVerdict::Expired
        }
    }

    /// Stops monitoring.  Idempotent.
    pub fn cancel(&mut self) {
        self.timer = None;
        self.alive = false;
    }

    fn restart(&mut self, timers: &mut TimerScheduler) {
        if let Some(interval) = self.interval {
            // Dropping the old guard cancels it.
            self.timer = Some(timers.schedule(TimerKind::KeepAlive, interval));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
