//! Single repeating timer driving the tick loop.
//!
//! There is at most one live timer. Changing the period always cancels the
//! current timer and schedules a new one; a live timer is never retargeted.

use std::time::{Duration, Instant};

use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct RepeatingTimer {
    period: Duration,
    next_fire: Instant,
}

#[derive(Debug, Default)]
pub struct TickScheduler {
    timer: Option<RepeatingTimer>,
}

impl TickScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any live timer and schedule a new one firing every `period`,
    /// first at `now + period`.
    pub fn arm(&mut self, period: Duration, now: Instant) {
        self.disarm();
        self.timer = Some(RepeatingTimer {
            period,
            next_fire: now + period,
        });
    }

    /// Cancel the live timer. Returns whether one was armed.
    pub fn disarm(&mut self) -> bool {
        self.timer.take().is_some()
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        self.timer.map(|timer| timer.period)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.map(|timer| timer.next_fire)
    }

    /// Whether the timer is due at `now`. Fires at most once per call; when
    /// the caller fell a full period or more behind, missed firings are
    /// dropped and the schedule restarts from `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(timer) = self.timer.as_mut() else {
            return false;
        };
        if now < timer.next_fire {
            return false;
        }
        let behind = now.duration_since(timer.next_fire);
        if behind >= timer.period {
            debug!(?behind, period = ?timer.period, "tick loop fell behind; skipping missed ticks");
            timer.next_fire = now + timer.period;
        } else {
            timer.next_fire += timer.period;
        }
        true
    }
}
