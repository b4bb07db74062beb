//! Bout countdown clock.
//!
//! The clock itself is a plain value advanced one second at a time. The live session owns the
//! task that feeds it ticks while it is running.

use std::time::Duration;

use serde::Serialize;
use utoipa::ToSchema;

/// Length of one fencing period in seconds.
pub const PERIOD_SECONDS: u32 = 180;

/// Interval between two ticks of a running clock.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of feeding one tick to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick ignored because the clock is paused or already at zero.
    Suppressed,
    /// One second elapsed and the clock keeps running.
    Elapsed,
    /// One second elapsed and the clock reached zero, pausing itself.
    Expired,
}

/// Remaining time and running flag of the bout clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Countdown {
    /// Seconds left in the period.
    pub remaining_seconds: u32,
    /// Whether the clock is counting down.
    pub running: bool,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(PERIOD_SECONDS)
    }
}

impl Countdown {
    /// Create a paused clock holding `seconds`.
    pub fn new(seconds: u32) -> Self {
        Self {
            remaining_seconds: seconds,
            running: false,
        }
    }

    /// Start or pause the clock. A clock at zero cannot be started.
    ///
    /// Returns whether the clock is running afterwards.
    pub fn toggle(&mut self) -> bool {
        self.running = !self.running && self.remaining_seconds > 0;
        self.running
    }

    /// Pause the clock and put the full period back on it.
    pub fn reset(&mut self) {
        self.remaining_seconds = PERIOD_SECONDS;
        self.running = false;
    }

    /// Pause the clock without touching the remaining time.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Advance by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.running || self.remaining_seconds == 0 {
            return TickOutcome::Suppressed;
        }

        self.remaining_seconds -= 1;
        if self.remaining_seconds == 0 {
            self.running = false;
            TickOutcome::Expired
        } else {
            TickOutcome::Elapsed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_period_runs_down_and_pauses() {
        let mut clock = Countdown::default();
        assert!(clock.toggle());

        for _ in 0..PERIOD_SECONDS - 1 {
            assert_eq!(clock.tick(), TickOutcome::Elapsed);
        }
        assert_eq!(clock.tick(), TickOutcome::Expired);
        assert_eq!(clock.remaining_seconds, 0);
        assert!(!clock.running);
        assert_eq!(clock.tick(), TickOutcome::Suppressed);
    }

    #[test]
    fn paused_clock_does_not_tick() {
        let mut clock = Countdown::default();
        assert_eq!(clock.tick(), TickOutcome::Suppressed);
        assert_eq!(clock.remaining_seconds, PERIOD_SECONDS);

        clock.toggle();
        clock.tick();
        clock.toggle();
        assert_eq!(clock.tick(), TickOutcome::Suppressed);
        assert_eq!(clock.remaining_seconds, PERIOD_SECONDS - 1);
    }

    #[test]
    fn expired_clock_cannot_restart_until_reset() {
        let mut clock = Countdown::new(1);
        clock.toggle();
        assert_eq!(clock.tick(), TickOutcome::Expired);
        assert!(!clock.toggle());

        clock.reset();
        assert_eq!(clock.remaining_seconds, PERIOD_SECONDS);
        assert!(!clock.running);
        assert!(clock.toggle());
    }

    #[test]
    fn reset_pauses_running_clock() {
        let mut clock = Countdown::default();
        clock.toggle();
        clock.tick();
        clock.reset();
        assert_eq!(clock, Countdown::default());
    }
}
