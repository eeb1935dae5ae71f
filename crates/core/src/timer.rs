//! Countdown state for timed sessions.
//!
//! This is pure state: something else decides when a tick happens. One tick
//! is one second.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Snapshot of a countdown. All values are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub total: u32,
    pub remaining: u32,
    pub elapsed: u32,
    pub paused: bool,
    pub active: bool,
    pub fired_warnings: BTreeSet<u32>,
}

/// What a single tick produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Thresholds crossed by this tick, largest first.
    pub warnings: Vec<u32>,
    /// True only on the tick that brought `remaining` to zero.
    pub expired: bool,
}

/// Countdown with one-shot remaining-time warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTimer {
    state: TimerState,
    thresholds: Vec<u32>,
}

impl CountdownTimer {
    /// `thresholds` are remaining-time values in ascending order.
    #[must_use]
    pub fn new(total_secs: u32, thresholds: &[u32]) -> Self {
        Self {
            state: TimerState {
                total: total_secs,
                remaining: total_secs,
                elapsed: 0,
                paused: false,
                active: false,
                fired_warnings: BTreeSet::new(),
            },
            thresholds: thresholds.to_vec(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &TimerState {
        &self.state
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.state.remaining
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.state.remaining == 0
    }

    /// True while ticks should be delivered.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.active && !self.state.paused && self.state.remaining > 0
    }

    pub fn start(&mut self) {
        self.state.active = true;
        self.state.paused = false;
    }

    /// Freezes the countdown. Returns false if it was not running.
    pub fn pause(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.state.paused = true;
        true
    }

    /// Continues from the frozen remaining time. Returns false if not paused.
    pub fn resume(&mut self) -> bool {
        if !(self.state.active && self.state.paused) {
            return false;
        }
        self.state.paused = false;
        true
    }

    pub fn stop(&mut self) {
        self.state.active = false;
        self.state.paused = false;
    }

    /// Back to full time, inactive, no warnings fired.
    pub fn reset(&mut self) {
        *self = Self::new(self.state.total, &self.thresholds);
    }

    /// Advances the countdown by one second.
    ///
    /// A tick on a timer that is not running changes nothing.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::default();
        }

        let previous = self.state.remaining;
        self.state.remaining -= 1;
        self.state.elapsed = self.state.total - self.state.remaining;

        // Only thresholds this tick stepped across; ones at or above the
        // starting time are never crossed.
        let remaining = self.state.remaining;
        let mut warnings = Vec::new();
        for &threshold in self.thresholds.iter().rev() {
            let crossed = previous > threshold && threshold >= remaining;
            if crossed && self.state.fired_warnings.insert(threshold) {
                warnings.push(threshold);
            }
        }

        TickOutcome {
            warnings,
            expired: remaining == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(total: u32, thresholds: &[u32]) -> CountdownTimer {
        let mut timer = CountdownTimer::new(total, thresholds);
        timer.start();
        timer
    }

    #[test]
    fn tick_decrements_and_tracks_elapsed() {
        let mut timer = running(10, &[]);
        timer.tick();
        timer.tick();
        assert_eq!(timer.state().remaining, 8);
        assert_eq!(timer.state().elapsed, 2);
    }

    #[test]
    fn inactive_timer_does_not_tick() {
        let mut timer = CountdownTimer::new(10, &[]);
        assert_eq!(timer.tick(), TickOutcome::default());
        assert_eq!(timer.remaining(), 10);
    }

    #[test]
    fn warnings_fire_once_each() {
        let mut timer = running(6, &[2, 4]);
        let mut fired = Vec::new();
        for _ in 0..6 {
            fired.extend(timer.tick().warnings);
        }
        assert_eq!(fired, vec![4, 2]);
        assert_eq!(timer.state().fired_warnings.len(), 2);
    }

    #[test]
    fn warnings_do_not_refire_after_pause_and_resume() {
        let mut timer = running(5, &[4]);
        assert_eq!(timer.tick().warnings, vec![4]);
        assert!(timer.pause());
        assert!(timer.resume());
        let later: Vec<u32> = (0..4).flat_map(|_| timer.tick().warnings).collect();
        assert!(later.is_empty());
    }

    #[test]
    fn thresholds_at_or_above_the_limit_never_fire() {
        let mut timer = running(60, &[30, 60, 300]);
        let fired: Vec<u32> = (0..60).flat_map(|_| timer.tick().warnings).collect();
        assert_eq!(fired, vec![30]);
        assert!(!timer.state().fired_warnings.contains(&300));
    }

    #[test]
    fn pause_freezes_remaining() {
        let mut timer = running(5, &[]);
        timer.tick();
        assert!(timer.pause());
        assert!(!timer.pause());
        timer.tick();
        assert_eq!(timer.remaining(), 4);
        assert!(timer.resume());
        timer.tick();
        assert_eq!(timer.remaining(), 3);
    }

    #[test]
    fn expiry_is_reported_once() {
        let mut timer = running(2, &[]);
        assert!(!timer.tick().expired);
        assert!(timer.tick().expired);
        assert!(!timer.is_running());
        assert!(!timer.tick().expired);
        assert_eq!(timer.remaining(), 0);
    }

    #[test]
    fn reset_restores_full_time() {
        let mut timer = running(3, &[2]);
        timer.tick();
        timer.tick();
        timer.reset();
        assert_eq!(timer.remaining(), 3);
        assert!(!timer.state().active);
        assert!(timer.state().fired_warnings.is_empty());
    }
}
