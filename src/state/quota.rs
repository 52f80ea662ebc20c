use std::time::Duration;
use tokio::time::Instant;

/// Request budget for one wall-clock window
///
/// The window starts at the first admission after the previous one expired and
/// lasts `window_duration`. Once `requests_this_window` reaches `capacity`,
/// further admissions wait for the window to roll over; nothing is dropped.
#[derive(Debug, Clone)]
pub struct QuotaWindow {
    /// Start of the active window
    pub window_start: Instant,

    /// Requests admitted since `window_start`
    pub requests_this_window: u32,

    /// Window length
    pub window_duration: Duration,

    /// Maximum admissions per window
    pub capacity: u32,
}

impl QuotaWindow {
    /// Creates a new window starting at `now`
    pub fn new(window_duration: Duration, capacity: u32, now: Instant) -> Self {
        Self {
            window_start: now,
            requests_this_window: 0,
            window_duration,
            capacity,
        }
    }

    /// Rolls the window over if it has expired
    ///
    /// Returns true when a roll-over happened. The counter is zeroed once per
    /// expiry because the new window starts at `now`.
    pub fn roll_over(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.window_start) >= self.window_duration {
            self.window_start = now;
            self.requests_this_window = 0;
            true
        } else {
            false
        }
    }

    /// Checks if another request fits in the active window
    pub fn has_capacity(&self, now: Instant) -> bool {
        self.is_expired(now) || self.requests_this_window < self.capacity
    }

    /// Time until the window accepts another request, or None if it does now
    pub fn time_until_capacity(&self, now: Instant) -> Option<Duration> {
        if self.has_capacity(now) {
            return None;
        }
        let window_end = self.window_start + self.window_duration;
        Some(window_end.saturating_duration_since(now))
    }

    /// Records one admission, rolling the window over first if needed
    ///
    /// Callers must check `has_capacity` first; the counter never passes
    /// `capacity`.
    pub fn record_admission(&mut self, now: Instant) {
        self.roll_over(now);
        debug_assert!(self.requests_this_window < self.capacity);
        self.requests_this_window = (self.requests_this_window + 1).min(self.capacity);
    }

    /// Requests still available in the active window
    pub fn remaining(&self, now: Instant) -> u32 {
        if self.is_expired(now) {
            self.capacity
        } else {
            self.capacity.saturating_sub(self.requests_this_window)
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window_duration
    }
}
