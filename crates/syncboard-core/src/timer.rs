//! Owned, cancellable deferred work.
//!
//! Nothing here spawns tasks or reads the clock. Each timer is a plain value
//! owned by whoever scheduled it, and is driven by passing `now` into
//! [`Throttle::poll`], [`Debounce::poll`] or [`Deadline::is_due`]. Dropping or
//! cancelling the owner cancels the timer. Tests advance a fake clock by
//! offsetting a base `Instant`.

// Use web_time for WASM compatibility
#[cfg(target_arch = "wasm32")]
pub use web_time::{Instant, SystemTime, UNIX_EPOCH};
#[cfg(not(target_arch = "wasm32"))]
pub use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub use std::time::Duration;

/// A single scheduled instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Schedule `after` from `now`.
    pub fn after(now: Instant, after: Duration) -> Self {
        Self { at: now + after }
    }

    /// The instant this deadline fires.
    pub fn at(&self) -> Instant {
        self.at
    }

    /// Whether the deadline has been reached.
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.at
    }
}

/// Trailing-edge throttle.
///
/// The first offer opens a window. Later offers inside the window replace the
/// pending value, and the last one is released when the window closes.
#[derive(Debug, Clone)]
pub struct Throttle<T> {
    window: Duration,
    window_end: Option<Deadline>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    /// Create an idle throttle with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_end: None,
            pending: None,
        }
    }

    /// Offer a value. Opens a window if none is open.
    pub fn offer(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        if self.window_end.is_none() {
            self.window_end = Some(Deadline::after(now, self.window));
        }
    }

    /// Release the pending value if its window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.window_end {
            Some(end) if end.is_due(now) => {
                self.window_end = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Drop the pending value and close the window.
    pub fn cancel(&mut self) -> Option<T> {
        self.window_end = None;
        self.pending.take()
    }

    /// Whether a window is open.
    pub fn is_pending(&self) -> bool {
        self.window_end.is_some()
    }
}

/// Debounce: releases a value after a quiet period, restarting on each
/// schedule.
#[derive(Debug, Clone)]
pub struct Debounce<T> {
    delay: Duration,
    scheduled: Option<(Deadline, T)>,
}

impl<T> Debounce<T> {
    /// Create an idle debounce with the given quiet period.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            scheduled: None,
        }
    }

    /// Schedule `value`, superseding anything already scheduled.
    pub fn schedule(&mut self, value: T, now: Instant) {
        self.scheduled = Some((Deadline::after(now, self.delay), value));
    }

    /// Release the value once the quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.scheduled {
            Some((deadline, _)) if deadline.is_due(now) => {
                self.scheduled.take().map(|(_, value)| value)
            }
            _ => None,
        }
    }

    /// Cancel the scheduled value.
    pub fn cancel(&mut self) -> Option<T> {
        self.scheduled.take().map(|(_, value)| value)
    }

    /// Whether a value is scheduled.
    pub fn is_pending(&self) -> bool {
        self.scheduled.is_some()
    }
}
