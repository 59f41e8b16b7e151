//! Data message statistics shared between the listener and the control loop.
//!
//! The listener increments from the fabric's dispatch thread while the
//! control loop snapshots and resets from its own task. Both go through one
//! mutex so a snapshot and its reset are a single step: every increment lands
//! either in the snapshot or in the next window, never both, never neither.

use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

/// Current counting window.
#[derive(Debug)]
struct Window {
    count: u64,
    /// Monotonic start, used for elapsed time
    started: Instant,
    /// Wall-clock start, reported alongside the snapshot
    started_at: SystemTime,
}

impl Window {
    fn fresh() -> Self {
        Self {
            count: 0,
            started: Instant::now(),
            started_at: SystemTime::now(),
        }
    }
}

/// Counter of data messages received in the current window.
///
/// Invariant: while `count == 0` the window start is the last reset (or
/// creation); once `count > 0` it is the arrival of the window's first
/// message.
#[derive(Debug)]
pub struct StatsCounter {
    window: Mutex<Window>,
}

/// Counts read by [`StatsCounter::snapshot_and_reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub count: u64,
    pub elapsed: Duration,
    pub window_start: SystemTime,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Received {} in {}ms", self.count, self.elapsed.as_millis())
    }
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Mutex::new(Window::fresh()),
        }
    }

    /// Count one message, returning the new count.
    ///
    /// The first message after a reset restarts the window clock.
    pub fn increment(&self) -> u64 {
        let mut window = self.window.lock();
        if window.count == 0 {
            window.started = Instant::now();
            window.started_at = SystemTime::now();
        }
        window.count += 1;
        window.count
    }

    /// Read the count and the time since the window started, then start a
    /// new empty window. One indivisible step with respect to `increment`.
    pub fn snapshot_and_reset(&self) -> StatsSnapshot {
        let mut window = self.window.lock();
        let now = Instant::now();
        let snapshot = StatsSnapshot {
            count: window.count,
            elapsed: now.saturating_duration_since(window.started),
            window_start: window.started_at,
        };
        *window = Window {
            count: 0,
            started: now,
            started_at: SystemTime::now(),
        };
        snapshot
    }

    /// Current count without resetting.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.window.lock().count
    }
}
