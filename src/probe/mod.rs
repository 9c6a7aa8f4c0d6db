//! Reachability probing: the adaptive-interval poll loop and its inputs.

pub mod http;
pub mod prober;

pub use http::HttpReachabilityTest;
pub use prober::ReachabilityProber;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::Utc;

use crate::Result;

/// Outbound test of external reachability.
pub trait ReachabilityTest: Send + Sync {
    /// Run one test. `Ok(true)` means the outside world answered.
    ///
    /// # Errors
    ///
    /// Any transport failure. Callers treat errors as "unreachable".
    fn test(&self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;
}

/// Wall clock in epoch milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Whether a test is due: never succeeded, clock moved backward, or at
/// least `interval_ms` elapsed since the last success.
#[must_use]
pub fn is_interval_exceeded(interval_ms: u64, last_ms: i64, now_ms: i64) -> bool {
    if last_ms == 0 {
        return true;
    }
    let elapsed = now_ms.saturating_sub(last_ms);
    elapsed < 0 || elapsed >= i64::try_from(interval_ms).unwrap_or(i64::MAX)
}

/// Interval and last-success bookkeeping shared by the poll loop and its
/// controller.
#[derive(Debug)]
pub struct ProbeConfig {
    min_interval_ms: u64,
    interval_ms: AtomicU64,
    last_success_ms: AtomicI64,
    repeat_enabled: AtomicBool,
}

impl ProbeConfig {
    /// Create a config; `interval_ms` is clamped to `min_interval_ms`.
    #[must_use]
    pub fn new(min_interval_ms: u64, interval_ms: u64) -> Self {
        Self {
            min_interval_ms,
            interval_ms: AtomicU64::new(interval_ms.max(min_interval_ms)),
            last_success_ms: AtomicI64::new(0),
            repeat_enabled: AtomicBool::new(false),
        }
    }

    /// Floor applied to every interval.
    #[must_use]
    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    /// Current interval.
    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::SeqCst)
    }

    /// Update the interval, clamped to the floor. Returns the stored value.
    pub fn set_interval_ms(&self, interval_ms: u64) -> u64 {
        let clamped = interval_ms.max(self.min_interval_ms);
        self.interval_ms.store(clamped, Ordering::SeqCst);
        clamped
    }

    /// Time of the last successful test; 0 when none.
    #[must_use]
    pub fn last_success_ms(&self) -> i64 {
        self.last_success_ms.load(Ordering::SeqCst)
    }

    /// Record a success at `now_ms` if it is later than the stored one.
    /// Returns whether the stored time moved.
    pub fn record_success(&self, now_ms: i64) -> bool {
        self.last_success_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                (now_ms > last).then_some(now_ms)
            })
            .is_ok()
    }

    /// Forget the last success so the next tick tests immediately.
    pub fn clear_last_success(&self) {
        self.last_success_ms.store(0, Ordering::SeqCst);
    }

    /// Whether the loop performs tests.
    #[must_use]
    pub fn repeat_enabled(&self) -> bool {
        self.repeat_enabled.load(Ordering::SeqCst)
    }

    /// Toggle testing without stopping the loop.
    pub fn set_repeat_enabled(&self, enabled: bool) {
        self.repeat_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether a test is due at `now_ms`.
    #[must_use]
    pub fn is_due(&self, now_ms: i64) -> bool {
        is_interval_exceeded(self.interval_ms(), self.last_success_ms(), now_ms)
    }
}
