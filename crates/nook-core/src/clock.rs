//! Wall-clock sources.
//!
//! Everything above this module works in milliseconds since the Unix epoch.
//! The countdown is computed from an absolute end timestamp, so any clock that
//! reports real wall time keeps the timer correct across process suspension.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone};

use crate::error::TimerError;

/// Source of the current wall-clock time.
pub trait Clock {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> Result<i64, TimerError>;
}

/// Host system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Result<i64, TimerError> {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_err(|e| TimerError::ClockUnavailable(e.to_string()))?;
        i64::try_from(elapsed.as_millis())
            .map_err(|e| TimerError::ClockUnavailable(e.to_string()))
    }
}

/// Manually driven clock for tests and simulations.
///
/// Clones share the same underlying time, so a test can keep one handle
/// and hand another to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
    unavailable: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_ms)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start at a local wall-clock time.
    pub fn at_local(at: DateTime<Local>) -> Self {
        Self::new(at.timestamp_millis())
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance_ms(secs.saturating_mul(1000));
    }

    /// Simulate the host clock disappearing.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Result<i64, TimerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TimerError::ClockUnavailable("manual clock disabled".into()));
        }
        Ok(self.now.load(Ordering::SeqCst))
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now_ms(&self) -> Result<i64, TimerError> {
        (**self).now_ms()
    }
}

/// Convert epoch milliseconds to the local calendar.
pub fn local_time(epoch_ms: i64) -> Result<DateTime<Local>, TimerError> {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .ok_or_else(|| TimerError::ClockUnavailable(format!("timestamp {epoch_ms} out of range")))
}
