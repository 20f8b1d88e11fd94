//! Countdown engine.
//!
//! The engine is a wall-clock-based state machine. It does not use internal
//! threads and never reads the clock itself: every command takes `now` in
//! epoch milliseconds and the caller is responsible for calling `tick()`
//! periodically (sub-second).
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Paused -> Running)* -> Idle (completed)
//! ```
//!
//! While running, the source of truth is the absolute end timestamp. The
//! remaining time is recomputed from it on every observation, so a suspended
//! host process resumes with the correct countdown instead of a lagging one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::mode::{Durations, SessionMode};
use crate::error::TimerError;
use crate::events::{at, Event};
use crate::storage::FieldReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
}

/// Emitted exactly once when a countdown reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub mode: SessionMode,
    pub was_extension: bool,
    /// The end timestamp of the run (epoch ms), not the observation time.
    pub completed_at_ms: i64,
    /// Duration the completed run was started with.
    pub duration_secs: u64,
}

/// Result of a tick that changed something observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Whole-second remaining value changed.
    Remaining(u64),
    Completed(CompletionEvent),
}

/// Read-only view for the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub mode: SessionMode,
    pub status: TimerStatus,
    pub remaining_secs: u64,
    pub initial_duration_secs: u64,
    pub was_extension: bool,
    pub end_timestamp_ms: Option<i64>,
    /// 0.0 .. 1.0 progress within the current run.
    pub progress: f64,
    pub degraded: bool,
}

/// Core countdown engine.
///
/// Decoding is lenient in the same way as the stats record: each field is
/// read on its own and missing durations are derived from the mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct TimerEngine {
    mode: SessionMode,
    status: TimerStatus,
    /// Absolute end of the run (ms since epoch). Only set while running.
    end_timestamp_ms: Option<i64>,
    /// Authoritative while idle/paused, derived while running.
    remaining_secs: u64,
    initial_duration_secs: u64,
    was_extension: bool,
    durations: Durations,
    #[serde(skip)]
    last_published_secs: Option<u64>,
    #[serde(skip)]
    degraded: Option<String>,
    /// Bumped on every transition; ticks that only move the countdown
    /// leave it alone.
    #[serde(skip)]
    revision: u64,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(Durations::default())
    }
}

impl TimerEngine {
    /// Create an idle focus countdown with the configured durations.
    pub fn new(durations: Durations) -> Self {
        let secs = durations.seconds(SessionMode::Focus);
        Self {
            mode: SessionMode::Focus,
            status: TimerStatus::Idle,
            end_timestamp_ms: None,
            remaining_secs: secs,
            initial_duration_secs: secs,
            was_extension: false,
            durations,
            last_published_secs: None,
            degraded: None,
            revision: 0,
        }
    }

    /// Decode a persisted engine, defaulting each missing or malformed
    /// field. Returns the names of fields that were present but unreadable.
    pub fn from_value_lenient(value: &Value) -> (Self, Vec<String>) {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None if value.is_null() => return (Self::default(), Vec::new()),
            None => return (Self::default(), vec!["<record>".to_string()]),
        };
        let mut fields = FieldReader::new(obj);

        let durations: Durations = fields.read("durations").unwrap_or_default();
        let mode: SessionMode = fields.read("mode").unwrap_or(SessionMode::Focus);
        let initial_duration_secs = fields
            .read("initial_duration_secs")
            .unwrap_or_else(|| durations.seconds(mode));
        let remaining_secs = fields
            .read("remaining_secs")
            .unwrap_or(initial_duration_secs);
        let mut status: TimerStatus = fields.read("status").unwrap_or(TimerStatus::Idle);
        let mut end_timestamp_ms: Option<i64> = fields.read("end_timestamp_ms");
        match status {
            // Without an end there is nothing to count down to; keep the
            // remaining time so the run can be resumed.
            TimerStatus::Running if end_timestamp_ms.is_none() => status = TimerStatus::Paused,
            TimerStatus::Running => {}
            _ => end_timestamp_ms = None,
        }

        let engine = Self {
            mode,
            status,
            end_timestamp_ms,
            remaining_secs,
            initial_duration_secs,
            was_extension: fields.read("was_extension").unwrap_or_default(),
            durations,
            // The stored value was already observed by whoever wrote it.
            last_published_secs: (status == TimerStatus::Running).then_some(remaining_secs),
            degraded: None,
            revision: 0,
        };
        (engine, fields.into_defaulted())
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn was_extension(&self) -> bool {
        self.was_extension
    }

    pub fn durations(&self) -> Durations {
        self.durations
    }

    pub fn initial_duration_secs(&self) -> u64 {
        self.initial_duration_secs
    }

    pub fn end_timestamp_ms(&self) -> Option<i64> {
        self.end_timestamp_ms
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Remaining whole seconds as of `now`.
    pub fn remaining_secs(&self, now_ms: i64) -> u64 {
        match (self.status, self.end_timestamp_ms) {
            (TimerStatus::Running, Some(end)) => ceil_secs(end.saturating_sub(now_ms)),
            _ => self.remaining_secs,
        }
    }

    /// 0.0 .. 1.0 progress within the current run.
    pub fn progress(&self, now_ms: i64) -> f64 {
        if self.initial_duration_secs == 0 {
            return 0.0;
        }
        let remaining = self.remaining_secs(now_ms).min(self.initial_duration_secs);
        (self.initial_duration_secs - remaining) as f64 / self.initial_duration_secs as f64
    }

    pub fn snapshot(&self, now_ms: i64) -> TimerSnapshot {
        TimerSnapshot {
            mode: self.mode,
            status: self.status,
            remaining_secs: self.remaining_secs(now_ms),
            initial_duration_secs: self.initial_duration_secs,
            was_extension: self.was_extension,
            end_timestamp_ms: self.end_timestamp_ms,
            progress: self.progress(now_ms),
            degraded: self.is_degraded(),
        }
    }

    /// Snapshot from the last observed remaining value, for when no clock
    /// reading is available.
    pub fn frozen_snapshot(&self) -> TimerSnapshot {
        let progress = if self.initial_duration_secs == 0 {
            0.0
        } else {
            let remaining = self.remaining_secs.min(self.initial_duration_secs);
            (self.initial_duration_secs - remaining) as f64 / self.initial_duration_secs as f64
        };
        TimerSnapshot {
            mode: self.mode,
            status: self.status,
            remaining_secs: self.remaining_secs,
            initial_duration_secs: self.initial_duration_secs,
            was_extension: self.was_extension,
            end_timestamp_ms: self.end_timestamp_ms,
            progress,
            degraded: self.is_degraded(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start or resume the current countdown.
    pub fn start(&mut self, now_ms: i64) -> Result<Event, TimerError> {
        self.ensure_clock()?;
        if self.status == TimerStatus::Running || self.remaining_secs == 0 {
            return Err(self.invalid("start"));
        }
        let resumed = self.status == TimerStatus::Paused;
        self.run_until(now_ms, self.remaining_secs);
        debug!(mode = %self.mode, remaining = self.remaining_secs, resumed, "timer running");
        if resumed {
            Ok(Event::TimerResumed {
                mode: self.mode,
                remaining_secs: self.remaining_secs,
                at: at(now_ms),
            })
        } else {
            Ok(Event::TimerStarted {
                mode: self.mode,
                duration_secs: self.remaining_secs,
                was_extension: self.was_extension,
                at: at(now_ms),
            })
        }
    }

    /// Freeze the countdown at the current wall-clock remaining time.
    pub fn pause(&mut self, now_ms: i64) -> Result<Event, TimerError> {
        self.ensure_clock()?;
        let remaining = self.remaining_secs(now_ms);
        // An elapsed run must be completed through tick(), not frozen at zero.
        if self.status != TimerStatus::Running || remaining == 0 {
            return Err(self.invalid("pause"));
        }
        self.remaining_secs = remaining;
        self.end_timestamp_ms = None;
        self.status = TimerStatus::Paused;
        self.revision += 1;
        debug!(mode = %self.mode, remaining = self.remaining_secs, "timer paused");
        Ok(Event::TimerPaused {
            mode: self.mode,
            remaining_secs: self.remaining_secs,
            at: at(now_ms),
        })
    }

    /// Switch to `mode` with its configured duration. Not allowed while running.
    pub fn set_mode(&mut self, mode: SessionMode) -> Result<Event, TimerError> {
        if self.status == TimerStatus::Running {
            return Err(self.invalid("switch mode"));
        }
        self.reset_to(mode);
        Ok(Event::ModeSwitched {
            mode,
            duration_secs: self.initial_duration_secs,
        })
    }

    /// Atomically switch mode and start running with an explicit duration.
    pub fn start_session(
        &mut self,
        mode: SessionMode,
        duration_secs: u64,
        was_extension: bool,
        now_ms: i64,
    ) -> Result<Event, TimerError> {
        self.ensure_clock()?;
        if self.status == TimerStatus::Running || duration_secs == 0 {
            return Err(self.invalid("start session"));
        }
        self.mode = mode;
        self.initial_duration_secs = duration_secs;
        self.was_extension = was_extension;
        self.run_until(now_ms, duration_secs);
        debug!(%mode, duration_secs, was_extension, "session started");
        Ok(Event::TimerStarted {
            mode,
            duration_secs,
            was_extension,
            at: at(now_ms),
        })
    }

    /// Drop whatever is in progress and go idle in `mode`.
    pub fn reset_to(&mut self, mode: SessionMode) {
        let secs = self.durations.seconds(mode);
        self.mode = mode;
        self.status = TimerStatus::Idle;
        self.end_timestamp_ms = None;
        self.remaining_secs = secs;
        self.initial_duration_secs = secs;
        self.was_extension = false;
        self.last_published_secs = None;
        self.revision += 1;
    }

    /// Replace the configured durations.
    ///
    /// Only a fresh idle countdown picks the new value up; paused and
    /// running countdowns keep the duration they were started with.
    pub fn set_durations(&mut self, durations: Durations) {
        let fresh = self.status == TimerStatus::Idle
            && !self.was_extension
            && self.remaining_secs == self.initial_duration_secs;
        self.durations = durations;
        if fresh {
            self.reset_to(self.mode);
        }
    }

    /// Call periodically.
    ///
    /// Returns `Some(Tick::Remaining)` only when the whole-second value
    /// changed since the last publication and `Some(Tick::Completed)` exactly
    /// once when the countdown reaches zero.
    pub fn tick(&mut self, now_ms: i64) -> Option<Tick> {
        let end = match (self.status, self.end_timestamp_ms) {
            (TimerStatus::Running, Some(end)) => end,
            _ => return None,
        };
        let remaining = ceil_secs(end.saturating_sub(now_ms));
        if remaining == 0 {
            let completion = CompletionEvent {
                mode: self.mode,
                was_extension: self.was_extension,
                completed_at_ms: end,
                duration_secs: self.initial_duration_secs,
            };
            self.status = TimerStatus::Idle;
            self.end_timestamp_ms = None;
            self.remaining_secs = 0;
            self.last_published_secs = Some(0);
            self.revision += 1;
            debug!(mode = %self.mode, was_extension = self.was_extension, "countdown completed");
            return Some(Tick::Completed(completion));
        }
        self.remaining_secs = remaining;
        if self.last_published_secs == Some(remaining) {
            return None;
        }
        self.last_published_secs = Some(remaining);
        Some(Tick::Remaining(remaining))
    }

    /// Enter the degraded state after the clock became unavailable.
    ///
    /// The frozen remaining value is kept so a later recovery can display it.
    pub fn mark_degraded(&mut self, reason: impl Into<String>) {
        self.degraded = Some(reason.into());
    }

    /// Leave the degraded state once the clock answers again.
    pub fn clear_degraded(&mut self) {
        if let Some(reason) = self.degraded.take() {
            debug!(%reason, "clock recovered");
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn run_until(&mut self, now_ms: i64, secs: u64) {
        let delta = i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.end_timestamp_ms = Some(now_ms.saturating_add(delta));
        self.remaining_secs = secs;
        self.status = TimerStatus::Running;
        self.last_published_secs = Some(secs);
        self.revision += 1;
    }

    fn ensure_clock(&self) -> Result<(), TimerError> {
        match &self.degraded {
            Some(reason) => Err(TimerError::ClockUnavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn invalid(&self, action: &'static str) -> TimerError {
        TimerError::InvalidTransition {
            action,
            mode: self.mode,
            status: self.status,
        }
    }
}

impl From<Value> for TimerEngine {
    fn from(value: Value) -> Self {
        let (engine, defaulted) = Self::from_value_lenient(&value);
        if !defaulted.is_empty() {
            warn!(fields = ?defaulted, "malformed persisted timer fields reset to defaults");
        }
        engine
    }
}

/// `ceil(ms / 1000)` clamped to zero.
fn ceil_secs(ms: i64) -> u64 {
    if ms <= 0 {
        0
    } else {
        (ms as u64).div_ceil(1000)
    }
}
