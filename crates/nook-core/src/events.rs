use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{SessionMode, TimerStatus};

/// Every state change in the timer and orchestrator produces an Event.
/// The rendering layer polls for events; the CLI prints them as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TimerStarted {
        mode: SessionMode,
        duration_secs: u64,
        was_extension: bool,
        at: DateTime<Utc>,
    },
    TimerPaused {
        mode: SessionMode,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        mode: SessionMode,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    /// Published only when the whole-second remaining value changes.
    TimerTick {
        mode: SessionMode,
        remaining_secs: u64,
    },
    TimerCompleted {
        mode: SessionMode,
        was_extension: bool,
        /// Minutes credited to statistics for this interval.
        minutes: u64,
        at: DateTime<Utc>,
    },
    /// A focus session finished; waiting for extend or take-break.
    AwaitingDecision {
        at: DateTime<Utc>,
    },
    SessionExtended {
        extra_secs: u64,
        at: DateTime<Utc>,
    },
    BreakSelected {
        mode: SessionMode,
        auto_started: bool,
        at: DateTime<Utc>,
    },
    /// A break was cut short and the timer returned to an idle focus.
    BreakSkipped {
        mode: SessionMode,
        at: DateTime<Utc>,
    },
    SessionCancelled {
        mode: SessionMode,
        progress_pct: f64,
        at: DateTime<Utc>,
    },
    ModeSwitched {
        mode: SessionMode,
        duration_secs: u64,
    },
    /// The host clock disappeared; no countdown is available.
    TimerDegraded {
        reason: String,
    },
    StateSnapshot {
        mode: SessionMode,
        status: TimerStatus,
        remaining_secs: u64,
        initial_duration_secs: u64,
        was_extension: bool,
        awaiting_decision: bool,
        progress: f64,
        degraded: bool,
    },
}

/// Convert epoch milliseconds for event timestamps.
pub(crate) fn at(epoch_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(epoch_ms).unwrap_or_default()
}
