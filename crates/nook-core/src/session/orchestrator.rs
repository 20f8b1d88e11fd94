//! Session state machine over the countdown engine.
//!
//! ## Transitions
//!
//! ```text
//! Focus      --completes--> AwaitingDecision
//! AwaitingDecision --extend--> Focus (flow extension, was_extension)
//! AwaitingDecision --take_break--> ShortBreak | LongBreak
//! ShortBreak --completes--> Focus running (auto-start) | Idle(Focus)
//! LongBreak  --completes--> Idle(Focus)
//! ```
//!
//! The orchestrator reads the clock once per command and hands the reading
//! to the engine, so every command observes one consistent `now`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::{local_time, Clock};
use crate::error::TimerError;
use crate::events::{at, Event};
use crate::stats::{StatsHandle, DEFAULT_DAILY_GOAL};
use crate::storage::FieldReader;
use crate::task::TaskProvider;
use crate::timer::{CompletionEvent, Durations, SessionMode, Tick, TimerEngine, TimerStatus};

/// Runtime settings. Changes apply to the next countdown only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub durations: Durations,
    /// Length of a flow extension in minutes.
    pub flow_extension_min: u32,
    /// Every n-th full focus session earns a long break. 0 disables them.
    pub long_break_interval: u32,
    pub auto_start_breaks: bool,
    pub daily_goal_min: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            durations: Durations::default(),
            flow_extension_min: 15,
            long_break_interval: 4,
            auto_start_breaks: false,
            daily_goal_min: DEFAULT_DAILY_GOAL,
        }
    }
}

/// Persisted orchestrator state, decoded field by field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct SessionState {
    pub engine: TimerEngine,
    /// A focus session finished and neither extend nor break was chosen.
    pub awaiting_decision: bool,
    /// The current break was started automatically; pausing skips it.
    pub chain_armed: bool,
}

impl SessionState {
    pub const STORE_KEY: &'static str = "nook_timer";

    /// Decode a persisted state, defaulting each missing or malformed field.
    /// Returns the names of fields that were present but unreadable.
    pub fn from_value_lenient(value: &Value) -> (Self, Vec<String>) {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None if value.is_null() => return (Self::default(), Vec::new()),
            None => return (Self::default(), vec!["<record>".to_string()]),
        };
        let mut fields = FieldReader::new(obj);

        let engine = match fields.raw("engine") {
            Some(raw) => {
                let (engine, defaulted) = TimerEngine::from_value_lenient(raw);
                for field in defaulted {
                    fields.mark_defaulted(&format!("engine.{field}"));
                }
                engine
            }
            None => TimerEngine::default(),
        };
        let state = Self {
            engine,
            awaiting_decision: fields.read("awaiting_decision").unwrap_or_default(),
            chain_armed: fields.read("chain_armed").unwrap_or_default(),
        };
        (state, fields.into_defaulted())
    }
}

impl From<Value> for SessionState {
    fn from(value: Value) -> Self {
        let (state, defaulted) = Self::from_value_lenient(&value);
        if !defaulted.is_empty() {
            warn!(fields = ?defaulted, "malformed persisted session fields reset to defaults");
        }
        state
    }
}

pub struct Orchestrator<C: Clock, T: TaskProvider> {
    clock: C,
    state: SessionState,
    settings: SessionSettings,
    stats: StatsHandle,
    tasks: T,
}

impl<C: Clock, T: TaskProvider> Orchestrator<C, T> {
    pub fn new(clock: C, settings: SessionSettings, stats: StatsHandle, tasks: T) -> Self {
        let state = SessionState {
            engine: TimerEngine::new(settings.durations),
            ..SessionState::default()
        };
        Self::with_state(clock, state, settings, stats, tasks)
    }

    /// Resume from persisted state.
    pub fn with_state(
        clock: C,
        mut state: SessionState,
        settings: SessionSettings,
        stats: StatsHandle,
        tasks: T,
    ) -> Self {
        state.engine.set_durations(settings.durations);
        stats.update(|agg| agg.set_daily_goal(settings.daily_goal_min));
        Self {
            clock,
            state,
            settings,
            stats,
            tasks,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn stats(&self) -> &StatsHandle {
        &self.stats
    }

    pub fn tasks(&self) -> &T {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut T {
        &mut self.tasks
    }

    pub fn is_awaiting_decision(&self) -> bool {
        self.state.awaiting_decision
    }

    /// Changes whenever the persisted session state does.
    pub fn state_revision(&self) -> u64 {
        self.state.engine.revision()
    }

    /// Adopt a session state written elsewhere, keeping current settings.
    pub fn restore_state(&mut self, mut state: SessionState) {
        state.engine.set_durations(self.settings.durations);
        self.state = state;
    }

    pub fn update_settings(&mut self, settings: SessionSettings) {
        self.state.engine.set_durations(settings.durations);
        self.stats
            .update(|agg| agg.set_daily_goal(settings.daily_goal_min));
        self.settings = settings;
    }

    /// Current state for the rendering layer.
    ///
    /// Without a clock reading the last observed countdown is shown.
    pub fn snapshot(&self) -> Event {
        let engine = &self.state.engine;
        let timer = match self.clock.now_ms() {
            Ok(now) => engine.snapshot(now),
            Err(_) => engine.frozen_snapshot(),
        };
        Event::StateSnapshot {
            mode: timer.mode,
            status: timer.status,
            remaining_secs: timer.remaining_secs,
            initial_duration_secs: timer.initial_duration_secs,
            was_extension: timer.was_extension,
            awaiting_decision: self.state.awaiting_decision,
            progress: timer.progress,
            degraded: timer.degraded,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Observe the clock. Returns the events this observation produced.
    pub fn tick(&mut self) -> Result<Vec<Event>, TimerError> {
        let now = self.now()?;
        match self.state.engine.tick(now) {
            None => Ok(Vec::new()),
            Some(Tick::Remaining(remaining_secs)) => Ok(vec![Event::TimerTick {
                mode: self.state.engine.mode(),
                remaining_secs,
            }]),
            Some(Tick::Completed(completion)) => self.complete(completion, now),
        }
    }

    /// Start the idle countdown, or resume a paused one.
    pub fn start(&mut self) -> Result<Event, TimerError> {
        self.ensure_not_awaiting("start")?;
        let now = self.now()?;
        self.state.engine.start(now)
    }

    /// Pause a focus session, or skip an auto-started break.
    pub fn pause_session(&mut self) -> Result<Event, TimerError> {
        self.ensure_not_awaiting("pause")?;
        let now = self.now()?;
        let engine = &mut self.state.engine;
        let mode = engine.mode();

        if mode.is_break() && self.state.chain_armed {
            engine.reset_to(SessionMode::Focus);
            self.state.chain_armed = false;
            info!(%mode, "break skipped");
            return Ok(Event::BreakSkipped { mode, at: at(now) });
        }

        let progress_pct = engine.progress(now) * 100.0;
        let event = engine.pause(now)?;
        self.stats
            .update(|agg| agg.record_pause(mode, progress_pct));
        Ok(event)
    }

    /// Continue the just-completed focus session by the flow extension.
    pub fn extend(&mut self) -> Result<Vec<Event>, TimerError> {
        if !self.state.awaiting_decision {
            return Err(TimerError::NoDecisionPending);
        }
        let now = self.now()?;
        let extra_secs = u64::from(self.settings.flow_extension_min.max(1)) * 60;
        let started =
            self.state
                .engine
                .start_session(SessionMode::Focus, extra_secs, true, now)?;
        self.state.awaiting_decision = false;
        self.stats.update(|agg| agg.record_extension());
        info!(extra_secs, "flow extension started");
        Ok(vec![
            Event::SessionExtended {
                extra_secs,
                at: at(now),
            },
            started,
        ])
    }

    /// End the intermission with a short or long break.
    pub fn take_break(&mut self) -> Result<Vec<Event>, TimerError> {
        if !self.state.awaiting_decision {
            return Err(TimerError::NoDecisionPending);
        }
        let now = self.now()?;
        let mode = self.next_break();
        let auto_started = self.settings.auto_start_breaks;

        let mut events = Vec::with_capacity(2);
        if auto_started {
            let secs = self.settings.durations.seconds(mode);
            let started = self.state.engine.start_session(mode, secs, false, now)?;
            events.push(started);
        } else {
            self.state.engine.set_mode(mode)?;
        }
        self.state.awaiting_decision = false;
        self.state.chain_armed = auto_started;
        debug!(%mode, auto_started, "break selected");
        events.insert(
            0,
            Event::BreakSelected {
                mode,
                auto_started,
                at: at(now),
            },
        );
        Ok(events)
    }

    /// Abandon the current focus session, or skip the current break.
    pub fn cancel(&mut self) -> Result<Event, TimerError> {
        self.ensure_not_awaiting("cancel")?;
        let now = self.now()?;
        let engine = &mut self.state.engine;
        let mode = engine.mode();

        if mode.is_break() {
            engine.reset_to(SessionMode::Focus);
            self.state.chain_armed = false;
            info!(%mode, "break skipped");
            return Ok(Event::BreakSkipped { mode, at: at(now) });
        }

        if engine.status() == TimerStatus::Idle {
            return Err(TimerError::InvalidTransition {
                action: "cancel",
                mode,
                status: TimerStatus::Idle,
            });
        }

        let progress_pct = engine.progress(now) * 100.0;
        engine.reset_to(SessionMode::Focus);
        self.stats.update(|agg| agg.record_cancel(mode));
        info!(progress_pct, "focus session abandoned");
        Ok(Event::SessionCancelled {
            mode,
            progress_pct,
            at: at(now),
        })
    }

    /// Switch to `mode` with its configured duration. Not allowed while running.
    ///
    /// Leaves any pending intermission.
    pub fn switch_mode(&mut self, mode: SessionMode) -> Result<Event, TimerError> {
        let event = self.state.engine.set_mode(mode)?;
        self.state.awaiting_decision = false;
        self.state.chain_armed = false;
        Ok(event)
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn now(&mut self) -> Result<i64, TimerError> {
        match self.clock.now_ms() {
            Ok(now) => {
                self.state.engine.clear_degraded();
                Ok(now)
            }
            Err(e) => {
                warn!(error = %e, "clock unavailable, timer degraded");
                self.state.engine.mark_degraded(e.to_string());
                Err(e)
            }
        }
    }

    fn ensure_not_awaiting(&self, action: &'static str) -> Result<(), TimerError> {
        if self.state.awaiting_decision {
            return Err(TimerError::AwaitingDecision { action });
        }
        Ok(())
    }

    fn next_break(&self) -> SessionMode {
        let completed = self
            .stats
            .read(|agg| agg.stats().session_count(SessionMode::Focus));
        let interval = u64::from(self.settings.long_break_interval);
        if interval > 0 && completed > 0 && completed % interval == 0 {
            SessionMode::LongBreak
        } else {
            SessionMode::ShortBreak
        }
    }

    fn complete(&mut self, completion: CompletionEvent, now: i64) -> Result<Vec<Event>, TimerError> {
        let CompletionEvent {
            mode,
            was_extension,
            completed_at_ms,
            duration_secs,
        } = completion;
        let minutes = (duration_secs + 30) / 60;
        let completed_at = local_time(completed_at_ms)?;

        let active_task = match mode {
            SessionMode::Focus => self.tasks.focused_task(),
            _ => None,
        };
        let tasks = &mut self.tasks;
        self.stats.update(|agg| {
            agg.record_completion(
                mode,
                minutes,
                was_extension,
                active_task.as_ref(),
                completed_at,
                tasks,
            );
            if mode.is_break() {
                agg.record_break_completion();
            }
        });

        let mut events = vec![Event::TimerCompleted {
            mode,
            was_extension,
            minutes,
            at: at(completed_at_ms),
        }];
        self.state.chain_armed = false;

        match mode {
            SessionMode::Focus => {
                self.state.awaiting_decision = true;
                events.push(Event::AwaitingDecision {
                    at: at(completed_at_ms),
                });
            }
            SessionMode::ShortBreak if self.settings.auto_start_breaks => {
                let secs = self.settings.durations.seconds(SessionMode::Focus);
                match self
                    .state
                    .engine
                    .start_session(SessionMode::Focus, secs, false, now)
                {
                    Ok(started) => events.push(started),
                    // The break is already credited; report it and wait idle.
                    Err(e) => {
                        warn!(error = %e, "could not chain into focus");
                        self.state.engine.reset_to(SessionMode::Focus);
                    }
                }
            }
            SessionMode::ShortBreak | SessionMode::LongBreak => {
                self.state.engine.reset_to(SessionMode::Focus);
            }
        }
        Ok(events)
    }
}
