//! Per-invocation application state.
//!
//! Loads timer, stats and tasks from the database, catches the timer up with
//! the wall clock, and writes back only the records this process changed.
//! Several `nook` processes may share one database, so a long-running
//! command calls [`AppContext::refresh`] to pick up their writes.

use std::collections::BTreeMap;

use chrono::Local;
use nook_core::{
    Clock, Config, Database, DebouncedWriter, Event, KvStore, Orchestrator, PersistenceError,
    SessionState, StatsAggregate, StatsAggregator, StatsHandle, SystemClock, TaskList, TimerError,
};
use tracing::{debug, warn};

use super::CliResult;

const KEYS: [&str; 3] = [
    SessionState::STORE_KEY,
    TaskList::STORE_KEY,
    StatsAggregator::STORE_KEY,
];

/// Write-back bookkeeping for one stored record.
#[derive(Debug, Default)]
struct KeySync {
    /// Local revision last handed to the writer.
    staged_revision: u64,
    /// Raw value last read from or written to the database.
    synced: Option<String>,
    /// Staged value not yet confirmed written.
    in_flight: Option<String>,
}

pub struct AppContext {
    pub db: Database,
    pub config: Config,
    pub orch: Orchestrator<SystemClock, TaskList>,
    /// Events produced by the catch-up tick on open.
    pub caught_up: Vec<Event>,
    writer: DebouncedWriter,
    sync: BTreeMap<&'static str, KeySync>,
}

impl AppContext {
    pub fn open() -> CliResult<Self> {
        let config = Config::load_or_default();
        let db = Database::open()?;
        let today = Local::now().date_naive();

        let mut sync = BTreeMap::new();
        for key in KEYS {
            let synced = db.kv_get(key).unwrap_or_else(|e| {
                warn!(key, error = %e, "could not read stored record");
                None
            });
            sync.insert(
                key,
                KeySync {
                    synced,
                    ..KeySync::default()
                },
            );
        }
        let raw = |key: &str| sync.get(key).and_then(|s: &KeySync| s.synced.as_deref());

        let stats = StatsAggregator::load(&db, u64::from(config.goals.daily_goal), today);
        let state = raw(SessionState::STORE_KEY)
            .map(decode::<SessionState>)
            .unwrap_or_default();
        let tasks = raw(TaskList::STORE_KEY)
            .map(decode::<TaskList>)
            .unwrap_or_default();

        let orch = Orchestrator::with_state(
            SystemClock,
            state,
            config.session_settings(),
            StatsHandle::new(stats),
            tasks,
        );
        let mut ctx = Self {
            db,
            writer: DebouncedWriter::new(i64::from(config.persistence.debounce_ms)),
            config,
            orch,
            caught_up: Vec::new(),
            sync,
        };
        // Re-deriving durations on load is not a change worth writing. A
        // freshly stamped install date is, so stats stay dirty.
        ctx.mark_clean(SessionState::STORE_KEY);
        ctx.mark_clean(TaskList::STORE_KEY);

        let mut caught_up = ctx.tick().unwrap_or_else(|e| {
            warn!(error = %e, "could not catch up with the clock");
            Vec::new()
        });
        // A one-shot command reports state, not countdown progress.
        caught_up.retain(|event| !matches!(event, Event::TimerTick { .. }));
        ctx.caught_up = caught_up;
        Ok(ctx)
    }

    /// Tick the orchestrator and log completed intervals.
    pub fn tick(&mut self) -> Result<Vec<Event>, TimerError> {
        let events = self.orch.tick()?;
        self.log_completions(&events);
        Ok(events)
    }

    fn log_completions(&self, events: &[Event]) {
        for event in events {
            if let Event::TimerCompleted {
                mode,
                was_extension,
                minutes,
                at,
            } = event
            {
                if let Err(e) = self.db.record_session(*mode, *minutes, *was_extension, *at) {
                    warn!(error = %e, "could not log completed session");
                }
            }
        }
    }

    /// Adopt records another process wrote since they were last read.
    ///
    /// Records with an unwritten local change are left alone; the local
    /// change is written when its window closes.
    pub fn refresh(&mut self) -> Result<(), PersistenceError> {
        for key in KEYS {
            if self.sync.get(key).is_some_and(|s| s.in_flight.is_some()) {
                continue;
            }
            let stored = self.db.kv_get(key)?;
            if stored.as_deref() == self.synced(key) {
                continue;
            }
            debug!(key, "record changed by another process");
            let raw = stored.as_deref().unwrap_or("null");
            match key {
                SessionState::STORE_KEY => self.orch.restore_state(decode(raw)),
                TaskList::STORE_KEY => *self.orch.tasks_mut() = decode(raw),
                _ => {
                    let stats: StatsAggregate = decode(raw);
                    self.orch.stats().update(|agg| agg.replace_stats(stats));
                }
            }
            if let Some(entry) = self.sync.get_mut(key) {
                entry.synced = stored;
            }
            self.mark_clean(key);
        }
        Ok(())
    }

    /// Stage the records changed since they were last staged.
    pub fn stage(&mut self, now_ms: i64) -> Result<(), PersistenceError> {
        for key in KEYS {
            let revision = self.revision(key);
            if self.sync.get(key).is_some_and(|s| s.staged_revision == revision) {
                continue;
            }
            match key {
                SessionState::STORE_KEY => self.writer.stage(key, self.orch.state(), now_ms)?,
                TaskList::STORE_KEY => self.writer.stage(key, self.orch.tasks(), now_ms)?,
                _ => {
                    let stats = self.orch.stats().snapshot();
                    self.writer.stage(key, &stats, now_ms)?;
                }
            }
            let staged = self.writer.pending(key).map(str::to_string);
            if let Some(entry) = self.sync.get_mut(key) {
                entry.staged_revision = revision;
                entry.in_flight = staged;
            }
        }
        Ok(())
    }

    /// Write staged records whose window has closed.
    pub fn flush_due(&mut self, now_ms: i64) {
        let result = self.writer.flush_due(&self.db, now_ms);
        self.settle_writes();
        match result {
            Ok(0) => {}
            Ok(written) => debug!(written, "state persisted"),
            Err(e) => warn!(error = %e, "write-back failed, will retry"),
        }
    }

    /// Stage and write everything changed now.
    pub fn save(&mut self) -> CliResult {
        let now = now_ms();
        self.stage(now)?;
        let result = self.writer.flush(&self.db, now);
        self.settle_writes();
        result?;
        Ok(())
    }

    /// Move written values from in-flight to synced.
    fn settle_writes(&mut self) {
        for (key, entry) in &mut self.sync {
            if entry.in_flight.is_some() && self.writer.pending(key).is_none() {
                entry.synced = entry.in_flight.take();
            }
        }
    }

    fn mark_clean(&mut self, key: &'static str) {
        let revision = self.revision(key);
        if let Some(entry) = self.sync.get_mut(key) {
            entry.staged_revision = revision;
        }
    }

    fn synced(&self, key: &str) -> Option<&str> {
        self.sync.get(key).and_then(|s| s.synced.as_deref())
    }

    fn revision(&self, key: &str) -> u64 {
        match key {
            SessionState::STORE_KEY => self.orch.state_revision(),
            TaskList::STORE_KEY => self.orch.tasks().revision(),
            _ => self.orch.stats().revision(),
        }
    }
}

/// Decode a stored record; unparseable JSON falls back to the default.
fn decode<T: serde::de::DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(error = %e, "stored record unreadable, starting fresh");
        T::default()
    })
}

/// Wall-clock time for staging; falls back to zero without a clock.
pub fn now_ms() -> i64 {
    SystemClock.now_ms().unwrap_or_default()
}

/// Print an event as one JSON line.
pub fn print_event(event: &Event) -> CliResult {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}
