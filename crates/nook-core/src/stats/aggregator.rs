//! Single-writer owner of the statistics aggregate.
//!
//! Every mutation is one of the named operations below so the invariants
//! (one streak step per calendar day, one perfect day per crossing,
//! `best_streak >= current_streak`) are enforced in one place. Calendar days
//! are taken from the local time zone for history, streaks and the weekly
//! heatmap alike.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Datelike, Local, NaiveDate, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::aggregate::{PauseBucket, StatsAggregate};
use crate::storage::{load_json, KvStore};
use crate::task::{Task, TaskProvider};
use crate::timer::SessionMode;

/// Daily goal used when none is configured, in minutes.
pub const DEFAULT_DAILY_GOAL: u64 = 120;

/// What a recorded focus completion did to the daily picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub day: NaiveDate,
    pub day_minutes: u64,
    pub current_streak: u32,
    pub perfect_day: bool,
}

#[derive(Debug, Clone)]
pub struct StatsAggregator {
    stats: StatsAggregate,
    daily_goal: u64,
    revision: u64,
}

impl StatsAggregator {
    pub const STORE_KEY: &'static str = "nook_stats";

    pub fn new(stats: StatsAggregate, daily_goal: u64) -> Self {
        Self {
            stats,
            daily_goal,
            revision: 0,
        }
    }

    /// Load from the store, defaulting whatever is missing or corrupt.
    ///
    /// The install date is stamped on first load.
    pub fn load(store: &dyn KvStore, daily_goal: u64, today: NaiveDate) -> Self {
        let stats = match load_json::<StatsAggregate>(store, Self::STORE_KEY) {
            Ok(stats) => stats.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "stats record unreadable, starting fresh");
                StatsAggregate::default()
            }
        };
        let mut aggregator = Self::new(stats, daily_goal);
        if aggregator.stats.install_date.is_none() {
            aggregator.stats.install_date = Some(today);
            aggregator.revision += 1;
        }
        aggregator
    }

    pub fn stats(&self) -> &StatsAggregate {
        &self.stats
    }

    pub fn daily_goal(&self) -> u64 {
        self.daily_goal
    }

    /// Incremented on every mutation; lets writers skip clean state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the whole record, e.g. with one written by another process.
    pub fn replace_stats(&mut self, stats: StatsAggregate) {
        self.stats = stats;
        self.revision += 1;
    }

    pub fn set_daily_goal(&mut self, minutes: u64) {
        self.daily_goal = minutes;
    }

    /// Credit a completed interval.
    ///
    /// Extensions add minutes but never session counts, growth units or task
    /// units. Only focus intervals touch history, streaks and distributions.
    pub fn record_completion(
        &mut self,
        mode: SessionMode,
        minutes: u64,
        was_extension: bool,
        active_task: Option<&Task>,
        now: DateTime<Local>,
        tasks: &mut dyn TaskProvider,
    ) -> Option<CompletionOutcome> {
        self.revision += 1;
        let stats = &mut self.stats;
        if !was_extension {
            *stats.session_counts.entry(mode).or_insert(0) += 1;
        }
        if mode != SessionMode::Focus {
            return None;
        }

        let today = now.date_naive();
        let before = stats.minutes_on(today);
        let after = before + minutes;
        stats.daily_history.insert(today, after);

        match stats.last_active_date {
            Some(last) if last == today => {}
            // A late completion for an earlier day never rewinds the streak.
            Some(last) if last > today => {}
            Some(last) if Some(last) == today.pred_opt() => {
                stats.current_streak += 1;
                stats.last_active_date = Some(today);
            }
            _ => {
                stats.current_streak = 1;
                stats.last_active_date = Some(today);
            }
        }
        stats.best_streak = stats.best_streak.max(stats.current_streak);

        let perfect_day = before < self.daily_goal && self.daily_goal <= after;
        if perfect_day {
            stats.perfect_days += 1;
            info!(day = %today, minutes = after, "daily goal reached");
        }

        let hour = now.hour() as usize;
        let weekday = now.weekday().num_days_from_sunday() as usize;
        stats.hourly_activity[hour] += minutes;
        stats.weekly_hourly[weekday][hour] += minutes;

        let category = active_task
            .map(|t| t.category_or_default())
            .unwrap_or(crate::task::DEFAULT_CATEGORY);
        *stats.category_dist.entry(category.to_string()).or_insert(0) += minutes;
        if let Some(priority) = active_task.and_then(|t| t.priority) {
            *stats.priority_dist.entry(priority).or_insert(0) += minutes;
        }

        stats.total_minutes += minutes;

        if !was_extension {
            stats.growth_units += 1;
            if let Some(task) = active_task {
                if let Err(e) = tasks.increment_completed_units(&task.id) {
                    warn!(task = %task.id, error = %e, "could not credit task");
                }
            }
        }

        info!(
            day = %today,
            minutes,
            was_extension,
            streak = stats.current_streak,
            "focus session recorded"
        );
        Some(CompletionOutcome {
            day: today,
            day_minutes: after,
            current_streak: stats.current_streak,
            perfect_day,
        })
    }

    /// Record a pause at `progress_pct` (0..100) of a focus session.
    ///
    /// Every focus pause counts as an interruption toward the abandonment
    /// rate and is never walked back on resume.
    pub fn record_pause(&mut self, mode: SessionMode, progress_pct: f64) {
        if mode != SessionMode::Focus {
            return;
        }
        self.revision += 1;
        let bucket = PauseBucket::from_progress(progress_pct);
        self.stats.total_pauses += 1;
        *self.stats.pause_dist.entry(bucket).or_insert(0) += 1;
        self.stats.abandoned_sessions += 1;
    }

    pub fn record_cancel(&mut self, mode: SessionMode) {
        if mode != SessionMode::Focus {
            return;
        }
        self.revision += 1;
        self.stats.abandoned_sessions += 1;
    }

    pub fn record_break_completion(&mut self) {
        self.revision += 1;
        self.stats.breaks_completed += 1;
    }

    pub fn record_extension(&mut self) {
        self.revision += 1;
        self.stats.flow_extensions += 1;
    }

    /// Task provider reported a task as done.
    pub fn record_task_completed(&mut self) {
        self.revision += 1;
        self.stats.tasks_completed += 1;
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new(StatsAggregate::default(), DEFAULT_DAILY_GOAL)
    }
}

/// Shared handle serializing all access through one mutex.
///
/// Readers get cloned snapshots, so analytics never observe a half-applied
/// update.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle(Arc<Mutex<StatsAggregator>>);

impl StatsHandle {
    pub fn new(aggregator: StatsAggregator) -> Self {
        Self(Arc::new(Mutex::new(aggregator)))
    }

    fn lock(&self) -> MutexGuard<'_, StatsAggregator> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut StatsAggregator) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn read<R>(&self, f: impl FnOnce(&StatsAggregator) -> R) -> R {
        f(&self.lock())
    }

    pub fn snapshot(&self) -> StatsAggregate {
        self.lock().stats().clone()
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskList;
    use chrono::{TimeZone, Utc};

    fn local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, 0, 0).earliest().unwrap()
    }

    fn focus(agg: &mut StatsAggregator, minutes: u64, at: DateTime<Local>) -> CompletionOutcome {
        let mut tasks = TaskList::new();
        agg.record_completion(SessionMode::Focus, minutes, false, None, at, &mut tasks)
            .unwrap()
    }

    #[test]
    fn same_day_streak_is_idempotent() {
        let mut agg = StatsAggregator::default();
        focus(&mut agg, 25, local(2026, 3, 10, 9));
        focus(&mut agg, 25, local(2026, 3, 10, 15));
        assert_eq!(agg.stats().current_streak, 1);
        assert_eq!(agg.stats().minutes_on(local(2026, 3, 10, 9).date_naive()), 50);
    }

    #[test]
    fn consecutive_days_extend_and_gaps_reset() {
        let mut agg = StatsAggregator::default();
        focus(&mut agg, 25, local(2026, 3, 10, 9));
        focus(&mut agg, 25, local(2026, 3, 11, 9));
        focus(&mut agg, 25, local(2026, 3, 12, 9));
        assert_eq!(agg.stats().current_streak, 3);
        focus(&mut agg, 25, local(2026, 3, 20, 9));
        assert_eq!(agg.stats().current_streak, 1);
        assert_eq!(agg.stats().best_streak, 3);
    }

    #[test]
    fn late_completion_for_earlier_day_keeps_streak() {
        let mut agg = StatsAggregator::default();
        focus(&mut agg, 25, local(2026, 3, 10, 9));
        focus(&mut agg, 25, local(2026, 3, 11, 9));
        focus(&mut agg, 25, local(2026, 3, 9, 22));
        assert_eq!(agg.stats().current_streak, 2);
        assert_eq!(
            agg.stats().last_active_date,
            NaiveDate::from_ymd_opt(2026, 3, 11)
        );
        assert_eq!(agg.stats().daily_history.len(), 3);
    }

    #[test]
    fn perfect_day_fires_once_on_crossing() {
        let mut agg = StatsAggregator::new(StatsAggregate::default(), 120);
        assert!(!focus(&mut agg, 60, local(2026, 3, 10, 9)).perfect_day);
        assert!(focus(&mut agg, 60, local(2026, 3, 10, 10)).perfect_day);
        assert!(!focus(&mut agg, 60, local(2026, 3, 10, 11)).perfect_day);
        assert_eq!(agg.stats().perfect_days, 1);
    }

    #[test]
    fn hourly_and_weekly_buckets() {
        let mut agg = StatsAggregator::default();
        // 2026-03-10 is a Tuesday.
        focus(&mut agg, 25, local(2026, 3, 10, 23));
        assert_eq!(agg.stats().hourly_activity[23], 25);
        assert_eq!(agg.stats().weekly_hourly[2][23], 25);
    }

    #[test]
    fn attribution_credits_category_priority_and_task() {
        let mut agg = StatsAggregator::default();
        let mut tasks = TaskList::new();
        let mut task = Task::new("Essay", Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        task.category = Some("Study".into());
        task.priority = Some(4);
        let id = tasks.add(task).id.clone();
        let active = tasks.get(&id).cloned();

        agg.record_completion(
            SessionMode::Focus,
            25,
            false,
            active.as_ref(),
            local(2026, 3, 10, 9),
            &mut tasks,
        );
        assert_eq!(agg.stats().category_dist.get("Study"), Some(&25));
        assert_eq!(agg.stats().priority_dist.get(&4), Some(&25));
        assert_eq!(tasks.get(&id).unwrap().completed_units, 1);
        assert_eq!(agg.stats().growth_units, 1);
    }

    #[test]
    fn extension_adds_minutes_only() {
        let mut agg = StatsAggregator::default();
        let mut tasks = TaskList::new();
        let id = tasks.add(Task::new("Code", Utc::now())).id.clone();
        let active = tasks.get(&id).cloned();
        let at = local(2026, 3, 10, 9);

        agg.record_completion(SessionMode::Focus, 25, false, active.as_ref(), at, &mut tasks);
        agg.record_completion(SessionMode::Focus, 15, true, active.as_ref(), at, &mut tasks);

        assert_eq!(agg.stats().session_count(SessionMode::Focus), 1);
        assert_eq!(agg.stats().total_minutes, 40);
        assert_eq!(agg.stats().minutes_on(at.date_naive()), 40);
        assert_eq!(agg.stats().category_dist.get("General"), Some(&40));
        assert_eq!(tasks.get(&id).unwrap().completed_units, 1);
        assert_eq!(agg.stats().growth_units, 1);
    }

    #[test]
    fn break_completion_counts_mode_only() {
        let mut agg = StatsAggregator::default();
        let mut tasks = TaskList::new();
        let outcome = agg.record_completion(
            SessionMode::ShortBreak,
            5,
            false,
            None,
            local(2026, 3, 10, 9),
            &mut tasks,
        );
        agg.record_break_completion();
        assert!(outcome.is_none());
        assert_eq!(agg.stats().session_count(SessionMode::ShortBreak), 1);
        assert_eq!(agg.stats().breaks_completed, 1);
        assert_eq!(agg.stats().total_minutes, 0);
        assert!(agg.stats().daily_history.is_empty());
    }

    #[test]
    fn pause_at_thirty_percent() {
        let mut agg = StatsAggregator::default();
        agg.record_pause(SessionMode::Focus, 30.0);
        assert_eq!(agg.stats().pause_dist.get(&PauseBucket::SecondQuarter), Some(&1));
        assert_eq!(agg.stats().abandoned_sessions, 1);
        assert_eq!(agg.stats().total_pauses, 1);

        agg.record_pause(SessionMode::ShortBreak, 30.0);
        assert_eq!(agg.stats().total_pauses, 1);
    }

    #[test]
    fn cancel_counts_focus_only() {
        let mut agg = StatsAggregator::default();
        agg.record_cancel(SessionMode::Focus);
        agg.record_cancel(SessionMode::LongBreak);
        assert_eq!(agg.stats().abandoned_sessions, 1);
    }

    #[test]
    fn handle_serializes_updates() {
        let handle = StatsHandle::default();
        let clone = handle.clone();
        clone.update(|agg| agg.record_extension());
        handle.update(|agg| agg.record_task_completed());
        let snap = handle.snapshot();
        assert_eq!(snap.flow_extensions, 1);
        assert_eq!(snap.tasks_completed, 1);
        assert_eq!(handle.revision(), 2);
    }
}
