//! Read-side analytics.
//!
//! Pure functions over a [`StatsAggregate`] snapshot and the task list. They
//! are cheap enough to recompute on demand and all return a neutral value
//! (zero, `None` or a "no data" variant) for a brand-new user.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::stats::StatsAggregate;
use crate::task::Task;
use crate::timer::SessionMode;

/// Hours counted as late-night work.
const NIGHT_HOURS: [usize; 4] = [22, 23, 0, 1];

/// Months covered by [`monthly_velocity`].
const VELOCITY_MONTHS: u32 = 6;

/// Share of focus sessions that were finished rather than interrupted, 0..=1.
pub fn flow_score(stats: &StatsAggregate) -> f64 {
    let completed = stats.session_count(SessionMode::Focus);
    ratio(completed, completed + stats.abandoned_sessions)
}

/// Hour of day with the most focus minutes. Earliest hour wins a tie.
pub fn golden_hour(stats: &StatsAggregate) -> Option<u8> {
    let mut best: Option<(usize, u64)> = None;
    for (hour, &minutes) in stats.hourly_activity.iter().enumerate() {
        if minutes > 0 && best.map_or(true, |(_, max)| minutes > max) {
            best = Some((hour, minutes));
        }
    }
    best.and_then(|(hour, _)| u8::try_from(hour).ok())
}

/// Average focus minutes per day since install, counting the install day
/// and today as whole days.
pub fn daily_average_minutes(stats: &StatsAggregate, today: NaiveDate) -> f64 {
    let days = stats
        .install_date
        .map(|installed| (today - installed).num_days() + 1)
        .unwrap_or(1)
        .max(1);
    stats.total_minutes as f64 / days as f64
}

pub fn today_minutes(stats: &StatsAggregate, today: NaiveDate) -> u64 {
    stats.minutes_on(today)
}

/// Completed units against estimates, over completed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "percent", rename_all = "snake_case")]
pub enum EstimationAccuracy {
    NoData,
    /// Tasks were completed without any focus sessions logged against them.
    NeedsFocus,
    Underestimating(u32),
    Overestimating(u32),
    Accurate(u32),
}

impl EstimationAccuracy {
    pub fn percent(self) -> Option<u32> {
        match self {
            Self::NoData => None,
            Self::NeedsFocus => Some(0),
            Self::Underestimating(p) | Self::Overestimating(p) | Self::Accurate(p) => Some(p),
        }
    }
}

impl fmt::Display for EstimationAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no data"),
            Self::NeedsFocus => write!(f, "needs focus"),
            Self::Underestimating(p) => write!(f, "underestimating ({p}%)"),
            Self::Overestimating(p) => write!(f, "overestimating ({p}%)"),
            Self::Accurate(p) => write!(f, "spot on ({p}%)"),
        }
    }
}

pub fn estimation_accuracy(tasks: &[Task]) -> EstimationAccuracy {
    let completed_tasks: Vec<&Task> = tasks.iter().filter(|t| t.completed).collect();
    if completed_tasks.is_empty() {
        return EstimationAccuracy::NoData;
    }
    let estimated: u64 = completed_tasks
        .iter()
        .map(|t| u64::from(t.estimated_units.max(1)))
        .sum();
    let completed: u64 = completed_tasks
        .iter()
        .map(|t| u64::from(t.completed_units))
        .sum();
    if completed == 0 {
        return EstimationAccuracy::NeedsFocus;
    }
    let percent = (completed as f64 / estimated as f64 * 100.0).round() as u32;
    match percent {
        p if p > 120 => EstimationAccuracy::Underestimating(p),
        p if p < 80 => EstimationAccuracy::Overestimating(p),
        p => EstimationAccuracy::Accurate(p),
    }
}

/// Mean delay between creating and completing a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum ProcrastinationIndex {
    NoData,
    Hours(u64),
    Days(u64),
}

impl fmt::Display for ProcrastinationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData => write!(f, "no data"),
            Self::Hours(h) => write!(f, "{h} hours"),
            Self::Days(d) => write!(f, "{d} days"),
        }
    }
}

pub fn procrastination_index(tasks: &[Task]) -> ProcrastinationIndex {
    let delays: Vec<i64> = tasks
        .iter()
        .filter(|t| t.completed)
        .filter_map(|t| Some((t.completed_at? - t.created_at?).num_milliseconds()))
        .filter(|&ms| ms > 0)
        .collect();
    if delays.is_empty() {
        return ProcrastinationIndex::NoData;
    }
    let mean_ms = delays.iter().map(|&ms| ms as f64).sum::<f64>() / delays.len() as f64;
    let hours = (mean_ms / 3_600_000.0).round() as u64;
    if hours > 24 {
        ProcrastinationIndex::Days((hours as f64 / 24.0).round() as u64)
    } else {
        ProcrastinationIndex::Hours(hours)
    }
}

/// Category with the most completed tasks; first encountered wins a tie.
pub fn category_champion(tasks: &[Task]) -> Option<String> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for task in tasks.iter().filter(|t| t.completed) {
        let category = task.category_or_default();
        if !counts.contains_key(category) {
            order.push(category);
        }
        *counts.entry(category).or_insert(0) += 1;
    }

    let mut champion: Option<(&str, u64)> = None;
    for category in order {
        let count = counts.get(category).copied().unwrap_or(0);
        if champion.map_or(true, |(_, best)| count > best) {
            champion = Some((category, count));
        }
    }
    champion.map(|(category, _)| category.to_string())
}

/// Fraction of hourly activity in the late-night hours, 0..=1.
pub fn night_owl_score(stats: &StatsAggregate) -> f64 {
    let late: u64 = NIGHT_HOURS.iter().map(|&h| stats.hourly_activity[h]).sum();
    let total: u64 = stats.hourly_activity.iter().sum();
    ratio(late, total)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekSplit {
    pub weekday_pct: f64,
    pub weekend_pct: f64,
}

pub fn week_split(stats: &StatsAggregate) -> WeekSplit {
    let (weekday, weekend) =
        stats
            .daily_history
            .iter()
            .fold((0u64, 0u64), |(wd, we), (date, &minutes)| {
                match date.weekday() {
                    Weekday::Sat | Weekday::Sun => (wd, we + minutes),
                    _ => (wd + minutes, we),
                }
            });
    let total = weekday + weekend;
    WeekSplit {
        weekday_pct: ratio(weekday, total) * 100.0,
        weekend_pct: ratio(weekend, total) * 100.0,
    }
}

/// Focus hours per calendar month for the six months ending with `today`'s,
/// oldest first, keyed `YYYY-MM`. Empty months are included as zero.
pub fn monthly_velocity(stats: &StatsAggregate, today: NaiveDate) -> Vec<(String, f64)> {
    let current = today.year() * 12 + today.month0() as i32;
    (0..VELOCITY_MONTHS as i32)
        .rev()
        .map(|back| {
            let index = current - back;
            let (year, month) = (index.div_euclid(12), index.rem_euclid(12) as u32 + 1);
            let minutes: u64 = stats
                .daily_history
                .iter()
                .filter(|(date, _)| date.year() == year && date.month() == month)
                .map(|(_, &m)| m)
                .sum();
            (format!("{year:04}-{month:02}"), minutes as f64 / 60.0)
        })
        .collect()
}

/// Share of focus sessions that were interrupted, in percent.
pub fn abandonment_rate(stats: &StatsAggregate) -> f64 {
    let completed = stats.session_count(SessionMode::Focus);
    ratio(stats.abandoned_sessions, completed + stats.abandoned_sessions) * 100.0
}

/// Average pauses per full focus session.
pub fn flow_depth(stats: &StatsAggregate) -> f64 {
    let sessions = stats.session_count(SessionMode::Focus).max(1);
    stats.total_pauses as f64 / sessions as f64
}

/// Share of attributed minutes spent on priority 3 and 4 tasks, in percent.
pub fn priority_focus(stats: &StatsAggregate) -> f64 {
    let high: u64 = stats
        .priority_dist
        .iter()
        .filter(|(priority, _)| **priority >= 3)
        .map(|(_, &m)| m)
        .sum();
    let total: u64 = stats.priority_dist.values().sum();
    ratio(high, total) * 100.0
}

pub fn completion_rate(tasks: &[Task]) -> f64 {
    let done = tasks.iter().filter(|t| t.completed).count() as u64;
    ratio(done, tasks.len() as u64) * 100.0
}

/// Weekday x hour minutes scaled so the busiest cell is 1.0.
pub fn weekly_heatmap(stats: &StatsAggregate) -> [[f64; 24]; 7] {
    let max = stats
        .weekly_hourly
        .iter()
        .flat_map(|row| row.iter())
        .copied()
        .max()
        .unwrap_or(0);
    let mut heatmap = [[0.0; 24]; 7];
    if max == 0 {
        return heatmap;
    }
    for (out, row) in heatmap.iter_mut().zip(&stats.weekly_hourly) {
        for (cell, &minutes) in out.iter_mut().zip(row) {
            *cell = minutes as f64 / max as f64;
        }
    }
    heatmap
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Every derivation at once, for dashboards and `nook stats analytics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub today_minutes: u64,
    pub flow_score: f64,
    pub golden_hour: Option<u8>,
    pub daily_average_minutes: f64,
    pub estimation_accuracy: EstimationAccuracy,
    pub procrastination_index: ProcrastinationIndex,
    pub category_champion: Option<String>,
    pub night_owl_score: f64,
    pub week_split: WeekSplit,
    pub monthly_velocity: Vec<(String, f64)>,
    pub abandonment_rate: f64,
    pub flow_depth: f64,
    pub priority_focus: f64,
    pub completion_rate: f64,
    pub weekly_heatmap: [[f64; 24]; 7],
    pub current_streak: u32,
    pub best_streak: u32,
    pub perfect_days: u32,
}

impl AnalyticsReport {
    pub fn build(stats: &StatsAggregate, tasks: &[Task], today: NaiveDate) -> Self {
        Self {
            today_minutes: today_minutes(stats, today),
            flow_score: flow_score(stats),
            golden_hour: golden_hour(stats),
            daily_average_minutes: daily_average_minutes(stats, today),
            estimation_accuracy: estimation_accuracy(tasks),
            procrastination_index: procrastination_index(tasks),
            category_champion: category_champion(tasks),
            night_owl_score: night_owl_score(stats),
            week_split: week_split(stats),
            monthly_velocity: monthly_velocity(stats, today),
            abandonment_rate: abandonment_rate(stats),
            flow_depth: flow_depth(stats),
            priority_focus: priority_focus(stats),
            completion_rate: completion_rate(tasks),
            weekly_heatmap: weekly_heatmap(stats),
            current_streak: stats.current_streak,
            best_streak: stats.best_streak,
            perfect_days: stats.perfect_days,
        }
    }
}

/// Label a golden hour as `H:00 - H+1:00`.
pub fn hour_window(hour: u8) -> String {
    format!("{hour}:00 - {}:00", (hour + 1) % 24)
}
