//! The durable statistics record.
//!
//! Persisted as camelCase JSON. Reading is deliberately lenient: every field
//! is decoded on its own, and a field that fails to decode falls back to its
//! default instead of discarding the whole record. Older shapes that used
//! `sessions`, `minutes` and `streak` are still understood.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::storage::FieldReader;
use crate::timer::SessionMode;

/// Quartile of elapsed session progress in which a pause happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PauseBucket {
    #[serde(rename = "0-25")]
    FirstQuarter,
    #[serde(rename = "25-50")]
    SecondQuarter,
    #[serde(rename = "50-75")]
    ThirdQuarter,
    #[serde(rename = "75-100")]
    LastQuarter,
}

impl PauseBucket {
    pub fn from_progress(progress_pct: f64) -> Self {
        match progress_pct {
            p if p < 25.0 => PauseBucket::FirstQuarter,
            p if p < 50.0 => PauseBucket::SecondQuarter,
            p if p < 75.0 => PauseBucket::ThirdQuarter,
            _ => PauseBucket::LastQuarter,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PauseBucket::FirstQuarter => "0-25",
            PauseBucket::SecondQuarter => "25-50",
            PauseBucket::ThirdQuarter => "50-75",
            PauseBucket::LastQuarter => "75-100",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct StatsAggregate {
    pub total_minutes: u64,
    pub session_counts: BTreeMap<SessionMode, u64>,
    pub daily_history: BTreeMap<NaiveDate, u64>,
    /// Minutes per hour of day.
    pub hourly_activity: [u64; 24],
    /// Minutes per day of week (Sunday = 0) and hour of day.
    pub weekly_hourly: [[u64; 24]; 7],
    pub category_dist: BTreeMap<String, u64>,
    pub priority_dist: BTreeMap<u8, u64>,
    pub current_streak: u32,
    pub best_streak: u32,
    pub last_active_date: Option<NaiveDate>,
    pub perfect_days: u32,
    pub breaks_completed: u64,
    pub flow_extensions: u64,
    pub total_pauses: u64,
    pub abandoned_sessions: u64,
    pub pause_dist: BTreeMap<PauseBucket, u64>,
    /// Garden growth currency, one per full focus session.
    pub growth_units: u64,
    pub tasks_completed: u64,
    pub install_date: Option<NaiveDate>,
}

impl Default for StatsAggregate {
    fn default() -> Self {
        Self {
            total_minutes: 0,
            session_counts: BTreeMap::new(),
            daily_history: BTreeMap::new(),
            hourly_activity: [0; 24],
            weekly_hourly: [[0; 24]; 7],
            category_dist: BTreeMap::new(),
            priority_dist: BTreeMap::new(),
            current_streak: 0,
            best_streak: 0,
            last_active_date: None,
            perfect_days: 0,
            breaks_completed: 0,
            flow_extensions: 0,
            total_pauses: 0,
            abandoned_sessions: 0,
            pause_dist: BTreeMap::new(),
            growth_units: 0,
            tasks_completed: 0,
            install_date: None,
        }
    }
}

impl StatsAggregate {
    pub fn session_count(&self, mode: SessionMode) -> u64 {
        self.session_counts.get(&mode).copied().unwrap_or(0)
    }

    pub fn minutes_on(&self, date: NaiveDate) -> u64 {
        self.daily_history.get(&date).copied().unwrap_or(0)
    }

    /// Decode a persisted record, defaulting each field that is missing or
    /// malformed. Returns the names of fields that had to be defaulted
    /// because they were present but unreadable.
    pub fn from_value_lenient(value: &Value) -> (Self, Vec<String>) {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None if value.is_null() => return (Self::default(), Vec::new()),
            None => return (Self::default(), vec!["<record>".to_string()]),
        };
        let mut fields = FieldReader::new(obj);

        let session_counts = fields.read("sessionCounts").unwrap_or_else(|| {
            fields
                .read::<u64>("sessions")
                .map(|n| BTreeMap::from([(SessionMode::Focus, n)]))
                .unwrap_or_default()
        });
        let total_minutes: u64 = fields
            .read("totalMinutes")
            .or_else(|| fields.read("minutes"))
            .unwrap_or_default();
        let current_streak: u32 = fields
            .read("currentStreak")
            .or_else(|| fields.read("streak"))
            .unwrap_or_default();
        let best_streak: u32 = fields.read("bestStreak").unwrap_or_default();

        let mut hourly_activity = [0; 24];
        if let Some(hours) = fields.read::<Vec<u64>>("hourlyActivity") {
            for (slot, minutes) in hourly_activity.iter_mut().zip(hours) {
                *slot = minutes;
            }
        }
        let mut weekly_hourly = [[0; 24]; 7];
        if let Some(rows) = fields.read::<Vec<Vec<u64>>>("weeklyHourly") {
            for (row, values) in weekly_hourly.iter_mut().zip(rows) {
                for (slot, minutes) in row.iter_mut().zip(values) {
                    *slot = minutes;
                }
            }
        }

        let stats = Self {
            total_minutes,
            session_counts,
            daily_history: fields.read("dailyHistory").unwrap_or_default(),
            hourly_activity,
            weekly_hourly,
            category_dist: fields.read("categoryDist").unwrap_or_default(),
            priority_dist: fields.read("priorityDist").unwrap_or_default(),
            current_streak,
            best_streak: best_streak.max(current_streak),
            last_active_date: fields.read("lastActiveDate").unwrap_or_default(),
            perfect_days: fields.read("perfectDays").unwrap_or_default(),
            breaks_completed: fields.read("breaksCompleted").unwrap_or_default(),
            flow_extensions: fields.read("flowExtensions").unwrap_or_default(),
            total_pauses: fields.read("totalPauses").unwrap_or_default(),
            abandoned_sessions: fields.read("abandonedSessions").unwrap_or_default(),
            pause_dist: fields.read("pauseDist").unwrap_or_default(),
            growth_units: fields.read("growthUnits").unwrap_or_default(),
            tasks_completed: fields.read("tasksCompleted").unwrap_or_default(),
            install_date: fields.read("installDate").unwrap_or_default(),
        };
        (stats, fields.into_defaulted())
    }
}

impl From<Value> for StatsAggregate {
    fn from(value: Value) -> Self {
        let (stats, defaulted) = Self::from_value_lenient(&value);
        if !defaulted.is_empty() {
            warn!(fields = ?defaulted, "malformed persisted stats fields reset to defaults");
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pause_buckets_by_quartile() {
        assert_eq!(PauseBucket::from_progress(0.0), PauseBucket::FirstQuarter);
        assert_eq!(PauseBucket::from_progress(30.0), PauseBucket::SecondQuarter);
        assert_eq!(PauseBucket::from_progress(50.0), PauseBucket::ThirdQuarter);
        assert_eq!(PauseBucket::from_progress(99.9), PauseBucket::LastQuarter);
        assert_eq!(PauseBucket::SecondQuarter.label(), "25-50");
    }

    #[test]
    fn roundtrip_preserves_keys() {
        let mut stats = StatsAggregate::default();
        stats.session_counts.insert(SessionMode::Focus, 3);
        stats.pause_dist.insert(PauseBucket::SecondQuarter, 2);
        stats.priority_dist.insert(4, 50);
        stats
            .daily_history
            .insert(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(), 75);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["sessionCounts"]["focus"], 3);
        assert_eq!(json["pauseDist"]["25-50"], 2);
        assert_eq!(json["dailyHistory"]["2026-03-01"], 75);
        let back: StatsAggregate = serde_json::from_value(json).unwrap();
        assert_eq!(back, stats);
    }

    #[test]
    fn corrupt_field_does_not_lose_the_rest() {
        let raw = json!({
            "totalMinutes": 300,
            "dailyHistory": "garbage",
            "currentStreak": 4,
            "bestStreak": 6,
            "hourlyActivity": [1, 2, 3],
        });
        let (stats, defaulted) = StatsAggregate::from_value_lenient(&raw);
        assert_eq!(stats.total_minutes, 300);
        assert!(stats.daily_history.is_empty());
        assert_eq!(stats.current_streak, 4);
        assert_eq!(stats.best_streak, 6);
        assert_eq!(&stats.hourly_activity[..4], &[1, 2, 3, 0]);
        assert_eq!(defaulted, vec!["dailyHistory".to_string()]);
    }

    #[test]
    fn legacy_shape_is_imported() {
        let raw = json!({
            "sessions": 12,
            "minutes": 300,
            "streak": 3,
            "lastActiveDate": "2026-01-02",
            "categoryDist": { "General": 300 },
        });
        let stats: StatsAggregate = serde_json::from_value(raw).unwrap();
        assert_eq!(stats.session_count(SessionMode::Focus), 12);
        assert_eq!(stats.total_minutes, 300);
        assert_eq!(stats.current_streak, 3);
        assert_eq!(stats.best_streak, 3);
        assert_eq!(stats.last_active_date, NaiveDate::from_ymd_opt(2026, 1, 2));
    }

    #[test]
    fn non_object_record_defaults_everything() {
        let stats: StatsAggregate = serde_json::from_value(json!("oops")).unwrap();
        assert_eq!(stats, StatsAggregate::default());
    }
}
