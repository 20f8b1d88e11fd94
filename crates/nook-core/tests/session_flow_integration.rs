//! Integration tests for the session orchestrator driving stats.

use chrono::{Local, TimeZone};
use nook_core::stats::PauseBucket;
use nook_core::storage::{load_json, save_json};
use nook_core::{
    Clock, Event, ManualClock, MemoryStore, Orchestrator, SessionMode, SessionSettings,
    SessionState, StatsAggregator, StatsHandle, TaskList, TimerStatus,
};

fn morning_clock() -> ManualClock {
    let start = Local
        .with_ymd_and_hms(2026, 3, 10, 9, 0, 0)
        .earliest()
        .unwrap();
    ManualClock::at_local(start)
}

fn finish_countdown(clock: &ManualClock, orch: &mut Orchestrator<ManualClock, TaskList>) -> Vec<Event> {
    let remaining = orch.state().engine.remaining_secs(clock.now_ms().unwrap());
    clock.advance_secs(remaining as i64);
    orch.tick().unwrap()
}

#[test]
fn test_four_sessions_earn_a_long_break() {
    let clock = morning_clock();
    let mut orch = Orchestrator::new(
        clock.clone(),
        SessionSettings::default(),
        StatsHandle::default(),
        TaskList::new(),
    );

    let mut selected = Vec::new();
    for _ in 0..4 {
        orch.start().unwrap();
        finish_countdown(&clock, &mut orch);
        for event in orch.take_break().unwrap() {
            if let Event::BreakSelected { mode, .. } = event {
                selected.push(mode);
            }
        }
        orch.start().unwrap();
        finish_countdown(&clock, &mut orch);
    }

    assert_eq!(
        selected,
        vec![
            SessionMode::ShortBreak,
            SessionMode::ShortBreak,
            SessionMode::ShortBreak,
            SessionMode::LongBreak,
        ]
    );
    let stats = orch.stats().snapshot();
    assert_eq!(stats.session_count(SessionMode::Focus), 4);
    assert_eq!(stats.session_count(SessionMode::ShortBreak), 3);
    assert_eq!(stats.session_count(SessionMode::LongBreak), 1);
    assert_eq!(stats.total_minutes, 100);
}

#[test]
fn test_two_hour_goal_reached_once() {
    let clock = morning_clock();
    let settings = SessionSettings {
        durations: nook_core::Durations {
            focus: 60,
            ..Default::default()
        },
        daily_goal_min: 120,
        ..SessionSettings::default()
    };
    let mut orch = Orchestrator::new(
        clock.clone(),
        settings,
        StatsHandle::default(),
        TaskList::new(),
    );

    for _ in 0..3 {
        orch.start().unwrap();
        finish_countdown(&clock, &mut orch);
        orch.switch_mode(SessionMode::Focus).unwrap();
    }

    let stats = orch.stats().snapshot();
    assert_eq!(stats.perfect_days, 1);
    assert_eq!(stats.current_streak, 1);
    assert_eq!(stats.daily_history.values().copied().sum::<u64>(), 180);
}

#[test]
fn test_extension_then_break_counts_minutes_once() {
    let clock = morning_clock();
    let mut orch = Orchestrator::new(
        clock.clone(),
        SessionSettings::default(),
        StatsHandle::default(),
        TaskList::new(),
    );

    orch.start().unwrap();
    finish_countdown(&clock, &mut orch);
    orch.extend().unwrap();
    let events = finish_countdown(&clock, &mut orch);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::TimerCompleted {
            was_extension: true,
            minutes: 15,
            ..
        }
    )));
    orch.take_break().unwrap();

    let stats = orch.stats().snapshot();
    assert_eq!(stats.session_count(SessionMode::Focus), 1);
    assert_eq!(stats.total_minutes, 40);
    let today = Local
        .with_ymd_and_hms(2026, 3, 10, 9, 0, 0)
        .earliest()
        .unwrap()
        .date_naive();
    assert_eq!(stats.minutes_on(today), 40);
}

#[test]
fn test_pause_at_thirty_percent() {
    let clock = morning_clock();
    let mut orch = Orchestrator::new(
        clock.clone(),
        SessionSettings::default(),
        StatsHandle::default(),
        TaskList::new(),
    );

    orch.start().unwrap();
    clock.advance_secs(450);
    orch.pause_session().unwrap();

    let stats = orch.stats().snapshot();
    assert_eq!(stats.pause_dist.get(&PauseBucket::SecondQuarter), Some(&1));
    assert_eq!(stats.abandoned_sessions, 1);
    assert_eq!(stats.total_pauses, 1);
}

#[test]
fn test_state_survives_a_restart_mid_countdown() {
    let store = MemoryStore::new();
    let clock = morning_clock();
    let mut orch = Orchestrator::new(
        clock.clone(),
        SessionSettings::default(),
        StatsHandle::default(),
        TaskList::new(),
    );
    orch.start().unwrap();
    clock.advance_secs(60);
    save_json(&store, SessionState::STORE_KEY, orch.state()).unwrap();
    save_json(&store, StatsAggregator::STORE_KEY, &orch.stats().snapshot()).unwrap();
    drop(orch);

    // The process sleeps through the end of the countdown.
    clock.advance_secs(3 * 3600);
    let state: SessionState = load_json(&store, SessionState::STORE_KEY).unwrap().unwrap();
    let today = Local
        .with_ymd_and_hms(2026, 3, 10, 12, 0, 0)
        .earliest()
        .unwrap()
        .date_naive();
    let stats = StatsHandle::new(StatsAggregator::load(&store, 120, today));
    let mut orch = Orchestrator::with_state(
        clock.clone(),
        state,
        SessionSettings::default(),
        stats,
        TaskList::new(),
    );
    assert_eq!(orch.state().engine.status(), TimerStatus::Running);

    let events = orch.tick().unwrap();
    match &events[0] {
        Event::TimerCompleted { minutes, at, .. } => {
            assert_eq!(*minutes, 25);
            let expected = Local
                .with_ymd_and_hms(2026, 3, 10, 9, 25, 0)
                .earliest()
                .unwrap();
            assert_eq!(at.timestamp(), expected.timestamp());
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert!(orch.is_awaiting_decision());
}

#[test]
fn test_commands_during_intermission_are_rejected() {
    let clock = morning_clock();
    let mut orch = Orchestrator::new(
        clock.clone(),
        SessionSettings::default(),
        StatsHandle::default(),
        TaskList::new(),
    );
    orch.start().unwrap();
    finish_countdown(&clock, &mut orch);

    let err = orch.pause_session().unwrap_err();
    assert!(err.is_ignorable());
    assert!(orch.cancel().is_err());
    assert!(orch.is_awaiting_decision());
}
