//! Session orchestration: what happens between countdowns.
//!
//! The [`Orchestrator`] drives the [`TimerEngine`](crate::timer::TimerEngine),
//! turns its completions into statistics and decides the next mode
//! (intermission, break selection, auto-chaining, flow extensions).

mod orchestrator;

pub use orchestrator::{Orchestrator, SessionSettings, SessionState};
