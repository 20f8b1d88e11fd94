mod engine;
mod mode;

pub use engine::{CompletionEvent, Tick, TimerEngine, TimerSnapshot, TimerStatus};
pub use mode::{Durations, SessionMode};
