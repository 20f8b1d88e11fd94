//! # Nook Core Library
//!
//! This library provides the core business logic for the Nook focus timer.
//! It follows a CLI-first philosophy: every operation is available through
//! the standalone `nook` binary, and any GUI is a thin layer over the same
//! core library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: A wall-clock-based countdown that requires the caller
//!   to periodically invoke `tick()` for progress updates
//! - **Session Orchestrator**: Intermission, break selection, auto-chaining
//!   and flow extensions on top of the engine
//! - **Stats**: A single-writer statistics aggregate fed by completions,
//!   pauses and cancellations
//! - **Analytics**: Pure derivations over the aggregate and the task list
//! - **Storage**: Key-value persistence (SQLite or in-memory), debounced
//!   write-back and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: Core countdown state machine
//! - [`Orchestrator`]: Command surface for front ends
//! - [`StatsAggregator`]: Owner of the durable statistics
//! - [`Database`]: Key-value store and completion log
//! - [`Config`]: Application configuration management

pub mod analytics;
pub mod clock;
pub mod error;
pub mod events;
pub mod session;
pub mod stats;
pub mod storage;
pub mod task;
pub mod timer;

pub use analytics::AnalyticsReport;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, PersistenceError, TimerError};
pub use events::Event;
pub use session::{Orchestrator, SessionSettings, SessionState};
pub use stats::{StatsAggregate, StatsAggregator, StatsHandle};
pub use storage::{Config, Database, DebouncedWriter, KvStore, MemoryStore};
pub use task::{Task, TaskList, TaskProvider};
pub use timer::{Durations, SessionMode, TimerEngine, TimerSnapshot, TimerStatus};
