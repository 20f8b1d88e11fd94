//! Statistics module for Nook
//!
//! The aggregate is the durable record of everything the timer produced:
//! minutes, streaks, histories and distributions. It is only mutated through
//! [`StatsAggregator`]'s named operations.

mod aggregate;
mod aggregator;

pub use aggregate::{PauseBucket, StatsAggregate};
pub use aggregator::{CompletionOutcome, StatsAggregator, StatsHandle, DEFAULT_DAILY_GOAL};
