//! Queue occupancy and timing statistics.

pub mod stats;

pub use stats::{DurationSummary, QueueStatsAggregator, TeamQueueStats};
