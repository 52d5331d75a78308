//! Chaos rule engine.
//!
//! This crate provides:
//! - Power state → chaos action classification with configurable overrides
//! - Randomized, session-scoped schedule building
//! - Partition-key grouping for atomic store batches

pub mod classifier;
pub mod partition;
pub mod schedule;

pub use classifier::{classify, classify_label, ActionRules};
pub use partition::{assemble, group_by_partition};
pub use schedule::{build_schedule, Schedule, ScheduleBuilder};
