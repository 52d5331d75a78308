//! Randomized chaos scheduling.
//!
//! One [`ScheduleBuilder`] invocation turns a batch of crawled machines into a
//! [`Schedule`]: a single session id, a single execution time drawn uniformly
//! from `[1, window]` minutes after `now`, and one record per machine whose
//! power state maps to an actionable chaos action.
//!
//! Nothing is deduplicated here; the store upserts by target.

mod builder;


pub use self::builder::{build_schedule, Schedule, ScheduleBuilder};
