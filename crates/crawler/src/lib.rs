//! Fleet crawler and chaos schedule writer.
//!
//! This crate provides:
//! - The [`ResourceInventory`] seam and a JSON snapshot implementation
//! - [`CrawlOrchestrator`]: per-group crawl, schedule, and atomic persistence
//! - Cycle reports and error records for dropped groups and partitions

pub mod entities;
pub mod error;
pub mod inventory;
pub mod orchestrator;
pub mod report;

pub use entities::{CrawlErrorRecord, ScaleSetCrawlEntity};
pub use error::{CrawlError, InventoryError};
pub use inventory::{FleetSnapshot, ResourceInventory, SnapshotInventory};
pub use orchestrator::CrawlOrchestrator;
pub use report::{CrawlFailure, CycleReport, FailureStage, GroupReport, SessionSummary};
