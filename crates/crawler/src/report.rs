//! Per-cycle outcome reporting.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chaos_core::ScheduleVariant;

/// Where in a group crawl a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    ResolveGroups,
    Enumerate,
    PersistCrawl,
    PersistSchedule,
    CycleTimeout,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::ResolveGroups => "resolve_groups",
            FailureStage::Enumerate => "enumerate",
            FailureStage::PersistCrawl => "persist_crawl",
            FailureStage::PersistSchedule => "persist_schedule",
            FailureStage::CycleTimeout => "cycle_timeout",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlFailure {
    pub resource_group: String,
    pub stage: FailureStage,
    pub message: String,
    /// Set for persistence failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    /// Records lost with this failure.
    pub record_count: usize,
}

impl CrawlFailure {
    pub fn new(resource_group: impl Into<String>, stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            stage,
            message: message.into(),
            partition_key: None,
            record_count: 0,
        }
    }

    pub fn for_partition(mut self, partition_key: impl Into<String>, record_count: usize) -> Self {
        self.partition_key = Some(partition_key.into());
        self.record_count = record_count;
        self
    }
}

/// One schedule build within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub variant: ScheduleVariant,
    pub execution_time: DateTime<Utc>,
    pub scheduled: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub resource_group: String,
    pub machines_seen: usize,
    /// Machines dropped for sitting behind a load balancer.
    pub excluded: usize,
    /// Machines dropped for missing identity or group fields.
    pub malformed: usize,
    pub sessions: Vec<SessionSummary>,
    /// Scheduled records actually written.
    pub scheduled: usize,
    pub batches_written: usize,
    pub failures: Vec<CrawlFailure>,
}

impl GroupReport {
    pub fn new(resource_group: impl Into<String>) -> Self {
        Self {
            resource_group: resource_group.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub groups: Vec<GroupReport>,
    /// Failures not tied to a finished group (group resolution, cycle timeout).
    pub failures: Vec<CrawlFailure>,
    pub timed_out: bool,
}

impl CycleReport {
    pub fn all_failures(&self) -> impl Iterator<Item = &CrawlFailure> {
        self.failures
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.failures.iter()))
    }

    pub fn failure_count(&self) -> usize {
        self.all_failures().count()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    pub fn total_scheduled(&self) -> usize {
        self.groups.iter().map(|g| g.scheduled).sum()
    }

    pub fn group(&self, resource_group: &str) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.resource_group == resource_group)
    }
}
