//! Crawl-state and error rows persisted alongside the schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chaos_core::keys::{row_key, transliterate};
use chaos_core::ScaleSetRecord;

use crate::report::{CrawlFailure, FailureStage};

/// Scale set as stored in the scale-set crawl table. Instances are stored
/// in the machine table, so only the "has instances" bit is kept here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSetCrawlEntity {
    pub resource_id: String,
    pub resource_group: String,
    pub region: String,
    pub name: String,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<i32>,
    pub has_virtual_machines: bool,
    pub observed_at: DateTime<Utc>,
}

impl ScaleSetCrawlEntity {
    pub fn partition_key(&self) -> String {
        transliterate(&self.resource_group)
    }

    pub fn row_key(&self) -> String {
        row_key(&self.resource_id)
    }
}

impl From<&ScaleSetRecord> for ScaleSetCrawlEntity {
    fn from(set: &ScaleSetRecord) -> Self {
        Self {
            resource_id: set.resource_id.clone(),
            resource_group: set.resource_group.clone(),
            region: set.region.clone(),
            name: set.name.clone(),
            resource_type: set.resource_type.clone(),
            availability_zone: set.availability_zone,
            has_virtual_machines: set.has_virtual_machines(),
            observed_at: set.observed_at,
        }
    }
}

/// A failure written to the error table so operators can see which
/// resource group or partition was dropped in a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlErrorRecord {
    pub cycle_id: Uuid,
    pub resource_group: String,
    pub stage: FailureStage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    pub record_count: usize,
    pub occurred_at: DateTime<Utc>,
}

impl CrawlErrorRecord {
    pub fn from_failure(cycle_id: Uuid, failure: &CrawlFailure, occurred_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            resource_group: failure.resource_group.clone(),
            stage: failure.stage,
            message: failure.message.clone(),
            partition_key: failure.partition_key.clone(),
            record_count: failure.record_count,
            occurred_at,
        }
    }

    /// Errors are partitioned by cycle so one cycle's failures read back together.
    pub fn partition_key(&self) -> String {
        self.cycle_id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_set_entity_keys() {
        let set = ScaleSetRecord {
            resource_id: "/s/rg/ss/ss-1".into(),
            resource_group: "rg/odd".into(),
            region: "westeurope".into(),
            name: "ss-1".into(),
            resource_type: chaos_core::SCALE_SET_TYPE.into(),
            availability_zone: Some(1),
            instances: Vec::new(),
            observed_at: Utc::now(),
        };
        let entity = ScaleSetCrawlEntity::from(&set);
        assert!(!entity.has_virtual_machines);
        assert_eq!(entity.partition_key(), "rg!odd");
        assert_eq!(entity.row_key(), "!s!rg!ss!ss-1");
    }

    #[test]
    fn error_record_from_failure() {
        let failure = CrawlFailure {
            resource_group: "rg".into(),
            stage: FailureStage::PersistSchedule,
            message: "boom".into(),
            partition_key: Some("rg".into()),
            record_count: 3,
        };
        let cycle = Uuid::new_v4();
        let record = CrawlErrorRecord::from_failure(cycle, &failure, Utc::now());
        assert_eq!(record.partition_key(), cycle.to_string());
        assert_eq!(record.record_count, 3);
        assert_eq!(record.stage, FailureStage::PersistSchedule);
    }
}
