//! Chaos actions and the scheduled work records written for the executor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keys::row_key;
use crate::machine::{partition_key_for, VmGroup};

/// Power operation scheduled against a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChaosAction {
    PowerOff,
    Start,
    /// No eligible action. Never persisted.
    Unknown,
}

impl ChaosAction {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, ChaosAction::Unknown)
    }

    /// Lenient parse used for configuration overrides.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "poweroff" | "power_off" | "power-off" | "off" => Some(ChaosAction::PowerOff),
            "start" | "on" => Some(ChaosAction::Start),
            "unknown" | "none" | "skip" => Some(ChaosAction::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for ChaosAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChaosAction::PowerOff => write!(f, "PowerOff"),
            ChaosAction::Start => write!(f, "Start"),
            ChaosAction::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Which group-specific metadata a schedule carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleVariant {
    Standard,
    /// Copies each machine's availability zone.
    AvailabilityZone,
    /// Copies fault and update domains. `domain_flag = true` selects
    /// fault-domain semantics, `false` update-domain semantics.
    AvailabilitySet { domain_flag: bool },
}

impl fmt::Display for ScheduleVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleVariant::Standard => write!(f, "standard"),
            ScheduleVariant::AvailabilityZone => write!(f, "availability_zone"),
            ScheduleVariant::AvailabilitySet { domain_flag: true } => write!(f, "fault_domain"),
            ScheduleVariant::AvailabilitySet { domain_flag: false } => write!(f, "update_domain"),
        }
    }
}

/// One unit of future chaos work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledActionRecord {
    /// Shared by every record of one schedule build.
    pub session_id: Uuid,
    pub target_resource_id: String,
    pub resource_name: String,
    pub resource_group: String,
    pub action: ChaosAction,
    pub execution_time: DateTime<Utc>,
    pub group: VmGroup,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_domain: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_domain: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_flag: Option<bool>,
}

impl ScheduledActionRecord {
    /// Partition key for the schedule table.
    ///
    /// Falls back to the resource group if a member record lost its set id;
    /// records built by the schedule builder always carry it.
    pub fn partition_key(&self) -> String {
        partition_key_for(
            self.group,
            &self.resource_group,
            self.scale_set_id.as_deref(),
            self.availability_set_id.as_deref(),
        )
        .unwrap_or_else(|| crate::keys::transliterate(&self.resource_group))
    }

    /// Row key: upserts are keyed on the target, not the session.
    pub fn row_key(&self) -> String {
        row_key(&self.target_resource_id)
    }

    /// The domain number selected by `domain_flag`.
    pub fn domain(&self) -> Option<i32> {
        match self.domain_flag? {
            true => self.fault_domain,
            false => self.update_domain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(group: VmGroup) -> ScheduledActionRecord {
        ScheduledActionRecord {
            session_id: Uuid::nil(),
            target_resource_id: "/subs/s/resourceGroups/rg/vm/vm-1".into(),
            resource_name: "vm-1".into(),
            resource_group: "rg".into(),
            action: ChaosAction::PowerOff,
            execution_time: Utc::now(),
            group,
            scale_set_id: None,
            availability_set_id: None,
            availability_zone: None,
            fault_domain: Some(1),
            update_domain: Some(4),
            domain_flag: None,
        }
    }

    #[test]
    fn action_parse() {
        assert_eq!(ChaosAction::parse("PowerOff"), Some(ChaosAction::PowerOff));
        assert_eq!(ChaosAction::parse("start"), Some(ChaosAction::Start));
        assert_eq!(ChaosAction::parse("skip"), Some(ChaosAction::Unknown));
        assert_eq!(ChaosAction::parse("reboot"), None);
        assert!(!ChaosAction::Unknown.is_actionable());
    }

    #[test]
    fn keys_for_standalone() {
        let r = record(VmGroup::Standalone);
        assert_eq!(r.partition_key(), "rg");
        assert_eq!(r.row_key(), "!subs!s!resourceGroups!rg!vm!vm-1");
    }

    #[test]
    fn keys_for_scale_set_member() {
        let mut r = record(VmGroup::ScaleSetMember);
        r.scale_set_id = Some("/subs/s/ss-1".into());
        assert_eq!(r.partition_key(), "!subs!s!ss-1");
    }

    #[test]
    fn domain_follows_flag() {
        let mut r = record(VmGroup::AvailabilitySetMember);
        assert_eq!(r.domain(), None);
        r.domain_flag = Some(true);
        assert_eq!(r.domain(), Some(1));
        r.domain_flag = Some(false);
        assert_eq!(r.domain(), Some(4));
    }

    #[test]
    fn variant_serde_shape() {
        let json = serde_json::to_string(&ScheduleVariant::AvailabilitySet { domain_flag: true }).unwrap();
        assert_eq!(json, r#"{"kind":"availability_set","domain_flag":true}"#);
    }
}
