//! Crawled machine snapshots.
//!
//! A [`MachineRecord`] is what one crawl cycle observed about one virtual
//! machine, scale-set instance, or availability-set member. Records are plain
//! values: each cycle builds a fresh set and nothing is shared between cycles.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChaosError;
use crate::keys::transliterate;

pub const VIRTUAL_MACHINE_TYPE: &str = "Microsoft.Compute/virtualMachines";
pub const SCALE_SET_TYPE: &str = "Microsoft.Compute/virtualMachineScaleSets";
pub const SCALE_SET_VM_TYPE: &str = "Microsoft.Compute/virtualMachineScaleSets/virtualMachines";

// ── Power state ───────────────────────────────────────────────

/// Provider power state of a machine.
///
/// This is the complete set of states the compute provider reports. Parsing
/// never fails: anything unrecognised becomes [`PowerState::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PowerState {
    Running,
    Starting,
    Stopping,
    Stopped,
    Deallocating,
    Deallocated,
    Unknown,
}

impl PowerState {
    pub const COUNT: usize = 7;

    pub const ALL: [PowerState; Self::COUNT] = [
        PowerState::Running,
        PowerState::Starting,
        PowerState::Stopping,
        PowerState::Stopped,
        PowerState::Deallocating,
        PowerState::Deallocated,
        PowerState::Unknown,
    ];

    /// Lenient parse of a provider label.
    ///
    /// Accepts bare names (`running`, `Running`), the provider code form
    /// (`PowerState/running`) and the display form (`VM running`).
    pub fn parse(label: &str) -> Self {
        let lowered = label.trim().to_ascii_lowercase();
        let name = lowered
            .strip_prefix("powerstate/")
            .or_else(|| lowered.strip_prefix("vm "))
            .unwrap_or(&lowered)
            .trim();

        match name {
            "running" => PowerState::Running,
            "starting" => PowerState::Starting,
            "stopping" => PowerState::Stopping,
            "stopped" => PowerState::Stopped,
            "deallocating" => PowerState::Deallocating,
            "deallocated" => PowerState::Deallocated,
            _ => PowerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::Running => "Running",
            PowerState::Starting => "Starting",
            PowerState::Stopping => "Stopping",
            PowerState::Stopped => "Stopped",
            PowerState::Deallocating => "Deallocating",
            PowerState::Deallocated => "Deallocated",
            PowerState::Unknown => "Unknown",
        }
    }
}

impl FromStr for PowerState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PowerState::parse(s))
    }
}

impl From<String> for PowerState {
    fn from(s: String) -> Self {
        PowerState::parse(&s)
    }
}

impl From<PowerState> for String {
    fn from(state: PowerState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Group ─────────────────────────────────────────────────────

/// How a machine is grouped by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VmGroup {
    Standalone,
    ScaleSetMember,
    AvailabilitySetMember,
}

impl fmt::Display for VmGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmGroup::Standalone => write!(f, "Standalone"),
            VmGroup::ScaleSetMember => write!(f, "ScaleSetMember"),
            VmGroup::AvailabilitySetMember => write!(f, "AvailabilitySetMember"),
        }
    }
}

/// Storage partition key for a resource in the given group.
///
/// Standalone machines partition by resource group, scale-set members by
/// their scale set id, availability-set members by their availability set id.
/// Returns `None` when the id the group needs is missing or blank.
pub fn partition_key_for(
    group: VmGroup,
    resource_group: &str,
    scale_set_id: Option<&str>,
    availability_set_id: Option<&str>,
) -> Option<String> {
    let raw = match group {
        VmGroup::Standalone => Some(resource_group),
        VmGroup::ScaleSetMember => scale_set_id,
        VmGroup::AvailabilitySetMember => availability_set_id,
    }?;
    if raw.trim().is_empty() {
        return None;
    }
    Some(transliterate(raw))
}

/// The provider reports zone `0` for non-zonal resources.
pub fn normalize_zone(zone: Option<i32>) -> Option<i32> {
    zone.filter(|z| *z > 0)
}

// ── MachineRecord ─────────────────────────────────────────────

/// Snapshot of one machine at crawl time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Globally unique hierarchical resource id.
    pub resource_id: String,
    pub resource_group: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resource_type: String,
    pub group: VmGroup,
    /// Present iff `group` is [`VmGroup::ScaleSetMember`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_set_id: Option<String>,
    /// Present iff `group` is [`VmGroup::AvailabilitySetMember`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_domain: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_domain: Option<i32>,
    pub power_state: PowerState,
    pub observed_at: DateTime<Utc>,
}

impl MachineRecord {
    /// A standalone machine observed now. Name is taken from the last id segment.
    pub fn standalone(resource_id: impl Into<String>, resource_group: impl Into<String>) -> Self {
        let resource_id = resource_id.into();
        let name = resource_id
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            resource_id,
            resource_group: resource_group.into(),
            region: String::new(),
            name,
            resource_type: VIRTUAL_MACHINE_TYPE.to_string(),
            group: VmGroup::Standalone,
            scale_set_id: None,
            availability_set_id: None,
            availability_zone: None,
            fault_domain: None,
            update_domain: None,
            power_state: PowerState::Unknown,
            observed_at: Utc::now(),
        }
    }

    /// Turn this record into a member of the given scale set.
    pub fn in_scale_set(mut self, scale_set_id: impl Into<String>) -> Self {
        self.group = VmGroup::ScaleSetMember;
        self.scale_set_id = Some(scale_set_id.into());
        self.availability_set_id = None;
        self.resource_type = SCALE_SET_VM_TYPE.to_string();
        self
    }

    /// Turn this record into a member of the given availability set.
    pub fn in_availability_set(mut self, availability_set_id: impl Into<String>) -> Self {
        self.group = VmGroup::AvailabilitySetMember;
        self.availability_set_id = Some(availability_set_id.into());
        self.scale_set_id = None;
        self
    }

    pub fn with_power_state(mut self, state: PowerState) -> Self {
        self.power_state = state;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_zone(mut self, zone: Option<i32>) -> Self {
        self.availability_zone = normalize_zone(zone);
        self
    }

    pub fn with_domains(mut self, fault_domain: Option<i32>, update_domain: Option<i32>) -> Self {
        self.fault_domain = fault_domain;
        self.update_domain = update_domain;
        self
    }

    /// Check identity fields and the group/id invariants.
    pub fn validate(&self) -> Result<(), ChaosError> {
        if self.resource_id.trim().is_empty() {
            return Err(ChaosError::malformed("", "missing resource id"));
        }
        if self.resource_group.trim().is_empty() {
            return Err(ChaosError::malformed(&self.resource_id, "missing resource group"));
        }
        let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self.group {
            VmGroup::Standalone => {}
            VmGroup::ScaleSetMember if !has(&self.scale_set_id) => {
                return Err(ChaosError::malformed(&self.resource_id, "scale-set member without scale set id"));
            }
            VmGroup::AvailabilitySetMember if !has(&self.availability_set_id) => {
                return Err(ChaosError::malformed(
                    &self.resource_id,
                    "availability-set member without availability set id",
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Partition key under which this machine's crawl row is stored.
    pub fn partition_key(&self) -> Result<String, ChaosError> {
        partition_key_for(
            self.group,
            &self.resource_group,
            self.scale_set_id.as_deref(),
            self.availability_set_id.as_deref(),
        )
        .ok_or_else(|| ChaosError::malformed(&self.resource_id, "no partition key for group"))
    }
}

// ── ScaleSetRecord ────────────────────────────────────────────

/// A scale set and the instances enumerated under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleSetRecord {
    pub resource_id: String,
    pub resource_group: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_scale_set_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<i32>,
    #[serde(default)]
    pub instances: Vec<MachineRecord>,
    pub observed_at: DateTime<Utc>,
}

fn default_scale_set_type() -> String {
    SCALE_SET_TYPE.to_string()
}

impl ScaleSetRecord {
    pub fn has_virtual_machines(&self) -> bool {
        !self.instances.is_empty()
    }
}
