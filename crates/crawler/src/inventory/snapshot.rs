//! JSON fleet snapshot as a [`ResourceInventory`].
//!
//! The snapshot file is re-read on every call so a long-running worker sees
//! edits without a restart. Shape:
//! ```json
//! {
//!   "resource_groups": [{
//!     "name": "rg-web",
//!     "machines": [{ "id": "/subscriptions/.../virtualMachines/web-1", "power_state": "PowerState/running" }],
//!     "scale_sets": [{ "id": "/subscriptions/.../virtualMachineScaleSets/ss-1", "instances": [ ... ] }],
//!     "load_balancers": [{ "id": "...", "backend_vm_ids": ["..."] }]
//!   }]
//! }
//! ```
//! Machine entries are parsed one by one; an entry that does not parse or
//! lacks identity fields is dropped rather than failing the listing.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use chaos_core::{normalize_zone, MachineRecord, PowerState, ScaleSetRecord, VmGroup, SCALE_SET_VM_TYPE, VIRTUAL_MACHINE_TYPE};

use super::ResourceInventory;
use crate::error::InventoryError;

/// Parsed snapshot file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub resource_groups: Vec<RawResourceGroup>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawResourceGroup {
    pub name: String,
    #[serde(default)]
    pub machines: Vec<Value>,
    #[serde(default)]
    pub scale_sets: Vec<Value>,
    #[serde(default)]
    pub load_balancers: Vec<RawLoadBalancer>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLoadBalancer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub backend_vm_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMachine {
    #[serde(alias = "id")]
    resource_id: Option<String>,
    resource_group: Option<String>,
    region: Option<String>,
    name: Option<String>,
    resource_type: Option<String>,
    scale_set_id: Option<String>,
    availability_set_id: Option<String>,
    availability_zone: Option<i32>,
    fault_domain: Option<i32>,
    update_domain: Option<i32>,
    power_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawScaleSet {
    #[serde(alias = "id")]
    resource_id: String,
    region: Option<String>,
    name: Option<String>,
    availability_zone: Option<i32>,
    #[serde(default)]
    instances: Vec<Value>,
}

impl FleetSnapshot {
    pub fn from_json(json: &str) -> Result<Self, InventoryError> {
        Ok(serde_json::from_str(json)?)
    }

    fn group(&self, resource_group: &str) -> Option<&RawResourceGroup> {
        self.resource_groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(resource_group))
    }

    pub fn machines(&self, resource_group: &str, observed_at: DateTime<Utc>) -> Vec<MachineRecord> {
        let Some(group) = self.group(resource_group) else {
            return Vec::new();
        };
        group
            .machines
            .iter()
            .filter_map(|v| parse_machine(v, &group.name, None, observed_at))
            .collect()
    }

    pub fn scale_sets(&self, resource_group: &str, observed_at: DateTime<Utc>) -> Vec<ScaleSetRecord> {
        let Some(group) = self.group(resource_group) else {
            return Vec::new();
        };
        group
            .scale_sets
            .iter()
            .filter_map(|v| match serde_json::from_value::<RawScaleSet>(v.clone()) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    debug!(resource_group = %group.name, error = %e, "dropping malformed scale set entry");
                    None
                }
            })
            .map(|raw| {
                let zone = normalize_zone(raw.availability_zone);
                let instances = raw
                    .instances
                    .iter()
                    .filter_map(|v| parse_machine(v, &group.name, Some((&raw.resource_id, zone)), observed_at))
                    .collect();
                ScaleSetRecord {
                    name: raw.name.unwrap_or_else(|| last_segment(&raw.resource_id)),
                    resource_id: raw.resource_id,
                    resource_group: group.name.clone(),
                    region: raw.region.unwrap_or_default(),
                    resource_type: chaos_core::SCALE_SET_TYPE.to_string(),
                    availability_zone: zone,
                    instances,
                    observed_at,
                }
            })
            .collect()
    }

    pub fn load_balancer_backed_ids(&self, resource_group: &str) -> Vec<String> {
        self.group(resource_group)
            .map(|g| {
                g.load_balancers
                    .iter()
                    .flat_map(|lb| lb.backend_vm_ids.iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Build a [`MachineRecord`] from a raw entry, or `None` if it is malformed.
///
/// `scale_set` is `(scale set id, scale set zone)` for instances listed under
/// a scale set; instances inherit the scale set's zone when they have none.
fn parse_machine(
    value: &Value,
    resource_group: &str,
    scale_set: Option<(&str, Option<i32>)>,
    observed_at: DateTime<Utc>,
) -> Option<MachineRecord> {
    let raw: RawMachine = match serde_json::from_value(value.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            debug!(resource_group, error = %e, "dropping unparsable machine entry");
            return None;
        }
    };

    let resource_id = raw.resource_id.filter(|id| !id.trim().is_empty())?;
    let (group, scale_set_id, availability_set_id) = match scale_set {
        Some((id, _)) => (VmGroup::ScaleSetMember, Some(id.to_string()), None),
        None => match (raw.scale_set_id, raw.availability_set_id) {
            (Some(ss), _) if !ss.trim().is_empty() => (VmGroup::ScaleSetMember, Some(ss), None),
            (_, Some(avset)) if !avset.trim().is_empty() => (VmGroup::AvailabilitySetMember, None, Some(avset)),
            _ => (VmGroup::Standalone, None, None),
        },
    };
    let default_type = match group {
        VmGroup::ScaleSetMember => SCALE_SET_VM_TYPE,
        _ => VIRTUAL_MACHINE_TYPE,
    };
    let zone = normalize_zone(raw.availability_zone).or(scale_set.and_then(|(_, z)| z));

    let record = MachineRecord {
        name: raw.name.unwrap_or_else(|| last_segment(&resource_id)),
        resource_group: raw.resource_group.unwrap_or_else(|| resource_group.to_string()),
        region: raw.region.unwrap_or_default(),
        resource_type: raw.resource_type.unwrap_or_else(|| default_type.to_string()),
        group,
        scale_set_id,
        availability_set_id,
        availability_zone: zone,
        fault_domain: raw.fault_domain,
        update_domain: raw.update_domain,
        power_state: raw.power_state.as_deref().map(PowerState::parse).unwrap_or(PowerState::Unknown),
        observed_at,
        resource_id,
    };

    match record.validate() {
        Ok(()) => Some(record),
        Err(e) => {
            debug!(error = %e, "dropping malformed machine record");
            None
        }
    }
}

fn last_segment(id: &str) -> String {
    id.rsplit('/').next().unwrap_or_default().to_string()
}

/// Inventory backed by a JSON snapshot file.
pub struct SnapshotInventory {
    path: PathBuf,
}

impl SnapshotInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<FleetSnapshot, InventoryError> {
        let json = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            InventoryError::Unavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        FleetSnapshot::from_json(&json)
    }
}

#[async_trait]
impl ResourceInventory for SnapshotInventory {
    async fn list_resource_groups(&self) -> Result<Vec<String>, InventoryError> {
        Ok(self
            .load()
            .await?
            .resource_groups
            .into_iter()
            .map(|g| g.name)
            .collect())
    }

    async fn list_machines(&self, resource_group: &str) -> Result<Vec<MachineRecord>, InventoryError> {
        Ok(self.load().await?.machines(resource_group, Utc::now()))
    }

    async fn list_scale_sets(&self, resource_group: &str) -> Result<Vec<ScaleSetRecord>, InventoryError> {
        Ok(self.load().await?.scale_sets(resource_group, Utc::now()))
    }

    async fn list_load_balancer_backed_ids(&self, resource_group: &str) -> Result<Vec<String>, InventoryError> {
        Ok(self.load().await?.load_balancer_backed_ids(resource_group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
      "resource_groups": [{
        "name": "rg-web",
        "machines": [
          { "id": "/s/rg-web/vm/web-1", "power_state": "PowerState/running", "availability_zone": 0 },
          { "id": "/s/rg-web/vm/web-2", "power_state": "VM stopped", "availability_set_id": "/s/rg-web/as/as-1",
            "fault_domain": 1, "update_domain": 2 },
          { "power_state": "running" },
          "not an object",
          { "id": "/s/rg-web/vm/web-3", "power_state": "Migrating", "availability_zone": 2 }
        ],
        "scale_sets": [
          { "id": "/s/rg-web/ss/ss-1", "availability_zone": 3, "instances": [
            { "id": "/s/rg-web/ss/ss-1/vm/0", "power_state": "running" },
            { "id": "/s/rg-web/ss/ss-1/vm/1", "power_state": "stopped", "availability_zone": 1 }
          ]},
          { "id": "/s/rg-web/ss/ss-empty" },
          { "name": "no id" }
        ],
        "load_balancers": [{ "id": "/s/rg-web/lb/lb-1", "backend_vm_ids": ["/s/rg-web/vm/web-1"] }]
      }]
    }"#;

    fn snapshot() -> FleetSnapshot {
        FleetSnapshot::from_json(SNAPSHOT).unwrap()
    }

    #[test]
    fn machines_parse_leniently() {
        let machines = snapshot().machines("rg-web", Utc::now());
        assert_eq!(machines.len(), 3);

        assert_eq!(machines[0].name, "web-1");
        assert_eq!(machines[0].group, VmGroup::Standalone);
        assert_eq!(machines[0].power_state, PowerState::Running);
        assert_eq!(machines[0].availability_zone, None);
        assert_eq!(machines[0].resource_group, "rg-web");

        assert_eq!(machines[1].group, VmGroup::AvailabilitySetMember);
        assert_eq!(machines[1].power_state, PowerState::Stopped);
        assert_eq!(machines[1].fault_domain, Some(1));

        assert_eq!(machines[2].power_state, PowerState::Unknown);
        assert_eq!(machines[2].availability_zone, Some(2));
    }

    #[test]
    fn group_lookup_is_case_insensitive() {
        assert_eq!(snapshot().machines("RG-WEB", Utc::now()).len(), 3);
        assert!(snapshot().machines("rg-missing", Utc::now()).is_empty());
    }

    #[test]
    fn scale_set_instances_become_members() {
        let sets = snapshot().scale_sets("rg-web", Utc::now());
        assert_eq!(sets.len(), 2);

        let ss = &sets[0];
        assert_eq!(ss.name, "ss-1");
        assert!(ss.has_virtual_machines());
        assert!(ss
            .instances
            .iter()
            .all(|m| m.group == VmGroup::ScaleSetMember && m.scale_set_id.as_deref() == Some("/s/rg-web/ss/ss-1")));
        assert_eq!(ss.instances[0].availability_zone, Some(3));
        assert_eq!(ss.instances[1].availability_zone, Some(1));

        assert!(!sets[1].has_virtual_machines());
    }

    #[test]
    fn load_balancer_ids() {
        assert_eq!(snapshot().load_balancer_backed_ids("rg-web"), vec!["/s/rg-web/vm/web-1".to_string()]);
        assert!(snapshot().load_balancer_backed_ids("other").is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_unavailable() {
        let inventory = SnapshotInventory::new("/definitely/not/here.json");
        let err = inventory.list_resource_groups().await.unwrap_err();
        assert!(matches!(err, InventoryError::Unavailable(_)));
    }
}
