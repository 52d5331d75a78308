//! Resource enumeration collaborator.
//!
//! The crawler never talks to a cloud control plane directly: everything it
//! knows about the fleet comes through [`ResourceInventory`]. An empty result
//! is a valid answer; errors are reserved for "could not enumerate".

mod snapshot;

use async_trait::async_trait;

use chaos_core::{MachineRecord, ScaleSetRecord};

use crate::error::InventoryError;

pub use snapshot::{FleetSnapshot, SnapshotInventory};

/// Trait for resource enumeration backends.
#[async_trait]
pub trait ResourceInventory: Send + Sync {
    /// All resource groups visible to the crawler.
    async fn list_resource_groups(&self) -> Result<Vec<String>, InventoryError>;

    /// Standalone and availability-set machines in a resource group.
    async fn list_machines(&self, resource_group: &str) -> Result<Vec<MachineRecord>, InventoryError>;

    /// Scale sets in a resource group, with their instances.
    async fn list_scale_sets(&self, resource_group: &str) -> Result<Vec<ScaleSetRecord>, InventoryError>;

    /// Ids of machines sitting behind a load balancer backend pool.
    async fn list_load_balancer_backed_ids(&self, resource_group: &str) -> Result<Vec<String>, InventoryError>;
}
