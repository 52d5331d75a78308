//! Crawl error types.

use std::time::Duration;

use thiserror::Error;

use chaos_core::ChaosError;
use chaos_storage::StoreError;

/// Failure reported by a [`ResourceInventory`](crate::inventory::ResourceInventory).
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("inventory unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("inventory parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CrawlError {
    /// Bad settings; aborts before any enumeration.
    #[error(transparent)]
    Config(#[from] ChaosError),

    #[error("enumeration failed for resource group {resource_group}: {source}")]
    Enumeration {
        resource_group: String,
        source: InventoryError,
    },

    #[error("writing {record_count} rows to {table}/{partition_key} failed: {source}")]
    Persistence {
        resource_group: String,
        table: String,
        partition_key: String,
        record_count: usize,
        source: StoreError,
    },

    #[error("{operation} for resource group {resource_group} timed out after {after:?}")]
    Timeout {
        resource_group: String,
        operation: String,
        after: Duration,
    },
}
