//! Table rows and the [`TableStore`] trait.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use chaos_core::config::STORE_BATCH_LIMIT;

use crate::error::StoreError;

/// One stored entity, addressed by `(partition_key, row_key)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    /// When the row was last written.
    pub timestamp: DateTime<Utc>,
    pub properties: serde_json::Value,
}

impl TableRow {
    /// Serialize an entity into a row.
    pub fn from_entity<T: Serialize>(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        entity: &T,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            timestamp: Utc::now(),
            properties: serde_json::to_value(entity)?,
        })
    }

    /// Deserialize the row's properties back into an entity.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.properties.clone())?)
    }
}

/// Rows of one table: partition key → row key → row.
pub type Table = BTreeMap<String, BTreeMap<String, TableRow>>;

/// Trait for durable table backends.
///
/// A batch is committed all-or-nothing and may only touch one partition.
/// Rows are upserted: a row with an existing `(partition_key, row_key)`
/// replaces the stored one.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Atomically upsert `rows` into one partition of `table`.
    async fn upsert_batch(&self, table: &str, partition_key: &str, rows: Vec<TableRow>) -> Result<(), StoreError>;

    /// All rows of one partition, ordered by row key.
    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<TableRow>, StoreError>;

    /// Every row of a table, ordered by partition then row key.
    async fn query_table(&self, table: &str) -> Result<Vec<TableRow>, StoreError>;

    /// Largest batch `upsert_batch` accepts.
    fn max_batch_size(&self) -> usize {
        STORE_BATCH_LIMIT
    }

    /// Backend name for logs (e.g., "memory", "file").
    fn name(&self) -> &str;
}

/// Check a batch against the single-partition and size constraints.
pub fn check_batch(partition_key: &str, rows: &[TableRow], max: usize) -> Result<(), StoreError> {
    if partition_key.trim().is_empty() {
        return Err(StoreError::EmptyPartitionKey);
    }
    if rows.len() > max {
        return Err(StoreError::BatchTooLarge {
            partition_key: partition_key.to_string(),
            size: rows.len(),
            max,
        });
    }
    if let Some(stray) = rows.iter().find(|r| r.partition_key != partition_key) {
        return Err(StoreError::MixedPartition {
            expected: partition_key.to_string(),
            found: stray.partition_key.clone(),
        });
    }
    Ok(())
}

/// Table names become file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn check_table_name(table: &str) -> Result<(), StoreError> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

/// Apply an already-checked batch to a table.
pub(crate) fn apply_batch(table: &mut Table, partition_key: &str, rows: Vec<TableRow>) {
    let partition = table.entry(partition_key.to_string()).or_default();
    let now = Utc::now();
    for mut row in rows {
        row.timestamp = now;
        partition.insert(row.row_key.clone(), row);
    }
}

pub(crate) fn partition_rows(table: &Table, partition_key: &str) -> Vec<TableRow> {
    table
        .get(partition_key)
        .map(|p| p.values().cloned().collect())
        .unwrap_or_default()
}

pub(crate) fn all_rows(table: &Table) -> Vec<TableRow> {
    table.values().flat_map(|p| p.values().cloned()).collect()
}
