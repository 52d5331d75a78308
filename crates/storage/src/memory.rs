//! In-memory table store.
//!
//! Uses `std::sync::RwLock`; no lock is held across an `.await`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use chaos_core::config::STORE_BATCH_LIMIT;

use crate::error::StoreError;
use crate::table::{all_rows, apply_batch, check_batch, check_table_name, partition_rows, Table, TableRow, TableStore};

/// Table store held entirely in memory.
pub struct MemoryTableStore {
    tables: RwLock<HashMap<String, Table>>,
    max_batch_size: usize,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::with_max_batch_size(STORE_BATCH_LIMIT)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            max_batch_size,
        }
    }

    /// Number of rows in a table (0 if it does not exist).
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|t| t.get(table).map(|p| p.values().map(|rows| rows.len()).sum::<usize>()).unwrap_or(0))
            .unwrap_or(0)
    }

    fn poisoned() -> StoreError {
        StoreError::Backend("memory store lock poisoned".into())
    }
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn upsert_batch(&self, table: &str, partition_key: &str, rows: Vec<TableRow>) -> Result<(), StoreError> {
        check_table_name(table)?;
        check_batch(partition_key, &rows, self.max_batch_size)?;

        let count = rows.len();
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        apply_batch(tables.entry(table.to_string()).or_default(), partition_key, rows);
        debug!(table, partition_key, rows = count, "memory batch committed");
        Ok(())
    }

    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<TableRow>, StoreError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .get(table)
            .map(|t| partition_rows(t, partition_key))
            .unwrap_or_default())
    }

    async fn query_table(&self, table: &str) -> Result<Vec<TableRow>, StoreError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables.get(table).map(all_rows).unwrap_or_default())
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pk: &str, rk: &str, value: &str) -> TableRow {
        TableRow::from_entity(pk, rk, &serde_json::json!({ "value": value })).unwrap()
    }

    #[tokio::test]
    async fn upsert_then_query() {
        let store = MemoryTableStore::new();
        store
            .upsert_batch("t", "p", vec![row("p", "a", "1"), row("p", "b", "2")])
            .await
            .unwrap();

        let rows = store.query_partition("t", "p").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_key, "a");
        assert_eq!(store.row_count("t"), 2);
    }

    #[tokio::test]
    async fn same_key_overwrites() {
        let store = MemoryTableStore::new();
        store.upsert_batch("t", "p", vec![row("p", "a", "old")]).await.unwrap();
        store.upsert_batch("t", "p", vec![row("p", "a", "new")]).await.unwrap();

        let rows = store.query_table("t").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].properties["value"], "new");
    }

    #[tokio::test]
    async fn rejected_batch_writes_nothing() {
        let store = MemoryTableStore::with_max_batch_size(2);
        let err = store
            .upsert_batch("t", "p", vec![row("p", "a", "1"), row("p", "b", "2"), row("p", "c", "3")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BatchTooLarge { .. }));

        let err = store
            .upsert_batch("t", "p", vec![row("p", "a", "1"), row("q", "b", "2")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MixedPartition { .. }));

        assert_eq!(store.row_count("t"), 0);
    }

    #[tokio::test]
    async fn missing_table_is_empty() {
        let store = MemoryTableStore::new();
        assert!(store.query_table("nope").await.unwrap().is_empty());
        assert!(store.query_partition("nope", "p").await.unwrap().is_empty());
    }
}
