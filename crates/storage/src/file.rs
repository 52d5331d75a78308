//! Filesystem-backed table store.
//!
//! Layout under the base directory:
//! ```text
//! tables/
//!   scheduledrules.json      <- partition key → row key → row
//!   virtualmachinecrawler.json
//! ```
//! A batch is applied by rewriting the table file through a temporary file
//! and a rename, so readers see either the old or the new table.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use chaos_core::config::STORE_BATCH_LIMIT;

use crate::error::StoreError;
use crate::table::{all_rows, apply_batch, check_batch, check_table_name, partition_rows, Table, TableRow, TableStore};

/// JSON-file table store.
pub struct FileTableStore {
    base_dir: PathBuf,
    max_batch_size: usize,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileTableStore {
    /// Create a store rooted at `base_dir`, ensuring `tables/` exists.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join("tables"))?;
        info!("Table store: file backend at {}", base_dir.display());
        Ok(Self {
            base_dir,
            max_batch_size: STORE_BATCH_LIMIT,
            write_lock: Mutex::new(()),
        })
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.base_dir.join("tables").join(format!("{table}.json"))
    }

    async fn load(&self, table: &str) -> Result<Table, StoreError> {
        check_table_name(table)?;
        let path = self.table_path(table);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Table::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, table: &str, contents: &Table) -> Result<(), StoreError> {
        let path = self.table_path(table);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(contents)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl TableStore for FileTableStore {
    async fn upsert_batch(&self, table: &str, partition_key: &str, rows: Vec<TableRow>) -> Result<(), StoreError> {
        check_table_name(table)?;
        check_batch(partition_key, &rows, self.max_batch_size)?;

        let count = rows.len();
        let _guard = self.write_lock.lock().await;
        let mut contents = self.load(table).await?;
        apply_batch(&mut contents, partition_key, rows);
        self.save(table, &contents).await?;
        debug!(table, partition_key, rows = count, "file batch committed");
        Ok(())
    }

    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<TableRow>, StoreError> {
        let contents = self.load(table).await?;
        Ok(partition_rows(&contents, partition_key))
    }

    async fn query_table(&self, table: &str) -> Result<Vec<TableRow>, StoreError> {
        let contents = self.load(table).await?;
        Ok(all_rows(&contents))
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn name(&self) -> &str {
        "file"
    }
}
