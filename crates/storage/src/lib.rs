//! Durable table storage for crawl state and scheduled chaos actions.
//!
//! Every write goes through [`TableStore::upsert_batch`], which commits one
//! partition atomically and rejects batches above the store limit.

pub mod error;
pub mod file;
pub mod memory;
pub mod table;

pub use error::StoreError;
pub use file::FileTableStore;
pub use memory::MemoryTableStore;
pub use table::{check_batch, Table, TableRow, TableStore};
