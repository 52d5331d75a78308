use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("batch for partition {partition_key:?} has {size} rows, limit is {max}")]
    BatchTooLarge {
        partition_key: String,
        size: usize,
        max: usize,
    },

    #[error("batch for partition {expected:?} contains a row for partition {found:?}")]
    MixedPartition { expected: String, found: String },

    #[error("partition key must not be empty")]
    EmptyPartitionKey,

    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}
