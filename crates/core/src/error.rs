use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChaosError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("malformed record {resource_id:?}: {reason}")]
    MalformedRecord { resource_id: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ChaosError {
    pub fn malformed(resource_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ChaosError::MalformedRecord {
            resource_id: resource_id.into(),
            reason: reason.into(),
        }
    }
}
