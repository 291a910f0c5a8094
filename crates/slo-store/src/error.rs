use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid store configuration: {0}")]
    Configuration(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StoreError> for slo_core::Error {
    fn from(err: StoreError) -> Self {
        slo_core::Error::Store(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
