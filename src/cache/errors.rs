use thiserror::Error;

/// Failure of a persistence medium.
///
/// These never reach callers of [super::CacheStore]; they make the store
/// switch to its in-memory driver.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("storage medium is unavailable: {0}")]
    Unavailable(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage i/o failed")]
    Io(#[from] std::io::Error),

    #[error("could not encode cached value")]
    Encoding(#[from] serde_json::Error),
}
