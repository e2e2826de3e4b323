use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
