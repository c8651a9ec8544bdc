use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to spawn periodic driver task")]
    Spawn,
}

pub type Result<T> = std::result::Result<T, PoolError>;
