// sqlpooler - pool maintenance engine for an advanced SQL connection pooler

#![recursion_limit = "256"]

pub mod config;
pub mod pool;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types
pub use utils::error::{PoolError, Result};
