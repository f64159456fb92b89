//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is absent, or was present but expired at read time
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Value alone is larger than the whole cache capacity
    #[error("Value of {size} bytes exceeds cache capacity of {capacity} bytes")]
    ValueTooLarge { size: usize, capacity: usize },

    /// Background reaper could not be started
    #[error("Failed to start reaper: {0}")]
    Reaper(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
