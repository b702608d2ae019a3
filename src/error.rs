//! Error types for the access limiter.

use thiserror::Error;

/// Errors reported by a [`Cache`](crate::cache::Cache) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The store refused a new key because it is at capacity.
    #[error("cache is full ({capacity} entries)")]
    Full {
        /// Configured maximum number of entries
        capacity: usize,
    },

    /// The backing store failed to complete the operation.
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Main error type for limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// The identity already used up its budget for the current window.
    #[error("rate limit exceeded for {key}: {count} recorded, {max_count} allowed")]
    RateLimitExceeded {
        /// Composite cache key of the denied identity
        key: String,
        /// Count observed when the request was denied
        count: u64,
        /// Configured maximum count
        max_count: u64,
    },

    /// Writing the incremented counter back to the cache failed.
    #[error("failed to write counter: {0}")]
    CacheWrite(#[source] CacheError),

    /// Removing a counter from the cache failed.
    #[error("failed to remove counter: {0}")]
    CacheDelete(#[source] CacheError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimiterError {
    /// Whether this error is a policy denial rather than a storage failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LimiterError::RateLimitExceeded { .. })
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;

/// Result type alias for cache backends.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
