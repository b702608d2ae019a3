//! Accesslimit - Cache-backed Access Frequency Limiting
//!
//! This crate answers "has this identity used more than N operations in the
//! last S seconds?" by keeping one counter per (module, identity) pair in a
//! pluggable key-value cache that owns expiry. Every recorded operation
//! rewrites the counter with a fresh time-to-live, so a window closes once an
//! identity has been quiet for the configured number of seconds.

pub mod cache;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use cache::{Cache, MemoryCache};
pub use config::LimiterConfig;
pub use error::{CacheError, LimiterError, Result};
pub use ratelimit::{ModuleKey, RateLimiter, Rule, RuleSpec, RuleValue};
