//! Rate limiting rules, keys and the limiter itself.

mod key;
mod limiter;
mod rule;

pub use key::{ModuleKey, DEFAULT_KEY_PREFIX, DEFAULT_SEPARATOR};
pub use limiter::RateLimiter;
pub use rule::{Rule, RuleSpec, RuleValue, DEFAULT_MAX_COUNT, DEFAULT_MAX_SECONDS};
