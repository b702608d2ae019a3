//! Composite cache key generation.

use std::fmt;

/// Default prefix placed in front of every key.
pub const DEFAULT_KEY_PREFIX: &str = "accesslimit";
/// Default separator between key segments.
pub const DEFAULT_SEPARATOR: char = '@';

/// A key that uniquely identifies one identity within one module.
///
/// The key is `prefix SEP module SEP identity`, where trailing separators
/// are stripped from the prefix and the module so that segments never
/// run together as `SEP SEP`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    key: String,
    identity: String,
}

impl ModuleKey {
    /// Derive the key for `module` and `identity` under `prefix`.
    pub fn new(prefix: &str, separator: char, module: &str, identity: &str) -> Self {
        let module = trim_blank(module);
        let identity = trim_blank(identity);

        let key = format!(
            "{}{sep}{}{sep}{}",
            prefix.trim_end_matches(separator),
            module.trim_end_matches(separator),
            identity,
            sep = separator,
        );

        Self {
            key,
            identity: identity.to_string(),
        }
    }

    /// The full composite key.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// The trimmed identity this key was derived from.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl AsRef<str> for ModuleKey {
    fn as_ref(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

// Spaces, tabs, line breaks, NUL and vertical tab.
fn trim_blank(s: &str) -> &str {
    s.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\r' | '\0' | '\x0B'))
}
