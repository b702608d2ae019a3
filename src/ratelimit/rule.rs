//! Access rules: how many operations are allowed within how many seconds.
//!
//! Rule values arrive from code and from configuration files alike, so they
//! are accepted loosely and validated on assignment. A value that is not a
//! plain non-negative integer is ignored and the previous setting is kept.

use serde::{Deserialize, Serialize};

/// Default maximum number of operations per window.
pub const DEFAULT_MAX_COUNT: u64 = 1;
/// Default window length in seconds.
pub const DEFAULT_MAX_SECONDS: u64 = 300;

/// A candidate value for one of the rule fields.
///
/// Only non-negative integers and strings made purely of ASCII digits are
/// accepted when the value is applied; see [`RuleValue::as_count`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    /// A non-negative integer
    Unsigned(u64),
    /// A signed integer (accepted only when it is not negative)
    Signed(i64),
    /// A float (accepted only when it is a whole, non-negative number)
    Float(f64),
    /// A textual number such as `"30"`
    Text(String),
    /// Anything else found in a configuration file
    Other(serde_yaml::Value),
}

impl RuleValue {
    /// Interpret the value as a count, or `None` if it is not representable
    /// as a non-negative integer.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            RuleValue::Unsigned(n) => Some(*n),
            RuleValue::Signed(n) => u64::try_from(*n).ok(),
            RuleValue::Float(f) => {
                let whole = f.is_finite() && *f >= 0.0 && f.fract() == 0.0;
                // 2^64 is the first float above u64::MAX
                if whole && *f < 18_446_744_073_709_551_616.0 {
                    Some(*f as u64)
                } else {
                    None
                }
            }
            RuleValue::Text(s) => {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                s.parse().ok()
            }
            RuleValue::Other(_) => None,
        }
    }
}

macro_rules! rule_value_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for RuleValue {
            fn from(n: $t) -> Self {
                RuleValue::Unsigned(n as u64)
            }
        })*
    };
}

macro_rules! rule_value_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for RuleValue {
            fn from(n: $t) -> Self {
                RuleValue::Signed(n as i64)
            }
        })*
    };
}

rule_value_from_unsigned!(u8, u16, u32, u64, usize);
rule_value_from_signed!(i8, i16, i32, i64, isize);

impl From<f64> for RuleValue {
    fn from(f: f64) -> Self {
        RuleValue::Float(f)
    }
}

impl From<&str> for RuleValue {
    fn from(s: &str) -> Self {
        RuleValue::Text(s.to_string())
    }
}

impl From<String> for RuleValue {
    fn from(s: String) -> Self {
        RuleValue::Text(s)
    }
}

/// A partial rule update. Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Maximum number of operations per window
    #[serde(default)]
    pub max_count: Option<RuleValue>,
    /// Window length in seconds
    #[serde(default)]
    pub max_second: Option<RuleValue>,
}

impl RuleSpec {
    /// An empty update that leaves every field untouched.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum count candidate.
    pub fn max_count(mut self, value: impl Into<RuleValue>) -> Self {
        self.max_count = Some(value.into());
        self
    }

    /// Set the window length candidate.
    pub fn max_second(mut self, value: impl Into<RuleValue>) -> Self {
        self.max_second = Some(value.into());
        self
    }
}

/// The effective rule held by a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    /// Maximum number of operations per window
    pub max_count: u64,
    /// Window length in seconds
    #[serde(rename = "max_second")]
    pub max_seconds: u64,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_COUNT,
            max_seconds: DEFAULT_MAX_SECONDS,
        }
    }
}

impl Rule {
    /// Create a rule from already validated values.
    pub fn new(max_count: u64, max_seconds: u64) -> Self {
        Self {
            max_count,
            max_seconds,
        }
    }

    /// Apply every valid field of `spec`, ignoring the rest.
    pub fn apply(&mut self, spec: &RuleSpec) {
        if let Some(value) = &spec.max_count {
            self.set_max_count(value.clone());
        }
        if let Some(value) = &spec.max_second {
            self.set_max_seconds(value.clone());
        }
    }

    /// Update the maximum count. Returns `false` if the value was rejected.
    pub fn set_max_count(&mut self, value: impl Into<RuleValue>) -> bool {
        match value.into().as_count() {
            Some(n) => {
                self.max_count = n;
                true
            }
            None => false,
        }
    }

    /// Update the window length. Returns `false` if the value was rejected.
    pub fn set_max_seconds(&mut self, value: impl Into<RuleValue>) -> bool {
        match value.into().as_count() {
            Some(n) => {
                self.max_seconds = n;
                true
            }
            None => false,
        }
    }

    /// Whether another operation may be recorded on top of `count`.
    ///
    /// Denial starts only once `count` is strictly greater than `max_count`,
    /// so `max_count + 1` recordings fit in one window.
    pub fn allows(&self, count: u64) -> bool {
        count <= self.max_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rule() {
        let rule = Rule::default();
        assert_eq!(rule.max_count, 1);
        assert_eq!(rule.max_seconds, 300);
    }

    #[test]
    fn test_rule_value_accepts_non_negative_integers() {
        assert_eq!(RuleValue::from(0u32).as_count(), Some(0));
        assert_eq!(RuleValue::from(42i64).as_count(), Some(42));
        assert_eq!(RuleValue::from("17").as_count(), Some(17));
        assert_eq!(RuleValue::from("007").as_count(), Some(7));
    }

    #[test]
    fn test_rule_value_accepts_whole_floats() {
        assert_eq!(RuleValue::from(5.0).as_count(), Some(5));
        assert_eq!(RuleValue::from(0.0).as_count(), Some(0));
        assert_eq!(RuleValue::from(5.5).as_count(), None);
        assert_eq!(RuleValue::from(-2.0).as_count(), None);
        assert_eq!(RuleValue::from(f64::NAN).as_count(), None);
        assert_eq!(RuleValue::from(f64::INFINITY).as_count(), None);
        assert_eq!(RuleValue::from(1e30).as_count(), None);
    }

    #[test]
    fn test_rule_value_rejects_invalid_input() {
        assert_eq!(RuleValue::from(-1i32).as_count(), None);
        assert_eq!(RuleValue::from("").as_count(), None);
        assert_eq!(RuleValue::from("-5").as_count(), None);
        assert_eq!(RuleValue::from("+5").as_count(), None);
        assert_eq!(RuleValue::from(" 5").as_count(), None);
        assert_eq!(RuleValue::from("1.5").as_count(), None);
        assert_eq!(RuleValue::from("abc").as_count(), None);
        assert_eq!(RuleValue::from("99999999999999999999999").as_count(), None);
    }

    #[test]
    fn test_invalid_values_keep_previous() {
        let mut rule = Rule::default();

        assert!(!rule.set_max_count(-3));
        assert!(!rule.set_max_seconds("soon"));
        assert_eq!(rule, Rule::default());

        assert!(rule.set_max_count(5));
        assert!(rule.set_max_seconds("60"));
        assert_eq!(rule, Rule::new(5, 60));
    }

    #[test]
    fn test_apply_partial_spec() {
        let mut rule = Rule::default();

        rule.apply(&RuleSpec::new().max_count(10));
        assert_eq!(rule, Rule::new(10, 300));

        rule.apply(&RuleSpec::new().max_count("x").max_second(30));
        assert_eq!(rule, Rule::new(10, 30));

        rule.apply(&RuleSpec::new());
        assert_eq!(rule, Rule::new(10, 30));
    }

    #[test]
    fn test_allows_is_inclusive() {
        let rule = Rule::new(2, 60);
        assert!(rule.allows(0));
        assert!(rule.allows(2));
        assert!(!rule.allows(3));
    }

    #[test]
    fn test_parse_spec_from_yaml() {
        let yaml = r#"
max_count: "3"
max_second: 120
"#;
        let spec: RuleSpec = serde_yaml::from_str(yaml).unwrap();
        let mut rule = Rule::default();
        rule.apply(&spec);
        assert_eq!(rule, Rule::new(3, 120));
    }

    #[test]
    fn test_parse_spec_with_whole_float() {
        let spec: RuleSpec = serde_yaml::from_str("max_count: 5.0\nmax_second: 90.0\n").unwrap();
        assert_eq!(spec.max_count, Some(RuleValue::Float(5.0)));

        let mut rule = Rule::default();
        rule.apply(&spec);
        assert_eq!(rule, Rule::new(5, 90));
    }

    #[test]
    fn test_parse_spec_with_bad_values() {
        let yaml = r#"
max_count: -4
max_second: 2.5
"#;
        let spec: RuleSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.max_count, Some(RuleValue::Signed(-4)));

        let mut rule = Rule::default();
        rule.apply(&spec);
        assert_eq!(rule, Rule::default());
    }
}
