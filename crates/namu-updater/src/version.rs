//! Dotted-integer versions.
//!
//! Release tags like `v1.0.78` and manifest versions like `1.0.78` are
//! compared component by component, padding the shorter side with zeros so
//! that `1.2` and `1.2.0` are equal.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::UpdateError;

/// A version as an ordered list of non-negative integers.
///
/// Equality and ordering ignore trailing zero components.
#[derive(Debug, Clone, Default)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    /// Build a version from explicit components.
    pub fn new(components: Vec<u64>) -> Self {
        Self { components }
    }

    /// Parse leniently: segments that are not plain integers become `0`.
    ///
    /// A leading `v` or `V` is stripped. An empty string parses as `0`.
    pub fn parse(s: &str) -> Self {
        let trimmed = strip_prefix(s);
        if trimmed.is_empty() {
            return Self::default();
        }

        let components = trimmed
            .split('.')
            .map(|segment| match segment.trim().parse::<u64>() {
                Ok(n) => n,
                Err(_) => {
                    warn!("Non-numeric version segment {:?} in {:?} treated as 0", segment, s);
                    0
                }
            })
            .collect();

        Self { components }
    }

    /// Parse strictly: every segment must be a non-negative integer.
    pub fn parse_strict(s: &str) -> Result<Self, UpdateError> {
        let trimmed = strip_prefix(s);
        if trimmed.is_empty() {
            return Err(UpdateError::VersionParseError("empty version".to_string()));
        }

        let mut components = Vec::new();
        for segment in trimmed.split('.') {
            let n = segment.parse::<u64>().map_err(|_| {
                UpdateError::VersionParseError(format!(
                    "segment {:?} of {:?} is not a number",
                    segment, s
                ))
            })?;
            components.push(n);
        }

        Ok(Self { components })
    }

    /// The parsed components, as written.
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Whether `self` is strictly newer than `current`.
    pub fn is_newer_than(&self, current: &Version) -> bool {
        compare(self, current) == Ordering::Greater
    }
}

fn strip_prefix(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('v')
        .or_else(|| s.strip_prefix('V'))
        .unwrap_or(s)
}

/// Compare two versions, padding the shorter one with zeros.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    let len = a.components.len().max(b.components.len());
    for i in 0..len {
        let left = a.components.get(i).copied().unwrap_or(0);
        let right = b.components.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &Version, current: &Version) -> bool {
    candidate.is_newer_than(current)
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        compare(self, other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_strict(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "0");
        }
        let parts: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Version::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(compare(&v("1.2"), &v("1.2.0")), Ordering::Equal);
        assert_eq!(v("1.2"), v("1.2.0.0"));
    }

    #[test]
    fn test_ordering_examples() {
        assert_eq!(compare(&v("2.0.0"), &v("1.9.9")), Ordering::Greater);
        assert_eq!(compare(&v("1.0"), &v("1.0.1")), Ordering::Less);
        assert_eq!(compare(&v("1.0.10"), &v("1.0.9")), Ordering::Greater);
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer(&v("1.0.78"), &v("1.0.77")));
        assert!(!is_newer(&v("1.0.78"), &v("1.0.78")));
        assert!(!is_newer(&v("1.0.77"), &v("1.0.78")));
    }

    #[test]
    fn test_tag_prefix_stripped() {
        assert_eq!(v("v1.0.78"), v("1.0.78"));
        assert_eq!(v("V2.1").components(), &[2, 1]);
    }

    #[test]
    fn test_lenient_parse_coerces_garbage_to_zero() {
        assert_eq!(v("1.beta.3").components(), &[1, 0, 3]);
        assert_eq!(v(""), v("0"));
    }

    #[test]
    fn test_strict_parse_rejects_garbage() {
        assert!(Version::parse_strict("1.beta.3").is_err());
        assert!(Version::parse_strict("").is_err());
        assert!(Version::parse_strict("1..2").is_err());
        assert_eq!(Version::parse_strict("v1.0.5").unwrap().components(), &[1, 0, 5]);
    }

    #[test]
    fn test_display_keeps_written_components() {
        assert_eq!(v("v1.0.78").to_string(), "1.0.78");
        assert_eq!(Version::default().to_string(), "0");
    }

    #[test]
    fn test_serde_as_string() {
        let version = v("1.2.3");
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"1.2.3\"");
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back, version);
    }
}
