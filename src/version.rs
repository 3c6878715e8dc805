//! Three-component semantic version and constraint grammar.
//!
//! Distinct from the `semver` crate's grammar: constraints here are exactly
//! `>=X.Y.Z`, `<=X.Y.Z`, `=X.Y.Z`, `^X.Y.Z`, `~X.Y.Z`, or the bare `*`.

use std::cmp::Ordering;
use std::fmt;

use crate::error::{PluginError, PluginResult};

/// A `(major, minor, patch)` version triple with lexicographic total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl Version {
    /// Construct a version directly from its components.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a `major.minor.patch` string.
    ///
    /// Fails with [`PluginError::InvalidVersion`] on anything else: missing
    /// components, non-numeric components, leading/trailing garbage, or
    /// negative signs.
    pub fn parse(input: &str) -> PluginResult<Self> {
        let invalid = || PluginError::InvalidVersion {
            input: input.to_string(),
        };

        let mut parts = input.split('.');
        let major = parts.next().ok_or_else(invalid)?;
        let minor = parts.next().ok_or_else(invalid)?;
        let patch = parts.next().ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let parse_component = |s: &str| -> PluginResult<u64> {
            if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
                return Err(invalid());
            }
            s.parse::<u64>().map_err(|_| invalid())
        };

        Ok(Version {
            major: parse_component(major)?,
            minor: parse_component(minor)?,
            patch: parse_component(patch)?,
        })
    }

    /// Render back as `major.minor.patch`. Round-trips with [`Version::parse`].
    pub fn format(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// A version constraint as described in the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraint {
    /// `>=X.Y.Z`
    AtLeast(Version),
    /// `<=X.Y.Z`
    AtMost(Version),
    /// `=X.Y.Z`
    Exact(Version),
    /// `^X.Y.Z`: same major, version ≥ given.
    Compatible(Version),
    /// `~X.Y.Z`: same major.minor, patch ≥ given.
    Tilde(Version),
    /// `*`: satisfied by anything.
    Any,
}

impl Constraint {
    /// Parse a constraint string.
    pub fn parse(input: &str) -> PluginResult<Self> {
        let invalid = || PluginError::InvalidVersion {
            input: input.to_string(),
        };

        if input == "*" {
            return Ok(Constraint::Any);
        }
        if let Some(rest) = input.strip_prefix(">=") {
            return Ok(Constraint::AtLeast(Version::parse(rest)?));
        }
        if let Some(rest) = input.strip_prefix("<=") {
            return Ok(Constraint::AtMost(Version::parse(rest)?));
        }
        if let Some(rest) = input.strip_prefix('=') {
            return Ok(Constraint::Exact(Version::parse(rest)?));
        }
        if let Some(rest) = input.strip_prefix('^') {
            return Ok(Constraint::Compatible(Version::parse(rest)?));
        }
        if let Some(rest) = input.strip_prefix('~') {
            return Ok(Constraint::Tilde(Version::parse(rest)?));
        }
        Err(invalid())
    }

    /// Render back to its canonical string form.
    pub fn format(&self) -> String {
        match self {
            Constraint::AtLeast(v) => format!(">={v}"),
            Constraint::AtMost(v) => format!("<={v}"),
            Constraint::Exact(v) => format!("={v}"),
            Constraint::Compatible(v) => format!("^{v}"),
            Constraint::Tilde(v) => format!("~{v}"),
            Constraint::Any => "*".to_string(),
        }
    }

    /// Whether `version` satisfies this constraint.
    pub fn satisfied_by(&self, version: &Version) -> bool {
        match self {
            Constraint::AtLeast(v) => version.cmp(v) != Ordering::Less,
            Constraint::AtMost(v) => version.cmp(v) != Ordering::Greater,
            Constraint::Exact(v) => version == v,
            Constraint::Compatible(v) => {
                version.major == v.major
                    && (version.minor, version.patch) >= (v.minor, v.patch)
            }
            Constraint::Tilde(v) => {
                version.major == v.major && version.minor == v.minor && version.patch >= v.patch
            }
            Constraint::Any => true,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_valid_versions() {
        for s in ["0.0.0", "1.2.3", "10.20.30"] {
            let v = Version::parse(s).unwrap();
            assert_eq!(v.format(), s);
        }
    }

    #[test]
    fn rejects_malformed_versions() {
        for s in ["1.2", "1.2.3.4", "a.b.c", "1.2.-3", "01.2.3", ""] {
            assert!(Version::parse(s).is_err(), "expected {s} to be invalid");
        }
    }

    #[test]
    fn total_order_is_lexicographic() {
        let a = Version::new(1, 2, 3);
        let b = Version::new(1, 2, 4);
        let c = Version::new(1, 3, 0);
        let d = Version::new(2, 0, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn caret_is_same_major_at_least_minor_patch() {
        let c = Constraint::parse("^1.2.3").unwrap();
        assert!(c.satisfied_by(&Version::new(1, 2, 3)));
        assert!(c.satisfied_by(&Version::new(1, 3, 0)));
        assert!(c.satisfied_by(&Version::new(1, 2, 9)));
        assert!(!c.satisfied_by(&Version::new(1, 2, 2)));
        assert!(!c.satisfied_by(&Version::new(2, 0, 0)));
    }

    #[test]
    fn tilde_is_same_major_minor_at_least_patch() {
        let c = Constraint::parse("~1.2.3").unwrap();
        assert!(c.satisfied_by(&Version::new(1, 2, 3)));
        assert!(c.satisfied_by(&Version::new(1, 2, 9)));
        assert!(!c.satisfied_by(&Version::new(1, 3, 0)));
        assert!(!c.satisfied_by(&Version::new(1, 2, 2)));
    }

    #[test]
    fn any_matches_everything() {
        let c = Constraint::parse("*").unwrap();
        assert!(c.satisfied_by(&Version::new(0, 0, 0)));
        assert!(c.satisfied_by(&Version::new(99, 99, 99)));
    }

    #[test]
    fn comparison_operators_round_trip() {
        for (input, v) in [
            (">=1.0.0", Version::new(1, 0, 0)),
            ("<=2.0.0", Version::new(2, 0, 0)),
            ("=3.1.4", Version::new(3, 1, 4)),
        ] {
            let c = Constraint::parse(input).unwrap();
            assert_eq!(c.format(), input);
            assert!(c.satisfied_by(&v));
        }
    }
}
