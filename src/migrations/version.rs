//! # Migration Versions
//!
//! Versions are decimals with a single fractional digit (`1.0`, `1.1`, `2.0`).
//! They are held as a count of tenths so ordering and equality are exact and
//! never subject to float rounding. `0` is the sentinel for "nothing applied".

use super::errors::{MigrationError, MigrationResult};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Directory entry names that identify a migration unit.
const UNIT_NAME_PATTERN: &str = r"^[0-9]\.[0-9]$";

fn unit_name_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(UNIT_NAME_PATTERN).expect("unit name pattern is valid"))
}

/// A migration version, stored as tenths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MigrationVersion(u16);

impl MigrationVersion {
    /// "No migrations applied".
    pub const ZERO: Self = Self(0);

    /// Highest version a directory entry can name (`9.9`).
    pub const MAX_UNIT: Self = Self(99);

    pub const fn from_tenths(tenths: u16) -> Self {
        Self(tenths)
    }

    /// Build `major.minor`. `minor` must be a single digit.
    pub fn new(major: u16, minor: u16) -> MigrationResult<Self> {
        if minor > 9 {
            return Err(MigrationError::InvalidVersion {
                input: format!("{}.{}", major, minor),
                reason: "fractional part must be a single digit".to_string(),
            });
        }
        major
            .checked_mul(10)
            .and_then(|t| t.checked_add(minor))
            .map(Self)
            .ok_or_else(|| MigrationError::InvalidVersion {
                input: format!("{}.{}", major, minor),
                reason: "version is too large".to_string(),
            })
    }

    pub const fn tenths(self) -> u16 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// Convert a persisted JSON number back into a version.
    pub fn from_f64(value: f64) -> MigrationResult<Self> {
        let invalid = |reason: &str| MigrationError::InvalidVersion {
            input: value.to_string(),
            reason: reason.to_string(),
        };

        if !value.is_finite() || value < 0.0 {
            return Err(invalid("version must be a non-negative number"));
        }

        let scaled = value * 10.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(invalid("version must have at most one fractional digit"));
        }
        if rounded > f64::from(u16::MAX) {
            return Err(invalid("version is too large"));
        }

        Ok(Self(rounded as u16))
    }

    /// True when `name` is a migration entry name: one digit, a dot, one digit.
    pub fn is_unit_name(name: &str) -> bool {
        unit_name_regex().is_match(name)
    }

    /// The version a newly created unit after this one gets (`1.9` -> `2.0`).
    ///
    /// Returns `None` once the directory naming scheme is exhausted.
    pub fn next_unit(self) -> Option<Self> {
        if self.0 == 0 {
            return Some(Self(10));
        }
        (self < Self::MAX_UNIT).then(|| Self(self.0 + 1))
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl FromStr for MigrationVersion {
    type Err = MigrationError;

    /// Accepts `2`, `2.0`, `1.1` and `0`. Rejects signs, exponents and more
    /// than one fractional digit.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = |reason: &str| MigrationError::InvalidVersion {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let (major, minor) = match input.split_once('.') {
            Some((major, minor)) => (major, Some(minor)),
            None => (input, None),
        };

        if major.is_empty() || !major.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected a decimal number such as 1.0"));
        }
        let major: u16 = major.parse().map_err(|_| invalid("version is too large"))?;

        let minor = match minor {
            None => 0,
            Some(m) if m.len() == 1 && m.as_bytes()[0].is_ascii_digit() => {
                u16::from(m.as_bytes()[0] - b'0')
            }
            Some(_) => return Err(invalid("fractional part must be a single digit")),
        };

        Self::new(major, minor).map_err(|_| invalid("version is too large"))
    }
}

impl Serialize for MigrationVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for MigrationVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Self::from_f64(value).map_err(serde::de::Error::custom)
    }
}

/// What a caller asked the runner to do: reach `version`, optionally
/// replaying the current unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationTarget {
    pub version: MigrationVersion,
    pub rerun: bool,
}

impl MigrationTarget {
    pub fn to(version: MigrationVersion) -> Self {
        Self {
            version,
            rerun: false,
        }
    }

    /// Force the `up` of `version` to run again even if it is current.
    pub fn rerun(version: MigrationVersion) -> Self {
        Self {
            version,
            rerun: true,
        }
    }
}

impl fmt::Display for MigrationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rerun {
            write!(f, "{},rerun", self.version)
        } else {
            write!(f, "{}", self.version)
        }
    }
}

impl FromStr for MigrationTarget {
    type Err = MigrationError;

    /// Parses `<number>` or `<number>,rerun`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (version, flag) = match s.split_once(',') {
            Some((version, flag)) => (version, Some(flag.trim())),
            None => (s, None),
        };

        let version = version.parse().map_err(|e| match e {
            MigrationError::InvalidVersion { reason, .. } => MigrationError::InvalidTarget {
                input: s.to_string(),
                reason,
            },
            other => other,
        })?;

        match flag {
            None => Ok(Self::to(version)),
            Some(flag) if flag.eq_ignore_ascii_case("rerun") => Ok(Self::rerun(version)),
            Some(flag) => Err(MigrationError::InvalidTarget {
                input: s.to_string(),
                reason: format!("unknown modifier '{}', expected 'rerun'", flag),
            }),
        }
    }
}
