//! Snapshot building: raw KV listing -> two-level parameter table.
//!
//! The table is rebuilt from scratch on every poll cycle. Keys that cannot
//! be mapped to a declared parameter are skipped and recorded as
//! [`KeyViolation`]s; they are never errors.

mod builder;
mod schema;
pub use builder::*;
pub use schema::*;


use std::collections::BTreeMap;
use std::fmt;

#[cfg(test)]
use mockall::automock;

use crate::ParamKey;

/// Set name -> parameter name -> raw value
pub type ParamValues = BTreeMap<String, BTreeMap<String, String>>;

/// Properties the consuming application declared for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamInfo {
    /// Absence from the store is acceptable
    pub optional: bool,
    /// Value must never be written to logs
    pub secret: bool,
}

/// Membership oracle for the parameters the application declared
#[cfg_attr(test, automock)]
pub trait KnownParameters: Send + Sync {
    /// Looks up a declared parameter
    fn get(
        &self,
        set_name: &str,
        param_name: &str,
    ) -> Option<ParamInfo>;

    /// Every declared parameter; used by per-key polling
    fn keys(&self) -> Vec<ParamKey>;
}

/// Why a key was left out of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Key does not start with the watched prefix
    OutsidePrefix,
    /// More than two segments below the prefix, or an empty name
    Malformed,
    /// Value bytes are not UTF-8
    InvalidUtf8,
    /// Well-formed, but the application declared no such parameter
    UnknownParameter,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::OutsidePrefix => "outside_prefix",
            ViolationKind::Malformed => "malformed",
            ViolationKind::InvalidUtf8 => "invalid_utf8",
            ViolationKind::UnknownParameter => "unknown_parameter",
        }
    }
}

/// A key that was skipped while building a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyViolation {
    pub key: String,
    pub kind: ViolationKind,
}

impl fmt::Display for KeyViolation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self.kind {
            ViolationKind::OutsidePrefix => write!(f, "Ignoring {:?}: outside of the watched prefix", self.key),
            ViolationKind::Malformed => write!(f, "Ignoring {}", self.key),
            ViolationKind::InvalidUtf8 => write!(f, "Ignoring {:?}: value is not valid UTF-8", self.key),
            ViolationKind::UnknownParameter => write!(
                f,
                "Ignoring key {:?}: does not match to any application parameter",
                self.key
            ),
        }
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub values: ParamValues,
    pub violations: Vec<KeyViolation>,
}

impl Snapshot {
    pub fn get(
        &self,
        set_name: &str,
        param_name: &str,
    ) -> Option<&str> {
        self.values
            .get(set_name)
            .and_then(|set| set.get(param_name))
            .map(String::as_str)
    }
}
