//! Mapping between store keys and `(set, name)` parameter keys.
//!
//! A store key under the prefix has one of two shapes:
//!
//! ```text
//! <prefix>/<name>          -> ("", name)
//! <prefix>/<set>/<name>    -> (set, name)
//! ```
//!
//! Anything deeper is not a parameter.


use std::fmt;

use crate::KEY_SEPARATOR;

/// Address of a single parameter. An empty set is the default set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamKey {
    pub set_name: String,
    pub param_name: String,
}

impl ParamKey {
    pub fn new(
        set_name: impl Into<String>,
        param_name: impl Into<String>,
    ) -> Self {
        Self {
            set_name: set_name.into(),
            param_name: param_name.into(),
        }
    }
}

impl fmt::Display for ParamKey {
    /// `set.name`, or bare `name` for the default set
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        if self.set_name.is_empty() {
            f.write_str(&self.param_name)
        } else {
            write!(f, "{}.{}", self.set_name, self.param_name)
        }
    }
}

/// Ensures the prefix ends with exactly one separator so that stripping it
/// never leaves a leading separator behind.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches(KEY_SEPARATOR);
    format!("{trimmed}{KEY_SEPARATOR}")
}

/// Returns the part of `key` below `prefix`, or `None` when the key lives
/// outside of it. `prefix` must be normalized.
pub fn strip_prefix<'a>(
    key: &'a str,
    prefix: &str,
) -> Option<&'a str> {
    key.strip_prefix(prefix)
}

/// Splits a prefix-stripped key into `(set, name)`.
///
/// Returns `None` for keys that are empty, have more than two segments, or
/// end with an empty name.
pub fn split(stripped_key: &str) -> Option<ParamKey> {
    if stripped_key.is_empty() {
        return None;
    }

    let mut segments = stripped_key.split(KEY_SEPARATOR);
    let first = segments.next()?;
    let key = match (segments.next(), segments.next()) {
        (None, _) => ParamKey::new("", first),
        (Some(name), None) => ParamKey::new(first, name),
        (Some(_), Some(_)) => return None,
    };

    if key.param_name.is_empty() {
        return None;
    }

    Some(key)
}

/// Builds the full store key of a parameter. Inverse of
/// [`strip_prefix`] followed by [`split`].
pub fn join(
    prefix: &str,
    set_name: &str,
    param_name: &str,
) -> String {
    let prefix = normalize_prefix(prefix);
    if set_name.is_empty() {
        format!("{prefix}{param_name}")
    } else {
        format!("{prefix}{set_name}{KEY_SEPARATOR}{param_name}")
    }
}

/// A folder entry: the prefix itself or any key ending in a separator
pub(crate) fn is_folder_marker(stripped_key: &str) -> bool {
    stripped_key.is_empty() || stripped_key.ends_with(KEY_SEPARATOR)
}
