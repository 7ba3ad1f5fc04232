use std::collections::BTreeMap;

use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::KeyViolation;
use super::KnownParameters;
use super::ParamValues;
use super::Snapshot;
use super::ViolationKind;
use crate::constants::REDACTED_VALUE;
use crate::keys;
use crate::metrics::IGNORED_KEYS_METRIC;
use crate::KvPair;

/// Turns a raw listing into a [`Snapshot`]
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    prefix: String,
    dump_snapshots: bool,
}

impl SnapshotBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: keys::normalize_prefix(prefix),
            dump_snapshots: false,
        }
    }

    /// Log every built table as single-line JSON at debug level
    pub fn dump_snapshots(
        mut self,
        enable: bool,
    ) -> Self {
        self.dump_snapshots = enable;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Builds a fresh table from `pairs`.
    ///
    /// Only pairs whose `(set, name)` the oracle recognizes end up in
    /// [`Snapshot::values`]; everything else is logged and recorded in
    /// [`Snapshot::violations`]. The oracle is not consulted for keys that
    /// are already rejected by their shape.
    pub fn build(
        &self,
        pairs: &[KvPair],
        known: &dyn KnownParameters,
    ) -> Snapshot {
        let mut snapshot = Snapshot::default();
        let mut secrets: Vec<(String, String)> = Vec::new();

        for pair in pairs {
            let Some(stripped) = keys::strip_prefix(&pair.key, &self.prefix) else {
                Self::skip(&mut snapshot, &pair.key, ViolationKind::OutsidePrefix);
                continue;
            };

            // Namespace markers, including the prefix itself
            if keys::is_folder_marker(stripped) {
                trace!("Skipping folder {}", pair.key);
                continue;
            }

            let Some(param) = keys::split(stripped) else {
                Self::skip(&mut snapshot, &pair.key, ViolationKind::Malformed);
                continue;
            };

            let Some(info) = known.get(&param.set_name, &param.param_name) else {
                Self::skip(&mut snapshot, &pair.key, ViolationKind::UnknownParameter);
                continue;
            };

            let Ok(value) = String::from_utf8(pair.value.clone()) else {
                Self::skip(&mut snapshot, &pair.key, ViolationKind::InvalidUtf8);
                continue;
            };

            if info.secret {
                secrets.push((param.set_name.clone(), param.param_name.clone()));
            }

            snapshot
                .values
                .entry(param.set_name)
                .or_default()
                .insert(param.param_name, value);
        }

        if self.dump_snapshots {
            self.dump(&snapshot.values, &secrets);
        }

        snapshot
    }

    fn skip(
        snapshot: &mut Snapshot,
        key: &str,
        kind: ViolationKind,
    ) {
        let violation = KeyViolation {
            key: key.to_string(),
            kind,
        };

        match kind {
            ViolationKind::UnknownParameter => info!("{}", violation),
            _ => debug!("{}", violation),
        }

        IGNORED_KEYS_METRIC.with_label_values(&[kind.as_str()]).inc();
        snapshot.violations.push(violation);
    }

    fn dump(
        &self,
        values: &ParamValues,
        secrets: &[(String, String)],
    ) {
        let redacted: ParamValues = if secrets.is_empty() {
            values.clone()
        } else {
            let mut redacted = values.clone();
            for (set_name, param_name) in secrets {
                if let Some(value) = redacted.get_mut(set_name).and_then(|set| set.get_mut(param_name)) {
                    *value = REDACTED_VALUE.to_string();
                }
            }
            redacted
        };

        match serde_json::to_string(&redacted) {
            Ok(json) => debug!("{} {}", self.prefix, json),
            Err(e) => warn!("Failed to dump snapshot of {}: {:?}", self.prefix, e),
        }
    }
}

/// Number of values across all sets
pub(crate) fn count_values(values: &ParamValues) -> usize {
    values.values().map(BTreeMap::len).sum()
}
