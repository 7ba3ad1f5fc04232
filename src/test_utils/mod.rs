//! Test doubles shared by the unit tests

use parking_lot::Mutex;
use tracing::Level;

use crate::KeyViolation;
use crate::ParamValues;
use crate::Updater;

/// Updater that keeps everything it receives
#[derive(Default)]
pub struct RecordingUpdater {
    updates: Mutex<Vec<ParamValues>>,
    logs: Mutex<Vec<(Level, String)>>,
    violations: Mutex<Vec<KeyViolation>>,
}

impl RecordingUpdater {
    pub fn updates(&self) -> Vec<ParamValues> {
        self.updates.lock().clone()
    }

    pub fn logs(&self) -> Vec<(Level, String)> {
        self.logs.lock().clone()
    }

    pub fn violations(&self) -> Vec<KeyViolation> {
        self.violations.lock().clone()
    }
}

impl Updater for RecordingUpdater {
    fn update(
        &self,
        values: ParamValues,
    ) {
        self.updates.lock().push(values);
    }

    fn log(
        &self,
        level: Level,
        message: &str,
    ) {
        self.logs.lock().push((level, message.to_string()));
    }

    fn report_violations(
        &self,
        violations: &[KeyViolation],
    ) {
        self.violations.lock().extend_from_slice(violations);
    }
}
