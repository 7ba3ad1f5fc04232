use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_RECONNECT_DELAY_IN_MS;
use crate::constants::DEFAULT_WAIT_TIME_IN_MS;
use crate::keys;
use crate::Error;
use crate::Result;

/// How the store is polled for changes
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    /// One recursive listing of the prefix per cycle, one change index
    #[default]
    List,
    /// One blocking get per known parameter, one change index per key
    PerKey,
}

impl PollMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollMode::List => "list",
            PollMode::PerKey => "per_key",
        }
    }
}

impl fmt::Display for PollMode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatchConfig {
    /// KV path under which all parameters live
    /// Default: "config/"
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Polling strategy
    /// Default: list
    #[serde(default)]
    pub mode: PollMode,

    /// Longest time the store may hold a blocking query open
    /// Default: 1 minute
    #[serde(default = "default_wait_time")]
    pub wait_time_in_ms: u64,

    /// Constant delay after a failed poll. No growth, no jitter.
    /// Default: 5 seconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_in_ms: u64,

    /// Report skipped keys to the consumer as violations instead of only
    /// logging them
    /// Default: false
    #[serde(default)]
    pub report_unknown_keys: bool,

    /// Log a JSON dump of every snapshot at debug level
    /// Default: true
    #[serde(default = "default_dump_snapshots")]
    pub dump_snapshots: bool,

    /// Parameters declared by the binary, as `set/name` or `name`
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            mode: PollMode::default(),
            wait_time_in_ms: default_wait_time(),
            reconnect_delay_in_ms: default_reconnect_delay(),
            report_unknown_keys: false,
            dump_snapshots: default_dump_snapshots(),
            parameters: vec![],
        }
    }
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prefix.trim_matches(crate::KEY_SEPARATOR).is_empty() {
            return Err(Error::InvalidConfig("watch.prefix cannot be empty".into()));
        }

        if self.wait_time_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "watch.wait_time_in_ms must be greater than 0".into(),
            ));
        }

        if self.reconnect_delay_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "watch.reconnect_delay_in_ms must be greater than 0".into(),
            ));
        }

        for parameter in &self.parameters {
            if keys::split(parameter).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "watch.parameters entry {parameter:?} must be `name` or `set/name`"
                )));
            }
        }

        Ok(())
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_in_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_in_ms)
    }
}

fn default_prefix() -> String {
    "config/".into()
}
fn default_wait_time() -> u64 {
    DEFAULT_WAIT_TIME_IN_MS
}
fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_IN_MS
}
fn default_dump_snapshots() -> bool {
    true
}
