use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Connection parameters for the Consul HTTP API
///
/// The address is usually not set here: it is resolved at start-up through
/// an [`crate::AddressResolver`]. When set, the binary uses it directly.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Consul agent address, `host:port` or a full `http(s)://` URL
    /// Default: "" (resolved elsewhere)
    #[serde(default)]
    pub address: String,

    /// Datacenter to query; empty means the agent's own
    #[serde(default)]
    pub datacenter: String,

    /// ACL token sent as `X-Consul-Token`; empty sends none
    #[serde(default)]
    pub token: String,

    /// TCP connect timeout in milliseconds
    /// Default: 1 second
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_ms: u64,

    /// Timeout for a non-blocking request in milliseconds; blocking queries
    /// get the wait time added on top
    /// Default: 5 seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            datacenter: String::new(),
            token: String::new(),
            connect_timeout_in_ms: default_connect_timeout(),
            request_timeout_in_ms: default_request_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "store.connect_timeout_in_ms must be greater than 0".into(),
            ));
        }
        if self.request_timeout_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "store.request_timeout_in_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_in_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_in_ms)
    }

    pub(crate) fn datacenter(&self) -> Option<&str> {
        Some(self.datacenter.as_str()).filter(|dc| !dc.is_empty())
    }

    pub(crate) fn token(&self) -> Option<&str> {
        Some(self.token.as_str()).filter(|t| !t.is_empty())
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_request_timeout() -> u64 {
    5000
}
