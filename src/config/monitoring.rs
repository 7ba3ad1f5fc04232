use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitoringConfig {
    /// Serve Prometheus metrics over HTTP
    /// Default: false
    #[serde(default)]
    pub prometheus_enabled: bool,

    /// Port of the `/metrics` endpoint
    /// Default: 9100
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_enabled: false,
            prometheus_port: default_prometheus_port(),
        }
    }
}

impl MonitoringConfig {
    pub fn validate(&self) -> Result<()> {
        if self.prometheus_enabled && self.prometheus_port == 0 {
            return Err(Error::InvalidConfig(
                "monitoring.prometheus_port cannot be 0 when metrics are enabled".into(),
            ));
        }
        Ok(())
    }
}

fn default_prometheus_port() -> u16 {
    9100
}
