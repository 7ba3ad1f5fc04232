//! Configuration management for the provider and its binary.
//!
//! Provides hierarchical configuration loading from multiple sources with priority:
//! 1. Default values (hardcoded)
//! 2. Optional `config/consul-params` file
//! 3. Explicit config file passed by the caller
//! 4. File named by `CONFIG_PATH`
//! 5. Environment variables (highest priority)

mod monitoring;
mod store;
mod watch;
pub use monitoring::*;
pub use store::*;
pub use watch::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix, e.g. `CONSUL_PARAMS__WATCH__PREFIX`
pub const ENV_PREFIX: &str = "CONSUL_PARAMS";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Store connection parameters
    #[serde(default)]
    pub store: StoreConfig,
    /// Watch loop and snapshot behaviour
    #[serde(default)]
    pub watch: WatchConfig,
    /// Metrics endpoint settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Load configuration from multiple sources with priority:
    /// 1. Default config file
    /// 2. Explicit config file
    /// 3. `CONFIG_PATH` file
    /// 4. Environment variables
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a config file that must exist
    ///
    /// # Returns
    /// Merged and validated configuration
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        // 1. Default file, if present
        config = config.add_source(File::with_name("config/consul-params").required(false));

        // 2. Caller supplied file
        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        // 3. Environment selected file
        if let Ok(path) = env::var("CONFIG_PATH") {
            config = config.add_source(File::with_name(&path).required(true));
        }

        // 4. Environment variables (highest priority)
        config = config.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("watch.parameters")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.watch.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
