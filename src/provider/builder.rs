//! Fluent construction of a [`ConsulProvider`].
//!
//! ```ignore
//! let provider = ProviderBuilder::new("config/")
//!     .from_reference(ParameterReferences::new(Reference::new("", "consul_url")), flags)
//!     .mode(PollMode::PerKey)
//!     .build()?;
//! let initial = provider.start(known, updater).await?;
//! ```

use std::sync::Arc;

use super::AddressResolver;
use super::ConsulProvider;
use super::ParameterReferences;
use super::ParameterSource;
use super::ReferenceResolver;
use super::StaticAddress;
use crate::ConsulConnector;
use crate::PollMode;
use crate::Result;
use crate::StartupError;
use crate::StoreConfig;
use crate::StoreConnector;
use crate::WatchConfig;

pub struct ProviderBuilder {
    prefix: String,
    resolver: Option<Box<dyn AddressResolver>>,
    connector: Arc<dyn StoreConnector>,
    store_config: StoreConfig,
    watch_config: WatchConfig,
}

impl ProviderBuilder {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            resolver: None,
            connector: Arc::new(ConsulConnector),
            store_config: StoreConfig::default(),
            watch_config: WatchConfig::default(),
        }
    }

    /// Connect to a fixed address
    pub fn address(
        self,
        address: impl Into<String>,
    ) -> Self {
        self.resolver(Box::new(StaticAddress::new(address)))
    }

    /// Read the address from a parameter of `upstream` at start-up
    pub fn from_reference(
        self,
        references: ParameterReferences,
        upstream: Arc<dyn ParameterSource>,
    ) -> Self {
        self.resolver(Box::new(ReferenceResolver::new(references, upstream)))
    }

    pub fn resolver(
        mut self,
        resolver: Box<dyn AddressResolver>,
    ) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn connector(
        mut self,
        connector: Arc<dyn StoreConnector>,
    ) -> Self {
        self.connector = connector;
        self
    }

    pub fn store_config(
        mut self,
        config: StoreConfig,
    ) -> Self {
        self.store_config = config;
        self
    }

    /// Replaces the watch settings. The prefix given to [`ProviderBuilder::new`] wins
    /// over `config.prefix`.
    pub fn watch_config(
        mut self,
        config: WatchConfig,
    ) -> Self {
        self.watch_config = config;
        self
    }

    pub fn mode(
        mut self,
        mode: PollMode,
    ) -> Self {
        self.watch_config.mode = mode;
        self
    }

    pub fn build(self) -> Result<ConsulProvider> {
        let resolver = self.resolver.ok_or(StartupError::MissingResolver)?;

        let watch_config = WatchConfig {
            prefix: self.prefix,
            ..self.watch_config
        };
        self.store_config.validate()?;
        watch_config.validate()?;

        Ok(ConsulProvider::new(
            resolver,
            self.connector,
            self.store_config,
            watch_config,
        ))
    }
}
