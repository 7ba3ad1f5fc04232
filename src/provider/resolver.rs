//! Store address resolution strategies.
//!
//! The address is resolved exactly once, when the provider starts. It either
//! comes from a fixed value or is read from a parameter that another source,
//! registered before this provider, has already loaded.

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::ParamKey;
use crate::ParamValues;
use crate::Result;
use crate::StartupError;

/// Set and name of the parameter holding a piece of provider configuration
pub type Reference = ParamKey;

/// Where the provider reads its own configuration from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterReferences {
    /// Parameter holding the Consul address
    pub consul_uri: Reference,
}

impl ParameterReferences {
    pub fn new(consul_uri: Reference) -> Self {
        Self { consul_uri }
    }
}

/// Read access to parameters already loaded by an upstream source
#[cfg_attr(test, automock)]
pub trait ParameterSource: Send + Sync {
    /// Current value of a parameter, `None` when the source never supplied it
    fn peek(
        &self,
        set_name: &str,
        param_name: &str,
    ) -> Result<Option<String>>;
}

/// In-memory [`ParameterSource`]
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    values: ParamValues,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        set_name: &str,
        param_name: &str,
        value: impl Into<String>,
    ) -> Self {
        self.values
            .entry(set_name.to_string())
            .or_default()
            .insert(param_name.to_string(), value.into());
        self
    }
}

impl From<ParamValues> for StaticSource {
    fn from(values: ParamValues) -> Self {
        Self { values }
    }
}

impl ParameterSource for StaticSource {
    fn peek(
        &self,
        set_name: &str,
        param_name: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .values
            .get(set_name)
            .and_then(|set| set.get(param_name))
            .cloned())
    }
}

/// Produces the store address at start-up
pub trait AddressResolver: Send + Sync {
    fn resolve_address(&self) -> Result<String>;
}

/// A fixed address
#[derive(Debug, Clone)]
pub struct StaticAddress(pub String);

impl StaticAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }
}

impl AddressResolver for StaticAddress {
    fn resolve_address(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Reads the address from a parameter of an upstream source
pub struct ReferenceResolver {
    reference: Reference,
    upstream: Arc<dyn ParameterSource>,
}

impl ReferenceResolver {
    pub fn new(
        references: ParameterReferences,
        upstream: Arc<dyn ParameterSource>,
    ) -> Self {
        Self {
            reference: references.consul_uri,
            upstream,
        }
    }
}

impl AddressResolver for ReferenceResolver {
    fn resolve_address(&self) -> Result<String> {
        let value = self
            .upstream
            .peek(&self.reference.set_name, &self.reference.param_name)
            .map_err(|e| StartupError::UpstreamLookup {
                reference: self.reference.to_string(),
                message: e.to_string(),
            })?;

        match value {
            Some(address) => Ok(address),
            None => Err(StartupError::MissingReference {
                reference: self.reference.to_string(),
            }
            .into()),
        }
    }
}
