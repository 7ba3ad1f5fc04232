//! Store abstraction layer with a blocking-query capable Consul implementation
//!
//! The watch engine only needs two read operations, both optionally
//! blocking on a change index:
//! - [`KvStore::list`] returns every pair below a prefix with one subtree index
//! - [`KvStore::get`] returns a single key with its own index
//!
//! Implementations perform no retries; every transport or protocol failure
//! is returned unmodified and retry policy belongs to the watch loop.

mod consul;
pub use consul::*;


use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::StoreConfig;

/// One key as reported by the store
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvPair {
    /// Full path including the prefix
    pub key: String,
    /// Raw payload; empty when the store holds no value
    pub value: Vec<u8>,
    pub create_index: u64,
    pub modify_index: u64,
    pub flags: u64,
}

impl KvPair {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Blocking query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// Block until the store index moves past this value; 0 never blocks
    pub wait_index: u64,
    /// Upper bound the store may hold the query open
    pub wait_time: Duration,
}

impl QueryOptions {
    pub fn blocking(
        wait_index: u64,
        wait_time: Duration,
    ) -> Self {
        Self { wait_index, wait_time }
    }

    pub fn non_blocking() -> Self {
        Self::default()
    }

    pub fn is_blocking(&self) -> bool {
        self.wait_index > 0 && !self.wait_time.is_zero()
    }
}

/// Metadata attached to every store response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryMeta {
    /// Change index of the queried key or subtree
    pub last_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvListing {
    pub pairs: Vec<KvPair>,
    pub meta: QueryMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KvEntry {
    /// `None` when the key does not exist
    pub pair: Option<KvPair>,
    pub meta: QueryMeta,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Lists all pairs below `prefix`.
    ///
    /// # Errors
    /// - [`crate::Error::Cancelled`] if `token` fires while the query is in flight
    /// - [`crate::Error::Store`] for transport and protocol failures
    async fn list(
        &self,
        prefix: &str,
        options: QueryOptions,
        token: &CancellationToken,
    ) -> Result<KvListing>;

    /// Reads a single key.
    ///
    /// A missing key is not an error: it yields an entry without a pair but
    /// still carries the index to block on.
    async fn get(
        &self,
        key: &str,
        options: QueryOptions,
        token: &CancellationToken,
    ) -> Result<KvEntry>;
}

/// Builds the store client once the address is known
pub trait StoreConnector: Send + Sync {
    fn connect(
        &self,
        address: &str,
        config: &StoreConfig,
    ) -> Result<Arc<dyn KvStore>>;
}

/// Default connector producing a [`ConsulClient`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsulConnector;

impl StoreConnector for ConsulConnector {
    fn connect(
        &self,
        address: &str,
        config: &StoreConfig,
    ) -> Result<Arc<dyn KvStore>> {
        Ok(Arc::new(ConsulClient::new(address, config)?))
    }
}
