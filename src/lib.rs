//! Configuration provider backed by the Consul key-value store.
//!
//! Parameters live under a KV prefix as `<prefix>/<name>` (default set) or
//! `<prefix>/<set>/<name>`. A [`ConsulProvider`] loads them once on
//! [`Provider::start`] and then keeps a background worker blocked on the
//! store, handing every changed table to an [`Updater`].
//!
//! ```ignore
//! let provider = ProviderBuilder::new("config/")
//!     .address("127.0.0.1:8500")
//!     .build()?;
//! let initial = provider.start(known, updater).await?;
//! // ...
//! provider.stop().await;
//! ```

mod config;
mod constants;
mod errors;
mod keys;
mod poll;
mod provider;
mod snapshot;
mod store;
mod watch;
pub mod metrics;

pub use config::*;
pub use constants::KEY_SEPARATOR;
pub use errors::*;
pub use keys::*;
pub use poll::*;
pub use provider::*;
pub use snapshot::*;
pub use store::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
