//! Provider facade.
//!
//! Owns the lifecycle of one background [`WatchWorker`]:
//!
//! ```text
//! start: resolve address -> connect -> spawn worker -> await first table
//! stop:  cancel token -> join worker
//! ```
//!
//! The first cycle runs inside the worker task itself, so the poll cursor is
//! private worker state from the first request on.

mod builder;
mod resolver;
pub use builder::*;
pub use resolver::*;

#[cfg(test)]
mod provider_test;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;

use crate::KnownParameters;
use crate::ParamValues;
use crate::Poller;
use crate::Result;
use crate::SnapshotBuilder;
use crate::StartupError;
use crate::StoreConfig;
use crate::StoreConnector;
use crate::Updater;
use crate::WatchConfig;
use crate::WatchState;
use crate::WatchWorker;

/// A source of application parameters with change notifications
#[async_trait]
pub trait Provider: Send + Sync {
    /// Whether this source only handles command-line flags
    fn is_command_line_flag(&self) -> bool;

    /// Loads the initial table and starts watching for changes.
    ///
    /// Later tables are passed to `updater`. Fails when the store cannot be
    /// reached or the first read fails; no worker keeps running in that case.
    async fn start(
        &self,
        known: Arc<dyn KnownParameters>,
        updater: Arc<dyn Updater>,
    ) -> Result<ParamValues>;

    /// Stops watching. Once this returns, `updater` is not called again.
    async fn stop(&self);
}

struct WorkerHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
    state_rx: watch::Receiver<WatchState>,
}

/// [`Provider`] backed by the Consul KV store
pub struct ConsulProvider {
    resolver: Box<dyn AddressResolver>,
    connector: Arc<dyn StoreConnector>,
    store_config: StoreConfig,
    watch_config: WatchConfig,
    worker: Mutex<Option<WorkerHandle>>,
}

impl ConsulProvider {
    /// Provider whose store address is read from a parameter that
    /// `upstream` has already loaded.
    pub fn from_reference(
        references: ParameterReferences,
        upstream: Arc<dyn ParameterSource>,
        prefix: &str,
    ) -> Self {
        Self::new(
            Box::new(ReferenceResolver::new(references, upstream)),
            Arc::new(crate::ConsulConnector),
            StoreConfig::default(),
            WatchConfig {
                prefix: prefix.to_string(),
                ..WatchConfig::default()
            },
        )
    }

    pub(crate) fn new(
        resolver: Box<dyn AddressResolver>,
        connector: Arc<dyn StoreConnector>,
        store_config: StoreConfig,
        watch_config: WatchConfig,
    ) -> Self {
        Self {
            resolver,
            connector,
            store_config,
            watch_config,
            worker: Mutex::new(None),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.watch_config.prefix
    }

    /// What the worker is doing; [`WatchState::Stopped`] when no worker runs
    pub fn state(&self) -> WatchState {
        self.worker
            .lock()
            .as_ref()
            .map(|worker| *worker.state_rx.borrow())
            .unwrap_or(WatchState::Stopped)
    }

    fn spawn_worker(
        &self,
        known: Arc<dyn KnownParameters>,
        updater: Arc<dyn Updater>,
    ) -> Result<oneshot::Receiver<Result<ParamValues>>> {
        let address = self.resolver.resolve_address()?;
        debug!("Consul URL: {} KV Path: {}", address, self.watch_config.prefix);

        let store = self.connector.connect(&address, &self.store_config)?;

        let poller = Poller::new(
            store,
            &self.watch_config.prefix,
            self.watch_config.mode,
            self.watch_config.wait_time(),
        );
        let builder =
            SnapshotBuilder::new(&self.watch_config.prefix).dump_snapshots(self.watch_config.dump_snapshots);
        let worker = WatchWorker::new(poller, builder, known, updater, self.watch_config.reconnect_delay())
            .report_violations(self.watch_config.report_unknown_keys);

        let mut slot = self.worker.lock();
        if slot.is_some() {
            return Err(StartupError::AlreadyStarted.into());
        }

        let (initial_tx, initial_rx) = oneshot::channel();
        let token = CancellationToken::new();
        let state_rx = worker.subscribe();
        let handle = tokio::spawn(worker.run(initial_tx, token.clone()));
        *slot = Some(WorkerHandle {
            token,
            handle,
            state_rx,
        });

        Ok(initial_rx)
    }

    async fn shutdown_worker(&self) {
        let worker = { self.worker.lock().take() };
        let Some(worker) = worker else {
            return;
        };

        worker.token.cancel();
        if let Err(e) = worker.handle.await {
            error!("update worker failed: {}", e);
        }
    }
}

#[async_trait]
impl Provider for ConsulProvider {
    fn is_command_line_flag(&self) -> bool {
        false
    }

    async fn start(
        &self,
        known: Arc<dyn KnownParameters>,
        updater: Arc<dyn Updater>,
    ) -> Result<ParamValues> {
        if self.worker.lock().is_some() {
            return Err(StartupError::AlreadyStarted.into());
        }

        let initial_rx = self.spawn_worker(known, updater)?;

        match initial_rx.await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(e)) => {
                self.shutdown_worker().await;
                Err(e)
            }
            Err(_) => {
                self.shutdown_worker().await;
                Err(StartupError::WorkerExited.into())
            }
        }
    }

    async fn stop(&self) {
        self.shutdown_worker().await;
    }
}

impl Drop for ConsulProvider {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.token.cancel();
        }
    }
}
