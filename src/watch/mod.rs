//! Background update loop.
//!
//! One worker per provider. Each cycle blocks on the store, rebuilds the
//! parameter table from scratch and hands it to the [`Updater`]. Failed
//! cycles are logged, reported through [`Updater::log`] and retried after a
//! constant delay. The loop only ends when its cancellation token fires.


use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::Level;

use crate::count_values;
use crate::metrics::POLL_CYCLES_METRIC;
use crate::metrics::UPDATES_PUBLISHED_METRIC;
use crate::Error;
use crate::KeyViolation;
use crate::KnownParameters;
use crate::ParamValues;
use crate::Poller;
use crate::Result;
use crate::SnapshotBuilder;
use crate::ViolationKind;

/// Consumer of parameter snapshots
#[cfg_attr(test, automock)]
pub trait Updater: Send + Sync {
    /// Receives a complete table after every successful cycle. Not called for
    /// the first cycle, whose table is returned from start instead.
    fn update(
        &self,
        values: ParamValues,
    );

    /// Diagnostic sink for worker errors
    fn log(
        &self,
        _level: Level,
        _message: &str,
    ) {
    }

    /// Skipped keys of the last cycle. Only called when reporting is enabled
    /// and at least one key was skipped.
    fn report_violations(
        &self,
        _violations: &[KeyViolation],
    ) {
    }
}

/// What the worker is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchState {
    #[default]
    Initializing,
    /// Waiting on a blocking query
    Polling,
    /// Handing a table to the updater
    Updating,
    /// Sleeping after a failed cycle
    Backoff,
    Stopped,
}

pub struct WatchWorker {
    poller: Poller,
    builder: SnapshotBuilder,
    known: Arc<dyn KnownParameters>,
    updater: Arc<dyn Updater>,
    reconnect_delay: Duration,
    report_violations: bool,
    state_tx: watch::Sender<WatchState>,
}

impl WatchWorker {
    pub fn new(
        poller: Poller,
        builder: SnapshotBuilder,
        known: Arc<dyn KnownParameters>,
        updater: Arc<dyn Updater>,
        reconnect_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(WatchState::Initializing);
        Self {
            poller,
            builder,
            known,
            updater,
            reconnect_delay,
            report_violations: false,
            state_tx,
        }
    }

    /// Pass skipped keys to [`Updater::report_violations`]
    pub fn report_violations(
        mut self,
        enable: bool,
    ) -> Self {
        self.report_violations = enable;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.state_tx.subscribe()
    }

    fn set_state(
        &self,
        state: WatchState,
    ) {
        self.state_tx.send_replace(state);
    }

    /// One poll plus rebuild
    async fn cycle(
        &mut self,
        token: &CancellationToken,
    ) -> Result<ParamValues> {
        self.set_state(WatchState::Polling);
        let pairs = self.poller.poll(self.known.as_ref(), token).await?;
        let snapshot = self.builder.build(&pairs, self.known.as_ref());

        for violation in &snapshot.violations {
            let level = match violation.kind {
                ViolationKind::UnknownParameter => Level::INFO,
                _ => Level::DEBUG,
            };
            self.updater.log(level, &violation.to_string());
        }

        if self.report_violations && !snapshot.violations.is_empty() {
            self.updater.report_violations(&snapshot.violations);
        }

        debug!(
            "Built snapshot of {} with {} values from {} pairs",
            self.builder.prefix(),
            count_values(&snapshot.values),
            pairs.len()
        );
        Ok(snapshot.values)
    }

    /// Runs the loop until `token` is cancelled.
    ///
    /// The outcome of the first cycle goes to `initial_tx`; when it fails the
    /// worker exits without retrying. Later cycles feed the updater.
    pub async fn run(
        mut self,
        initial_tx: oneshot::Sender<Result<ParamValues>>,
        token: CancellationToken,
    ) {
        let mode = self.poller.mode().as_str();

        match self.cycle(&token).await {
            Ok(values) => {
                POLL_CYCLES_METRIC.with_label_values(&[mode, "ok"]).inc();
                if initial_tx.send(Ok(values)).is_err() {
                    debug!("Initial snapshot receiver dropped");
                }
            }
            Err(e) => {
                POLL_CYCLES_METRIC.with_label_values(&[mode, "error"]).inc();
                let _ = initial_tx.send(Err(e));
                self.set_state(WatchState::Stopped);
                return;
            }
        }

        info!("update worker started for {}", self.builder.prefix());

        loop {
            if token.is_cancelled() {
                break;
            }

            match self.cycle(&token).await {
                Ok(values) => {
                    POLL_CYCLES_METRIC.with_label_values(&[mode, "ok"]).inc();
                    // A cycle that raced with stop must not publish
                    if token.is_cancelled() {
                        break;
                    }
                    self.set_state(WatchState::Updating);
                    self.updater.update(values);
                    UPDATES_PUBLISHED_METRIC.inc();
                }
                Err(Error::Cancelled) => break,
                Err(e) => {
                    if token.is_cancelled() {
                        break;
                    }
                    POLL_CYCLES_METRIC.with_label_values(&[mode, "error"]).inc();

                    let message = format!("Failed to poll {}: {}", self.builder.prefix(), e);
                    error!("{}", message);
                    self.updater.log(Level::ERROR, &message);

                    self.set_state(WatchState::Backoff);
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        _ = token.cancelled() => break,
                    }
                }
            }
        }

        self.set_state(WatchState::Stopped);
        info!("update worker stopped");
    }
}
