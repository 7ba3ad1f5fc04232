//! Blocking poll client
//!
//! Wraps the store's blocking queries and owns the change-index cursors.
//! A poll returns as soon as the store sees a relevant change, or after the
//! wait time when nothing changed.
//!
//! # Cursor rule
//!
//! The store index normally only grows, but the store may report a smaller
//! one (e.g. after a snapshot restore). A cursor is therefore updated as
//!
//! ```text
//! returned < stored  =>  0         (full resync)
//! otherwise          =>  returned
//! ```
//!
//! The poller performs no retries; errors are returned unmodified.


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::select_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::keys;
use crate::metrics::INDEX_RESET_METRIC;
use crate::Error;
use crate::KnownParameters;
use crate::KvPair;
use crate::KvStore;
use crate::PollMode;
use crate::QueryOptions;
use crate::Result;

/// Next cursor after the store reported `returned` for a query made with `stored`
pub fn next_cursor(
    stored: u64,
    returned: u64,
) -> u64 {
    if returned < stored {
        0
    } else {
        returned
    }
}

pub struct Poller {
    store: Arc<dyn KvStore>,
    prefix: String,
    mode: PollMode,
    wait_time: Duration,
    /// Subtree cursor for list mode
    list_cursor: u64,
    /// Full key path -> cursor for per-key mode
    key_cursors: HashMap<String, u64>,
    primed: bool,
}

impl Poller {
    pub fn new(
        store: Arc<dyn KvStore>,
        prefix: &str,
        mode: PollMode,
        wait_time: Duration,
    ) -> Self {
        Self {
            store,
            prefix: keys::normalize_prefix(prefix),
            mode,
            wait_time,
            list_cursor: 0,
            key_cursors: HashMap::new(),
            primed: false,
        }
    }

    pub fn mode(&self) -> PollMode {
        self.mode
    }

    pub fn list_cursor(&self) -> u64 {
        self.list_cursor
    }

    pub fn key_cursor(
        &self,
        key: &str,
    ) -> Option<u64> {
        self.key_cursors.get(key).copied()
    }

    /// Runs one blocking poll and returns the complete current listing.
    ///
    /// # Errors
    /// - [`Error::Cancelled`] once `token` fires
    /// - Any store error, unmodified
    pub async fn poll(
        &mut self,
        known: &dyn KnownParameters,
        token: &CancellationToken,
    ) -> Result<Vec<KvPair>> {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let pairs = match self.mode {
            PollMode::List => self.poll_list(token).await?,
            PollMode::PerKey => self.poll_keys(known, token).await?,
        };
        self.primed = true;
        Ok(pairs)
    }

    async fn poll_list(
        &mut self,
        token: &CancellationToken,
    ) -> Result<Vec<KvPair>> {
        let options = QueryOptions::blocking(self.list_cursor, self.wait_time);
        let listing = self.store.list(&self.prefix, options, token).await?;

        self.list_cursor = self.advance(&self.prefix, self.list_cursor, listing.meta.last_index);
        debug!(
            "Listed {} pairs under {} (index {})",
            listing.pairs.len(),
            self.prefix,
            listing.meta.last_index
        );

        Ok(listing.pairs)
    }

    /// Waits for the first key to change, then reads every key without
    /// blocking so the result is a full snapshot.
    async fn poll_keys(
        &mut self,
        known: &dyn KnownParameters,
        token: &CancellationToken,
    ) -> Result<Vec<KvPair>> {
        let paths: Vec<String> = known
            .keys()
            .iter()
            .map(|k| keys::join(&self.prefix, &k.set_name, &k.param_name))
            .collect();

        if paths.is_empty() {
            debug!("No parameters to watch under {}", self.prefix);
            if self.primed {
                tokio::select! {
                    _ = tokio::time::sleep(self.wait_time) => {},
                    _ = token.cancelled() => return Err(Error::Cancelled),
                }
            }
            return Ok(Vec::new());
        }

        if self.primed {
            self.wait_for_change(&paths, token).await?;
        }

        let mut pairs = Vec::with_capacity(paths.len());
        for path in paths {
            let entry = self.store.get(&path, QueryOptions::non_blocking(), token).await?;
            let stored = self.key_cursors.get(&path).copied().unwrap_or(0);
            let cursor = self.advance(&path, stored, entry.meta.last_index);
            self.key_cursors.insert(path, cursor);
            pairs.extend(entry.pair);
        }

        Ok(pairs)
    }

    async fn wait_for_change(
        &self,
        paths: &[String],
        token: &CancellationToken,
    ) -> Result<()> {
        let queries = paths.iter().map(|path| {
            let cursor = self.key_cursors.get(path).copied().unwrap_or(0);
            self.store
                .get(path, QueryOptions::blocking(cursor, self.wait_time), token)
        });

        let (first, woken, _) = select_all(queries).await;
        let entry = first?;
        debug!(
            "{} woke up at index {}",
            paths[woken], entry.meta.last_index
        );
        Ok(())
    }

    fn advance(
        &self,
        what: &str,
        stored: u64,
        returned: u64,
    ) -> u64 {
        let next = next_cursor(stored, returned);
        if returned < stored {
            warn!(
                "Index of {} went backwards ({} -> {}); resyncing from 0",
                what, stored, returned
            );
            INDEX_RESET_METRIC.with_label_values(&[self.mode.as_str()]).inc();
        }
        next
    }
}
