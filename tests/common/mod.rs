//! In-process fake of the Consul KV HTTP API.
//!
//! Supports recursive listings, single-key reads and blocking queries
//! (`index` + `wait`). Tests can inject failures and force the reported
//! index backwards.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use consul_params::KeyViolation;
use consul_params::ParamValues;
use consul_params::Updater;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tracing::Level;
use warp::http::Response;
use warp::http::StatusCode;
use warp::Filter;

pub const LONG_WAIT: Duration = Duration::from_secs(60);
pub const SHORT_DELAY: Duration = Duration::from_millis(100);
pub const UPDATE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct KvState {
    index: u64,
    entries: BTreeMap<String, (Vec<u8>, u64)>,
    fail_next: usize,
    index_override: Option<u64>,
    requests: usize,
}

impl KvState {
    fn reported_index(&self) -> u64 {
        self.index_override.unwrap_or(self.index)
    }
}

pub struct FakeConsul {
    state: Arc<Mutex<KvState>>,
    changed: Arc<watch::Sender<()>>,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeConsul {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(KvState {
            index: 1,
            ..KvState::default()
        }));
        let (changed, _) = watch::channel(());
        let changed = Arc::new(changed);

        let route = warp::get()
            .and(warp::path!("v1" / "kv" / ..))
            .and(warp::path::tail())
            .and(warp::query::<HashMap<String, String>>())
            .and(with_shared(state.clone()))
            .and(with_shared(changed.clone()))
            .and_then(handle_kv);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (addr, server) = warp::serve(route).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async move {
            let _ = shutdown_rx.await;
        });
        tokio::spawn(server);

        Self {
            state,
            changed,
            addr,
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn index(&self) -> u64 {
        self.state.lock().reported_index()
    }

    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }

    /// Writes a key and bumps the store index
    pub fn put(
        &self,
        key: &str,
        value: impl Into<Vec<u8>>,
    ) {
        {
            let mut state = self.state.lock();
            state.index += 1;
            let index = state.index;
            state.entries.insert(key.to_string(), (value.into(), index));
        }
        self.changed.send_replace(());
    }

    pub fn delete(
        &self,
        key: &str,
    ) {
        {
            let mut state = self.state.lock();
            state.index += 1;
            state.entries.remove(key);
        }
        self.changed.send_replace(());
    }

    /// The next `count` requests answer 500
    pub fn fail_next(
        &self,
        count: usize,
    ) {
        self.state.lock().fail_next = count;
    }

    /// Reports `index` from now on, waking blocked queries
    pub fn override_index(
        &self,
        index: u64,
    ) {
        self.state.lock().index_override = Some(index);
        self.changed.send_replace(());
    }
}

impl Drop for FakeConsul {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn with_shared<T: Send + Sync + 'static>(
    value: Arc<T>
) -> impl Filter<Extract = (Arc<T>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || value.clone())
}

fn parse_wait(wait: Option<&String>) -> Duration {
    wait.and_then(|w| w.strip_suffix("ms"))
        .and_then(|ms| ms.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::ZERO)
}

async fn handle_kv(
    tail: warp::path::Tail,
    query: HashMap<String, String>,
    state: Arc<Mutex<KvState>>,
    changed: Arc<watch::Sender<()>>,
) -> Result<Response<String>, warp::Rejection> {
    let key = tail.as_str().to_string();
    let recurse = query.contains_key("recurse");
    let wait_index: u64 = query.get("index").and_then(|i| i.parse().ok()).unwrap_or(0);
    let wait = parse_wait(query.get("wait"));

    {
        let mut state = state.lock();
        state.requests += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body("injected failure".to_string())
                .unwrap());
        }
    }

    if wait_index > 0 {
        let mut rx = changed.subscribe();
        let _ = tokio::time::timeout(wait, async {
            loop {
                let current = { state.lock().reported_index() };
                if current != wait_index || rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
    }

    let state = state.lock();
    let index = state.reported_index();
    let entries: Vec<serde_json::Value> = state
        .entries
        .iter()
        .filter(|(k, _)| if recurse { k.starts_with(&key) } else { **k == key })
        .map(|(k, (value, modify_index))| {
            json!({
                "Key": k,
                "Value": STANDARD.encode(value),
                "CreateIndex": modify_index,
                "ModifyIndex": modify_index,
                "Flags": 0,
            })
        })
        .collect();

    let response = Response::builder().header("X-Consul-Index", index.to_string());
    let response = if entries.is_empty() {
        response.status(StatusCode::NOT_FOUND).body(String::new())
    } else {
        response
            .status(StatusCode::OK)
            .body(serde_json::Value::Array(entries).to_string())
    };
    Ok(response.unwrap())
}

/// Forwards every table to a channel and keeps diagnostics
pub struct ChannelUpdater {
    tx: mpsc::UnboundedSender<ParamValues>,
    logs: Mutex<Vec<(Level, String)>>,
    violations: Mutex<Vec<KeyViolation>>,
}

impl ChannelUpdater {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ParamValues>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let updater = Arc::new(Self {
            tx,
            logs: Mutex::new(vec![]),
            violations: Mutex::new(vec![]),
        });
        (updater, rx)
    }

    pub fn errors(&self) -> Vec<String> {
        self.logs
            .lock()
            .iter()
            .filter(|(level, _)| *level == Level::ERROR)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn violations(&self) -> Vec<KeyViolation> {
        self.violations.lock().clone()
    }
}

impl Updater for ChannelUpdater {
    fn update(
        &self,
        values: ParamValues,
    ) {
        let _ = self.tx.send(values);
    }

    fn log(
        &self,
        level: Level,
        message: &str,
    ) {
        self.logs.lock().push((level, message.to_string()));
    }

    fn report_violations(
        &self,
        violations: &[KeyViolation],
    ) {
        self.violations.lock().extend_from_slice(violations);
    }
}

/// Next table whose value at `(set, name)` equals `expected`
pub async fn wait_for_value(
    rx: &mut mpsc::UnboundedReceiver<ParamValues>,
    set_name: &str,
    param_name: &str,
    expected: &str,
) -> ParamValues {
    tokio::time::timeout(UPDATE_TIMEOUT, async {
        loop {
            let values = rx.recv().await.expect("updater channel open");
            if values.get(set_name).and_then(|set| set.get(param_name)).map(String::as_str) == Some(expected) {
                return values;
            }
        }
    })
    .await
    .expect("update arrives in time")
}
