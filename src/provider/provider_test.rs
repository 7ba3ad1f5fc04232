use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::test_utils::RecordingUpdater;
use crate::Error;
use crate::KvEntry;
use crate::KvListing;
use crate::KvPair;
use crate::KvStore;
use crate::ParamSchema;
use crate::QueryMeta;
use crate::QueryOptions;
use crate::StoreError;

/// Answers the first list with `initial`, then blocks until cancelled
struct ScriptedStore {
    initial: Option<Vec<KvPair>>,
    calls: AtomicUsize,
}

impl ScriptedStore {
    fn new(initial: Option<Vec<KvPair>>) -> Self {
        Self {
            initial,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl KvStore for ScriptedStore {
    async fn list(
        &self,
        _prefix: &str,
        _options: QueryOptions,
        token: &CancellationToken,
    ) -> crate::Result<KvListing> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return match &self.initial {
                Some(pairs) => Ok(KvListing {
                    pairs: pairs.clone(),
                    meta: QueryMeta { last_index: 1 },
                }),
                None => Err(StoreError::MissingIndexHeader.into()),
            };
        }
        token.cancelled().await;
        Err(Error::Cancelled)
    }

    async fn get(
        &self,
        _key: &str,
        _options: QueryOptions,
        _token: &CancellationToken,
    ) -> crate::Result<KvEntry> {
        Ok(KvEntry::default())
    }
}

/// Hands out a prepared store and remembers the address it was asked for
struct FixedConnector {
    store: Arc<ScriptedStore>,
    addresses: Mutex<Vec<String>>,
}

impl FixedConnector {
    fn new(store: ScriptedStore) -> Arc<Self> {
        Arc::new(Self {
            store: Arc::new(store),
            addresses: Mutex::new(vec![]),
        })
    }
}

impl StoreConnector for FixedConnector {
    fn connect(
        &self,
        address: &str,
        _config: &StoreConfig,
    ) -> crate::Result<Arc<dyn KvStore>> {
        self.addresses.lock().push(address.to_string());
        Ok(self.store.clone())
    }
}

fn known() -> Arc<ParamSchema> {
    Arc::new(ParamSchema::new().with("db", "host").with("", "loglevel"))
}

fn upstream() -> Arc<StaticSource> {
    Arc::new(StaticSource::new().with("", "consul_url", "consul.service:8500"))
}

#[tokio::test]
async fn start_resolves_the_address_and_returns_the_first_table() {
    let connector = FixedConnector::new(ScriptedStore::new(Some(vec![
        KvPair::new("cfg/db/host", "localhost"),
        KvPair::new("cfg/loglevel", "info"),
    ])));
    let provider = ProviderBuilder::new("cfg")
        .from_reference(ParameterReferences::new(Reference::new("", "consul_url")), upstream())
        .connector(connector.clone())
        .build()
        .unwrap();

    let updater = Arc::new(RecordingUpdater::default());
    let initial = provider.start(known(), updater.clone()).await.unwrap();

    assert_eq!(initial["db"]["host"], "localhost");
    assert_eq!(initial[""]["loglevel"], "info");
    assert_eq!(*connector.addresses.lock(), vec!["consul.service:8500".to_string()]);
    assert!(updater.updates().is_empty());

    provider.stop().await;
}

#[tokio::test]
async fn missing_reference_fails_start_without_connecting() {
    let connector = FixedConnector::new(ScriptedStore::new(Some(vec![])));
    let provider = ProviderBuilder::new("cfg")
        .from_reference(
            ParameterReferences::new(Reference::new("", "theconsulurl")),
            Arc::new(StaticSource::new()),
        )
        .connector(connector.clone())
        .build()
        .unwrap();

    let e = provider
        .start(known(), Arc::new(RecordingUpdater::default()))
        .await
        .unwrap_err();

    assert!(e
        .to_string()
        .contains("Consul URL is expected to be provided on parameter \"theconsulurl\""));
    assert!(connector.addresses.lock().is_empty());
    assert_eq!(provider.state(), WatchState::Stopped);
}

#[tokio::test]
async fn first_read_failure_is_returned_and_leaves_no_worker() {
    let connector = FixedConnector::new(ScriptedStore::new(None));
    let provider = ProviderBuilder::new("cfg")
        .address("127.0.0.1:8500")
        .connector(connector)
        .build()
        .unwrap();

    let e = provider
        .start(known(), Arc::new(RecordingUpdater::default()))
        .await
        .unwrap_err();

    assert!(matches!(e, Error::Store(StoreError::MissingIndexHeader)));
    assert_eq!(provider.state(), WatchState::Stopped);
}

#[tokio::test]
async fn second_start_is_rejected_until_stopped() {
    let connector = FixedConnector::new(ScriptedStore::new(Some(vec![])));
    let provider = ProviderBuilder::new("cfg")
        .address("127.0.0.1:8500")
        .connector(connector)
        .build()
        .unwrap();
    let updater = Arc::new(RecordingUpdater::default());

    provider.start(known(), updater.clone()).await.unwrap();
    let e = provider.start(known(), updater).await.unwrap_err();
    assert!(matches!(e, Error::Startup(StartupError::AlreadyStarted)));

    provider.stop().await;
}

#[tokio::test]
async fn stop_interrupts_the_blocking_query_and_is_idempotent() {
    let connector = FixedConnector::new(ScriptedStore::new(Some(vec![])));
    let provider = ProviderBuilder::new("cfg")
        .address("127.0.0.1:8500")
        .connector(connector)
        .build()
        .unwrap();
    let updater = Arc::new(RecordingUpdater::default());

    provider.start(known(), updater.clone()).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), provider.stop())
        .await
        .expect("stop returns without waiting out the query");
    provider.stop().await;

    assert_eq!(provider.state(), WatchState::Stopped);
    assert!(updater.updates().is_empty());
}

#[test]
fn build_requires_an_address_source() {
    let e = ProviderBuilder::new("cfg").build().err().unwrap();
    assert!(matches!(e, Error::Startup(StartupError::MissingResolver)));
}

#[test]
fn build_validates_the_prefix() {
    let e = ProviderBuilder::new("/").address("127.0.0.1:8500").build().err().unwrap();
    assert!(matches!(e, Error::InvalidConfig(_)));
}

#[test]
fn builder_prefix_wins_over_watch_config() {
    let provider = ProviderBuilder::new("app/")
        .address("127.0.0.1:8500")
        .watch_config(WatchConfig {
            prefix: "ignored/".into(),
            ..WatchConfig::default()
        })
        .build()
        .unwrap();

    assert_eq!(provider.prefix(), "app/");
    assert!(!provider.is_command_line_flag());
}

#[test]
fn from_reference_uses_the_given_prefix() {
    let provider = ConsulProvider::from_reference(
        ParameterReferences::new(Reference::new("", "consul_url")),
        upstream(),
        "config/",
    );
    assert_eq!(provider.prefix(), "config/");
    assert_eq!(provider.state(), WatchState::Stopped);
}
