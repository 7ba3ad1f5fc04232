
use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

lazy_static! {
    pub static ref POLL_CYCLES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("poll_cycles_total", "Completed poll cycles by mode and outcome"),
        &["mode", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref INDEX_RESET_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("index_resets_total", "Cursor resets caused by a decreasing store index"),
        &["mode"]
    )
    .expect("metric can not be created");

    pub static ref IGNORED_KEYS_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("ignored_keys_total", "Store keys left out of a snapshot"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref UPDATES_PUBLISHED_METRIC: IntCounter = IntCounter::new(
        "updates_published_total",
        "Snapshots handed to the update consumer"
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

/// Registers the crate counters into `registry`. Collectors that are
/// already registered are skipped with a warning.
pub(crate) fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(POLL_CYCLES_METRIC.clone()),
        Box::new(INDEX_RESET_METRIC.clone()),
        Box::new(IGNORED_KEYS_METRIC.clone()),
        Box::new(UPDATES_PUBLISHED_METRIC.clone()),
    ];

    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("collector could not be registered: {}", e);
        }
    }
}

/// Serves `/metrics` until `shutdown_signal` changes
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    register_custom_metrics(&REGISTRY);

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (addr, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    info!("Metrics server listening on {}", addr);
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(render_metrics(&REGISTRY))
}

pub(crate) fn render_metrics(registry: &Registry) -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(v) => v,
        Err(e) => {
            error!("custom metrics could not be from_utf8'd: {}", e);
            String::new()
        }
    }
}
