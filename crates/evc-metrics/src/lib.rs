//! ---
//! evc_section: "03-persistence-logging"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Metrics registry, node lifecycle metrics and scrape endpoint."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{
    GaugeVec, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
    TEXT_FORMAT,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Registry shared by the daemon, the node and the transports.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Serve `registry` as Prometheus text at `GET /metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get(move || render(registry.clone())),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to make metrics listener non-blocking")?;
    let bound = std_listener
        .local_addr()
        .context("failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .context("failed to hand metrics listener to tokio")?;

    info!(address = %bound, "metrics endpoint listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics endpoint failed")
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn render(registry: SharedRegistry) -> Response {
    match TextEncoder::new().encode_to_string(&registry.gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT))],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Handle to the running scrape endpoint.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Address actually bound, useful when listening on port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for the server task.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await.context("metrics task panicked")?
    }
}

/// Process-level metrics of `evcd`.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "evcd_starts_total",
            "Number of times the daemon initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.0005, 2.0, 12)
            .context("failed to build config load buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "evcd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("evcd_build_info", "Build metadata of the running daemon"),
            &["version", "profile", "mode"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str, mode: &str) {
        self.build_info
            .with_label_values(&[version, profile, mode])
            .set(1.0);
    }
}

/// Lifecycle metrics of the control node state machine.
#[derive(Clone, Debug)]
pub struct NodeMetrics {
    phase: IntGauge,
    peers_ready: IntGauge,
    probes_total: IntCounter,
    publishes_total: IntCounter,
    ticks_total: IntCounter,
}

impl NodeMetrics {
    /// Phase gauge value while the startup handshake runs.
    pub const PHASE_STARTUP: i64 = 0;
    /// Phase gauge value once the node is operating.
    pub const PHASE_OPERATING: i64 = 1;

    pub fn new(registry: &Registry) -> Result<Self> {
        let phase = IntGauge::with_opts(Opts::new(
            "evc_node_phase",
            "Dispatch phase: 0 startup, 1 operating",
        ))?;
        let peers_ready = IntGauge::with_opts(Opts::new(
            "evc_peers_ready",
            "Peers whose status read ok at the last handshake poll",
        ))?;
        let probes_total = IntCounter::with_opts(Opts::new(
            "evc_liveness_probes_total",
            "Liveness probes broadcast during startup",
        ))?;
        let publishes_total = IntCounter::with_opts(Opts::new(
            "evc_status_publishes_total",
            "Complete status bus publishes",
        ))?;
        let ticks_total = IntCounter::with_opts(Opts::new(
            "evc_node_ticks_total",
            "Node steps executed",
        ))?;

        registry.register(Box::new(phase.clone()))?;
        registry.register(Box::new(peers_ready.clone()))?;
        registry.register(Box::new(probes_total.clone()))?;
        registry.register(Box::new(publishes_total.clone()))?;
        registry.register(Box::new(ticks_total.clone()))?;

        Ok(Self {
            phase,
            peers_ready,
            probes_total,
            publishes_total,
            ticks_total,
        })
    }

    pub fn set_operating(&self, operating: bool) {
        self.phase.set(if operating {
            Self::PHASE_OPERATING
        } else {
            Self::PHASE_STARTUP
        });
    }

    pub fn set_peers_ready(&self, count: usize) {
        self.peers_ready.set(count as i64);
    }

    pub fn inc_probe(&self) {
        self.probes_total.inc();
    }

    pub fn inc_publish(&self) {
        self.publishes_total.inc();
    }

    pub fn inc_tick(&self) {
        self.ticks_total.inc();
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn counter(registry: &Registry, name: &str) -> f64 {
        registry
            .gather()
            .iter()
            .find(|family| family.get_name() == name)
            .map(|family| family.get_metric()[0].get_counter().get_value())
            .unwrap_or_default()
    }

    #[test]
    fn node_metrics_track_lifecycle() {
        let registry = new_registry();
        let metrics = NodeMetrics::new(&registry).expect("register node metrics");
        metrics.inc_probe();
        metrics.inc_probe();
        metrics.inc_publish();
        metrics.set_operating(true);

        assert_eq!(counter(&registry, "evc_liveness_probes_total"), 2.0);
        assert_eq!(counter(&registry, "evc_status_publishes_total"), 1.0);
        let phase = registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == "evc_node_phase")
            .expect("phase family");
        assert_eq!(
            phase.get_metric()[0].get_gauge().get_value() as i64,
            NodeMetrics::PHASE_OPERATING
        );
    }

    #[test]
    fn daemon_metrics_register_once() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(&registry).expect("register daemon metrics");
        metrics.inc_start();
        metrics.set_build_info("0.1.0", "debug", "simulation");
        assert_eq!(counter(&registry, "evcd_starts_total"), 1.0);
        assert!(DaemonMetrics::new(&registry).is_err());
    }

    #[tokio::test]
    async fn endpoint_serves_text_format() {
        let registry = new_registry();
        NodeMetrics::new(&registry)
            .expect("register node metrics")
            .inc_tick();
        let server = spawn_http_server(registry, "127.0.0.1:0".parse().unwrap())
            .expect("spawn endpoint");
        assert_ne!(server.addr().port(), 0);

        let mut stream = tokio::net::TcpStream::connect(server.addr())
            .await
            .expect("connect to endpoint");
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .expect("send scrape request");
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .await
            .expect("read scrape response");

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("text/plain"));
        assert!(response.contains("evc_node_ticks_total 1"));
        server.shutdown().await.expect("clean shutdown");
    }
}
