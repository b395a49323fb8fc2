//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "binary"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Binary entrypoint for the EVC control node daemon."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use evc_common::config::{AppConfig, Mode};
use evc_common::logging::init_tracing;
use evc_common::time::{Clock, SystemClock};
use evc_core::{ControlNode, PeerSimulator};
use evc_metrics::{new_registry, spawn_http_server, DaemonMetrics, NodeMetrics, SharedRegistry};
use evc_msg::{build_transport, InMemoryTransport, InboundField, MessagingMetricsExporter, OutboundField};
use evc_rt::{drive_blocking, DriveExit, RateLimiter};
use strum::IntoEnumIterator;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATH: &str = "configs/evcd.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "EVC control node daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,

    #[arg(long, value_enum, help = "Override the configured mode")]
    mode: Option<CliMode>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the control node")]
    Run,
    #[command(about = "Load and validate configuration, then exit")]
    CheckConfig,
    #[command(about = "Print the bus identifier table")]
    Table,
}

fn version_string() -> String {
    let profile = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };
    format!("evcd {} ({})", env!("CARGO_PKG_VERSION"), profile)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("{}", version_string());
        return Ok(());
    }

    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::Table = command {
        print_table();
        return Ok(());
    }

    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from(DEFAULT_CONFIG_PATH));

    let load_started = Instant::now();
    let loaded = AppConfig::load_with_source(&candidates)?;
    let load_duration = load_started.elapsed();
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }

    match command {
        Commands::CheckConfig => {
            print_config_summary(&config, loaded.source.as_ref());
            Ok(())
        }
        Commands::Table => Ok(()),
        Commands::Run => {
            init_tracing("evcd", &config.logging)?;
            match &loaded.source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("no configuration file found; running with defaults"),
            }

            let registry = new_registry();
            let daemon_metrics = DaemonMetrics::new(&registry)?;
            daemon_metrics.observe_config_load(load_duration.as_secs_f64());
            daemon_metrics.inc_start();
            daemon_metrics.set_build_info(
                env!("CARGO_PKG_VERSION"),
                if cfg!(debug_assertions) { "debug" } else { "release" },
                mode_label(config.mode),
            );

            run_daemon(config, registry).await
        }
    }
}

async fn run_daemon(config: AppConfig, registry: SharedRegistry) -> Result<()> {
    let metrics_server = if config.metrics.enabled {
        Some(spawn_http_server(registry.clone(), config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let endpoints = build_transport(&config.transport)
        .with_context(|| format!("failed to open {:?} transport", config.transport.kind))?;
    let transport_name = endpoints.node.name();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let node_metrics = NodeMetrics::new(&registry)?;
    let frame_metrics = MessagingMetricsExporter::register(&registry)?;
    let mut node = ControlNode::from_config(&config, endpoints.node, clock.clone())
        .with_metrics(node_metrics, frame_metrics);

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);

    let simulator = match (config.mode, endpoints.bench) {
        (Mode::Simulation, Some(bench)) => Some(spawn_simulator(
            &config,
            bench,
            clock.clone(),
            shutdown_tx.subscribe(),
        )),
        (Mode::Simulation, None) => {
            bail!("simulation mode requires the loopback transport");
        }
        (Mode::Production, Some(_)) => {
            warn!("loopback transport without simulator; no peer will answer the handshake");
            None
        }
        (Mode::Production, None) => None,
    };

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received; shutting down");
                let _ = shutdown_tx.send(());
            }
        });
    }

    info!(
        node = %config.node.name,
        mode = mode_label(config.mode),
        transport = transport_name,
        tick_ms = config.dispatch.tick_interval.as_millis() as u64,
        "control node starting"
    );

    let outcome = drive_blocking(
        RateLimiter::new(config.dispatch.tick_interval),
        shutdown_rx,
        None,
        |_| node.step().map(|_| ()),
    )
    .await;

    let _ = shutdown_tx.send(());
    if let Some(handle) = simulator {
        let _ = handle.await;
    }
    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    match outcome {
        Ok((DriveExit::Shutdown, ticks)) | Ok((DriveExit::TickLimit, ticks)) => {
            info!(ticks, phase = ?node.phase(), "control node stopped");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, ticks = node.ticks(), "fatal control node error");
            Err(err).context("control node stopped on a fatal transport error")
        }
    }
}

fn spawn_simulator(
    config: &AppConfig,
    bench: InMemoryTransport,
    clock: Arc<dyn Clock>,
    mut shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    let mut sim = PeerSimulator::from_config(&config.simulation, Box::new(bench), clock);
    let period = config.dispatch.tick_interval.max(Duration::from_millis(1));
    info!(
        response_delay_ms = config.simulation.response_delay.as_millis() as u64,
        silent = ?config.simulation.silent_peers,
        "peer simulator attached"
    );
    tokio::spawn(async move {
        let mut limiter = RateLimiter::new(period);
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = limiter.tick() => {
                    if let Err(err) = sim.poll() {
                        warn!(error = %err, "peer simulator stopped");
                        break;
                    }
                }
            }
        }
    })
}

fn mode_label(mode: Mode) -> &'static str {
    if mode.is_simulation() {
        "simulation"
    } else {
        "production"
    }
}

fn print_table() {
    println!("{:<6} {:<4} field", "id", "dir");
    for field in OutboundField::PUBLISH_ORDER {
        println!("{:<6} {:<4} {}", field.identifier().to_string(), "out", field);
    }
    for field in InboundField::iter() {
        println!("{:<6} {:<4} {}", field.identifier().to_string(), "in", field);
    }
}

fn print_config_summary(config: &AppConfig, source: Option<&PathBuf>) {
    match source {
        Some(path) => println!("config: {}", path.display()),
        None => println!("config: built-in defaults"),
    }
    println!("mode: {}", mode_label(config.mode));
    println!("node: {}", config.node.name);
    println!(
        "handshake: probe_timeout={}ms settle_delay={}ms finish_indication={}ms",
        config.handshake.probe_timeout.as_millis(),
        config.handshake.settle_delay.as_millis(),
        config.handshake.finish_indication.as_millis()
    );
    println!(
        "publish: spacing={}ms interval={}ms",
        config.publish.spacing.as_millis(),
        config.publish.interval.as_millis()
    );
    println!("transport: {:?}", config.transport.kind);
    println!("configuration ok");
}
