//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Shared primitives and utilities for the control node."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_node_name() -> String {
    "control".to_owned()
}

fn default_probe_timeout() -> Duration {
    Duration::from_millis(5000)
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_finish_indication() -> Duration {
    Duration::from_millis(3000)
}

fn default_publish_spacing() -> Duration {
    Duration::from_millis(100)
}

fn default_publish_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(10)
}

fn default_eco_percent() -> u8 {
    60
}

fn default_normal_percent() -> u8 {
    80
}

fn default_sport_percent() -> u8 {
    100
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_file_logging() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9899))
}

fn default_response_delay() -> Duration {
    Duration::from_millis(250)
}

fn default_sim_pedal() -> u8 {
    0x40
}

/// Primary configuration object for the control node daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub handshake: HandshakeConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub pedal: PedalConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "EVC_CONFIG";

    /// Load configuration from disk, respecting the `EVC_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// An explicit `EVC_CONFIG` path must exist. Missing candidates are
    /// skipped; when none exists the validated defaults are returned.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!("no configuration file found; using built-in defaults");
        let config = AppConfig::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.handshake.validate()?;
        self.publish.validate()?;
        if self.dispatch.tick_interval.is_zero() {
            return Err(anyhow!("dispatch tick_interval_ms must be greater than zero"));
        }
        self.pedal.validate()?;
        self.transport.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Operating mode for the daemon.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Talk to real peers over the configured transport.
    #[default]
    Production,
    /// Attach the in-process peer simulator.
    Simulation,
}

impl Mode {
    pub fn is_simulation(&self) -> bool {
        matches!(self, Mode::Simulation)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "simulation" => Ok(Mode::Simulation),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_name")]
    pub name: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
        }
    }
}

/// Timing of the startup handshake.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Window after a liveness probe before it is re-broadcast.
    #[serde(rename = "probe_timeout_ms", default = "default_probe_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub probe_timeout: Duration,
    /// Pause between observing every peer ready and publishing readiness.
    #[serde(rename = "settle_delay_ms", default = "default_settle_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub settle_delay: Duration,
    /// Length of the blocking finish-startup indication.
    #[serde(rename = "finish_indication_ms", default = "default_finish_indication")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub finish_indication: Duration,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            probe_timeout: default_probe_timeout(),
            settle_delay: default_settle_delay(),
            finish_indication: default_finish_indication(),
        }
    }
}

impl HandshakeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.probe_timeout.is_zero() {
            return Err(anyhow!("handshake probe_timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

/// Status bus publishing cadence.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Delay inserted between the frames of one publish.
    #[serde(rename = "spacing_ms", default = "default_publish_spacing")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub spacing: Duration,
    /// Period of the status re-publish while operating.
    #[serde(rename = "interval_ms", default = "default_publish_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub interval: Duration,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            spacing: default_publish_spacing(),
            interval: default_publish_interval(),
        }
    }
}

impl PublishConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(anyhow!("publish interval_ms must be greater than zero"));
        }
        Ok(())
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(rename = "tick_interval_ms", default = "default_tick_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
        }
    }
}

/// Share of the pedal travel forwarded as speed level, per driving mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PedalConfig {
    #[serde(default = "default_eco_percent")]
    pub eco_percent: u8,
    #[serde(default = "default_normal_percent")]
    pub normal_percent: u8,
    #[serde(default = "default_sport_percent")]
    pub sport_percent: u8,
}

impl Default for PedalConfig {
    fn default() -> Self {
        Self {
            eco_percent: default_eco_percent(),
            normal_percent: default_normal_percent(),
            sport_percent: default_sport_percent(),
        }
    }
}

impl PedalConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("eco_percent", self.eco_percent),
            ("normal_percent", self.normal_percent),
            ("sport_percent", self.sport_percent),
        ] {
            if value > 100 {
                return Err(anyhow!("pedal {} must be within 0..=100, got {}", name, value));
            }
        }
        Ok(())
    }
}

/// Transport backends selectable at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-process loopback, used for bench runs and simulation.
    #[default]
    Loopback,
    /// Frames tunnelled over UDP datagrams.
    Udp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    #[serde(default)]
    pub udp: Option<UdpConfig>,
}

impl TransportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == TransportKind::Udp && self.udp.is_none() {
            return Err(anyhow!(
                "transport kind 'udp' requires a [transport.udp] section with bind and peer"
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpConfig {
    pub bind: SocketAddr,
    pub peer: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default = "default_file_logging")]
    pub file_enabled: bool,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_enabled: default_file_logging(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

/// Peer simulator settings, only used in [`Mode::Simulation`].
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Delay between seeing a liveness probe and answering with `ok`.
    #[serde(rename = "response_delay_ms", default = "default_response_delay")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub response_delay: Duration,
    /// Peers that stay silent, by name (`bms`, `dcdc`, `inverter`, `peripherals`).
    #[serde(default)]
    pub silent_peers: Vec<String>,
    #[serde(default = "default_sim_pedal")]
    pub pedal: u8,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            response_delay: default_response_delay(),
            silent_peers: Vec::new(),
            pedal: default_sim_pedal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_firmware_timing() {
        let config = AppConfig::default();
        assert_eq!(config.handshake.probe_timeout, Duration::from_millis(5000));
        assert_eq!(config.handshake.finish_indication, Duration::from_millis(3000));
        assert_eq!(config.publish.spacing, Duration::from_millis(100));
        assert_eq!(config.transport.kind, TransportKind::Loopback);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn parses_millisecond_durations() {
        let config: AppConfig = r#"
            mode = "simulation"

            [handshake]
            probe_timeout_ms = 250
            settle_delay_ms = 0

            [publish]
            spacing_ms = 5
            interval_ms = 40
        "#
        .parse()
        .expect("config parses");
        assert!(config.mode.is_simulation());
        assert_eq!(config.handshake.probe_timeout, Duration::from_millis(250));
        assert!(config.handshake.settle_delay.is_zero());
        assert_eq!(config.handshake.finish_indication, Duration::from_millis(3000));
        assert_eq!(config.publish.spacing, Duration::from_millis(5));
        assert_eq!(config.publish.interval, Duration::from_millis(40));
    }

    #[test]
    fn rejects_zero_probe_timeout() {
        let err = "[handshake]\nprobe_timeout_ms = 0\n"
            .parse::<AppConfig>()
            .expect_err("zero timeout rejected");
        assert!(err.to_string().contains("probe_timeout_ms"));
    }

    #[test]
    fn udp_transport_requires_addresses() {
        let err = "[transport]\nkind = \"udp\"\n"
            .parse::<AppConfig>()
            .expect_err("udp without addresses rejected");
        assert!(err.to_string().contains("transport.udp"));

        let config: AppConfig = r#"
            [transport]
            kind = "udp"
            [transport.udp]
            bind = "127.0.0.1:47000"
            peer = "127.0.0.1:47001"
        "#
        .parse()
        .expect("udp config parses");
        assert_eq!(config.transport.kind, TransportKind::Udp);
    }

    #[test]
    fn rejects_pedal_percent_above_hundred() {
        let err = "[pedal]\nsport_percent = 120\n"
            .parse::<AppConfig>()
            .expect_err("percent rejected");
        assert!(err.to_string().contains("sport_percent"));
    }

    #[test]
    fn mode_from_str() {
        assert_eq!("Simulation".parse::<Mode>(), Ok(Mode::Simulation));
        assert!("hybrid".parse::<Mode>().is_err());
    }
}
