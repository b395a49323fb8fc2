//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Shared primitives and utilities for the control node."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Shared primitives for the EVC control node workspace.
//! This crate exposes configuration loading, logging setup and the clock
//! abstraction every timing decision in the node goes through.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, DispatchConfig, HandshakeConfig, LoadedAppConfig, LoggingConfig, MetricsConfig,
    Mode, NodeConfig, PedalConfig, PublishConfig, SimulationConfig, TransportConfig,
    TransportKind, UdpConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use time::{Clock, ManualClock, SystemClock};
