//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Control node handshake, dispatch and stages."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Dispatch state machine of the control node.
//!
//! The node starts in [`NodePhase::Startup`], where every step ingests
//! received frames and polls the [`Handshake`]. Once all peers are ready it
//! publishes `control_ready = ok`, plays the finish-startup indication and
//! switches to [`NodePhase::Operating`] for good. Each operating step runs
//! the fixed pipeline: ingest, derive, faults, driving mode, pedal,
//! indicators, then the periodic publish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use evc_common::config::AppConfig;
use evc_common::time::Clock;
use evc_metrics::NodeMetrics;
use evc_msg::{
    decode, log_frame, DecodeOutcome, DecodedDataBus, FrameDirection, InboundPeerStatusBus,
    MessagingMetricsExporter, ModuleStatus, OutboundStatusBus, StatusEncoder, Transport,
};
use strum::IntoStaticStr;
use tracing::{debug, info, trace};

use crate::error::NodeError;
use crate::handshake::{Handshake, HandshakeAction};
use crate::indicators::{Indicators, TracingIndicators};
use crate::stages::Stages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum NodePhase {
    Startup,
    Operating,
}

/// Timing knobs of the node, usually taken from [`AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSettings {
    pub probe_timeout: Duration,
    pub settle_delay: Duration,
    pub publish_spacing: Duration,
    pub publish_interval: Duration,
}

impl NodeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            probe_timeout: config.handshake.probe_timeout,
            settle_delay: config.handshake.settle_delay,
            publish_spacing: config.publish.spacing,
            publish_interval: config.publish.interval,
        }
    }
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// The control node: owns the three buses and lends them to its stages.
pub struct ControlNode {
    settings: NodeSettings,
    phase: NodePhase,
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    encoder: StatusEncoder,
    handshake: Handshake,
    outbound: OutboundStatusBus,
    inbound: InboundPeerStatusBus,
    decoded: DecodedDataBus,
    stages: Stages,
    indicators: Box<dyn Indicators>,
    next_publish: Option<Instant>,
    ticks: u64,
    node_metrics: Option<NodeMetrics>,
    frame_metrics: Option<MessagingMetricsExporter>,
}

impl ControlNode {
    pub fn new(
        settings: NodeSettings,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
        stages: Stages,
        indicators: Box<dyn Indicators>,
    ) -> Self {
        Self {
            settings,
            phase: NodePhase::Startup,
            transport,
            clock,
            encoder: StatusEncoder::new(settings.publish_spacing),
            handshake: Handshake::new(settings.probe_timeout),
            outbound: OutboundStatusBus::default(),
            inbound: InboundPeerStatusBus::default(),
            decoded: DecodedDataBus::default(),
            stages,
            indicators,
            next_publish: None,
            ticks: 0,
            node_metrics: None,
            frame_metrics: None,
        }
    }

    /// Node wired with the default stages and tracing indicators.
    pub fn from_config(
        config: &AppConfig,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            NodeSettings::from_config(config),
            transport,
            clock,
            Stages::defaults(&config.pedal),
            Box::new(TracingIndicators::new(config.handshake.finish_indication)),
        )
    }

    pub fn with_metrics(
        mut self,
        node: NodeMetrics,
        frames: MessagingMetricsExporter,
    ) -> Self {
        node.set_operating(false);
        self.node_metrics = Some(node);
        self.frame_metrics = Some(frames);
        self
    }

    pub fn phase(&self) -> NodePhase {
        self.phase
    }

    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn outbound(&self) -> &OutboundStatusBus {
        &self.outbound
    }

    pub fn inbound(&self) -> &InboundPeerStatusBus {
        &self.inbound
    }

    pub fn decoded(&self) -> &DecodedDataBus {
        &self.decoded
    }

    /// Steps executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one scheduling tick. Any error is fatal to the node.
    pub fn step(&mut self) -> Result<NodePhase, NodeError> {
        self.ticks += 1;
        if let Some(metrics) = &self.node_metrics {
            metrics.inc_tick();
        }
        match self.phase {
            NodePhase::Startup => self.startup_step()?,
            NodePhase::Operating => self.operating_step()?,
        }
        Ok(self.phase)
    }

    fn startup_step(&mut self) -> Result<(), NodeError> {
        self.ingest();
        let now = self.clock.now();
        let action = self.handshake.poll(now, &self.inbound);
        let ready = self.handshake.peers_ready();
        self.indicators.update_module_indicators(ready);
        if let Some(metrics) = &self.node_metrics {
            metrics.set_peers_ready(ready.len());
        }

        match action {
            HandshakeAction::Wait => {}
            HandshakeAction::BroadcastProbe => {
                debug!(probe = self.handshake.probes_sent(), "publishing liveness probe");
                self.publish()?;
                if let Some(metrics) = &self.node_metrics {
                    metrics.inc_probe();
                }
            }
            HandshakeAction::Ready => {
                self.clock.sleep(self.settings.settle_delay);
                self.outbound.control_ready = ModuleStatus::Ok;
                self.publish()?;
                info!(
                    probes = self.handshake.probes_sent(),
                    ticks = self.ticks,
                    "control node ready"
                );
                self.indicators.finish_startup(self.clock.as_ref());
                self.enter_operating();
            }
        }
        Ok(())
    }

    fn enter_operating(&mut self) {
        self.phase = NodePhase::Operating;
        if let Some(metrics) = &self.node_metrics {
            metrics.set_operating(true);
        }
        info!(phase = <&'static str>::from(self.phase), "dispatch phase changed");
    }

    fn operating_step(&mut self) -> Result<(), NodeError> {
        self.ingest();
        self.stages.derivation.derive(&self.inbound, &mut self.decoded);
        self.stages.faults.evaluate(&mut self.decoded, &mut self.outbound);
        self.stages
            .driving_mode
            .select(&mut self.decoded, &mut self.outbound);
        self.stages.pedal.map(&self.decoded, &mut self.outbound);
        self.indicators.update(&self.decoded, &self.outbound);

        let now = self.clock.now();
        if self.next_publish.map_or(true, |due| now >= due) {
            self.next_publish = Some(now + self.settings.publish_interval);
            trace!(tick = self.ticks, "periodic status publish");
            self.publish()?;
        }
        Ok(())
    }

    /// Decode every frame the transport has waiting.
    fn ingest(&mut self) {
        while self.transport.receive_available() {
            let Some(message) = self.transport.receive_next() else {
                break;
            };
            log_frame(FrameDirection::Inbound, &message);
            let outcome = decode(&message, &mut self.inbound);
            if let Some(metrics) = &self.frame_metrics {
                match outcome {
                    DecodeOutcome::Stored(_) => metrics.observe_received(),
                    DecodeOutcome::Unrecognized => metrics.observe_ignored("unrecognized"),
                    DecodeOutcome::Empty(_) => metrics.observe_ignored("empty"),
                }
            }
        }
        if let Some(metrics) = &self.frame_metrics {
            metrics.sync_overruns(self.transport.overruns());
        }
    }

    fn publish(&mut self) -> Result<(), NodeError> {
        let phase: &'static str = self.phase.into();
        match self
            .encoder
            .encode_and_send(&self.outbound, self.transport.as_ref(), self.clock.as_ref())
        {
            Ok(()) => {
                if let Some(metrics) = &self.frame_metrics {
                    metrics.observe_sent(6);
                }
                if let Some(metrics) = &self.node_metrics {
                    metrics.inc_publish();
                }
                Ok(())
            }
            Err(err) => {
                if let Some(metrics) = &self.frame_metrics {
                    metrics.observe_send_failure();
                }
                Err(NodeError::publish(phase, err))
            }
        }
    }
}

impl std::fmt::Debug for ControlNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlNode")
            .field("phase", &self.phase)
            .field("transport", &self.transport.name())
            .field("handshake", &self.handshake)
            .field("outbound", &self.outbound)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}
