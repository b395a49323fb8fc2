//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Control node handshake, dispatch and stages."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Stand-in for the four peer boards, used by simulation mode and tests.
//!
//! The simulator watches the control node's status publishes. When it sees
//! a liveness probe it schedules an answer after `response_delay`: every
//! non-silent peer reports `ok`, followed by the peripherals readings. After
//! the first answer it refreshes the same frames on every observed publish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use evc_common::config::SimulationConfig;
use evc_common::time::Clock;
use evc_msg::{
    decode_status, ids, DeadmanSwitch, InboundField, ModeButton, ModuleStatus, OutboundField,
    OutboundStatusBus, Peer, PeerSet, Transport, TransportError, WireMessage,
};
use tracing::{debug, info, warn};

pub struct PeerSimulator {
    transport: Box<dyn Transport>,
    clock: Arc<dyn Clock>,
    response_delay: Duration,
    silent: PeerSet,
    pedal: u8,
    mode_button: ModeButton,
    view: OutboundStatusBus,
    answer_at: Option<Instant>,
    answered: bool,
    probes_seen: u64,
}

impl PeerSimulator {
    pub fn new(transport: Box<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        Self::from_config(&SimulationConfig::default(), transport, clock)
    }

    /// Simulator configured from `[simulation]`; unknown peer names are skipped.
    pub fn from_config(
        config: &SimulationConfig,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let silent = config
            .silent_peers
            .iter()
            .filter_map(|name| match name.parse::<Peer>() {
                Ok(peer) => Some(peer),
                Err(err) => {
                    warn!(error = %err, "ignoring silent peer entry");
                    None
                }
            })
            .collect();
        Self {
            transport,
            clock,
            response_delay: config.response_delay,
            silent,
            pedal: config.pedal,
            mode_button: ModeButton::None,
            view: OutboundStatusBus::default(),
            answer_at: None,
            answered: false,
            probes_seen: 0,
        }
    }

    /// Keep `peer` from ever reporting.
    pub fn silence(&mut self, peer: Peer) {
        self.silent.insert(peer);
    }

    pub fn set_pedal(&mut self, pedal: u8) {
        self.pedal = pedal;
    }

    pub fn set_mode_button(&mut self, button: ModeButton) {
        self.mode_button = button;
    }

    /// Control node status as decoded by the peers.
    pub fn view(&self) -> &OutboundStatusBus {
        &self.view
    }

    pub fn probes_seen(&self) -> u64 {
        self.probes_seen
    }

    /// Process published frames and send any answer that is due.
    pub fn poll(&mut self) -> Result<(), TransportError> {
        let mut publish_seen = false;
        while let Some(message) = self.transport.receive_next() {
            if !decode_status(&message, &mut self.view) {
                continue;
            }
            // control_ready closes every publish
            if OutboundField::lookup(message.id()) == Some(OutboundField::ControlReady) {
                publish_seen = true;
                if self.view.control_ready == ModuleStatus::Idle {
                    self.probes_seen += 1;
                    debug!(probes = self.probes_seen, "liveness probe observed");
                    if !self.answered && self.answer_at.is_none() {
                        self.answer_at = Some(self.clock.now() + self.response_delay);
                    }
                }
            }
        }

        let now = self.clock.now();
        if let Some(due) = self.answer_at {
            if now >= due {
                self.answer_at = None;
                self.answered = true;
                info!(silent = ?self.silent, "simulated peers answering probe");
                return self.send_peer_frames();
            }
        }
        if self.answered && publish_seen {
            return self.send_peer_frames();
        }
        Ok(())
    }

    fn send_peer_frames(&self) -> Result<(), TransportError> {
        for peer in Peer::ALL {
            if self.silent.contains(peer) {
                continue;
            }
            let field: InboundField = peer.status_field();
            self.transport.send(&WireMessage::byte(
                field.identifier(),
                ModuleStatus::Ok.to_wire(),
            ))?;
        }
        if !self.silent.contains(Peer::Peripherals) {
            self.transport.send(&WireMessage::byte(ids::PEDAL, self.pedal))?;
            self.transport.send(&WireMessage::byte(
                ids::DEADMAN_SWITCH,
                DeadmanSwitch::Pressed.to_wire(),
            ))?;
            self.transport
                .send(&WireMessage::byte(ids::MODE_BUTTON, self.mode_button.to_wire()))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PeerSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSimulator")
            .field("silent", &self.silent)
            .field("answered", &self.answered)
            .field("probes_seen", &self.probes_seen)
            .finish_non_exhaustive()
    }
}
