//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Control node handshake, dispatch and stages."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Per-tick stages run while the node is operating.
//!
//! Each stage borrows only the buses it reads or writes. The defaults here
//! are deliberately simple and can be replaced through [`Stages`].

use evc_common::config::PedalConfig;
use evc_msg::{
    Autokill, DeadmanSwitch, DecodedDataBus, DrivingMode, FailureLevel, InboundPeerStatusBus,
    ModeButton, ModuleStatus, OutboundStatusBus, Peer,
};
use tracing::{debug, warn};

/// Stage (b): build the typed view from raw inbound bytes.
pub trait DataDerivation: Send {
    fn derive(&mut self, inbound: &InboundPeerStatusBus, decoded: &mut DecodedDataBus);
}

/// Stage (c): assess peer health and set the failure severity.
pub trait FaultEvaluator: Send {
    fn evaluate(&mut self, decoded: &mut DecodedDataBus, outbound: &mut OutboundStatusBus);
}

/// Stage (d): choose the driving mode.
pub trait DrivingModeSelector: Send {
    fn select(&mut self, decoded: &mut DecodedDataBus, outbound: &mut OutboundStatusBus);
}

/// Stage (e): turn pedal position into a speed set-point.
pub trait PedalMapper: Send {
    fn map(&mut self, decoded: &DecodedDataBus, outbound: &mut OutboundStatusBus);
}

/// The replaceable OPERATING stages, in pipeline order.
pub struct Stages {
    pub derivation: Box<dyn DataDerivation>,
    pub faults: Box<dyn FaultEvaluator>,
    pub driving_mode: Box<dyn DrivingModeSelector>,
    pub pedal: Box<dyn PedalMapper>,
}

impl Stages {
    pub fn defaults(pedal: &PedalConfig) -> Self {
        Self {
            derivation: Box::new(PeerDataDecoder),
            faults: Box::new(PeerStatusFaults::default()),
            driving_mode: Box::new(ModeButtonSelector),
            pedal: Box::new(LinearPedalMap::from_config(pedal)),
        }
    }
}

impl std::fmt::Debug for Stages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stages").finish_non_exhaustive()
    }
}

/// Copies raw peer bytes into [`DecodedDataBus`].
///
/// Status bytes outside the encoding read as `error`; an unknown deadman
/// byte reads as not pressed and an unknown button byte as no request.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeerDataDecoder;

impl DataDerivation for PeerDataDecoder {
    fn derive(&mut self, inbound: &InboundPeerStatusBus, decoded: &mut DecodedDataBus) {
        decoded.pedal = inbound.pedal;
        decoded.deadman_switch =
            DeadmanSwitch::from_wire(inbound.deadman_switch).unwrap_or(DeadmanSwitch::NotPressed);
        decoded.mode_button = ModeButton::from_wire(inbound.mode_button).unwrap_or(ModeButton::None);
        decoded.inverter_speed = inbound.inverter_speed;
        decoded.battery_level = inbound.battery_level;
        let status = |peer| inbound.peer_status(peer).unwrap_or(ModuleStatus::Error);
        decoded.bms_status = status(Peer::Bms);
        decoded.dcdc_status = status(Peer::Dcdc);
        decoded.inverter_status = status(Peer::Inverter);
        decoded.peripherals_status = status(Peer::Peripherals);
    }
}

/// Any peer in `error` raises autokill; otherwise everything is ok.
#[derive(Debug, Default, Clone)]
pub struct PeerStatusFaults {
    last: Option<FailureLevel>,
}

impl FaultEvaluator for PeerStatusFaults {
    fn evaluate(&mut self, decoded: &mut DecodedDataBus, outbound: &mut OutboundStatusBus) {
        let failing: Vec<Peer> = Peer::ALL
            .into_iter()
            .filter(|peer| decoded.status(*peer) == ModuleStatus::Error)
            .collect();
        let (level, autokill) = if failing.is_empty() {
            (FailureLevel::Ok, Autokill::Off)
        } else {
            (FailureLevel::Autokill, Autokill::Event)
        };

        if self.last != Some(level) {
            if failing.is_empty() {
                debug!(level = %level, "failure level changed");
            } else {
                warn!(level = %level, peers = ?failing, "peer fault detected");
            }
            self.last = Some(level);
        }

        decoded.failure_level = level;
        outbound.failure_level = level;
        outbound.autokill = autokill;
    }
}

/// Follows the mode button; `none` keeps the current mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct ModeButtonSelector;

impl DrivingModeSelector for ModeButtonSelector {
    fn select(&mut self, decoded: &mut DecodedDataBus, outbound: &mut OutboundStatusBus) {
        if let Some(mode) = decoded.mode_button.requested_mode() {
            if mode != outbound.driving_mode {
                debug!(from = %outbound.driving_mode, to = %mode, "driving mode selected");
            }
            outbound.driving_mode = mode;
        }
        decoded.driving_mode = outbound.driving_mode;
    }
}

/// Speed level proportional to pedal position, scaled per driving mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearPedalMap {
    eco_percent: u8,
    normal_percent: u8,
    sport_percent: u8,
}

impl LinearPedalMap {
    pub fn from_config(config: &PedalConfig) -> Self {
        Self {
            eco_percent: config.eco_percent,
            normal_percent: config.normal_percent,
            sport_percent: config.sport_percent,
        }
    }

    fn percent(&self, mode: DrivingMode) -> u8 {
        match mode {
            DrivingMode::Eco => self.eco_percent,
            DrivingMode::Normal => self.normal_percent,
            DrivingMode::Sport => self.sport_percent,
        }
    }

    /// Speed level for a pedal byte in `mode`.
    pub fn speed_level(&self, pedal: u8, mode: DrivingMode) -> u8 {
        let scaled = u16::from(pedal) * u16::from(self.percent(mode).min(100)) / 100;
        scaled as u8
    }
}

impl PedalMapper for LinearPedalMap {
    fn map(&mut self, decoded: &DecodedDataBus, outbound: &mut OutboundStatusBus) {
        let inhibited = decoded.deadman_switch != DeadmanSwitch::Pressed
            || decoded.failure_level == FailureLevel::Autokill;
        outbound.speed_level = if inhibited {
            0
        } else {
            self.speed_level(decoded.pedal, decoded.driving_mode)
        };
        outbound.boost_enabled =
            decoded.driving_mode == DrivingMode::Sport && decoded.failure_level == FailureLevel::Ok;
    }
}
