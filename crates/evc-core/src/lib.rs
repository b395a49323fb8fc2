//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Control node handshake, dispatch and stages."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Control node runtime: startup handshake, dispatch state machine and the
//! operating stages it drives.

pub mod error;
pub mod handshake;
pub mod indicators;
pub mod node;
pub mod sim;
pub mod stages;

pub use error::NodeError;
pub use handshake::{Handshake, HandshakeAction, HandshakePhase};
pub use indicators::{Indicators, TracingIndicators};
pub use node::{ControlNode, NodePhase, NodeSettings};
pub use sim::PeerSimulator;
pub use stages::{
    DataDerivation, DrivingModeSelector, FaultEvaluator, LinearPedalMap, ModeButtonSelector,
    PedalMapper, PeerDataDecoder, PeerStatusFaults, Stages,
};
