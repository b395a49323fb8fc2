//! ---
//! evc_section: "02-messaging-ipc-data-model"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Bus framing, identifier table and transport adapters."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Wire-level building blocks of the control node.
//!
//! A [`WireMessage`] carries one field of one of the status buses. The
//! [`codec`] module owns the fixed identifier table shared with every peer
//! node, and [`transport`] provides the adapters frames travel through.
#![warn(missing_docs)]

pub mod bus;
pub mod codec;
pub mod frame;
pub mod ids;
pub mod logging;
pub mod transport;

pub use bus::{DecodedDataBus, InboundPeerStatusBus, OutboundStatusBus, Peer, PeerSet};
pub use codec::{
    decode, decode_status, encode, DecodeOutcome, InboundField, OutboundField, StatusEncoder,
};
pub use frame::{FrameError, StandardId, WireMessage, MAX_DATAGRAM};
pub use ids::{Autokill, DeadmanSwitch, DrivingMode, FailureLevel, ModeButton, ModuleStatus};
pub use logging::{log_frame, FrameDirection, MessagingMetricsExporter};
pub use transport::{
    build_transport, InMemoryTransport, RxMailbox, Transport, TransportEndpoints,
    TransportError, UdpTransport,
};
