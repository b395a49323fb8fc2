//! ---
//! evc_section: "15-testing-qa-runbook"
//! evc_subsection: "integration"
//! evc_type: "source"
//! evc_scope: "test"
//! evc_description: "Status publishing and peer ingestion over the in-memory transport."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::Result;
use evc_common::time::ManualClock;
use evc_msg::{
    decode, decode_status, ids, DrivingMode, InMemoryTransport, InboundPeerStatusBus,
    OutboundStatusBus, StatusEncoder, Transport, TransportError, WireMessage,
};

struct RejectingTransport;

impl Transport for RejectingTransport {
    fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        Err(TransportError::Rejected {
            id: message.id().to_string(),
            reason: "no acknowledgement".into(),
        })
    }

    fn receive_available(&self) -> bool {
        false
    }

    fn receive_next(&self) -> Option<WireMessage> {
        None
    }

    fn name(&self) -> &'static str {
        "rejecting"
    }
}

#[test]
fn publish_sends_six_frames_in_order_with_spacing() -> Result<()> {
    let clock = ManualClock::new();
    let (node_side, peer_side) = InMemoryTransport::pair();
    let encoder = StatusEncoder::new(Duration::from_millis(100));

    encoder.encode_and_send(&OutboundStatusBus::default(), &node_side, &clock)?;

    let ids: Vec<u16> = peer_side.drain().iter().map(|m| m.id().as_raw()).collect();
    assert_eq!(ids, vec![0x001, 0x010, 0x011, 0x012, 0x013, 0x014]);
    assert_eq!(clock.elapsed(), Duration::from_millis(500));
    Ok(())
}

#[test]
fn publish_stops_at_first_rejected_frame() {
    let clock = ManualClock::new();
    let err = StatusEncoder::default()
        .encode_and_send(&OutboundStatusBus::default(), &RejectingTransport, &clock)
        .expect_err("rejected send surfaces");
    assert!(err.to_string().contains("0x001"));
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[test]
fn eco_mode_round_trips_to_peer_view() -> Result<()> {
    let clock = ManualClock::new();
    let (node_side, peer_side) = InMemoryTransport::pair();
    let bus = OutboundStatusBus {
        driving_mode: DrivingMode::Eco,
        ..Default::default()
    };
    StatusEncoder::new(Duration::ZERO).encode_and_send(&bus, &node_side, &clock)?;

    let mut view = OutboundStatusBus::default();
    while let Some(frame) = peer_side.receive_next() {
        decode_status(&frame, &mut view);
    }
    assert_eq!(view.driving_mode, DrivingMode::Eco);
    Ok(())
}

#[test]
fn peer_frames_land_in_inbound_bus() -> Result<()> {
    let (node_side, peer_side) = InMemoryTransport::pair();
    peer_side.send(&WireMessage::byte(ids::BATTERY_LEVEL, 87))?;
    peer_side.send(&WireMessage::byte(ids::INVERTER_SPEED, 140))?;
    peer_side.send(&WireMessage::new(ids::PEDAL, &[0x33, 0xFF])?)?;

    let mut inbound = InboundPeerStatusBus::default();
    while node_side.receive_available() {
        if let Some(frame) = node_side.receive_next() {
            decode(&frame, &mut inbound);
        }
    }
    assert_eq!(inbound.battery_level, 87);
    assert_eq!(inbound.inverter_speed, 140);
    // only the first payload byte is meaningful
    assert_eq!(inbound.pedal, 0x33);
    Ok(())
}
