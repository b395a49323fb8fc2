//! ---
//! evc_section: "02-messaging-ipc-data-model"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Bus framing, identifier table and transport adapters."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Identifier table codec.
//!
//! Every mapped field travels as a one-byte frame. Inbound identifiers land
//! in [`InboundPeerStatusBus`]; the six outbound identifiers are published
//! from [`OutboundStatusBus`] in a fixed order.

use std::time::Duration;

use evc_common::time::Clock;
use strum::{Display, EnumIter, IntoStaticStr};
use tracing::{error, trace};

use crate::bus::{InboundPeerStatusBus, OutboundStatusBus};
use crate::frame::{StandardId, WireMessage};
use crate::ids::{self, Autokill, DrivingMode, FailureLevel, ModuleStatus};
use crate::logging::{log_frame, FrameDirection};
use crate::transport::{Transport, TransportError};

/// Default delay inserted between the frames of one publish.
pub const DEFAULT_SPACING: Duration = Duration::from_millis(100);

/// Fields received from peer nodes.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum InboundField {
    Pedal,
    DeadmanSwitch,
    ModeButton,
    PeripheralsStatus,
    BatteryVoltage,
    BatteryCurrent,
    BatteryMinCellVoltage,
    BatteryPower,
    BatteryMaxTemperature,
    BatteryLevel,
    BatteryStatus,
    DcdcBatteryVoltage,
    DcdcOutputVoltage,
    DcdcMaxTemperature,
    DcdcStatus,
    DcdcPower,
    InverterSpeed,
    InverterVoltage,
    InverterCurrent,
    InverterMaxTemperature,
    InverterMotorTemperature,
    InverterPower,
    InverterStatus,
}

impl InboundField {
    /// Wire identifier carrying this field.
    pub const fn identifier(self) -> StandardId {
        match self {
            InboundField::Pedal => ids::PEDAL,
            InboundField::DeadmanSwitch => ids::DEADMAN_SWITCH,
            InboundField::ModeButton => ids::MODE_BUTTON,
            InboundField::PeripheralsStatus => ids::PERIPHERALS_STATUS,
            InboundField::BatteryVoltage => ids::BATTERY_VOLTAGE,
            InboundField::BatteryCurrent => ids::BATTERY_CURRENT,
            InboundField::BatteryMinCellVoltage => ids::BATTERY_MIN_CELL_VOLTAGE,
            InboundField::BatteryPower => ids::BATTERY_POWER,
            InboundField::BatteryMaxTemperature => ids::BATTERY_MAX_TEMPERATURE,
            InboundField::BatteryLevel => ids::BATTERY_LEVEL,
            InboundField::BatteryStatus => ids::BATTERY_STATUS,
            InboundField::DcdcBatteryVoltage => ids::DCDC_BATTERY_VOLTAGE,
            InboundField::DcdcOutputVoltage => ids::DCDC_OUTPUT_VOLTAGE,
            InboundField::DcdcMaxTemperature => ids::DCDC_MAX_TEMPERATURE,
            InboundField::DcdcStatus => ids::DCDC_STATUS,
            InboundField::DcdcPower => ids::DCDC_POWER,
            InboundField::InverterSpeed => ids::INVERTER_SPEED,
            InboundField::InverterVoltage => ids::INVERTER_VOLTAGE,
            InboundField::InverterCurrent => ids::INVERTER_CURRENT,
            InboundField::InverterMaxTemperature => ids::INVERTER_MAX_TEMPERATURE,
            InboundField::InverterMotorTemperature => ids::INVERTER_MOTOR_TEMPERATURE,
            InboundField::InverterPower => ids::INVERTER_POWER,
            InboundField::InverterStatus => ids::INVERTER_STATUS,
        }
    }

    /// Field mapped to `id`, if the identifier belongs to the inbound table.
    pub const fn lookup(id: StandardId) -> Option<Self> {
        let field = match id.as_raw() {
            0x002 => InboundField::Pedal,
            0x003 => InboundField::DeadmanSwitch,
            0x004 => InboundField::ModeButton,
            0x005 => InboundField::PeripheralsStatus,
            0x020 => InboundField::BatteryVoltage,
            0x021 => InboundField::BatteryCurrent,
            0x022 => InboundField::BatteryMinCellVoltage,
            0x023 => InboundField::BatteryPower,
            0x024 => InboundField::BatteryMaxTemperature,
            0x025 => InboundField::BatteryLevel,
            0x026 => InboundField::BatteryStatus,
            0x030 => InboundField::DcdcBatteryVoltage,
            0x031 => InboundField::DcdcOutputVoltage,
            0x032 => InboundField::DcdcMaxTemperature,
            0x033 => InboundField::DcdcStatus,
            0x034 => InboundField::DcdcPower,
            0x040 => InboundField::InverterSpeed,
            0x041 => InboundField::InverterVoltage,
            0x042 => InboundField::InverterCurrent,
            0x043 => InboundField::InverterMaxTemperature,
            0x044 => InboundField::InverterMotorTemperature,
            0x045 => InboundField::InverterPower,
            0x046 => InboundField::InverterStatus,
            _ => return None,
        };
        Some(field)
    }
}

/// Fields published by the control node, in publish order.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum OutboundField {
    Autokill,
    DrivingMode,
    FailureLevel,
    SpeedLevel,
    BoostEnabled,
    ControlReady,
}

impl OutboundField {
    /// Publish order of one status bus snapshot.
    pub const PUBLISH_ORDER: [OutboundField; 6] = [
        OutboundField::Autokill,
        OutboundField::DrivingMode,
        OutboundField::FailureLevel,
        OutboundField::SpeedLevel,
        OutboundField::BoostEnabled,
        OutboundField::ControlReady,
    ];

    /// Wire identifier carrying this field.
    pub const fn identifier(self) -> StandardId {
        match self {
            OutboundField::Autokill => ids::AUTOKILL,
            OutboundField::DrivingMode => ids::DRIVING_MODE,
            OutboundField::FailureLevel => ids::FAILURE_LEVEL,
            OutboundField::SpeedLevel => ids::SPEED_LEVEL,
            OutboundField::BoostEnabled => ids::BOOST_ENABLE,
            OutboundField::ControlReady => ids::CONTROL_READY,
        }
    }

    /// Field mapped to `id`, if the identifier belongs to the outbound table.
    pub const fn lookup(id: StandardId) -> Option<Self> {
        let field = match id.as_raw() {
            0x001 => OutboundField::Autokill,
            0x010 => OutboundField::DrivingMode,
            0x011 => OutboundField::FailureLevel,
            0x012 => OutboundField::SpeedLevel,
            0x013 => OutboundField::BoostEnabled,
            0x014 => OutboundField::ControlReady,
            _ => return None,
        };
        Some(field)
    }

    /// Current wire value of this field on `bus`.
    pub fn value(self, bus: &OutboundStatusBus) -> u8 {
        match self {
            OutboundField::Autokill => bus.autokill.to_wire(),
            OutboundField::DrivingMode => bus.driving_mode.to_wire(),
            OutboundField::FailureLevel => bus.failure_level.to_wire(),
            OutboundField::SpeedLevel => bus.speed_level,
            OutboundField::BoostEnabled => {
                if bus.boost_enabled {
                    ids::BOOST_ENABLED
                } else {
                    ids::BOOST_OFF
                }
            }
            OutboundField::ControlReady => bus.control_ready.to_wire(),
        }
    }
}

/// Result of feeding one frame to [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The frame's first byte now holds `field`.
    Stored(InboundField),
    /// Identifier outside the inbound table: traffic for other nodes.
    Unrecognized,
    /// Mapped identifier but no payload byte to store.
    Empty(InboundField),
}

impl DecodeOutcome {
    /// Whether a bus field was written.
    pub fn is_stored(&self) -> bool {
        matches!(self, DecodeOutcome::Stored(_))
    }
}

/// Store a received frame into the inbound bus, overwriting the previous value.
pub fn decode(message: &WireMessage, bus: &mut InboundPeerStatusBus) -> DecodeOutcome {
    let Some(field) = InboundField::lookup(message.id()) else {
        trace!(id = %message.id(), "ignoring frame outside the identifier table");
        return DecodeOutcome::Unrecognized;
    };
    match message.first_byte() {
        Some(value) => {
            *bus.slot_mut(field) = value;
            DecodeOutcome::Stored(field)
        }
        None => {
            trace!(id = %message.id(), field = %field, "ignoring empty frame");
            DecodeOutcome::Empty(field)
        }
    }
}

/// Apply a status frame to a peer-side copy of the control node's bus.
///
/// Returns `false` for identifiers outside the outbound table and for
/// values the field cannot hold.
pub fn decode_status(message: &WireMessage, bus: &mut OutboundStatusBus) -> bool {
    let (Some(field), Some(value)) = (OutboundField::lookup(message.id()), message.first_byte())
    else {
        return false;
    };
    match field {
        OutboundField::Autokill => Autokill::from_wire(value).map(|v| bus.autokill = v).is_some(),
        OutboundField::DrivingMode => DrivingMode::from_wire(value)
            .map(|v| bus.driving_mode = v)
            .is_some(),
        OutboundField::FailureLevel => FailureLevel::from_wire(value)
            .map(|v| bus.failure_level = v)
            .is_some(),
        OutboundField::SpeedLevel => {
            bus.speed_level = value;
            true
        }
        OutboundField::BoostEnabled => match value {
            ids::BOOST_OFF => {
                bus.boost_enabled = false;
                true
            }
            ids::BOOST_ENABLED => {
                bus.boost_enabled = true;
                true
            }
            _ => false,
        },
        OutboundField::ControlReady => ModuleStatus::from_wire(value)
            .map(|v| bus.control_ready = v)
            .is_some(),
    }
}

/// Snapshot the status bus as six one-byte frames in publish order.
pub fn encode(bus: &OutboundStatusBus) -> [WireMessage; 6] {
    OutboundField::PUBLISH_ORDER.map(|field| WireMessage::byte(field.identifier(), field.value(bus)))
}

/// Publishes the status bus over a transport with fixed inter-frame spacing.
#[derive(Debug, Clone, Copy)]
pub struct StatusEncoder {
    spacing: Duration,
}

impl StatusEncoder {
    /// Encoder with the given spacing between successive frames.
    pub fn new(spacing: Duration) -> Self {
        Self { spacing }
    }

    /// Configured inter-frame spacing.
    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Send all six status frames, blocking on `clock` between them.
    ///
    /// The first failed send aborts the publish; callers treat it as fatal.
    pub fn encode_and_send(
        &self,
        bus: &OutboundStatusBus,
        transport: &dyn Transport,
        clock: &dyn Clock,
    ) -> Result<(), TransportError> {
        for (idx, message) in encode(bus).iter().enumerate() {
            if idx > 0 {
                clock.sleep(self.spacing);
            }
            if let Err(err) = transport.send(message) {
                error!(
                    transport = transport.name(),
                    id = %message.id(),
                    error = %err,
                    "status frame send failed"
                );
                return Err(err);
            }
            log_frame(FrameDirection::Outbound, message);
        }
        Ok(())
    }
}

impl Default for StatusEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_SPACING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    #[test]
    fn inbound_table_is_a_bijection() {
        let mut seen = HashSet::new();
        for field in InboundField::iter() {
            let id = field.identifier();
            assert!(seen.insert(id), "duplicate identifier {}", id);
            assert_eq!(InboundField::lookup(id), Some(field));
            assert_eq!(OutboundField::lookup(id), None);
        }
        assert_eq!(seen.len(), 23);
    }

    #[test]
    fn outbound_table_is_a_bijection() {
        for field in OutboundField::iter() {
            assert_eq!(OutboundField::lookup(field.identifier()), Some(field));
            assert_eq!(InboundField::lookup(field.identifier()), None);
        }
        let order: Vec<u16> = OutboundField::PUBLISH_ORDER
            .iter()
            .map(|f| f.identifier().as_raw())
            .collect();
        assert_eq!(order, vec![0x001, 0x010, 0x011, 0x012, 0x013, 0x014]);
    }

    #[test]
    fn every_inbound_identifier_stores_its_byte() {
        for (value, field) in (0x10u8..).zip(InboundField::iter()) {
            let mut bus = InboundPeerStatusBus::default();
            let outcome = decode(&WireMessage::byte(field.identifier(), value), &mut bus);
            assert_eq!(outcome, DecodeOutcome::Stored(field));
            assert_eq!(bus.get(field), value);
            let mut expected = InboundPeerStatusBus::default();
            *expected.slot_mut(field) = value;
            assert_eq!(bus, expected, "only {} changes", field);
        }
    }

    #[test]
    fn unknown_identifiers_leave_bus_untouched() {
        let mut bus = InboundPeerStatusBus {
            pedal: 9,
            ..Default::default()
        };
        let before = bus;
        for raw in [0x000u16, 0x001, 0x006, 0x014, 0x027, 0x035, 0x047, 0x7FF] {
            let id = StandardId::new(raw).unwrap();
            assert_eq!(
                decode(&WireMessage::byte(id, 0xAA), &mut bus),
                DecodeOutcome::Unrecognized
            );
        }
        assert_eq!(bus, before);
    }

    #[test]
    fn empty_payload_is_not_stored() {
        let mut bus = InboundPeerStatusBus::default();
        let msg = WireMessage::new(ids::BATTERY_STATUS, &[]).unwrap();
        assert_eq!(
            decode(&msg, &mut bus),
            DecodeOutcome::Empty(InboundField::BatteryStatus)
        );
        assert_eq!(bus, InboundPeerStatusBus::default());
    }

    #[test]
    fn last_write_wins() {
        let mut bus = InboundPeerStatusBus::default();
        decode(&WireMessage::byte(ids::PEDAL, 10), &mut bus);
        decode(&WireMessage::byte(ids::PEDAL, 200), &mut bus);
        assert_eq!(bus.pedal, 200);
    }

    #[test]
    fn encode_orders_fields_and_values() {
        let bus = OutboundStatusBus {
            autokill: Autokill::Event,
            driving_mode: DrivingMode::Sport,
            failure_level: FailureLevel::Caution2,
            speed_level: 0xC8,
            boost_enabled: true,
            control_ready: ModuleStatus::Ok,
        };
        let frames = encode(&bus);
        let pairs: Vec<(u16, u8)> = frames
            .iter()
            .map(|m| (m.id().as_raw(), m.first_byte().unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (0x001, 0x01),
                (0x010, 0x04),
                (0x011, 0x02),
                (0x012, 0xC8),
                (0x013, 0x01),
                (0x014, 0x01)
            ]
        );
        assert!(frames.iter().all(|m| m.len() == 1));
    }

    #[test]
    fn peer_side_decode_reads_published_mode() {
        let bus = OutboundStatusBus {
            driving_mode: DrivingMode::Eco,
            ..Default::default()
        };
        let mut peer_view = OutboundStatusBus {
            driving_mode: DrivingMode::Sport,
            ..Default::default()
        };
        for frame in encode(&bus) {
            assert!(decode_status(&frame, &mut peer_view));
        }
        assert_eq!(peer_view.driving_mode, DrivingMode::Eco);
        assert_eq!(peer_view, bus);
    }

    #[test]
    fn peer_side_decode_rejects_invalid_values() {
        let mut view = OutboundStatusBus::default();
        assert!(!decode_status(&WireMessage::byte(ids::DRIVING_MODE, 0x09), &mut view));
        assert!(!decode_status(&WireMessage::byte(ids::BOOST_ENABLE, 0x05), &mut view));
        assert!(!decode_status(&WireMessage::byte(ids::PEDAL, 0x01), &mut view));
        assert_eq!(view, OutboundStatusBus::default());
    }
}
