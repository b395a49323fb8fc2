//! ---
//! evc_section: "02-messaging-ipc-data-model"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Bus framing, identifier table and transport adapters."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Wire identifiers and single-byte value encodings shared with the peer nodes.
//!
//! These numbers are fixed by the vehicle bus; changing any of them breaks
//! compatibility with the BMS, DC-DC, inverter and peripherals boards.
#![allow(missing_docs)]

use strum::{Display, EnumIter, IntoStaticStr};

use crate::frame::StandardId;

// Published by the control node.
pub const AUTOKILL: StandardId = StandardId::from_static(0x001);
pub const DRIVING_MODE: StandardId = StandardId::from_static(0x010);
pub const FAILURE_LEVEL: StandardId = StandardId::from_static(0x011);
pub const SPEED_LEVEL: StandardId = StandardId::from_static(0x012);
pub const BOOST_ENABLE: StandardId = StandardId::from_static(0x013);
pub const CONTROL_READY: StandardId = StandardId::from_static(0x014);

// Peripherals board.
pub const PEDAL: StandardId = StandardId::from_static(0x002);
pub const DEADMAN_SWITCH: StandardId = StandardId::from_static(0x003);
pub const MODE_BUTTON: StandardId = StandardId::from_static(0x004);
pub const PERIPHERALS_STATUS: StandardId = StandardId::from_static(0x005);

// Battery management system.
pub const BATTERY_VOLTAGE: StandardId = StandardId::from_static(0x020);
pub const BATTERY_CURRENT: StandardId = StandardId::from_static(0x021);
pub const BATTERY_MIN_CELL_VOLTAGE: StandardId = StandardId::from_static(0x022);
pub const BATTERY_POWER: StandardId = StandardId::from_static(0x023);
pub const BATTERY_MAX_TEMPERATURE: StandardId = StandardId::from_static(0x024);
pub const BATTERY_LEVEL: StandardId = StandardId::from_static(0x025);
pub const BATTERY_STATUS: StandardId = StandardId::from_static(0x026);

// DC-DC converter.
pub const DCDC_BATTERY_VOLTAGE: StandardId = StandardId::from_static(0x030);
pub const DCDC_OUTPUT_VOLTAGE: StandardId = StandardId::from_static(0x031);
pub const DCDC_MAX_TEMPERATURE: StandardId = StandardId::from_static(0x032);
pub const DCDC_STATUS: StandardId = StandardId::from_static(0x033);
pub const DCDC_POWER: StandardId = StandardId::from_static(0x034);

// Inverter.
pub const INVERTER_SPEED: StandardId = StandardId::from_static(0x040);
pub const INVERTER_VOLTAGE: StandardId = StandardId::from_static(0x041);
pub const INVERTER_CURRENT: StandardId = StandardId::from_static(0x042);
pub const INVERTER_MAX_TEMPERATURE: StandardId = StandardId::from_static(0x043);
pub const INVERTER_MOTOR_TEMPERATURE: StandardId = StandardId::from_static(0x044);
pub const INVERTER_POWER: StandardId = StandardId::from_static(0x045);
pub const INVERTER_STATUS: StandardId = StandardId::from_static(0x046);

pub const BOOST_OFF: u8 = 0x00;
pub const BOOST_ENABLED: u8 = 0x01;

/// Generates `to_wire`/`from_wire` for a fieldless single-byte enum.
macro_rules! wire_enum {
    ($name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl $name {
            pub const fn to_wire(self) -> u8 {
                self as u8
            }

            pub const fn from_wire(value: u8) -> Option<Self> {
                match value {
                    $($value => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value.to_wire()
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Autokill {
    #[default]
    Off = 0x00,
    Event = 0x01,
}
wire_enum!(Autokill { Off = 0x00, Event = 0x01 });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum DrivingMode {
    #[default]
    Normal = 0x02,
    Eco = 0x03,
    Sport = 0x04,
}
wire_enum!(DrivingMode { Normal = 0x02, Eco = 0x03, Sport = 0x04 });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum FailureLevel {
    Ok = 0x00,
    Caution1 = 0x01,
    Caution2 = 0x02,
    Autokill = 0x03,
}
wire_enum!(FailureLevel { Ok = 0x00, Caution1 = 0x01, Caution2 = 0x02, Autokill = 0x03 });

/// Health reported by every module, including the control node itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ModuleStatus {
    #[default]
    Idle = 0x00,
    Ok = 0x01,
    Error = 0x02,
}
wire_enum!(ModuleStatus { Idle = 0x00, Ok = 0x01, Error = 0x02 });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum DeadmanSwitch {
    Pressed = 0x01,
    #[default]
    NotPressed = 0x02,
}
wire_enum!(DeadmanSwitch { Pressed = 0x01, NotPressed = 0x02 });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ModeButton {
    Normal = 0x01,
    Eco = 0x02,
    Sport = 0x03,
    #[default]
    None = 0x04,
}
wire_enum!(ModeButton { Normal = 0x01, Eco = 0x02, Sport = 0x03, None = 0x04 });

impl ModeButton {
    /// Driving mode requested by the button, if any.
    pub fn requested_mode(self) -> Option<DrivingMode> {
        match self {
            ModeButton::Normal => Some(DrivingMode::Normal),
            ModeButton::Eco => Some(DrivingMode::Eco),
            ModeButton::Sport => Some(DrivingMode::Sport),
            ModeButton::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn wire_values_match_bus_definition() {
        assert_eq!(Autokill::Event.to_wire(), 0x01);
        assert_eq!(DrivingMode::Eco.to_wire(), 0x03);
        assert_eq!(DrivingMode::Sport.to_wire(), 0x04);
        assert_eq!(FailureLevel::Autokill.to_wire(), 0x03);
        assert_eq!(ModuleStatus::Error.to_wire(), 0x02);
        assert_eq!(DeadmanSwitch::NotPressed.to_wire(), 0x02);
        assert_eq!(ModeButton::None.to_wire(), 0x04);
    }

    #[test]
    fn from_wire_inverts_to_wire() {
        for mode in DrivingMode::iter() {
            assert_eq!(DrivingMode::from_wire(mode.to_wire()), Some(mode));
        }
        for status in ModuleStatus::iter() {
            assert_eq!(ModuleStatus::from_wire(status.to_wire()), Some(status));
        }
        assert_eq!(DrivingMode::from_wire(0x01), None);
        assert_eq!(ModuleStatus::from_wire(0x03), None);
    }

    #[test]
    fn button_maps_to_driving_mode() {
        assert_eq!(ModeButton::Eco.requested_mode(), Some(DrivingMode::Eco));
        assert_eq!(ModeButton::None.requested_mode(), None);
    }

    #[test]
    fn names_are_snake_case() {
        assert_eq!(FailureLevel::Caution1.to_string(), "caution1");
        let name: &'static str = DeadmanSwitch::NotPressed.into();
        assert_eq!(name, "not_pressed");
    }
}
