//! ---
//! evc_section: "02-messaging-ipc-data-model"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Bus framing, identifier table and transport adapters."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! The three logical data buses of the control node.
//!
//! * [`OutboundStatusBus`]: state this node publishes.
//! * [`InboundPeerStatusBus`]: last raw byte received for every peer field.
//! * [`DecodedDataBus`]: typed per-tick view derived from the inbound bus.

use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumIter, IntoStaticStr};

use crate::codec::InboundField;
use crate::ids::{
    Autokill, DeadmanSwitch, DrivingMode, FailureLevel, ModeButton, ModuleStatus,
};

/// Status published by the control node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundStatusBus {
    /// Emergency shutdown request.
    pub autokill: Autokill,
    /// Active driving mode.
    pub driving_mode: DrivingMode,
    /// Current failure severity.
    pub failure_level: FailureLevel,
    /// Speed set-point forwarded to the inverter.
    pub speed_level: u8,
    /// Whether boost is allowed.
    pub boost_enabled: bool,
    /// Readiness of the control node, the liveness probe payload.
    pub control_ready: ModuleStatus,
}

impl Default for OutboundStatusBus {
    fn default() -> Self {
        Self {
            autokill: Autokill::Off,
            driving_mode: DrivingMode::Normal,
            failure_level: FailureLevel::Caution1,
            speed_level: 0,
            boost_enabled: false,
            control_ready: ModuleStatus::Idle,
        }
    }
}

/// Peer nodes whose health gates startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Peer {
    /// Battery management system.
    Bms,
    /// DC-DC converter.
    Dcdc,
    /// Motor inverter.
    Inverter,
    /// Pedal, deadman switch and mode buttons board.
    Peripherals,
}

impl Peer {
    /// Every peer, in LED order.
    pub const ALL: [Peer; 4] = [Peer::Bms, Peer::Dcdc, Peer::Inverter, Peer::Peripherals];

    /// Inbound field carrying this peer's module status.
    pub const fn status_field(self) -> InboundField {
        match self {
            Peer::Bms => InboundField::BatteryStatus,
            Peer::Dcdc => InboundField::DcdcStatus,
            Peer::Inverter => InboundField::InverterStatus,
            Peer::Peripherals => InboundField::PeripheralsStatus,
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl FromStr for Peer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bms" | "battery" => Ok(Peer::Bms),
            "dcdc" | "dc-dc" => Ok(Peer::Dcdc),
            "inverter" => Ok(Peer::Inverter),
            "peripherals" => Ok(Peer::Peripherals),
            other => Err(format!("unknown peer: {}", other)),
        }
    }
}

/// Set of peers, stored as a bitmask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerSet(u8);

impl PeerSet {
    /// Empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Add a peer.
    pub fn insert(&mut self, peer: Peer) {
        self.0 |= peer.bit();
    }

    /// Whether `peer` is a member.
    pub fn contains(&self, peer: Peer) -> bool {
        self.0 & peer.bit() != 0
    }

    /// Whether all four peers are members.
    pub fn is_complete(&self) -> bool {
        Peer::ALL.iter().all(|peer| self.contains(*peer))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Members in [`Peer::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = Peer> + '_ {
        Peer::ALL.into_iter().filter(|peer| self.contains(*peer))
    }
}

impl FromIterator<Peer> for PeerSet {
    fn from_iter<I: IntoIterator<Item = Peer>>(iter: I) -> Self {
        let mut set = PeerSet::empty();
        for peer in iter {
            set.insert(peer);
        }
        set
    }
}

impl fmt::Debug for PeerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Latest raw byte received for every mapped peer field.
///
/// Fields are last-write-wins and start at `0x00`, so the four module status
/// fields read `idle` until their peer reports.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InboundPeerStatusBus {
    pub pedal: u8,
    pub deadman_switch: u8,
    pub mode_button: u8,
    pub peripherals_status: u8,

    pub battery_voltage: u8,
    pub battery_current: u8,
    pub battery_min_cell_voltage: u8,
    pub battery_power: u8,
    pub battery_max_temperature: u8,
    pub battery_level: u8,
    pub battery_status: u8,

    pub dcdc_battery_voltage: u8,
    pub dcdc_output_voltage: u8,
    pub dcdc_max_temperature: u8,
    pub dcdc_status: u8,
    pub dcdc_power: u8,

    pub inverter_speed: u8,
    pub inverter_voltage: u8,
    pub inverter_current: u8,
    pub inverter_max_temperature: u8,
    pub inverter_motor_temperature: u8,
    pub inverter_power: u8,
    pub inverter_status: u8,
}

impl InboundPeerStatusBus {
    /// Read a field by table entry.
    pub fn get(&self, field: InboundField) -> u8 {
        match field {
            InboundField::Pedal => self.pedal,
            InboundField::DeadmanSwitch => self.deadman_switch,
            InboundField::ModeButton => self.mode_button,
            InboundField::PeripheralsStatus => self.peripherals_status,
            InboundField::BatteryVoltage => self.battery_voltage,
            InboundField::BatteryCurrent => self.battery_current,
            InboundField::BatteryMinCellVoltage => self.battery_min_cell_voltage,
            InboundField::BatteryPower => self.battery_power,
            InboundField::BatteryMaxTemperature => self.battery_max_temperature,
            InboundField::BatteryLevel => self.battery_level,
            InboundField::BatteryStatus => self.battery_status,
            InboundField::DcdcBatteryVoltage => self.dcdc_battery_voltage,
            InboundField::DcdcOutputVoltage => self.dcdc_output_voltage,
            InboundField::DcdcMaxTemperature => self.dcdc_max_temperature,
            InboundField::DcdcStatus => self.dcdc_status,
            InboundField::DcdcPower => self.dcdc_power,
            InboundField::InverterSpeed => self.inverter_speed,
            InboundField::InverterVoltage => self.inverter_voltage,
            InboundField::InverterCurrent => self.inverter_current,
            InboundField::InverterMaxTemperature => self.inverter_max_temperature,
            InboundField::InverterMotorTemperature => self.inverter_motor_temperature,
            InboundField::InverterPower => self.inverter_power,
            InboundField::InverterStatus => self.inverter_status,
        }
    }

    /// Mutable access to a field by table entry; only the codec writes here.
    pub(crate) fn slot_mut(&mut self, field: InboundField) -> &mut u8 {
        match field {
            InboundField::Pedal => &mut self.pedal,
            InboundField::DeadmanSwitch => &mut self.deadman_switch,
            InboundField::ModeButton => &mut self.mode_button,
            InboundField::PeripheralsStatus => &mut self.peripherals_status,
            InboundField::BatteryVoltage => &mut self.battery_voltage,
            InboundField::BatteryCurrent => &mut self.battery_current,
            InboundField::BatteryMinCellVoltage => &mut self.battery_min_cell_voltage,
            InboundField::BatteryPower => &mut self.battery_power,
            InboundField::BatteryMaxTemperature => &mut self.battery_max_temperature,
            InboundField::BatteryLevel => &mut self.battery_level,
            InboundField::BatteryStatus => &mut self.battery_status,
            InboundField::DcdcBatteryVoltage => &mut self.dcdc_battery_voltage,
            InboundField::DcdcOutputVoltage => &mut self.dcdc_output_voltage,
            InboundField::DcdcMaxTemperature => &mut self.dcdc_max_temperature,
            InboundField::DcdcStatus => &mut self.dcdc_status,
            InboundField::DcdcPower => &mut self.dcdc_power,
            InboundField::InverterSpeed => &mut self.inverter_speed,
            InboundField::InverterVoltage => &mut self.inverter_voltage,
            InboundField::InverterCurrent => &mut self.inverter_current,
            InboundField::InverterMaxTemperature => &mut self.inverter_max_temperature,
            InboundField::InverterMotorTemperature => &mut self.inverter_motor_temperature,
            InboundField::InverterPower => &mut self.inverter_power,
            InboundField::InverterStatus => &mut self.inverter_status,
        }
    }

    /// Raw status byte last reported by `peer`.
    pub fn status_byte(&self, peer: Peer) -> u8 {
        self.get(peer.status_field())
    }

    /// Decoded status of `peer`; `None` for bytes outside the status encoding.
    pub fn peer_status(&self, peer: Peer) -> Option<ModuleStatus> {
        ModuleStatus::from_wire(self.status_byte(peer))
    }

    /// Peers whose status currently reads `ok`.
    pub fn ready_peers(&self) -> PeerSet {
        Peer::ALL
            .into_iter()
            .filter(|peer| self.status_byte(*peer) == ModuleStatus::Ok.to_wire())
            .collect()
    }

    /// Whether all four peer status fields read `ok` right now.
    pub fn all_peers_ok(&self) -> bool {
        self.ready_peers().is_complete()
    }
}

/// Typed per-tick view of the peers, produced by the derivation stage.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedDataBus {
    pub pedal: u8,
    pub deadman_switch: DeadmanSwitch,
    pub mode_button: ModeButton,
    pub inverter_speed: u8,
    pub battery_level: u8,
    pub bms_status: ModuleStatus,
    pub dcdc_status: ModuleStatus,
    pub inverter_status: ModuleStatus,
    pub peripherals_status: ModuleStatus,
    /// Mode chosen by the driving-mode stage.
    pub driving_mode: DrivingMode,
    /// Severity chosen by the fault stage.
    pub failure_level: FailureLevel,
}

impl Default for DecodedDataBus {
    fn default() -> Self {
        Self {
            pedal: 0,
            deadman_switch: DeadmanSwitch::NotPressed,
            mode_button: ModeButton::None,
            inverter_speed: 0,
            battery_level: 0,
            bms_status: ModuleStatus::Idle,
            dcdc_status: ModuleStatus::Idle,
            inverter_status: ModuleStatus::Idle,
            peripherals_status: ModuleStatus::Idle,
            driving_mode: DrivingMode::Normal,
            failure_level: FailureLevel::Caution1,
        }
    }
}

impl DecodedDataBus {
    /// Decoded status of `peer`.
    pub fn status(&self, peer: Peer) -> ModuleStatus {
        match peer {
            Peer::Bms => self.bms_status,
            Peer::Dcdc => self.dcdc_status,
            Peer::Inverter => self.inverter_status,
            Peer::Peripherals => self.peripherals_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_defaults_follow_power_on_state() {
        let bus = OutboundStatusBus::default();
        assert_eq!(bus.control_ready, ModuleStatus::Idle);
        assert_eq!(bus.failure_level, FailureLevel::Caution1);
        assert_eq!(bus.driving_mode, DrivingMode::Normal);
        assert!(!bus.boost_enabled);
    }

    #[test]
    fn inbound_starts_with_every_peer_idle() {
        let bus = InboundPeerStatusBus::default();
        for peer in Peer::ALL {
            assert_eq!(bus.peer_status(peer), Some(ModuleStatus::Idle));
        }
        assert!(bus.ready_peers().is_empty());
        assert!(!bus.all_peers_ok());
    }

    #[test]
    fn ready_peers_tracks_ok_statuses_only() {
        let mut bus = InboundPeerStatusBus {
            battery_status: ModuleStatus::Ok.to_wire(),
            dcdc_status: ModuleStatus::Error.to_wire(),
            inverter_status: ModuleStatus::Ok.to_wire(),
            peripherals_status: 0x7F,
            ..Default::default()
        };
        let ready = bus.ready_peers();
        assert_eq!(ready.len(), 2);
        assert!(ready.contains(Peer::Bms));
        assert!(ready.contains(Peer::Inverter));
        assert_eq!(bus.peer_status(Peer::Peripherals), None);

        bus.dcdc_status = ModuleStatus::Ok.to_wire();
        bus.peripherals_status = ModuleStatus::Ok.to_wire();
        assert!(bus.all_peers_ok());
    }

    #[test]
    fn peer_names_parse() {
        assert_eq!("BMS".parse::<Peer>(), Ok(Peer::Bms));
        assert_eq!("dc-dc".parse::<Peer>(), Ok(Peer::Dcdc));
        assert!("charger".parse::<Peer>().is_err());
        assert_eq!(Peer::Peripherals.to_string(), "peripherals");
    }
}
