//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Control node handshake, dispatch and stages."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::time::Duration;

use evc_common::time::Clock;
use evc_msg::{Autokill, DecodedDataBus, DrivingMode, OutboundStatusBus, Peer, PeerSet};
use tracing::info;

/// Driver-facing indications: module LEDs, mode light and buzzer.
pub trait Indicators: Send {
    /// Called on every startup poll with the peers currently reading `ok`.
    fn update_module_indicators(&mut self, ready: PeerSet);

    /// Blocking "startup finished" signal, bounded in time.
    fn finish_startup(&mut self, clock: &dyn Clock);

    /// Stage (f) of the operating pipeline.
    fn update(&mut self, decoded: &DecodedDataBus, outbound: &OutboundStatusBus);
}

/// Peers that own a module LED, in LED order.
const LED_PEERS: [Peer; 3] = [Peer::Bms, Peer::Dcdc, Peer::Inverter];

/// Indicators rendered as log events, emitted only when a light changes.
#[derive(Debug, Clone)]
pub struct TracingIndicators {
    finish_indication: Duration,
    leds: Option<PeerSet>,
    mode: Option<DrivingMode>,
    buzzer: Option<Autokill>,
}

impl TracingIndicators {
    pub fn new(finish_indication: Duration) -> Self {
        Self {
            finish_indication,
            leds: None,
            mode: None,
            buzzer: None,
        }
    }

    /// Module LEDs currently lit.
    pub fn lit(&self) -> PeerSet {
        self.leds.unwrap_or_default()
    }
}

impl Indicators for TracingIndicators {
    fn update_module_indicators(&mut self, ready: PeerSet) {
        let lit: PeerSet = LED_PEERS
            .into_iter()
            .filter(|peer| ready.contains(*peer))
            .collect();
        if self.leds != Some(lit) {
            info!(
                led1 = lit.contains(Peer::Bms),
                led2 = lit.contains(Peer::Dcdc),
                led3 = lit.contains(Peer::Inverter),
                "module indicators"
            );
            self.leds = Some(lit);
        }
    }

    fn finish_startup(&mut self, clock: &dyn Clock) {
        info!(
            duration_ms = self.finish_indication.as_millis() as u64,
            "startup finished indication"
        );
        clock.sleep(self.finish_indication);
    }

    fn update(&mut self, _decoded: &DecodedDataBus, outbound: &OutboundStatusBus) {
        if self.mode != Some(outbound.driving_mode) {
            info!(mode = %outbound.driving_mode, "driving mode indicator");
            self.mode = Some(outbound.driving_mode);
        }
        if self.buzzer != Some(outbound.autokill) {
            info!(
                buzzer = outbound.autokill == Autokill::Event,
                "autokill buzzer"
            );
            self.buzzer = Some(outbound.autokill);
        }
    }
}
