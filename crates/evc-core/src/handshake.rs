//! ---
//! evc_section: "01-core-functionality"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Control node handshake, dispatch and stages."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
//! Startup liveness handshake.
//!
//! The node broadcasts its status with `control_ready = idle` and waits for
//! all four peers to report `ok`. Without readiness the probe is repeated
//! every `timeout`, forever. The handshake only decides; the dispatch
//! machine performs the publishes it asks for.

use std::time::{Duration, Instant};

use evc_msg::{InboundPeerStatusBus, PeerSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Probing,
    Ready,
}

/// What the caller must do after a [`Handshake::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeAction {
    /// Publish the status bus as a liveness probe.
    BroadcastProbe,
    /// Nothing to do this poll.
    Wait,
    /// Every peer reported `ok`; returned once, on the transition.
    Ready,
}

#[derive(Debug, Clone)]
pub struct Handshake {
    phase: HandshakePhase,
    timeout: Duration,
    deadline: Option<Instant>,
    peers_ready: PeerSet,
    probes_sent: u64,
}

impl Handshake {
    pub fn new(timeout: Duration) -> Self {
        Self {
            phase: HandshakePhase::Probing,
            timeout,
            deadline: None,
            peers_ready: PeerSet::empty(),
            probes_sent: 0,
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == HandshakePhase::Ready
    }

    /// Peers whose status read `ok` at the last poll.
    pub fn peers_ready(&self) -> PeerSet {
        self.peers_ready
    }

    /// Probes requested so far, the initial one included.
    pub fn probes_sent(&self) -> u64 {
        self.probes_sent
    }

    /// Instant after which the next probe is due.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Advance the handshake using the current inbound bus.
    ///
    /// The first poll opens the window and always asks for the initial probe.
    /// Later polls check readiness before the deadline, so a poll where both
    /// hold completes the handshake.
    pub fn poll(&mut self, now: Instant, inbound: &InboundPeerStatusBus) -> HandshakeAction {
        if self.phase == HandshakePhase::Ready {
            return HandshakeAction::Wait;
        }

        let Some(deadline) = self.deadline else {
            self.open_window(now);
            info!(timeout_ms = self.timeout.as_millis() as u64, "broadcasting liveness probe");
            return HandshakeAction::BroadcastProbe;
        };

        let ready = inbound.ready_peers();
        if ready != self.peers_ready {
            debug!(peers = ?ready, "peer readiness changed");
        }
        self.peers_ready = ready;

        if ready.is_complete() {
            self.phase = HandshakePhase::Ready;
            info!(probes = self.probes_sent, "all peers report ok");
            return HandshakeAction::Ready;
        }

        if now >= deadline {
            self.open_window(now);
            warn!(
                probes = self.probes_sent,
                ready = ready.len(),
                "handshake timed out; re-probing"
            );
            return HandshakeAction::BroadcastProbe;
        }

        HandshakeAction::Wait
    }

    fn open_window(&mut self, now: Instant) {
        self.deadline = Some(now + self.timeout);
        self.probes_sent += 1;
    }
}
