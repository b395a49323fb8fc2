//! ---
//! evc_section: "02-messaging-ipc-data-model"
//! evc_subsection: "module"
//! evc_type: "source"
//! evc_scope: "code"
//! evc_description: "Bus framing, identifier table and transport adapters."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use tracing::trace;

use crate::frame::WireMessage;

/// Direction of frame movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDirection {
    /// Frame handed to a transport.
    Outbound,
    /// Frame taken from a transport.
    Inbound,
}

impl FrameDirection {
    fn as_str(self) -> &'static str {
        match self {
            FrameDirection::Outbound => "outbound",
            FrameDirection::Inbound => "inbound",
        }
    }
}

/// Emit a structured trace entry for a frame.
pub fn log_frame(direction: FrameDirection, message: &WireMessage) {
    trace!(
        id = %message.id(),
        len = message.len(),
        payload = ?message.payload(),
        direction = direction.as_str(),
        "bus frame"
    );
}

/// Prometheus metric handles for bus activity.
#[derive(Clone)]
pub struct MessagingMetricsExporter {
    sent: IntCounter,
    received: IntCounter,
    ignored: IntCounterVec,
    overruns: IntCounter,
    send_failures: IntCounter,
}

impl MessagingMetricsExporter {
    /// Register messaging metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sent = IntCounter::with_opts(Opts::new(
            "evc_frames_sent_total",
            "Frames handed to the transport",
        ))?;
        let received = IntCounter::with_opts(Opts::new(
            "evc_frames_received_total",
            "Frames stored into the inbound bus",
        ))?;
        let ignored = IntCounterVec::new(
            Opts::new(
                "evc_frames_ignored_total",
                "Frames received but not stored, by reason",
            ),
            &["reason"],
        )?;
        let overruns = IntCounter::with_opts(Opts::new(
            "evc_rx_overruns_total",
            "Received frames overwritten before they were consumed",
        ))?;
        let send_failures = IntCounter::with_opts(Opts::new(
            "evc_send_failures_total",
            "Transport send errors",
        ))?;

        registry.register(Box::new(sent.clone()))?;
        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(ignored.clone()))?;
        registry.register(Box::new(overruns.clone()))?;
        registry.register(Box::new(send_failures.clone()))?;

        Ok(Self {
            sent,
            received,
            ignored,
            overruns,
            send_failures,
        })
    }

    /// Record frames sent.
    pub fn observe_sent(&self, count: u64) {
        self.sent.inc_by(count);
    }

    /// Record a frame stored into the inbound bus.
    pub fn observe_received(&self) {
        self.received.inc();
    }

    /// Record a frame discarded during decode.
    pub fn observe_ignored(&self, reason: &str) {
        self.ignored.with_label_values(&[reason]).inc();
    }

    /// Bring the overrun counter up to the transport's running total.
    pub fn sync_overruns(&self, total: u64) {
        let current = self.overruns.get();
        if total > current {
            self.overruns.inc_by(total - current);
        }
    }

    /// Record a failed send.
    pub fn observe_send_failure(&self) {
        self.send_failures.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_exporter_records_counts() {
        let registry = Registry::new();
        let metrics = MessagingMetricsExporter::register(&registry).expect("register metrics");
        metrics.observe_sent(6);
        metrics.observe_received();
        metrics.observe_ignored("unrecognized");
        metrics.sync_overruns(3);
        metrics.sync_overruns(2);

        let families = registry.gather();
        let sent = families
            .iter()
            .find(|f| f.get_name() == "evc_frames_sent_total")
            .expect("sent family");
        assert_eq!(sent.get_metric()[0].get_counter().get_value() as u64, 6);
        let overruns = families
            .iter()
            .find(|f| f.get_name() == "evc_rx_overruns_total")
            .expect("overrun family");
        assert_eq!(overruns.get_metric()[0].get_counter().get_value() as u64, 3);
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        MessagingMetricsExporter::register(&registry).expect("first registration");
        assert!(MessagingMetricsExporter::register(&registry).is_err());
    }
}
