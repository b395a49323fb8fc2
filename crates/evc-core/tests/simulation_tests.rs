//! ---
//! evc_section: "15-testing-qa-runbook"
//! evc_subsection: "integration"
//! evc_type: "source"
//! evc_scope: "test"
//! evc_description: "Control node against the peer simulator and the paced driver."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use evc_common::config::AppConfig;
use evc_common::time::{ManualClock, SystemClock};
use evc_core::{ControlNode, NodePhase, NodeSettings, PeerSimulator, Stages, TracingIndicators};
use evc_metrics::{new_registry, NodeMetrics};
use evc_msg::{
    build_transport, DrivingMode, InMemoryTransport, MessagingMetricsExporter, ModeButton,
    ModuleStatus, Peer,
};
use evc_rt::{drive_blocking, DriveExit, RateLimiter};
use tokio::sync::broadcast;

const TICK: Duration = Duration::from_millis(10);

#[test]
fn simulated_peers_bring_node_to_operating() {
    let config = AppConfig::default();
    let clock = ManualClock::new();
    let (node_side, bench) = InMemoryTransport::pair();
    let mut node = ControlNode::from_config(&config, Box::new(node_side), Arc::new(clock.clone()));
    let mut sim = PeerSimulator::from_config(
        &config.simulation,
        Box::new(bench),
        Arc::new(clock.clone()),
    );

    for _ in 0..1_000 {
        if node.step().unwrap() == NodePhase::Operating {
            break;
        }
        sim.poll().unwrap();
        clock.advance(TICK);
    }
    assert_eq!(node.phase(), NodePhase::Operating);
    assert_eq!(node.handshake().probes_sent(), 1);

    sim.set_mode_button(ModeButton::Eco);
    for _ in 0..400 {
        node.step().unwrap();
        sim.poll().unwrap();
        clock.advance(TICK);
    }

    assert_eq!(sim.view().control_ready, ModuleStatus::Ok);
    assert_eq!(sim.view().driving_mode, DrivingMode::Eco);
    // default simulated pedal 0x40 scaled by the eco percentage
    assert_eq!(sim.view().speed_level, 38);
}

#[test]
fn silent_peer_keeps_node_probing() {
    let config = AppConfig::default();
    let clock = ManualClock::new();
    let (node_side, bench) = InMemoryTransport::pair();
    let mut node = ControlNode::from_config(&config, Box::new(node_side), Arc::new(clock.clone()));
    let mut sim = PeerSimulator::new(Box::new(bench), Arc::new(clock.clone()));
    sim.silence(Peer::Dcdc);

    while clock.elapsed() < Duration::from_secs(16) {
        node.step().unwrap();
        sim.poll().unwrap();
        clock.advance(TICK);
    }

    assert_eq!(node.phase(), NodePhase::Startup);
    assert_eq!(node.handshake().probes_sent(), 4);
    assert_eq!(sim.probes_seen(), 4);
    assert!(!node.handshake().peers_ready().contains(Peer::Dcdc));
    assert_eq!(node.handshake().peers_ready().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn driver_runs_node_against_simulator() {
    let config = AppConfig::default();
    let endpoints = build_transport(&config.transport).expect("loopback transport");
    let bench = endpoints.bench.expect("loopback exposes a bench endpoint");

    let clock = Arc::new(SystemClock);
    let registry = new_registry();
    let node_metrics = NodeMetrics::new(&registry).expect("node metrics");
    let frame_metrics = MessagingMetricsExporter::register(&registry).expect("frame metrics");
    let settings = NodeSettings {
        probe_timeout: Duration::from_millis(200),
        settle_delay: Duration::from_millis(5),
        publish_spacing: Duration::from_millis(1),
        publish_interval: Duration::from_millis(20),
    };
    let mut node = ControlNode::new(
        settings,
        endpoints.node,
        clock.clone(),
        Stages::defaults(&config.pedal),
        Box::new(TracingIndicators::new(Duration::from_millis(10))),
    )
    .with_metrics(node_metrics, frame_metrics);
    let mut sim_config = config.simulation.clone();
    sim_config.response_delay = Duration::from_millis(5);
    let mut sim = PeerSimulator::from_config(&sim_config, Box::new(bench), clock);

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (exit, ticks) = drive_blocking(
        RateLimiter::new(Duration::from_millis(2)),
        shutdown_rx,
        Some(300),
        |_| -> anyhow::Result<()> {
            node.step()?;
            sim.poll()?;
            Ok(())
        },
    )
    .await
    .expect("no fatal errors");

    assert_eq!(exit, DriveExit::TickLimit);
    assert_eq!(ticks, 300);
    assert_eq!(node.phase(), NodePhase::Operating);
    assert_eq!(sim.view().control_ready, ModuleStatus::Ok);

    let families = registry.gather();
    let phase = families
        .iter()
        .find(|f| f.get_name() == "evc_node_phase")
        .expect("phase gauge");
    assert_eq!(phase.get_metric()[0].get_gauge().get_value() as i64, NodeMetrics::PHASE_OPERATING);
    let received = families
        .iter()
        .find(|f| f.get_name() == "evc_frames_received_total")
        .expect("received counter");
    assert!(received.get_metric()[0].get_counter().get_value() >= 4.0);
}
