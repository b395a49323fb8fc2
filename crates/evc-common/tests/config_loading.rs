//! ---
//! evc_section: "15-testing-qa-runbook"
//! evc_subsection: "integration"
//! evc_type: "source"
//! evc_scope: "test"
//! evc_description: "Configuration discovery and parsing from disk."
//! evc_version: "v0.0.0-prealpha"
//! evc_owner: "tbd"
//! ---
use std::time::Duration;

use evc_common::config::{AppConfig, TransportKind};
use tempfile::tempdir;

#[test]
fn first_existing_candidate_wins() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("evcd.toml");
    std::fs::write(
        &present,
        r#"
[node]
name = "bench-control"

[handshake]
probe_timeout_ms = 1500

[transport]
kind = "loopback"
"#,
    )
    .expect("write config");

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).expect("config loads");
    assert_eq!(loaded.source.as_deref(), Some(present.as_path()));
    assert_eq!(loaded.config.node.name, "bench-control");
    assert_eq!(
        loaded.config.handshake.probe_timeout,
        Duration::from_millis(1500)
    );
    assert_eq!(loaded.config.transport.kind, TransportKind::Loopback);
}

#[test]
fn falls_back_to_defaults_when_nothing_exists() {
    let dir = tempdir().expect("tempdir");
    let loaded = AppConfig::load_with_source(&[dir.path().join("absent.toml")])
        .expect("defaults load");
    assert!(loaded.source.is_none());
    assert_eq!(loaded.config.node.name, "control");
}

#[test]
fn invalid_file_reports_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[publish]\ninterval_ms = 0\n").expect("write config");
    let err = AppConfig::load(&[path.clone()]).expect_err("zero interval rejected");
    assert!(format!("{:#}", err).contains("interval_ms"));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn shipped_daemon_config_is_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/evcd.toml");
    let config = AppConfig::load(&[path]).expect("shipped config loads");
    assert!(config.mode.is_simulation());
    assert_eq!(config.simulation.pedal, 0x40);
    assert_eq!(config.publish.interval, Duration::from_millis(1000));
}
