#![forbid(unsafe_code)]

use wharf_core::{normalize_status, terminal_failure, TrackError, WorkspaceSnapshot};

fn snap(phase: Option<&str>, message: Option<&str>) -> WorkspaceSnapshot {
    WorkspaceSnapshot {
        uid: [7u8; 16],
        name: "ws".into(),
        namespace: "team-a".into(),
        phase: phase.map(|s| s.to_string()),
        access_url: None,
        message: message.map(|s| s.to_string()),
        deleting: false,
        infra: false,
        creation_ts: 0,
    }
}

#[test]
fn normalize_defaults_missing_status_to_starting() {
    assert_eq!(normalize_status(None), "STARTING");
    assert_eq!(normalize_status(Some("")), "STARTING");
}

#[test]
fn normalize_uppercases_and_is_idempotent() {
    assert_eq!(normalize_status(Some("running")), "RUNNING");
    assert_eq!(normalize_status(Some("Stopping")), "STOPPING");
    let canon = normalize_status(Some("STARTED"));
    assert_eq!(canon, "STARTED");
    assert_eq!(normalize_status(Some(&canon)), canon);
}

#[test]
fn classifier_extracts_failure_message() {
    match terminal_failure(&snap(Some("FAILED"), Some("boom"))) {
        Some(TrackError::Failed(msg)) => assert_eq!(msg, "boom"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn classifier_falls_back_to_generic_message() {
    match terminal_failure(&snap(Some("FAILED"), None)) {
        Some(TrackError::Failed(msg)) => assert_eq!(msg, "unknown failure"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[test]
fn classifier_is_case_insensitive() {
    assert!(terminal_failure(&snap(Some("failed"), None)).is_some());
    assert!(terminal_failure(&snap(Some("Failed"), Some("x"))).is_some());
}

#[test]
fn classifier_ignores_live_phases() {
    assert!(terminal_failure(&snap(Some("STARTED"), None)).is_none());
    assert!(terminal_failure(&snap(None, Some("still booting"))).is_none());
}
