#![forbid(unsafe_code)]

use std::time::Duration;

use wharf_core::TrackError;
use wharf_gateway::mock::{snapshot, MockGateway};
use wharf_track::{fetch_ready_with, FetchError};

fn ready(ns: &str, name: &str, n: u8) -> wharf_core::WorkspaceSnapshot {
    let mut s = snapshot(ns, name, n);
    s.phase = Some("STARTED".into());
    s.access_url = Some("http://x".into());
    s
}

fn phased(ns: &str, name: &str, n: u8, phase: &str) -> wharf_core::WorkspaceSnapshot {
    let mut s = snapshot(ns, name, n);
    s.phase = Some(phase.into());
    s
}

#[tokio::test]
async fn returns_once_complete_and_stops_fetching() {
    let gw = MockGateway::new();
    // Bare, phase-only, then complete on the third attempt.
    gw.push_snapshot(snapshot("team-a", "ws", 1));
    gw.push_snapshot(phased("team-a", "ws", 1, "STARTING"));
    gw.push_snapshot(ready("team-a", "ws", 1));

    let snap = fetch_ready_with(&gw, "team-a", "ws", 10, Duration::ZERO)
        .await
        .expect("complete snapshot");
    assert_eq!(snap.access_url.as_deref(), Some("http://x"));
    assert_eq!(gw.get_calls("team-a", "ws"), 3);
}

#[tokio::test]
async fn complete_first_try_needs_one_fetch() {
    let gw = MockGateway::new();
    gw.push_snapshot(ready("team-a", "ws", 1));
    fetch_ready_with(&gw, "team-a", "ws", 10, Duration::ZERO)
        .await
        .expect("complete snapshot");
    assert_eq!(gw.get_calls("team-a", "ws"), 1);
}

#[tokio::test]
async fn failed_phase_short_circuits_on_first_attempt() {
    let gw = MockGateway::new();
    let mut s = phased("team-a", "ws", 1, "FAILED");
    s.message = Some("boom".into());
    gw.push_snapshot(s);
    // More snapshots scripted; none of them may be fetched.
    gw.push_snapshot(ready("team-a", "ws", 1));

    let err = fetch_ready_with(&gw, "team-a", "ws", 10, Duration::ZERO)
        .await
        .expect_err("terminal failure");
    match err {
        FetchError::Track(TrackError::Failed(msg)) => assert_eq!(msg, "boom"),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(gw.get_calls("team-a", "ws"), 1);
}

#[tokio::test]
async fn failed_phase_short_circuits_mid_retry() {
    let gw = MockGateway::new();
    gw.push_snapshot(snapshot("team-a", "ws", 1));
    gw.push_snapshot(phased("team-a", "ws", 1, "failed"));

    let err = fetch_ready_with(&gw, "team-a", "ws", 10, Duration::ZERO)
        .await
        .expect_err("terminal failure");
    match err {
        FetchError::Track(TrackError::Failed(msg)) => assert_eq!(msg, "unknown failure"),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(gw.get_calls("team-a", "ws"), 2);
}

#[tokio::test]
async fn exhausted_budget_reports_incomplete_status() {
    let gw = MockGateway::new();
    // Only ever a bare snapshot; the last one repeats for every re-fetch.
    gw.push_snapshot(snapshot("team-a", "ws", 1));

    let err = fetch_ready_with(&gw, "team-a", "ws", 4, Duration::ZERO)
        .await
        .expect_err("incomplete");
    match err {
        FetchError::Track(TrackError::IncompleteStatus { namespace, name, attempts }) => {
            assert_eq!(namespace, "team-a");
            assert_eq!(name, "ws");
            assert_eq!(attempts, 4);
        }
        other => panic!("expected IncompleteStatus, got {other:?}"),
    }
    // Budget bounds total fetches.
    assert_eq!(gw.get_calls("team-a", "ws"), 4);
}

#[tokio::test]
async fn gateway_errors_propagate() {
    let gw = MockGateway::new();
    let err = fetch_ready_with(&gw, "team-a", "missing", 3, Duration::ZERO)
        .await
        .expect_err("not found");
    assert!(matches!(err, FetchError::Gateway(_)));
}
