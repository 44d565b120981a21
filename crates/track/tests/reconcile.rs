#![forbid(unsafe_code)]

use rustc_hash::FxHashSet;
use wharf_core::Uid;
use wharf_track::StatusStore;

fn uid(n: u8) -> Uid {
    let mut u = [0u8; 16];
    u[0] = n;
    u
}

#[test]
fn first_observation_self_transitions() {
    let mut store = StatusStore::new();
    let rec = store.reconcile("team-a", uid(1), "STARTING".into(), None);
    assert_eq!(rec.status, "STARTING");
    assert_eq!(rec.prev_status, "STARTING");
    assert_eq!(rec.error, None);
}

#[test]
fn successive_observations_chain_prev_status() {
    let mut store = StatusStore::new();
    let sequence = ["STARTING", "STARTING", "RUNNING", "STOPPING", "STOPPED"];
    let mut prev = sequence[0].to_string();
    for status in sequence {
        let rec = store.reconcile("team-a", uid(1), status.into(), None);
        assert_eq!(rec.prev_status, prev);
        assert_eq!(rec.status, status);
        prev = rec.status;
    }
}

#[test]
fn namespaces_are_isolated_buckets() {
    let mut store = StatusStore::new();
    store.reconcile("team-a", uid(1), "RUNNING".into(), None);
    // Same uid in a different namespace starts from scratch.
    let rec = store.reconcile("team-b", uid(1), "STOPPED".into(), None);
    assert_eq!(rec.prev_status, "STOPPED");
    assert_eq!(store.len("team-a"), 1);
    assert_eq!(store.len("team-b"), 1);
}

#[test]
fn workspaces_track_independently() {
    let mut store = StatusStore::new();
    store.reconcile("team-a", uid(1), "STARTING".into(), None);
    store.reconcile("team-a", uid(2), "RUNNING".into(), None);
    let a = store.reconcile("team-a", uid(1), "RUNNING".into(), None);
    let b = store.reconcile("team-a", uid(2), "RUNNING".into(), None);
    assert_eq!(a.prev_status, "STARTING");
    assert_eq!(b.prev_status, "RUNNING");
}

#[test]
fn prune_forgets_unlisted_workspaces() {
    let mut store = StatusStore::new();
    store.reconcile("team-a", uid(1), "RUNNING".into(), None);
    store.reconcile("team-a", uid(2), "RUNNING".into(), None);

    let mut live = FxHashSet::default();
    live.insert(uid(2));
    assert_eq!(store.prune("team-a", &live), 1);
    assert_eq!(store.len("team-a"), 1);

    // A pruned workspace that reappears self-transitions again.
    let rec = store.reconcile("team-a", uid(1), "STOPPED".into(), None);
    assert_eq!(rec.prev_status, "STOPPED");
}

#[test]
fn prune_on_unknown_namespace_is_noop() {
    let mut store = StatusStore::new();
    assert_eq!(store.prune("nowhere", &FxHashSet::default()), 0);
}

#[test]
fn record_carries_error_text() {
    let mut store = StatusStore::new();
    let rec = store.reconcile("team-a", uid(1), "FAILED".into(), Some("boom".into()));
    assert_eq!(rec.error.as_deref(), Some("boom"));
}
