#![forbid(unsafe_code)]

use serde_json::json;
use wharf_gateway::shape_snapshot;

fn base_obj() -> serde_json::Value {
    json!({
        "apiVersion": "workspace.wharf.dev/v1alpha1",
        "kind": "Workspace",
        "metadata": {
            "name": "ws",
            "namespace": "team-a",
            "uid": "00000000-0000-0000-0000-000000000001",
            "creationTimestamp": "2020-01-01T00:00:00Z",
        },
    })
}

#[test]
fn shapes_a_bare_workspace() {
    let snap = shape_snapshot(&base_obj()).expect("shaped");
    assert_eq!(snap.name, "ws");
    assert_eq!(snap.namespace, "team-a");
    assert_eq!(snap.uid[15], 1);
    assert_eq!(snap.phase, None);
    assert_eq!(snap.access_url, None);
    assert!(!snap.deleting);
    assert!(!snap.infra);
    assert_eq!(snap.creation_ts, 1577836800);
}

#[test]
fn shapes_status_fields() {
    let mut obj = base_obj();
    obj["status"] = json!({
        "phase": "Started",
        "mainUrl": "http://ws.example.test",
        "message": "up",
    });
    let snap = shape_snapshot(&obj).expect("shaped");
    assert_eq!(snap.phase.as_deref(), Some("Started"));
    assert_eq!(snap.access_url.as_deref(), Some("http://ws.example.test"));
    assert_eq!(snap.message.as_deref(), Some("up"));
}

#[test]
fn deletion_timestamp_marks_deleting() {
    let mut obj = base_obj();
    obj["metadata"]["deletionTimestamp"] = json!("2020-01-02T00:00:00Z");
    assert!(shape_snapshot(&obj).expect("shaped").deleting);
}

#[test]
fn component_label_marks_infra() {
    let mut obj = base_obj();
    obj["metadata"]["labels"] = json!({ "wharf.dev/component": "infrastructure" });
    assert!(shape_snapshot(&obj).expect("shaped").infra);

    obj["metadata"]["labels"] = json!({ "wharf.dev/component": "editor" });
    assert!(!shape_snapshot(&obj).expect("shaped").infra);
}

#[test]
fn missing_uid_is_an_error() {
    let obj = json!({ "metadata": { "name": "ws" } });
    assert!(shape_snapshot(&obj).is_err());
}
