//! Wharf core types: workspace snapshots, transitions, status rules.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Stable workspace identity (raw bytes of `metadata.uid`).
pub type Uid = [u8; 16];

/// Render a Uid in canonical uuid form for logs and human output.
pub fn fmt_uid(uid: &Uid) -> String {
    uuid::Uuid::from_bytes(*uid).to_string()
}

/// Canonical status a freshly created workspace is reported as while the
/// remote store has not produced any status yet.
pub const STATUS_STARTING: &str = "STARTING";

/// Terminal phase value; anything equal to this (case-insensitively) is a
/// failed workspace.
pub const PHASE_FAILED: &str = "FAILED";

/// Workspace class label value for infrastructure-only workspaces that are
/// kept out of user-facing views.
pub const CLASS_INFRA: &str = "infrastructure";

/// One point-in-time read of a workspace as reported by the remote store.
/// Snapshots are values; nothing mutates them in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub uid: Uid,
    pub name: String,
    pub namespace: String,
    /// Coarse lifecycle stage (STARTING, STARTED, FAILED, ...). Absent while
    /// the workspace is still materializing.
    pub phase: Option<String>,
    /// URL the user reaches the workspace at, once routing is up.
    pub access_url: Option<String>,
    /// Diagnostic text, usually only populated on failure.
    pub message: Option<String>,
    /// Deletion timestamp present on the resource.
    pub deleting: bool,
    /// Infrastructure-only workspace class, hidden from user views.
    pub infra: bool,
    pub creation_ts: i64,
}

impl WorkspaceSnapshot {
    /// Minimally usable: both a phase and an access URL have been reported.
    pub fn is_ready(&self) -> bool {
        self.phase.is_some() && self.access_url.is_some()
    }

    pub fn workspace_ref(&self) -> WorkspaceRef {
        WorkspaceRef { uid: self.uid, name: self.name.clone(), namespace: self.namespace.clone() }
    }
}

/// Lightweight reference handed to subscribers alongside each transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceRef {
    pub uid: Uid,
    pub name: String,
    pub namespace: String,
}

/// The unit emitted per reconciled workspace per tick. `prev_status` is never
/// absent: a workspace's first observation is reported as a self-transition,
/// so subscribers can tell "just started watching" from "actually changed"
/// without a nullable field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionRecord {
    pub uid: Uid,
    pub status: String,
    pub prev_status: String,
    pub error: Option<String>,
}

/// Transition paired with the workspace it belongs to, as delivered on
/// subscription channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub workspace: WorkspaceRef,
    pub record: TransitionRecord,
}

/// Creation request. Template content is carried opaquely; its shape is the
/// remote store's business.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceSpecRequest {
    pub name: String,
    pub namespace: String,
    pub started: bool,
    pub template: serde_json::Value,
}

/// Errors produced by the reconciliation core for single-workspace reads.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackError {
    /// The remote store reported the workspace as FAILED.
    #[error("workspace failed: {0}")]
    Failed(String),
    /// The workspace never reached phase + access URL completeness within
    /// the attempt budget.
    #[error("workspace {name} in {namespace} did not report a usable status after {attempts} attempts")]
    IncompleteStatus { namespace: String, name: String, attempts: u32 },
}

/// Map a raw reported status onto its canonical uppercase form. Freshly
/// created workspaces report no status at all; those default to STARTING.
pub fn normalize_status(raw: Option<&str>) -> String {
    match raw {
        Some(s) if !s.is_empty() => s.to_ascii_uppercase(),
        _ => STATUS_STARTING.to_string(),
    }
}

/// Inspect a snapshot for terminal failure. Pure: callers decide whether to
/// raise, log, or ignore.
pub fn terminal_failure(snap: &WorkspaceSnapshot) -> Option<TrackError> {
    match snap.phase.as_deref() {
        Some(p) if p.eq_ignore_ascii_case(PHASE_FAILED) => {
            let msg = snap
                .message
                .clone()
                .unwrap_or_else(|| "unknown failure".to_string());
            Some(TrackError::Failed(msg))
        }
        _ => None,
    }
}

pub mod prelude {
    pub use super::{
        fmt_uid, normalize_status, terminal_failure, TrackError, TransitionEvent,
        TransitionRecord, Uid, WorkspaceRef, WorkspaceSnapshot, WorkspaceSpecRequest,
    };
}
