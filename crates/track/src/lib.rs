//! Wharf track: the status reconciliation core.
//!
//! Holds the per-namespace status store and diff engine, the bounded retry
//! fetcher for single-workspace reads, and the polling loop that turns raw
//! listings into transition events.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use metrics::counter;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use wharf_core::{
    normalize_status, terminal_failure, TrackError, TransitionEvent, TransitionRecord, Uid,
    WorkspaceSnapshot,
};
use wharf_gateway::WorkspaceGateway;

/// Default attempt budget for [`fetch_ready`].
pub const DEFAULT_GET_RETRIES: u32 = 10;

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Poll tick granularity; also the retry fetcher's per-attempt delay.
pub fn poll_interval() -> Duration {
    Duration::from_millis(env_u64("WHARF_POLL_MS", 1000))
}

// ----------------- Status store + diff engine -----------------

/// Per-namespace memory of the last emitted transition per workspace.
///
/// The store is an owned value, not process-global state; the polling loop
/// that owns it is its only writer, which is what makes the per-workspace
/// prev/next chaining strictly sequential.
#[derive(Debug, Default)]
pub struct StatusStore {
    buckets: FxHashMap<String, FxHashMap<Uid, TransitionRecord>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, namespace: &str) -> usize {
        self.buckets.get(namespace).map(|b| b.len()).unwrap_or(0)
    }

    /// Diff a freshly normalized status against the last emitted record and
    /// commit the result before returning it.
    ///
    /// A workspace's first observation self-transitions (`prev_status ==
    /// status`) rather than transitioning from an undefined state.
    pub fn reconcile(
        &mut self,
        namespace: &str,
        uid: Uid,
        status: String,
        error: Option<String>,
    ) -> TransitionRecord {
        let bucket = self.buckets.entry(namespace.to_string()).or_default();
        let prev_status = match bucket.get(&uid) {
            Some(prior) => prior.status.clone(),
            None => status.clone(),
        };
        let record = TransitionRecord { uid, status, prev_status, error };
        bucket.insert(uid, record.clone());
        record
    }

    /// Forget workspaces absent from the latest listing so the store tracks
    /// the live set instead of growing for the life of the process. Returns
    /// the number of entries dropped.
    pub fn prune(&mut self, namespace: &str, live: &FxHashSet<Uid>) -> usize {
        match self.buckets.get_mut(namespace) {
            Some(bucket) => {
                let before = bucket.len();
                bucket.retain(|uid, _| live.contains(uid));
                before - bucket.len()
            }
            None => 0,
        }
    }
}

// ----------------- Retry fetcher -----------------

/// Errors from [`fetch_ready`]: either a core status verdict or a transport
/// failure from the gateway.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Track(#[from] TrackError),
    #[error(transparent)]
    Gateway(#[from] anyhow::Error),
}

/// Fetch a workspace until it is minimally usable (phase and access URL both
/// reported), re-fetching at the poll cadence until the attempt budget is
/// spent. Never issues more than `max_attempts` fetches; a FAILED phase
/// short-circuits on whichever attempt observes it.
pub async fn fetch_ready(
    gateway: &dyn WorkspaceGateway,
    namespace: &str,
    name: &str,
    max_attempts: u32,
) -> Result<WorkspaceSnapshot, FetchError> {
    fetch_ready_with(gateway, namespace, name, max_attempts, poll_interval()).await
}

/// [`fetch_ready`] with an explicit per-attempt delay.
pub async fn fetch_ready_with(
    gateway: &dyn WorkspaceGateway,
    namespace: &str,
    name: &str,
    max_attempts: u32,
    delay: Duration,
) -> Result<WorkspaceSnapshot, FetchError> {
    let mut snap = gateway.get_by_name(namespace, name).await?;
    let mut attempts = 1u32;
    while !snap.is_ready() && attempts < max_attempts {
        if let Some(err) = terminal_failure(&snap) {
            return Err(err.into());
        }
        tokio::time::sleep(delay).await;
        snap = gateway.get_by_name(namespace, name).await?;
        attempts += 1;
    }
    if let Some(err) = terminal_failure(&snap) {
        return Err(err.into());
    }
    if !snap.is_ready() {
        debug!(ns = %namespace, name = %name, attempts, "workspace never became ready");
        return Err(TrackError::IncompleteStatus {
            namespace: namespace.to_string(),
            name: name.to_string(),
            attempts: max_attempts,
        }
        .into());
    }
    Ok(snap)
}

// ----------------- Poller -----------------

/// Poller knobs; defaults come from `WHARF_POLL_MS` / `WHARF_QUEUE_CAP`.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub queue_cap: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: poll_interval(),
            queue_cap: env_u64("WHARF_QUEUE_CAP", 2048) as usize,
        }
    }
}

/// Latest user-facing listing, published after each completed tick.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NamespaceView {
    pub epoch: u64,
    pub items: Vec<WorkspaceSnapshot>,
}

/// Graceful stop signal: stops future ticks, lets the in-flight one finish.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(self) {
        let _ = self.tx.send(true);
    }
}

/// Handle returned by [`spawn_poller`]: the transition event stream, the
/// published listing view, and the stop signal.
pub struct PollerHandle {
    pub events: mpsc::Receiver<TransitionEvent>,
    pub stop: StopHandle,
    view: Arc<ArcSwap<NamespaceView>>,
    epoch_rx: watch::Receiver<u64>,
}

impl PollerHandle {
    pub fn current(&self) -> Arc<NamespaceView> {
        self.view.load_full()
    }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_rx.clone()
    }
}

/// Spawn the fixed-interval reconciliation loop for one namespace.
///
/// Ticks are single-flight: the next listing is not issued until the previous
/// tick's dispatch has completed, so per-workspace transitions are emitted in
/// observation order within and across ticks. A failed listing is logged and
/// skipped; the loop keeps running.
pub fn spawn_poller(
    gateway: Arc<dyn WorkspaceGateway>,
    namespace: String,
    cfg: PollerConfig,
) -> PollerHandle {
    let (tx, rx) = mpsc::channel::<TransitionEvent>(cfg.queue_cap);
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let view = Arc::new(ArcSwap::from_pointee(NamespaceView::default()));
    let (epoch_tx, epoch_rx) = watch::channel(0u64);
    let view_writer = Arc::clone(&view);

    tokio::spawn(async move {
        let mut store = StatusStore::new();
        let mut epoch = 0u64;
        let mut ticker = tokio::time::interval(cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(ns = %namespace, interval_ms = cfg.interval.as_millis() as u64, "poller started");
        'ticks: loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    match changed {
                        // Handle dropped entirely: treat as stop.
                        Err(_) => break 'ticks,
                        Ok(()) => {
                            if *stop_rx.borrow() {
                                break 'ticks;
                            }
                        }
                    }
                }
                _ = ticker.tick() => {
                    counter!("wharf_poll_ticks_total", 1u64);
                    let listed = match gateway.list(&namespace).await {
                        Ok(v) => v,
                        Err(e) => {
                            counter!("wharf_poll_list_errors_total", 1u64);
                            warn!(ns = %namespace, error = %e, "listing failed; skipping tick");
                            continue;
                        }
                    };
                    let mut live = FxHashSet::default();
                    let mut visible = Vec::with_capacity(listed.len());
                    for snap in listed.into_iter().filter(|s| !s.deleting && !s.infra) {
                        live.insert(snap.uid);
                        let status = normalize_status(snap.phase.as_deref());
                        let error = match terminal_failure(&snap) {
                            Some(TrackError::Failed(msg)) => Some(msg),
                            _ => None,
                        };
                        let record = store.reconcile(&namespace, snap.uid, status, error);
                        counter!("wharf_transitions_total", 1u64);
                        let event = TransitionEvent { workspace: snap.workspace_ref(), record };
                        if tx.send(event).await.is_err() {
                            info!(ns = %namespace, "subscriber gone; poller stopping");
                            break 'ticks;
                        }
                        visible.push(snap);
                    }
                    let pruned = store.prune(&namespace, &live);
                    if pruned > 0 {
                        debug!(ns = %namespace, pruned, "dropped status entries for unlisted workspaces");
                    }
                    epoch = epoch.saturating_add(1);
                    view_writer.store(Arc::new(NamespaceView { epoch, items: visible }));
                    let _ = epoch_tx.send(epoch);
                }
            }
        }
        info!(ns = %namespace, "poller stopped");
    });

    PollerHandle { events: rx, stop: StopHandle { tx: stop_tx }, view, epoch_rx }
}
