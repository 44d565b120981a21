//! Wharf public API façade (in-process).
//!
//! This crate defines the stable trait frontends (CLI/UI) depend on. The
//! in-process implementation wires the gateway and the reconciliation core
//! together and owns the one-shot namespace bootstrap gating every
//! namespace-scoped operation.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use wharf_core::{terminal_failure, TrackError, WorkspaceSnapshot, WorkspaceSpecRequest};
use wharf_gateway::WorkspaceGateway;
use wharf_track::{fetch_ready_with, FetchError, PollerConfig, PollerHandle, DEFAULT_GET_RETRIES};

pub use wharf_track::spawn_poller; // Re-export for frontends embedding the poller directly

/// API errors suitable for transport over RPC later.
#[derive(Debug, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum WharfError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    /// The remote store reported the workspace as FAILED.
    #[error("failed: {0}")]
    Failed(String),
    /// The workspace never reached a usable status within the retry budget.
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type WharfResult<T> = Result<T, WharfError>;

fn map_fetch_err(e: FetchError) -> WharfError {
    match e {
        FetchError::Track(TrackError::Failed(msg)) => WharfError::Failed(msg),
        FetchError::Track(err @ TrackError::IncompleteStatus { .. }) => {
            WharfError::Timeout(err.to_string())
        }
        FetchError::Gateway(e) => WharfError::Internal(e.to_string()),
    }
}

/// Declarative Wharf API surface.
#[async_trait::async_trait]
pub trait WharfApi: Send + Sync {
    /// List user-visible workspaces in a namespace.
    async fn list(&self, namespace: &str) -> WharfResult<Vec<WorkspaceSnapshot>>;

    /// Fetch one workspace, retrying until it reports a usable status
    /// (phase + access URL) or the attempt budget runs out.
    async fn get(&self, namespace: &str, name: &str) -> WharfResult<WorkspaceSnapshot>;

    async fn create(&self, spec: &WorkspaceSpecRequest) -> WharfResult<WorkspaceSnapshot>;

    /// Request deletion; completion is observed through polling.
    async fn delete(&self, namespace: &str, name: &str) -> WharfResult<()>;

    /// Flip the desired-started bit on a workspace.
    async fn set_running(
        &self,
        namespace: &str,
        name: &str,
        started: bool,
    ) -> WharfResult<WorkspaceSnapshot>;

    /// One-shot namespace bootstrap, memoized per process. Failure is logged
    /// and reported as `false`, never propagated; a later call retries.
    async fn ensure_namespace(&self, namespace: &str) -> bool;

    /// Start the reconciliation poller for a namespace and hand back its
    /// transition event stream with a stop handle.
    async fn subscribe(&self, namespace: &str) -> WharfResult<PollerHandle>;
}

/// Knobs for the in-process façade; defaults come from `WHARF_GET_RETRIES`
/// and the poll interval.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub get_retries: u32,
    pub retry_delay: Duration,
    pub poller: PollerConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let get_retries = std::env::var("WHARF_GET_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_GET_RETRIES);
        Self {
            get_retries,
            retry_delay: wharf_track::poll_interval(),
            poller: PollerConfig::default(),
        }
    }
}

// ----------------- In-process implementation -----------------

/// In-process implementation over any gateway.
pub struct InProcApi {
    gateway: Arc<dyn WorkspaceGateway>,
    cfg: ApiConfig,
    // One memoized bootstrap cell per namespace; only success is retained,
    // so a failed bootstrap is retried by the next caller.
    init: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl InProcApi {
    pub fn new(gateway: Arc<dyn WorkspaceGateway>) -> Self {
        Self::with_config(gateway, ApiConfig::default())
    }

    pub fn with_config(gateway: Arc<dyn WorkspaceGateway>, cfg: ApiConfig) -> Self {
        Self { gateway, cfg, init: Mutex::new(HashMap::new()) }
    }

    fn init_cell(&self, namespace: &str) -> Arc<OnceCell<()>> {
        let mut map = self.init.lock().expect("init map poisoned");
        Arc::clone(map.entry(namespace.to_string()).or_default())
    }

    /// Gate: every namespace-scoped operation happens-after bootstrap.
    async fn ready(&self, namespace: &str) -> WharfResult<()> {
        if self.ensure_namespace(namespace).await {
            Ok(())
        } else {
            Err(WharfError::Internal(format!(
                "namespace {} failed to initialize",
                namespace
            )))
        }
    }
}

#[async_trait::async_trait]
impl WharfApi for InProcApi {
    async fn list(&self, namespace: &str) -> WharfResult<Vec<WorkspaceSnapshot>> {
        let t0 = Instant::now();
        info!(ns = %namespace, "api: list start");
        self.ready(namespace).await?;
        let items = self
            .gateway
            .list(namespace)
            .await
            .map_err(|e| WharfError::Internal(e.to_string()))?;
        info!(ns = %namespace, count = items.len(), took_ms = %t0.elapsed().as_millis(), "api: list ok");
        Ok(items)
    }

    async fn get(&self, namespace: &str, name: &str) -> WharfResult<WorkspaceSnapshot> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: get start");
        self.ready(namespace).await?;
        let snap = fetch_ready_with(
            self.gateway.as_ref(),
            namespace,
            name,
            self.cfg.get_retries,
            self.cfg.retry_delay,
        )
        .await
        .map_err(map_fetch_err)?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: get ok");
        Ok(snap)
    }

    async fn create(&self, spec: &WorkspaceSpecRequest) -> WharfResult<WorkspaceSnapshot> {
        let t0 = Instant::now();
        info!(ns = %spec.namespace, name = %spec.name, "api: create start");
        self.ready(&spec.namespace).await?;
        let snap = self
            .gateway
            .create(spec)
            .await
            .map_err(|e| WharfError::Internal(e.to_string()))?;
        if let Some(TrackError::Failed(msg)) = terminal_failure(&snap) {
            return Err(WharfError::Failed(msg));
        }
        info!(ns = %spec.namespace, name = %spec.name, took_ms = %t0.elapsed().as_millis(), "api: create ok");
        Ok(snap)
    }

    async fn delete(&self, namespace: &str, name: &str) -> WharfResult<()> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, "api: delete start");
        self.ready(namespace).await?;
        self.gateway
            .delete(namespace, name)
            .await
            .map_err(|e| WharfError::Internal(e.to_string()))?;
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: delete ok");
        Ok(())
    }

    async fn set_running(
        &self,
        namespace: &str,
        name: &str,
        started: bool,
    ) -> WharfResult<WorkspaceSnapshot> {
        let t0 = Instant::now();
        info!(ns = %namespace, name = %name, started, "api: set_running start");
        self.ready(namespace).await?;
        let snap = self
            .gateway
            .change_status(namespace, name, started)
            .await
            .map_err(|e| WharfError::Internal(e.to_string()))?;
        if let Some(TrackError::Failed(msg)) = terminal_failure(&snap) {
            return Err(WharfError::Failed(msg));
        }
        info!(ns = %namespace, name = %name, took_ms = %t0.elapsed().as_millis(), "api: set_running ok");
        Ok(snap)
    }

    async fn ensure_namespace(&self, namespace: &str) -> bool {
        let cell = self.init_cell(namespace);
        let gateway = Arc::clone(&self.gateway);
        let ns = namespace.to_string();
        let res = cell
            .get_or_try_init(|| async move { gateway.initialize_namespace(&ns).await })
            .await;
        match res {
            Ok(_) => true,
            Err(e) => {
                warn!(ns = %namespace, error = %e, "namespace bootstrap failed");
                false
            }
        }
    }

    async fn subscribe(&self, namespace: &str) -> WharfResult<PollerHandle> {
        info!(ns = %namespace, "api: subscribe start");
        self.ready(namespace).await?;
        Ok(spawn_poller(
            Arc::clone(&self.gateway),
            namespace.to_string(),
            self.cfg.poller.clone(),
        ))
    }
}

// ----------------- Mock implementation -----------------

/// Simple canned façade for frontend tests; `subscribe` polls a scripted
/// in-memory gateway.
pub struct MockWharf {
    pub gateway: Arc<wharf_gateway::mock::MockGateway>,
    pub listing: Vec<WorkspaceSnapshot>,
    pub snapshot: Option<WorkspaceSnapshot>,
    pub namespace_ok: bool,
}

impl Default for MockWharf {
    fn default() -> Self {
        Self {
            gateway: Arc::new(wharf_gateway::mock::MockGateway::new()),
            listing: Vec::new(),
            snapshot: None,
            namespace_ok: true,
        }
    }
}

impl MockWharf {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl WharfApi for MockWharf {
    async fn list(&self, _namespace: &str) -> WharfResult<Vec<WorkspaceSnapshot>> {
        Ok(self.listing.clone())
    }

    async fn get(&self, namespace: &str, name: &str) -> WharfResult<WorkspaceSnapshot> {
        self.snapshot
            .clone()
            .ok_or_else(|| WharfError::NotFound(format!("{}/{}", namespace, name)))
    }

    async fn create(&self, spec: &WorkspaceSpecRequest) -> WharfResult<WorkspaceSnapshot> {
        Ok(self
            .snapshot
            .clone()
            .unwrap_or_else(|| wharf_gateway::mock::snapshot(&spec.namespace, &spec.name, 1)))
    }

    async fn delete(&self, _namespace: &str, _name: &str) -> WharfResult<()> {
        Ok(())
    }

    async fn set_running(
        &self,
        namespace: &str,
        name: &str,
        _started: bool,
    ) -> WharfResult<WorkspaceSnapshot> {
        self.get(namespace, name).await
    }

    async fn ensure_namespace(&self, _namespace: &str) -> bool {
        self.namespace_ok
    }

    async fn subscribe(&self, namespace: &str) -> WharfResult<PollerHandle> {
        Ok(spawn_poller(
            Arc::clone(&self.gateway) as Arc<dyn WorkspaceGateway>,
            namespace.to_string(),
            PollerConfig::default(),
        ))
    }
}
