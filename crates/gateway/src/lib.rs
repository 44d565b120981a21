//! Wharf gateway: CRUD operations against the remote workspace store.
//!
//! The rest of the system only sees the [`WorkspaceGateway`] trait; the
//! default implementation talks to a DevWorkspace-style CRD through kube,
//! and tests script a [`MockGateway`] instead.

#![forbid(unsafe_code)]

use anyhow::{anyhow, Context, Result};
use kube::{
    api::{Api, DeleteParams, Patch, PatchParams, PostParams},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use serde_json::json;
use tracing::{debug, info};
use wharf_core::{Uid, WorkspaceSnapshot, WorkspaceSpecRequest, CLASS_INFRA};

/// API group serving workspace resources.
pub const WORKSPACE_GROUP: &str = "workspace.wharf.dev";
pub const WORKSPACE_VERSION: &str = "v1alpha1";
pub const WORKSPACE_KIND: &str = "Workspace";
pub const WORKSPACE_PLURAL: &str = "workspaces";

/// Label carrying the workspace class; `infrastructure` marks workspaces
/// that never surface in user-facing views.
pub const CLASS_LABEL: &str = "wharf.dev/component";

/// Remote store contract consumed by the reconciliation core. All operations
/// are namespace-scoped; `initialize_namespace` is idempotent.
#[async_trait::async_trait]
pub trait WorkspaceGateway: Send + Sync {
    async fn list(&self, namespace: &str) -> Result<Vec<WorkspaceSnapshot>>;
    async fn get_by_name(&self, namespace: &str, name: &str) -> Result<WorkspaceSnapshot>;
    async fn create(&self, spec: &WorkspaceSpecRequest) -> Result<WorkspaceSnapshot>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
    /// Flip the desired-started bit; returns the snapshot the store reported
    /// back for the mutation.
    async fn change_status(
        &self,
        namespace: &str,
        name: &str,
        started: bool,
    ) -> Result<WorkspaceSnapshot>;
    async fn initialize_namespace(&self, namespace: &str) -> Result<()>;
}

fn to_uid(uid_str: &str) -> Result<Uid> {
    let u = uuid::Uuid::parse_str(uid_str).context("parsing metadata.uid as uuid")?;
    Ok(*u.as_bytes())
}

/// Shape a raw workspace object into the snapshot the core consumes.
pub fn shape_snapshot(raw: &serde_json::Value) -> Result<WorkspaceSnapshot> {
    let meta = raw
        .get("metadata")
        .ok_or_else(|| anyhow!("object missing metadata"))?;
    let uid_str = meta
        .get("uid")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("object missing metadata.uid"))?;
    let uid = to_uid(uid_str)?;
    let name = meta
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let namespace = meta
        .get("namespace")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let deleting = meta.get("deletionTimestamp").is_some();
    let infra = meta
        .get("labels")
        .and_then(|l| l.get(CLASS_LABEL))
        .and_then(|v| v.as_str())
        .map(|v| v == CLASS_INFRA)
        .unwrap_or(false);
    let creation_ts = meta
        .get("creationTimestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0);
    let status = raw.get("status");
    let phase = status
        .and_then(|s| s.get("phase"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let access_url = status
        .and_then(|s| s.get("mainUrl"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let message = status
        .and_then(|s| s.get("message"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    Ok(WorkspaceSnapshot {
        uid,
        name,
        namespace,
        phase,
        access_url,
        message,
        deleting,
        infra,
        creation_ts,
    })
}

/// Default implementation backed by the cluster's workspace CRD.
pub struct KubeGateway {
    client: Client,
    resource: ApiResource,
}

impl KubeGateway {
    /// Connect using ambient kubeconfig/context, like the rest of the stack.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await?;
        let gvk = GroupVersionKind {
            group: WORKSPACE_GROUP.to_string(),
            version: WORKSPACE_VERSION.to_string(),
            kind: WORKSPACE_KIND.to_string(),
        };
        let resource = ApiResource::from_gvk_with_plural(&gvk, WORKSPACE_PLURAL);
        Ok(Self { client, resource })
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }

    fn snapshot_of(obj: &DynamicObject) -> Result<WorkspaceSnapshot> {
        let raw = serde_json::to_value(obj).context("serializing DynamicObject")?;
        shape_snapshot(&raw)
    }
}

#[async_trait::async_trait]
impl WorkspaceGateway for KubeGateway {
    async fn list(&self, namespace: &str) -> Result<Vec<WorkspaceSnapshot>> {
        let objs = self.api(namespace).list(&Default::default()).await?;
        let mut out = Vec::with_capacity(objs.items.len());
        for obj in objs.items.iter() {
            out.push(Self::snapshot_of(obj)?);
        }
        debug!(ns = %namespace, count = out.len(), "listed workspaces");
        Ok(out)
    }

    async fn get_by_name(&self, namespace: &str, name: &str) -> Result<WorkspaceSnapshot> {
        let obj = self.api(namespace).get(name).await?;
        Self::snapshot_of(&obj)
    }

    async fn create(&self, spec: &WorkspaceSpecRequest) -> Result<WorkspaceSnapshot> {
        let body = json!({
            "apiVersion": format!("{}/{}", WORKSPACE_GROUP, WORKSPACE_VERSION),
            "kind": WORKSPACE_KIND,
            "metadata": { "name": spec.name, "namespace": spec.namespace },
            "spec": { "started": spec.started, "template": spec.template },
        });
        let obj: DynamicObject = serde_json::from_value(body).context("building workspace object")?;
        let created = self
            .api(&spec.namespace)
            .create(&PostParams::default(), &obj)
            .await?;
        info!(ns = %spec.namespace, name = %spec.name, "workspace created");
        Self::snapshot_of(&created)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        // Fire-and-forget: the poller observes the deletion timestamp.
        let _ = self.api(namespace).delete(name, &DeleteParams::default()).await?;
        info!(ns = %namespace, name = %name, "workspace delete requested");
        Ok(())
    }

    async fn change_status(
        &self,
        namespace: &str,
        name: &str,
        started: bool,
    ) -> Result<WorkspaceSnapshot> {
        let patch = json!({ "spec": { "started": started } });
        let obj = self
            .api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!(ns = %namespace, name = %name, started, "workspace status change requested");
        Self::snapshot_of(&obj)
    }

    async fn initialize_namespace(&self, namespace: &str) -> Result<()> {
        use k8s_openapi::api::core::v1::Namespace;
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: kube::core::ObjectMeta {
                name: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &ns).await {
            Ok(_) => {
                info!(ns = %namespace, "namespace created");
                Ok(())
            }
            // Idempotent: an existing namespace is a successful bootstrap.
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!(ns = %namespace, "namespace already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ----------------- Mock implementation -----------------

pub mod mock {
    //! Scripted in-memory gateway for tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use wharf_core::{WorkspaceSnapshot, WorkspaceSpecRequest};

    use super::WorkspaceGateway;

    /// Build a bare snapshot for tests; `n` seeds the uid.
    pub fn snapshot(namespace: &str, name: &str, n: u8) -> WorkspaceSnapshot {
        let mut uid = [0u8; 16];
        uid[0] = n;
        WorkspaceSnapshot {
            uid,
            name: name.to_string(),
            namespace: namespace.to_string(),
            phase: None,
            access_url: None,
            message: None,
            deleting: false,
            infra: false,
            creation_ts: 0,
        }
    }

    #[derive(Default)]
    struct MockState {
        listings: VecDeque<Result<Vec<WorkspaceSnapshot>, String>>,
        by_name: HashMap<(String, String), VecDeque<WorkspaceSnapshot>>,
        last_by_name: HashMap<(String, String), WorkspaceSnapshot>,
        get_calls: HashMap<(String, String), u32>,
        list_calls: u32,
        created: Vec<WorkspaceSpecRequest>,
        deleted: Vec<(String, String)>,
        init_calls: HashMap<String, u32>,
        init_failures: HashMap<String, u32>,
    }

    /// Scripted gateway: listings are consumed front-to-back (then empty),
    /// per-name snapshots are consumed front-to-back (then the last one
    /// repeats), and every call is counted.
    #[derive(Default)]
    pub struct MockGateway {
        inner: Mutex<MockState>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_listing(&self, listing: Vec<WorkspaceSnapshot>) {
            self.inner.lock().unwrap().listings.push_back(Ok(listing));
        }

        pub fn push_listing_error(&self, msg: &str) {
            self.inner.lock().unwrap().listings.push_back(Err(msg.to_string()));
        }

        pub fn push_snapshot(&self, snap: WorkspaceSnapshot) {
            let key = (snap.namespace.clone(), snap.name.clone());
            self.inner.lock().unwrap().by_name.entry(key).or_default().push_back(snap);
        }

        /// Make the next `times` namespace-init calls for `ns` fail.
        pub fn fail_namespace_init(&self, namespace: &str, times: u32) {
            self.inner.lock().unwrap().init_failures.insert(namespace.to_string(), times);
        }

        pub fn list_calls(&self) -> u32 {
            self.inner.lock().unwrap().list_calls
        }

        pub fn get_calls(&self, namespace: &str, name: &str) -> u32 {
            let key = (namespace.to_string(), name.to_string());
            *self.inner.lock().unwrap().get_calls.get(&key).unwrap_or(&0)
        }

        pub fn init_calls(&self, namespace: &str) -> u32 {
            *self.inner.lock().unwrap().init_calls.get(namespace).unwrap_or(&0)
        }

        pub fn created(&self) -> Vec<WorkspaceSpecRequest> {
            self.inner.lock().unwrap().created.clone()
        }

        pub fn deleted(&self) -> Vec<(String, String)> {
            self.inner.lock().unwrap().deleted.clone()
        }
    }

    #[async_trait::async_trait]
    impl WorkspaceGateway for MockGateway {
        async fn list(&self, _namespace: &str) -> Result<Vec<WorkspaceSnapshot>> {
            let mut st = self.inner.lock().unwrap();
            st.list_calls += 1;
            match st.listings.pop_front() {
                Some(Ok(v)) => Ok(v),
                Some(Err(msg)) => Err(anyhow!(msg)),
                None => Ok(Vec::new()),
            }
        }

        async fn get_by_name(&self, namespace: &str, name: &str) -> Result<WorkspaceSnapshot> {
            let key = (namespace.to_string(), name.to_string());
            let mut st = self.inner.lock().unwrap();
            let st = &mut *st;
            *st.get_calls.entry(key.clone()).or_insert(0) += 1;
            if let Some(queue) = st.by_name.get_mut(&key) {
                if let Some(snap) = queue.pop_front() {
                    st.last_by_name.insert(key, snap.clone());
                    return Ok(snap);
                }
            }
            st.last_by_name
                .get(&key)
                .cloned()
                .ok_or_else(|| anyhow!("workspace not found: {}/{}", namespace, name))
        }

        async fn create(&self, spec: &WorkspaceSpecRequest) -> Result<WorkspaceSnapshot> {
            let key = (spec.namespace.clone(), spec.name.clone());
            let mut st = self.inner.lock().unwrap();
            let st = &mut *st;
            st.created.push(spec.clone());
            if let Some(queue) = st.by_name.get_mut(&key) {
                if let Some(snap) = queue.pop_front() {
                    st.last_by_name.insert(key, snap.clone());
                    return Ok(snap);
                }
            }
            // Fresh workspaces report no status at all.
            Ok(snapshot(&spec.namespace, &spec.name, st.created.len() as u8))
        }

        async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
            let mut st = self.inner.lock().unwrap();
            st.deleted.push((namespace.to_string(), name.to_string()));
            Ok(())
        }

        async fn change_status(
            &self,
            namespace: &str,
            name: &str,
            _started: bool,
        ) -> Result<WorkspaceSnapshot> {
            self.get_by_name(namespace, name).await
        }

        async fn initialize_namespace(&self, namespace: &str) -> Result<()> {
            let mut st = self.inner.lock().unwrap();
            *st.init_calls.entry(namespace.to_string()).or_insert(0) += 1;
            if let Some(left) = st.init_failures.get_mut(namespace) {
                if *left > 0 {
                    *left -= 1;
                    return Err(anyhow!("namespace bootstrap failed: {}", namespace));
                }
            }
            Ok(())
        }
    }
}
