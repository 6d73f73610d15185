//! In-memory fakes for multi-step tests

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use mockall::mock;
use opshub_common::config::AccessConfig;
use opshub_common::kube_utils::ClientBuildError;
use opshub_common::{ApiError, ApiErrorKind, ApiResult};
use opshub_ledger::{
    BindingKey, Ledger, LedgerResult, RoleBindingRecord, ServiceIdentityRecord, SqliteLedger,
};
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::cluster_api::{ClusterApi, ClusterConnector, ClusterHandle};
use crate::collaborators::{
    ClusterRegistry, CollaboratorError, IdentityStore, ManagedCluster, PlatformUser,
};
use crate::issuer::CredentialIssuer;
use crate::objects::names_service_account;
use crate::resolver::{AdminSession, ConnectionResolver};
use crate::service::AccessService;

pub(crate) const ADMIN_SERVER: &str = "https://10.0.0.1:6443";
pub(crate) const ADMIN_CA: &str = "QURNSU4tQ0E=";
const ADMIN_USER: &str = "kubernetes-admin";

mock! {
    pub Ledger {}

    #[async_trait::async_trait]
    impl Ledger for Ledger {
        async fn identity(&self, cluster_id: u64, user_id: u64)
            -> LedgerResult<Option<ServiceIdentityRecord>>;
        async fn upsert_identity(&self, record: ServiceIdentityRecord)
            -> LedgerResult<ServiceIdentityRecord>;
        async fn deactivate_identity(
            &self,
            cluster_id: u64,
            user_id: u64,
            revoked_at: DateTime<Utc>,
        ) -> LedgerResult<bool>;
        async fn delete_identity(&self, cluster_id: u64, user_id: u64) -> LedgerResult<bool>;
        async fn identities_for_cluster(&self, cluster_id: u64)
            -> LedgerResult<Vec<ServiceIdentityRecord>>;
        async fn delete_identities_for_cluster(&self, cluster_id: u64) -> LedgerResult<usize>;
        async fn binding(&self, key: &BindingKey) -> LedgerResult<Option<RoleBindingRecord>>;
        async fn insert_binding(&self, record: RoleBindingRecord) -> LedgerResult<()>;
        async fn delete_binding(&self, key: &BindingKey) -> LedgerResult<bool>;
        async fn bindings_for_user(&self, cluster_id: u64, user_id: u64)
            -> LedgerResult<Vec<RoleBindingRecord>>;
        async fn bindings_for_permission_set(
            &self,
            cluster_id: u64,
            permission_set: &str,
            namespace: &str,
        ) -> LedgerResult<Vec<RoleBindingRecord>>;
        async fn bindings_for_cluster(&self, cluster_id: u64)
            -> LedgerResult<Vec<RoleBindingRecord>>;
        async fn delete_bindings_for_user(&self, cluster_id: u64, user_id: u64)
            -> LedgerResult<usize>;
        async fn delete_bindings_for_cluster(&self, cluster_id: u64) -> LedgerResult<usize>;
    }
}

/// Admin kubeconfig as the registry would hand it out
pub(crate) fn admin_kubeconfig(ca_data: Option<&str>) -> String {
    let ca_line = ca_data
        .map(|ca| format!("    certificate-authority-data: {}\n", ca))
        .unwrap_or_default();
    format!(
        "apiVersion: v1
kind: Config
clusters:
- name: kubernetes
  cluster:
    server: {server}
{ca_line}contexts:
- name: {user}@kubernetes
  context:
    cluster: kubernetes
    user: {user}
current-context: {user}@kubernetes
users:
- name: {user}
  user:
    token: admin-token
",
        server = ADMIN_SERVER,
        ca_line = ca_line,
        user = ADMIN_USER,
    )
}

/// Secret with the given data keys
pub(crate) fn secret<D: AsRef<[u8]>>(namespace: &str, name: &str, data: &[(&str, D)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.to_string(), ByteString(v.as_ref().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// Admin session on a fake cluster named `cluster-{id}`
pub(crate) fn admin_session(cluster_id: u64, cluster: Arc<FakeCluster>) -> AdminSession {
    AdminSession {
        cluster: ManagedCluster {
            id: cluster_id,
            name: format!("cluster-{}", cluster_id),
            api_endpoint: None,
        },
        admin_credential: admin_kubeconfig(Some(ADMIN_CA)),
        api: cluster,
    }
}

#[derive(Default)]
struct ClusterState {
    namespaces: BTreeSet<String>,
    service_accounts: BTreeSet<(String, String)>,
    secrets: Vec<Secret>,
    config_maps: Vec<ConfigMap>,
    cluster_role_bindings: BTreeMap<String, ClusterRoleBinding>,
    role_bindings: BTreeMap<(String, String), RoleBinding>,
}

#[derive(Default)]
struct Faults {
    create: Option<ApiError>,
    binding_writes: Option<ApiError>,
    tokens: bool,
    secret_listing: bool,
    binding_listing: bool,
    hide_existing: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<ClusterState>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<&'static str>>,
}

/// A managed cluster kept in memory.
///
/// Clones share state, so every handle a connector hands out sees the same
/// cluster while still being a distinct `Arc`.
#[derive(Clone, Default)]
pub(crate) struct FakeCluster {
    shared: Arc<Shared>,
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn token_for(namespace: &str, name: &str) -> String {
        format!("token-{}-{}", namespace, name)
    }

    fn record(&self, call: &'static str) {
        self.shared.calls.lock().push(call);
    }

    pub(crate) fn calls_to(&self, call: &str) -> usize {
        self.shared.calls.lock().iter().filter(|c| **c == call).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.shared.calls.lock().len()
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.shared
            .calls
            .lock()
            .iter()
            .filter(|c| c.starts_with("create_"))
            .count()
    }

    pub(crate) fn token_requests(&self) -> usize {
        self.calls_to("request_token")
    }

    pub(crate) fn fail_token_requests(&self) {
        self.shared.faults.lock().tokens = true;
    }

    pub(crate) fn fail_secret_listing(&self) {
        self.shared.faults.lock().secret_listing = true;
    }

    pub(crate) fn fail_binding_listing(&self) {
        self.shared.faults.lock().binding_listing = true;
    }

    pub(crate) fn fail_creates_with(&self, error: ApiError) {
        self.shared.faults.lock().create = Some(error);
    }

    pub(crate) fn fail_binding_writes_with(&self, error: ApiError) {
        self.shared.faults.lock().binding_writes = Some(error);
    }

    /// Gets report absent objects as missing so creates race against them
    pub(crate) fn hide_existing_on_get(&self) {
        self.shared.faults.lock().hide_existing = true;
    }

    pub(crate) fn add_namespace(&self, name: &str) {
        self.shared.state.lock().namespaces.insert(name.to_string());
    }

    pub(crate) fn add_service_account(&self, namespace: &str, name: &str) {
        self.shared
            .state
            .lock()
            .service_accounts
            .insert((namespace.to_string(), name.to_string()));
    }

    pub(crate) fn add_secret(&self, secret: Secret) {
        self.shared.state.lock().secrets.push(secret);
    }

    pub(crate) fn add_config_map(&self, config_map: ConfigMap) {
        self.shared.state.lock().config_maps.push(config_map);
    }

    pub(crate) fn add_cluster_role_binding(&self, binding: ClusterRoleBinding) {
        let name = binding.metadata.name.clone().unwrap_or_default();
        self.shared
            .state
            .lock()
            .cluster_role_bindings
            .insert(name, binding);
    }

    pub(crate) fn add_role_binding(&self, binding: RoleBinding) {
        let key = (
            binding.metadata.namespace.clone().unwrap_or_default(),
            binding.metadata.name.clone().unwrap_or_default(),
        );
        self.shared.state.lock().role_bindings.insert(key, binding);
    }

    pub(crate) fn remove_role_binding(&self, namespace: &str, name: &str) {
        self.shared
            .state
            .lock()
            .role_bindings
            .remove(&(namespace.to_string(), name.to_string()));
    }

    pub(crate) fn has_namespace(&self, name: &str) -> bool {
        self.shared.state.lock().namespaces.contains(name)
    }

    pub(crate) fn has_service_account(&self, namespace: &str, name: &str) -> bool {
        self.shared
            .state
            .lock()
            .service_accounts
            .contains(&(namespace.to_string(), name.to_string()))
    }

    pub(crate) fn service_account_count(&self) -> usize {
        self.shared.state.lock().service_accounts.len()
    }

    pub(crate) fn has_cluster_role_binding(&self, name: &str) -> bool {
        self.shared
            .state
            .lock()
            .cluster_role_bindings
            .contains_key(name)
    }

    pub(crate) fn cluster_role_binding_count(&self) -> usize {
        self.shared.state.lock().cluster_role_bindings.len()
    }

    pub(crate) fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.shared
            .state
            .lock()
            .role_bindings
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub(crate) fn role_binding_count(&self) -> usize {
        self.shared.state.lock().role_bindings.len()
    }

    /// Whether any binding of either kind has `service_identity` as a subject
    pub(crate) fn any_binding_names(&self, service_identity: &str) -> bool {
        let state = self.shared.state.lock();
        state
            .cluster_role_bindings
            .values()
            .any(|b| names_service_account(b.subjects.as_deref(), service_identity))
            || state
                .role_bindings
                .values()
                .any(|b| names_service_account(b.subjects.as_deref(), service_identity))
    }

    fn create_fault(&self) -> ApiResult<()> {
        match &self.shared.faults.lock().create {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn binding_fault(&self) -> ApiResult<()> {
        match &self.shared.faults.lock().binding_writes {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn hides_existing(&self) -> bool {
        self.shared.faults.lock().hide_existing
    }
}

fn forbidden(what: &str) -> ApiError {
    ApiError::new(ApiErrorKind::Forbidden, format!("{} is forbidden", what))
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn get_namespace(&self, name: &str) -> ApiResult<Option<Namespace>> {
        self.record("get_namespace");
        if self.hides_existing() || !self.has_namespace(name) {
            return Ok(None);
        }
        Ok(Some(Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ApiResult<()> {
        self.record("create_namespace");
        self.create_fault()?;
        let name = namespace.metadata.name.clone().unwrap_or_default();
        if !self.shared.state.lock().namespaces.insert(name.clone()) {
            return Err(ApiError::already_exists(format!(
                "namespaces \"{}\" already exists",
                name
            )));
        }
        Ok(())
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> ApiResult<Option<ServiceAccount>> {
        self.record("get_service_account");
        if self.hides_existing() || !self.has_service_account(namespace, name) {
            return Ok(None);
        }
        Ok(Some(ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }))
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> ApiResult<()> {
        self.record("create_service_account");
        self.create_fault()?;
        let name = service_account.metadata.name.clone().unwrap_or_default();
        let inserted = self
            .shared
            .state
            .lock()
            .service_accounts
            .insert((namespace.to_string(), name.clone()));
        if !inserted {
            return Err(ApiError::already_exists(format!(
                "serviceaccounts \"{}\" already exists",
                name
            )));
        }
        Ok(())
    }

    async fn delete_service_account(&self, namespace: &str, name: &str) -> ApiResult<()> {
        self.record("delete_service_account");
        let removed = self
            .shared
            .state
            .lock()
            .service_accounts
            .remove(&(namespace.to_string(), name.to_string()));
        if !removed {
            return Err(ApiError::not_found(format!(
                "serviceaccounts \"{}\" not found",
                name
            )));
        }
        Ok(())
    }

    async fn list_service_accounts(&self, namespace: &str) -> ApiResult<Vec<ServiceAccount>> {
        self.record("list_service_accounts");
        let state = self.shared.state.lock();
        Ok(state
            .service_accounts
            .iter()
            .filter(|(ns, _)| ns == namespace)
            .map(|(ns, name)| ServiceAccount {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: Some(ns.clone()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .collect())
    }

    async fn request_token(
        &self,
        namespace: &str,
        name: &str,
        _expiration_seconds: i64,
    ) -> ApiResult<String> {
        self.record("request_token");
        if self.shared.faults.lock().tokens {
            return Err(forbidden("serviceaccounts/token"));
        }
        if !self.has_service_account(namespace, name) {
            return Err(ApiError::not_found(format!(
                "serviceaccounts \"{}\" not found",
                name
            )));
        }
        Ok(Self::token_for(namespace, name))
    }

    async fn list_secrets(&self, namespace: &str) -> ApiResult<Vec<Secret>> {
        self.record("list_secrets");
        if self.shared.faults.lock().secret_listing {
            return Err(forbidden("secrets"));
        }
        Ok(self
            .shared
            .state
            .lock()
            .secrets
            .iter()
            .filter(|s| s.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn list_all_secrets(&self) -> ApiResult<Vec<Secret>> {
        self.record("list_all_secrets");
        if self.shared.faults.lock().secret_listing {
            return Err(forbidden("secrets"));
        }
        Ok(self.shared.state.lock().secrets.clone())
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> ApiResult<Option<ConfigMap>> {
        self.record("get_config_map");
        Ok(self
            .shared
            .state
            .lock()
            .config_maps
            .iter()
            .find(|cm| {
                cm.metadata.namespace.as_deref() == Some(namespace)
                    && cm.metadata.name.as_deref() == Some(name)
            })
            .cloned())
    }

    async fn create_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> ApiResult<()> {
        self.record("create_cluster_role_binding");
        self.binding_fault()?;
        let name = binding.metadata.name.clone().unwrap_or_default();
        let mut state = self.shared.state.lock();
        if state.cluster_role_bindings.contains_key(&name) {
            return Err(ApiError::already_exists(format!(
                "clusterrolebindings \"{}\" already exists",
                name
            )));
        }
        state.cluster_role_bindings.insert(name, binding.clone());
        Ok(())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> ApiResult<()> {
        self.record("delete_cluster_role_binding");
        self.binding_fault()?;
        if self
            .shared
            .state
            .lock()
            .cluster_role_bindings
            .remove(name)
            .is_none()
        {
            return Err(ApiError::not_found(format!(
                "clusterrolebindings \"{}\" not found",
                name
            )));
        }
        Ok(())
    }

    async fn list_cluster_role_bindings(&self) -> ApiResult<Vec<ClusterRoleBinding>> {
        self.record("list_cluster_role_bindings");
        if self.shared.faults.lock().binding_listing {
            return Err(ApiError::other("the server is currently unable to handle the request"));
        }
        Ok(self
            .shared
            .state
            .lock()
            .cluster_role_bindings
            .values()
            .cloned()
            .collect())
    }

    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> ApiResult<()> {
        self.record("create_role_binding");
        self.binding_fault()?;
        let key = (
            namespace.to_string(),
            binding.metadata.name.clone().unwrap_or_default(),
        );
        let mut state = self.shared.state.lock();
        if state.role_bindings.contains_key(&key) {
            return Err(ApiError::already_exists(format!(
                "rolebindings \"{}\" already exists",
                key.1
            )));
        }
        state.role_bindings.insert(key, binding.clone());
        Ok(())
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> ApiResult<()> {
        self.record("delete_role_binding");
        self.binding_fault()?;
        if self
            .shared
            .state
            .lock()
            .role_bindings
            .remove(&(namespace.to_string(), name.to_string()))
            .is_none()
        {
            return Err(ApiError::not_found(format!(
                "rolebindings \"{}\" not found",
                name
            )));
        }
        Ok(())
    }

    async fn list_all_role_bindings(&self) -> ApiResult<Vec<RoleBinding>> {
        self.record("list_all_role_bindings");
        if self.shared.faults.lock().binding_listing {
            return Err(ApiError::other("the server is currently unable to handle the request"));
        }
        Ok(self
            .shared
            .state
            .lock()
            .role_bindings
            .values()
            .cloned()
            .collect())
    }
}

/// Holds user connects open until released
#[derive(Clone, Default)]
pub(crate) struct ConnectGate {
    pub(crate) entered: Arc<Notify>,
    pub(crate) release: Arc<Notify>,
}

/// Connector handing out handles onto one [`FakeCluster`]
pub(crate) struct FakeConnector {
    cluster: FakeCluster,
    documents: Mutex<Vec<String>>,
    reject_admin: AtomicBool,
    gate: Mutex<Option<ConnectGate>>,
}

impl FakeConnector {
    pub(crate) fn new(cluster: FakeCluster) -> Self {
        Self {
            cluster,
            documents: Mutex::new(Vec::new()),
            reject_admin: AtomicBool::new(false),
            gate: Mutex::new(None),
        }
    }

    /// Park every user connect at the gate until it is released
    pub(crate) fn gate_user_connects(&self) -> ConnectGate {
        let gate = ConnectGate::default();
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    fn is_admin(document: &str) -> bool {
        document.contains(ADMIN_USER)
    }

    pub(crate) fn reject_admin_documents(&self) {
        self.reject_admin.store(true, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> usize {
        self.documents.lock().len()
    }

    pub(crate) fn admin_connects(&self) -> usize {
        self.documents
            .lock()
            .iter()
            .filter(|d| Self::is_admin(d))
            .count()
    }

    pub(crate) fn user_connects(&self) -> usize {
        self.user_documents().len()
    }

    pub(crate) fn user_documents(&self) -> Vec<String> {
        self.documents
            .lock()
            .iter()
            .filter(|d| !Self::is_admin(d))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(&self, credential: &str) -> Result<ClusterHandle, ClientBuildError> {
        if Self::is_admin(credential) && self.reject_admin.load(Ordering::SeqCst) {
            return Err(ClientBuildError::Load(
                "certificate-authority-data is not valid base64".to_string(),
            ));
        }
        if !Self::is_admin(credential) {
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
        }
        self.documents.lock().push(credential.to_string());
        Ok(Arc::new(self.cluster.clone()))
    }
}

/// Registry with clusters 1 and 2
pub(crate) struct FakeRegistry {
    clusters: Mutex<HashMap<u64, ManagedCluster>>,
}

impl FakeRegistry {
    pub(crate) fn new() -> Self {
        let clusters = [1, 2]
            .into_iter()
            .map(|id| {
                (
                    id,
                    ManagedCluster {
                        id,
                        name: format!("cluster-{}", id),
                        api_endpoint: None,
                    },
                )
            })
            .collect();
        Self {
            clusters: Mutex::new(clusters),
        }
    }

    pub(crate) fn remove_cluster(&self, cluster_id: u64) {
        self.clusters.lock().remove(&cluster_id);
    }
}

#[async_trait]
impl ClusterRegistry for FakeRegistry {
    async fn cluster(&self, cluster_id: u64) -> Result<Option<ManagedCluster>, CollaboratorError> {
        Ok(self.clusters.lock().get(&cluster_id).cloned())
    }

    async fn admin_credential(&self, cluster_id: u64) -> Result<String, CollaboratorError> {
        if !self.clusters.lock().contains_key(&cluster_id) {
            return Err(CollaboratorError::new(format!(
                "cluster {} not found",
                cluster_id
            )));
        }
        Ok(admin_kubeconfig(Some(ADMIN_CA)))
    }
}

/// Identity store seeded with alice (7) and bob (8)
pub(crate) struct FakeIdentityStore {
    users: Mutex<HashMap<u64, (PlatformUser, Vec<String>)>>,
    fail_roles: AtomicBool,
}

impl FakeIdentityStore {
    pub(crate) fn new() -> Self {
        let store = Self {
            users: Mutex::new(HashMap::new()),
            fail_roles: AtomicBool::new(false),
        };
        store.add_user(7, "alice", &["developer"]);
        store.add_user(8, "bob", &[]);
        store
    }

    pub(crate) fn add_user(&self, id: u64, username: &str, roles: &[&str]) {
        let real_name = match username {
            "alice" => "Alice Liddell".to_string(),
            "bob" => "Bob Stone".to_string(),
            other => other.to_string(),
        };
        let user = PlatformUser {
            id,
            username: username.to_string(),
            real_name,
        };
        let roles = roles.iter().map(|r| r.to_string()).collect();
        self.users.lock().insert(id, (user, roles));
    }

    pub(crate) fn fail_role_lookups(&self) {
        self.fail_roles.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityStore for FakeIdentityStore {
    async fn user(&self, user_id: u64) -> Result<Option<PlatformUser>, CollaboratorError> {
        Ok(self.users.lock().get(&user_id).map(|(u, _)| u.clone()))
    }

    async fn user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PlatformUser>, CollaboratorError> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|(u, _)| u.username == username)
            .map(|(u, _)| u.clone()))
    }

    async fn role_codes(&self, user_id: u64) -> Result<Vec<String>, CollaboratorError> {
        if self.fail_roles.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new("identity store unavailable"));
        }
        Ok(self
            .users
            .lock()
            .get(&user_id)
            .map(|(_, roles)| roles.clone())
            .unwrap_or_default())
    }
}

/// One fake cluster, its collaborators and an in-memory ledger
pub(crate) struct Harness {
    pub(crate) cluster: FakeCluster,
    pub(crate) connector: Arc<FakeConnector>,
    pub(crate) registry: Arc<FakeRegistry>,
    pub(crate) identities: Arc<FakeIdentityStore>,
    pub(crate) ledger: Arc<SqliteLedger>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let cluster = FakeCluster::new();
        Self {
            connector: Arc::new(FakeConnector::new(cluster.clone())),
            cluster,
            registry: Arc::new(FakeRegistry::new()),
            identities: Arc::new(FakeIdentityStore::new()),
            ledger: Arc::new(SqliteLedger::in_memory().unwrap()),
        }
    }

    pub(crate) fn resolver(&self) -> ConnectionResolver {
        let config = Arc::new(AccessConfig::default());
        ConnectionResolver::new(
            config.clone(),
            self.registry.clone(),
            self.identities.clone(),
            self.ledger.clone(),
            self.connector.clone(),
            CredentialIssuer::new(config),
        )
    }

    pub(crate) fn service(&self) -> AccessService {
        self.service_with_ledger(self.ledger.clone())
    }

    pub(crate) fn service_with_ledger(&self, ledger: Arc<dyn Ledger>) -> AccessService {
        AccessService::new(
            AccessConfig::default(),
            self.registry.clone(),
            self.identities.clone(),
            ledger,
            self.connector.clone(),
        )
    }
}
