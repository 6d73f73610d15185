//! Connection resolver and cache
//!
//! Decides which identity a request talks to a managed cluster as and hands
//! out a live [`ClusterHandle`] for it. Handles are cached per
//! (cluster, identity selector) until explicitly invalidated.
//!
//! Handles are built outside the cache lock and published under it. Each
//! cluster and each key carries a generation counter bumped by invalidation;
//! a handle built before an invalidation of its key or its cluster is
//! returned to its caller but never published, so a stale credential cannot
//! outlive the invalidation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use opshub_common::config::AccessConfig;
use opshub_ledger::Ledger;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::cluster_api::{ClusterConnector, ClusterHandle};
use crate::collaborators::{ClusterRegistry, IdentityStore, ManagedCluster};
use crate::error::Error;
use crate::issuer::CredentialIssuer;
use crate::scope::RequestScope;

/// Which identity a cached handle authenticates as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentitySelector {
    /// The cluster's registered admin credential
    Admin,
    /// A platform user's service identity
    User(u64),
}

impl fmt::Display for IdentitySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Connection cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Managed cluster id
    pub cluster_id: u64,
    /// Identity the handle authenticates as
    pub selector: IdentitySelector,
}

impl CacheKey {
    /// Key for the admin handle of a cluster
    pub fn admin(cluster_id: u64) -> Self {
        Self {
            cluster_id,
            selector: IdentitySelector::Admin,
        }
    }

    /// Key for a user's handle on a cluster
    pub fn user(cluster_id: u64, user_id: u64) -> Self {
        Self {
            cluster_id,
            selector: IdentitySelector::User(user_id),
        }
    }
}

/// Invalidation counters observed for one key before building its handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Generation {
    cluster: u64,
    key: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, ClusterHandle>,
    cluster_generations: HashMap<u64, u64>,
    key_generations: HashMap<CacheKey, u64>,
}

impl CacheState {
    fn generation(&self, key: &CacheKey) -> Generation {
        Generation {
            cluster: self
                .cluster_generations
                .get(&key.cluster_id)
                .copied()
                .unwrap_or(0),
            key: self.key_generations.get(key).copied().unwrap_or(0),
        }
    }
}

/// Process-local map from [`CacheKey`] to live handles
#[derive(Default)]
pub struct ConnectionCache {
    state: RwLock<CacheState>,
}

impl ConnectionCache {
    /// An empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached handle for `key`
    pub fn get(&self, key: &CacheKey) -> Option<ClusterHandle> {
        self.state.read().entries.get(key).cloned()
    }

    /// Current invalidation generation of `key`
    pub fn generation(&self, key: &CacheKey) -> Generation {
        self.state.read().generation(key)
    }

    /// Publish `handle` under `key` if neither the key nor its cluster was
    /// invalidated since `seen` was read. Returns whether it was stored.
    pub fn publish(&self, key: CacheKey, handle: ClusterHandle, seen: Generation) -> bool {
        let mut state = self.state.write();
        if state.generation(&key) != seen {
            return false;
        }
        state.entries.insert(key, handle);
        true
    }

    /// Drop every entry of a cluster. Returns how many were dropped.
    pub fn invalidate_cluster(&self, cluster_id: u64) -> usize {
        let mut state = self.state.write();
        *state.cluster_generations.entry(cluster_id).or_insert(0) += 1;
        let before = state.entries.len();
        state.entries.retain(|key, _| key.cluster_id != cluster_id);
        before - state.entries.len()
    }

    /// Drop one entry. Handles for `key` built before this call are never
    /// published, even if no entry was cached yet.
    pub fn invalidate_key(&self, key: &CacheKey) -> bool {
        let mut state = self.state.write();
        *state.key_generations.entry(*key).or_insert(0) += 1;
        state.entries.remove(key).is_some()
    }

    /// Number of cached handles
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything needed to act on a cluster with its admin credential
#[derive(Clone)]
pub struct AdminSession {
    /// The cluster as the registry knows it
    pub cluster: ManagedCluster,
    /// Decrypted admin credential document
    pub admin_credential: String,
    /// Handle authenticated with the admin credential
    pub api: ClusterHandle,
}

impl fmt::Debug for AdminSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSession")
            .field("cluster", &self.cluster)
            .field("admin_credential", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Resolves (cluster, user) pairs to live handles
pub struct ConnectionResolver {
    config: Arc<AccessConfig>,
    registry: Arc<dyn ClusterRegistry>,
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn Ledger>,
    connector: Arc<dyn ClusterConnector>,
    issuer: CredentialIssuer,
    cache: ConnectionCache,
}

impl ConnectionResolver {
    /// Build a resolver with an empty cache
    pub fn new(
        config: Arc<AccessConfig>,
        registry: Arc<dyn ClusterRegistry>,
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn Ledger>,
        connector: Arc<dyn ClusterConnector>,
        issuer: CredentialIssuer,
    ) -> Self {
        Self {
            config,
            registry,
            identities,
            ledger,
            connector,
            issuer,
            cache: ConnectionCache::new(),
        }
    }

    /// The cache backing this resolver
    pub fn cache(&self) -> &ConnectionCache {
        &self.cache
    }

    /// Handle for `user_id` on `cluster_id`.
    ///
    /// Holders of the admin role get the cluster's admin handle. Everyone
    /// else gets a handle for their own service identity, or
    /// [`Error::NotGranted`] if they have no active one.
    #[instrument(skip(self, scope))]
    pub async fn resolve(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
        user_id: u64,
    ) -> Result<ClusterHandle, Error> {
        if self.is_admin(user_id).await {
            if let Some(handle) = self.cache.get(&CacheKey::admin(cluster_id)) {
                return Ok(handle);
            }
            debug!(cluster_id, user_id, "resolving via admin credential");
            return Ok(self.admin_session(scope, cluster_id).await?.api);
        }

        let key = CacheKey::user(cluster_id, user_id);
        if let Some(handle) = self.cache.get(&key) {
            return Ok(handle);
        }
        let generation = self.cache.generation(&key);

        let record = match self.ledger.identity(cluster_id, user_id).await? {
            Some(record) if record.active => record,
            _ => {
                return Err(Error::NotGranted {
                    cluster_id,
                    user_id,
                })
            }
        };

        let session = self.admin_session(scope, cluster_id).await?;
        let bundle = self
            .issuer
            .mint(scope, &session, &record.service_identity)
            .await?;
        let handle = self.connect(scope, cluster_id, &bundle.to_yaml()?).await?;

        if self.cache.publish(key, handle.clone(), generation) {
            info!(cluster_id, user_id, service_identity = %record.service_identity, "cached user connection");
        }
        Ok(handle)
    }

    /// The cluster, its admin credential and an admin handle
    pub async fn admin_session(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
    ) -> Result<AdminSession, Error> {
        let key = CacheKey::admin(cluster_id);
        let generation = self.cache.generation(&key);
        let cluster = self.cluster(cluster_id).await?;
        let admin_credential = self
            .registry
            .admin_credential(cluster_id)
            .await
            .map_err(|e| Error::collaborator("admin credential lookup", e))?;

        let api = match self.cache.get(&key) {
            Some(api) => api,
            None => {
                let api = self.connect(scope, cluster_id, &admin_credential).await?;
                if self.cache.publish(key, api.clone(), generation) {
                    info!(cluster_id, "cached admin connection");
                }
                api
            }
        };

        Ok(AdminSession {
            cluster,
            admin_credential,
            api,
        })
    }

    /// Registry entry for a cluster, [`Error::UnknownCluster`] if absent
    pub async fn cluster(&self, cluster_id: u64) -> Result<ManagedCluster, Error> {
        self.registry
            .cluster(cluster_id)
            .await
            .map_err(|e| Error::collaborator("cluster lookup", e))?
            .ok_or(Error::UnknownCluster { cluster_id })
    }

    /// Drop every cached handle of a cluster
    pub fn invalidate(&self, cluster_id: u64) {
        let dropped = self.cache.invalidate_cluster(cluster_id);
        info!(cluster_id, dropped, "invalidated cluster connections");
    }

    /// Drop a user's cached handle on a cluster
    pub fn invalidate_user(&self, cluster_id: u64, user_id: u64) {
        if self.cache.invalidate_key(&CacheKey::user(cluster_id, user_id)) {
            debug!(cluster_id, user_id, "invalidated user connection");
        }
    }

    async fn is_admin(&self, user_id: u64) -> bool {
        match self.identities.role_codes(user_id).await {
            Ok(roles) => roles.iter().any(|r| r == self.config.admin_role.as_str()),
            Err(e) => {
                warn!(user_id, error = %e, "role lookup failed, resolving as regular user");
                false
            }
        }
    }

    async fn connect(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
        document: &str,
    ) -> Result<ClusterHandle, Error> {
        scope
            .run("connect", self.connector.connect(document))
            .await?
            .map_err(|e| Error::InvalidCredential {
                cluster_id,
                message: e.to_string(),
            })
    }
}
