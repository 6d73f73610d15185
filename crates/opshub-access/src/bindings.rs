//! Role-binding manager
//!
//! Binds platform users to permission sets on managed clusters. Each ledger
//! row has exactly one native binding object, named from the permission set
//! and the service identity, so repeating a create or delete converges on the
//! same object. The native object is always confirmed before its ledger row
//! is written.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use opshub_common::config::{AccessConfig, NamingConfig};
use opshub_common::is_dns_subdomain;
use opshub_ledger::{BindingKey, Ledger, PermissionSetKind, RoleBindingRecord, ServiceIdentityRecord};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::cluster_api::ClusterApi;
use crate::collaborators::{IdentityStore, PlatformUser};
use crate::error::Error;
use crate::issuer::{CredentialIssuer, ServiceIdentity};
use crate::objects;
use crate::resolver::ConnectionResolver;
use crate::scope::RequestScope;

/// Arguments of [`RoleBindingManager::bind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    /// Managed cluster id
    pub cluster_id: u64,
    /// User receiving the permission set
    pub user_id: u64,
    /// Permission set (role or cluster role) name
    pub permission_set: String,
    /// Target namespace, empty for a cluster-scoped binding
    pub namespace: String,
    /// Kind of the permission set
    pub kind: PermissionSetKind,
    /// User performing the bind
    pub bound_by: u64,
}

impl BindRequest {
    /// Ledger key of the binding
    pub fn key(&self) -> BindingKey {
        BindingKey::new(
            self.cluster_id,
            self.user_id,
            self.permission_set.clone(),
            self.namespace.clone(),
        )
    }

    fn validate(&self) -> Result<(), Error> {
        validate_permission_set(&self.permission_set)?;
        if self.namespace.is_empty() {
            if self.kind != PermissionSetKind::ClusterRole {
                return Err(Error::validation_for(
                    "kind",
                    "a cluster-scoped binding must reference a ClusterRole",
                ));
            }
        } else {
            validate_namespace(&self.namespace)?;
        }
        Ok(())
    }
}

fn validate_permission_set(name: &str) -> Result<(), Error> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '%'])
        || name.chars().any(char::is_whitespace);
    if invalid {
        return Err(Error::validation_for(
            "permission_set",
            format!("{:?} is not a valid role name", name),
        ));
    }
    Ok(())
}

fn validate_namespace(namespace: &str) -> Result<(), Error> {
    if !is_dns_subdomain(namespace) || namespace.contains('.') {
        return Err(Error::validation_for(
            "namespace",
            format!("{:?} is not a valid namespace name", namespace),
        ));
    }
    Ok(())
}

/// A user bound to a permission set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundUser {
    /// Platform user id
    pub user_id: u64,
    /// Login name
    pub username: String,
    /// Display name
    pub real_name: String,
    /// Kind of the bound permission set
    pub kind: PermissionSetKind,
    /// When the binding was recorded
    pub bound_at: DateTime<Utc>,
}

/// A binding row joined with its cluster and user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBinding {
    /// Managed cluster id
    pub cluster_id: u64,
    /// Managed cluster name
    pub cluster_name: String,
    /// Platform user id
    pub user_id: u64,
    /// Login name
    pub username: String,
    /// Display name
    pub real_name: String,
    /// Permission set name
    pub permission_set: String,
    /// Namespace, empty for cluster scope
    pub namespace: String,
    /// Kind of the permission set
    pub kind: PermissionSetKind,
    /// User who created the binding
    pub bound_by: u64,
    /// When the binding was recorded
    pub bound_at: DateTime<Utc>,
}

/// An actively granted service identity found on a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialIdentity {
    /// Login name
    pub username: String,
    /// Display name
    pub real_name: String,
    /// Service account name
    pub service_identity: String,
    /// Namespace the service account was found in
    pub namespace: String,
    /// Platform user id
    pub user_id: u64,
    /// First issuance time from the ledger
    pub created_at: DateTime<Utc>,
}

/// Create the native binding object for one ledger row.
///
/// An object that already exists under the deterministic name is accepted.
pub(crate) async fn create_native_binding(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    naming: &NamingConfig,
    permission_set: &str,
    namespace: &str,
    kind: PermissionSetKind,
    service_identity: &str,
) -> Result<(), Error> {
    let name = naming.binding_name(permission_set, service_identity);
    let (operation, response) = if namespace.is_empty() {
        let binding = objects::cluster_role_binding(naming, permission_set, service_identity);
        let operation = "create cluster role binding";
        (
            operation,
            scope
                .run(operation, api.create_cluster_role_binding(&binding))
                .await?,
        )
    } else {
        let binding =
            objects::role_binding(naming, permission_set, kind, namespace, service_identity);
        let operation = "create role binding";
        (
            operation,
            scope
                .run(operation, api.create_role_binding(namespace, &binding))
                .await?,
        )
    };

    match response {
        Ok(()) => {
            info!(binding = %name, namespace, %kind, "created binding");
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            debug!(binding = %name, namespace, "binding already exists");
            Ok(())
        }
        Err(e) => Err(Error::upstream(operation, e)),
    }
}

/// Delete the native binding object for one ledger row.
///
/// Returns false if it was already gone.
pub(crate) async fn delete_native_binding(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    naming: &NamingConfig,
    permission_set: &str,
    namespace: &str,
    service_identity: &str,
) -> Result<bool, Error> {
    let name = naming.binding_name(permission_set, service_identity);
    let (operation, response) = if namespace.is_empty() {
        let operation = "delete cluster role binding";
        (
            operation,
            scope
                .run(operation, api.delete_cluster_role_binding(&name))
                .await?,
        )
    } else {
        let operation = "delete role binding";
        (
            operation,
            scope
                .run(operation, api.delete_role_binding(namespace, &name))
                .await?,
        )
    };

    match response {
        Ok(()) => {
            info!(binding = %name, namespace, "deleted binding");
            Ok(true)
        }
        Err(e) if e.is_not_found() => {
            debug!(binding = %name, namespace, "binding already absent");
            Ok(false)
        }
        Err(e) => Err(Error::upstream(operation, e)),
    }
}

/// Binds and unbinds users to permission sets
pub struct RoleBindingManager {
    config: Arc<AccessConfig>,
    resolver: Arc<ConnectionResolver>,
    issuer: CredentialIssuer,
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn Ledger>,
}

impl RoleBindingManager {
    /// Build a manager
    pub fn new(
        config: Arc<AccessConfig>,
        resolver: Arc<ConnectionResolver>,
        issuer: CredentialIssuer,
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            config,
            resolver,
            issuer,
            identities,
            ledger,
        }
    }

    /// Bind a user to a permission set.
    ///
    /// Fails with [`Error::AlreadyBound`] before touching the cluster if the
    /// same binding is recorded. Otherwise bootstraps the user's service
    /// identity, creates the native binding and records it. If recording
    /// fails the native binding is deleted again on a best-effort basis.
    #[instrument(
        skip(self, scope, request),
        fields(
            cluster_id = request.cluster_id,
            user_id = request.user_id,
            permission_set = %request.permission_set,
            namespace = %request.namespace
        )
    )]
    pub async fn bind(
        &self,
        scope: &RequestScope,
        request: BindRequest,
    ) -> Result<RoleBindingRecord, Error> {
        request.validate()?;
        let key = request.key();
        if self.ledger.binding(&key).await?.is_some() {
            return Err(already_bound(key));
        }

        let user = self.user(request.user_id).await?;
        let session = self.resolver.admin_session(scope, request.cluster_id).await?;
        let identity = self.issuer.bootstrap(scope, &session, &user.username).await?;
        self.ensure_identity_record(&request, &identity).await?;

        let naming = &self.config.naming;
        create_native_binding(
            scope,
            session.api.as_ref(),
            naming,
            &request.permission_set,
            &request.namespace,
            request.kind,
            &identity.name,
        )
        .await?;

        let record = RoleBindingRecord::new(key.clone(), request.kind, request.bound_by);
        match self.ledger.insert_binding(record.clone()).await {
            Ok(()) => {
                info!(service_identity = %identity.name, "recorded binding");
                Ok(record)
            }
            // A concurrent bind recorded the same key and owns the object.
            Err(e) if e.is_conflict() => Err(already_bound(key)),
            Err(source) => {
                warn!(error = %source, "ledger insert failed, removing native binding");
                // The caller's scope may already be spent; compensate unguarded.
                let compensated = match delete_native_binding(
                    &RequestScope::new(),
                    session.api.as_ref(),
                    naming,
                    &request.permission_set,
                    &request.namespace,
                    &identity.name,
                )
                .await
                {
                    Ok(_) => true,
                    Err(e) => {
                        error!(error = %e, "compensating binding delete failed");
                        false
                    }
                };
                Err(Error::LedgerInconsistency {
                    operation: "bind".to_string(),
                    compensated,
                    source,
                })
            }
        }
    }

    /// Remove a recorded binding and its native object
    #[instrument(skip(self, scope))]
    pub async fn unbind(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
        user_id: u64,
        permission_set: &str,
        namespace: &str,
    ) -> Result<RoleBindingRecord, Error> {
        let key = BindingKey::new(cluster_id, user_id, permission_set, namespace);
        let record = self
            .ledger
            .binding(&key)
            .await?
            .ok_or_else(|| not_bound(key.clone()))?;

        let service_identity = self.service_identity_name(cluster_id, user_id).await?;
        let session = self.resolver.admin_session(scope, cluster_id).await?;
        delete_native_binding(
            scope,
            session.api.as_ref(),
            &self.config.naming,
            permission_set,
            namespace,
            &service_identity,
        )
        .await?;

        if !self.ledger.delete_binding(&key).await? {
            debug!("binding row removed concurrently");
        }
        info!(%service_identity, "unbound");
        Ok(record)
    }

    /// Users bound to one permission set in one scope, oldest binding first
    pub async fn list_bound_users(
        &self,
        cluster_id: u64,
        permission_set: &str,
        namespace: &str,
    ) -> Result<Vec<BoundUser>, Error> {
        let rows = self
            .ledger
            .bindings_for_permission_set(cluster_id, permission_set, namespace)
            .await?;
        let mut profiles = UserProfiles::new(self.identities.as_ref());

        let mut bound = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(user) = profiles.get(row.user_id).await? else {
                continue;
            };
            bound.push(BoundUser {
                user_id: row.user_id,
                username: user.username,
                real_name: user.real_name,
                kind: row.kind,
                bound_at: row.created_at,
            });
        }
        Ok(bound)
    }

    /// Binding rows of a cluster, or of one user on it, newest first
    pub async fn list_user_bindings(
        &self,
        cluster_id: u64,
        user_id: Option<u64>,
    ) -> Result<Vec<UserBinding>, Error> {
        let cluster = self.resolver.cluster(cluster_id).await?;
        let rows = match user_id {
            Some(user_id) => self.ledger.bindings_for_user(cluster_id, user_id).await?,
            None => self.ledger.bindings_for_cluster(cluster_id).await?,
        };
        let mut profiles = UserProfiles::new(self.identities.as_ref());

        let mut bindings = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(user) = profiles.get(row.user_id).await? else {
                continue;
            };
            bindings.push(UserBinding {
                cluster_id,
                cluster_name: cluster.name.clone(),
                user_id: row.user_id,
                username: user.username,
                real_name: user.real_name,
                permission_set: row.permission_set,
                namespace: row.namespace,
                kind: row.kind,
                bound_by: row.bound_by,
                bound_at: row.created_at,
            });
        }
        Ok(bindings)
    }

    /// Service identities on the cluster that the ledger holds as granted.
    ///
    /// A service account present on the cluster without an active ledger
    /// row is left out. A name present in both identity namespaces is
    /// reported once, from the dedicated namespace.
    #[instrument(skip(self, scope))]
    pub async fn list_credential_identities(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
    ) -> Result<Vec<CredentialIdentity>, Error> {
        let naming = &self.config.naming;
        let session = self.resolver.admin_session(scope, cluster_id).await?;

        let mut found: BTreeMap<String, String> = BTreeMap::new();
        for namespace in naming.identity_namespaces() {
            let accounts = scope
                .call(
                    "list service accounts",
                    session.api.list_service_accounts(namespace),
                )
                .await?;
            for account in accounts {
                if let Some(name) = account.metadata.name {
                    found.entry(name).or_insert_with(|| namespace.to_string());
                }
            }
        }

        let records: HashMap<u64, ServiceIdentityRecord> = self
            .ledger
            .identities_for_cluster(cluster_id)
            .await?
            .into_iter()
            .filter(|r| r.active && r.revoked_at.is_none())
            .map(|r| (r.user_id, r))
            .collect();

        let mut identities = Vec::new();
        for (name, namespace) in found {
            let Some(username) = naming.username_from_identity(&name) else {
                continue;
            };
            let Some(user) = self
                .identities
                .user_by_username(username)
                .await
                .map_err(|e| Error::collaborator("user lookup", e))?
            else {
                debug!(service_identity = %name, "no platform user for service identity");
                continue;
            };
            let Some(record) = records
                .get(&user.id)
                .filter(|r| r.service_identity == name)
            else {
                continue;
            };
            identities.push(CredentialIdentity {
                username: user.username,
                real_name: user.real_name,
                service_identity: name,
                namespace,
                user_id: user.id,
                created_at: record.created_at,
            });
        }
        identities.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(identities)
    }

    async fn user(&self, user_id: u64) -> Result<PlatformUser, Error> {
        self.identities
            .user(user_id)
            .await
            .map_err(|e| Error::collaborator("user lookup", e))?
            .ok_or_else(|| Error::UnknownUser {
                user: user_id.to_string(),
            })
    }

    async fn service_identity_name(&self, cluster_id: u64, user_id: u64) -> Result<String, Error> {
        if let Some(record) = self.ledger.identity(cluster_id, user_id).await? {
            return Ok(record.service_identity);
        }
        let user = self.user(user_id).await?;
        Ok(self.config.naming.service_identity_name(&user.username))
    }

    async fn ensure_identity_record(
        &self,
        request: &BindRequest,
        identity: &ServiceIdentity,
    ) -> Result<(), Error> {
        let existing = self
            .ledger
            .identity(request.cluster_id, request.user_id)
            .await?;
        if existing.is_some_and(|r| r.active && r.service_identity == identity.name) {
            return Ok(());
        }
        self.ledger
            .upsert_identity(ServiceIdentityRecord::new(
                request.cluster_id,
                request.user_id,
                identity.name.clone(),
                identity.namespace.clone(),
                request.bound_by,
            ))
            .await?;
        self.resolver
            .invalidate_user(request.cluster_id, request.user_id);
        info!(service_identity = %identity.name, "recorded service identity");
        Ok(())
    }
}

fn already_bound(key: BindingKey) -> Error {
    Error::AlreadyBound {
        cluster_id: key.cluster_id,
        user_id: key.user_id,
        permission_set: key.permission_set,
        namespace: key.namespace,
    }
}

fn not_bound(key: BindingKey) -> Error {
    Error::NotBound {
        cluster_id: key.cluster_id,
        user_id: key.user_id,
        permission_set: key.permission_set,
        namespace: key.namespace,
    }
}

/// Memoized user lookups for one listing
struct UserProfiles<'a> {
    store: &'a dyn IdentityStore,
    seen: HashMap<u64, Option<PlatformUser>>,
}

impl<'a> UserProfiles<'a> {
    fn new(store: &'a dyn IdentityStore) -> Self {
        Self {
            store,
            seen: HashMap::new(),
        }
    }

    async fn get(&mut self, user_id: u64) -> Result<Option<PlatformUser>, Error> {
        if let Some(user) = self.seen.get(&user_id) {
            return Ok(user.clone());
        }
        let user = self
            .store
            .user(user_id)
            .await
            .map_err(|e| Error::collaborator("user lookup", e))?;
        if user.is_none() {
            debug!(user_id, "binding row for unknown user omitted");
        }
        self.seen.insert(user_id, user.clone());
        Ok(user)
    }
}
