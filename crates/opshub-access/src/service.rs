//! Access service facade
//!
//! Wires the resolver, issuer, binding manager and revocation engine around
//! one ledger and one set of collaborators, and exposes the operations the
//! rest of the platform calls.

use std::fmt;
use std::sync::Arc;

use opshub_common::config::AccessConfig;
use opshub_ledger::{Ledger, ServiceIdentityRecord};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::bindings::{create_native_binding, delete_native_binding, RoleBindingManager};
use crate::cluster_api::{ClusterConnector, ClusterHandle};
use crate::collaborators::{ClusterRegistry, IdentityStore, PlatformUser};
use crate::error::Error;
use crate::issuer::CredentialIssuer;
use crate::resolver::{AdminSession, ConnectionResolver};
use crate::revocation::{delete_service_account, RevocationEngine};
use crate::scope::RequestScope;

/// A credential handed to a user
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantedCredential {
    /// Service identity the credential authenticates as
    pub service_identity: String,
    /// Namespace of the service identity
    pub namespace: String,
    /// Portable credential document (kubeconfig YAML)
    pub document: String,
}

impl fmt::Debug for GrantedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantedCredential")
            .field("service_identity", &self.service_identity)
            .field("namespace", &self.namespace)
            .field("document", &"<redacted>")
            .finish()
    }
}

/// Outcome of purging a deleted cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    /// Whether native objects on the cluster were cleaned up
    pub native_cleanup: bool,
    /// Identity rows removed
    pub identities_deleted: usize,
    /// Binding rows removed
    pub bindings_deleted: usize,
}

/// Entry point for per-user cluster access
pub struct AccessService {
    config: Arc<AccessConfig>,
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn Ledger>,
    issuer: CredentialIssuer,
    resolver: Arc<ConnectionResolver>,
    bindings: RoleBindingManager,
    revocation: RevocationEngine,
}

impl AccessService {
    /// Wire every component around the given collaborators
    pub fn new(
        config: AccessConfig,
        registry: Arc<dyn ClusterRegistry>,
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn Ledger>,
        connector: Arc<dyn ClusterConnector>,
    ) -> Self {
        let config = Arc::new(config);
        let issuer = CredentialIssuer::new(config.clone());
        let resolver = Arc::new(ConnectionResolver::new(
            config.clone(),
            registry,
            identities.clone(),
            ledger.clone(),
            connector,
            issuer.clone(),
        ));
        let bindings = RoleBindingManager::new(
            config.clone(),
            resolver.clone(),
            issuer.clone(),
            identities.clone(),
            ledger.clone(),
        );
        let revocation = RevocationEngine::new(
            config.clone(),
            resolver.clone(),
            identities.clone(),
            ledger.clone(),
        );
        Self {
            config,
            identities,
            ledger,
            issuer,
            resolver,
            bindings,
            revocation,
        }
    }

    /// Effective configuration
    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// The credential issuer
    pub fn issuer(&self) -> &CredentialIssuer {
        &self.issuer
    }

    /// The connection resolver
    pub fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    /// The role-binding manager
    pub fn bindings(&self) -> &RoleBindingManager {
        &self.bindings
    }

    /// The revocation engine
    pub fn revocation(&self) -> &RevocationEngine {
        &self.revocation
    }

    /// Handle for a user on a cluster, see [`ConnectionResolver::resolve`]
    pub async fn resolve(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
        user_id: u64,
    ) -> Result<ClusterHandle, Error> {
        self.resolver.resolve(scope, cluster_id, user_id).await
    }

    /// Grant a user access to a cluster and return their credential.
    ///
    /// Creates the service identity if needed and records it as active.
    /// After a scoped revoke, the bindings still recorded for the user are
    /// recreated on the cluster.
    #[instrument(skip(self, scope))]
    pub async fn grant_credential(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
        user_id: u64,
        created_by: u64,
    ) -> Result<GrantedCredential, Error> {
        let user = self.user(user_id).await?;
        let session = self.resolver.admin_session(scope, cluster_id).await?;
        let issued = self.issuer.issue(scope, &session, &user.username).await?;
        let identity = issued.identity;

        self.ledger
            .upsert_identity(ServiceIdentityRecord::new(
                cluster_id,
                user_id,
                identity.name.clone(),
                identity.namespace.clone(),
                created_by,
            ))
            .await?;

        let restored = self
            .restore_bindings(scope, &session, user_id, &identity.name)
            .await?;
        self.resolver.invalidate_user(cluster_id, user_id);
        info!(service_identity = %identity.name, restored, "granted credential");

        Ok(GrantedCredential {
            document: issued.bundle.to_yaml()?,
            service_identity: identity.name,
            namespace: identity.namespace,
        })
    }

    /// A fresh credential for a user's active identity
    #[instrument(skip(self, scope))]
    pub async fn existing_credential(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
        user_id: u64,
    ) -> Result<GrantedCredential, Error> {
        let record = match self.ledger.identity(cluster_id, user_id).await? {
            Some(record) if record.active => record,
            _ => {
                return Err(Error::NotGranted {
                    cluster_id,
                    user_id,
                })
            }
        };
        let session = self.resolver.admin_session(scope, cluster_id).await?;
        let bundle = self
            .issuer
            .mint(scope, &session, &record.service_identity)
            .await?;
        Ok(GrantedCredential {
            service_identity: record.service_identity,
            namespace: record.namespace,
            document: bundle.to_yaml()?,
        })
    }

    /// The registry changed a cluster's credential or endpoint
    pub fn on_cluster_updated(&self, cluster_id: u64) {
        self.resolver.invalidate(cluster_id);
    }

    /// Drop cached handles so the next call reconnects
    pub fn force_reconnect(&self, cluster_id: u64) {
        self.resolver.invalidate(cluster_id);
    }

    /// The registry deleted a cluster.
    ///
    /// Native objects are cleaned up best-effort while the admin credential
    /// is still readable; ledger rows are always removed.
    #[instrument(skip(self, scope))]
    pub async fn on_cluster_deleted(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
    ) -> Result<PurgeReport, Error> {
        let native_cleanup = match self.resolver.admin_session(scope, cluster_id).await {
            Ok(session) => {
                self.cleanup_cluster(scope, &session).await?;
                true
            }
            Err(e @ Error::Aborted { .. }) => return Err(e),
            Err(e) => {
                warn!(cluster_id, error = %e, "cluster unreachable, skipping native cleanup");
                false
            }
        };

        let bindings_deleted = self.ledger.delete_bindings_for_cluster(cluster_id).await?;
        let identities_deleted = self.ledger.delete_identities_for_cluster(cluster_id).await?;
        self.resolver.invalidate(cluster_id);
        info!(identities_deleted, bindings_deleted, "purged cluster");

        Ok(PurgeReport {
            native_cleanup,
            identities_deleted,
            bindings_deleted,
        })
    }

    async fn cleanup_cluster(&self, scope: &RequestScope, session: &AdminSession) -> Result<(), Error> {
        let cluster_id = session.cluster.id;
        let api = session.api.as_ref();
        let naming = &self.config.naming;

        for record in self.ledger.identities_for_cluster(cluster_id).await? {
            for binding in self.ledger.bindings_for_user(cluster_id, record.user_id).await? {
                let result = delete_native_binding(
                    scope,
                    api,
                    naming,
                    &binding.permission_set,
                    &binding.namespace,
                    &record.service_identity,
                )
                .await;
                match result {
                    Ok(_) => {}
                    Err(e @ Error::Aborted { .. }) => return Err(e),
                    Err(e) => warn!(error = %e, "binding cleanup failed"),
                }
            }
            match delete_service_account(scope, api, &record.namespace, &record.service_identity)
                .await
            {
                Ok(_) => {}
                Err(e @ Error::Aborted { .. }) => return Err(e),
                Err(e) => warn!(error = %e, "identity cleanup failed"),
            }
        }
        Ok(())
    }

    async fn restore_bindings(
        &self,
        scope: &RequestScope,
        session: &AdminSession,
        user_id: u64,
        service_identity: &str,
    ) -> Result<usize, Error> {
        let bindings = self
            .ledger
            .bindings_for_user(session.cluster.id, user_id)
            .await?;
        for binding in &bindings {
            create_native_binding(
                scope,
                session.api.as_ref(),
                &self.config.naming,
                &binding.permission_set,
                &binding.namespace,
                binding.kind,
                service_identity,
            )
            .await?;
        }
        Ok(bindings.len())
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::BindRequest;
    use crate::issuer::PortableCredential;
    use crate::testing::{Harness, ADMIN_CA};
    use opshub_ledger::PermissionSetKind;

    fn viewer(user_id: u64) -> BindRequest {
        BindRequest {
            cluster_id: 1,
            user_id,
            permission_set: "cluster-viewer".to_string(),
            namespace: String::new(),
            kind: PermissionSetKind::ClusterRole,
            bound_by: 1,
        }
    }

    mod grant {
        use super::*;

        #[tokio::test]
        async fn test_grant_records_identity_and_returns_document() {
            let harness = Harness::new();
            let service = harness.service();

            let granted = service
                .grant_credential(&RequestScope::new(), 1, 7, 1)
                .await
                .unwrap();
            assert_eq!(granted.service_identity, "opshub-alice");
            assert_eq!(granted.namespace, "opshub-auth");

            let bundle = PortableCredential::from_yaml(&granted.document).unwrap();
            assert_eq!(bundle.ca_data(), Some(ADMIN_CA));

            let record = harness.ledger.identity(1, 7).await.unwrap().unwrap();
            assert!(record.active);
            assert_eq!(record.created_by, 1);
            // identity only, never permissions
            assert_eq!(harness.cluster.cluster_role_binding_count(), 0);
            assert!(!format!("{:?}", granted).contains("token"));
        }

        #[tokio::test]
        async fn test_grant_twice_is_idempotent() {
            let harness = Harness::new();
            let service = harness.service();
            let scope = RequestScope::new();

            let first = service.grant_credential(&scope, 1, 7, 1).await.unwrap();
            let creates = harness.cluster.create_calls();
            let second = service.grant_credential(&scope, 1, 7, 1).await.unwrap();

            assert_eq!(first.service_identity, second.service_identity);
            assert_eq!(harness.cluster.create_calls(), creates);
            assert_eq!(harness.cluster.service_account_count(), 1);
        }

        #[tokio::test]
        async fn test_regrant_restores_recorded_bindings() {
            let harness = Harness::new();
            let service = harness.service();
            let scope = RequestScope::new();
            service.bindings().bind(&scope, viewer(7)).await.unwrap();
            service
                .revocation()
                .revoke_credential(&scope, 1, 7)
                .await
                .unwrap();
            assert_eq!(harness.cluster.cluster_role_binding_count(), 0);

            service.grant_credential(&scope, 1, 7, 1).await.unwrap();
            assert!(harness
                .cluster
                .has_cluster_role_binding("opshub-cluster-viewer-opshub-alice"));
            assert!(harness.ledger.identity(1, 7).await.unwrap().unwrap().active);
            service.resolve(&scope, 1, 7).await.unwrap();
        }

        #[tokio::test]
        async fn test_grant_unknown_user() {
            let harness = Harness::new();
            let err = harness
                .service()
                .grant_credential(&RequestScope::new(), 1, 404, 1)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::UnknownUser { .. }));
        }
    }

    mod existing {
        use super::*;

        #[tokio::test]
        async fn test_existing_requires_active_identity() {
            let harness = Harness::new();
            let service = harness.service();
            let scope = RequestScope::new();

            let err = service.existing_credential(&scope, 1, 7).await.unwrap_err();
            assert!(matches!(err, Error::NotGranted { .. }));

            service.grant_credential(&scope, 1, 7, 1).await.unwrap();
            let existing = service.existing_credential(&scope, 1, 7).await.unwrap();
            assert_eq!(existing.service_identity, "opshub-alice");

            service
                .revocation()
                .revoke_credential(&scope, 1, 7)
                .await
                .unwrap();
            let err = service.existing_credential(&scope, 1, 7).await.unwrap_err();
            assert!(matches!(err, Error::NotGranted { .. }));
        }
    }

    mod lifecycle {
        use super::*;
        use crate::resolver::CacheKey;

        #[tokio::test]
        async fn test_cluster_update_drops_admin_and_user_handles() {
            let harness = Harness::new();
            harness.identities.add_user(1, "root", &["admin"]);
            let service = harness.service();
            let scope = RequestScope::new();
            service.grant_credential(&scope, 1, 7, 1).await.unwrap();
            service.resolve(&scope, 1, 7).await.unwrap();
            service.resolve(&scope, 1, 1).await.unwrap();

            service.on_cluster_updated(1);
            assert!(service.resolver().cache().get(&CacheKey::admin(1)).is_none());
            assert!(service.resolver().cache().get(&CacheKey::user(1, 7)).is_none());

            let user_connects = harness.connector.user_connects();
            service.resolve(&scope, 1, 7).await.unwrap();
            assert_eq!(harness.connector.user_connects(), user_connects + 1);
        }

        #[tokio::test]
        async fn test_cluster_delete_purges_everything() {
            let harness = Harness::new();
            let service = harness.service();
            let scope = RequestScope::new();
            service.bindings().bind(&scope, viewer(7)).await.unwrap();
            service.bindings().bind(&scope, viewer(8)).await.unwrap();

            let report = service.on_cluster_deleted(&scope, 1).await.unwrap();
            assert!(report.native_cleanup);
            assert_eq!(report.identities_deleted, 2);
            assert_eq!(report.bindings_deleted, 2);
            assert_eq!(harness.cluster.cluster_role_binding_count(), 0);
            assert_eq!(harness.cluster.service_account_count(), 0);
            assert!(harness.ledger.identities_for_cluster(1).await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_cancelled_cluster_delete_keeps_ledger() {
            let harness = Harness::new();
            harness
                .service()
                .bindings()
                .bind(&RequestScope::new(), viewer(7))
                .await
                .unwrap();

            let service = harness.service();
            let scope = RequestScope::new();
            scope.cancel();
            let err = service.on_cluster_deleted(&scope, 1).await.unwrap_err();

            assert!(matches!(err, Error::Aborted { .. }));
            assert_eq!(harness.cluster.cluster_role_binding_count(), 1);
            assert_eq!(harness.ledger.identities_for_cluster(1).await.unwrap().len(), 1);
            assert_eq!(harness.ledger.bindings_for_cluster(1).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_cluster_delete_after_registry_removal() {
            let harness = Harness::new();
            let service = harness.service();
            let scope = RequestScope::new();
            service.bindings().bind(&scope, viewer(7)).await.unwrap();
            harness.registry.remove_cluster(1);

            let report = service.on_cluster_deleted(&scope, 1).await.unwrap();
            assert!(!report.native_cleanup);
            assert_eq!(report.identities_deleted, 1);
            assert!(harness.ledger.bindings_for_cluster(1).await.unwrap().is_empty());
        }
    }
}
