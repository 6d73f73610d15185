//! Revocation engine
//!
//! Two granularities. A scoped revoke removes what this platform created for
//! a user and soft-revokes the ledger record, keeping binding rows so a later
//! grant can restore them. A full revoke sweeps the whole cluster for
//! bindings naming the identity, wherever the identity lived, and erases
//! every ledger row of the user.

use std::sync::Arc;

use chrono::Utc;
use opshub_common::config::AccessConfig;
use opshub_ledger::Ledger;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::bindings::delete_native_binding;
use crate::cluster_api::ClusterApi;
use crate::collaborators::IdentityStore;
use crate::error::Error;
use crate::objects::names_service_account;
use crate::resolver::ConnectionResolver;
use crate::scope::RequestScope;

/// Suffix of the single cluster role binding older releases created per identity
const LEGACY_BINDING_SUFFIX: &str = "-binding";

/// Outcome of a scoped revoke
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationReport {
    /// Revoked service identity
    pub service_identity: String,
    /// Native binding objects deleted
    pub bindings_deleted: usize,
    /// Whether the service account was deleted (false if already absent)
    pub identity_deleted: bool,
}

/// Outcome of a full revoke
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullRevocationReport {
    /// Revoked service identity
    pub service_identity: String,
    /// Cluster role bindings deleted
    pub cluster_role_bindings_deleted: usize,
    /// Role bindings deleted, across all namespaces
    pub role_bindings_deleted: usize,
    /// Namespaces the service account was deleted from
    pub identity_deleted_from: Vec<String>,
    /// Ledger rows removed, zero if the username is unknown
    pub ledger_rows_deleted: usize,
}

/// Tears down identities and bindings
pub struct RevocationEngine {
    config: Arc<AccessConfig>,
    resolver: Arc<ConnectionResolver>,
    identities: Arc<dyn IdentityStore>,
    ledger: Arc<dyn Ledger>,
}

impl RevocationEngine {
    /// Build an engine
    pub fn new(
        config: Arc<AccessConfig>,
        resolver: Arc<ConnectionResolver>,
        identities: Arc<dyn IdentityStore>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            config,
            resolver,
            identities,
            ledger,
        }
    }

    /// Revoke a user's credential on one cluster.
    ///
    /// Deletes the binding objects recorded for the user, the single legacy
    /// binding older releases created, and the service account in the
    /// dedicated namespace, then marks the ledger record inactive.
    #[instrument(skip(self, scope))]
    pub async fn revoke_credential(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
        user_id: u64,
    ) -> Result<RevocationReport, Error> {
        let record = self
            .ledger
            .identity(cluster_id, user_id)
            .await?
            .ok_or(Error::NotGranted {
                cluster_id,
                user_id,
            })?;
        let service_identity = record.service_identity;
        let naming = &self.config.naming;
        let session = self.resolver.admin_session(scope, cluster_id).await?;
        let api = session.api.as_ref();

        let mut bindings_deleted = 0;
        for binding in self.ledger.bindings_for_user(cluster_id, user_id).await? {
            if delete_native_binding(
                scope,
                api,
                naming,
                &binding.permission_set,
                &binding.namespace,
                &service_identity,
            )
            .await?
            {
                bindings_deleted += 1;
            }
        }

        let legacy = format!("{}{}", service_identity, LEGACY_BINDING_SUFFIX);
        if tolerate_not_found(
            "delete cluster role binding",
            scope
                .run(
                    "delete cluster role binding",
                    api.delete_cluster_role_binding(&legacy),
                )
                .await?,
        )? {
            info!(binding = %legacy, "deleted legacy binding");
            bindings_deleted += 1;
        }

        let identity_deleted = delete_service_account(
            scope,
            api,
            &naming.dedicated_namespace,
            &service_identity,
        )
        .await?;

        self.ledger
            .deactivate_identity(cluster_id, user_id, Utc::now())
            .await?;
        self.resolver.invalidate_user(cluster_id, user_id);
        info!(%service_identity, bindings_deleted, "revoked credential");

        Ok(RevocationReport {
            service_identity,
            bindings_deleted,
            identity_deleted,
        })
    }

    /// Remove every trace of a service identity from a cluster.
    ///
    /// Bindings are matched by subject name in any namespace so identities
    /// left in the legacy namespace are caught too. Ledger rows are removed
    /// only if `username` resolves to a platform user.
    #[instrument(skip(self, scope))]
    pub async fn revoke_fully(
        &self,
        scope: &RequestScope,
        cluster_id: u64,
        service_identity: &str,
        username: &str,
    ) -> Result<FullRevocationReport, Error> {
        if service_identity.trim().is_empty() {
            return Err(Error::validation_for(
                "service_identity",
                "service identity name is required",
            ));
        }
        let session = self.resolver.admin_session(scope, cluster_id).await?;
        let api = session.api.as_ref();

        let (cluster_role_bindings, role_bindings) = futures::try_join!(
            scope.call(
                "list cluster role bindings",
                api.list_cluster_role_bindings()
            ),
            scope.call("list role bindings", api.list_all_role_bindings()),
        )?;

        let mut cluster_role_bindings_deleted = 0;
        for binding in cluster_role_bindings
            .iter()
            .filter(|b| names_service_account(b.subjects.as_deref(), service_identity))
        {
            let Some(name) = binding.metadata.name.as_deref() else {
                continue;
            };
            let response = scope
                .run(
                    "delete cluster role binding",
                    api.delete_cluster_role_binding(name),
                )
                .await?;
            if tolerate_not_found("delete cluster role binding", response)? {
                info!(binding = name, "deleted cluster role binding");
                cluster_role_bindings_deleted += 1;
            }
        }

        let mut role_bindings_deleted = 0;
        for binding in role_bindings
            .iter()
            .filter(|b| names_service_account(b.subjects.as_deref(), service_identity))
        {
            let (Some(namespace), Some(name)) = (
                binding.metadata.namespace.as_deref(),
                binding.metadata.name.as_deref(),
            ) else {
                continue;
            };
            let response = scope
                .run("delete role binding", api.delete_role_binding(namespace, name))
                .await?;
            if tolerate_not_found("delete role binding", response)? {
                info!(binding = name, namespace, "deleted role binding");
                role_bindings_deleted += 1;
            }
        }

        let mut identity_deleted_from = Vec::new();
        for namespace in self.config.naming.identity_namespaces() {
            if delete_service_account(scope, api, namespace, service_identity).await? {
                identity_deleted_from.push(namespace.to_string());
            }
        }

        let mut ledger_rows_deleted = 0;
        match self
            .identities
            .user_by_username(username)
            .await
            .map_err(|e| Error::collaborator("user lookup", e))?
        {
            Some(user) => {
                if self.ledger.delete_identity(cluster_id, user.id).await? {
                    ledger_rows_deleted += 1;
                }
                ledger_rows_deleted += self
                    .ledger
                    .delete_bindings_for_user(cluster_id, user.id)
                    .await?;
                self.resolver.invalidate_user(cluster_id, user.id);
            }
            None => debug!(username, "no platform user, ledger left untouched"),
        }

        info!(
            cluster_role_bindings_deleted,
            role_bindings_deleted, ledger_rows_deleted, "fully revoked service identity"
        );
        Ok(FullRevocationReport {
            service_identity: service_identity.to_string(),
            cluster_role_bindings_deleted,
            role_bindings_deleted,
            identity_deleted_from,
            ledger_rows_deleted,
        })
    }
}

/// `Ok(true)` if deleted, `Ok(false)` if already absent
fn tolerate_not_found(
    operation: &str,
    response: opshub_common::ApiResult<()>,
) -> Result<bool, Error> {
    match response {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(Error::upstream(operation, e)),
    }
}

pub(crate) async fn delete_service_account(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    namespace: &str,
    name: &str,
) -> Result<bool, Error> {
    let response = scope
        .run(
            "delete service account",
            api.delete_service_account(namespace, name),
        )
        .await?;
    let deleted = tolerate_not_found("delete service account", response)?;
    if deleted {
        info!(service_identity = name, namespace, "deleted service identity");
    }
    Ok(deleted)
}
