//! Credential issuer
//!
//! Creates a platform user's service identity on a managed cluster and mints
//! portable credentials for it. Every cluster call runs with the cluster's
//! admin credential and inside the caller's [`RequestScope`].

mod bundle;
mod ca;
mod strategy;
mod token;

use std::sync::Arc;

use opshub_common::config::AccessConfig;
use opshub_common::is_dns_subdomain;
use opshub_common::kube_utils::extract_server;
use tracing::{debug, info, instrument};

pub use bundle::{
    ClusterEntry, ContextEntry, NamedCluster, NamedContext, NamedUser, PortableCredential,
    UserEntry,
};

use crate::error::{CredentialMaterial, Error};
use crate::objects;
use crate::resolver::AdminSession;
use crate::scope::RequestScope;

/// A service identity as it exists on a cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    /// Service account name
    pub name: String,
    /// Namespace holding it
    pub namespace: String,
}

/// A freshly issued credential
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Identity the credential authenticates as
    pub identity: ServiceIdentity,
    /// The credential document
    pub bundle: PortableCredential,
}

/// Issues service identities and portable credentials
#[derive(Clone)]
pub struct CredentialIssuer {
    config: Arc<AccessConfig>,
}

impl CredentialIssuer {
    /// An issuer using the given naming and credential settings
    pub fn new(config: Arc<AccessConfig>) -> Self {
        Self { config }
    }

    /// Ensure the dedicated namespace and the user's service identity exist.
    ///
    /// Idempotent: an existing namespace or identity is left as it is, and a
    /// concurrent creator winning the race counts as success.
    #[instrument(skip(self, scope, session), fields(cluster_id = session.cluster.id))]
    pub async fn bootstrap(
        &self,
        scope: &RequestScope,
        session: &AdminSession,
        username: &str,
    ) -> Result<ServiceIdentity, Error> {
        let naming = &self.config.naming;
        let name = naming.service_identity_name(username);
        if !is_dns_subdomain(&name) {
            return Err(Error::validation_for(
                "username",
                format!(
                    "{:?} does not yield a valid service account name ({:?})",
                    username, name
                ),
            ));
        }

        let api = session.api.as_ref();
        let namespace = naming.dedicated_namespace.as_str();

        let existing = scope
            .call("get namespace", api.get_namespace(namespace))
            .await?;
        if existing.is_none() {
            match scope
                .run(
                    "create namespace",
                    api.create_namespace(&objects::dedicated_namespace(naming)),
                )
                .await?
            {
                Ok(()) => info!(namespace, "created dedicated namespace"),
                Err(e) if e.is_already_exists() => debug!(namespace, "namespace created concurrently"),
                Err(e) => return Err(Error::upstream("create namespace", e)),
            }
        }

        let existing = scope
            .call(
                "get service account",
                api.get_service_account(namespace, &name),
            )
            .await?;
        if existing.is_none() {
            let service_account = objects::service_account(&name, namespace, username);
            match scope
                .run(
                    "create service account",
                    api.create_service_account(namespace, &service_account),
                )
                .await?
            {
                Ok(()) => info!(service_identity = %name, namespace, "created service identity"),
                Err(e) if e.is_already_exists() => {
                    debug!(service_identity = %name, "service identity created concurrently")
                }
                Err(e) => return Err(Error::upstream("create service account", e)),
            }
        }

        Ok(ServiceIdentity {
            name,
            namespace: namespace.to_string(),
        })
    }

    /// Bootstrap the user's identity and mint a credential for it
    pub async fn issue(
        &self,
        scope: &RequestScope,
        session: &AdminSession,
        username: &str,
    ) -> Result<IssuedCredential, Error> {
        let identity = self.bootstrap(scope, session, username).await?;
        let bundle = self.mint(scope, session, &identity.name).await?;
        Ok(IssuedCredential { identity, bundle })
    }

    /// Mint a credential for an existing service identity.
    ///
    /// Token, CA data and endpoint are each looked up through their own
    /// fallback chain; the first source that yields a value wins.
    #[instrument(skip(self, scope, session), fields(cluster_id = session.cluster.id))]
    pub async fn mint(
        &self,
        scope: &RequestScope,
        session: &AdminSession,
        service_identity: &str,
    ) -> Result<PortableCredential, Error> {
        let api = session.api.as_ref();
        let token = token::acquire_token(scope, api, &self.config, service_identity).await?;
        let ca_data =
            ca::acquire_ca_data(scope, api, &self.config, &session.admin_credential).await?;
        let server = self.endpoint(session)?;

        debug!(service_identity, %server, "minted credential");
        Ok(PortableCredential::new(
            &session.cluster.name,
            &server,
            &ca_data,
            service_identity,
            &token,
        ))
    }

    fn endpoint(&self, session: &AdminSession) -> Result<String, Error> {
        if let Some(endpoint) = session
            .cluster
            .api_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
        {
            return Ok(endpoint.to_string());
        }
        extract_server(&session.admin_credential).ok_or_else(|| Error::CredentialMaterialMissing {
            material: CredentialMaterial::Endpoint,
            attempts: vec![
                "registered endpoint: not set".to_string(),
                "admin credential: no server field".to_string(),
            ],
        })
    }
}
