//! Interfaces to the systems this crate reads from but does not own
//!
//! The cluster registry stores registered clusters and their encrypted
//! admin credentials; the identity store owns platform users and roles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// A failure reported by a collaborator
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    /// Build from any message
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// The parts of a registered cluster this crate reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedCluster {
    /// Registry id
    pub id: u64,
    /// Display name, used as the cluster name in issued credentials
    pub name: String,
    /// API server URL recorded at registration, if any
    #[serde(default)]
    pub api_endpoint: Option<String>,
}

/// A platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    /// Platform user id
    pub id: u64,
    /// Login name, used to derive the service identity name
    pub username: String,
    /// Display name
    #[serde(default)]
    pub real_name: String,
}

/// Registered clusters and their admin credentials
///
/// Implementations must call the access service's cache invalidation hook
/// whenever a cluster's credential changes or the cluster is deleted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// Look up a cluster by id
    async fn cluster(&self, cluster_id: u64) -> Result<Option<ManagedCluster>, CollaboratorError>;

    /// Decrypted admin credential document (kubeconfig) of a cluster
    async fn admin_credential(&self, cluster_id: u64) -> Result<String, CollaboratorError>;
}

/// Platform users and their role codes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Look up a user by id
    async fn user(&self, user_id: u64) -> Result<Option<PlatformUser>, CollaboratorError>;

    /// Look up a user by login name
    async fn user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<PlatformUser>, CollaboratorError>;

    /// Role codes held by a user
    async fn role_codes(&self, user_id: u64) -> Result<Vec<String>, CollaboratorError>;
}
