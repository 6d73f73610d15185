//! Ledger record types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of the permission set a binding refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionSetKind {
    /// Cluster-wide role definition
    ClusterRole,
    /// Role defined inside one namespace
    Role,
}

impl PermissionSetKind {
    /// Kubernetes kind string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClusterRole => "ClusterRole",
            Self::Role => "Role",
        }
    }
}

impl fmt::Display for PermissionSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised permission set kind
#[derive(Debug, Clone, Error)]
#[error("unknown permission set kind {0:?}, expected ClusterRole or Role")]
pub struct ParseKindError(pub String);

impl FromStr for PermissionSetKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ClusterRole" => Ok(Self::ClusterRole),
            "Role" => Ok(Self::Role),
            other => Err(ParseKindError(other.to_string())),
        }
    }
}

/// A service identity issued to one platform user on one cluster
///
/// At most one record exists per (cluster, user); `active` is false after a
/// scoped revoke until the user is granted again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentityRecord {
    /// Managed cluster id
    pub cluster_id: u64,
    /// Platform user id
    pub user_id: u64,
    /// Name of the service account on the cluster
    pub service_identity: String,
    /// Namespace holding the service account
    pub namespace: String,
    /// Whether access is currently granted
    pub active: bool,
    /// Platform user that granted access
    pub created_by: u64,
    /// First issuance time
    pub created_at: DateTime<Utc>,
    /// Time of the last scoped revoke
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ServiceIdentityRecord {
    /// A new active record stamped with the current time
    pub fn new(
        cluster_id: u64,
        user_id: u64,
        service_identity: impl Into<String>,
        namespace: impl Into<String>,
        created_by: u64,
    ) -> Self {
        Self {
            cluster_id,
            user_id,
            service_identity: service_identity.into(),
            namespace: namespace.into(),
            active: true,
            created_by,
            created_at: Utc::now(),
            revoked_at: None,
        }
    }
}

/// Unique key of a role binding row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingKey {
    /// Managed cluster id
    pub cluster_id: u64,
    /// Platform user id
    pub user_id: u64,
    /// Permission set (role) name
    pub permission_set: String,
    /// Namespace of the binding, empty for cluster scope
    pub namespace: String,
}

impl BindingKey {
    /// Build a key
    pub fn new(
        cluster_id: u64,
        user_id: u64,
        permission_set: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            cluster_id,
            user_id,
            permission_set: permission_set.into(),
            namespace: namespace.into(),
        }
    }

    /// Whether the binding is cluster scoped
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

/// A permission set bound to a user's service identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBindingRecord {
    /// Managed cluster id
    pub cluster_id: u64,
    /// Platform user id
    pub user_id: u64,
    /// Permission set (role) name
    pub permission_set: String,
    /// Namespace of the binding, empty for cluster scope
    pub namespace: String,
    /// Kind of the referenced permission set
    pub kind: PermissionSetKind,
    /// Platform user that created the binding
    pub bound_by: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl RoleBindingRecord {
    /// A new record for `key` stamped with the current time
    pub fn new(key: BindingKey, kind: PermissionSetKind, bound_by: u64) -> Self {
        Self {
            cluster_id: key.cluster_id,
            user_id: key.user_id,
            permission_set: key.permission_set,
            namespace: key.namespace,
            kind,
            bound_by,
            created_at: Utc::now(),
        }
    }

    /// The unique key of this row
    pub fn key(&self) -> BindingKey {
        BindingKey::new(
            self.cluster_id,
            self.user_id,
            self.permission_set.clone(),
            self.namespace.clone(),
        )
    }

    /// Whether the binding is cluster scoped
    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}
