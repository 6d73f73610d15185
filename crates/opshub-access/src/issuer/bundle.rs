//! Portable credential bundle
//!
//! A single-cluster, single-context kubeconfig that any standard Kubernetes
//! client can load to authenticate as a service identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kubeconfig document issued for a service identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortableCredential {
    /// Always "v1"
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    /// Always "Config"
    pub kind: String,
    /// Exactly one cluster
    pub clusters: Vec<NamedCluster>,
    /// Exactly one context
    pub contexts: Vec<NamedContext>,
    /// Name of the only context
    #[serde(rename = "current-context")]
    pub current_context: String,
    /// Always empty
    #[serde(default)]
    pub preferences: serde_json::Map<String, serde_json::Value>,
    /// Exactly one user
    pub users: Vec<NamedUser>,
}

/// Cluster entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    /// Cluster name
    pub name: String,
    /// Connection details
    pub cluster: ClusterEntry,
}

/// Cluster connection details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterEntry {
    /// Base64 CA bundle
    pub certificate_authority_data: String,
    /// API server URL
    pub server: String,
}

/// Context entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    /// Context name
    pub name: String,
    /// Cluster and user references
    pub context: ContextEntry,
}

/// Context references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Cluster name
    pub cluster: String,
    /// User name
    pub user: String,
}

/// User entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    /// Service identity name
    pub name: String,
    /// Credentials
    pub user: UserEntry,
}

/// User credentials
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Bearer token
    pub token: String,
}

impl fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserEntry")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl PortableCredential {
    /// Assemble a bundle for one cluster and one service identity
    pub fn new(
        cluster_name: &str,
        server: &str,
        ca_data: &str,
        service_identity: &str,
        token: &str,
    ) -> Self {
        let context = format!("{}-context", cluster_name);
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: cluster_name.to_string(),
                cluster: ClusterEntry {
                    certificate_authority_data: ca_data.to_string(),
                    server: server.to_string(),
                },
            }],
            contexts: vec![NamedContext {
                name: context.clone(),
                context: ContextEntry {
                    cluster: cluster_name.to_string(),
                    user: service_identity.to_string(),
                },
            }],
            current_context: context,
            preferences: serde_json::Map::new(),
            users: vec![NamedUser {
                name: service_identity.to_string(),
                user: UserEntry {
                    token: token.to_string(),
                },
            }],
        }
    }

    /// Parse a bundle back from YAML
    pub fn from_yaml(document: &str) -> Result<Self, Error> {
        serde_yaml::from_str(document)
            .map_err(|e| Error::validation_for("credential document", e.to_string()))
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self)
            .map_err(|e| Error::validation_for("credential document", e.to_string()))
    }

    /// Bearer token of the only user
    pub fn token(&self) -> Option<&str> {
        self.users.first().map(|u| u.user.token.as_str())
    }

    /// Service identity name of the only user
    pub fn service_identity(&self) -> Option<&str> {
        self.users.first().map(|u| u.name.as_str())
    }

    /// CA data of the only cluster
    pub fn ca_data(&self) -> Option<&str> {
        self.clusters
            .first()
            .map(|c| c.cluster.certificate_authority_data.as_str())
    }

    /// API server URL of the only cluster
    pub fn server(&self) -> Option<&str> {
        self.clusters.first().map(|c| c.cluster.server.as_str())
    }
}
