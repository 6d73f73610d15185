//! Static cluster and user directory
//!
//! `opshubctl` has no platform database behind it. Registered clusters and
//! platform users are declared in the same YAML file as the access
//! configuration:
//!
//! ```yaml
//! naming:
//!   dedicated_namespace: opshub-auth
//! ledger:
//!   path: /var/lib/opshub/access.db
//! clusters:
//!   - id: 1
//!     name: prod
//!     kubeconfig: admin/prod.kubeconfig
//! users:
//!   - id: 7
//!     username: alice
//!     real_name: Alice Liddell
//!     roles: [developer]
//! ```
//!
//! Relative kubeconfig paths are resolved against the file's directory.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use opshub_access::{
    ClusterRegistry, CollaboratorError, IdentityStore, ManagedCluster, PlatformUser,
};
use opshub_common::config::ConfigError;
use opshub_common::AccessConfig;
use serde::Deserialize;

use crate::{Error, Result};

/// Default config file name when neither flag nor environment names one
pub const DEFAULT_CONFIG_FILE: &str = "opshubctl.yaml";

/// A registered cluster
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClusterSpec {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub api_endpoint: Option<String>,
    /// Admin kubeconfig file
    pub kubeconfig: PathBuf,
}

/// A platform user
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserSpec {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub real_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Everything `opshubctl` reads from its config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub access: AccessConfig,
    pub clusters: Vec<ClusterSpec>,
    pub users: Vec<UserSpec>,
}

impl CliConfig {
    /// Parse YAML text; relative kubeconfig paths are resolved against `base`
    pub fn from_yaml(input: &str, base: &Path) -> Result<Self> {
        let mut config: CliConfig = if input.trim().is_empty() {
            CliConfig::default()
        } else {
            serde_yaml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.access.validate()?;

        let mut cluster_ids = HashSet::new();
        for cluster in &mut config.clusters {
            if !cluster_ids.insert(cluster.id) {
                return Err(Error::validation(format!("duplicate cluster id {}", cluster.id)));
            }
            if cluster.kubeconfig.is_relative() {
                cluster.kubeconfig = base.join(&cluster.kubeconfig);
            }
        }

        let mut user_ids = HashSet::new();
        let mut usernames = HashSet::new();
        for user in &config.users {
            if !user_ids.insert(user.id) {
                return Err(Error::validation(format!("duplicate user id {}", user.id)));
            }
            if !usernames.insert(user.username.as_str()) {
                return Err(Error::validation(format!(
                    "duplicate username {:?}",
                    user.username
                )));
            }
        }
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml(&content, base)
    }
}

/// [`ClusterRegistry`] and [`IdentityStore`] over a [`CliConfig`]
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    clusters: HashMap<u64, ClusterSpec>,
    users: Vec<UserSpec>,
}

impl StaticDirectory {
    pub fn new(clusters: Vec<ClusterSpec>, users: Vec<UserSpec>) -> Self {
        Self {
            clusters: clusters.into_iter().map(|c| (c.id, c)).collect(),
            users,
        }
    }

    fn to_platform_user(user: &UserSpec) -> PlatformUser {
        PlatformUser {
            id: user.id,
            username: user.username.clone(),
            real_name: user.real_name.clone(),
        }
    }
}

#[async_trait]
impl ClusterRegistry for StaticDirectory {
    async fn cluster(&self, cluster_id: u64) -> std::result::Result<Option<ManagedCluster>, CollaboratorError> {
        Ok(self.clusters.get(&cluster_id).map(|c| ManagedCluster {
            id: c.id,
            name: c.name.clone(),
            api_endpoint: c.api_endpoint.clone(),
        }))
    }

    async fn admin_credential(&self, cluster_id: u64) -> std::result::Result<String, CollaboratorError> {
        let cluster = self
            .clusters
            .get(&cluster_id)
            .ok_or_else(|| CollaboratorError::new(format!("cluster {} not found", cluster_id)))?;
        tokio::fs::read_to_string(&cluster.kubeconfig)
            .await
            .map_err(|e| {
                CollaboratorError::new(format!(
                    "failed to read {}: {}",
                    cluster.kubeconfig.display(),
                    e
                ))
            })
    }
}

#[async_trait]
impl IdentityStore for StaticDirectory {
    async fn user(&self, user_id: u64) -> std::result::Result<Option<PlatformUser>, CollaboratorError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(Self::to_platform_user))
    }

    async fn user_by_username(
        &self,
        username: &str,
    ) -> std::result::Result<Option<PlatformUser>, CollaboratorError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.username == username)
            .map(Self::to_platform_user))
    }

    async fn role_codes(&self, user_id: u64) -> std::result::Result<Vec<String>, CollaboratorError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.roles.clone())
            .unwrap_or_default())
    }
}
