//! Configuration for the access subsystem
//!
//! Every field has a default matching the names used on existing clusters,
//! so an empty file (or no file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::is_dns_subdomain;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "OPSHUB_ACCESS_CONFIG";

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config {path}: {message}")]
    Read {
        /// Path that was read
        path: String,
        /// Underlying I/O message
        message: String,
    },

    /// The file is not valid YAML for [`AccessConfig`]
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A field has an unusable value
    #[error("invalid config field {field}: {message}")]
    Invalid {
        /// Dotted field path
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Namespaces and object name prefixes
    pub naming: NamingConfig,
    /// Token issuance settings
    pub token: TokenConfig,
    /// Where to look for CA material
    pub ca: CaConfig,
    /// Role code that selects the admin path
    pub admin_role: AdminRole,
    /// Kube client timeouts
    pub client: ClientConfig,
    /// Ledger storage
    pub ledger: LedgerConfig,
    /// Logging
    pub log: LogConfig,
}

/// Role code granting the admin bypass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminRole(pub String);

impl Default for AdminRole {
    fn default() -> Self {
        Self("admin".to_string())
    }
}

impl AdminRole {
    /// Borrow the role code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Namespaces and name derivation for platform-managed objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Namespace holding service identities
    pub dedicated_namespace: String,
    /// Namespace used before the dedicated one existed
    pub legacy_namespace: String,
    /// Prefix prepended to usernames to form service identity names
    pub identity_prefix: String,
    /// Prefix prepended to binding object names
    pub binding_prefix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            dedicated_namespace: "opshub-auth".to_string(),
            legacy_namespace: "default".to_string(),
            identity_prefix: "opshub-".to_string(),
            binding_prefix: "opshub-".to_string(),
        }
    }
}

impl NamingConfig {
    /// Service identity name for a platform username
    pub fn service_identity_name(&self, username: &str) -> String {
        format!("{}{}", self.identity_prefix, username)
    }

    /// Binding object name for a permission set granted to an identity
    pub fn binding_name(&self, permission_set: &str, service_identity: &str) -> String {
        format!("{}{}-{}", self.binding_prefix, permission_set, service_identity)
    }

    /// Recover the username from a service identity name, if it carries our prefix
    pub fn username_from_identity<'a>(&self, service_identity: &'a str) -> Option<&'a str> {
        service_identity
            .strip_prefix(self.identity_prefix.as_str())
            .filter(|rest| !rest.is_empty())
    }

    /// Namespaces searched for an identity, authoritative one first
    pub fn identity_namespaces(&self) -> [&str; 2] {
        [
            self.dedicated_namespace.as_str(),
            self.legacy_namespace.as_str(),
        ]
    }
}

/// Token issuance settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Requested token lifetime
    pub expiration_seconds: i64,
    /// Suffix appended to the identity name to match its token secret
    pub secret_suffix: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            expiration_seconds: 86_400 * 365,
            secret_suffix: "-token".to_string(),
        }
    }
}

impl TokenConfig {
    /// Name prefix of the auto-generated token secret for an identity
    pub fn secret_prefix(&self, service_identity: &str) -> String {
        format!("{}{}", service_identity, self.secret_suffix)
    }
}

/// Locations searched for cluster CA material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaConfig {
    /// Namespace with system service account secrets
    pub system_namespace: String,
    /// Name prefixes of system secrets carrying `ca.crt`
    pub system_secret_prefixes: Vec<String>,
    /// Namespace with the public cluster-info config map
    pub public_namespace: String,
    /// Name of the public config map
    pub public_config_map: String,
    /// Key of the embedded credential document inside the config map
    pub public_config_key: String,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            system_namespace: "kube-system".to_string(),
            system_secret_prefixes: vec![
                "default-token-".to_string(),
                "coredns-token-".to_string(),
            ],
            public_namespace: "kube-public".to_string(),
            public_config_map: "cluster-info".to_string(),
            public_config_key: "kubeconfig".to_string(),
        }
    }
}

/// Kube client timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per-request read timeout in seconds
    pub read_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: crate::kube_utils::DEFAULT_CONNECT_TIMEOUT.as_secs(),
            read_timeout_secs: crate::kube_utils::DEFAULT_READ_TIMEOUT.as_secs(),
        }
    }
}

impl ClientConfig {
    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read timeout as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

/// Ledger storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("opshub-access.db"),
        }
    }
}

/// Logging output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl AccessConfig {
    /// Parse configuration from YAML text
    pub fn from_yaml(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load and validate configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_yaml(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would produce unusable object names
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names: [(&'static str, &str); 8] = [
            ("naming.dedicated_namespace", &self.naming.dedicated_namespace),
            ("naming.legacy_namespace", &self.naming.legacy_namespace),
            ("naming.identity_prefix", &self.naming.identity_prefix),
            ("naming.binding_prefix", &self.naming.binding_prefix),
            ("token.secret_suffix", &self.token.secret_suffix),
            ("ca.system_namespace", &self.ca.system_namespace),
            ("ca.public_namespace", &self.ca.public_namespace),
            ("admin_role", self.admin_role.as_str()),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    message: "must not be empty".to_string(),
                });
            }
        }

        for (field, ns) in [
            ("naming.dedicated_namespace", &self.naming.dedicated_namespace),
            ("naming.legacy_namespace", &self.naming.legacy_namespace),
        ] {
            if !is_dns_subdomain(ns) || ns.contains('.') {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("{:?} is not a valid namespace name", ns),
                });
            }
        }

        if self.naming.dedicated_namespace == self.naming.legacy_namespace {
            return Err(ConfigError::Invalid {
                field: "naming.legacy_namespace",
                message: "must differ from the dedicated namespace".to_string(),
            });
        }

        if self.token.expiration_seconds <= 0 {
            return Err(ConfigError::Invalid {
                field: "token.expiration_seconds",
                message: "must be positive".to_string(),
            });
        }

        if self.client.connect_timeout_secs == 0 || self.client.read_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "client",
                message: "timeouts must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Resolve the configuration path from an explicit flag or the environment
    pub fn path_from_env(explicit: Option<PathBuf>) -> Option<PathBuf> {
        explicit.or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
    }
}
