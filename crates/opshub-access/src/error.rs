//! Error types for cluster access operations
//!
//! Variants carry the identifiers of the request they belong to so a log
//! line or an API response can say exactly which (cluster, user) failed.

use std::fmt;

use opshub_common::ApiError;
use opshub_ledger::LedgerError;
use thiserror::Error;

/// Context value used when an error has no better location
const UNKNOWN_CONTEXT: &str = "unknown";

/// Credential material the issuer could not obtain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMaterial {
    /// Bearer token for the service identity
    Token,
    /// Cluster CA bundle
    CaData,
    /// API server URL
    Endpoint,
}

impl fmt::Display for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Token => "token",
            Self::CaData => "CA data",
            Self::Endpoint => "API endpoint",
        })
    }
}

/// Why a guarded operation stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The request was cancelled
    Cancelled,
    /// The request deadline passed
    DeadlineExceeded,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline exceeded",
        })
    }
}

fn scope_label(namespace: &str) -> String {
    if namespace.is_empty() {
        "cluster scope".to_string()
    } else {
        format!("namespace {}", namespace)
    }
}

/// Main error type for access operations
#[derive(Debug, Error)]
pub enum Error {
    /// The user has no active service identity on the cluster
    #[error("user {user_id} has no access to cluster {cluster_id}: request access first")]
    NotGranted {
        /// Managed cluster id
        cluster_id: u64,
        /// Platform user id
        user_id: u64,
    },

    /// An identical binding is already recorded
    #[error(
        "user {user_id} is already bound to {permission_set} in {} on cluster {cluster_id}",
        scope_label(.namespace)
    )]
    AlreadyBound {
        /// Managed cluster id
        cluster_id: u64,
        /// Platform user id
        user_id: u64,
        /// Permission set name
        permission_set: String,
        /// Binding namespace, empty for cluster scope
        namespace: String,
    },

    /// No binding is recorded for the given key
    #[error(
        "user {user_id} is not bound to {permission_set} in {} on cluster {cluster_id}",
        scope_label(.namespace)
    )]
    NotBound {
        /// Managed cluster id
        cluster_id: u64,
        /// Platform user id
        user_id: u64,
        /// Permission set name
        permission_set: String,
        /// Binding namespace, empty for cluster scope
        namespace: String,
    },

    /// A managed cluster call failed
    #[error("cluster call {operation} failed: {source}")]
    UpstreamUnavailable {
        /// The call that failed (e.g. "create service account")
        operation: String,
        /// Classified cause
        #[source]
        source: ApiError,
    },

    /// Every strategy for obtaining some credential material failed
    #[error("no {material} available after trying: {}", .attempts.join("; "))]
    CredentialMaterialMissing {
        /// What was being looked for
        material: CredentialMaterial,
        /// One entry per strategy tried, with the reason it missed
        attempts: Vec<String>,
    },

    /// A cluster change succeeded but recording it in the ledger failed
    #[error("ledger write for {operation} failed after the cluster change (compensated: {compensated}): {source}")]
    LedgerInconsistency {
        /// Operation whose ledger write failed
        operation: String,
        /// Whether the compensating cluster call succeeded
        compensated: bool,
        /// Ledger failure
        #[source]
        source: LedgerError,
    },

    /// Ledger read or write failure
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A guarded call stopped because the request ended
    #[error("{operation} aborted: {reason}")]
    Aborted {
        /// The call in flight
        operation: String,
        /// Cancellation or deadline
        reason: AbortReason,
    },

    /// The cluster registry does not know the cluster
    #[error("unknown cluster {cluster_id}")]
    UnknownCluster {
        /// Managed cluster id
        cluster_id: u64,
    },

    /// The identity store does not know the user
    #[error("unknown user {user}")]
    UnknownUser {
        /// User id or username as supplied
        user: String,
    },

    /// A collaborator (registry or identity store) failed
    #[error("{context} failed: {message}")]
    Collaborator {
        /// Which lookup failed
        context: String,
        /// Collaborator message
        message: String,
    },

    /// A credential document could not be turned into a client
    #[error("invalid credential for cluster {cluster_id}: {message}")]
    InvalidCredential {
        /// Managed cluster id
        cluster_id: u64,
        /// Parse or load failure
        message: String,
    },

    /// Request arguments are invalid
    #[error("validation error [{context}]: {message}")]
    Validation {
        /// What was being validated
        context: String,
        /// What is wrong
        message: String,
    },
}

impl Error {
    /// Wrap a failed cluster call
    pub fn upstream(operation: impl Into<String>, source: ApiError) -> Self {
        Self::UpstreamUnavailable {
            operation: operation.into(),
            source,
        }
    }

    /// Create a validation error without a specific context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            context: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a named argument
    pub fn validation_for(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Wrap a collaborator failure
    pub fn collaborator(context: impl Into<String>, msg: impl fmt::Display) -> Self {
        Self::Collaborator {
            context: context.into(),
            message: msg.to_string(),
        }
    }

    /// True for errors the caller can fix by changing the request
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::NotGranted { .. }
                | Self::AlreadyBound { .. }
                | Self::NotBound { .. }
                | Self::UnknownCluster { .. }
                | Self::UnknownUser { .. }
                | Self::Validation { .. }
        )
    }

    /// True if repeating the whole operation later may succeed.
    ///
    /// Nothing in this crate retries; this only informs callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamUnavailable { source, .. } => source.is_retryable(),
            Self::LedgerInconsistency { .. } | Self::Aborted { .. } | Self::Collaborator { .. } => {
                true
            }
            Self::Ledger(e) => !e.is_conflict(),
            _ => false,
        }
    }

    /// Cluster id carried by the error, if any
    pub fn cluster_id(&self) -> Option<u64> {
        match self {
            Self::NotGranted { cluster_id, .. }
            | Self::AlreadyBound { cluster_id, .. }
            | Self::NotBound { cluster_id, .. }
            | Self::UnknownCluster { cluster_id }
            | Self::InvalidCredential { cluster_id, .. } => Some(*cluster_id),
            _ => None,
        }
    }
}
