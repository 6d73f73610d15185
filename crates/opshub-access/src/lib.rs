//! Per-user Kubernetes access for OpsHub
//!
//! Platform users reach managed clusters through their own service
//! identities rather than the cluster's admin credential. This crate issues
//! those identities and their credentials, caches live connections, binds
//! users to permission sets and revokes access again.
//!
//! [`AccessService`] is the entry point. The managed cluster is reached only
//! through [`ClusterApi`]; platform users and registered clusters come from
//! the [`IdentityStore`] and [`ClusterRegistry`] collaborators.

#![deny(missing_docs)]

pub mod bindings;
pub mod cluster_api;
pub mod collaborators;
pub mod error;
pub mod issuer;
mod objects;
pub mod resolver;
pub mod revocation;
pub mod scope;
pub mod service;

#[cfg(test)]
mod testing;

pub use bindings::{BindRequest, BoundUser, CredentialIdentity, RoleBindingManager, UserBinding};
pub use cluster_api::{ClusterApi, ClusterConnector, ClusterHandle, KubeClusterApi, KubeConnector};
pub use collaborators::{
    ClusterRegistry, CollaboratorError, IdentityStore, ManagedCluster, PlatformUser,
};
pub use error::{AbortReason, CredentialMaterial, Error};
pub use issuer::{CredentialIssuer, IssuedCredential, PortableCredential, ServiceIdentity};
pub use resolver::{
    AdminSession, CacheKey, ConnectionCache, ConnectionResolver, Generation, IdentitySelector,
};
pub use revocation::{FullRevocationReport, RevocationEngine, RevocationReport};
pub use scope::RequestScope;
pub use service::{AccessService, GrantedCredential, PurgeReport};

/// Result type for access operations
pub type Result<T, E = Error> = std::result::Result<T, E>;
