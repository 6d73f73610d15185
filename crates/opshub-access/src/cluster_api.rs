//! Managed cluster boundary
//!
//! [`ClusterApi`] lists exactly the calls the access subsystem makes against
//! a managed cluster. Every failure is classified into an [`ApiError`] here,
//! once, so callers match on kinds instead of status codes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use opshub_common::config::ClientConfig;
use opshub_common::kube_utils::{client_from_kubeconfig, ClientBuildError};
use opshub_common::{ApiError, ApiResult};

#[cfg(test)]
use mockall::automock;

/// Shared handle to one cluster under one identity
pub type ClusterHandle = Arc<dyn ClusterApi>;

/// Calls made against a managed cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Get a namespace, `None` if absent
    async fn get_namespace(&self, name: &str) -> ApiResult<Option<Namespace>>;

    /// Create a namespace
    async fn create_namespace(&self, namespace: &Namespace) -> ApiResult<()>;

    /// Get a service account, `None` if absent
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> ApiResult<Option<ServiceAccount>>;

    /// Create a service account in `namespace`
    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> ApiResult<()>;

    /// Delete a service account
    async fn delete_service_account(&self, namespace: &str, name: &str) -> ApiResult<()>;

    /// List service accounts in one namespace
    async fn list_service_accounts(&self, namespace: &str) -> ApiResult<Vec<ServiceAccount>>;

    /// Issue a token for a service account via the TokenRequest API
    async fn request_token(
        &self,
        namespace: &str,
        name: &str,
        expiration_seconds: i64,
    ) -> ApiResult<String>;

    /// List secrets in one namespace
    async fn list_secrets(&self, namespace: &str) -> ApiResult<Vec<Secret>>;

    /// List secrets across all namespaces
    async fn list_all_secrets(&self) -> ApiResult<Vec<Secret>>;

    /// Get a config map, `None` if absent
    async fn get_config_map(&self, namespace: &str, name: &str) -> ApiResult<Option<ConfigMap>>;

    /// Create a cluster role binding
    async fn create_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> ApiResult<()>;

    /// Delete a cluster role binding
    async fn delete_cluster_role_binding(&self, name: &str) -> ApiResult<()>;

    /// List every cluster role binding
    async fn list_cluster_role_bindings(&self) -> ApiResult<Vec<ClusterRoleBinding>>;

    /// Create a role binding in `namespace`
    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> ApiResult<()>;

    /// Delete a role binding
    async fn delete_role_binding(&self, namespace: &str, name: &str) -> ApiResult<()>;

    /// List role bindings across all namespaces
    async fn list_all_role_bindings(&self) -> ApiResult<Vec<RoleBinding>>;
}

/// [`ClusterApi`] backed by a kube client
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Wrap a client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_namespace(&self, name: &str) -> ApiResult<Option<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> ApiResult<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.create(&PostParams::default(), namespace).await?;
        Ok(())
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> ApiResult<Option<ServiceAccount>> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        service_account: &ServiceAccount,
    ) -> ApiResult<()> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), service_account).await?;
        Ok(())
    }

    async fn delete_service_account(&self, namespace: &str, name: &str) -> ApiResult<()> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_service_accounts(&self, namespace: &str) -> ApiResult<Vec<ServiceAccount>> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn request_token(
        &self,
        namespace: &str,
        name: &str,
        expiration_seconds: i64,
    ) -> ApiResult<String> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let request = TokenRequest {
            spec: TokenRequestSpec {
                audiences: Vec::new(),
                expiration_seconds: Some(expiration_seconds),
                ..Default::default()
            },
            ..Default::default()
        };
        let response = api
            .create_token_request(name, &PostParams::default(), &request)
            .await?;
        response
            .status
            .map(|status| status.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                ApiError::other(format!(
                    "token request for {}/{} returned no token",
                    namespace, name
                ))
            })
    }

    async fn list_secrets(&self, namespace: &str) -> ApiResult<Vec<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_all_secrets(&self) -> ApiResult<Vec<Secret>> {
        let api: Api<Secret> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> ApiResult<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_cluster_role_binding(&self, binding: &ClusterRoleBinding) -> ApiResult<()> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        api.create(&PostParams::default(), binding).await?;
        Ok(())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> ApiResult<()> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_cluster_role_bindings(&self) -> ApiResult<Vec<ClusterRoleBinding>> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn create_role_binding(&self, namespace: &str, binding: &RoleBinding) -> ApiResult<()> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), binding).await?;
        Ok(())
    }

    async fn delete_role_binding(&self, namespace: &str, name: &str) -> ApiResult<()> {
        let api: Api<RoleBinding> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_all_role_bindings(&self) -> ApiResult<Vec<RoleBinding>> {
        let api: Api<RoleBinding> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

/// Turns a credential document into a live cluster handle
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Build a handle authenticated by `credential` (a kubeconfig document)
    async fn connect(&self, credential: &str) -> Result<ClusterHandle, ClientBuildError>;
}

/// [`ClusterConnector`] producing [`KubeClusterApi`] handles
#[derive(Debug, Clone)]
pub struct KubeConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl KubeConnector {
    /// A connector using the configured timeouts
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }
}

impl Default for KubeConnector {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, credential: &str) -> Result<ClusterHandle, ClientBuildError> {
        let client =
            client_from_kubeconfig(credential, self.connect_timeout, self.read_timeout).await?;
        Ok(Arc::new(KubeClusterApi::new(client)))
    }
}
