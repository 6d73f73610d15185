//! CA material acquisition

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::core::v1::Secret;
use opshub_common::config::AccessConfig;
use opshub_common::kube_utils::extract_ca_data;
use opshub_common::SECRET_CA_KEY;

use super::strategy::{first_success, Attempt};
use crate::cluster_api::ClusterApi;
use crate::error::{CredentialMaterial, Error};
use crate::scope::RequestScope;

/// Where CA data can come from, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CaSource {
    /// System service account secrets in the system namespace
    SystemSecrets,
    /// Any secret in any namespace carrying a CA bundle
    AnySecret,
    /// The public cluster-info config map
    PublicClusterInfo,
    /// The registered admin credential document
    AdminCredential,
}

pub(crate) const CA_SOURCES: [CaSource; 4] = [
    CaSource::SystemSecrets,
    CaSource::AnySecret,
    CaSource::PublicClusterInfo,
    CaSource::AdminCredential,
];

impl fmt::Display for CaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SystemSecrets => "system secrets",
            Self::AnySecret => "secrets in all namespaces",
            Self::PublicClusterInfo => "public cluster-info",
            Self::AdminCredential => "admin credential",
        })
    }
}

/// Obtain base64 CA data for the cluster
pub(crate) async fn acquire_ca_data(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    config: &AccessConfig,
    admin_credential: &str,
) -> Result<String, Error> {
    let (_, ca) = first_success(CredentialMaterial::CaData, &CA_SOURCES, |source| {
        attempt(scope, api, config, admin_credential, source)
    })
    .await?;
    Ok(ca)
}

fn secret_ca(secret: &Secret) -> Option<String> {
    let bytes = secret.data.as_ref()?.get(SECRET_CA_KEY)?;
    if bytes.0.is_empty() {
        return None;
    }
    Some(STANDARD.encode(&bytes.0))
}

async fn attempt(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    config: &AccessConfig,
    admin_credential: &str,
    source: CaSource,
) -> Result<Attempt, Error> {
    let ca = &config.ca;
    match source {
        CaSource::SystemSecrets => {
            let secrets = match scope
                .run("list secrets", api.list_secrets(&ca.system_namespace))
                .await?
            {
                Ok(secrets) => secrets,
                Err(e) => return Ok(Attempt::Missed(e.to_string())),
            };
            let found = secrets
                .iter()
                .filter(|s| {
                    s.metadata.name.as_deref().is_some_and(|name| {
                        ca.system_secret_prefixes
                            .iter()
                            .any(|prefix| name.starts_with(prefix.as_str()))
                    })
                })
                .find_map(secret_ca);
            Ok(Attempt::from_option(
                found,
                format!("no system secret with {} in {}", SECRET_CA_KEY, ca.system_namespace),
            ))
        }
        CaSource::AnySecret => {
            let secrets = match scope
                .run("list secrets", api.list_all_secrets())
                .await?
            {
                Ok(secrets) => secrets,
                Err(e) => return Ok(Attempt::Missed(e.to_string())),
            };
            Ok(Attempt::from_option(
                secrets.iter().find_map(secret_ca),
                format!("no secret with {}", SECRET_CA_KEY),
            ))
        }
        CaSource::PublicClusterInfo => {
            let config_map = match scope
                .run(
                    "get config map",
                    api.get_config_map(&ca.public_namespace, &ca.public_config_map),
                )
                .await?
            {
                Ok(Some(cm)) => cm,
                Ok(None) => {
                    return Ok(Attempt::Missed(format!(
                        "{}/{} not found",
                        ca.public_namespace, ca.public_config_map
                    )))
                }
                Err(e) => return Ok(Attempt::Missed(e.to_string())),
            };
            let found = config_map
                .data
                .as_ref()
                .and_then(|data| data.get(&ca.public_config_key))
                .and_then(|document| extract_ca_data(document));
            Ok(Attempt::from_option(
                found,
                format!("no CA field in {} key", ca.public_config_key),
            ))
        }
        CaSource::AdminCredential => Ok(Attempt::from_option(
            extract_ca_data(admin_credential),
            "no CA field",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{admin_kubeconfig, secret, FakeCluster};
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    const ADMIN_CA: &str = "QURNSU4tQ0E=";

    async fn acquire(cluster: &FakeCluster, admin: &str) -> Result<String, Error> {
        acquire_ca_data(&RequestScope::new(), cluster, &AccessConfig::default(), admin).await
    }

    #[tokio::test]
    async fn test_system_secret_preferred() {
        let cluster = FakeCluster::new();
        cluster.add_secret(secret("kube-system", "coredns-token-abcde", &[("ca.crt", b"CA-PEM")]));
        cluster.add_secret(secret("apps", "other", &[("ca.crt", b"OTHER")]));

        let ca = acquire(&cluster, &admin_kubeconfig(Some(ADMIN_CA))).await.unwrap();
        assert_eq!(ca, STANDARD.encode(b"CA-PEM"));
    }

    #[tokio::test]
    async fn test_unrelated_system_secret_skipped() {
        let cluster = FakeCluster::new();
        cluster.add_secret(secret("kube-system", "bootstrap-signer", &[("token", b"x")]));
        cluster.add_secret(secret("apps", "app-sa-token", &[("ca.crt", b"APP-CA")]));

        let ca = acquire(&cluster, &admin_kubeconfig(Some(ADMIN_CA))).await.unwrap();
        assert_eq!(ca, STANDARD.encode(b"APP-CA"));
    }

    #[tokio::test]
    async fn test_public_cluster_info() {
        let cluster = FakeCluster::new();
        cluster.add_config_map(ConfigMap {
            metadata: ObjectMeta {
                name: Some("cluster-info".to_string()),
                namespace: Some("kube-public".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "kubeconfig".to_string(),
                admin_kubeconfig(Some("UFVCTElDLUNB")),
            )])),
            ..Default::default()
        });

        let ca = acquire(&cluster, &admin_kubeconfig(Some(ADMIN_CA))).await.unwrap();
        assert_eq!(ca, "UFVCTElDLUNB");
    }

    #[tokio::test]
    async fn test_admin_credential_is_last_resort() {
        let cluster = FakeCluster::new();
        cluster.fail_secret_listing();

        let ca = acquire(&cluster, &admin_kubeconfig(Some(ADMIN_CA))).await.unwrap();
        assert_eq!(ca, ADMIN_CA);
    }

    #[tokio::test]
    async fn test_all_sources_exhausted() {
        let cluster = FakeCluster::new();
        let err = acquire(&cluster, &admin_kubeconfig(None)).await.unwrap_err();
        match err {
            Error::CredentialMaterialMissing { material, attempts } => {
                assert_eq!(material, CredentialMaterial::CaData);
                assert_eq!(attempts.len(), 4);
                assert_eq!(attempts[3], "admin credential: no CA field");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
