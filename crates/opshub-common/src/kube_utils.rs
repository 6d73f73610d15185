//! Kubernetes client construction and credential document helpers
//!
//! Credential documents (kubeconfigs) arrive as text: the decrypted admin
//! credential from the cluster registry, the `kubeconfig` key of the public
//! `cluster-info` config map, and bundles minted for service identities.

use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::Value;
use thiserror::Error;

use crate::yaml::parse_yaml;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors turning a credential document into a client
#[derive(Debug, Error)]
pub enum ClientBuildError {
    /// The document is not a parseable kubeconfig
    #[error("failed to parse kubeconfig: {0}")]
    Parse(String),

    /// The kubeconfig parsed but does not describe a usable cluster
    #[error("failed to load kubeconfig: {0}")]
    Load(String),

    /// The HTTP client could not be built
    #[error("failed to create client: {0}")]
    Client(String),
}

/// Build a kube client from a kubeconfig document with custom timeouts
pub async fn client_from_kubeconfig(
    document: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, ClientBuildError> {
    let kubeconfig =
        Kubeconfig::from_yaml(document).map_err(|e| ClientBuildError::Parse(e.to_string()))?;
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| ClientBuildError::Load(e.to_string()))?;
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config).map_err(|e| ClientBuildError::Client(e.to_string()))
}

fn first_cluster_field(document: &str, field: &str) -> Option<String> {
    let config = parse_yaml(document).ok()?;
    config
        .get("clusters")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|entry| entry.get("cluster"))
        .filter_map(|cluster| cluster.get(field))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Extract the base64 `certificate-authority-data` of the first cluster that has one
pub fn extract_ca_data(document: &str) -> Option<String> {
    first_cluster_field(document, "certificate-authority-data")
}

/// Extract the API server URL of the first cluster that has one
pub fn extract_server(document: &str) -> Option<String> {
    first_cluster_field(document, "server")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://10.0.0.1:6443
    certificate-authority-data: QURNSU4tQ0E=
contexts:
- name: admin@prod
  context:
    cluster: prod
    user: admin
current-context: admin@prod
users:
- name: admin
  user:
    token: secret
"#;

    #[test]
    fn test_extract_fields() {
        assert_eq!(
            extract_ca_data(ADMIN_KUBECONFIG).as_deref(),
            Some("QURNSU4tQ0E=")
        );
        assert_eq!(
            extract_server(ADMIN_KUBECONFIG).as_deref(),
            Some("https://10.0.0.1:6443")
        );
    }

    #[test]
    fn test_extract_skips_clusters_without_field() {
        let doc = r#"
clusters:
- name: a
  cluster:
    server: https://a
- name: b
  cluster:
    server: https://b
    certificate-authority-data: "  Qg==  "
"#;
        assert_eq!(extract_ca_data(doc).as_deref(), Some("Qg=="));
        assert_eq!(extract_server(doc).as_deref(), Some("https://a"));
    }

    #[test]
    fn test_extract_from_garbage_is_none() {
        assert_eq!(extract_ca_data("not: [valid"), None);
        assert_eq!(extract_server("just a string"), None);
        assert_eq!(extract_ca_data(""), None);
    }

    #[test]
    fn test_extract_from_json_document() {
        let doc = r#"{"clusters":[{"name":"x","cluster":{"server":"https://x:443"}}]}"#;
        assert_eq!(extract_server(doc).as_deref(), Some("https://x:443"));
        assert_eq!(extract_ca_data(doc), None);
    }

    #[tokio::test]
    async fn test_client_from_invalid_document() {
        let err = client_from_kubeconfig("{{{", DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
            .await
            .err().expect("expected error");
        assert!(matches!(err, ClientBuildError::Parse(_)));
    }

    #[tokio::test]
    async fn test_client_from_kubeconfig_without_context() {
        let doc = "apiVersion: v1\nkind: Config\nclusters: []\nusers: []\ncontexts: []\n";
        let err = client_from_kubeconfig(doc, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
            .await
            .err().expect("expected error");
        assert!(matches!(err, ClientBuildError::Load(_)));
    }
}
