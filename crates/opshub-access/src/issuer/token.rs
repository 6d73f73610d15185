//! Token acquisition for an existing service identity

use std::fmt;

use k8s_openapi::api::core::v1::Secret;
use opshub_common::config::AccessConfig;
use opshub_common::SECRET_TOKEN_KEY;

use super::strategy::{first_success, Attempt};
use crate::cluster_api::ClusterApi;
use crate::error::{CredentialMaterial, Error};
use crate::scope::RequestScope;

/// Where a token can come from, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenSource {
    /// TokenRequest against the identity in the dedicated namespace
    DedicatedRequest,
    /// TokenRequest against the identity in the legacy namespace
    LegacyRequest,
    /// Auto-generated token secret next to the identity
    TokenSecret,
}

pub(crate) const TOKEN_SOURCES: [TokenSource; 3] = [
    TokenSource::DedicatedRequest,
    TokenSource::LegacyRequest,
    TokenSource::TokenSecret,
];

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DedicatedRequest => "token request (dedicated namespace)",
            Self::LegacyRequest => "token request (legacy namespace)",
            Self::TokenSecret => "token secret",
        })
    }
}

/// Obtain a bearer token for `service_identity`
pub(crate) async fn acquire_token(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    config: &AccessConfig,
    service_identity: &str,
) -> Result<String, Error> {
    let (_, token) = first_success(CredentialMaterial::Token, &TOKEN_SOURCES, |source| {
        attempt(scope, api, config, service_identity, source)
    })
    .await?;
    Ok(token)
}

async fn attempt(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    config: &AccessConfig,
    service_identity: &str,
    source: TokenSource,
) -> Result<Attempt, Error> {
    let naming = &config.naming;
    match source {
        TokenSource::DedicatedRequest => {
            request(scope, api, config, &naming.dedicated_namespace, service_identity).await
        }
        TokenSource::LegacyRequest => {
            request(scope, api, config, &naming.legacy_namespace, service_identity).await
        }
        TokenSource::TokenSecret => from_secret(scope, api, config, service_identity).await,
    }
}

async fn request(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    config: &AccessConfig,
    namespace: &str,
    service_identity: &str,
) -> Result<Attempt, Error> {
    let response = scope
        .run(
            "request token",
            api.request_token(namespace, service_identity, config.token.expiration_seconds),
        )
        .await?;
    Ok(match response {
        Ok(token) => Attempt::from_option(Some(token), "empty token"),
        Err(e) => Attempt::Missed(e.to_string()),
    })
}

/// Find the namespace currently holding the identity, dedicated first
async fn locate_identity(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    config: &AccessConfig,
    service_identity: &str,
) -> Result<Option<String>, Error> {
    for namespace in config.naming.identity_namespaces() {
        let found = scope
            .run(
                "get service account",
                api.get_service_account(namespace, service_identity),
            )
            .await?;
        if let Ok(Some(_)) = found {
            return Ok(Some(namespace.to_string()));
        }
    }
    Ok(None)
}

fn secret_token(secret: &Secret) -> Option<String> {
    let bytes = secret.data.as_ref()?.get(SECRET_TOKEN_KEY)?;
    let token = String::from_utf8(bytes.0.clone()).ok()?;
    Some(token.trim().to_string()).filter(|t| !t.is_empty())
}

async fn from_secret(
    scope: &RequestScope,
    api: &dyn ClusterApi,
    config: &AccessConfig,
    service_identity: &str,
) -> Result<Attempt, Error> {
    let Some(namespace) = locate_identity(scope, api, config, service_identity).await? else {
        return Ok(Attempt::Missed(format!(
            "service account {} not found",
            service_identity
        )));
    };

    let secrets = match scope
        .run("list secrets", api.list_secrets(&namespace))
        .await?
    {
        Ok(secrets) => secrets,
        Err(e) => return Ok(Attempt::Missed(e.to_string())),
    };

    let prefix = config.token.secret_prefix(service_identity);
    let token = secrets
        .iter()
        .filter(|s| {
            s.metadata
                .name
                .as_deref()
                .is_some_and(|name| name.starts_with(&prefix))
        })
        .find_map(secret_token);

    Ok(Attempt::from_option(
        token,
        format!("no secret named {}* with a token in {}", prefix, namespace),
    ))
}
