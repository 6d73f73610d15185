//! Common types for OpsHub cluster access: configuration, naming, the kube
//! boundary error taxonomy, and small Kubernetes utilities.

#![deny(missing_docs)]

pub mod api_error;
pub mod config;
pub mod kube_utils;
pub mod telemetry;
pub mod yaml;

pub use api_error::{ApiError, ApiErrorKind, ApiResult};
pub use config::AccessConfig;

/// Label key marking objects this platform created
pub const LABEL_MANAGED_BY: &str = "opshub.ydcloud-dy.com/managed-by";

/// Label value for [`LABEL_MANAGED_BY`]
pub const LABEL_MANAGED_BY_OPSHUB: &str = "opshub";

/// Label key recording the platform username on a service identity
pub const LABEL_USERNAME: &str = "opshub.ydcloud-dy.com/username";

/// Label key recording the purpose of the dedicated namespace
pub const LABEL_PURPOSE: &str = "opshub.ydcloud-dy.com/purpose";

/// Label key recording the namespace type of the dedicated namespace
pub const LABEL_NAMESPACE_TYPE: &str = "opshub.ydcloud-dy.com/namespace-type";

/// Annotation key carrying a human readable description
pub const ANNOTATION_DESCRIPTION: &str = "description";

/// RBAC API group used in role references
pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Subject kind for service accounts
pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";

/// Secret key holding a service account token
pub const SECRET_TOKEN_KEY: &str = "token";

/// Secret key holding the cluster CA bundle
pub const SECRET_CA_KEY: &str = "ca.crt";

/// Check whether `name` is a valid RFC 1123 subdomain (the rule Kubernetes
/// applies to service account and binding names).
pub fn is_dns_subdomain(name: &str) -> bool {
    if name.is_empty() || name.len() > 253 {
        return false;
    }
    name.split('.').all(|label| {
        !label.is_empty()
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}
