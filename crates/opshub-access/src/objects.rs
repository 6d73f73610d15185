//! Kubernetes objects created on managed clusters

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use opshub_common::config::NamingConfig;
use opshub_common::{
    ANNOTATION_DESCRIPTION, LABEL_MANAGED_BY, LABEL_MANAGED_BY_OPSHUB, LABEL_NAMESPACE_TYPE,
    LABEL_PURPOSE, LABEL_USERNAME, RBAC_API_GROUP, SERVICE_ACCOUNT_KIND,
};
use opshub_ledger::PermissionSetKind;

fn managed_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_OPSHUB.to_string(),
    )])
}

/// The dedicated namespace holding service identities
pub(crate) fn dedicated_namespace(naming: &NamingConfig) -> Namespace {
    let mut labels = managed_labels();
    labels.insert("name".to_string(), naming.dedicated_namespace.clone());
    labels.insert(LABEL_PURPOSE.to_string(), "authentication".to_string());
    labels.insert(LABEL_NAMESPACE_TYPE.to_string(), "system".to_string());

    Namespace {
        metadata: ObjectMeta {
            name: Some(naming.dedicated_namespace.clone()),
            labels: Some(labels),
            annotations: Some(BTreeMap::from([(
                ANNOTATION_DESCRIPTION.to_string(),
                "Service accounts issued to OpsHub platform users".to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Service identity for one platform user
pub(crate) fn service_account(name: &str, namespace: &str, username: &str) -> ServiceAccount {
    let mut labels = managed_labels();
    labels.insert(LABEL_USERNAME.to_string(), username.to_string());

    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn subject(service_identity: &str, namespace: &str) -> Subject {
    Subject {
        kind: SERVICE_ACCOUNT_KIND.to_string(),
        name: service_identity.to_string(),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

fn role_ref(kind: PermissionSetKind, permission_set: &str) -> RoleRef {
    RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: kind.as_str().to_string(),
        name: permission_set.to_string(),
    }
}

/// Cluster-scoped binding of a cluster role to a service identity
pub(crate) fn cluster_role_binding(
    naming: &NamingConfig,
    permission_set: &str,
    service_identity: &str,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(naming.binding_name(permission_set, service_identity)),
            labels: Some(managed_labels()),
            ..Default::default()
        },
        role_ref: role_ref(PermissionSetKind::ClusterRole, permission_set),
        subjects: Some(vec![subject(
            service_identity,
            &naming.dedicated_namespace,
        )]),
    }
}

/// Namespace-scoped binding of a role or cluster role to a service identity
pub(crate) fn role_binding(
    naming: &NamingConfig,
    permission_set: &str,
    kind: PermissionSetKind,
    namespace: &str,
    service_identity: &str,
) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(naming.binding_name(permission_set, service_identity)),
            namespace: Some(namespace.to_string()),
            labels: Some(managed_labels()),
            ..Default::default()
        },
        role_ref: role_ref(kind, permission_set),
        subjects: Some(vec![subject(
            service_identity,
            &naming.dedicated_namespace,
        )]),
    }
}

/// Whether any subject is the named service account, in any namespace
pub(crate) fn names_service_account(subjects: Option<&[Subject]>, service_identity: &str) -> bool {
    subjects.unwrap_or_default().iter().any(|s| {
        s.kind == SERVICE_ACCOUNT_KIND && s.name == service_identity
    })
}
