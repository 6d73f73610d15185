use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{BindingKey, LedgerError, RoleBindingRecord, ServiceIdentityRecord};

/// Result alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Storage for identity and binding records
///
/// Implementations must be safe to call concurrently for unrelated
/// (cluster, user) pairs.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Identity record for (cluster, user), active or not
    async fn identity(&self, cluster_id: u64, user_id: u64)
        -> LedgerResult<Option<ServiceIdentityRecord>>;

    /// Insert or refresh the identity record for (cluster, user).
    ///
    /// An existing row keeps its `created_at`; name, namespace and
    /// `created_by` are refreshed, the row becomes active and `revoked_at`
    /// is cleared. Returns the stored row.
    async fn upsert_identity(
        &self,
        record: ServiceIdentityRecord,
    ) -> LedgerResult<ServiceIdentityRecord>;

    /// Mark the identity inactive. Returns false if no row exists.
    async fn deactivate_identity(
        &self,
        cluster_id: u64,
        user_id: u64,
        revoked_at: DateTime<Utc>,
    ) -> LedgerResult<bool>;

    /// Remove the identity row. Returns false if no row existed.
    async fn delete_identity(&self, cluster_id: u64, user_id: u64) -> LedgerResult<bool>;

    /// All identity rows for a cluster, ordered by user id
    async fn identities_for_cluster(&self, cluster_id: u64)
        -> LedgerResult<Vec<ServiceIdentityRecord>>;

    /// Remove every identity row for a cluster
    async fn delete_identities_for_cluster(&self, cluster_id: u64) -> LedgerResult<usize>;

    /// Binding row for `key`
    async fn binding(&self, key: &BindingKey) -> LedgerResult<Option<RoleBindingRecord>>;

    /// Insert a binding row; `LedgerError::Conflict` if the key exists
    async fn insert_binding(&self, record: RoleBindingRecord) -> LedgerResult<()>;

    /// Remove a binding row. Returns false if no row existed.
    async fn delete_binding(&self, key: &BindingKey) -> LedgerResult<bool>;

    /// Binding rows of one user on one cluster, newest first
    async fn bindings_for_user(&self, cluster_id: u64, user_id: u64)
        -> LedgerResult<Vec<RoleBindingRecord>>;

    /// Binding rows referencing one permission set in one scope, oldest first
    async fn bindings_for_permission_set(
        &self,
        cluster_id: u64,
        permission_set: &str,
        namespace: &str,
    ) -> LedgerResult<Vec<RoleBindingRecord>>;

    /// Every binding row on a cluster, newest first
    async fn bindings_for_cluster(&self, cluster_id: u64) -> LedgerResult<Vec<RoleBindingRecord>>;

    /// Remove every binding row of one user on one cluster
    async fn delete_bindings_for_user(&self, cluster_id: u64, user_id: u64) -> LedgerResult<usize>;

    /// Remove every binding row on a cluster
    async fn delete_bindings_for_cluster(&self, cluster_id: u64) -> LedgerResult<usize>;
}
