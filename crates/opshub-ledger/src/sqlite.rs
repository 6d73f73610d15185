//! SQLite-backed ledger

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::store::{Ledger, LedgerResult};
use crate::{BindingKey, LedgerError, PermissionSetKind, RoleBindingRecord, ServiceIdentityRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS service_identities (
    cluster_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    service_identity TEXT NOT NULL,
    namespace TEXT NOT NULL,
    active INTEGER NOT NULL,
    created_by INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    revoked_at INTEGER,
    PRIMARY KEY (cluster_id, user_id)
);
CREATE TABLE IF NOT EXISTS role_bindings (
    cluster_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    permission_set TEXT NOT NULL,
    namespace TEXT NOT NULL,
    kind TEXT NOT NULL,
    bound_by INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (cluster_id, user_id, permission_set, namespace)
);
CREATE INDEX IF NOT EXISTS role_bindings_by_set
    ON role_bindings (cluster_id, permission_set, namespace);
";

const IDENTITY_COLUMNS: &str =
    "cluster_id, user_id, service_identity, namespace, active, created_by, created_at, revoked_at";

const BINDING_COLUMNS: &str =
    "cluster_id, user_id, permission_set, namespace, kind, bound_by, created_at";

/// Ledger stored in a single SQLite database
///
/// Statements run on the blocking thread pool behind one connection mutex.
#[derive(Clone)]
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened ledger database");
        Self::from_connection(conn)
    }

    /// A private in-memory database
    pub fn in_memory() -> LedgerResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> LedgerResult<Self> {
        let tx = conn.transaction()?;
        tx.execute_batch(SCHEMA)?;
        tx.commit()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> LedgerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> LedgerResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| LedgerError::Db("ledger mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| LedgerError::Task(e.to_string()))?
    }
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> LedgerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| LedgerError::Corrupt(format!("timestamp {} out of range", ms)))
}

type RawIdentity = (u64, u64, String, String, bool, u64, i64, Option<i64>);

fn read_identity(row: &Row<'_>) -> rusqlite::Result<RawIdentity> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_identity(raw: RawIdentity) -> LedgerResult<ServiceIdentityRecord> {
    let (cluster_id, user_id, service_identity, namespace, active, created_by, created, revoked) =
        raw;
    Ok(ServiceIdentityRecord {
        cluster_id,
        user_id,
        service_identity,
        namespace,
        active,
        created_by,
        created_at: from_millis(created)?,
        revoked_at: revoked.map(from_millis).transpose()?,
    })
}

type RawBinding = (u64, u64, String, String, String, u64, i64);

fn read_binding(row: &Row<'_>) -> rusqlite::Result<RawBinding> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn decode_binding(raw: RawBinding) -> LedgerResult<RoleBindingRecord> {
    let (cluster_id, user_id, permission_set, namespace, kind, bound_by, created) = raw;
    let kind: PermissionSetKind = kind
        .parse()
        .map_err(|e: crate::ParseKindError| LedgerError::Corrupt(e.to_string()))?;
    Ok(RoleBindingRecord {
        cluster_id,
        user_id,
        permission_set,
        namespace,
        kind,
        bound_by,
        created_at: from_millis(created)?,
    })
}

fn query_identities(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> LedgerResult<Vec<ServiceIdentityRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, read_identity)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode_identity(row?)?);
    }
    Ok(out)
}

fn query_bindings(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> LedgerResult<Vec<RoleBindingRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, read_binding)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode_binding(row?)?);
    }
    Ok(out)
}

fn select_identity(
    conn: &Connection,
    cluster_id: u64,
    user_id: u64,
) -> LedgerResult<Option<ServiceIdentityRecord>> {
    let sql = format!(
        "SELECT {} FROM service_identities WHERE cluster_id = ?1 AND user_id = ?2",
        IDENTITY_COLUMNS
    );
    conn.query_row(&sql, params![cluster_id, user_id], read_identity)
        .optional()?
        .map(decode_identity)
        .transpose()
}

#[async_trait]
impl Ledger for SqliteLedger {
    async fn identity(
        &self,
        cluster_id: u64,
        user_id: u64,
    ) -> LedgerResult<Option<ServiceIdentityRecord>> {
        self.with_conn(move |conn| select_identity(conn, cluster_id, user_id))
            .await
    }

    async fn upsert_identity(
        &self,
        record: ServiceIdentityRecord,
    ) -> LedgerResult<ServiceIdentityRecord> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO service_identities
                    (cluster_id, user_id, service_identity, namespace, active, created_by, created_at, revoked_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, NULL)
                 ON CONFLICT (cluster_id, user_id) DO UPDATE SET
                    service_identity = excluded.service_identity,
                    namespace = excluded.namespace,
                    created_by = excluded.created_by,
                    active = 1,
                    revoked_at = NULL",
                params![
                    record.cluster_id,
                    record.user_id,
                    record.service_identity,
                    record.namespace,
                    record.created_by,
                    to_millis(record.created_at),
                ],
            )?;
            let stored = select_identity(&tx, record.cluster_id, record.user_id)?;
            tx.commit()?;
            stored.ok_or_else(|| {
                LedgerError::Db(format!(
                    "identity ({}, {}) missing after upsert",
                    record.cluster_id, record.user_id
                ))
            })
        })
        .await
    }

    async fn deactivate_identity(
        &self,
        cluster_id: u64,
        user_id: u64,
        revoked_at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE service_identities SET active = 0, revoked_at = ?3
                 WHERE cluster_id = ?1 AND user_id = ?2",
                params![cluster_id, user_id, to_millis(revoked_at)],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn delete_identity(&self, cluster_id: u64, user_id: u64) -> LedgerResult<bool> {
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM service_identities WHERE cluster_id = ?1 AND user_id = ?2",
                params![cluster_id, user_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn identities_for_cluster(
        &self,
        cluster_id: u64,
    ) -> LedgerResult<Vec<ServiceIdentityRecord>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM service_identities WHERE cluster_id = ?1 ORDER BY user_id",
                IDENTITY_COLUMNS
            );
            query_identities(conn, &sql, params![cluster_id])
        })
        .await
    }

    async fn delete_identities_for_cluster(&self, cluster_id: u64) -> LedgerResult<usize> {
        self.with_conn(move |conn| {
            Ok(conn.execute(
                "DELETE FROM service_identities WHERE cluster_id = ?1",
                params![cluster_id],
            )?)
        })
        .await
    }

    async fn binding(&self, key: &BindingKey) -> LedgerResult<Option<RoleBindingRecord>> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM role_bindings
                 WHERE cluster_id = ?1 AND user_id = ?2 AND permission_set = ?3 AND namespace = ?4",
                BINDING_COLUMNS
            );
            conn.query_row(
                &sql,
                params![key.cluster_id, key.user_id, key.permission_set, key.namespace],
                read_binding,
            )
            .optional()?
            .map(decode_binding)
            .transpose()
        })
        .await
    }

    async fn insert_binding(&self, record: RoleBindingRecord) -> LedgerResult<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO role_bindings
                    (cluster_id, user_id, permission_set, namespace, kind, bound_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.cluster_id,
                    record.user_id,
                    record.permission_set,
                    record.namespace,
                    record.kind.as_str(),
                    record.bound_by,
                    to_millis(record.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_binding(&self, key: &BindingKey) -> LedgerResult<bool> {
        let key = key.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "DELETE FROM role_bindings
                 WHERE cluster_id = ?1 AND user_id = ?2 AND permission_set = ?3 AND namespace = ?4",
                params![key.cluster_id, key.user_id, key.permission_set, key.namespace],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn bindings_for_user(
        &self,
        cluster_id: u64,
        user_id: u64,
    ) -> LedgerResult<Vec<RoleBindingRecord>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM role_bindings WHERE cluster_id = ?1 AND user_id = ?2
                 ORDER BY created_at DESC, permission_set, namespace",
                BINDING_COLUMNS
            );
            query_bindings(conn, &sql, params![cluster_id, user_id])
        })
        .await
    }

    async fn bindings_for_permission_set(
        &self,
        cluster_id: u64,
        permission_set: &str,
        namespace: &str,
    ) -> LedgerResult<Vec<RoleBindingRecord>> {
        let permission_set = permission_set.to_string();
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM role_bindings
                 WHERE cluster_id = ?1 AND permission_set = ?2 AND namespace = ?3
                 ORDER BY created_at, user_id",
                BINDING_COLUMNS
            );
            query_bindings(conn, &sql, params![cluster_id, permission_set, namespace])
        })
        .await
    }

    async fn bindings_for_cluster(&self, cluster_id: u64) -> LedgerResult<Vec<RoleBindingRecord>> {
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM role_bindings WHERE cluster_id = ?1
                 ORDER BY created_at DESC, user_id, permission_set, namespace",
                BINDING_COLUMNS
            );
            query_bindings(conn, &sql, params![cluster_id])
        })
        .await
    }

    async fn delete_bindings_for_user(&self, cluster_id: u64, user_id: u64) -> LedgerResult<usize> {
        self.with_conn(move |conn| {
            Ok(conn.execute(
                "DELETE FROM role_bindings WHERE cluster_id = ?1 AND user_id = ?2",
                params![cluster_id, user_id],
            )?)
        })
        .await
    }

    async fn delete_bindings_for_cluster(&self, cluster_id: u64) -> LedgerResult<usize> {
        self.with_conn(move |conn| {
            Ok(conn.execute(
                "DELETE FROM role_bindings WHERE cluster_id = ?1",
                params![cluster_id],
            )?)
        })
        .await
    }
}
