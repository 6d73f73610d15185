//! Ledger of service identities and role bindings
//!
//! The ledger is this platform's record of which identities and bindings it
//! believes exist on each managed cluster. It is authoritative for whether a
//! user is actively granted access, independent of what the cluster holds.

#![deny(missing_docs)]

mod error;
mod records;
mod sqlite;
mod store;

pub use error::LedgerError;
pub use records::{
    BindingKey, ParseKindError, PermissionSetKind, RoleBindingRecord, ServiceIdentityRecord,
};
pub use sqlite::SqliteLedger;
pub use store::{Ledger, LedgerResult};
