pub mod errors;
pub mod data_store;
pub mod transaction;
pub mod manager;
pub mod database;
pub mod conflict;

// Re-export key types and structs for easier access
pub use errors::{Error, Result};
pub use manager::prelude;
pub use data_store::mem_database::MemoryDatabase;
pub use database::{Database, TableMutation};
pub use manager::TransactionManager;
pub use transaction::{SnapshotTransaction, TxnState};

// Define the ApplyMode enum here as it's a core part of the public API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
///
/// Controls whether a [`TransactionManager`] runs its apply pipeline.
pub enum ApplyMode {
    ///
    /// [`ApplyMode::Deferred`] is the normal mode: committed transactions
    /// queue up and are pushed into the base database, in commit order, as
    /// soon as no transaction is open. Readers in flight always win over
    /// visibility changes.
    #[default]
    Deferred,
    ///
    /// [`ApplyMode::Suspended`] disables the apply pipeline entirely.
    /// Transactions still commit locally and still conflict-check against
    /// each other, but their changes never reach the base tables and the
    /// committed queue grows without bound. Intended for diagnostics and
    /// testing only.
    Suspended,
}
