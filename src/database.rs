use std::sync::Arc;

use arrow::record_batch::RecordBatch;

use crate::errors::Result;

/// The name type for tables in the engine. Using String for now.
///
/// This type alias defines the type used to identify tables within the
/// base table namespace. Currently, it is set to `String`.
type TableName = String;

/// Represents a single change to the base table namespace.
///
/// `TableMutation` is used to describe a change (creating or replacing a
/// table's content, or dropping a table) that a committed transaction pushes
/// into the base store when it is applied.
#[derive(Debug)]
pub enum TableMutation {
    /// Create the named table or replace its content wholesale with the
    /// given `RecordBatch`.
    Upsert(TableName, Arc<RecordBatch>),
    /// Drop the named table. If no table with that name exists, this
    /// mutation should be a no-op.
    Drop(TableName),
}

/// Trait for the base, durable table namespace of the engine.
///
/// Implementations of this trait own the tables that transactions snapshot
/// from and that eventually receive applied changes. The transaction manager
/// provides a list of `TableMutation`s to be applied per transaction; the
/// implementation must ensure that either all mutations in a single
/// `apply_changes` call take effect, or none do. This trait carries no
/// transaction logic of its own beyond that atomicity.
///
/// Implementations must be `Send` and `Sync` so that concurrent transactions
/// can share them.
///
/// # Examples
///
/// A minimal in-memory implementation (the crate ships a complete one as
/// [`MemoryDatabase`](crate::MemoryDatabase)):
///
/// ```no_run
/// use ahash::AHashMap as HashMap;
/// use arrow::record_batch::RecordBatch;
/// use lamina::{Database, Result, TableMutation};
/// use parking_lot::RwLock;
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct TinyDatabase {
///     tables: RwLock<HashMap<String, Arc<RecordBatch>>>,
/// }
///
/// impl Database for TinyDatabase {
///     fn read_table(&self, name: &str) -> Result<Option<Arc<RecordBatch>>> {
///         Ok(self.tables.read().get(name).cloned())
///     }
///
///     fn apply_changes(&self, mutations: Vec<TableMutation>) -> Result<()> {
///         let mut tables = self.tables.write();
///         for mutation in mutations {
///             match mutation {
///                 TableMutation::Upsert(name, batch) => {
///                     tables.insert(name, batch);
///                 }
///                 TableMutation::Drop(name) => {
///                     tables.remove(&name);
///                 }
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Database: Send + Sync {
    /// Returns the current content of the named table, or `None` if the
    /// table does not exist in the base namespace.
    ///
    /// This is the bottom of every transaction's visibility chain: a read
    /// that is not answered by a transaction overlay ends up here.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::Database`](crate::Error::Database) if the
    /// underlying store fails.
    fn read_table(&self, name: &str) -> Result<Option<Arc<RecordBatch>>>;

    /// Atomically applies the given mutations to the base namespace.
    ///
    /// This is the primary method for making a committed transaction's
    /// changes visible. The implementation must apply the entire list as a
    /// single atomic unit; on failure the namespace must be left in the
    /// state it had before the call.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::Database`](crate::Error::Database) if the atomic
    /// application of mutations fails.
    fn apply_changes(&self, mutations: Vec<TableMutation>) -> Result<()>;

    /// Durability and compaction hook, invoked by the transaction manager
    /// once per drained batch of applies.
    ///
    /// The default implementation does nothing.
    fn checkpoint(&self) -> Result<()> {
        Ok(())
    }

    /// Releases whatever the implementation holds. Called exactly once, by
    /// the transaction manager, at the end of its own shutdown.
    ///
    /// The default implementation does nothing.
    fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
