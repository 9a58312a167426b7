use std::sync::Arc;

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use arrow::record_batch::RecordBatch;
use log::debug;
use parking_lot::RwLock;

use crate::database::{Database, TableMutation};
use crate::errors::{Error, Result};

/// The lifecycle states of a transaction, as observed by the manager.
///
/// A transaction moves `Open -> Committed -> Applied` on the success path,
/// or `Open -> Aborted` on rollback. `Applied` and `Aborted` are terminal;
/// every operation on a transaction in a terminal state fails with
/// [`Error::TransactionClosed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Accepting reads and writes; neither committed nor aborted yet.
    Open,
    /// Locally committed. The overlay is frozen but its changes are not yet
    /// visible in the base database.
    Committed,
    /// Changes have been pushed into the base database. Terminal.
    Applied,
    /// Rolled back and the overlay discarded. Terminal.
    Aborted,
}

/// Interior state of a transaction, guarded by one lock so that the read
/// set, write set, and lifecycle state always change together.
struct TxnInner {
    state: TxnState,
    /// Tables this transaction has read, at table granularity.
    read_set: HashSet<String>,
    /// Staged changes for this transaction. `Some` is an upsert of the whole
    /// table content, `None` marks the table as dropped.
    write_set: HashMap<String, Option<Arc<RecordBatch>>>,
}

/// A single unit of work: a mutable overlay bound to a fixed ancestor
/// snapshot.
///
/// A `SnapshotTransaction` is created by the
/// [`TransactionManager`](crate::TransactionManager) and bound, for its whole
/// lifetime, to the most recently committed state at creation time: either
/// the last committed-but-unapplied transaction, or the base database when
/// nothing is pending. Reads resolve against the transaction's own staged
/// changes first, then walk the ancestor chain, and bottom out in the base
/// database; writes stay in the overlay until the manager applies them.
///
/// The caller holds a handle and performs reads and writes through it, but
/// every lifecycle transition (commit, rollback, apply, checkpoint) is
/// mediated by the manager. Handles are cheap to share across threads behind
/// an `Arc`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use arrow::array::Int64Array;
/// use arrow::datatypes::{DataType, Field, Schema};
/// use arrow::record_batch::RecordBatch;
/// use lamina::{MemoryDatabase, TransactionManager};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = TransactionManager::new(Arc::new(MemoryDatabase::new()));
///
/// let txn = manager.create_transaction()?;
/// let schema = Arc::new(Schema::new(vec![Field::new("qty", DataType::Int64, false)]));
/// let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![7]))])?;
/// txn.write_table("inventory", batch)?;
///
/// // Reads see the transaction's own staged changes.
/// assert!(txn.read_table("inventory")?.is_some());
///
/// manager.commit_transaction(&txn)?;
/// # Ok(())
/// # }
/// ```
pub struct SnapshotTransaction {
    /// Unique identifier, assigned in creation order by the manager.
    id: u64,
    /// The ancestor snapshot this transaction was opened against. `None`
    /// means the base database itself.
    opened_on: Option<Arc<SnapshotTransaction>>,
    /// The base store; the bottom of the visibility chain and the target of
    /// `apply` and `checkpoint`.
    database: Arc<dyn Database>,
    inner: RwLock<TxnInner>,
}

impl SnapshotTransaction {
    /// Creates a new open transaction bound to the given ancestor snapshot.
    ///
    /// Called by the manager under its critical section; never construct one
    /// of these outside it, or the snapshot ordering guarantees are lost.
    pub(crate) fn new(
        id: u64,
        opened_on: Option<Arc<SnapshotTransaction>>,
        database: Arc<dyn Database>,
    ) -> Self {
        Self {
            id,
            opened_on,
            database,
            inner: RwLock::new(TxnInner {
                state: TxnState::Open,
                read_set: HashSet::new(),
                write_set: HashMap::new(),
            }),
        }
    }

    /// Returns the unique identifier of the transaction.
    ///
    /// Identifiers are assigned by the manager in creation order.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> TxnState {
        self.inner.read().state
    }

    /// Returns the ancestor this transaction was opened against, or `None`
    /// if it was opened directly on the base database.
    ///
    /// The manager uses this to decide which committed transactions are
    /// relevant when scanning for conflicts at commit time.
    pub fn opened_on(&self) -> Option<Arc<SnapshotTransaction>> {
        self.opened_on.clone()
    }

    /// Returns `true` if this transaction has staged no changes.
    pub fn is_read_only(&self) -> bool {
        self.inner.read().write_set.is_empty()
    }

    /// Returns the set of tables this transaction has read so far.
    ///
    /// Safe to call in any state; after commit the set is frozen.
    pub fn read_tables(&self) -> HashSet<String> {
        self.inner.read().read_set.clone()
    }

    /// Returns the set of tables this transaction has modified so far.
    ///
    /// Safe to call in any state; after commit the set is frozen.
    pub fn modified_tables(&self) -> HashSet<String> {
        self.inner.read().write_set.keys().cloned().collect()
    }

    /// Reads the named table through this transaction's view.
    ///
    /// The table is recorded in the read set whether or not it exists, and
    /// the lookup resolves in order: this transaction's staged changes (a
    /// staged drop answers `None`), then each ancestor's frozen overlay, and
    /// finally the base database.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the table to read.
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(batch))` with the visible content, or `Ok(None)` if
    /// the table does not exist in this transaction's view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionClosed`] if the transaction is no longer
    /// open, or a database error from the bottom of the chain.
    pub fn read_table(&self, name: &str) -> Result<Option<Arc<RecordBatch>>> {
        let mut inner = self.inner.write();
        if inner.state != TxnState::Open {
            return Err(Error::TransactionClosed);
        }
        // Reads of missing tables are recorded too: a later creation of the
        // table by a concurrent transaction is still a hazard.
        inner.read_set.insert(name.to_string());
        if let Some(change) = inner.write_set.get(name) {
            return Ok(change.clone());
        }
        drop(inner);
        self.visible_in_chain(name)
    }

    /// Stages an upsert of the named table with the provided content.
    ///
    /// The `RecordBatch` replaces the table's entire visible content once
    /// the transaction commits and is applied. Writing does not add the
    /// table to the read set; blind writes never conflict on their own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionClosed`] if the transaction is no longer
    /// open.
    pub fn write_table(&self, name: impl Into<String>, batch: RecordBatch) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != TxnState::Open {
            return Err(Error::TransactionClosed);
        }
        inner.write_set.insert(name.into(), Some(Arc::new(batch)));
        Ok(())
    }

    /// Stages a drop of the named table.
    ///
    /// Subsequent reads through this transaction answer `None` for the
    /// table; the base namespace is untouched until apply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionClosed`] if the transaction is no longer
    /// open.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != TxnState::Open {
            return Err(Error::TransactionClosed);
        }
        inner.write_set.insert(name.to_string(), None);
        Ok(())
    }

    /// Resolves a table through the ancestor chain without recording a read
    /// anywhere: ancestors are committed and their sets are frozen.
    fn visible_in_chain(&self, name: &str) -> Result<Option<Arc<RecordBatch>>> {
        let mut ancestor = self.opened_on.clone();
        while let Some(txn) = ancestor {
            if let Some(change) = txn.inner.read().write_set.get(name) {
                return Ok(change.clone());
            }
            ancestor = txn.opened_on.clone();
        }
        self.database.read_table(name)
    }

    /// Finalizes local changes. A pure state transition: nothing touches the
    /// base store here, and the read and write sets are frozen from now on
    /// because data operations reject non-open transactions.
    pub(crate) fn commit(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != TxnState::Open {
            return Err(Error::TransactionClosed);
        }
        inner.state = TxnState::Committed;
        debug!("transaction {} committed locally", self.id);
        Ok(())
    }

    /// Discards the overlay. Safe on a transaction that staged nothing.
    pub(crate) fn rollback(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != TxnState::Open {
            return Err(Error::TransactionClosed);
        }
        inner.write_set.clear();
        inner.state = TxnState::Aborted;
        debug!("transaction {} rolled back", self.id);
        Ok(())
    }

    /// Pushes the committed overlay into the base database.
    ///
    /// The manager calls this exactly once per committed transaction and
    /// removes the transaction from its queue immediately on success. On a
    /// database failure the state stays `Committed` and the error surfaces
    /// to the pipeline.
    pub(crate) fn apply(&self) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.state != TxnState::Committed {
            return Err(Error::TransactionClosed);
        }
        let mutations: Vec<TableMutation> = inner
            .write_set
            .iter()
            .map(|(name, change)| match change {
                Some(batch) => TableMutation::Upsert(name.clone(), Arc::clone(batch)),
                None => TableMutation::Drop(name.clone()),
            })
            .collect();
        if !mutations.is_empty() {
            self.database.apply_changes(mutations)?;
        }
        // The write set is kept after apply: transactions opened on this one
        // keep reading through the frozen overlay.
        inner.state = TxnState::Applied;
        debug!("transaction {} applied", self.id);
        Ok(())
    }

    /// Durability hint forwarded to the base store after a batch of applies.
    /// Deliberately not tied to this transaction's own changes.
    pub(crate) fn checkpoint(&self) -> Result<()> {
        debug!("checkpoint after applying through transaction {}", self.id);
        self.database.checkpoint()
    }
}
