use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::ApplyMode;
use crate::conflict::detection::{in_conflict, scan_window_start};
use crate::database::Database;
use crate::errors::{Error, Result};
use crate::transaction::SnapshotTransaction;

/// Lamina Prelude
pub mod prelude {
    pub use crate::conflict::detection::*;
    pub use crate::data_store::mem_database::*;
    pub use crate::database::*;
    pub use crate::errors::*;
    pub use crate::manager::*;
    pub use crate::transaction::*;
    pub use crate::ApplyMode;
}

/// Bookkeeping owned by the manager, guarded as one unit so every lifecycle
/// transition observes a consistent picture of the queues and the shutdown
/// flag.
struct ManagerState {
    /// Open transactions, in creation order. A transaction leaves this list
    /// on commit or abort.
    open: Vec<Arc<SnapshotTransaction>>,
    /// Transactions that committed locally but whose changes are not yet
    /// visible in the base database, in commit order.
    committed: Vec<Arc<SnapshotTransaction>>,
    /// The base store. `None` once the manager has shut down.
    database: Option<Arc<dyn Database>>,
}

/// The sole arbiter of transaction ordering and visibility for one open
/// database.
///
/// The manager creates transactions bound to the most recently committed
/// state, decides at commit time whether a transaction may proceed, and
/// controls when committed changes become visible in the base store. All
/// lifecycle operations execute under a single mutual-exclusion domain;
/// there is no finer-grained locking on the bookkeeping, since correctness
/// of the ordering (which snapshot a new transaction sees, which committed
/// transactions a conflict scan covers) depends on a total, observable order
/// of lifecycle transitions.
///
/// Committed changes are deferred: they reach the base database only when no
/// transaction is open, so readers in flight are never disturbed. A
/// transaction that never commits nor aborts therefore stalls the pipeline
/// for everyone committed behind it; that liveness hazard is inherent to the
/// design.
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
/// let database = Arc::new(MemoryDatabase::new());
/// let manager = TransactionManager::new(Arc::clone(&database) as _);
///
/// let txn = manager.create_transaction()?;
/// let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
/// let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))])?;
/// txn.write_table("accounts", batch)?;
/// manager.commit_transaction(&txn)?;
///
/// // No other transaction was open, so the commit was applied eagerly.
/// assert_eq!(database.table_count(), 1);
///
/// manager.shutdown()?;
/// assert!(manager.is_shutdown());
/// # Ok(())
/// # }
/// ```
pub struct TransactionManager {
    state: Mutex<ManagerState>,
    /// A globally increasing counter for generating unique transaction IDs.
    txn_counter: AtomicU64,
    /// Whether the apply pipeline runs at all. See [`ApplyMode`].
    apply_mode: ApplyMode,
}

impl TransactionManager {
    /// Creates a manager for the given base database with the normal,
    /// deferred apply pipeline.
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self::with_apply_mode(database, ApplyMode::Deferred)
    }

    /// Creates a manager with an explicit [`ApplyMode`].
    ///
    /// [`ApplyMode::Suspended`] is a diagnostic setting: transactions commit
    /// locally but are never applied, so the committed queue grows without
    /// bound and no table ever reflects committed changes.
    pub fn with_apply_mode(database: Arc<dyn Database>, apply_mode: ApplyMode) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                open: Vec::new(),
                committed: Vec::new(),
                database: Some(database),
            }),
            txn_counter: AtomicU64::new(0),
            apply_mode,
        }
    }

    /// Starts a new transaction bound to the current latest snapshot.
    ///
    /// The snapshot is the last committed-but-unapplied transaction when one
    /// exists, otherwise the base database; new transactions always see the
    /// most recently committed state even while its application to the base
    /// store is still deferred.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyShutdown`] if the manager has been shut down.
    pub fn create_transaction(&self) -> Result<Arc<SnapshotTransaction>> {
        let mut state = self.state.lock();
        let database = state.database.as_ref().ok_or(Error::AlreadyShutdown)?;
        let id = self.txn_counter.fetch_add(1, Ordering::SeqCst);
        let txn = Arc::new(SnapshotTransaction::new(
            id,
            state.committed.last().cloned(),
            Arc::clone(database),
        ));
        state.open.push(Arc::clone(&txn));
        debug!(
            "created transaction {} ({} open, {} pending apply)",
            id,
            state.open.len(),
            state.committed.len()
        );
        Ok(txn)
    }

    /// Attempts to commit the given transaction.
    ///
    /// A transaction that staged no changes commits trivially: it is applied
    /// on the spot (there is nothing to make visible) and never enters the
    /// committed queue. Otherwise the manager scans every transaction that
    /// committed after this one's snapshot; any overlap between this
    /// transaction's read set and a scanned transaction's modified set fails
    /// the commit with [`Error::TransactionConflict`], and the transaction
    /// is left open so the caller can decide to retry with a fresh
    /// transaction or abort this one.
    ///
    /// On success the transaction joins the committed queue and the apply
    /// pipeline runs if no transactions remain open.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyShutdown`] if the manager has been shut down.
    /// - [`Error::TransactionClosed`] if the handle is not an open
    ///   transaction of this manager.
    /// - [`Error::TransactionConflict`] on a detected conflict; the
    ///   transaction stays open.
    /// - [`Error::ApplyFailed`] if the commit succeeded but draining the
    ///   committed queue into the base store failed; the queue is discarded.
    pub fn commit_transaction(&self, txn: &SnapshotTransaction) -> Result<()> {
        let mut state = self.state.lock();
        if state.database.is_none() {
            return Err(Error::AlreadyShutdown);
        }
        let position = state
            .open
            .iter()
            .position(|t| std::ptr::eq(Arc::as_ptr(t), txn))
            .ok_or(Error::TransactionClosed)?;

        if txn.is_read_only() {
            // Nothing to conflict-check and nothing to defer: apply on the
            // spot and keep the committed queue untouched.
            txn.commit()?;
            txn.apply()?;
            state.open.remove(position);
        } else {
            let handle = Arc::clone(&state.open[position]);
            let opened_on = txn.opened_on();
            let start = scan_window_start(&state.committed, opened_on.as_ref());
            for committed in &state.committed[start..] {
                if in_conflict(txn, committed) {
                    debug!(
                        "commit of transaction {} conflicts with committed transaction {}",
                        txn.id(),
                        committed.id()
                    );
                    return Err(Error::TransactionConflict);
                }
            }
            txn.commit()?;
            state.committed.push(handle);
            state.open.remove(position);
        }
        self.try_to_apply(&mut state)
    }

    /// Rolls the given transaction back and removes it from the open set.
    ///
    /// Abort always completes from the caller's perspective: the apply
    /// attempt that follows is best-effort, and a failure there is logged
    /// and swallowed rather than surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyShutdown`] if the manager has been shut down,
    /// or [`Error::TransactionClosed`] if the handle is not an open
    /// transaction of this manager.
    pub fn abort_transaction(&self, txn: &SnapshotTransaction) -> Result<()> {
        let mut state = self.state.lock();
        if state.database.is_none() {
            return Err(Error::AlreadyShutdown);
        }
        let position = state
            .open
            .iter()
            .position(|t| std::ptr::eq(Arc::as_ptr(t), txn))
            .ok_or(Error::TransactionClosed)?;
        txn.rollback()?;
        state.open.remove(position);

        if let Err(e) = self.try_to_apply(&mut state) {
            warn!(
                "apply attempt after aborting transaction {} failed: {}",
                txn.id(),
                e
            );
        }
        Ok(())
    }

    /// Shuts the manager down.
    ///
    /// Every open transaction is rolled back in reverse creation order, a
    /// final apply attempt drains whatever had committed (failures logged
    /// and swallowed; shutdown must complete), and the base database is
    /// asked to shut down before the manager releases its reference to it.
    /// Afterwards every lifecycle call fails with
    /// [`Error::AlreadyShutdown`]. Calling `shutdown` again is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates a failure from the base database's own shutdown; the
    /// manager then still holds its reference and is not shut down.
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock();
        let Some(database) = state.database.clone() else {
            return Ok(());
        };

        // Last created first, so each rollback happens before the snapshot
        // it was opened against goes away.
        for txn in state.open.iter().rev() {
            if let Err(e) = txn.rollback() {
                warn!(
                    "rollback of transaction {} during shutdown failed: {}",
                    txn.id(),
                    e
                );
            }
        }
        state.open.clear();

        if let Err(e) = self.try_to_apply(&mut state) {
            warn!("final apply attempt during shutdown failed: {}", e);
        }

        database.shutdown()?;
        state.database = None;
        debug!("transaction manager shut down");
        Ok(())
    }

    /// Returns `true` once the manager holds no live database reference.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().database.is_none()
    }

    /// Drains the committed queue into the base store when it is safe to do
    /// so, which is exactly when no transaction is open.
    ///
    /// Transactions are applied in commit order and removed from the queue
    /// one by one, immediately after each successful apply. If any apply
    /// fails the entire remaining queue is discarded, not retried: a
    /// partially applied sequence cannot be resumed safely without
    /// per-transaction idempotence guarantees this manager does not assume.
    /// After a drain that applied at least one transaction, `checkpoint` is
    /// invoked once, on the last transaction applied, amortizing its cost
    /// over the whole batch.
    fn try_to_apply(&self, state: &mut ManagerState) -> Result<()> {
        if self.apply_mode == ApplyMode::Suspended || !state.open.is_empty() {
            return Ok(());
        }
        let mut last = None;
        while let Some(txn) = state.committed.first().cloned() {
            if let Err(e) = txn.apply() {
                let dropped = state.committed.len();
                state.committed.clear();
                warn!(
                    "apply of transaction {} failed, discarding {} pending commit(s): {}",
                    txn.id(),
                    dropped,
                    e
                );
                return Err(Error::ApplyFailed(Box::new(e)));
            }
            state.committed.remove(0);
            last = Some(txn);
        }
        if let Some(txn) = last {
            txn.checkpoint()?;
        }
        Ok(())
    }
}
