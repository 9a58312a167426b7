use std::sync::Arc;

use crate::transaction::SnapshotTransaction;

/// Returns `true` iff committing `new` would conflict with the already
/// committed transaction `old`.
///
/// The check runs at table granularity: `new` conflicts when it modified at
/// least one table and its read set intersects `old`'s modified set. Note
/// that this is much too strong a conflict check to be precise: it flags any
/// read of a table that a later-committed transaction changed, regardless of
/// whether the actual rows overlap, so false conflicts are expected.
// TODO: track read and write sets per row to cut down the false conflicts.
pub fn in_conflict(new: &SnapshotTransaction, old: &SnapshotTransaction) -> bool {
    // A transaction that changed nothing can never conflict.
    if new.is_read_only() {
        return false;
    }
    !new.read_tables().is_disjoint(&old.modified_tables())
}

/// Returns the index in `committed` at which the conflict scan for a
/// transaction opened on `opened_on` must start.
///
/// Only transactions that committed after the ancestor snapshot are
/// relevant, so the window starts one past the ancestor's position. When the
/// ancestor is not in the queue (the snapshot was the base database, or the
/// ancestor has already been applied and removed) the window conservatively
/// covers the entire queue rather than none of it.
pub(crate) fn scan_window_start(
    committed: &[Arc<SnapshotTransaction>],
    opened_on: Option<&Arc<SnapshotTransaction>>,
) -> usize {
    match opened_on {
        Some(ancestor) => committed
            .iter()
            .position(|c| Arc::ptr_eq(c, ancestor))
            .map(|index| index + 1)
            .unwrap_or(0),
        None => 0,
    }
}
