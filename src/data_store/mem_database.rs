use std::sync::Arc;

use ahash::AHashMap as HashMap;
use arrow::record_batch::RecordBatch;
use log::debug;
use parking_lot::RwLock;

use crate::database::{Database, TableMutation};
use crate::errors::Result;

/// An in-memory base table namespace.
///
/// `MemoryDatabase` is the default [`Database`] implementation shipped with
/// the crate. It keeps every table's content as an `Arc<RecordBatch>` behind
/// a read-write lock and provides no durability; `checkpoint` and `shutdown`
/// are logging no-ops.
pub struct MemoryDatabase {
    tables: RwLock<HashMap<String, Arc<RecordBatch>>>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    /// Creates a new, empty `MemoryDatabase`.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the names of all tables currently in the namespace, in no
    /// particular order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Returns the number of tables currently in the namespace.
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }
}

impl Database for MemoryDatabase {
    fn read_table(&self, name: &str) -> Result<Option<Arc<RecordBatch>>> {
        Ok(self.tables.read().get(name).cloned())
    }

    fn apply_changes(&self, mutations: Vec<TableMutation>) -> Result<()> {
        // Holding the write lock for the whole loop makes the batch atomic
        // with respect to concurrent readers.
        let mut tables = self.tables.write();
        for mutation in mutations {
            match mutation {
                TableMutation::Upsert(name, batch) => {
                    tables.insert(name, batch);
                }
                TableMutation::Drop(name) => {
                    tables.remove(&name);
                }
            }
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<()> {
        debug!("checkpoint requested on in-memory database (no-op)");
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        debug!(
            "shutting down in-memory database with {} tables",
            self.tables.read().len()
        );
        Ok(())
    }
}
