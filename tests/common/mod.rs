//! Common utilities for Lamina integration tests.

use ahash::AHashMap as HashMap;
use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use lamina::{Database, Error, Result, TableMutation, TransactionManager};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// --- MockDatabase ---

/// A mock implementation of the `Database` trait for testing purposes.
/// Stores tables in an in-memory HashMap and records everything the
/// transaction manager does to it: the order in which table mutations
/// arrive, how often apply/checkpoint/shutdown are invoked, and it can be
/// told to fail applies or shutdown on demand.
pub struct MockDatabase {
    tables: Mutex<HashMap<String, Arc<RecordBatch>>>,
    /// Table names from every `apply_changes` call, in arrival order.
    apply_log: Mutex<Vec<String>>,
    apply_calls: AtomicUsize,
    checkpoint_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
    fail_applies: AtomicBool,
    fail_shutdown: AtomicBool,
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDatabase {
    /// Creates a new, empty `MockDatabase`.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            apply_log: Mutex::new(Vec::new()),
            apply_calls: AtomicUsize::new(0),
            checkpoint_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            fail_applies: AtomicBool::new(false),
            fail_shutdown: AtomicBool::new(false),
        }
    }

    /// Retrieves a table from the mock base namespace.
    pub fn get(&self, name: &str) -> Option<Arc<RecordBatch>> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    /// Returns the table names applied so far, in arrival order.
    pub fn apply_log(&self) -> Vec<String> {
        self.apply_log.lock().unwrap().clone()
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn checkpoint_calls(&self) -> usize {
        self.checkpoint_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    /// Makes every subsequent `apply_changes` call fail (or succeed again).
    pub fn set_fail_applies(&self, fail: bool) {
        self.fail_applies.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `shutdown` call fail (or succeed again).
    pub fn set_fail_shutdown(&self, fail: bool) {
        self.fail_shutdown.store(fail, Ordering::SeqCst);
    }
}

impl Database for MockDatabase {
    fn read_table(&self, name: &str) -> Result<Option<Arc<RecordBatch>>> {
        Ok(self.tables.lock().unwrap().get(name).cloned())
    }

    fn apply_changes(&self, mutations: Vec<TableMutation>) -> Result<()> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_applies.load(Ordering::SeqCst) {
            return Err(Error::Database("injected apply failure".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        let mut log = self.apply_log.lock().unwrap();
        for mutation in mutations {
            match mutation {
                TableMutation::Upsert(name, batch) => {
                    log.push(name.clone());
                    tables.insert(name, batch);
                }
                TableMutation::Drop(name) => {
                    log.push(name.clone());
                    tables.remove(&name);
                }
            }
        }
        Ok(())
    }

    fn checkpoint(&self) -> Result<()> {
        self.checkpoint_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        if self.fail_shutdown.load(Ordering::SeqCst) {
            return Err(Error::Database("injected shutdown failure".to_string()));
        }
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// --- Helper Functions ---

/// Helper function to create a TransactionManager backed by a MockDatabase.
pub fn setup_manager() -> (Arc<TransactionManager>, Arc<MockDatabase>) {
    let database = Arc::new(MockDatabase::new());
    let manager = Arc::new(TransactionManager::new(
        Arc::clone(&database) as Arc<dyn Database>
    ));
    (manager, database)
}

/// Helper function to create a simple schema.
pub fn create_test_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Utf8, true),
    ]))
}

/// Helper function to create a RecordBatch.
pub fn create_record_batch(ids: Vec<i64>, values: Vec<Option<&str>>) -> RecordBatch {
    let schema = create_test_schema();
    RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(ids)),
            Arc::new(StringArray::from(values)),
        ],
    )
    .unwrap()
}
