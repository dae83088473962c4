// Row-store collaborator.
//
// The engine never talks to a database directly. Hosts hand it something
// that implements `RowStore`: a filtered-collection service keyed by table
// name and natural key.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;

use crate::record::{Filter, Record};

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// A row with the same natural key already held identical data.
    Unchanged,
}

pub trait RowStore {
    /// All rows of `table` matching `filter`, ordered by natural key.
    fn find_many(&self, table: &str, filter: &Filter) -> Result<Vec<Record>>;

    /// Insert `data` under `natural_key`, or replace the existing row.
    fn upsert(&self, table: &str, natural_key: &str, data: &Record) -> Result<UpsertOutcome>;

    fn count(&self, table: &str, filter: &Filter) -> Result<usize> {
        Ok(self.find_many(table, filter)?.len())
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// `RowStore` over nested ordered maps. Used by tests and by hosts that
/// stage a rollup before deciding whether to write it anywhere.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<BTreeMap<String, BTreeMap<String, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock).
    fn tables(&self) -> MutexGuard<'_, BTreeMap<String, BTreeMap<String, Record>>> {
        self.tables.lock().expect("memory store mutex poisoned")
    }
}

impl RowStore for MemoryStore {
    fn find_many(&self, table: &str, filter: &Filter) -> Result<Vec<Record>> {
        let tables = self.tables();
        Ok(tables
            .get(table)
            .map(|rows| rows.values().filter(|r| r.matches(filter)).cloned().collect())
            .unwrap_or_default())
    }

    fn upsert(&self, table: &str, natural_key: &str, data: &Record) -> Result<UpsertOutcome> {
        let mut tables = self.tables();
        let rows = tables.entry(table.to_string()).or_default();
        let outcome = match rows.get(natural_key) {
            None => UpsertOutcome::Created,
            Some(existing) if existing == data => return Ok(UpsertOutcome::Unchanged),
            Some(_) => UpsertOutcome::Updated,
        };
        rows.insert(natural_key.to_string(), data.clone());
        Ok(outcome)
    }

    fn count(&self, table: &str, filter: &Filter) -> Result<usize> {
        let tables = self.tables();
        Ok(tables
            .get(table)
            .map(|rows| rows.values().filter(|r| r.matches(filter)).count())
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
