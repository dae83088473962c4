// SQLite-backed row store.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::record::{Filter, Record};
use crate::store::{RowStore, UpsertOutcome};

/// Persists every table's rows in one `records` table as JSON documents,
/// keyed by `(table_name, natural_key)`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path` and ensure the schema
    /// exists. Pass `":memory:"` for an ephemeral database (useful for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS records (
                table_name  TEXT NOT NULL,
                natural_key TEXT NOT NULL,
                data        TEXT NOT NULL,
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (table_name, natural_key)
            );
            CREATE INDEX IF NOT EXISTS idx_records_table ON records(table_name);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

impl RowStore for SqliteStore {
    fn find_many(&self, table: &str, filter: &Filter) -> Result<Vec<Record>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT natural_key, data FROM records
                 WHERE table_name = ?1 ORDER BY natural_key",
            )
            .context("failed to prepare find_many query")?;

        let rows = stmt
            .query_map(params![table], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("failed to query records")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map record rows")?;

        let mut records = Vec::with_capacity(rows.len());
        for (key, data) in rows {
            match serde_json::from_str::<Record>(&data) {
                Ok(record) if record.matches(filter) => records.push(record),
                Ok(_) => {}
                Err(e) => warn!("skipping undecodable row {table}/{key}: {e}"),
            }
        }
        Ok(records)
    }

    fn upsert(&self, table: &str, natural_key: &str, data: &Record) -> Result<UpsertOutcome> {
        let conn = self.conn();
        let json = serde_json::to_string(data)
            .with_context(|| format!("failed to encode {table}/{natural_key}"))?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE table_name = ?1 AND natural_key = ?2",
                params![table, natural_key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up existing record")?;

        let outcome = match existing {
            None => UpsertOutcome::Created,
            Some(prev) => {
                let unchanged = serde_json::from_str::<Record>(&prev)
                    .map(|prev| &prev == data)
                    .unwrap_or(false);
                if unchanged {
                    return Ok(UpsertOutcome::Unchanged);
                }
                UpsertOutcome::Updated
            }
        };

        conn.execute(
            "INSERT INTO records (table_name, natural_key, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(table_name, natural_key) DO UPDATE SET
                data = excluded.data,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![table, natural_key, json],
        )
        .context("failed to upsert record")?;

        Ok(outcome)
    }

    fn count(&self, table: &str, filter: &Filter) -> Result<usize> {
        if !filter.is_empty() {
            return Ok(self.find_many(table, filter)?.len());
        }
        let conn = self.conn();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE table_name = ?1",
                params![table],
                |row| row.get(0),
            )
            .context("failed to count records")?;
        Ok(n as usize)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> SqliteStore {
        SqliteStore::open(":memory:").expect("in-memory db should open")
    }

    fn team_week(team: &str, week: &str, hits: f64) -> Record {
        Record::new()
            .with("gshlTeamId", team)
            .with("weekId", week)
            .with("HIT", hits)
    }

    #[test]
    fn open_creates_schema() {
        let db = test_db();
        let conn = db.conn();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'records'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn upsert_round_trip_and_outcomes() {
        let db = test_db();
        let row = team_week("t1", "w1", 40.0);
        assert_eq!(db.upsert("TeamWeek", "t1|w1", &row).unwrap(), UpsertOutcome::Created);
        assert_eq!(db.upsert("TeamWeek", "t1|w1", &row).unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(
            db.upsert("TeamWeek", "t1|w1", &team_week("t1", "w1", 41.5)).unwrap(),
            UpsertOutcome::Updated
        );
        let rows = db.find_many("TeamWeek", &Filter::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_f64("HIT"), Some(41.5));
    }

    #[test]
    fn tables_are_isolated_and_filterable() {
        let db = test_db();
        db.upsert("TeamWeek", "t1|w1", &team_week("t1", "w1", 1.0)).unwrap();
        db.upsert("TeamWeek", "t2|w1", &team_week("t2", "w1", 2.0)).unwrap();
        db.upsert("TeamDay", "t1|2024-01-01", &team_week("t1", "w1", 3.0)).unwrap();

        assert_eq!(db.count("TeamWeek", &Filter::new()).unwrap(), 2);
        assert_eq!(db.count("TeamDay", &Filter::new()).unwrap(), 1);
        assert_eq!(db.count("TeamWeek", &Filter::new().field("gshlTeamId", "t2")).unwrap(), 1);
    }

    #[test]
    fn file_backed_store_persists_across_opens() {
        let path = std::env::temp_dir().join("gshl_core_sqlite_store_test.db");
        let _ = std::fs::remove_file(&path);
        let path_str = path.to_string_lossy().to_string();
        {
            let db = SqliteStore::open(&path_str).unwrap();
            db.upsert("TeamWeek", "t1|w1", &team_week("t1", "w1", 7.0)).unwrap();
        }
        let db = SqliteStore::open(&path_str).unwrap();
        assert_eq!(db.count("TeamWeek", &Filter::new()).unwrap(), 1);
        drop(db);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("db-wal"));
        let _ = std::fs::remove_file(path.with_extension("db-shm"));
    }
}
