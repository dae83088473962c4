// Typed rows to and from the row store.

use anyhow::Context;
use gshl_core::{Filter, RowStore, UpsertOutcome};
use tracing::{info, warn};

use crate::aggregation::records::StoredRow;

/// Per-table tally of an upsert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertSummary {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// Upsert every row under its natural key. Rows already in the table but
/// absent from `rows` are left alone.
pub fn persist<T: StoredRow>(store: &dyn RowStore, rows: &[T]) -> anyhow::Result<UpsertSummary> {
    let mut summary = UpsertSummary::default();
    for row in rows {
        let key = row.natural_key();
        let outcome = store
            .upsert(T::TABLE, &key, &row.to_record())
            .with_context(|| format!("failed to upsert {} row {key}", T::TABLE))?;
        summary.record(outcome);
    }
    info!(
        "{}: {} created, {} updated, {} unchanged",
        T::TABLE,
        summary.created,
        summary.updated,
        summary.unchanged
    );
    Ok(summary)
}

/// Load typed rows matching `filter`. Rows that don't parse are skipped
/// with a warning.
pub fn load<T: StoredRow>(store: &dyn RowStore, filter: &Filter) -> anyhow::Result<Vec<T>> {
    let records = store
        .find_many(T::TABLE, filter)
        .with_context(|| format!("failed to read {}", T::TABLE))?;
    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        match T::from_record(record) {
            Ok(row) => rows.push(row),
            Err(e) => warn!("skipping malformed {} row: {}", T::TABLE, e),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::records::{Week, WEEK_TABLE};
    use crate::stats::classify::SeasonPhase;
    use gshl_core::{MemoryStore, Record};

    fn week(id: &str, num: u32) -> Week {
        Week {
            id: id.into(),
            season_id: "10".into(),
            week_num: num,
            season_phase: SeasonPhase::RegularSeason,
        }
    }

    #[test]
    fn persist_tallies_outcomes() {
        let store = MemoryStore::new();
        let first = persist(&store, &[week("1", 1), week("2", 2)]).unwrap();
        assert_eq!(first, UpsertSummary { created: 2, updated: 0, unchanged: 0 });

        let second = persist(&store, &[week("1", 1), week("2", 3), week("3", 3)]).unwrap();
        assert_eq!(second, UpsertSummary { created: 1, updated: 1, unchanged: 1 });
        assert_eq!(second.total(), 3);
    }

    #[test]
    fn load_skips_malformed_rows() {
        let store = MemoryStore::new();
        persist(&store, &[week("1", 1)]).unwrap();
        store
            .upsert(WEEK_TABLE, "broken", &Record::new().with("weekNum", 4))
            .unwrap();
        let weeks: Vec<Week> = load(&store, &Filter::new()).unwrap();
        assert_eq!(weeks, vec![week("1", 1)]);
    }
}
