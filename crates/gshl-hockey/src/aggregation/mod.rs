// Aggregation pipeline: rolls day lines up the player and team
// hierarchies and derives team standings.
//
//   PlayerDay -> PlayerWeek -> PlayerSplit / PlayerTotal
//   PlayerDay -> TeamDay -> TeamWeek -> TeamSeason
//
// Every edge is a pure function over already-fetched rows; `pipeline` wires
// them to a row store.

pub mod persist;
pub mod pipeline;
pub mod player;
pub mod records;
pub mod standings;
pub mod team;

use std::collections::BTreeMap;

use tracing::debug;

use crate::aggregation::records::{PlayerDay, Week};
use crate::stats::classify::SeasonPhase;
use crate::stats::schema::{ParsedStats, StatField};

/// Drop days with no games played. Applied once to raw day lines, before
/// any edge runs.
pub fn active_days(days: Vec<PlayerDay>) -> Vec<PlayerDay> {
    let before = days.len();
    let active: Vec<PlayerDay> = days
        .into_iter()
        .filter(|d| d.stats.get(StatField::GP) > 0.0)
        .collect();
    debug!("{} of {before} day lines active", active.len());
    active
}

/// Add one day line into a rollup. Participation counters always count;
/// every other counting stat only counts on days the player started.
pub(crate) fn add_day(total: &mut ParsedStats, day: &ParsedStats) {
    let started = day.get(StatField::GS) > 0.0;
    for field in StatField::ALL {
        if field.is_rate() {
            continue;
        }
        if started || field.is_participation() {
            total.add(field, day.get(field));
        }
    }
}

/// Add an already-gated rollup into a larger one.
pub(crate) fn add_rollup(total: &mut ParsedStats, part: &ParsedStats) {
    for field in StatField::ALL {
        if !field.is_rate() {
            total.add(field, part.get(field));
        }
    }
}

/// Week id -> phase from schedule metadata.
pub(crate) struct PhaseLookup<'a> {
    weeks: BTreeMap<&'a str, &'a Week>,
}

impl<'a> PhaseLookup<'a> {
    pub(crate) fn new(schedule: &'a [Week]) -> Self {
        Self {
            weeks: schedule.iter().map(|w| (w.id.as_str(), w)).collect(),
        }
    }

    /// Phase of a week; weeks missing from the schedule are regular season.
    pub(crate) fn phase(&self, week_id: &str) -> SeasonPhase {
        self.weeks
            .get(week_id)
            .map_or(SeasonPhase::RegularSeason, |w| w.season_phase)
    }

    /// Schedule position of a week, for ordering; unknown weeks sort first.
    pub(crate) fn week_num(&self, week_id: &str) -> u32 {
        self.weeks.get(week_id).map_or(0, |w| w.week_num)
    }
}
