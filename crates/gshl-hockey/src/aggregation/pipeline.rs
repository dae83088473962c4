// Store-backed rollup runs. Each run reads everything it needs, computes
// every edge in memory, then upserts; nothing is deleted.

use std::collections::BTreeMap;

use anyhow::Context;
use gshl_core::{Filter, RowStore};
use tracing::{info, warn};

use crate::aggregation::active_days;
use crate::aggregation::persist::{load, persist, UpsertSummary};
use crate::aggregation::player::{
    player_days_to_weeks, player_weeks_to_splits, player_weeks_to_totals,
};
use crate::aggregation::records::{Matchup, PlayerDay, StoredRow, TeamWeek, Week};
use crate::aggregation::team::{
    player_days_to_team_days, team_days_to_team_weeks, team_weeks_to_seasons,
};
use crate::config::StandingsConfig;
use crate::matchup::{apply_to_matchup, score_matchup};

/// Upsert tallies per target table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupSummary {
    pub tables: BTreeMap<&'static str, UpsertSummary>,
}

impl RollupSummary {
    fn add<T: StoredRow>(&mut self, store: &dyn RowStore, rows: &[T]) -> anyhow::Result<()> {
        let summary = persist(store, rows)?;
        self.tables.insert(T::TABLE, summary);
        Ok(())
    }

    pub fn get(&self, table: &str) -> UpsertSummary {
        self.tables.get(table).copied().unwrap_or_default()
    }
}

/// Roll one season's day lines all the way up: player weeks, splits and
/// totals, team days, weeks and seasons with standings.
///
/// Callers must not run two rollups over the same season concurrently.
pub fn rollup_season(
    store: &dyn RowStore,
    season_id: &str,
    config: &StandingsConfig,
) -> anyhow::Result<RollupSummary> {
    let filter = Filter::new().field("seasonId", season_id);
    let schedule: Vec<Week> = load(store, &filter).context("failed to load schedule")?;
    let days: Vec<PlayerDay> = load(store, &filter).context("failed to load day lines")?;
    let matchups: Vec<Matchup> = load(store, &filter).context("failed to load matchups")?;
    let days = active_days(days);

    let player_weeks = player_days_to_weeks(&days);
    let splits = player_weeks_to_splits(&player_weeks, &schedule);
    let totals = player_weeks_to_totals(&player_weeks, &schedule);
    let team_days = player_days_to_team_days(&days);
    let team_weeks = team_days_to_team_weeks(&team_days);
    let team_seasons = team_weeks_to_seasons(&team_weeks, &schedule, &matchups, config);

    let mut summary = RollupSummary::default();
    summary.add(store, &player_weeks)?;
    summary.add(store, &splits)?;
    summary.add(store, &totals)?;
    summary.add(store, &team_days)?;
    summary.add(store, &team_weeks)?;
    summary.add(store, &team_seasons)?;

    info!(
        "season {season_id} rolled up: {} day lines -> {} player weeks, {} team weeks",
        days.len(),
        player_weeks.len(),
        team_weeks.len()
    );
    Ok(summary)
}

/// Score every matchup of a week from its team-week rows and mark them
/// complete. Matchups missing either side's week are left untouched.
pub fn score_week_matchups(store: &dyn RowStore, week_id: &str) -> anyhow::Result<UpsertSummary> {
    let filter = Filter::new().field("weekId", week_id);
    let team_weeks: Vec<TeamWeek> = load(store, &filter)?;
    let matchups: Vec<Matchup> = load(store, &filter)?;
    let by_team: BTreeMap<&str, &TeamWeek> = team_weeks
        .iter()
        .map(|w| (w.gshl_team_id.as_str(), w))
        .collect();

    let mut scored = Vec::with_capacity(matchups.len());
    for mut matchup in matchups {
        let home = by_team.get(matchup.home_team_id.as_str());
        let away = by_team.get(matchup.away_team_id.as_str());
        let (Some(home), Some(away)) = (home, away) else {
            warn!("matchup {} is missing a team week, not scoring", matchup.id);
            continue;
        };
        apply_to_matchup(&mut matchup, score_matchup(home, away));
        scored.push(matchup);
    }
    persist(store, &scored)
}
