// Team hierarchy edges. Outputs come back in natural-key order.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::aggregation::records::{Matchup, PlayerDay, TeamDay, TeamSeason, TeamWeek, Week};
use crate::aggregation::standings::{compute_standings, phase_matchups, TeamRecord};
use crate::aggregation::{add_day, add_rollup, PhaseLookup};
use crate::config::StandingsConfig;
use crate::stats::classify::{PosGroup, SeasonPhase};
use crate::stats::schema::{ParsedStats, StatField};

/// Player day lines to team days. Only started players' counting stats
/// reach the team; goalie starts become the team's GAA denominator.
pub fn player_days_to_team_days(days: &[PlayerDay]) -> Vec<TeamDay> {
    let mut groups: BTreeMap<(&str, NaiveDate), Vec<&PlayerDay>> = BTreeMap::new();
    for day in days {
        groups
            .entry((day.gshl_team_id.as_str(), day.date))
            .or_default()
            .push(day);
    }

    groups
        .into_iter()
        .map(|((gshl_team_id, date), members)| {
            let mut stats = ParsedStats::default();
            let mut goalie_starts = 0.0;
            for d in &members {
                add_day(&mut stats, &d.stats);
                goalie_starts += goalie_starts_of(d);
            }
            stats.recompute_rates(goalie_starts);
            TeamDay {
                gshl_team_id: gshl_team_id.to_string(),
                season_id: members[0].season_id.clone(),
                week_id: members[0].week_id.clone(),
                date,
                goalie_starts,
                stats,
            }
        })
        .collect()
}

/// Starts a day contributes to the GAA denominator. Lines without a
/// position count as goalie lines when they carry shots or saves.
fn goalie_starts_of(day: &PlayerDay) -> f64 {
    let faced_shots = day.stats.get(StatField::SA) > 0.0 || day.stats.get(StatField::SV) > 0.0;
    match day.pos_group {
        Some(PosGroup::Goalie) => day.stats.get(StatField::GS),
        None if faced_shots => day.stats.get(StatField::GS),
        _ => 0.0,
    }
}

/// Team days to team weeks.
pub fn team_days_to_team_weeks(days: &[TeamDay]) -> Vec<TeamWeek> {
    let mut groups: BTreeMap<(&str, &str), Vec<&TeamDay>> = BTreeMap::new();
    for day in days {
        groups
            .entry((day.gshl_team_id.as_str(), day.week_id.as_str()))
            .or_default()
            .push(day);
    }

    groups
        .into_iter()
        .map(|((gshl_team_id, week_id), mut members)| {
            members.sort_by_key(|d| d.date);
            let mut stats = ParsedStats::default();
            for d in &members {
                add_rollup(&mut stats, &d.stats);
            }
            let goalie_starts = members.iter().map(|d| d.goalie_starts).sum();
            stats.recompute_rates(goalie_starts);
            TeamWeek {
                gshl_team_id: gshl_team_id.to_string(),
                season_id: members[0].season_id.clone(),
                week_id: week_id.to_string(),
                days: members.len() as u32,
                goalie_starts,
                stats,
            }
        })
        .collect()
}

/// Team weeks to team seasons, one per team, season and phase, each with
/// its standings record from the completed matchups of that phase.
pub fn team_weeks_to_seasons(
    weeks: &[TeamWeek],
    schedule: &[Week],
    matchups: &[Matchup],
    config: &StandingsConfig,
) -> Vec<TeamSeason> {
    let lookup = PhaseLookup::new(schedule);
    let mut groups: BTreeMap<(&str, &str, SeasonPhase), Vec<&TeamWeek>> = BTreeMap::new();
    let mut teams_by_phase: BTreeMap<(&str, SeasonPhase), BTreeSet<String>> = BTreeMap::new();
    for week in weeks {
        let phase = lookup.phase(&week.week_id);
        groups
            .entry((week.gshl_team_id.as_str(), week.season_id.as_str(), phase))
            .or_default()
            .push(week);
        teams_by_phase
            .entry((week.season_id.as_str(), phase))
            .or_default()
            .insert(week.gshl_team_id.clone());
    }

    let standings: BTreeMap<(&str, SeasonPhase), BTreeMap<String, TeamRecord>> = teams_by_phase
        .into_iter()
        .map(|((season_id, phase), teams)| {
            let games = phase_matchups(matchups, schedule, season_id, phase);
            ((season_id, phase), compute_standings(&teams, &games, config))
        })
        .collect();

    groups
        .into_iter()
        .map(|((gshl_team_id, season_id, season_type), members)| {
            let mut stats = ParsedStats::default();
            for w in &members {
                add_rollup(&mut stats, &w.stats);
            }
            let goalie_starts = members.iter().map(|w| w.goalie_starts).sum();
            stats.recompute_rates(goalie_starts);
            let record = standings
                .get(&(season_id, season_type))
                .and_then(|s| s.get(gshl_team_id))
                .cloned()
                .unwrap_or_default();
            TeamSeason {
                gshl_team_id: gshl_team_id.to_string(),
                season_id: season_id.to_string(),
                season_type,
                goalie_starts,
                stats,
                record,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
