// Season standings from completed matchups.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::aggregation::records::{Matchup, Week};
use crate::config::StandingsConfig;
use crate::stats::classify::SeasonPhase;

/// Win/loss record and ranks for one team over one season phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamRecord {
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    /// Wins that came from the home tie-break (subset of `wins`).
    pub home_tie_wins: u32,
    /// Losses that came from the home tie-break (subset of `losses`).
    pub home_tie_losses: u32,
    pub points: u32,
    /// Current run of identical results, e.g. `"3W"`. Empty with no games.
    pub streak: String,
    pub conference_rank: Option<u32>,
    pub wildcard_rank: Option<u32>,
    pub overall_rank: Option<u32>,
}

/// `3 * (wins - homeTieWins) + 2 * homeTieWins + homeTieLosses`.
pub fn standings_points(record: &TeamRecord) -> u32 {
    let clean_wins = record.wins.saturating_sub(record.home_tie_wins);
    3 * clean_wins + 2 * record.home_tie_wins + record.home_tie_losses
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Win,
    Loss,
    Tie,
}

impl GameResult {
    fn code(self) -> char {
        match self {
            GameResult::Win => 'W',
            GameResult::Loss => 'L',
            GameResult::Tie => 'T',
        }
    }
}

/// Run length and kind of the trailing identical results.
pub fn streak(results: &[GameResult]) -> String {
    let Some(last) = results.last() else {
        return String::new();
    };
    let n = results.iter().rev().take_while(|r| *r == last).count();
    format!("{n}{}", last.code())
}

/// Completed matchups of `season_id` played in `phase` weeks, in schedule
/// order (week number, then matchup id).
pub fn phase_matchups<'a>(
    matchups: &'a [Matchup],
    weeks: &[Week],
    season_id: &str,
    phase: SeasonPhase,
) -> Vec<&'a Matchup> {
    let week_meta: BTreeMap<&str, &Week> = weeks.iter().map(|w| (w.id.as_str(), w)).collect();
    let mut selected: Vec<(u32, &Matchup)> = matchups
        .iter()
        .filter(|m| m.is_complete && m.season_id == season_id)
        .filter_map(|m| {
            let week = week_meta.get(m.week_id.as_str());
            let week_phase = week.map_or(SeasonPhase::RegularSeason, |w| w.season_phase);
            (week_phase == phase).then(|| (week.map_or(0, |w| w.week_num), m))
        })
        .collect();
    selected.sort_by(|(wa, a), (wb, b)| wa.cmp(wb).then_with(|| a.id.cmp(&b.id)));
    selected.into_iter().map(|(_, m)| m).collect()
}

/// Outcome of a completed matchup for (home, away), plus whether the home
/// tie-break decided it. `None` when the scores are missing.
fn outcome(matchup: &Matchup) -> Option<(GameResult, GameResult, bool)> {
    if matchup.tie == Some(true) {
        return Some((GameResult::Tie, GameResult::Tie, false));
    }
    let (home, away) = (matchup.home_score?, matchup.away_score?);
    Some(match home.cmp(&away) {
        Ordering::Greater => (GameResult::Win, GameResult::Loss, false),
        Ordering::Less => (GameResult::Loss, GameResult::Win, false),
        Ordering::Equal => (GameResult::Win, GameResult::Loss, true),
    })
}

fn record_game(record: &mut TeamRecord, result: GameResult) {
    match result {
        GameResult::Win => record.wins += 1,
        GameResult::Loss => record.losses += 1,
        GameResult::Tie => record.ties += 1,
    }
}

fn standings_order(a: (&String, &TeamRecord), b: (&String, &TeamRecord)) -> Ordering {
    b.1.points
        .cmp(&a.1.points)
        .then_with(|| b.1.wins.cmp(&a.1.wins))
        .then_with(|| a.0.cmp(b.0))
}

fn ranked<'a>(entries: impl Iterator<Item = (&'a String, &'a TeamRecord)>) -> Vec<String> {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|a, b| standings_order(*a, *b));
    entries.into_iter().map(|(id, _)| id.clone()).collect()
}

/// Records and ranks for `teams` from `matchups` (already filtered to one
/// season phase, in schedule order). Games against teams outside the set
/// still count for the team inside it.
pub fn compute_standings(
    teams: &BTreeSet<String>,
    matchups: &[&Matchup],
    config: &StandingsConfig,
) -> BTreeMap<String, TeamRecord> {
    let mut records: BTreeMap<String, TeamRecord> =
        teams.iter().map(|t| (t.clone(), TeamRecord::default())).collect();
    let mut results: BTreeMap<String, Vec<GameResult>> = BTreeMap::new();

    for matchup in matchups {
        let Some((home, away, tie_break)) = outcome(matchup) else {
            warn!("completed matchup {} has no scores, skipping", matchup.id);
            continue;
        };
        if let Some(r) = records.get_mut(&matchup.home_team_id) {
            record_game(r, home);
            if tie_break {
                r.home_tie_wins += 1;
            }
            results.entry(matchup.home_team_id.clone()).or_default().push(home);
        }
        if let Some(r) = records.get_mut(&matchup.away_team_id) {
            record_game(r, away);
            if tie_break {
                r.home_tie_losses += 1;
            }
            results.entry(matchup.away_team_id.clone()).or_default().push(away);
        }
    }

    for (team, record) in records.iter_mut() {
        record.points = standings_points(record);
        record.streak = results.get(team).map(|r| streak(r)).unwrap_or_default();
    }

    for (i, team) in ranked(records.iter()).into_iter().enumerate() {
        if let Some(r) = records.get_mut(&team) {
            r.overall_rank = Some(i as u32 + 1);
        }
    }

    let mut conferences: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for team in records.keys() {
        if let Some(conf) = config.conferences.get(team) {
            conferences.entry(conf.as_str()).or_default().push(team.clone());
        }
    }
    let mut wildcard_pool: BTreeSet<String> = BTreeSet::new();
    for members in conferences.values() {
        let order = ranked(records.iter().filter(|(id, _)| members.contains(id)));
        for (i, team) in order.into_iter().enumerate() {
            if i >= config.wildcard_exclusions {
                wildcard_pool.insert(team.clone());
            }
            if let Some(r) = records.get_mut(&team) {
                r.conference_rank = Some(i as u32 + 1);
            }
        }
    }

    let wildcard_order = ranked(records.iter().filter(|(id, _)| wildcard_pool.contains(*id)));
    for (i, team) in wildcard_order.into_iter().enumerate() {
        if let Some(r) = records.get_mut(&team) {
            r.wildcard_rank = Some(i as u32 + 1);
        }
    }

    records
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
