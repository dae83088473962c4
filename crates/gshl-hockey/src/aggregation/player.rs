// Player hierarchy edges. Outputs come back in natural-key order.

use std::collections::{BTreeMap, BTreeSet};

use crate::aggregation::records::{PlayerDay, PlayerSplit, PlayerTotal, PlayerWeek, Week};
use crate::aggregation::{add_day, add_rollup, PhaseLookup};
use crate::stats::classify::{PosGroup, SeasonPhase};
use crate::stats::schema::{ParsedStats, StatField};

fn latest_pos(groups: impl DoubleEndedIterator<Item = Option<PosGroup>>) -> Option<PosGroup> {
    groups.rev().flatten().next()
}

fn finish(mut stats: ParsedStats) -> ParsedStats {
    let starts = stats.get(StatField::GS);
    stats.recompute_rates(starts);
    stats
}

/// Day lines to weeks, grouped by player, week and fantasy team. Expects
/// [`active_days`](crate::aggregation::active_days) to have run.
pub fn player_days_to_weeks(days: &[PlayerDay]) -> Vec<PlayerWeek> {
    let mut groups: BTreeMap<(&str, &str, &str), Vec<&PlayerDay>> = BTreeMap::new();
    for day in days {
        groups
            .entry((day.player_id.as_str(), day.week_id.as_str(), day.gshl_team_id.as_str()))
            .or_default()
            .push(day);
    }

    groups
        .into_iter()
        .map(|((player_id, week_id, gshl_team_id), mut members)| {
            members.sort_by_key(|d| d.date);
            let mut stats = ParsedStats::default();
            for d in &members {
                add_day(&mut stats, &d.stats);
            }
            PlayerWeek {
                player_id: player_id.to_string(),
                gshl_team_id: gshl_team_id.to_string(),
                season_id: members[0].season_id.clone(),
                week_id: week_id.to_string(),
                pos_group: latest_pos(members.iter().map(|d| d.pos_group)),
                days: members.len() as u32,
                stats: finish(stats),
            }
        })
        .collect()
}

fn sort_by_schedule(members: &mut [&PlayerWeek], lookup: &PhaseLookup<'_>) {
    members.sort_by(|a, b| {
        lookup
            .week_num(&a.week_id)
            .cmp(&lookup.week_num(&b.week_id))
            .then_with(|| a.week_id.cmp(&b.week_id))
            .then_with(|| a.gshl_team_id.cmp(&b.gshl_team_id))
    });
}

/// Weeks to per-team season splits, grouped by player, season, team and
/// the week's phase from `schedule`.
pub fn player_weeks_to_splits(weeks: &[PlayerWeek], schedule: &[Week]) -> Vec<PlayerSplit> {
    let lookup = PhaseLookup::new(schedule);
    let mut groups: BTreeMap<(&str, &str, &str, SeasonPhase), Vec<&PlayerWeek>> = BTreeMap::new();
    for week in weeks {
        let phase = lookup.phase(&week.week_id);
        groups
            .entry((
                week.player_id.as_str(),
                week.season_id.as_str(),
                week.gshl_team_id.as_str(),
                phase,
            ))
            .or_default()
            .push(week);
    }

    groups
        .into_iter()
        .map(|((player_id, season_id, gshl_team_id, season_type), mut members)| {
            sort_by_schedule(&mut members, &lookup);
            let mut stats = ParsedStats::default();
            for w in &members {
                add_rollup(&mut stats, &w.stats);
            }
            PlayerSplit {
                player_id: player_id.to_string(),
                gshl_team_id: gshl_team_id.to_string(),
                season_id: season_id.to_string(),
                season_type,
                pos_group: latest_pos(members.iter().map(|w| w.pos_group)),
                days: members.iter().map(|w| w.days).sum(),
                stats: finish(stats),
            }
        })
        .collect()
}

/// Weeks to season totals across every fantasy team, grouped by player,
/// season and phase.
pub fn player_weeks_to_totals(weeks: &[PlayerWeek], schedule: &[Week]) -> Vec<PlayerTotal> {
    let lookup = PhaseLookup::new(schedule);
    let mut groups: BTreeMap<(&str, &str, SeasonPhase), Vec<&PlayerWeek>> = BTreeMap::new();
    for week in weeks {
        let phase = lookup.phase(&week.week_id);
        groups
            .entry((week.player_id.as_str(), week.season_id.as_str(), phase))
            .or_default()
            .push(week);
    }

    groups
        .into_iter()
        .map(|((player_id, season_id, season_type), mut members)| {
            sort_by_schedule(&mut members, &lookup);
            let mut stats = ParsedStats::default();
            for w in &members {
                add_rollup(&mut stats, &w.stats);
            }
            let teams: BTreeSet<&str> = members.iter().map(|w| w.gshl_team_id.as_str()).collect();
            PlayerTotal {
                player_id: player_id.to_string(),
                gshl_team_ids: teams.into_iter().map(str::to_string).collect(),
                season_id: season_id.to_string(),
                season_type,
                pos_group: latest_pos(members.iter().map(|w| w.pos_group)),
                days: members.iter().map(|w| w.days).sum(),
                stats: finish(stats),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn day(player: &str, team: &str, week: &str, d: u32, stats: ParsedStats) -> PlayerDay {
        PlayerDay {
            player_id: player.into(),
            gshl_team_id: team.into(),
            season_id: "10".into(),
            week_id: week.into(),
            date: NaiveDate::from_ymd_opt(2024, 10, d).unwrap(),
            pos_group: Some(PosGroup::Forward),
            stats,
        }
    }

    fn line(gp: f64, gs: f64) -> ParsedStats {
        ParsedStats::default()
            .with(StatField::GP, gp)
            .with(StatField::MG, 1.0 - gs)
            .with(StatField::GS, gs)
    }

    #[test]
    fn bench_days_only_add_participation() {
        let started = line(1.0, 1.0)
            .with(StatField::G, 2.0)
            .with(StatField::SOG, 5.0)
            .with(StatField::HIT, 1.0);
        let benched = line(1.0, 0.0)
            .with(StatField::G, 1.0)
            .with(StatField::SOG, 4.0)
            .with(StatField::BLK, 3.0);
        let weeks = player_days_to_weeks(&[
            day("p1", "t1", "3", 14, started),
            day("p1", "t1", "3", 15, benched),
        ]);
        assert_eq!(weeks.len(), 1);
        let w = &weeks[0];
        assert_eq!(w.days, 2);
        assert_eq!(w.stats.get(StatField::GP), 2.0);
        assert_eq!(w.stats.get(StatField::MG), 1.0);
        assert_eq!(w.stats.get(StatField::GS), 1.0);
        assert_eq!(w.stats.get(StatField::G), 2.0);
        assert_eq!(w.stats.get(StatField::SOG), 5.0);
        assert_eq!(w.stats.get(StatField::BLK), 0.0);
    }

    #[test]
    fn weeks_group_by_team_and_sort_by_key() {
        let s = line(1.0, 1.0).with(StatField::G, 1.0);
        let weeks = player_days_to_weeks(&[
            day("p2", "t1", "3", 14, s),
            day("p1", "t2", "3", 16, s),
            day("p1", "t1", "3", 14, s),
            day("p1", "t1", "4", 21, s),
        ]);
        let keys: Vec<(&str, &str, &str)> = weeks
            .iter()
            .map(|w| (w.player_id.as_str(), w.week_id.as_str(), w.gshl_team_id.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![("p1", "3", "t1"), ("p1", "3", "t2"), ("p1", "4", "t1"), ("p2", "3", "t1")]
        );
    }

    #[test]
    fn goalie_rates_recomputed_from_components() {
        let g1 = line(1.0, 1.0)
            .with(StatField::GA, 2.0)
            .with(StatField::GAA, 2.0)
            .with(StatField::SV, 28.0)
            .with(StatField::SA, 30.0)
            .with(StatField::SVP, 28.0 / 30.0);
        let g2 = line(1.0, 1.0)
            .with(StatField::GA, 5.0)
            .with(StatField::GAA, 5.0)
            .with(StatField::SV, 15.0)
            .with(StatField::SA, 20.0)
            .with(StatField::SVP, 0.75);
        let weeks =
            player_days_to_weeks(&[day("g1", "t1", "3", 14, g1), day("g1", "t1", "3", 15, g2)]);
        let w = &weeks[0].stats;
        assert!(approx_eq(w.get(StatField::GAA), 3.5, 1e-12));
        assert!(approx_eq(w.get(StatField::SVP), 43.0 / 50.0, 1e-12));
    }

    fn week(player: &str, team: &str, week: &str, goals: f64, days: u32) -> PlayerWeek {
        PlayerWeek {
            player_id: player.into(),
            gshl_team_id: team.into(),
            season_id: "10".into(),
            week_id: week.into(),
            pos_group: Some(PosGroup::Defense),
            days,
            stats: ParsedStats::default()
                .with(StatField::GS, days as f64)
                .with(StatField::G, goals),
        }
    }

    fn schedule() -> Vec<Week> {
        vec![
            Week {
                id: "1".into(),
                season_id: "10".into(),
                week_num: 1,
                season_phase: SeasonPhase::RegularSeason,
            },
            Week {
                id: "2".into(),
                season_id: "10".into(),
                week_num: 2,
                season_phase: SeasonPhase::RegularSeason,
            },
            Week {
                id: "20".into(),
                season_id: "10".into(),
                week_num: 20,
                season_phase: SeasonPhase::Playoffs,
            },
        ]
    }

    #[test]
    fn splits_separate_teams_and_phases() {
        let weeks = [
            week("p1", "t1", "1", 1.0, 3),
            week("p1", "t1", "2", 2.0, 4),
            week("p1", "t2", "2", 5.0, 1),
            week("p1", "t1", "20", 3.0, 2),
        ];
        let splits = player_weeks_to_splits(&weeks, &schedule());
        assert_eq!(splits.len(), 3);
        let rs_t1 = splits
            .iter()
            .find(|s| s.gshl_team_id == "t1" && s.season_type == SeasonPhase::RegularSeason)
            .unwrap();
        assert_eq!(rs_t1.stats.get(StatField::G), 3.0);
        assert_eq!(rs_t1.days, 7);
        assert!(splits
            .iter()
            .any(|s| s.gshl_team_id == "t1" && s.season_type == SeasonPhase::Playoffs));
    }

    #[test]
    fn totals_merge_teams() {
        let weeks = [
            week("p1", "t2", "1", 1.0, 3),
            week("p1", "t1", "2", 2.0, 4),
            week("p1", "t2", "2", 5.0, 1),
            week("p1", "t1", "20", 3.0, 2),
        ];
        let totals = player_weeks_to_totals(&weeks, &schedule());
        assert_eq!(totals.len(), 2);
        let rs = &totals[0];
        assert_eq!(rs.season_type, SeasonPhase::RegularSeason);
        assert_eq!(rs.gshl_team_ids, vec!["t1".to_string(), "t2".to_string()]);
        assert_eq!(rs.stats.get(StatField::G), 8.0);
        assert_eq!(rs.days, 8);
        assert_eq!(rs.pos_group, Some(PosGroup::Defense));
        assert_eq!(totals[1].season_type, SeasonPhase::Playoffs);
        assert_eq!(totals[1].gshl_team_ids, vec!["t1".to_string()]);
    }

    #[test]
    fn unknown_week_counts_as_regular_season() {
        let totals = player_weeks_to_totals(&[week("p1", "t1", "99", 1.0, 1)], &[]);
        assert_eq!(totals[0].season_type, SeasonPhase::RegularSeason);
    }
}
