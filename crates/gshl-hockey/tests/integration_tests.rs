// Integration tests for the GSHL stats engine.
//
// These exercise the public API end to end: CSV import and training, model
// persistence and ranking, and season rollups against both row-store
// backends.

use chrono::{TimeZone, Utc};
use gshl_core::{Filter, MemoryStore, Record, RowStore, SqliteStore};

use gshl_hockey::aggregation::persist::load;
use gshl_hockey::aggregation::pipeline::{rollup_season, score_week_matchups};
use gshl_hockey::aggregation::records::*;
use gshl_hockey::config::{StandingsConfig, TrainingConfig};
use gshl_hockey::ranking::engine::{grade, rank, rank_many};
use gshl_hockey::ranking::model::{load_model, save_model};
use gshl_hockey::ranking::trainer::{load_stat_lines, train_at};
use gshl_hockey::stats::import::load_stat_lines_from_reader;
use gshl_hockey::stats::schema::StatField;

// ===========================================================================
// Test helpers
// ===========================================================================

fn forward_day_csv(rows: usize) -> String {
    let mut csv = String::from("playerId,seasonId,posGroup,date,GP,G,A,SOG,HIT,BLK\n");
    for i in 0..rows {
        csv.push_str(&format!(
            "p{i},10,F,2024-10-{:02},1,{},{},{},{},\n",
            i % 28 + 1,
            i % 3,
            i % 2,
            i % 5 + 1,
            i % 4
        ));
    }
    csv
}

fn raw_day(
    player: &str,
    team: &str,
    pos: &str,
    week: &str,
    date: &str,
    stats: &[(&str, &str)],
) -> Record {
    stats.iter().fold(
        Record::new()
            .with("playerId", player)
            .with("gshlTeamId", team)
            .with("posGroup", pos)
            .with("seasonId", "10")
            .with("weekId", week)
            .with("date", date),
        |r, (k, v)| r.with(k, *v),
    )
}

/// Two teams, two regular-season weeks, one skater and one goalie each.
/// f1 is benched on Oct 8 and idle on Oct 15.
fn seed_season(store: &dyn RowStore) {
    for (id, num) in [("w1", 1), ("w2", 2)] {
        let week = Record::new()
            .with("id", id)
            .with("seasonId", "10")
            .with("weekNum", num)
            .with("seasonPhase", "RS");
        store.upsert(WEEK_TABLE, id, &week).unwrap();
    }

    let dates = [
        ("w1", "2024-10-07"),
        ("w1", "2024-10-08"),
        ("w1", "2024-10-09"),
        ("w2", "2024-10-14"),
        ("w2", "2024-10-15"),
        ("w2", "2024-10-16"),
    ];
    for (week, date) in dates {
        let f1_gs = if date == "2024-10-08" { "0" } else { "1" };
        let f1_gp = if date == "2024-10-15" { "0" } else { "1" };
        let f1 = [("GP", f1_gp), ("GS", f1_gs), ("G", "1"), ("SOG", "3"), ("HIT", "2")];
        let g1 = [("GP", "1"), ("GS", "1"), ("W", "1"), ("GA", "2"), ("SV", "28"), ("SA", "30")];
        let f2 = [("GP", "1"), ("GS", "1"), ("SOG", "4"), ("HIT", "1"), ("BLK", "2")];
        let g2 = [("GP", "1"), ("GS", "1"), ("GA", "3"), ("SV", "25"), ("SA", "28")];
        let days = [
            raw_day("f1", "t1", "F", week, date, &f1),
            raw_day("g1", "t1", "G", week, date, &g1),
            raw_day("f2", "t2", "F", week, date, &f2),
            raw_day("g2", "t2", "G", week, date, &g2),
        ];
        for day in days {
            let player = day.get_str("playerId").unwrap();
            let team = day.get_str("gshlTeamId").unwrap();
            let key = format!("{player}|{team}|{date}");
            store.upsert(PLAYER_DAY_TABLE, &key, &day).unwrap();
        }
    }

    for (id, week, home, away) in [("m1", "w1", "t1", "t2"), ("m2", "w2", "t2", "t1")] {
        let matchup = Record::new()
            .with("id", id)
            .with("seasonId", "10")
            .with("weekId", week)
            .with("homeTeamId", home)
            .with("awayTeamId", away)
            .with("isComplete", false);
        store.upsert(MATCHUP_TABLE, id, &matchup).unwrap();
    }
}

fn run_season(store: &dyn RowStore) {
    seed_season(store);
    let config = StandingsConfig::default();

    let first = rollup_season(store, "10", &config).unwrap();
    assert_eq!(first.get(PLAYER_WEEK_TABLE).created, 8);
    assert_eq!(first.get(PLAYER_SPLIT_TABLE).created, 4);
    assert_eq!(first.get(PLAYER_TOTAL_TABLE).created, 4);
    assert_eq!(first.get(TEAM_DAY_TABLE).created, 12);
    assert_eq!(first.get(TEAM_WEEK_TABLE).created, 4);
    assert_eq!(first.get(TEAM_SEASON_TABLE).created, 2);

    // GS gating: the benched day adds GP but not goals; the idle day is gone.
    let f1_weeks: Vec<PlayerWeek> = load(store, &Filter::new().field("playerId", "f1")).unwrap();
    let w1 = f1_weeks.iter().find(|w| w.week_id == "w1").unwrap();
    assert_eq!(w1.days, 3);
    assert_eq!(w1.stats.get(StatField::GP), 3.0);
    assert_eq!(w1.stats.get(StatField::GS), 2.0);
    assert_eq!(w1.stats.get(StatField::G), 2.0);
    let w2 = f1_weeks.iter().find(|w| w.week_id == "w2").unwrap();
    assert_eq!(w2.days, 2);

    // Nothing has been played yet.
    let seasons: Vec<TeamSeason> = load(store, &Filter::new()).unwrap();
    assert!(seasons.iter().all(|s| s.record.wins + s.record.losses == 0));

    assert_eq!(score_week_matchups(store, "w1").unwrap().updated, 1);
    assert_eq!(score_week_matchups(store, "w2").unwrap().updated, 1);
    let matchups: Vec<Matchup> = load(store, &Filter::new()).unwrap();
    assert!(matchups.iter().all(|m| m.is_complete && m.home_score.is_some()));

    let second = rollup_season(store, "10", &config).unwrap();
    assert_eq!(second.get(PLAYER_WEEK_TABLE).unchanged, 8);
    assert_eq!(second.get(TEAM_WEEK_TABLE).unchanged, 4);
    assert_eq!(second.get(TEAM_SEASON_TABLE).updated, 2);

    let seasons: Vec<TeamSeason> = load(store, &Filter::new().field("seasonType", "RS")).unwrap();
    assert_eq!(seasons.len(), 2);
    let total_wins: u32 = seasons.iter().map(|s| s.record.wins).sum();
    assert_eq!(total_wins, 2);
    for s in &seasons {
        assert_eq!(s.record.wins + s.record.losses, 2);
        assert!(!s.record.streak.is_empty());
        assert!(s.record.overall_rank.is_some());
    }

    // A third identical run changes nothing.
    let third = rollup_season(store, "10", &config).unwrap();
    for summary in third.tables.values() {
        assert_eq!(summary.created + summary.updated, 0);
    }
    assert_eq!(store.count(TEAM_SEASON_TABLE, &Filter::new()).unwrap(), 2);
    assert_eq!(store.count(PLAYER_WEEK_TABLE, &Filter::new()).unwrap(), 8);
}

// ===========================================================================
// Training and ranking
// ===========================================================================

#[test]
fn csv_import_trains_and_ranks() {
    let lines = load_stat_lines_from_reader(forward_day_csv(60).as_bytes()).unwrap();
    assert_eq!(lines.len(), 60);

    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 45).unwrap();
    let model = train_at(&lines, &TrainingConfig::default(), ts);
    assert!(model.get("RS:10:playerDay:F").is_some());

    let results = rank_many(&lines, &model);
    assert_eq!(results.len(), 60);
    for result in &results {
        let result = result.as_ref().unwrap();
        assert_eq!(result.model_key, "RS:10:playerDay:F");
        assert!((0.0..=100.0).contains(&result.score));
        assert!(!grade(result.score).label().is_empty());
    }
}

#[test]
fn persisted_model_ranks_identically() {
    let lines = load_stat_lines_from_reader(forward_day_csv(75).as_bytes()).unwrap();
    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 45).unwrap();
    let model = train_at(&lines, &TrainingConfig::default(), ts);

    let path = std::env::temp_dir().join("gshl_integration_model.json");
    save_model(&model, &path).unwrap();
    let loaded = load_model(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded, model);
    for line in lines.iter().take(10) {
        assert_eq!(rank(line, &loaded).unwrap(), rank(line, &model).unwrap());
    }
}

#[test]
fn trains_from_store_tables() {
    let store = SqliteStore::open(":memory:").unwrap();
    let lines = load_stat_lines_from_reader(forward_day_csv(55).as_bytes()).unwrap();
    for (i, line) in lines.iter().enumerate() {
        store.upsert(PLAYER_DAY_TABLE, &i.to_string(), line).unwrap();
    }
    let season = Filter::new().field("seasonId", 10);
    let loaded = load_stat_lines(&store, &[PLAYER_DAY_TABLE], &season).unwrap();
    assert_eq!(loaded.len(), 55);
    let ts = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
    let model = train_at(&loaded, &TrainingConfig::default(), ts);
    assert_eq!(model.total_samples, 55);
}

// ===========================================================================
// Rollups
// ===========================================================================

#[test]
fn season_rollup_in_memory() {
    run_season(&MemoryStore::new());
}

#[test]
fn season_rollup_in_sqlite() {
    run_season(&SqliteStore::open(":memory:").unwrap());
}
