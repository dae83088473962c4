// Typed aggregate rows and their mapping to and from store records.

use chrono::NaiveDate;
use gshl_core::Record;
use thiserror::Error;

use crate::aggregation::standings::TeamRecord;
use crate::stats::classify::{PosGroup, SeasonPhase};
use crate::stats::schema::{parse_stats, ParsedStats};

// ---------------------------------------------------------------------------
// Row trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("invalid value {value:?} for field `{field}`")]
    InvalidField { field: &'static str, value: String },
}

/// A typed row that lives in one row-store table under a natural key.
pub trait StoredRow: Sized {
    const TABLE: &'static str;

    /// Natural-key fields joined with `|`. Upserts match on this.
    fn natural_key(&self) -> String;

    fn to_record(&self) -> Record;

    fn from_record(record: &Record) -> Result<Self, RowError>;
}

fn join_key(parts: &[&str]) -> String {
    parts.join("|")
}

fn required(record: &Record, field: &'static str) -> Result<String, RowError> {
    record.get_str(field).ok_or(RowError::MissingField { field })
}

fn required_date(record: &Record, field: &'static str) -> Result<NaiveDate, RowError> {
    let raw = required(record, field)?;
    raw.parse::<NaiveDate>()
        .map_err(|_| RowError::InvalidField { field, value: raw })
}

fn required_phase(record: &Record, field: &'static str) -> Result<SeasonPhase, RowError> {
    let raw = required(record, field)?;
    SeasonPhase::parse(&raw).ok_or(RowError::InvalidField { field, value: raw })
}

fn pos_group(record: &Record) -> Option<PosGroup> {
    record
        .get_str("posGroup")
        .or_else(|| record.get_str("position"))
        .and_then(|raw| PosGroup::parse_player(&raw))
}

fn count(record: &Record, field: &str) -> u32 {
    record
        .get_f64(field)
        .filter(|v| *v >= 0.0)
        .map_or(0, |v| v.round() as u32)
}

fn optional_count(record: &Record, field: &str) -> Option<u32> {
    record
        .get_f64(field)
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u32)
}

fn stats_record(stats: &ParsedStats) -> Record {
    let mut record = Record::new();
    stats.write_into(&mut record);
    record
}

// ---------------------------------------------------------------------------
// Table names
// ---------------------------------------------------------------------------

pub const PLAYER_DAY_TABLE: &str = "PlayerDayStatLine";
pub const PLAYER_WEEK_TABLE: &str = "PlayerWeekStatLine";
pub const PLAYER_SPLIT_TABLE: &str = "PlayerSplitStatLine";
pub const PLAYER_TOTAL_TABLE: &str = "PlayerTotalStatLine";
pub const TEAM_DAY_TABLE: &str = "TeamDayStatLine";
pub const TEAM_WEEK_TABLE: &str = "TeamWeekStatLine";
pub const TEAM_SEASON_TABLE: &str = "TeamSeasonStatLine";
pub const WEEK_TABLE: &str = "Week";
pub const MATCHUP_TABLE: &str = "Matchup";

// ---------------------------------------------------------------------------
// Player rows
// ---------------------------------------------------------------------------

/// One player's line for one calendar day on one fantasy roster.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerDay {
    pub player_id: String,
    pub gshl_team_id: String,
    pub season_id: String,
    pub week_id: String,
    pub date: NaiveDate,
    pub pos_group: Option<PosGroup>,
    pub stats: ParsedStats,
}

impl StoredRow for PlayerDay {
    const TABLE: &'static str = PLAYER_DAY_TABLE;

    fn natural_key(&self) -> String {
        join_key(&[&self.player_id, &self.gshl_team_id, &self.date.to_string()])
    }

    fn to_record(&self) -> Record {
        let mut record = stats_record(&self.stats)
            .with("playerId", self.player_id.as_str())
            .with("gshlTeamId", self.gshl_team_id.as_str())
            .with("seasonId", self.season_id.as_str())
            .with("weekId", self.week_id.as_str())
            .with("date", self.date.to_string());
        if let Some(pos) = self.pos_group {
            record.set("posGroup", pos.code());
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        Ok(Self {
            player_id: required(record, "playerId")?,
            gshl_team_id: required(record, "gshlTeamId")?,
            season_id: required(record, "seasonId")?,
            week_id: required(record, "weekId")?,
            date: required_date(record, "date")?,
            pos_group: pos_group(record),
            stats: parse_stats(record),
        })
    }
}

/// A player's week on one fantasy roster.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerWeek {
    pub player_id: String,
    pub gshl_team_id: String,
    pub season_id: String,
    pub week_id: String,
    pub pos_group: Option<PosGroup>,
    /// Active days rolled into this week.
    pub days: u32,
    pub stats: ParsedStats,
}

impl StoredRow for PlayerWeek {
    const TABLE: &'static str = PLAYER_WEEK_TABLE;

    fn natural_key(&self) -> String {
        join_key(&[&self.player_id, &self.week_id, &self.gshl_team_id])
    }

    fn to_record(&self) -> Record {
        let mut record = stats_record(&self.stats)
            .with("playerId", self.player_id.as_str())
            .with("gshlTeamId", self.gshl_team_id.as_str())
            .with("seasonId", self.season_id.as_str())
            .with("weekId", self.week_id.as_str())
            .with("days", self.days);
        if let Some(pos) = self.pos_group {
            record.set("posGroup", pos.code());
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        Ok(Self {
            player_id: required(record, "playerId")?,
            gshl_team_id: required(record, "gshlTeamId")?,
            season_id: required(record, "seasonId")?,
            week_id: required(record, "weekId")?,
            pos_group: pos_group(record),
            days: count(record, "days"),
            stats: parse_stats(record),
        })
    }
}

/// A player's season phase with one fantasy team.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSplit {
    pub player_id: String,
    pub gshl_team_id: String,
    pub season_id: String,
    pub season_type: SeasonPhase,
    pub pos_group: Option<PosGroup>,
    pub days: u32,
    pub stats: ParsedStats,
}

impl StoredRow for PlayerSplit {
    const TABLE: &'static str = PLAYER_SPLIT_TABLE;

    fn natural_key(&self) -> String {
        join_key(&[
            &self.player_id,
            &self.season_id,
            &self.gshl_team_id,
            self.season_type.code(),
        ])
    }

    fn to_record(&self) -> Record {
        let mut record = stats_record(&self.stats)
            .with("playerId", self.player_id.as_str())
            .with("gshlTeamId", self.gshl_team_id.as_str())
            .with("seasonId", self.season_id.as_str())
            .with("seasonType", self.season_type.code())
            .with("days", self.days);
        if let Some(pos) = self.pos_group {
            record.set("posGroup", pos.code());
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        Ok(Self {
            player_id: required(record, "playerId")?,
            gshl_team_id: required(record, "gshlTeamId")?,
            season_id: required(record, "seasonId")?,
            season_type: required_phase(record, "seasonType")?,
            pos_group: pos_group(record),
            days: count(record, "days"),
            stats: parse_stats(record),
        })
    }
}

/// A player's season phase across every fantasy team they played for.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerTotal {
    pub player_id: String,
    /// Sorted and de-duplicated.
    pub gshl_team_ids: Vec<String>,
    pub season_id: String,
    pub season_type: SeasonPhase,
    pub pos_group: Option<PosGroup>,
    pub days: u32,
    pub stats: ParsedStats,
}

impl StoredRow for PlayerTotal {
    const TABLE: &'static str = PLAYER_TOTAL_TABLE;

    fn natural_key(&self) -> String {
        join_key(&[&self.player_id, &self.season_id, self.season_type.code()])
    }

    fn to_record(&self) -> Record {
        let mut record = stats_record(&self.stats)
            .with("playerId", self.player_id.as_str())
            .with("gshlTeamIds", self.gshl_team_ids.clone())
            .with("seasonId", self.season_id.as_str())
            .with("seasonType", self.season_type.code())
            .with("days", self.days);
        if let Some(pos) = self.pos_group {
            record.set("posGroup", pos.code());
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        let mut gshl_team_ids = record.get_str_list("gshlTeamIds");
        gshl_team_ids.sort();
        gshl_team_ids.dedup();
        Ok(Self {
            player_id: required(record, "playerId")?,
            gshl_team_ids,
            season_id: required(record, "seasonId")?,
            season_type: required_phase(record, "seasonType")?,
            pos_group: pos_group(record),
            days: count(record, "days"),
            stats: parse_stats(record),
        })
    }
}

// ---------------------------------------------------------------------------
// Team rows
// ---------------------------------------------------------------------------

/// A fantasy team's starters summed over one day.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamDay {
    pub gshl_team_id: String,
    pub season_id: String,
    pub week_id: String,
    pub date: NaiveDate,
    /// Goalie lineup starts; the GAA denominator for teams.
    pub goalie_starts: f64,
    pub stats: ParsedStats,
}

impl StoredRow for TeamDay {
    const TABLE: &'static str = TEAM_DAY_TABLE;

    fn natural_key(&self) -> String {
        join_key(&[&self.gshl_team_id, &self.date.to_string()])
    }

    fn to_record(&self) -> Record {
        stats_record(&self.stats)
            .with("gshlTeamId", self.gshl_team_id.as_str())
            .with("seasonId", self.season_id.as_str())
            .with("weekId", self.week_id.as_str())
            .with("date", self.date.to_string())
            .with("goalieStarts", self.goalie_starts)
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        Ok(Self {
            gshl_team_id: required(record, "gshlTeamId")?,
            season_id: required(record, "seasonId")?,
            week_id: required(record, "weekId")?,
            date: required_date(record, "date")?,
            goalie_starts: record.get_f64("goalieStarts").unwrap_or(0.0),
            stats: parse_stats(record),
        })
    }
}

/// A fantasy team's week: the unit matchups are scored on.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamWeek {
    pub gshl_team_id: String,
    pub season_id: String,
    pub week_id: String,
    pub days: u32,
    pub goalie_starts: f64,
    pub stats: ParsedStats,
}

impl StoredRow for TeamWeek {
    const TABLE: &'static str = TEAM_WEEK_TABLE;

    fn natural_key(&self) -> String {
        join_key(&[&self.gshl_team_id, &self.week_id])
    }

    fn to_record(&self) -> Record {
        stats_record(&self.stats)
            .with("gshlTeamId", self.gshl_team_id.as_str())
            .with("seasonId", self.season_id.as_str())
            .with("weekId", self.week_id.as_str())
            .with("days", self.days)
            .with("goalieStarts", self.goalie_starts)
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        Ok(Self {
            gshl_team_id: required(record, "gshlTeamId")?,
            season_id: required(record, "seasonId")?,
            week_id: required(record, "weekId")?,
            days: count(record, "days"),
            goalie_starts: record.get_f64("goalieStarts").unwrap_or(0.0),
            stats: parse_stats(record),
        })
    }
}

/// A fantasy team's season phase, with standings.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSeason {
    pub gshl_team_id: String,
    pub season_id: String,
    pub season_type: SeasonPhase,
    pub goalie_starts: f64,
    pub stats: ParsedStats,
    pub record: TeamRecord,
}

impl StoredRow for TeamSeason {
    const TABLE: &'static str = TEAM_SEASON_TABLE;

    fn natural_key(&self) -> String {
        join_key(&[&self.gshl_team_id, &self.season_id, self.season_type.code()])
    }

    fn to_record(&self) -> Record {
        let r = &self.record;
        let mut record = stats_record(&self.stats)
            .with("gshlTeamId", self.gshl_team_id.as_str())
            .with("seasonId", self.season_id.as_str())
            .with("seasonType", self.season_type.code())
            .with("goalieStarts", self.goalie_starts)
            .with("wins", r.wins)
            .with("losses", r.losses)
            .with("ties", r.ties)
            .with("homeTieWins", r.home_tie_wins)
            .with("homeTieLosses", r.home_tie_losses)
            .with("points", r.points)
            .with("streak", r.streak.as_str());
        let ranks = [
            ("conferenceRank", r.conference_rank),
            ("wildcardRank", r.wildcard_rank),
            ("overallRank", r.overall_rank),
        ];
        for (field, rank) in ranks {
            if let Some(rank) = rank {
                record.set(field, rank);
            }
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        Ok(Self {
            gshl_team_id: required(record, "gshlTeamId")?,
            season_id: required(record, "seasonId")?,
            season_type: required_phase(record, "seasonType")?,
            goalie_starts: record.get_f64("goalieStarts").unwrap_or(0.0),
            stats: parse_stats(record),
            record: TeamRecord {
                wins: count(record, "wins"),
                losses: count(record, "losses"),
                ties: count(record, "ties"),
                home_tie_wins: count(record, "homeTieWins"),
                home_tie_losses: count(record, "homeTieLosses"),
                points: count(record, "points"),
                streak: record.get_str("streak").unwrap_or_default(),
                conference_rank: optional_count(record, "conferenceRank"),
                wildcard_rank: optional_count(record, "wildcardRank"),
                overall_rank: optional_count(record, "overallRank"),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Schedule rows
// ---------------------------------------------------------------------------

/// Week metadata: the source of truth for a week's season phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Week {
    pub id: String,
    pub season_id: String,
    pub week_num: u32,
    pub season_phase: SeasonPhase,
}

impl StoredRow for Week {
    const TABLE: &'static str = WEEK_TABLE;

    fn natural_key(&self) -> String {
        self.id.clone()
    }

    fn to_record(&self) -> Record {
        Record::new()
            .with("id", self.id.as_str())
            .with("seasonId", self.season_id.as_str())
            .with("weekNum", self.week_num)
            .with("seasonPhase", self.season_phase.code())
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        let season_phase = ["seasonPhase", "weekType", "seasonType"]
            .iter()
            .filter_map(|f| record.get_str(f))
            .find_map(|raw| SeasonPhase::parse(&raw))
            .unwrap_or_default();
        Ok(Self {
            id: required(record, "id")?,
            season_id: required(record, "seasonId")?,
            week_num: count(record, "weekNum"),
            season_phase,
        })
    }
}

/// One head-to-head pairing. Scores are categories won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matchup {
    pub id: String,
    pub season_id: String,
    pub week_id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub home_score: Option<u32>,
    pub away_score: Option<u32>,
    /// Explicitly recorded tie; counts as a tie for both sides.
    pub tie: Option<bool>,
    pub is_complete: bool,
}

impl StoredRow for Matchup {
    const TABLE: &'static str = MATCHUP_TABLE;

    fn natural_key(&self) -> String {
        self.id.clone()
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id.as_str())
            .with("seasonId", self.season_id.as_str())
            .with("weekId", self.week_id.as_str())
            .with("homeTeamId", self.home_team_id.as_str())
            .with("awayTeamId", self.away_team_id.as_str())
            .with("isComplete", self.is_complete);
        if let Some(score) = self.home_score {
            record.set("homeScore", score);
        }
        if let Some(score) = self.away_score {
            record.set("awayScore", score);
        }
        if let Some(tie) = self.tie {
            record.set("tie", tie);
        }
        record
    }

    fn from_record(record: &Record) -> Result<Self, RowError> {
        Ok(Self {
            id: required(record, "id")?,
            season_id: required(record, "seasonId")?,
            week_id: required(record, "weekId")?,
            home_team_id: required(record, "homeTeamId")?,
            away_team_id: required(record, "awayTeamId")?,
            home_score: optional_count(record, "homeScore"),
            away_score: optional_count(record, "awayScore"),
            tie: record.get_bool("tie"),
            is_complete: record.get_bool("isComplete").unwrap_or(false),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
