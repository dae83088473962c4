// Classification of stat records into canonical model keys.
//
// Aggregation level is inferred from which identity fields are populated.
// The inference is an ordered rule table (first match wins) so each rule
// can be tested on its own.

use std::collections::BTreeMap;
use std::fmt;

use gshl_core::Record;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::stats::schema::Category;

// ---------------------------------------------------------------------------
// Classification dimensions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Player,
    Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregationLevel {
    PlayerDay,
    PlayerWeek,
    PlayerSplit,
    PlayerTotal,
    PlayerNhl,
    TeamDay,
    TeamWeek,
    TeamSeason,
}

impl AggregationLevel {
    pub const ALL: [AggregationLevel; 8] = [
        AggregationLevel::PlayerDay,
        AggregationLevel::PlayerWeek,
        AggregationLevel::PlayerSplit,
        AggregationLevel::PlayerTotal,
        AggregationLevel::PlayerNhl,
        AggregationLevel::TeamDay,
        AggregationLevel::TeamWeek,
        AggregationLevel::TeamSeason,
    ];

    pub fn code(self) -> &'static str {
        match self {
            AggregationLevel::PlayerDay => "playerDay",
            AggregationLevel::PlayerWeek => "playerWeek",
            AggregationLevel::PlayerSplit => "playerSplit",
            AggregationLevel::PlayerTotal => "playerTotal",
            AggregationLevel::PlayerNhl => "playerNhl",
            AggregationLevel::TeamDay => "teamDay",
            AggregationLevel::TeamWeek => "teamWeek",
            AggregationLevel::TeamSeason => "teamSeason",
        }
    }

    pub fn is_day(self) -> bool {
        matches!(self, AggregationLevel::PlayerDay | AggregationLevel::TeamDay)
    }
}

impl fmt::Display for AggregationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Position group: decides which categories matter and how they are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PosGroup {
    #[serde(rename = "F")]
    Forward,
    #[serde(rename = "D")]
    Defense,
    #[serde(rename = "G")]
    Goalie,
    #[serde(rename = "TEAM")]
    Team,
}

const SKATER_CATEGORIES: &[Category] = &[
    Category::G,
    Category::A,
    Category::P,
    Category::PPP,
    Category::SOG,
    Category::HIT,
    Category::BLK,
];

const GOALIE_CATEGORIES: &[Category] = &[
    Category::W,
    Category::GA,
    Category::GAA,
    Category::SV,
    Category::SVP,
];

const TEAM_CATEGORIES: &[Category] = &[
    Category::G,
    Category::A,
    Category::P,
    Category::PPP,
    Category::SOG,
    Category::HIT,
    Category::BLK,
    Category::W,
    Category::GAA,
    Category::SVP,
];

impl PosGroup {
    pub const ALL: [PosGroup; 4] = [
        PosGroup::Forward,
        PosGroup::Defense,
        PosGroup::Goalie,
        PosGroup::Team,
    ];

    pub fn code(self) -> &'static str {
        match self {
            PosGroup::Forward => "F",
            PosGroup::Defense => "D",
            PosGroup::Goalie => "G",
            PosGroup::Team => "TEAM",
        }
    }

    /// Normalize a raw player position string. Teams never go through here.
    pub fn parse_player(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "F" | "FORWARD" | "C" | "LW" | "RW" => Some(PosGroup::Forward),
            "D" | "DEFENSE" | "DEFENCE" => Some(PosGroup::Defense),
            "G" | "GOALIE" | "GOALTENDER" => Some(PosGroup::Goalie),
            _ => None,
        }
    }

    /// Categories that count toward this group's composite score.
    pub fn relevant_categories(self) -> &'static [Category] {
        match self {
            PosGroup::Forward | PosGroup::Defense => SKATER_CATEGORIES,
            PosGroup::Goalie => GOALIE_CATEGORIES,
            PosGroup::Team => TEAM_CATEGORIES,
        }
    }

    pub fn is_relevant(self, category: Category) -> bool {
        self.relevant_categories().contains(&category)
    }
}

impl fmt::Display for PosGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeasonPhase {
    #[default]
    #[serde(rename = "RS")]
    RegularSeason,
    #[serde(rename = "PO")]
    Playoffs,
    #[serde(rename = "LT")]
    LosersTournament,
}

impl SeasonPhase {
    pub fn code(self) -> &'static str {
        match self {
            SeasonPhase::RegularSeason => "RS",
            SeasonPhase::Playoffs => "PO",
            SeasonPhase::LosersTournament => "LT",
        }
    }

    /// Normalize the aliases used across the league sheets. Case and
    /// punctuation are ignored ("Regular Season", "REGULAR_SEASON", "rs").
    pub fn parse(raw: &str) -> Option<Self> {
        let squashed: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match squashed.as_str() {
            "RS" | "REGULAR" | "REGULARSEASON" => Some(SeasonPhase::RegularSeason),
            "PO" | "PLAYOFF" | "PLAYOFFS" | "POSTSEASON" => Some(SeasonPhase::Playoffs),
            "LT" | "LOSERS" | "LOSERSTOURNAMENT" | "CONSOLATION" => {
                Some(SeasonPhase::LosersTournament)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SeasonPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Week id to season phase, for records that don't declare their phase.
pub type WeekPhaseLookup = BTreeMap<String, SeasonPhase>;

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub season_id: String,
    pub season_phase: SeasonPhase,
    pub aggregation_level: AggregationLevel,
    pub pos_group: PosGroup,
    pub entity_type: EntityType,
}

impl Classification {
    pub fn model_key(&self) -> String {
        build_model_key(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("record has no seasonId")]
    MissingSeason,

    #[error("unrecognized player position {raw:?}")]
    UnknownPosition { raw: Option<String> },

    #[error("cannot infer aggregation level for {entity:?} record from its fields")]
    UnknownAggregationLevel { entity: EntityType },
}

/// Canonical model key. The only lookup key into a trained model map, so
/// training and scoring must both go through here.
pub fn build_model_key(classification: &Classification) -> String {
    model_key_for(
        classification.season_phase,
        &classification.season_id,
        classification.aggregation_level,
        classification.pos_group,
    )
}

pub fn model_key_for(
    phase: SeasonPhase,
    season_id: &str,
    level: AggregationLevel,
    pos_group: PosGroup,
) -> String {
    format!(
        "{}:{}:{}:{}",
        phase.code(),
        season_id,
        level.code(),
        pos_group.code()
    )
}

// ---------------------------------------------------------------------------
// Aggregation-level rule table
// ---------------------------------------------------------------------------

/// One row of the aggregation-level decision table.
pub struct LevelRule {
    pub name: &'static str,
    pub level: AggregationLevel,
    pub applies: fn(&Record) -> bool,
}

fn has_date(r: &Record) -> bool {
    r.has("date")
}

fn has_week_and_days(r: &Record) -> bool {
    r.has("weekId") && r.has("days")
}

fn has_phase(r: &Record) -> bool {
    r.has("seasonType") || r.has("seasonPhase")
}

fn is_team_scoped_phase_without_week(r: &Record) -> bool {
    has_phase(r) && r.has("gshlTeamId") && !r.has("weekId")
}

fn has_team_list(r: &Record) -> bool {
    r.has("gshlTeamIds")
}

fn has_nhl_reference_fields(r: &Record) -> bool {
    ["seasonRating", "salary", "QS", "RBS"]
        .iter()
        .any(|field| r.has(field))
}

fn has_week(r: &Record) -> bool {
    r.has("weekId")
}

fn always(_: &Record) -> bool {
    true
}

pub const PLAYER_LEVEL_RULES: &[LevelRule] = &[
    LevelRule {
        name: "date",
        level: AggregationLevel::PlayerDay,
        applies: has_date,
    },
    LevelRule {
        name: "week+days",
        level: AggregationLevel::PlayerWeek,
        applies: has_week_and_days,
    },
    LevelRule {
        name: "phase+team, no week",
        level: AggregationLevel::PlayerSplit,
        applies: is_team_scoped_phase_without_week,
    },
    LevelRule {
        name: "team list",
        level: AggregationLevel::PlayerTotal,
        applies: has_team_list,
    },
    LevelRule {
        name: "bare phase",
        level: AggregationLevel::PlayerTotal,
        applies: has_phase,
    },
    LevelRule {
        name: "nhl reference",
        level: AggregationLevel::PlayerNhl,
        applies: has_nhl_reference_fields,
    },
];

pub const TEAM_LEVEL_RULES: &[LevelRule] = &[
    LevelRule {
        name: "date",
        level: AggregationLevel::TeamDay,
        applies: has_date,
    },
    LevelRule {
        name: "week",
        level: AggregationLevel::TeamWeek,
        applies: has_week,
    },
    LevelRule {
        name: "season",
        level: AggregationLevel::TeamSeason,
        applies: always,
    },
];

/// First matching rule's level.
pub fn infer_aggregation_level(record: &Record, entity: EntityType) -> Option<AggregationLevel> {
    let rules = match entity {
        EntityType::Player => PLAYER_LEVEL_RULES,
        EntityType::Team => TEAM_LEVEL_RULES,
    };
    rules
        .iter()
        .find(|rule| (rule.applies)(record))
        .map(|rule| rule.level)
}

// ---------------------------------------------------------------------------
// Field resolution
// ---------------------------------------------------------------------------

/// Explicit `entityType` wins; otherwise a player id means player and a
/// team id means team. Defaults to player.
pub fn resolve_entity_type(record: &Record) -> EntityType {
    if let Some(explicit) = record.get_str("entityType") {
        match explicit.to_ascii_lowercase().as_str() {
            "player" => return EntityType::Player,
            "team" => return EntityType::Team,
            _ => {}
        }
    }
    if record.has("playerId") {
        EntityType::Player
    } else if record.has("gshlTeamId") {
        EntityType::Team
    } else {
        EntityType::Player
    }
}

/// Explicit phase, then season type, then the week lookup, then RS.
pub fn resolve_season_phase(record: &Record, week_lookup: Option<&WeekPhaseLookup>) -> SeasonPhase {
    let explicit = ["seasonPhase", "seasonType"]
        .iter()
        .filter_map(|field| record.get_str(field))
        .find_map(|raw| SeasonPhase::parse(&raw));
    if let Some(phase) = explicit {
        return phase;
    }
    if let (Some(lookup), Some(week_id)) = (week_lookup, record.get_str("weekId")) {
        if let Some(phase) = lookup.get(&week_id) {
            return *phase;
        }
    }
    SeasonPhase::RegularSeason
}

fn resolve_pos_group(record: &Record, entity: EntityType) -> Result<PosGroup, ClassificationError> {
    if entity == EntityType::Team {
        return Ok(PosGroup::Team);
    }
    let raw = record
        .get_str("posGroup")
        .or_else(|| record.get_str("position"));
    raw.as_deref()
        .and_then(PosGroup::parse_player)
        .ok_or(ClassificationError::UnknownPosition { raw })
}

/// Classify a record, explaining why when it can't be.
pub fn try_classify(
    record: &Record,
    week_lookup: Option<&WeekPhaseLookup>,
) -> Result<Classification, ClassificationError> {
    let season_id = record
        .get_str("seasonId")
        .ok_or(ClassificationError::MissingSeason)?;
    let entity_type = resolve_entity_type(record);
    let pos_group = resolve_pos_group(record, entity_type)?;
    let aggregation_level = infer_aggregation_level(record, entity_type)
        .ok_or(ClassificationError::UnknownAggregationLevel {
            entity: entity_type,
        })?;
    let season_phase = resolve_season_phase(record, week_lookup);
    Ok(Classification {
        season_id,
        season_phase,
        aggregation_level,
        pos_group,
        entity_type,
    })
}

/// Classify a record; unclassifiable records yield `None`.
pub fn classify(record: &Record, week_lookup: Option<&WeekPhaseLookup>) -> Option<Classification> {
    try_classify(record, week_lookup).ok()
}

/// Result of classifying a batch: every record that could be keyed, in input
/// order, plus how many were dropped.
#[derive(Debug, Default)]
pub struct ClassifiedBatch<'a> {
    pub classified: Vec<(Classification, &'a Record)>,
    pub skipped: usize,
}

/// Classify many records. Failures are soft: they are counted and logged at
/// debug level, never returned.
pub fn classify_batch<'a>(
    records: &'a [Record],
    week_lookup: Option<&WeekPhaseLookup>,
) -> ClassifiedBatch<'a> {
    let mut batch = ClassifiedBatch::default();
    for record in records {
        match try_classify(record, week_lookup) {
            Ok(classification) => batch.classified.push((classification, record)),
            Err(e) => {
                debug!("skipping unclassifiable record: {e}");
                batch.skipped += 1;
            }
        }
    }
    batch
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn player(pos: &str) -> Record {
        Record::new()
            .with("playerId", "p1")
            .with("seasonId", "10")
            .with("posGroup", pos)
    }

    #[test]
    fn explicit_entity_type_wins() {
        let r = player("F").with("entityType", "TEAM").with("gshlTeamId", "t1");
        assert_eq!(resolve_entity_type(&r), EntityType::Team);
    }

    #[test]
    fn player_id_beats_team_id() {
        let r = player("F").with("gshlTeamId", "t1");
        assert_eq!(resolve_entity_type(&r), EntityType::Player);
        let team = Record::new().with("gshlTeamId", "t1");
        assert_eq!(resolve_entity_type(&team), EntityType::Team);
        assert_eq!(resolve_entity_type(&Record::new()), EntityType::Player);
    }

    #[test]
    fn position_is_normalized() {
        let r = player(" d ").with("date", "2024-10-12");
        let c = classify(&r, None).unwrap();
        assert_eq!(c.pos_group, PosGroup::Defense);
    }

    #[test]
    fn unknown_position_fails() {
        let r = player("X").with("date", "2024-10-12");
        assert_eq!(
            try_classify(&r, None),
            Err(ClassificationError::UnknownPosition {
                raw: Some("X".into())
            })
        );
        assert!(classify(&r, None).is_none());
    }

    #[test]
    fn missing_season_fails() {
        let r = Record::new().with("playerId", "p1").with("posGroup", "F");
        assert_eq!(try_classify(&r, None), Err(ClassificationError::MissingSeason));
    }

    #[test]
    fn date_rule_gives_day_level() {
        let r = player("F").with("date", "2024-10-12").with("weekId", "3").with("days", 1);
        assert_eq!(
            infer_aggregation_level(&r, EntityType::Player),
            Some(AggregationLevel::PlayerDay)
        );
    }

    #[test]
    fn week_rule_needs_days() {
        let r = player("F").with("weekId", "3").with("days", 7);
        assert_eq!(
            infer_aggregation_level(&r, EntityType::Player),
            Some(AggregationLevel::PlayerWeek)
        );
        let no_days = player("F").with("weekId", "3");
        assert_eq!(infer_aggregation_level(&no_days, EntityType::Player), None);
    }

    #[test]
    fn split_rule_is_phase_plus_team_without_week() {
        let r = player("F").with("seasonType", "RS").with("gshlTeamId", "t1");
        assert_eq!(
            infer_aggregation_level(&r, EntityType::Player),
            Some(AggregationLevel::PlayerSplit)
        );
    }

    #[test]
    fn total_rules_cover_team_list_and_bare_phase() {
        let list = player("F").with("gshlTeamIds", json!(["t1", "t2"]));
        assert_eq!(
            infer_aggregation_level(&list, EntityType::Player),
            Some(AggregationLevel::PlayerTotal)
        );
        let bare = player("F").with("seasonType", "PO");
        assert_eq!(
            infer_aggregation_level(&bare, EntityType::Player),
            Some(AggregationLevel::PlayerTotal)
        );
    }

    #[test]
    fn nhl_rule_matches_reference_fields() {
        let r = player("G").with("seasonRating", 88.2).with("QS", 20);
        assert_eq!(
            infer_aggregation_level(&r, EntityType::Player),
            Some(AggregationLevel::PlayerNhl)
        );
    }

    #[test]
    fn team_levels() {
        let base = Record::new().with("gshlTeamId", "t1").with("seasonId", "10");
        let day = base.clone().with("date", "2024-10-12");
        let week = base.clone().with("weekId", "4");
        assert_eq!(classify(&day, None).unwrap().aggregation_level, AggregationLevel::TeamDay);
        assert_eq!(classify(&week, None).unwrap().aggregation_level, AggregationLevel::TeamWeek);
        let season = classify(&base, None).unwrap();
        assert_eq!(season.aggregation_level, AggregationLevel::TeamSeason);
        assert_eq!(season.pos_group, PosGroup::Team);
    }

    #[test]
    fn phase_aliases_normalize() {
        assert_eq!(SeasonPhase::parse("RS"), Some(SeasonPhase::RegularSeason));
        assert_eq!(SeasonPhase::parse("Regular Season"), Some(SeasonPhase::RegularSeason));
        assert_eq!(SeasonPhase::parse("po"), Some(SeasonPhase::Playoffs));
        assert_eq!(SeasonPhase::parse("PLAYOFFS"), Some(SeasonPhase::Playoffs));
        assert_eq!(SeasonPhase::parse("losers_tournament"), Some(SeasonPhase::LosersTournament));
        assert_eq!(SeasonPhase::parse("LT"), Some(SeasonPhase::LosersTournament));
        assert_eq!(SeasonPhase::parse("preseason"), None);
    }

    #[test]
    fn phase_resolution_order() {
        let mut lookup = WeekPhaseLookup::new();
        lookup.insert("15".into(), SeasonPhase::Playoffs);

        let explicit = player("F")
            .with("seasonPhase", "LT")
            .with("seasonType", "PO")
            .with("weekId", "15");
        assert_eq!(resolve_season_phase(&explicit, Some(&lookup)), SeasonPhase::LosersTournament);

        let season_type = player("F").with("seasonType", "Playoffs").with("weekId", "1");
        assert_eq!(resolve_season_phase(&season_type, Some(&lookup)), SeasonPhase::Playoffs);

        let unrecognized = player("F").with("seasonPhase", "???").with("weekId", "15");
        assert_eq!(resolve_season_phase(&unrecognized, Some(&lookup)), SeasonPhase::Playoffs);

        let by_week = player("F").with("weekId", "15");
        assert_eq!(resolve_season_phase(&by_week, Some(&lookup)), SeasonPhase::Playoffs);
        assert_eq!(resolve_season_phase(&by_week, None), SeasonPhase::RegularSeason);
    }

    #[test]
    fn model_key_is_fixed_order_join() {
        let r = player("F").with("weekId", "3").with("days", 7);
        let c = classify(&r, None).unwrap();
        assert_eq!(build_model_key(&c), "RS:10:playerWeek:F");
        assert_eq!(
            model_key_for(SeasonPhase::Playoffs, "7", AggregationLevel::TeamSeason, PosGroup::Team),
            "PO:7:teamSeason:TEAM"
        );
    }

    #[test]
    fn relevant_categories_per_group() {
        assert!(PosGroup::Forward.is_relevant(Category::HIT));
        assert!(!PosGroup::Forward.is_relevant(Category::GAA));
        assert!(PosGroup::Goalie.is_relevant(Category::GA));
        assert!(!PosGroup::Team.is_relevant(Category::GA));
        assert_eq!(PosGroup::Team.relevant_categories().len(), 10);
    }

    #[test]
    fn batch_counts_skips() {
        let records = vec![
            player("F").with("date", "2024-10-12"),
            player("X").with("date", "2024-10-12"),
            Record::new().with("playerId", "p2"),
            player("G").with("weekId", "3").with("days", 7),
        ];
        let batch = classify_batch(&records, None);
        assert_eq!(batch.skipped, 2);
        assert_eq!(batch.classified.len(), 2);
        assert_eq!(batch.classified[0].0.aggregation_level, AggregationLevel::PlayerDay);
        assert_eq!(batch.classified[1].0.pos_group, PosGroup::Goalie);
    }
}
