// Ranking engine: scores a single stat line against a trained model.

use std::collections::BTreeMap;

use gshl_core::Record;
use serde::Serialize;
use thiserror::Error;

use crate::ranking::composite::composite_score;
use crate::ranking::distribution::{interpolate_percentile, Distribution};
use crate::ranking::model::{PositionSeasonModel, RankingModel};
use crate::ranking::weights::{uniform_weights, CategoryWeights};
use crate::stats::classify::{
    model_key_for, try_classify, AggregationLevel, Classification, ClassificationError, PosGroup,
    SeasonPhase, WeekPhaseLookup,
};
use crate::stats::schema::{parse_stats, Category, ParsedStats};

/// Flat score boost for goaltender day lines, whose composites compress
/// toward the middle at that granularity.
pub const GOALIE_DAY_PERCENTILE_BOOST: f64 = 4.0;

/// Scores within this distance compare as a tie.
pub const COMPARE_TIE_EPSILON: f64 = 0.01;

// ---------------------------------------------------------------------------
// Error and result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RankingError {
    #[error("cannot classify stat line: {0}")]
    Classification(#[from] ClassificationError),

    #[error("no trained model for {key} or any fallback")]
    ModelNotFound { key: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub category: Category,
    pub value: f64,
    pub percentile: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingResult {
    /// Final score in [0, 100].
    pub score: f64,
    /// Composite percentile before special-case adjustments.
    pub percentile: f64,
    /// Key of the model actually used, which may be a fallback.
    pub model_key: String,
    pub season_id: String,
    pub season_phase: SeasonPhase,
    pub aggregation_level: AggregationLevel,
    pub pos_group: PosGroup,
    pub breakdown: Vec<CategoryBreakdown>,
}

// ---------------------------------------------------------------------------
// Model resolution
// ---------------------------------------------------------------------------

/// Resolve the model for a classified line. First hit wins:
///
/// 1. exact key for the line's phase and season
/// 2. regular season, same season
/// 3. regular season, latest trained season
/// 4. regular season, earliest trained season
/// 5. any trained key with the same level and position group, in key order
pub fn resolve_model<'m>(
    model: &'m RankingModel,
    classification: &Classification,
) -> Option<(&'m str, &'m PositionSeasonModel)> {
    let level = classification.aggregation_level;
    let pos = classification.pos_group;
    let rs = SeasonPhase::RegularSeason;

    let mut candidates = vec![
        model_key_for(classification.season_phase, &classification.season_id, level, pos),
        model_key_for(rs, &classification.season_id, level, pos),
    ];
    for season in [&model.season_range.latest, &model.season_range.earliest] {
        if !season.is_empty() {
            candidates.push(model_key_for(rs, season, level, pos));
        }
    }

    let hit = candidates
        .iter()
        .find_map(|key| model.models.get_key_value(key.as_str()));
    if let Some((key, psm)) = hit {
        return Some((key.as_str(), psm));
    }

    let suffix = format!(":{}:{}", level.code(), pos.code());
    model
        .models
        .iter()
        .find(|(key, _)| key.ends_with(&suffix))
        .map(|(key, psm)| (key.as_str(), psm))
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Named special case: goalie day lines get [`GOALIE_DAY_PERCENTILE_BOOST`].
pub fn goalie_day_boost(classification: &Classification) -> f64 {
    if classification.pos_group == PosGroup::Goalie
        && classification.aggregation_level == AggregationLevel::PlayerDay
    {
        GOALIE_DAY_PERCENTILE_BOOST
    } else {
        0.0
    }
}

fn score_line(
    stats: &ParsedStats,
    classification: Classification,
    model_key: String,
    weights: &CategoryWeights,
    distributions: &BTreeMap<Category, Distribution>,
    composite_distribution: &Distribution,
) -> RankingResult {
    let pos = classification.pos_group;
    let composite = composite_score(stats, weights, distributions, pos);
    let percentile = interpolate_percentile(composite, composite_distribution);
    let score = (percentile + goalie_day_boost(&classification)).clamp(0.0, 100.0);

    let breakdown = pos
        .relevant_categories()
        .iter()
        .map(|category| {
            let value = stats.category(*category);
            CategoryBreakdown {
                category: *category,
                value,
                percentile: distributions
                    .get(category)
                    .map_or(50.0, |d| interpolate_percentile(value, d)),
                weight: weights.get(category).copied().unwrap_or(0.0),
            }
        })
        .collect();

    RankingResult {
        score,
        percentile,
        model_key,
        season_id: classification.season_id,
        season_phase: classification.season_phase,
        aggregation_level: classification.aggregation_level,
        pos_group: pos,
        breakdown,
    }
}

/// Score one line. Fails if the line can't be classified or no model
/// survives the fallback chain.
pub fn rank(line: &Record, model: &RankingModel) -> Result<RankingResult, RankingError> {
    rank_with_lookup(line, model, None)
}

/// [`rank`], resolving unlabeled weeks through `week_lookup`.
pub fn rank_with_lookup(
    line: &Record,
    model: &RankingModel,
    week_lookup: Option<&WeekPhaseLookup>,
) -> Result<RankingResult, RankingError> {
    let classification = try_classify(line, week_lookup)?;
    let Some((key, psm)) = resolve_model(model, &classification) else {
        return Err(RankingError::ModelNotFound {
            key: classification.model_key(),
        });
    };
    let stats = parse_stats(line);
    Ok(score_line(
        &stats,
        classification,
        key.to_string(),
        &psm.weights,
        &psm.distributions,
        &psm.composite_distribution,
    ))
}

/// Like [`rank`], but when nothing resolves, score with the position's
/// global weights and no distributions. The result is always defined; with
/// no history to compare against the percentile is 50.
pub fn rank_with_global_fallback(
    line: &Record,
    model: &RankingModel,
) -> Result<RankingResult, RankingError> {
    match rank(line, model) {
        Err(RankingError::ModelNotFound { .. }) => {}
        other => return other,
    }
    let classification = try_classify(line, None)?;
    let pos = classification.pos_group;
    let weights = model
        .global_weights
        .get(&pos)
        .cloned()
        .unwrap_or_else(|| uniform_weights(pos));
    let stats = parse_stats(line);
    Ok(score_line(
        &stats,
        classification,
        format!("global:{}", pos.code()),
        &weights,
        &BTreeMap::new(),
        &Distribution::default(),
    ))
}

/// Rank each line independently, preserving order.
pub fn rank_many(
    lines: &[Record],
    model: &RankingModel,
) -> Vec<Result<RankingResult, RankingError>> {
    lines.iter().map(|line| rank(line, model)).collect()
}

// ---------------------------------------------------------------------------
// Grades and comparisons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Grade {
    Poor,
    BelowAverage,
    Average,
    Good,
    Excellent,
    Elite,
}

impl Grade {
    pub fn label(self) -> &'static str {
        match self {
            Grade::Elite => "Elite",
            Grade::Excellent => "Excellent",
            Grade::Good => "Good",
            Grade::Average => "Average",
            Grade::BelowAverage => "Below Average",
            Grade::Poor => "Poor",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Lower bound (inclusive) of each grade, best first.
const GRADE_BANDS: [(f64, Grade); 5] = [
    (90.0, Grade::Elite),
    (75.0, Grade::Excellent),
    (60.0, Grade::Good),
    (40.0, Grade::Average),
    (25.0, Grade::BelowAverage),
];

pub fn grade(score: f64) -> Grade {
    GRADE_BANDS
        .iter()
        .find(|(floor, _)| score >= *floor)
        .map_or(Grade::Poor, |(_, g)| *g)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    First,
    Second,
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    /// `a.score - b.score`.
    pub difference: f64,
    pub winner: Winner,
}

pub fn compare(a: &RankingResult, b: &RankingResult) -> Comparison {
    let difference = a.score - b.score;
    let winner = if difference.abs() < COMPARE_TIE_EPSILON {
        Winner::Tie
    } else if difference > 0.0 {
        Winner::First
    } else {
        Winner::Second
    };
    Comparison { difference, winner }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
