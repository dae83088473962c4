// Trained ranking model and its JSON persistence.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ranking::distribution::Distribution;
use crate::ranking::weights::CategoryWeights;
use crate::stats::classify::{AggregationLevel, PosGroup};
use crate::stats::schema::Category;

pub const MODEL_VERSION: &str = "gshl-ranking-v1";

// ---------------------------------------------------------------------------
// Model types
// ---------------------------------------------------------------------------

/// One trained unit for a canonical model key. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSeasonModel {
    pub sample_size: usize,
    pub weights: CategoryWeights,
    pub distributions: BTreeMap<Category, Distribution>,
    pub composite_distribution: Distribution,
}

/// How much a caller-side blend should lean on the full distribution versus
/// the top-5/top-3/top-2 sub-populations. Sums to 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlendWeightSet {
    pub full: f64,
    pub top5: f64,
    pub top3: f64,
    pub top2: f64,
}

impl BlendWeightSet {
    pub fn total(&self) -> f64 {
        self.full + self.top5 + self.top3 + self.top2
    }

    /// Linear interpolation between two profiles at `t` in [0, 1],
    /// re-normalized to sum to 1.
    pub fn lerp(low: &Self, high: &Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: f64, b: f64| a + (b - a) * t;
        let raw = Self {
            full: mix(low.full, high.full),
            top5: mix(low.top5, high.top5),
            top3: mix(low.top3, high.top3),
            top2: mix(low.top2, high.top2),
        };
        let total = raw.total();
        if total <= 0.0 {
            return *low;
        }
        Self {
            full: raw.full / total,
            top5: raw.top5 / total,
            top3: raw.top3 / total,
            top2: raw.top2 / total,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRange {
    pub earliest: String,
    pub latest: String,
}

pub type BlendWeights = BTreeMap<AggregationLevel, BTreeMap<PosGroup, BlendWeightSet>>;

/// Everything a training run produces. Consumed read-only by the ranking
/// engine and replaced wholesale by the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingModel {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub total_samples: usize,
    #[serde(default)]
    pub season_range: SeasonRange,
    #[serde(default)]
    pub models: BTreeMap<String, PositionSeasonModel>,
    #[serde(default)]
    pub global_weights: BTreeMap<PosGroup, CategoryWeights>,
    #[serde(default)]
    pub aggregation_blend_weights: BlendWeights,
}

impl RankingModel {
    pub fn get(&self, key: &str) -> Option<&PositionSeasonModel> {
        self.models.get(key)
    }
}

// ---------------------------------------------------------------------------
// Season ids
// ---------------------------------------------------------------------------

/// Order season ids numerically when both parse ("9" < "10"), lexically
/// otherwise.
pub fn compare_season_ids(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ModelIoError {
    #[error("failed to encode ranking model: {0}")]
    Encode(serde_json::Error),

    #[error("failed to decode ranking model: {0}")]
    Decode(serde_json::Error),

    #[error("failed to access model file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Serialize to one self-describing JSON document.
pub fn serialize_model(model: &RankingModel) -> Result<String, ModelIoError> {
    serde_json::to_string_pretty(model).map_err(ModelIoError::Encode)
}

/// Parse a model document. Optional sections that are missing come back
/// empty.
pub fn deserialize_model(text: &str) -> Result<RankingModel, ModelIoError> {
    serde_json::from_str(text).map_err(ModelIoError::Decode)
}

pub fn save_model(model: &RankingModel, path: &Path) -> Result<(), ModelIoError> {
    let text = serialize_model(model)?;
    std::fs::write(path, text).map_err(|source| ModelIoError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_model(path: &Path) -> Result<RankingModel, ModelIoError> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelIoError::Io {
        path: path.display().to_string(),
        source,
    })?;
    deserialize_model(&text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
