// Configuration loading and validation (gshl.toml).
//
// The file has two tables, `[training]` and `[standings]`; every field is
// optional and falls back to the documented default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::ranking::weights::WeightAdjustments;
use crate::stats::classify::{PosGroup, SeasonPhase, WeekPhaseLookup};
use crate::stats::schema::Category;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Assembled config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GshlConfig {
    pub training: TrainingConfig,
    pub standings: StandingsConfig,
}

/// Knobs for a model training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    /// Groups with fewer classified lines than this get no model.
    pub min_sample_size: usize,
    /// |z| above which composite scores are dropped before building the
    /// composite distribution.
    pub outlier_threshold: f64,
    /// Shrinkage of trained weights toward uniform, in [0, 1].
    pub smoothing_factor: f64,
    /// Apply `scarcity_weights` / `category_impact_weights` to the variance
    /// signal.
    pub use_adaptive_weights: bool,
    pub compute_blend_weights: bool,
    pub scarcity_weights: BTreeMap<PosGroup, BTreeMap<Category, f64>>,
    pub category_impact_weights: BTreeMap<PosGroup, BTreeMap<Category, f64>>,
    pub week_type_lookup: WeekPhaseLookup,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 50,
            outlier_threshold: 4.0,
            smoothing_factor: 0.3,
            use_adaptive_weights: false,
            compute_blend_weights: true,
            scarcity_weights: BTreeMap::new(),
            category_impact_weights: BTreeMap::new(),
            week_type_lookup: WeekPhaseLookup::new(),
        }
    }
}

impl TrainingConfig {
    /// Adjustments for one position group, or `None` when adaptive weights
    /// are off or nothing is configured for the group.
    pub fn adjustments_for(&self, pos_group: PosGroup) -> Option<WeightAdjustments> {
        if !self.use_adaptive_weights {
            return None;
        }
        let scarcity = self.scarcity_weights.get(&pos_group).cloned().unwrap_or_default();
        let category_impact = self
            .category_impact_weights
            .get(&pos_group)
            .cloned()
            .unwrap_or_default();
        if scarcity.is_empty() && category_impact.is_empty() {
            return None;
        }
        Some(WeightAdjustments {
            scarcity,
            category_impact,
        })
    }
}

/// League structure needed for team-season standings.
#[derive(Debug, Clone, PartialEq)]
pub struct StandingsConfig {
    /// gshlTeamId -> conference id.
    pub conferences: BTreeMap<String, String>,
    /// How many teams per conference are excluded from the wildcard race.
    pub wildcard_exclusions: usize,
}

impl Default for StandingsConfig {
    fn default() -> Self {
        Self {
            conferences: BTreeMap::new(),
            wildcard_exclusions: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw file structs
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    training: TrainingSection,
    standings: StandingsSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TrainingSection {
    min_sample_size: usize,
    outlier_threshold: f64,
    smoothing_factor: f64,
    use_adaptive_weights: bool,
    compute_blend_weights: bool,
    scarcity_weights: BTreeMap<String, BTreeMap<String, f64>>,
    category_impact_weights: BTreeMap<String, BTreeMap<String, f64>>,
    week_type_lookup: BTreeMap<String, String>,
}

impl Default for TrainingSection {
    fn default() -> Self {
        let d = TrainingConfig::default();
        Self {
            min_sample_size: d.min_sample_size,
            outlier_threshold: d.outlier_threshold,
            smoothing_factor: d.smoothing_factor,
            use_adaptive_weights: d.use_adaptive_weights,
            compute_blend_weights: d.compute_blend_weights,
            scarcity_weights: BTreeMap::new(),
            category_impact_weights: BTreeMap::new(),
            week_type_lookup: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StandingsSection {
    conferences: BTreeMap<String, String>,
    wildcard_exclusions: usize,
}

impl Default for StandingsSection {
    fn default() -> Self {
        let d = StandingsConfig::default();
        Self {
            conferences: d.conferences,
            wildcard_exclusions: d.wildcard_exclusions,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from a TOML file.
pub fn load_config_from(path: &Path) -> Result<GshlConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    parse_config(&text).map_err(|e| match e {
        ConfigError::ParseError { source, .. } => ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(text: &str) -> Result<GshlConfig, ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: PathBuf::from("<inline>"),
        source: e,
    })?;

    let t = file.training;
    let training = TrainingConfig {
        min_sample_size: t.min_sample_size,
        outlier_threshold: t.outlier_threshold,
        smoothing_factor: t.smoothing_factor,
        use_adaptive_weights: t.use_adaptive_weights,
        compute_blend_weights: t.compute_blend_weights,
        scarcity_weights: convert_multipliers("training.scarcity_weights", t.scarcity_weights)?,
        category_impact_weights: convert_multipliers(
            "training.category_impact_weights",
            t.category_impact_weights,
        )?,
        week_type_lookup: convert_week_lookup(t.week_type_lookup)?,
    };

    let standings = StandingsConfig {
        conferences: file.standings.conferences,
        wildcard_exclusions: file.standings.wildcard_exclusions,
    };

    let config = GshlConfig {
        training,
        standings,
    };
    validate(&config)?;
    Ok(config)
}

fn convert_multipliers(
    field: &str,
    raw: BTreeMap<String, BTreeMap<String, f64>>,
) -> Result<BTreeMap<PosGroup, BTreeMap<Category, f64>>, ConfigError> {
    let mut out = BTreeMap::new();
    for (pos_raw, cats) in raw {
        let pos = parse_pos_group(&pos_raw).ok_or_else(|| ConfigError::ValidationError {
            field: format!("{field}.{pos_raw}"),
            message: "unknown position group (expected F, D, G or TEAM)".into(),
        })?;
        let mut typed = BTreeMap::new();
        for (cat_raw, value) in cats {
            let category = Category::ALL
                .iter()
                .copied()
                .find(|c| c.name().eq_ignore_ascii_case(cat_raw.trim()))
                .ok_or_else(|| ConfigError::ValidationError {
                    field: format!("{field}.{pos_raw}.{cat_raw}"),
                    message: "unknown category".into(),
                })?;
            typed.insert(category, value);
        }
        out.insert(pos, typed);
    }
    Ok(out)
}

fn parse_pos_group(raw: &str) -> Option<PosGroup> {
    if raw.trim().eq_ignore_ascii_case("TEAM") {
        return Some(PosGroup::Team);
    }
    PosGroup::parse_player(raw)
}

fn convert_week_lookup(raw: BTreeMap<String, String>) -> Result<WeekPhaseLookup, ConfigError> {
    raw.into_iter()
        .map(|(week, phase)| {
            SeasonPhase::parse(&phase)
                .map(|p| (week.clone(), p))
                .ok_or_else(|| ConfigError::ValidationError {
                    field: format!("training.week_type_lookup.{week}"),
                    message: format!("unknown season phase {phase:?}"),
                })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &GshlConfig) -> Result<(), ConfigError> {
    let t = &config.training;

    if t.min_sample_size == 0 {
        return Err(ConfigError::ValidationError {
            field: "training.min_sample_size".into(),
            message: "must be greater than 0".into(),
        });
    }

    if !(t.outlier_threshold.is_finite() && t.outlier_threshold > 0.0) {
        return Err(ConfigError::ValidationError {
            field: "training.outlier_threshold".into(),
            message: format!("must be > 0, got {}", t.outlier_threshold),
        });
    }

    if !(0.0..=1.0).contains(&t.smoothing_factor) {
        return Err(ConfigError::ValidationError {
            field: "training.smoothing_factor".into(),
            message: format!(
                "must be between 0.0 and 1.0 inclusive, got {}",
                t.smoothing_factor
            ),
        });
    }

    let tables = [
        ("training.scarcity_weights", &t.scarcity_weights),
        ("training.category_impact_weights", &t.category_impact_weights),
    ];
    for (name, table) in tables {
        for (pos, cats) in table {
            for (cat, value) in cats {
                if !value.is_finite() || *value < 0.0 {
                    return Err(ConfigError::ValidationError {
                        field: format!("{name}.{pos}.{}", cat.name()),
                        message: format!("must be a finite value >= 0, got {value}"),
                    });
                }
            }
        }
    }

    if config.standings.wildcard_exclusions == 0 {
        return Err(ConfigError::ValidationError {
            field: "standings.wildcard_exclusions".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
