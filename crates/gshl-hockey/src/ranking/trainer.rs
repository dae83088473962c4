// Model trainer: groups classified stat lines by model key and fits one
// PositionSeasonModel per sufficiently large group.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Timelike, Utc};
use gshl_core::{Filter, Record, RowStore};
use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::ranking::composite::composite_score;
use crate::ranking::distribution::{build_distribution, build_trimmed_distribution, Distribution};
use crate::ranking::model::{
    compare_season_ids, BlendWeightSet, BlendWeights, PositionSeasonModel, RankingModel,
    SeasonRange, MODEL_VERSION,
};
use crate::ranking::weights::{compute_weights, smooth_weights, CategoryWeights};
use crate::stats::classify::{classify_batch, AggregationLevel, Classification, PosGroup};
use crate::stats::schema::{parse_stats, Category, ParsedStats};

/// Blend profile for the steadiest (level, position) groups.
pub const LOW_VARIANCE_BLEND: BlendWeightSet = BlendWeightSet {
    full: 0.55,
    top5: 0.25,
    top3: 0.15,
    top2: 0.05,
};

/// Blend profile for the most volatile groups.
pub const HIGH_VARIANCE_BLEND: BlendWeightSet = BlendWeightSet {
    full: 0.25,
    top5: 0.30,
    top3: 0.25,
    top2: 0.20,
};

/// What a training run did with its input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    /// Lines that received a model key.
    pub classified: usize,
    /// Lines that could not be classified.
    pub skipped: usize,
    /// Distinct model keys seen.
    pub groups: usize,
    /// Keys that produced a model.
    pub trained: usize,
    /// Keys below `min_sample_size`, with their sample counts.
    pub undersized: Vec<(String, usize)>,
}

struct Sample {
    entity: String,
    stats: ParsedStats,
}

struct TrainingGroup {
    classification: Classification,
    samples: Vec<Sample>,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Train a model stamped with the current time.
pub fn train(lines: &[Record], config: &TrainingConfig) -> RankingModel {
    train_at(lines, config, Utc::now())
}

/// Train a model stamped with `trained_at`.
pub fn train_at(
    lines: &[Record],
    config: &TrainingConfig,
    trained_at: DateTime<Utc>,
) -> RankingModel {
    train_with_report(lines, config, trained_at).0
}

/// Train a model and report how the input was used.
pub fn train_with_report(
    lines: &[Record],
    config: &TrainingConfig,
    trained_at: DateTime<Utc>,
) -> (RankingModel, TrainingReport) {
    let batch = classify_batch(lines, Some(&config.week_type_lookup));
    let mut report = TrainingReport {
        classified: batch.classified.len(),
        skipped: batch.skipped,
        ..TrainingReport::default()
    };

    let mut groups: BTreeMap<String, TrainingGroup> = BTreeMap::new();
    for (classification, record) in batch.classified {
        let sample = Sample {
            entity: entity_id(record),
            stats: parse_stats(record),
        };
        groups
            .entry(classification.model_key())
            .or_insert_with(|| TrainingGroup {
                classification,
                samples: Vec::new(),
            })
            .samples
            .push(sample);
    }
    report.groups = groups.len();

    let mut models = BTreeMap::new();
    let mut retained: Vec<Classification> = Vec::new();
    let mut total_samples = 0;
    for (key, mut group) in groups {
        let n = group.samples.len();
        if n < config.min_sample_size {
            debug!("skipping {key}: {n} samples < min {}", config.min_sample_size);
            report.undersized.push((key, n));
            continue;
        }
        sort_canonical(&mut group.samples);
        let model = train_group(&group, config);
        debug!("trained {key} on {n} samples");
        total_samples += n;
        retained.push(group.classification);
        models.insert(key, model);
    }
    report.trained = models.len();

    let season_range = season_range(&retained);
    let global_weights = global_weights(&models, &retained);
    let aggregation_blend_weights = if config.compute_blend_weights {
        blend_weights(&models, &retained)
    } else {
        BlendWeights::new()
    };

    info!(
        "trained {} of {} model keys from {} lines ({} unclassifiable, {} undersized)",
        report.trained,
        report.groups,
        report.classified,
        report.skipped,
        report.undersized.len()
    );

    let model = RankingModel {
        version: MODEL_VERSION.to_string(),
        trained_at: trained_at.with_nanosecond(0).unwrap_or(trained_at),
        total_samples,
        season_range,
        models,
        global_weights,
        aggregation_blend_weights,
    };
    (model, report)
}

/// Collect training lines from one or more row-store tables.
pub fn load_stat_lines(
    store: &dyn RowStore,
    tables: &[&str],
    filter: &Filter,
) -> anyhow::Result<Vec<Record>> {
    let mut lines = Vec::new();
    for table in tables {
        let rows = store
            .find_many(table, filter)
            .with_context(|| format!("failed to load stat lines from {table}"))?;
        debug!("loaded {} stat lines from {table}", rows.len());
        lines.extend(rows);
    }
    Ok(lines)
}

// ---------------------------------------------------------------------------
// Per-group fitting
// ---------------------------------------------------------------------------

fn entity_id(record: &Record) -> String {
    record
        .get_str("playerId")
        .or_else(|| record.get_str("gshlTeamId"))
        .unwrap_or_default()
}

/// Entity id, then the stat vector under total ordering. Makes every sum
/// below independent of input order.
fn sort_canonical(samples: &mut [Sample]) {
    samples.sort_by(|a, b| {
        a.entity.cmp(&b.entity).then_with(|| {
            a.stats
                .values()
                .iter()
                .zip(b.stats.values())
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });
}

fn train_group(group: &TrainingGroup, config: &TrainingConfig) -> PositionSeasonModel {
    let pos_group = group.classification.pos_group;
    let stats: Vec<ParsedStats> = group.samples.iter().map(|s| s.stats).collect();

    let adjustments = config.adjustments_for(pos_group);
    let mut weights = compute_weights(&stats, pos_group, adjustments.as_ref());
    smooth_weights(&mut weights, pos_group, config.smoothing_factor);

    let distributions: BTreeMap<Category, Distribution> = Category::ALL
        .iter()
        .map(|c| {
            let values: Vec<f64> = stats.iter().map(|s| s.category(*c)).collect();
            (*c, build_distribution(&values))
        })
        .collect();

    let composites: Vec<f64> = stats
        .iter()
        .map(|s| composite_score(s, &weights, &distributions, pos_group))
        .collect();

    PositionSeasonModel {
        sample_size: stats.len(),
        weights,
        distributions,
        composite_distribution: build_trimmed_distribution(&composites, config.outlier_threshold),
    }
}

// ---------------------------------------------------------------------------
// Model-wide outputs
// ---------------------------------------------------------------------------

fn season_range(retained: &[Classification]) -> SeasonRange {
    let earliest = retained
        .iter()
        .map(|c| c.season_id.as_str())
        .min_by(|a, b| compare_season_ids(a, b));
    let latest = retained
        .iter()
        .map(|c| c.season_id.as_str())
        .max_by(|a, b| compare_season_ids(a, b));
    match (earliest, latest) {
        (Some(e), Some(l)) => SeasonRange {
            earliest: e.to_string(),
            latest: l.to_string(),
        },
        _ => SeasonRange::default(),
    }
}

/// Arithmetic mean of every trained weight vector per position group,
/// across all seasons, phases and levels.
fn global_weights(
    models: &BTreeMap<String, PositionSeasonModel>,
    retained: &[Classification],
) -> BTreeMap<PosGroup, CategoryWeights> {
    let mut sums: BTreeMap<PosGroup, (CategoryWeights, usize)> = BTreeMap::new();
    for classification in retained {
        let Some(model) = models.get(&classification.model_key()) else {
            continue;
        };
        let (sum, count) = sums.entry(classification.pos_group).or_default();
        for (category, w) in &model.weights {
            *sum.entry(*category).or_insert(0.0) += w;
        }
        *count += 1;
    }
    sums.into_iter()
        .map(|(pos, (sum, count))| {
            let mean = sum.into_iter().map(|(c, w)| (c, w / count as f64)).collect();
            (pos, mean)
        })
        .collect()
}

/// Fixed volatility bias per level: day-level data is spikier than totals.
pub fn level_bias(level: AggregationLevel) -> f64 {
    match level {
        AggregationLevel::PlayerDay | AggregationLevel::TeamDay => 0.15,
        AggregationLevel::PlayerWeek | AggregationLevel::TeamWeek => 0.05,
        AggregationLevel::PlayerSplit => 0.0,
        AggregationLevel::PlayerTotal | AggregationLevel::TeamSeason => -0.05,
        AggregationLevel::PlayerNhl => -0.10,
    }
}

fn blend_weights(
    models: &BTreeMap<String, PositionSeasonModel>,
    retained: &[Classification],
) -> BlendWeights {
    let mut cvs: BTreeMap<(AggregationLevel, PosGroup), Vec<f64>> = BTreeMap::new();
    for classification in retained {
        if let Some(model) = models.get(&classification.model_key()) {
            cvs.entry((classification.aggregation_level, classification.pos_group))
                .or_default()
                .push(model.composite_distribution.coefficient_of_variation());
        }
    }
    let volatility: BTreeMap<(AggregationLevel, PosGroup), f64> = cvs
        .into_iter()
        .map(|(k, v)| (k, v.iter().sum::<f64>() / v.len() as f64))
        .collect();

    let lo = volatility.values().copied().fold(f64::INFINITY, f64::min);
    let hi = volatility.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let spread = hi - lo;

    let mut out = BlendWeights::new();
    for ((level, pos), v) in volatility {
        let normalized = if spread > f64::EPSILON { (v - lo) / spread } else { 0.5 };
        let t = (normalized + level_bias(level)).clamp(0.0, 1.0);
        out.entry(level)
            .or_default()
            .insert(pos, BlendWeightSet::lerp(&LOW_VARIANCE_BLEND, &HIGH_VARIANCE_BLEND, t));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::model::serialize_model;
    use crate::stats::classify::SeasonPhase;
    use chrono::TimeZone;
    use gshl_core::MemoryStore;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn forward_day(player: usize, season: &str, goals: f64, shots: f64) -> Record {
        Record::new()
            .with("playerId", format!("p{player}"))
            .with("seasonId", season)
            .with("posGroup", "F")
            .with("date", format!("2024-10-{:02}", player % 28 + 1))
            .with("G", goals)
            .with("A", (player % 2) as f64)
            .with("SOG", shots)
            .with("HIT", (player % 4) as f64)
    }

    /// 60 forward day-lines, G cycling 0, 1, 2 (mean 1).
    fn scenario_lines() -> Vec<Record> {
        (0..60)
            .map(|i| forward_day(i, "10", (i % 3) as f64, (i % 5 + 1) as f64))
            .collect()
    }

    #[test]
    fn trains_forward_day_model() {
        let model = train_at(&scenario_lines(), &TrainingConfig::default(), ts());
        let psm = model.get("RS:10:playerDay:F").expect("model trained");
        assert_eq!(psm.sample_size, 60);
        assert!(psm.weights[&Category::G] > 0.0);
        assert!(approx_eq(psm.distributions[&Category::G].mean, 1.0, 1e-12));
        assert!(psm.distributions[&Category::G].std_dev > 0.0);
        assert!(approx_eq(psm.distributions[&Category::G].percentiles.p50, 1.0, 1e-12));
        assert_eq!(model.total_samples, 60);
        assert_eq!(model.version, MODEL_VERSION);
    }

    #[test]
    fn trained_weights_are_normalized() {
        let model = train_at(&scenario_lines(), &TrainingConfig::default(), ts());
        let psm = model.get("RS:10:playerDay:F").unwrap();
        let relevant: f64 = PosGroup::Forward
            .relevant_categories()
            .iter()
            .map(|c| psm.weights[c])
            .sum();
        assert!(approx_eq(relevant, 7.0, 1e-9));
        assert_eq!(psm.weights[&Category::GAA], 0.0);
        assert_eq!(psm.weights[&Category::W], 0.0);
    }

    #[test]
    fn composite_percentiles_are_monotone() {
        let model = train_at(&scenario_lines(), &TrainingConfig::default(), ts());
        for psm in model.models.values() {
            let mut dists: Vec<&Distribution> = psm.distributions.values().collect();
            dists.push(&psm.composite_distribution);
            for d in dists {
                let anchors = d.anchors();
                for pair in anchors.windows(2) {
                    assert!(pair[0].0 <= pair[1].0);
                }
            }
        }
    }

    #[test]
    fn undersized_groups_are_skipped() {
        let mut lines = scenario_lines();
        lines.extend((0..10).map(|i| forward_day(i, "9", 1.0, 2.0)));
        lines.push(Record::new().with("playerId", "bad"));
        let (model, report) = train_with_report(&lines, &TrainingConfig::default(), ts());
        assert!(model.get("RS:9:playerDay:F").is_none());
        assert_eq!(report.classified, 70);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.groups, 2);
        assert_eq!(report.trained, 1);
        assert_eq!(report.undersized, vec![("RS:9:playerDay:F".to_string(), 10)]);
        assert_eq!(model.season_range.earliest, "10");
        assert_eq!(model.season_range.latest, "10");
    }

    #[test]
    fn empty_input_trains_empty_model() {
        let (model, report) = train_with_report(&[], &TrainingConfig::default(), ts());
        assert!(model.models.is_empty());
        assert!(model.global_weights.is_empty());
        assert_eq!(model.season_range, SeasonRange::default());
        assert_eq!(report, TrainingReport::default());
    }

    #[test]
    fn training_is_order_independent() {
        let lines = scenario_lines();
        let mut reversed = lines.clone();
        reversed.reverse();
        let mut rotated = lines.clone();
        rotated.rotate_left(17);

        let config = TrainingConfig::default();
        let a = serialize_model(&train_at(&lines, &config, ts())).unwrap();
        let b = serialize_model(&train_at(&reversed, &config, ts())).unwrap();
        let c = serialize_model(&train_at(&rotated, &config, ts())).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn trained_at_truncates_to_seconds() {
        let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(750);
        let model = train_at(&[], &TrainingConfig::default(), stamp);
        assert_eq!(model.trained_at, ts());
    }

    #[test]
    fn season_range_orders_numerically() {
        let mut lines = Vec::new();
        for season in ["9", "10", "7"] {
            lines.extend((0..5).map(|i| forward_day(i, season, (i % 3) as f64, 2.0)));
        }
        let config = TrainingConfig {
            min_sample_size: 5,
            ..TrainingConfig::default()
        };
        let model = train_at(&lines, &config, ts());
        assert_eq!(model.models.len(), 3);
        assert_eq!(model.season_range.earliest, "7");
        assert_eq!(model.season_range.latest, "10");
    }

    #[test]
    fn global_weights_average_per_position() {
        let mut lines = Vec::new();
        for season in ["7", "10"] {
            lines.extend((0..6).map(|i| forward_day(i, season, (i % 3) as f64, (i + 1) as f64)));
        }
        let config = TrainingConfig {
            min_sample_size: 5,
            ..TrainingConfig::default()
        };
        let model = train_at(&lines, &config, ts());
        let global = &model.global_weights[&PosGroup::Forward];
        let a = &model.models["RS:7:playerDay:F"].weights;
        let b = &model.models["RS:10:playerDay:F"].weights;
        for c in Category::ALL {
            assert!(approx_eq(global[&c], (a[&c] + b[&c]) / 2.0, 1e-12));
        }
        assert!(!model.global_weights.contains_key(&PosGroup::Goalie));
    }

    #[test]
    fn blend_weights_sum_to_one_and_lean_volatile_for_days() {
        let mut lines = scenario_lines();
        // A calm weekly group for the same players.
        lines.extend((0..60).map(|i| {
            Record::new()
                .with("playerId", format!("p{i}"))
                .with("seasonId", "10")
                .with("posGroup", "F")
                .with("weekId", "3")
                .with("days", 7)
                .with("G", 3.0 + (i % 2) as f64)
                .with("SOG", 20.0)
        }));
        let model = train_at(&lines, &TrainingConfig::default(), ts());
        let day = model.aggregation_blend_weights[&AggregationLevel::PlayerDay][&PosGroup::Forward];
        let week =
            model.aggregation_blend_weights[&AggregationLevel::PlayerWeek][&PosGroup::Forward];
        assert!(approx_eq(day.total(), 1.0, 1e-12));
        assert!(approx_eq(week.total(), 1.0, 1e-12));
        assert!(day.full < week.full);
        assert!(day.top2 > week.top2);
    }

    #[test]
    fn blend_weights_can_be_disabled() {
        let config = TrainingConfig {
            compute_blend_weights: false,
            ..TrainingConfig::default()
        };
        let model = train_at(&scenario_lines(), &config, ts());
        assert!(model.aggregation_blend_weights.is_empty());
    }

    #[test]
    fn week_lookup_sets_phase() {
        let lines: Vec<Record> = (0..5)
            .map(|i| {
                Record::new()
                    .with("playerId", format!("p{i}"))
                    .with("seasonId", "10")
                    .with("posGroup", "G")
                    .with("weekId", "15")
                    .with("days", 7)
                    .with("W", (i % 3) as f64)
                    .with("SV", 100.0 + i as f64)
            })
            .collect();
        let mut config = TrainingConfig {
            min_sample_size: 5,
            ..TrainingConfig::default()
        };
        config.week_type_lookup.insert("15".into(), SeasonPhase::Playoffs);
        let model = train_at(&lines, &config, ts());
        assert!(model.get("PO:10:playerWeek:G").is_some());
    }

    #[test]
    fn loads_lines_from_several_tables() {
        let store = MemoryStore::new();
        let day = forward_day(1, "10", 1.0, 3.0);
        let week = Record::new()
            .with("playerId", "p1")
            .with("seasonId", "10")
            .with("weekId", "3")
            .with("days", 7);
        store.upsert("PlayerDayStatLine", "p1|2024-10-02", &day).unwrap();
        store.upsert("PlayerWeekStatLine", "p1|3", &week).unwrap();
        let other = week.clone().with("playerId", "p2").with("seasonId", "9");
        store.upsert("PlayerWeekStatLine", "p2|3", &other).unwrap();

        let tables = ["PlayerDayStatLine", "PlayerWeekStatLine"];
        let all = load_stat_lines(&store, &tables, &Filter::new()).unwrap();
        assert_eq!(all.len(), 3);
        let season10 = load_stat_lines(
            &store,
            &["PlayerDayStatLine", "PlayerWeekStatLine"],
            &Filter::new().field("seasonId", "10"),
        )
        .unwrap();
        assert_eq!(season10.len(), 2);
    }
}
