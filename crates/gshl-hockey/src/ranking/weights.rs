// Weight calculator: per-category weights from relative variance, optional
// scarcity/impact adjustments and fixed position multipliers.

use std::collections::BTreeMap;

use crate::ranking::distribution::{mean_and_std_dev, STDEV_EPSILON};
use crate::stats::classify::PosGroup;
use crate::stats::schema::{Category, ParsedStats};

/// Category -> non-negative weight. Always holds every `Category::ALL` key.
pub type CategoryWeights = BTreeMap<Category, f64>;

/// Floor for the variance signal so rarely-populated categories keep a say.
pub const MIN_BASE_WEIGHT: f64 = 0.05;

/// Caller-supplied multipliers on the variance signal. Missing entries are 1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightAdjustments {
    /// Cross-entity variance signal, usually measured at another
    /// aggregation level.
    pub scarcity: BTreeMap<Category, f64>,
    /// Inverse of each category's typical magnitude, to stop high-count
    /// categories drowning out low-count ones.
    pub category_impact: BTreeMap<Category, f64>,
}

impl WeightAdjustments {
    fn factor(&self, category: Category) -> f64 {
        let scarcity = self.scarcity.get(&category).copied().unwrap_or(1.0);
        let impact = self.category_impact.get(&category).copied().unwrap_or(1.0);
        scarcity * impact
    }
}

// ---------------------------------------------------------------------------
// Position multipliers
// ---------------------------------------------------------------------------

const FORWARD_MULTIPLIERS: &[(Category, f64)] = &[
    (Category::G, 1.15),
    (Category::P, 1.10),
    (Category::PPP, 1.05),
    (Category::BLK, 0.85),
];

const DEFENSE_MULTIPLIERS: &[(Category, f64)] = &[
    (Category::BLK, 1.20),
    (Category::HIT, 1.10),
    (Category::A, 1.10),
    (Category::G, 0.90),
];

const GOALIE_MULTIPLIERS: &[(Category, f64)] = &[
    (Category::W, 1.20),
    (Category::SVP, 1.15),
    (Category::GAA, 1.10),
    (Category::GA, 0.85),
];

/// Fixed multiplier for `category` in `pos_group`; 1.0 when none applies.
/// Teams carry no position adjustments.
pub fn position_multiplier(pos_group: PosGroup, category: Category) -> f64 {
    let table: &[(Category, f64)] = match pos_group {
        PosGroup::Forward => FORWARD_MULTIPLIERS,
        PosGroup::Defense => DEFENSE_MULTIPLIERS,
        PosGroup::Goalie => GOALIE_MULTIPLIERS,
        PosGroup::Team => &[],
    };
    table
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, m)| *m)
        .unwrap_or(1.0)
}

// ---------------------------------------------------------------------------
// Core computation
// ---------------------------------------------------------------------------

/// Scale weights so the group's relevant categories average 1 and force
/// every irrelevant category to exactly 0. A zero or non-finite total falls
/// back to uniform weights.
pub fn normalize_weights(weights: &mut CategoryWeights, pos_group: PosGroup) {
    for category in Category::ALL {
        let w = weights.entry(category).or_insert(0.0);
        if !pos_group.is_relevant(category) || !w.is_finite() || *w < 0.0 {
            *w = 0.0;
        }
    }
    let relevant = pos_group.relevant_categories();
    let total: f64 = relevant.iter().map(|c| weights[c]).sum();
    let count = relevant.len() as f64;
    for category in relevant {
        let w = weights.entry(*category).or_insert(0.0);
        *w = if total > STDEV_EPSILON && total.is_finite() {
            *w * count / total
        } else {
            1.0
        };
    }
}

/// Per-category weights for one position group's sample.
///
/// 1. Base signal: coefficient of variation across the sample, floored at
///    [`MIN_BASE_WEIGHT`].
/// 2. Multiply by caller adjustments, if given.
/// 3. Normalize (relevant average 1, irrelevant 0).
/// 4. Apply position multipliers, then normalize again.
pub fn compute_weights(
    samples: &[ParsedStats],
    pos_group: PosGroup,
    adjustments: Option<&WeightAdjustments>,
) -> CategoryWeights {
    let mut weights = CategoryWeights::new();
    for category in Category::ALL {
        let values: Vec<f64> = samples.iter().map(|s| s.category(category)).collect();
        let (mean, std_dev) = mean_and_std_dev(&values);
        let cv = if mean.abs() < STDEV_EPSILON {
            0.0
        } else {
            std_dev / mean.abs()
        };
        let mut base = cv.max(MIN_BASE_WEIGHT);
        if let Some(adj) = adjustments {
            base *= adj.factor(category);
        }
        weights.insert(category, base);
    }
    normalize_weights(&mut weights, pos_group);

    for (category, w) in weights.iter_mut() {
        *w *= position_multiplier(pos_group, *category);
    }
    normalize_weights(&mut weights, pos_group);
    weights
}

/// Shrink weights toward uniform: `w = (1 - factor) * w + factor`. Keeps the
/// relevant average at 1.
pub fn smooth_weights(weights: &mut CategoryWeights, pos_group: PosGroup, factor: f64) {
    let factor = factor.clamp(0.0, 1.0);
    for category in pos_group.relevant_categories() {
        if let Some(w) = weights.get_mut(category) {
            *w = (1.0 - factor) * *w + factor;
        }
    }
    normalize_weights(weights, pos_group);
}

/// Uniform weights: 1 for every relevant category, 0 elsewhere.
pub fn uniform_weights(pos_group: PosGroup) -> CategoryWeights {
    Category::ALL
        .iter()
        .map(|c| (*c, if pos_group.is_relevant(*c) { 1.0 } else { 0.0 }))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
