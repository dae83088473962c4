// Composite score shared by training and scoring.

use std::collections::BTreeMap;

use crate::ranking::distribution::{Distribution, STDEV_EPSILON};
use crate::ranking::weights::CategoryWeights;
use crate::stats::classify::PosGroup;
use crate::stats::schema::{Category, ParsedStats};

/// Weighted sum of mean-relative category values:
/// `sum(sign_c * w_c * value_c / |mean_c|)` over the group's relevant
/// categories.
///
/// Dividing by the category mean lets a 0.915 save percentage and a
/// 30-save night sit in the same sum. Categories whose mean is ~0 (or which
/// have no distribution) contribute nothing.
pub fn composite_score(
    stats: &ParsedStats,
    weights: &CategoryWeights,
    distributions: &BTreeMap<Category, Distribution>,
    pos_group: PosGroup,
) -> f64 {
    pos_group
        .relevant_categories()
        .iter()
        .map(|category| {
            let weight = weights.get(category).copied().unwrap_or(0.0);
            let mean = distributions.get(category).map(|d| d.mean).unwrap_or(0.0);
            if weight == 0.0 || mean.abs() < STDEV_EPSILON {
                0.0
            } else {
                category.sign() * weight * stats.category(*category) / mean.abs()
            }
        })
        .sum()
}
