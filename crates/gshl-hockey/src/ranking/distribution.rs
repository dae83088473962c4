// Distribution builder: summary statistics, interpolated percentile
// breakpoints and z-score outlier trimming.

use serde::{Deserialize, Serialize};

/// Threshold below which a standard deviation or spread is treated as zero.
pub const STDEV_EPSILON: f64 = 1e-9;

/// Percentile breakpoints of a sorted sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Summary of a numeric sample.
///
/// Built from a sorted sample, so `min <= p10 <= ... <= p99 <= max` always
/// holds. An empty sample is all zeros; a single value collapses every
/// field onto that value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: Percentiles,
}

impl Distribution {
    /// `(value, percentile)` interpolation table anchored at
    /// 0/10/25/50/75/90/95/99/100.
    pub fn anchors(&self) -> [(f64, f64); 9] {
        let p = &self.percentiles;
        [
            (self.min, 0.0),
            (p.p10, 10.0),
            (p.p25, 25.0),
            (p.p50, 50.0),
            (p.p75, 75.0),
            (p.p90, 90.0),
            (p.p95, 95.0),
            (p.p99, 99.0),
            (self.max, 100.0),
        ]
    }

    /// `std_dev / |mean|`, or 0 when the mean is approximately zero.
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean.abs() < STDEV_EPSILON {
            0.0
        } else {
            self.std_dev / self.mean.abs()
        }
    }

    /// Whether every breakpoint sits on the same value.
    pub fn is_degenerate(&self) -> bool {
        self.max - self.min < STDEV_EPSILON
    }

    /// Percentile of `value` within this distribution (see
    /// [`interpolate_percentile`]).
    pub fn percentile_of(&self, value: f64) -> f64 {
        interpolate_percentile(value, self)
    }
}

/// Population mean and standard deviation (N denominator): the sample is the
/// whole relevant population for its key, not a draw from it.
pub fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Linear interpolation at rank `(n - 1) * p` of an ascending slice.
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (n - 1) as f64 * p.clamp(0.0, 1.0);
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let frac = rank - lower as f64;
            sorted[lower] + (sorted[upper] - sorted[lower]) * frac
        }
    }
}

/// Build a distribution over `values` (any order).
pub fn build_distribution(values: &[f64]) -> Distribution {
    if values.is_empty() {
        return Distribution::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (mean, std_dev) = mean_and_std_dev(&sorted);
    Distribution {
        mean,
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        percentiles: Percentiles {
            p10: quantile(&sorted, 0.10),
            p25: quantile(&sorted, 0.25),
            p50: quantile(&sorted, 0.50),
            p75: quantile(&sorted, 0.75),
            p90: quantile(&sorted, 0.90),
            p95: quantile(&sorted, 0.95),
            p99: quantile(&sorted, 0.99),
        },
    }
}

/// Whether `value`'s z-score magnitude exceeds `threshold`. A zero standard
/// deviation never flags anything.
pub fn is_outlier(value: f64, mean: f64, std_dev: f64, threshold: f64) -> bool {
    if std_dev < STDEV_EPSILON {
        return false;
    }
    ((value - mean) / std_dev).abs() > threshold
}

/// Build a distribution after dropping z-score outliers. Falls back to the
/// untrimmed sample if trimming would leave nothing.
pub fn build_trimmed_distribution(values: &[f64], threshold: f64) -> Distribution {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let (mean, std_dev) = mean_and_std_dev(&sorted);
    let kept: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|v| !is_outlier(*v, mean, std_dev, threshold))
        .collect();
    if kept.is_empty() {
        build_distribution(&sorted)
    } else {
        build_distribution(&kept)
    }
}

/// Piecewise-linear percentile of `value` against a distribution's anchor
/// table.
///
/// - Degenerate distributions (no spread, including the empty one) give 50.
/// - Below `min` gives 0, above `max` gives 100.
/// - A value sitting exactly on several tied anchors gets the midpoint of
///   their percentiles, so a run of identical breakpoints isn't biased low.
pub fn interpolate_percentile(value: f64, distribution: &Distribution) -> f64 {
    if distribution.is_degenerate() {
        return 50.0;
    }
    let anchors = distribution.anchors();
    if value < anchors[0].0 {
        return 0.0;
    }
    if value > anchors[anchors.len() - 1].0 {
        return 100.0;
    }

    let mut tied = anchors
        .iter()
        .filter(|(x, _)| (x - value).abs() < STDEV_EPSILON)
        .map(|(_, p)| *p);
    if let Some(first) = tied.next() {
        let last = tied.last().unwrap_or(first);
        return (first + last) / 2.0;
    }

    for pair in anchors.windows(2) {
        let (x0, p0) = pair[0];
        let (x1, p1) = pair[1];
        if value > x0 && value < x1 {
            return p0 + (value - x0) / (x1 - x0) * (p1 - p0);
        }
    }
    100.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
