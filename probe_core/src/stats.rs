//! Summary statistics over sample sets.
//!
//! Quantiles use linear interpolation between order statistics
//! (Hyndman–Fan type 7): for sorted `x[0..n)` and `p` in `[0, 1]`,
//! `h = (n - 1) * p` and the result is `x[⌊h⌋] + (h - ⌊h⌋) * (x[⌊h⌋ + 1] - x[⌊h⌋])`.
//! The median is the `p = 0.5` case, so it agrees with q1/q3 by construction.
//!
//! Everything here is pure: no I/O, inputs are never mutated, and the same
//! input always produces bit-identical output.

use crate::config::{DEFAULT_BAND_MM, SampleAggregate};
use crate::sample::{SampleSet, TestKind};

/// Read-only summary of one `SampleSet`.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Sample standard deviation (n - 1); `None` for a single sample.
    pub std_dev: Option<f64>,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    /// `q3 - q1`, the width of the middle 50%.
    pub iqr: f64,
    pub range: f64,
    pub first: f64,
    pub last: f64,
    /// `last - first`, a coarse drift indicator available for every kind.
    pub first_last_delta: f64,
    /// Least-squares slope in mm per sample. Drift units with at least two
    /// samples only; `None` means not applicable.
    pub drift_slope: Option<f64>,
    /// Threshold the band flags were computed with (mm).
    pub band_mm: f64,
    /// Per sample, in set order: `|z - median| > band_mm`.
    pub outside_band: Vec<bool>,
}

impl SummaryStats {
    pub fn outside_band_count(&self) -> usize {
        self.outside_band.iter().filter(|f| **f).count()
    }
}

/// Computes `SummaryStats` with a fixed outside-band threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsEngine {
    band_mm: f64,
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self {
            band_mm: DEFAULT_BAND_MM,
        }
    }
}

impl StatsEngine {
    pub fn new(band_mm: f64) -> Self {
        Self { band_mm }
    }

    pub fn band_mm(&self) -> f64 {
        self.band_mm
    }

    /// Summarize a set; `None` when it is empty.
    pub fn summarize(&self, set: &SampleSet) -> Option<SummaryStats> {
        let ys = set.heights();
        let (&first, &last) = (ys.first()?, ys.last()?);
        let mut sorted = ys.clone();
        sorted.sort_by(f64::total_cmp);

        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let median = quantile_sorted(&sorted, 0.5)?;
        let q1 = quantile_sorted(&sorted, 0.25)?;
        let q3 = quantile_sorted(&sorted, 0.75)?;
        let outside_band = ys
            .iter()
            .map(|z| (z - median).abs() > self.band_mm)
            .collect();
        let drift_slope = match set.kind() {
            TestKind::Drift => least_squares_slope(&ys),
            _ => None,
        };

        Some(SummaryStats {
            count: ys.len(),
            min,
            max,
            mean: mean(&ys)?,
            std_dev: sample_std_dev(&ys),
            median,
            q1,
            q3,
            iqr: q3 - q1,
            range: max - min,
            first,
            last,
            first_last_delta: last - first,
            drift_slope,
            band_mm: self.band_mm,
            outside_band,
        })
    }
}

/// Type-7 quantile on **pre-sorted** data; `None` when empty or `p` is outside `[0, 1]`.
pub fn quantile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let frac = h - h.floor();
    if frac == 0.0 || lo + 1 >= sorted.len() {
        return Some(sorted[lo]);
    }
    let (a, b) = (sorted[lo], sorted[lo + 1]);
    // Rounding must never step outside the bracketing order statistics.
    let v = a + frac * (b - a);
    Some(if v < a {
        a
    } else if v > b {
        b
    } else {
        v
    })
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, 0.5)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n - 1); `None` below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Least-squares slope of `ys` against their index (0, 1, 2, ...).
///
/// Terms are paired symmetrically around the mean index, so the numerator is
/// `Σ d_i * (y[n-1-i] - y[i])` with `d_i > 0`: a constant series gives exactly
/// 0 and a strictly increasing one is strictly positive. `None` below two values.
pub fn least_squares_slope(ys: &[f64]) -> Option<f64> {
    let n = ys.len();
    if n < 2 {
        return None;
    }
    let mid = (n - 1) as f64 / 2.0;
    let mut sxy = 0.0f64;
    let mut sxx = 0.0f64;
    for i in 0..n / 2 {
        let d = mid - i as f64;
        sxy += d * (ys[n - 1 - i] - ys[i]);
        sxx += 2.0 * d * d;
    }
    Some(sxy / sxx)
}

/// Cross-unit repeatability for one prefix length of every unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    /// Number of leading samples aggregated per unit.
    pub sample_count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: Option<f64>,
    pub range: f64,
}

/// How the spread of per-unit results changes with the per-unit sample count.
///
/// For each `k` in `1..=shortest unit`, every unit is reduced to the mean or
/// median of its first `k` samples, and those unit results are summarized.
pub fn repeatability_profile(sets: &[&SampleSet], agg: SampleAggregate) -> Vec<ProfileRow> {
    let Some(shortest) = sets.iter().map(|s| s.len()).min() else {
        return Vec::new();
    };
    let heights: Vec<Vec<f64>> = sets.iter().map(|s| s.heights()).collect();
    let mut rows = Vec::with_capacity(shortest);
    for k in 1..=shortest {
        let per_unit: Vec<f64> = heights
            .iter()
            .filter_map(|h| match agg {
                SampleAggregate::Mean => mean(&h[..k]),
                SampleAggregate::Median => median(&h[..k]),
            })
            .collect();
        let (Some(m), Some(lo), Some(hi)) = (
            mean(&per_unit),
            per_unit.iter().copied().reduce(f64::min),
            per_unit.iter().copied().reduce(f64::max),
        ) else {
            continue;
        };
        rows.push(ProfileRow {
            sample_count: k,
            mean: m,
            min: lo,
            max: hi,
            std_dev: sample_std_dev(&per_unit),
            range: hi - lo,
        });
    }
    rows
}
