//! Quantile thresholds against the base dataset
//!
//! Thresholds are always derived from the full base distribution of a
//! column, never from a filtered view, so they do not move when unrelated
//! filters change.

use crate::dataset::{f64_column, BaseDataset};
use crate::error::{Result, SliceError};

/// Quantile of an ascending slice using linear interpolation between the
/// two closest ranks (`h = (n - 1) * q`).
pub fn quantile_sorted(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * fraction;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let weight = h - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * weight)
}

/// Non-null, non-NaN values of a column in ascending order.
pub(crate) fn sorted_values(base: &BaseDataset, column: &str) -> Result<Vec<f64>> {
    let values = f64_column(base.batch(), column)?;
    let mut sorted: Vec<f64> = values.iter().flatten().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    Ok(sorted)
}

/// `fraction` quantile of `column` over the whole base dataset.
///
/// Returns `Ok(None)` when the column holds no values.
pub fn quantile(base: &BaseDataset, column: &str, fraction: f64) -> Result<Option<f64>> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(SliceError::InvalidFraction(fraction));
    }
    let sorted = sorted_values(base, column)?;
    Ok(quantile_sorted(&sorted, fraction))
}

/// Threshold pair for a quantile window given as fractions in [0, 1].
pub fn fraction_window(base: &BaseDataset, column: &str, lower: f64, upper: f64) -> Result<Option<(f64, f64)>> {
    for fraction in [lower, upper] {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(SliceError::InvalidFraction(fraction));
        }
    }
    let sorted = sorted_values(base, column)?;
    Ok(quantile_sorted(&sorted, lower).zip(quantile_sorted(&sorted, upper)))
}

/// Threshold pair for a percentile slider window given in 0..=100.
pub fn percentile_window(
    base: &BaseDataset,
    column: &str,
    lower_pct: f64,
    upper_pct: f64,
) -> Result<Option<(f64, f64)>> {
    fraction_window(base, column, lower_pct / 100.0, upper_pct / 100.0)
}
