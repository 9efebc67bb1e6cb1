//! One-dimensional distribution summaries: histograms, box summaries and
//! per-group box/violin data.

use std::collections::BTreeMap;

use arrow::array::Array;
use serde::{Deserialize, Serialize};

use crate::aggregator::{group_keys, GroupKey};
use crate::dataset::{f64_column, FilteredView};
use crate::error::Result;
use crate::percentile::quantile_sorted;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub column: String,
    pub bins: Vec<HistogramBin>,
}

impl Histogram {
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|b| b.count).sum()
    }
}

/// Equal-width histogram over the observed range of `column`. The last bin
/// is closed on the right. `None` when the column has no values.
pub fn histogram(view: &FilteredView, column: &str, bins: u32) -> Result<Option<Histogram>> {
    let values = view.numeric_values(column)?;
    let bins = bins.max(1) as usize;
    let Some((min, max)) = values.iter().fold(None, |acc: Option<(f64, f64)>, &v| match acc {
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        None => Some((v, v)),
    }) else {
        return Ok(None);
    };

    if min == max {
        return Ok(Some(Histogram {
            column: column.to_string(),
            bins: vec![HistogramBin {
                start: min,
                end: max,
                count: values.len() as u64,
            }],
        }));
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0u64; bins];
    for v in &values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let bins = counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + width * i as f64,
            end: if i + 1 == bins { max } else { min + width * (i + 1) as f64 },
            count,
        })
        .collect();
    Ok(Some(Histogram {
        column: column.to_string(),
        bins,
    }))
}

/// Five-number summary with Tukey whiskers (1.5 IQR, clamped to data).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: usize,
}

pub fn box_summary(values: &[f64]) -> Option<BoxSummary> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    let (&min, &max) = (sorted.first()?, sorted.last()?);

    let q1 = quantile_sorted(&sorted, 0.25)?;
    let median = quantile_sorted(&sorted, 0.5)?;
    let q3 = quantile_sorted(&sorted, 0.75)?;
    let reach = 1.5 * (q3 - q1);
    let (low_fence, high_fence) = (q1 - reach, q3 + reach);

    let inside = sorted.iter().filter(|v| **v >= low_fence && **v <= high_fence);
    let lower_whisker = inside.clone().next().copied().unwrap_or(min);
    let upper_whisker = inside.last().copied().unwrap_or(max);
    let outliers = sorted.iter().filter(|v| **v < low_fence || **v > high_fence).count();

    Some(BoxSummary {
        count: sorted.len(),
        mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
        min,
        q1,
        median,
        q3,
        max,
        lower_whisker,
        upper_whisker,
        outliers,
    })
}

pub fn column_box_summary(view: &FilteredView, column: &str) -> Result<Option<BoxSummary>> {
    Ok(box_summary(&view.numeric_values(column)?))
}

/// Mean of the non-null values of `column`; `None` when there are none.
pub fn mean(view: &FilteredView, column: &str) -> Result<Option<f64>> {
    let values = view.numeric_values(column)?;
    if values.is_empty() {
        return Ok(None);
    }
    Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionMode {
    #[default]
    Box,
    Violin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDistribution {
    pub key: GroupKey,
    pub summary: BoxSummary,
    /// Raw values, kept only for violin plots.
    pub samples: Option<Vec<f64>>,
}

/// Distribution of `metric` within each `group_by` group.
pub fn grouped_distribution(
    view: &FilteredView,
    group_by: &str,
    metric: &str,
    mode: DistributionMode,
) -> Result<Vec<GroupDistribution>> {
    let keys = group_keys(view.batch(), group_by)?;
    let values = f64_column(view.batch(), metric)?;

    let mut groups: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for (row, key) in keys.into_iter().enumerate() {
        if let Some(key) = key {
            if values.is_valid(row) && !values.value(row).is_nan() {
                groups.entry(key).or_default().push(values.value(row));
            }
        }
    }

    Ok(groups
        .into_iter()
        .filter_map(|(key, samples)| {
            box_summary(&samples).map(|summary| GroupDistribution {
                key,
                summary,
                samples: (mode == DistributionMode::Violin).then_some(samples),
            })
        })
        .collect())
}
