//! Vectorized filter criteria using Arrow compute kernels
//!
//! Every criterion yields a boolean mask over the rows of a target batch.
//! A filter set ANDs the masks and applies them in one `filter_record_batch`
//! call, so the order criteria are listed in never changes the result.
//! Percentile thresholds are resolved against the base dataset even when the
//! target is an already filtered view.

use arrow::array::{Array, BooleanArray, Date32Array, Float64Array, RecordBatch, StringArray};
use arrow::compute::kernels::boolean::{and, or};
use arrow::compute::kernels::cmp::{eq, gt_eq, lt_eq};
use arrow_schema::DataType;
use arrow_select::filter::{filter_record_batch, prep_null_mask_filter};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::{column_by_name, f64_column, BaseDataset, FilteredView};
use crate::error::{Result, SliceError};
use crate::percentile::{fraction_window, quantile};
use crate::records::date_to_days;

/// The percentile toggle always cuts at the base median.
pub const TOGGLE_FRACTION: f64 = 0.5;

/// A literal accepted by set-membership criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterCriterion {
    /// `min <= column <= max`, either side optional.
    Range {
        column: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// `column IN allowed`; an empty list restricts nothing.
    SetMembership {
        column: String,
        allowed: Vec<FilterValue>,
    },
    /// `column IN allowed` over a flag column; an empty list restricts nothing.
    BooleanFlag { column: String, allowed: Vec<bool> },
    /// `start <= column <= end` over a Date32 column, either side optional.
    DateRange {
        column: String,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    /// When active, `metric <= median(base.metric)`.
    PercentileToggle { metric: String, active: bool },
    /// `quantile(base.metric, lower) <= metric <= quantile(base.metric, upper)`,
    /// fractions in [0, 1].
    PercentileWindow { metric: String, lower: f64, upper: f64 },
}

impl FilterCriterion {
    pub fn column(&self) -> &str {
        match self {
            FilterCriterion::Range { column, .. }
            | FilterCriterion::SetMembership { column, .. }
            | FilterCriterion::BooleanFlag { column, .. }
            | FilterCriterion::DateRange { column, .. } => column,
            FilterCriterion::PercentileToggle { metric, .. }
            | FilterCriterion::PercentileWindow { metric, .. } => metric,
        }
    }

    /// True when the criterion cannot exclude any row.
    pub fn is_identity(&self) -> bool {
        match self {
            FilterCriterion::Range { min, max, .. } => min.is_none() && max.is_none(),
            FilterCriterion::SetMembership { allowed, .. } => allowed.is_empty(),
            FilterCriterion::BooleanFlag { allowed, .. } => allowed.is_empty(),
            FilterCriterion::DateRange { start, end, .. } => start.is_none() && end.is_none(),
            FilterCriterion::PercentileToggle { active, .. } => !active,
            FilterCriterion::PercentileWindow { .. } => false,
        }
    }

    /// Mask over the rows of `target`, or `None` for an identity criterion.
    /// Nulls in the returned mask are already folded to `false`.
    pub fn mask(&self, base: &BaseDataset, target: &RecordBatch) -> Result<Option<BooleanArray>> {
        if self.is_identity() {
            return Ok(None);
        }
        let mask = match self {
            FilterCriterion::Range { column, min, max } => {
                range_mask(&f64_column(target, column)?, *min, *max)?
            }
            FilterCriterion::SetMembership { column, allowed } => {
                any_of(allowed.iter().map(|value| value_mask(target, column, value)))?
            }
            FilterCriterion::BooleanFlag { column, allowed } => any_of(
                allowed
                    .iter()
                    .map(|flag| value_mask(target, column, &FilterValue::Bool(*flag))),
            )?,
            FilterCriterion::DateRange { column, start, end } => date_mask(target, column, *start, *end)?,
            FilterCriterion::PercentileToggle { metric, .. } => {
                let threshold = quantile(base, metric, TOGGLE_FRACTION)?;
                range_mask(&f64_column(target, metric)?, None, threshold)?
            }
            FilterCriterion::PercentileWindow { metric, lower, upper } => {
                match fraction_window(base, metric, *lower, *upper)? {
                    Some((min, max)) => range_mask(&f64_column(target, metric)?, Some(min), Some(max))?,
                    None => None,
                }
            }
        };
        Ok(mask.map(fold_nulls))
    }
}

/// Null mask slots become `false`. Masks without a null buffer pass through.
fn fold_nulls(mask: BooleanArray) -> BooleanArray {
    if mask.null_count() > 0 {
        prep_null_mask_filter(&mask)
    } else {
        mask
    }
}

fn range_mask(values: &Float64Array, min: Option<f64>, max: Option<f64>) -> Result<Option<BooleanArray>> {
    let lower = min
        .map(|min| gt_eq(values, &Float64Array::new_scalar(min)))
        .transpose()?;
    let upper = max
        .map(|max| lt_eq(values, &Float64Array::new_scalar(max)))
        .transpose()?;
    let bounded = match (lower, upper) {
        (Some(l), Some(u)) => and(&l, &u)?,
        (Some(mask), None) | (None, Some(mask)) => mask,
        (None, None) => return Ok(None),
    };
    // cmp kernels order NaN above every number; treat it as missing instead
    let not_nan = BooleanArray::from_unary(values, |v| !v.is_nan());
    Ok(Some(and(&bounded, &not_nan)?))
}

fn date_mask(
    target: &RecordBatch,
    column: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Option<BooleanArray>> {
    let col = column_by_name(target, column)?;
    let dates = col
        .as_any()
        .downcast_ref::<Date32Array>()
        .ok_or_else(|| SliceError::UnsupportedColumnType {
            column: column.to_string(),
            data_type: col.data_type().clone(),
        })?;
    let lower = start
        .map(|start| gt_eq(dates, &Date32Array::new_scalar(date_to_days(start))))
        .transpose()?;
    let upper = end
        .map(|end| lt_eq(dates, &Date32Array::new_scalar(date_to_days(end))))
        .transpose()?;
    Ok(match (lower, upper) {
        (Some(l), Some(u)) => Some(and(&l, &u)?),
        (l, u) => l.or(u),
    })
}

/// Equality mask of one column against one literal.
fn value_mask(target: &RecordBatch, column: &str, value: &FilterValue) -> Result<BooleanArray> {
    let col = column_by_name(target, column)?;
    let unsupported = || SliceError::UnsupportedColumnType {
        column: column.to_string(),
        data_type: col.data_type().clone(),
    };
    match (value, col.data_type()) {
        (FilterValue::Text(text), DataType::Utf8) => Ok(eq(col, &StringArray::new_scalar(text))?),
        (FilterValue::Bool(flag), DataType::Boolean) => Ok(eq(col, &BooleanArray::new_scalar(*flag))?),
        (FilterValue::Bool(flag), data_type) if data_type.is_numeric() => {
            let numeric = if *flag { 1.0 } else { 0.0 };
            Ok(eq(&f64_column(target, column)?, &Float64Array::new_scalar(numeric))?)
        }
        (FilterValue::Int(number), _) => Ok(eq(&f64_column(target, column)?, &Float64Array::new_scalar(*number as f64))?),
        (FilterValue::Float(number), _) => Ok(eq(&f64_column(target, column)?, &Float64Array::new_scalar(*number))?),
        _ => Err(unsupported()),
    }
}

fn any_of(masks: impl Iterator<Item = Result<BooleanArray>>) -> Result<Option<BooleanArray>> {
    let mut combined: Option<BooleanArray> = None;
    for mask in masks {
        let mask = fold_nulls(mask?);
        combined = Some(match combined {
            Some(acc) => or(&acc, &mask)?,
            None => mask,
        });
    }
    Ok(combined)
}

/// The conjunction of a list of criteria.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    criteria: Vec<FilterCriterion>,
}

impl FilterSet {
    pub fn new(criteria: Vec<FilterCriterion>) -> Self {
        Self { criteria }
    }

    pub fn push(&mut self, criterion: FilterCriterion) {
        self.criteria.push(criterion);
    }

    pub fn criteria(&self) -> &[FilterCriterion] {
        &self.criteria
    }

    pub fn active(&self) -> impl Iterator<Item = &FilterCriterion> {
        self.criteria.iter().filter(|c| !c.is_identity())
    }

    /// AND of every criterion's mask over `target`; `None` when all are identity.
    pub fn mask(&self, base: &BaseDataset, target: &RecordBatch) -> Result<Option<BooleanArray>> {
        let mut combined: Option<BooleanArray> = None;
        for criterion in &self.criteria {
            if let Some(mask) = criterion.mask(base, target)? {
                combined = Some(match combined {
                    Some(acc) => and(&acc, &mask)?,
                    None => mask,
                });
            }
        }
        Ok(combined)
    }

    pub fn apply(&self, base: &BaseDataset) -> Result<FilteredView> {
        self.refine(base, &base.full_view())
    }

    /// Narrow an existing view, still taking percentile thresholds from `base`.
    pub fn refine(&self, base: &BaseDataset, view: &FilteredView) -> Result<FilteredView> {
        let filtered = match self.mask(base, view.batch())? {
            Some(mask) => FilteredView::new(filter_record_batch(view.batch(), &mask)?),
            None => view.clone(),
        };
        debug!(
            criteria = self.criteria.len(),
            active = self.active().count(),
            rows_in = view.num_rows(),
            rows_out = filtered.num_rows(),
            "applied filter set"
        );
        Ok(filtered)
    }
}
