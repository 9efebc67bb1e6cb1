//! Grouped aggregation over a filtered view
//!
//! Groups live in a `BTreeMap` keyed by the group-by value, so results come
//! out ordered by key and hold exactly the keys present in the view. Rows
//! whose group-by value is null belong to no group.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use arrow::array::{Array, AsArray, Float64Array, Int64Array, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::Date32Type;
use arrow_schema::DataType;
use serde::Serialize;

use crate::dataset::{column_by_name, f64_column, FilteredView};
use crate::error::{Result, SliceError};
use crate::records::days_to_date;

/// A distinct value of the group-by column.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum GroupKey {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl GroupKey {
    fn rank(&self) -> u8 {
        match self {
            GroupKey::Bool(_) => 0,
            GroupKey::Int(_) => 1,
            GroupKey::Float(_) => 2,
            GroupKey::Text(_) => 3,
        }
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (GroupKey::Bool(a), GroupKey::Bool(b)) => a.cmp(b),
            (GroupKey::Int(a), GroupKey::Int(b)) => a.cmp(b),
            (GroupKey::Float(a), GroupKey::Float(b)) => a.total_cmp(b),
            (GroupKey::Text(a), GroupKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Bool(value) => write!(f, "{value}"),
            GroupKey::Int(value) => write!(f, "{value}"),
            GroupKey::Float(value) => write!(f, "{value}"),
            GroupKey::Text(value) => f.write_str(value),
        }
    }
}

/// Group key of every row of `column`; `None` for nulls and NaN.
pub(crate) fn group_keys(batch: &RecordBatch, column: &str) -> Result<Vec<Option<GroupKey>>> {
    let col = column_by_name(batch, column)?;
    let keys = match col.data_type() {
        DataType::Utf8 => col
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(|s| GroupKey::Text(s.to_string())))
            .collect(),
        DataType::Boolean => col.as_boolean().iter().map(|v| v.map(GroupKey::Bool)).collect(),
        DataType::Date32 => col
            .as_primitive::<Date32Type>()
            .iter()
            .map(|v| v.and_then(days_to_date).map(|d| GroupKey::Text(d.to_string())))
            .collect(),
        DataType::Float16 | DataType::Float32 | DataType::Float64 => f64_column(batch, column)?
            .iter()
            .map(|v| v.filter(|x| !x.is_nan()).map(GroupKey::Float))
            .collect(),
        data_type if data_type.is_integer() => {
            let ints = cast(col, &DataType::Int64)?;
            let ints = ints
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| SliceError::UnsupportedColumnType {
                    column: column.to_string(),
                    data_type: data_type.clone(),
                })?;
            ints.iter().map(|v| v.map(GroupKey::Int)).collect()
        }
        data_type => {
            return Err(SliceError::UnsupportedColumnType {
                column: column.to_string(),
                data_type: data_type.clone(),
            })
        }
    };
    Ok(keys)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// Non-null metric values per group (rows per group without a metric).
    Count,
    Sum,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: GroupKey,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_by: String,
    pub metric: Option<String>,
    pub kind: AggregationKind,
    pub rows: Vec<AggregateRow>,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.rows.iter().map(|row| &row.key)
    }

    pub fn get(&self, key: &GroupKey) -> Option<f64> {
        self.rows.iter().find(|row| &row.key == key).map(|row| row.value)
    }
}

/// Accumulated state of one group across all requested metrics.
#[derive(Debug, Clone, Default)]
struct GroupState {
    rows: u64,
    sums: Vec<f64>,
    counts: Vec<u64>,
}

impl GroupState {
    fn new(metrics: usize) -> Self {
        Self {
            rows: 0,
            sums: vec![0.0; metrics],
            counts: vec![0; metrics],
        }
    }

    fn value(&self, metric: usize, kind: AggregationKind) -> Option<f64> {
        let count = self.counts[metric];
        match kind {
            AggregationKind::Count => Some(count as f64),
            AggregationKind::Sum if count > 0 => Some(self.sums[metric]),
            AggregationKind::Mean if count > 0 => Some(self.sums[metric] / count as f64),
            _ => None,
        }
    }
}

fn accumulate(
    keys: Vec<Option<GroupKey>>,
    metrics: &[Float64Array],
) -> BTreeMap<GroupKey, GroupState> {
    let mut groups: BTreeMap<GroupKey, GroupState> = BTreeMap::new();
    for (row, key) in keys.into_iter().enumerate() {
        let Some(key) = key else { continue };
        let state = groups
            .entry(key)
            .or_insert_with(|| GroupState::new(metrics.len()));
        state.rows += 1;
        for (i, values) in metrics.iter().enumerate() {
            if values.is_valid(row) {
                let v = values.value(row);
                if !v.is_nan() {
                    state.sums[i] += v;
                    state.counts[i] += 1;
                }
            }
        }
    }
    groups
}

/// Aggregate every metric by `group_by` in a single pass over the view.
///
/// One result per metric, in the order the metrics were given. Mean and sum
/// rows are left out for groups with no value of that metric.
pub fn aggregate(
    view: &FilteredView,
    group_by: &str,
    metrics: &[&str],
    kind: AggregationKind,
) -> Result<Vec<AggregationResult>> {
    let keys = group_keys(view.batch(), group_by)?;
    let values = metrics
        .iter()
        .map(|metric| f64_column(view.batch(), metric))
        .collect::<Result<Vec<_>>>()?;
    let groups = accumulate(keys, &values);

    let results = metrics
        .iter()
        .enumerate()
        .map(|(i, metric)| AggregationResult {
            group_by: group_by.to_string(),
            metric: Some(metric.to_string()),
            kind,
            rows: groups
                .iter()
                .filter_map(|(key, state)| {
                    state.value(i, kind).map(|value| AggregateRow {
                        key: key.clone(),
                        value,
                    })
                })
                .collect(),
        })
        .collect();
    Ok(results)
}

/// Number of rows per distinct value of `column`.
pub fn distribution(view: &FilteredView, column: &str) -> Result<AggregationResult> {
    let groups = accumulate(group_keys(view.batch(), column)?, &[]);
    Ok(AggregationResult {
        group_by: column.to_string(),
        metric: None,
        kind: AggregationKind::Count,
        rows: groups
            .into_iter()
            .map(|(key, state)| AggregateRow {
                key,
                value: state.rows as f64,
            })
            .collect(),
    })
}

/// Running least-squares state (Welford updates, Chan merge).
#[derive(Debug, Clone, Copy, Default)]
struct OlsState {
    n: u64,
    mean_x: f64,
    mean_y: f64,
    m2_x: f64,
    m2_y: f64,
    c_xy: f64,
    min_x: f64,
    max_x: f64,
}

impl OlsState {
    fn push(&mut self, x: f64, y: f64) {
        if self.n == 0 {
            self.min_x = x;
            self.max_x = x;
        } else {
            self.min_x = self.min_x.min(x);
            self.max_x = self.max_x.max(x);
        }
        self.n += 1;
        let n = self.n as f64;
        let dx = x - self.mean_x;
        let dy = y - self.mean_y;
        self.mean_x += dx / n;
        self.mean_y += dy / n;
        self.m2_x += dx * (x - self.mean_x);
        self.m2_y += dy * (y - self.mean_y);
        self.c_xy += dx * (y - self.mean_y);
    }

    fn merge(&mut self, other: &OlsState) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }
        let (n1, n2) = (self.n as f64, other.n as f64);
        let n = n1 + n2;
        let dx = other.mean_x - self.mean_x;
        let dy = other.mean_y - self.mean_y;
        self.mean_x += dx * n2 / n;
        self.mean_y += dy * n2 / n;
        self.m2_x += other.m2_x + dx * dx * n1 * n2 / n;
        self.m2_y += other.m2_y + dy * dy * n1 * n2 / n;
        self.c_xy += other.c_xy + dx * dy * n1 * n2 / n;
        self.min_x = self.min_x.min(other.min_x);
        self.max_x = self.max_x.max(other.max_x);
        self.n += other.n;
    }

    fn fit(&self) -> Option<LinearFit> {
        if self.n < 2 || self.m2_x <= 0.0 {
            return None;
        }
        let slope = self.c_xy / self.m2_x;
        let r_squared = (self.m2_y > 0.0).then(|| (self.c_xy * self.c_xy) / (self.m2_x * self.m2_y));
        Some(LinearFit {
            slope,
            intercept: self.mean_y - slope * self.mean_x,
            r_squared,
            n: self.n,
            x_min: self.min_x,
            x_max: self.max_x,
        })
    }
}

/// Ordinary least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// `None` when y is constant.
    pub r_squared: Option<f64>,
    pub n: u64,
    /// Extent of the fitted x values, for drawing the line.
    pub x_min: f64,
    pub x_max: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub group: Option<GroupKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendLine {
    pub group: GroupKey,
    pub fit: LinearFit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub x: String,
    pub y: String,
    pub color_by: Option<String>,
    pub points: Vec<ScatterPoint>,
    /// One line per colour group that has enough spread in x to fit.
    pub lines: Vec<TrendLine>,
    /// Fit over every point, whatever its group.
    pub overall: Option<LinearFit>,
}

impl TrendResult {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Scatter of `y` against `x` with least-squares trend lines per
/// `color_by` group and overall. Rows missing x or y are skipped.
pub fn trend(view: &FilteredView, x: &str, y: &str, color_by: Option<&str>) -> Result<TrendResult> {
    let xs = f64_column(view.batch(), x)?;
    let ys = f64_column(view.batch(), y)?;
    let keys = match color_by {
        Some(column) => group_keys(view.batch(), column)?,
        None => vec![None; view.num_rows()],
    };

    let mut points = Vec::new();
    let mut ungrouped = OlsState::default();
    let mut groups: BTreeMap<GroupKey, OlsState> = BTreeMap::new();
    for (row, key) in keys.into_iter().enumerate() {
        let (Some(xv), Some(yv)) = (xs.is_valid(row).then(|| xs.value(row)), ys.is_valid(row).then(|| ys.value(row))) else {
            continue;
        };
        if xv.is_nan() || yv.is_nan() {
            continue;
        }
        match &key {
            Some(key) => groups.entry(key.clone()).or_default().push(xv, yv),
            None => ungrouped.push(xv, yv),
        }
        points.push(ScatterPoint { x: xv, y: yv, group: key });
    }

    let mut overall = ungrouped;
    for state in groups.values() {
        overall.merge(state);
    }
    let lines = groups
        .iter()
        .filter_map(|(group, state)| {
            state.fit().map(|fit| TrendLine {
                group: group.clone(),
                fit,
            })
        })
        .collect();

    Ok(TrendResult {
        x: x.to_string(),
        y: y.to_string(),
        color_by: color_by.map(str::to_string),
        points,
        lines,
        overall: overall.fit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterCriterion, FilterSet, FilterValue};
    use crate::testing::sample_dataset;

    fn text(s: &str) -> GroupKey {
        GroupKey::Text(s.to_string())
    }

    #[test]
    fn test_group_key_ordering() {
        let mut keys = vec![GroupKey::Float(2.5), GroupKey::Int(3), GroupKey::Float(-1.0), GroupKey::Bool(true)];
        keys.sort();
        assert_eq!(
            keys,
            vec![GroupKey::Bool(true), GroupKey::Int(3), GroupKey::Float(-1.0), GroupKey::Float(2.5)]
        );
    }

    #[test]
    fn test_mean_and_sum_by_county() {
        let view = sample_dataset().full_view();
        let results = aggregate(
            &view,
            "fips",
            &["taxvaluedollarcnt", "calculatedfinishedsquarefeet"],
            AggregationKind::Mean,
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        let valuation = &results[0];
        assert_eq!(valuation.keys().cloned().collect::<Vec<_>>(), vec![text("06037"), text("06059"), text("06111")]);
        assert_eq!(valuation.get(&text("06037")), Some(125_000.0));
        assert_eq!(valuation.get(&text("06059")), Some(225_000.0));
        assert_eq!(results[1].get(&text("06059")), Some(1750.0));

        let sums = aggregate(&view, "fips", &["taxvaluedollarcnt"], AggregationKind::Sum).unwrap();
        assert_eq!(sums[0].get(&text("06111")), Some(300_000.0));
    }

    #[test]
    fn test_null_group_keys_are_dropped() {
        let view = sample_dataset().full_view();
        let counts = distribution(&view, "heatingorsystemtypeid").unwrap();
        assert_eq!(
            counts.rows,
            vec![
                AggregateRow { key: GroupKey::Int(2), value: 2.0 },
                AggregateRow { key: GroupKey::Int(7), value: 2.0 },
            ]
        );
    }

    #[test]
    fn test_float_and_bool_keys() {
        let view = sample_dataset().full_view();
        let beds = distribution(&view, "bedroomcnt").unwrap();
        assert_eq!(beds.get(&GroupKey::Float(3.0)), Some(2.0));
        let tubs = aggregate(&view, "hashottuborspa", &["taxvaluedollarcnt"], AggregationKind::Count).unwrap();
        assert_eq!(tubs[0].get(&GroupKey::Bool(true)), Some(2.0));
        assert_eq!(tubs[0].get(&GroupKey::Bool(false)), Some(2.0));
    }

    #[test]
    fn test_date_keys_render_as_iso() {
        let view = sample_dataset().full_view();
        let by_day = distribution(&view, "transactiondate").unwrap();
        assert_eq!(by_day.get(&text("2016-03-01")), Some(1.0));
    }

    #[test]
    fn test_single_county_yields_one_group() {
        let base = sample_dataset();
        let view = FilterSet::new(vec![FilterCriterion::SetMembership {
            column: "fips".to_string(),
            allowed: vec![FilterValue::Text("06037".to_string())],
        }])
        .apply(&base)
        .unwrap();
        let counts = distribution(&view, "fips").unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get(&text("06037")), Some(2.0));
    }

    #[test]
    fn test_empty_view_gives_empty_results() {
        let base = sample_dataset();
        let view = FilterSet::new(vec![FilterCriterion::Range {
            column: "taxvaluedollarcnt".to_string(),
            min: Some(1e9),
            max: None,
        }])
        .apply(&base)
        .unwrap();
        assert!(view.is_empty());
        let results = aggregate(&view, "fips", &["taxvaluedollarcnt"], AggregationKind::Mean).unwrap();
        assert!(results[0].is_empty());
        assert!(distribution(&view, "fips").unwrap().is_empty());
        let fit = trend(&view, "taxvaluedollarcnt", "calculatedfinishedsquarefeet", Some("fips")).unwrap();
        assert!(fit.is_empty());
        assert!(fit.overall.is_none());
    }

    #[test]
    fn test_ols_exact_line() {
        let mut state = OlsState::default();
        for (x, y) in [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)] {
            state.push(x, y);
        }
        let fit = state.fit().unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!(fit.intercept.abs() < 1e-12);
        assert!((fit.r_squared.unwrap() - 1.0).abs() < 1e-12);
        assert_eq!((fit.x_min, fit.x_max), (1.0, 3.0));
        assert!((fit.predict(10.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_ols_merge_matches_single_pass() {
        let data = [(1.0, 1.0), (2.0, 3.0), (4.0, 3.0), (5.0, 8.0), (7.0, 9.0)];
        let mut whole = OlsState::default();
        let (mut left, mut right) = (OlsState::default(), OlsState::default());
        for (i, (x, y)) in data.iter().enumerate() {
            whole.push(*x, *y);
            if i < 2 { left.push(*x, *y) } else { right.push(*x, *y) }
        }
        left.merge(&right);
        let (a, b) = (whole.fit().unwrap(), left.fit().unwrap());
        assert!((a.slope - b.slope).abs() < 1e-9);
        assert!((a.intercept - b.intercept).abs() < 1e-9);
    }

    #[test]
    fn test_trend_per_group() {
        let view = sample_dataset().full_view();
        let result = trend(&view, "taxvaluedollarcnt", "calculatedfinishedsquarefeet", Some("fips")).unwrap();
        assert_eq!(result.points.len(), 5);
        // 06111 has a single sale, too few for a line
        let groups: Vec<_> = result.lines.iter().map(|l| l.group.clone()).collect();
        assert_eq!(groups, vec![text("06037"), text("06059")]);
        let la = &result.lines[0].fit;
        assert!((la.slope - 300.0 / 50_000.0).abs() < 1e-12);
        assert_eq!(result.overall.unwrap().n, 5);
    }

    #[test]
    fn test_unsupported_group_column() {
        let view = sample_dataset().full_view();
        let err = aggregate(&view, "fips", &["fips"], AggregationKind::Mean).unwrap_err();
        assert!(matches!(err, SliceError::UnsupportedColumnType { .. }));
    }
}
