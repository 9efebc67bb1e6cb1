//! Widget snapshots and the filter plans built from them
//!
//! A snapshot holds the raw control values of one dashboard tab. Each tab
//! has its own named plan that turns those values into a `FilterSet`,
//! recovering from malformed input with a `Notice` instead of failing.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ColumnNames, SliceConfig};
use crate::error::{InputIssue, Notice};
use crate::filter::{FilterCriterion, FilterSet, FilterValue};
use crate::summary::DistributionMode;

/// Click counters drive the percentile toggles: an odd count means active.
pub fn toggle_active(clicks: u64) -> bool {
    clicks % 2 == 1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartMode {
    #[default]
    Histogram,
    Boxplot,
}

/// Tab 1: filter sales by amenities and look at price/area spread.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AmenitiesSnapshot {
    pub counties: Vec<String>,
    pub sale_start: Option<String>,
    pub sale_end: Option<String>,
    /// Allowed pool counts (1 = has a pool, 0 = none).
    pub pool: Vec<i64>,
    pub bedrooms: Option<[f64; 2]>,
    pub bottom_half_valuation: bool,
    pub bottom_half_area: bool,
    pub valuation_mode: ChartMode,
    pub area_mode: ChartMode,
    pub valuation_bins: Option<i64>,
    pub area_bins: Option<i64>,
}

/// Tab 2: slice by valuation/area percentile, dice by a chosen column.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PercentileSliceSnapshot {
    pub area_percentiles: Option<[f64; 2]>,
    pub valuation_percentiles: Option<[f64; 2]>,
    pub x_column: Option<String>,
    pub y_column: Option<String>,
    pub mode: DistributionMode,
}

/// Tab 3: aggregate the percentile slice by a chosen column.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregationSnapshot {
    pub area_percentiles: Option<[f64; 2]>,
    pub valuation_percentiles: Option<[f64; 2]>,
    pub year_built: Option<[f64; 2]>,
    pub group_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tab", rename_all = "snake_case")]
pub enum WidgetSnapshot {
    Amenities(AmenitiesSnapshot),
    PercentileSlice(PercentileSliceSnapshot),
    Aggregation(AggregationSnapshot),
}

/// A resolved percentile window, kept for display next to the charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileRange {
    pub column: String,
    pub lower_pct: f64,
    pub upper_pct: f64,
}

/// The filter set of one tab plus the notices raised while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterPlan {
    pub name: &'static str,
    pub filters: FilterSet,
    pub windows: Vec<PercentileRange>,
    pub notices: Vec<Notice>,
}

impl FilterPlan {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            filters: FilterSet::default(),
            windows: Vec::new(),
            notices: Vec::new(),
        }
    }

    fn notice(&mut self, slot: &'static str, issue: InputIssue) {
        warn!(plan = self.name, slot, %issue, "recovered invalid input");
        self.notices.push(Notice::new(slot, &issue));
    }

    pub fn amenities(snapshot: &AmenitiesSnapshot, columns: &ColumnNames) -> Self {
        let mut plan = Self::new("amenities");

        let (start, end) = plan.parse_date_range(
            "sale_dates",
            snapshot.sale_start.as_deref(),
            snapshot.sale_end.as_deref(),
        );
        plan.filters.push(FilterCriterion::DateRange {
            column: columns.sale_date.clone(),
            start,
            end,
        });
        plan.filters.push(FilterCriterion::SetMembership {
            column: columns.geography.clone(),
            allowed: snapshot.counties.iter().cloned().map(FilterValue::Text).collect(),
        });
        plan.filters.push(FilterCriterion::SetMembership {
            column: columns.pool.clone(),
            allowed: snapshot.pool.iter().copied().map(FilterValue::Int).collect(),
        });
        plan.push_range("bedrooms", "Bedroom", &columns.bedrooms, snapshot.bedrooms);
        plan.filters.push(FilterCriterion::PercentileToggle {
            metric: columns.valuation.clone(),
            active: snapshot.bottom_half_valuation,
        });
        plan.filters.push(FilterCriterion::PercentileToggle {
            metric: columns.area.clone(),
            active: snapshot.bottom_half_area,
        });
        plan
    }

    pub fn percentile_slice(snapshot: &PercentileSliceSnapshot, config: &SliceConfig) -> Self {
        let mut plan = Self::new("percentile_slice");
        plan.push_window("area_percentiles", &config.columns.area, snapshot.area_percentiles, config);
        plan.push_window(
            "valuation_percentiles",
            &config.columns.valuation,
            snapshot.valuation_percentiles,
            config,
        );
        plan
    }

    pub fn aggregation(snapshot: &AggregationSnapshot, config: &SliceConfig) -> Self {
        let mut plan = Self::new("aggregation");
        plan.push_window("area_percentiles", &config.columns.area, snapshot.area_percentiles, config);
        plan.push_window(
            "valuation_percentiles",
            &config.columns.valuation,
            snapshot.valuation_percentiles,
            config,
        );
        plan.push_range("year_built", "Year built", &config.columns.year_built, snapshot.year_built);
        plan
    }

    /// Both bounds, or neither when they are inverted.
    fn parse_date_range(
        &mut self,
        slot: &'static str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let start = self.parse_date(slot, "start", start);
        let end = self.parse_date(slot, "end", end);
        match (start, end) {
            (Some(start), Some(end)) if start > end => {
                self.notice(slot, InputIssue::InvertedDates { start, end });
                (None, None)
            }
            bounds => bounds,
        }
    }

    fn parse_date(&mut self, slot: &'static str, bound: &'static str, raw: Option<&str>) -> Option<NaiveDate> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()));
        match parsed {
            Ok(date) => Some(date),
            Err(_) => {
                self.notice(
                    slot,
                    InputIssue::BadDate {
                        bound,
                        value: raw.to_string(),
                    },
                );
                None
            }
        }
    }

    fn push_range(&mut self, slot: &'static str, what: &str, column: &str, raw: Option<[f64; 2]>) {
        let (min, max) = match raw {
            Some([min, max]) if min <= max => (Some(min), Some(max)),
            Some([min, max]) => {
                self.notice(
                    slot,
                    InputIssue::InvertedRange {
                        what: what.to_string(),
                        min,
                        max,
                    },
                );
                (None, None)
            }
            None => (None, None),
        };
        self.filters.push(FilterCriterion::Range {
            column: column.to_string(),
            min,
            max,
        });
    }

    fn push_window(&mut self, slot: &'static str, column: &str, raw: Option<[f64; 2]>, config: &SliceConfig) {
        let [default_lower, default_upper] = config.default_percentiles;
        let [lower, upper] = match raw {
            Some([lower, upper]) if 0.0 <= lower && lower <= upper && upper <= 100.0 => [lower, upper],
            Some([lower, upper]) => {
                self.notice(
                    slot,
                    InputIssue::BadPercentile {
                        lower,
                        upper,
                        default_lower,
                        default_upper,
                    },
                );
                config.default_percentiles
            }
            None => config.default_percentiles,
        };
        self.filters.push(FilterCriterion::PercentileWindow {
            metric: column.to_string(),
            lower: lower / 100.0,
            upper: upper / 100.0,
        });
        self.windows.push(PercentileRange {
            column: column.to_string(),
            lower_pct: lower,
            upper_pct: upper,
        });
    }
}

/// Bin count for a histogram: the default when unset, the default plus an
/// issue when outside `1..=max_bins`.
pub fn resolve_bins(raw: Option<i64>, config: &SliceConfig) -> (u32, Option<InputIssue>) {
    match raw {
        None => (config.default_bins, None),
        Some(bins) if bins >= 1 && bins <= i64::from(config.max_bins) => (bins as u32, None),
        Some(_) => (
            config.default_bins,
            Some(InputIssue::BadBins {
                max: config.max_bins,
                fallback: config.default_bins,
            }),
        ),
    }
}
