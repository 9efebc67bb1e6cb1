//! Query orchestration - ties together all components
//!
//! `QueryContext::handle` turns one widget snapshot into a result bundle.
//! It only reads the shared dataset and lookup registry, so any number of
//! calls may run at once.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::aggregator::{aggregate, distribution, trend, AggregationKind, AggregationResult, TrendResult};
use crate::config::SliceConfig;
use crate::dataset::{BaseDataset, FilteredView};
use crate::error::{Notice, Result, SliceError};
use crate::lookup::LookupRegistry;
use crate::snapshot::{
    resolve_bins, AggregationSnapshot, AmenitiesSnapshot, ChartMode, FilterPlan, PercentileRange,
    PercentileSliceSnapshot, WidgetSnapshot,
};
use crate::summary::{
    column_box_summary, grouped_distribution, histogram, mean, BoxSummary, DistributionMode, GroupDistribution,
    Histogram,
};

/// Axis title used for a column on the distribution charts.
fn axis_label(column: &str) -> String {
    match column {
        "taxvaluedollarcnt" => "Price Estimate($)".to_string(),
        "calculatedfinishedsquarefeet" => "Square Footage".to_string(),
        other => other.to_string(),
    }
}

const COUNT_LABEL: &str = "Units Sold";
const COUNTY_COUNT_LABEL: &str = "Units sold by county";

/// One output slot: either chart-ready data or an explicit "no data" state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum Panel<T> {
    Ready(T),
    NoData,
}

impl<T> Panel<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Panel::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Panel::Ready(value) => Some(value),
            Panel::NoData => None,
        }
    }
}

impl<T> From<Option<T>> for Panel<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Panel::NoData, Panel::Ready)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricChart {
    Histogram {
        axis_label: String,
        count_label: &'static str,
        histogram: Histogram,
    },
    Boxplot {
        axis_label: String,
        summary: BoxSummary,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountyCount {
    pub fips: String,
    pub county: Option<String>,
    pub units_sold: u64,
}

/// Sales per county for the choropleth, with the colour scale bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountyCounts {
    pub label: &'static str,
    pub rows: Vec<CountyCount>,
    pub color_range: (u64, u64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AmenitiesView {
    pub valuation: Panel<MetricChart>,
    pub valuation_bins_visible: bool,
    pub area: Panel<MetricChart>,
    pub area_bins_visible: bool,
    pub counties: Panel<CountyCounts>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DicedChart {
    pub x: String,
    pub y: String,
    pub mode: DistributionMode,
    pub groups: Vec<GroupDistribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSliceView {
    pub windows: Vec<PercentileRange>,
    pub area: Panel<BoxSummary>,
    pub valuation: Panel<BoxSummary>,
    pub diced: Panel<DicedChart>,
    pub explanation: String,
    pub area_mean: String,
    pub valuation_mean: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitledAggregate {
    pub title: String,
    pub result: AggregationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitledTrend {
    pub title: String,
    pub trend: TrendResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationView {
    pub windows: Vec<PercentileRange>,
    pub valuation_pie: Panel<TitledAggregate>,
    pub area_pie: Panel<TitledAggregate>,
    pub valuation_bar: Panel<TitledAggregate>,
    pub area_bar: Panel<TitledAggregate>,
    pub trend: Panel<TitledTrend>,
    pub explanation: String,
    /// Whether the group-by column has a lookup table behind `explanation`.
    pub has_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tab", rename_all = "snake_case")]
pub enum TabView {
    Amenities(AmenitiesView),
    PercentileSlice(PercentileSliceView),
    Aggregation(AggregationView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultBundle {
    pub plan: &'static str,
    pub rows: usize,
    /// Set when no sale survives the filters.
    pub empty: bool,
    pub notices: Vec<Notice>,
    pub view: TabView,
}

/// Read-only state shared by every request.
#[derive(Debug, Clone)]
pub struct QueryContext {
    dataset: Arc<BaseDataset>,
    lookups: Arc<LookupRegistry>,
    config: SliceConfig,
}

impl QueryContext {
    /// Fails with `UnknownColumn` if the configuration names a column the
    /// dataset lacks.
    pub fn new(dataset: Arc<BaseDataset>, lookups: Arc<LookupRegistry>, config: SliceConfig) -> Result<Self> {
        dataset.require_columns(config.referenced_columns())?;
        info!(rows = dataset.num_rows(), "query context ready");
        Ok(Self {
            dataset,
            lookups,
            config,
        })
    }

    pub fn dataset(&self) -> &BaseDataset {
        &self.dataset
    }

    pub fn lookups(&self) -> &LookupRegistry {
        &self.lookups
    }

    pub fn config(&self) -> &SliceConfig {
        &self.config
    }

    pub fn handle(&self, snapshot: &WidgetSnapshot) -> Result<ResultBundle> {
        match snapshot {
            WidgetSnapshot::Amenities(s) => self.amenities(s),
            WidgetSnapshot::PercentileSlice(s) => self.percentile_slice(s),
            WidgetSnapshot::Aggregation(s) => self.aggregation(s),
        }
    }

    fn run_plan(&self, plan: &FilterPlan) -> Result<FilteredView> {
        let _span = info_span!("plan", name = plan.name).entered();
        let view = plan.filters.apply(&self.dataset)?;
        info!(
            rows = view.num_rows(),
            notices = plan.notices.len(),
            "filtered view ready"
        );
        Ok(view)
    }

    fn group_by_column<'a>(&self, requested: Option<&'a str>, default: &'a str) -> Result<&'a str> {
        let column = requested.unwrap_or(default);
        if self.config.is_group_by_column(column) {
            Ok(column)
        } else {
            Err(SliceError::UnknownColumn(column.to_string()))
        }
    }

    fn metric_column<'a>(&self, requested: Option<&'a str>, default: &'a str) -> Result<&'a str> {
        let column = requested.unwrap_or(default);
        if self.config.is_metric_column(column) {
            Ok(column)
        } else {
            Err(SliceError::UnknownColumn(column.to_string()))
        }
    }

    fn amenities(&self, snapshot: &AmenitiesSnapshot) -> Result<ResultBundle> {
        let columns = &self.config.columns;
        let mut plan = FilterPlan::amenities(snapshot, columns);
        let view = self.run_plan(&plan)?;

        let valuation = self.metric_chart(
            &view,
            &columns.valuation,
            snapshot.valuation_mode,
            snapshot.valuation_bins,
            "valuation_bins",
            &mut plan.notices,
        )?;
        let area = self.metric_chart(
            &view,
            &columns.area,
            snapshot.area_mode,
            snapshot.area_bins,
            "area_bins",
            &mut plan.notices,
        )?;

        let counts = distribution(&view, &columns.geography)?;
        let counties = self.county_counts(&counts);

        Ok(ResultBundle {
            plan: plan.name,
            rows: view.num_rows(),
            empty: view.is_empty(),
            notices: plan.notices,
            view: TabView::Amenities(AmenitiesView {
                valuation,
                valuation_bins_visible: snapshot.valuation_mode == ChartMode::Histogram,
                area,
                area_bins_visible: snapshot.area_mode == ChartMode::Histogram,
                counties,
            }),
        })
    }

    fn metric_chart(
        &self,
        view: &FilteredView,
        column: &str,
        mode: ChartMode,
        raw_bins: Option<i64>,
        slot: &'static str,
        notices: &mut Vec<Notice>,
    ) -> Result<Panel<MetricChart>> {
        let chart = match mode {
            ChartMode::Histogram => {
                let (bins, issue) = resolve_bins(raw_bins, &self.config);
                if let Some(issue) = issue {
                    notices.push(Notice::new(slot, &issue));
                }
                histogram(view, column, bins)?.map(|histogram| MetricChart::Histogram {
                    axis_label: axis_label(column),
                    count_label: COUNT_LABEL,
                    histogram,
                })
            }
            ChartMode::Boxplot => column_box_summary(view, column)?.map(|summary| MetricChart::Boxplot {
                axis_label: axis_label(column),
                summary,
            }),
        };
        Ok(chart.into())
    }

    fn county_counts(&self, counts: &AggregationResult) -> Panel<CountyCounts> {
        if counts.is_empty() {
            return Panel::NoData;
        }
        let rows: Vec<CountyCount> = counts
            .rows
            .iter()
            .map(|row| {
                let fips = row.key.to_string();
                CountyCount {
                    county: self.lookups.county_name(&fips).map(str::to_string),
                    fips,
                    units_sold: row.value as u64,
                }
            })
            .collect();
        let low = rows.iter().map(|r| r.units_sold).min().unwrap_or(0);
        let high = rows.iter().map(|r| r.units_sold).max().unwrap_or(0);
        Panel::Ready(CountyCounts {
            label: COUNTY_COUNT_LABEL,
            rows,
            color_range: (low, high),
        })
    }

    fn percentile_slice(&self, snapshot: &PercentileSliceSnapshot) -> Result<ResultBundle> {
        let columns = &self.config.columns;
        let x = self.group_by_column(snapshot.x_column.as_deref(), &columns.year_built)?;
        let y = self.metric_column(snapshot.y_column.as_deref(), &columns.valuation)?;

        let plan = FilterPlan::percentile_slice(snapshot, &self.config);
        let view = self.run_plan(&plan)?;

        let groups = grouped_distribution(&view, x, y, snapshot.mode)?;
        let diced = if groups.is_empty() {
            Panel::NoData
        } else {
            Panel::Ready(DicedChart {
                x: x.to_string(),
                y: y.to_string(),
                mode: snapshot.mode,
                groups,
            })
        };
        debug!(x, y, "diced distribution ready");

        let area_mean = match mean(&view, &columns.area)? {
            Some(m) => format!("The Mean Square footage for the filtered data {m:.2}"),
            None => "The Mean Square footage for the filtered data: no data".to_string(),
        };
        let valuation_mean = match mean(&view, &columns.valuation)? {
            Some(m) => format!("The Mean Valuation for the filtered data is ${m:.2}"),
            None => "The Mean Valuation for the filtered data: no data".to_string(),
        };

        Ok(ResultBundle {
            plan: plan.name,
            rows: view.num_rows(),
            empty: view.is_empty(),
            notices: plan.notices,
            view: TabView::PercentileSlice(PercentileSliceView {
                windows: plan.windows,
                area: column_box_summary(&view, &columns.area)?.into(),
                valuation: column_box_summary(&view, &columns.valuation)?.into(),
                diced,
                explanation: self
                    .lookups
                    .explain(x)
                    .render_html(&format!("Metadata for the x-axis variable {x}")),
                area_mean,
                valuation_mean,
            }),
        })
    }

    fn aggregation(&self, snapshot: &AggregationSnapshot) -> Result<ResultBundle> {
        let columns = &self.config.columns;
        let group_by = self.group_by_column(snapshot.group_by.as_deref(), &columns.geography)?;
        let metrics = [columns.valuation.as_str(), columns.area.as_str()];

        let plan = FilterPlan::aggregation(snapshot, &self.config);
        let view = self.run_plan(&plan)?;

        let mut sums = aggregate(&view, group_by, &metrics, AggregationKind::Sum)?.into_iter();
        let mut means = aggregate(&view, group_by, &metrics, AggregationKind::Mean)?.into_iter();
        let titled = |result: Option<AggregationResult>, title: String| -> Panel<TitledAggregate> {
            result
                .filter(|r| !r.is_empty())
                .map(|result| TitledAggregate { title, result })
                .into()
        };
        let valuation_pie = titled(sums.next(), format!("Pie plot of {} exploded by {group_by}", metrics[0]));
        let area_pie = titled(sums.next(), format!("Pie plot of {} exploded by {group_by}", metrics[1]));
        let valuation_bar = titled(means.next(), format!("Bar plot of {group_by} vs Avg. {}", metrics[0]));
        let area_bar = titled(means.next(), format!("Bar plot of {group_by} vs Avg. {}", metrics[1]));

        let scatter = trend(&view, metrics[0], metrics[1], Some(group_by))?;
        let trend = if scatter.is_empty() {
            Panel::NoData
        } else {
            Panel::Ready(TitledTrend {
                title: format!("Plot of Square footage vs Tax Valuation with ({group_by} hue)"),
                trend: scatter,
            })
        };

        let explanation = self.lookups.explain(group_by);
        let has_metadata = !explanation.is_empty();

        Ok(ResultBundle {
            plan: plan.name,
            rows: view.num_rows(),
            empty: view.is_empty(),
            notices: plan.notices,
            view: TabView::Aggregation(AggregationView {
                windows: plan.windows,
                valuation_pie,
                area_pie,
                valuation_bar,
                area_bar,
                trend,
                explanation: explanation.render_html(&format!("Metadata for variable {group_by}")),
                has_metadata,
            }),
        })
    }
}
