//! Filtering and aggregation over a columnar table of property sales.
//!
//! A `BaseDataset` is loaded once and shared. Each widget snapshot becomes a
//! `FilterSet`, which yields a `FilteredView`; aggregations and summaries run
//! on the view and are bundled by `QueryContext::handle`.

pub mod aggregator;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod lookup;
pub mod percentile;
pub mod query;
pub mod reader;
pub mod records;
pub mod snapshot;
pub mod summary;

#[cfg(test)]
mod testing;

pub use aggregator::{aggregate, distribution, trend, AggregationKind, AggregationResult, GroupKey};
pub use config::SliceConfig;
pub use dataset::{BaseDataset, FilteredView};
pub use error::{Notice, Result, SliceError};
pub use filter::{FilterCriterion, FilterSet, FilterValue};
pub use lookup::LookupRegistry;
pub use query::{QueryContext, ResultBundle};
pub use reader::load_base_dataset;
pub use snapshot::WidgetSnapshot;
