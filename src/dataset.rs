//! Base dataset and filtered views
//!
//! Both wrap an Arrow `RecordBatch`. The base dataset is built once and
//! shared read-only; every filter application yields a new `FilteredView`.

use arrow::array::{Array, ArrayRef, Float64Array, RecordBatch};
use arrow::compute::cast;
use arrow_schema::{DataType, SchemaRef};

use crate::error::{Result, SliceError};

/// The immutable table of sale records every request reads from.
#[derive(Debug, Clone)]
pub struct BaseDataset {
    batch: RecordBatch,
}

impl BaseDataset {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        column_by_name(&self.batch, name)
    }

    /// Fail with `UnknownColumn` on the first name missing from the schema.
    pub fn require_columns<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let schema = self.batch.schema();
        for name in names {
            if schema.index_of(name).is_err() {
                return Err(SliceError::UnknownColumn(name.to_string()));
            }
        }
        Ok(())
    }

    /// The whole dataset as a view, for requests with no active criteria.
    pub fn full_view(&self) -> FilteredView {
        FilteredView::new(self.batch.clone())
    }
}

/// Rows of the base dataset that satisfy a filter set.
#[derive(Debug, Clone)]
pub struct FilteredView {
    batch: RecordBatch,
}

impl FilteredView {
    pub(crate) fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        column_by_name(&self.batch, name)
    }

    /// Non-null, non-NaN values of a numeric column.
    pub fn numeric_values(&self, name: &str) -> Result<Vec<f64>> {
        let values = f64_column(&self.batch, name)?;
        Ok(values.iter().flatten().filter(|v| !v.is_nan()).collect())
    }
}

pub(crate) fn column_by_name<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| SliceError::UnknownColumn(name.to_string()))
}

/// Get a numeric column by name as Float64, using the Arrow cast kernel for
/// integer and boolean columns.
pub(crate) fn f64_column(batch: &RecordBatch, name: &str) -> Result<Float64Array> {
    let col = column_by_name(batch, name)?;

    if let Some(values) = col.as_any().downcast_ref::<Float64Array>() {
        return Ok(values.clone());
    }

    let data_type = col.data_type();
    if !(data_type.is_numeric() || data_type == &DataType::Boolean) {
        return Err(SliceError::UnsupportedColumnType {
            column: name.to_string(),
            data_type: data_type.clone(),
        });
    }

    let cast_array = cast(col, &DataType::Float64)?;
    cast_array
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| SliceError::UnsupportedColumnType {
            column: name.to_string(),
            data_type: data_type.clone(),
        })
}
