//! Parquet loading of the base dataset with optional column projection

use std::fs::File;
use std::path::Path;

use arrow::compute::concat_batches;
use arrow::record_batch::RecordBatchReader;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use tracing::{debug, info};

use crate::dataset::BaseDataset;
use crate::error::{Result, SliceError};

const BATCH_SIZE: usize = 8192;

/// Read every row group of a parquet file into one base dataset.
///
/// With `columns` set, only those columns are decoded; a name missing from
/// the file is an `UnknownColumn` error.
pub fn load_base_dataset(path: impl AsRef<Path>, columns: Option<&[&str]>) -> Result<BaseDataset> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let builder = match columns {
        Some(names) => {
            let arrow_schema = builder.schema().clone();
            let projection_indices = names
                .iter()
                .map(|name| {
                    arrow_schema
                        .index_of(name)
                        .map_err(|_| SliceError::UnknownColumn(name.to_string()))
                })
                .collect::<Result<Vec<usize>>>()?;
            let projection = ProjectionMask::roots(builder.parquet_schema(), projection_indices);
            builder.with_projection(projection)
        }
        None => builder,
    };

    let reader = builder.with_batch_size(BATCH_SIZE).build()?;
    let schema = reader.schema();

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch?;
        debug!(rows = batch.num_rows(), "read parquet batch");
        batches.push(batch);
    }

    let batch = concat_batches(&schema, &batches)?;
    info!(path = %path.display(), rows = batch.num_rows(), columns = batch.num_columns(), "loaded base dataset");
    Ok(BaseDataset::new(batch))
}
