//! Row-oriented sale records and their columnar builder
//!
//! `RecordColumns` accumulates `SaleRecord`s column by column and turns
//! them into a `RecordBatch` with the canonical sale-record schema.

use std::sync::Arc;

use arrow::array::temporal_conversions::date32_to_datetime;
use arrow::array::{ArrayRef, BooleanArray, Date32Array, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow::datatypes::Date32Type;
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use chrono::NaiveDate;

use crate::dataset::BaseDataset;
use crate::error::Result;

/// Categorical code columns, each resolvable through the lookup registry.
pub const CATEGORICAL_COLUMNS: &[&str] = &[
    "heatingorsystemtypeid",
    "propertylandusetypeid",
    "storytypeid",
    "airconditioningtypeid",
    "architecturalstyletypeid",
    "typeconstructiontypeid",
    "buildingclasstypeid",
];

pub const FLAG_COLUMNS: &[&str] = &["fireplaceflag", "hashottuborspa", "taxdelinquencyflag"];

/// Days since 1970-01-01, the Date32 representation.
pub fn date_to_days(date: NaiveDate) -> i32 {
    Date32Type::from_naive_date(date)
}

/// Inverse of `date_to_days`; `None` outside chrono's range.
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    date32_to_datetime(days).map(|datetime| datetime.date())
}

pub fn sale_record_schema() -> SchemaRef {
    let mut fields = vec![
        Field::new("parcelid", DataType::Int64, false),
        Field::new("fips", DataType::Utf8, true),
        Field::new("transactiondate", DataType::Date32, true),
        Field::new("bedroomcnt", DataType::Float64, true),
        Field::new("bathroomcnt", DataType::Float64, true),
        Field::new("roomcnt", DataType::Float64, true),
        Field::new("poolcnt", DataType::Int64, true),
        Field::new("yearbuilt", DataType::Int64, true),
        Field::new("taxvaluedollarcnt", DataType::Float64, true),
        Field::new("calculatedfinishedsquarefeet", DataType::Float64, true),
    ];
    fields.extend(CATEGORICAL_COLUMNS.iter().map(|name| Field::new(*name, DataType::Int64, true)));
    fields.extend(FLAG_COLUMNS.iter().map(|name| Field::new(*name, DataType::Boolean, true)));
    Arc::new(Schema::new(fields))
}

/// One sale. Categorical codes are indexed like `CATEGORICAL_COLUMNS`,
/// flags like `FLAG_COLUMNS`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaleRecord {
    pub parcel_id: i64,
    pub fips: Option<String>,
    pub sale_date: Option<NaiveDate>,
    pub bedrooms: Option<f64>,
    pub bathrooms: Option<f64>,
    pub rooms: Option<f64>,
    pub pool: Option<i64>,
    pub year_built: Option<i64>,
    pub valuation: Option<f64>,
    pub area: Option<f64>,
    pub codes: [Option<i64>; 7],
    pub flags: [Option<bool>; 3],
}

/// Columnar accumulation of sale records.
#[derive(Debug, Clone, Default)]
pub struct RecordColumns {
    pub num_rows: usize,
    parcel_id: Vec<i64>,
    fips: Vec<Option<String>>,
    sale_date: Vec<Option<i32>>,
    bedrooms: Vec<Option<f64>>,
    bathrooms: Vec<Option<f64>>,
    rooms: Vec<Option<f64>>,
    pool: Vec<Option<i64>>,
    year_built: Vec<Option<i64>>,
    valuation: Vec<Option<f64>>,
    area: Vec<Option<f64>>,
    codes: [Vec<Option<i64>>; 7],
    flags: [Vec<Option<bool>>; 3],
}

impl RecordColumns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            num_rows: 0,
            parcel_id: Vec::with_capacity(capacity),
            fips: Vec::with_capacity(capacity),
            sale_date: Vec::with_capacity(capacity),
            bedrooms: Vec::with_capacity(capacity),
            bathrooms: Vec::with_capacity(capacity),
            rooms: Vec::with_capacity(capacity),
            pool: Vec::with_capacity(capacity),
            year_built: Vec::with_capacity(capacity),
            valuation: Vec::with_capacity(capacity),
            area: Vec::with_capacity(capacity),
            codes: std::array::from_fn(|_| Vec::with_capacity(capacity)),
            flags: std::array::from_fn(|_| Vec::with_capacity(capacity)),
        }
    }

    pub fn push(&mut self, record: &SaleRecord) {
        self.parcel_id.push(record.parcel_id);
        self.fips.push(record.fips.clone());
        self.sale_date.push(record.sale_date.map(date_to_days));
        self.bedrooms.push(record.bedrooms);
        self.bathrooms.push(record.bathrooms);
        self.rooms.push(record.rooms);
        self.pool.push(record.pool);
        self.year_built.push(record.year_built);
        self.valuation.push(record.valuation);
        self.area.push(record.area);
        for (column, code) in self.codes.iter_mut().zip(record.codes) {
            column.push(code);
        }
        for (column, flag) in self.flags.iter_mut().zip(record.flags) {
            column.push(flag);
        }
        self.num_rows += 1;
    }

    pub fn into_batch(self) -> Result<RecordBatch> {
        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(self.parcel_id)),
            Arc::new(StringArray::from(self.fips)),
            Arc::new(Date32Array::from(self.sale_date)),
            Arc::new(Float64Array::from(self.bedrooms)),
            Arc::new(Float64Array::from(self.bathrooms)),
            Arc::new(Float64Array::from(self.rooms)),
            Arc::new(Int64Array::from(self.pool)),
            Arc::new(Int64Array::from(self.year_built)),
            Arc::new(Float64Array::from(self.valuation)),
            Arc::new(Float64Array::from(self.area)),
        ];
        columns.extend(
            self.codes
                .into_iter()
                .map(|codes| Arc::new(Int64Array::from(codes)) as ArrayRef),
        );
        columns.extend(
            self.flags
                .into_iter()
                .map(|flags| Arc::new(BooleanArray::from(flags)) as ArrayRef),
        );
        Ok(RecordBatch::try_new(sale_record_schema(), columns)?)
    }

    pub fn into_dataset(self) -> Result<BaseDataset> {
        Ok(BaseDataset::new(self.into_batch()?))
    }
}

impl<'a> FromIterator<&'a SaleRecord> for RecordColumns {
    fn from_iter<I: IntoIterator<Item = &'a SaleRecord>>(iter: I) -> Self {
        let mut columns = RecordColumns::new();
        for record in iter {
            columns.push(record);
        }
        columns
    }
}
