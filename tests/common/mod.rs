#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use zslice::records::{RecordColumns, SaleRecord};
use zslice::{BaseDataset, LookupRegistry, QueryContext, SliceConfig};

pub const VALUATION: &str = "taxvaluedollarcnt";
pub const AREA: &str = "calculatedfinishedsquarefeet";

pub fn sale(parcel_id: i64, fips: &str, valuation: f64, area: f64, bedrooms: f64, year_built: i64) -> SaleRecord {
    SaleRecord {
        parcel_id,
        fips: Some(fips.to_string()),
        sale_date: NaiveDate::from_ymd_opt(2016, 1, 1)
            .and_then(|d| d.checked_add_days(chrono::Days::new(parcel_id as u64 * 40))),
        bedrooms: Some(bedrooms),
        bathrooms: Some(2.0),
        rooms: Some(bedrooms + 2.0),
        pool: Some(parcel_id % 2),
        year_built: Some(year_built),
        valuation: Some(valuation),
        area: Some(area),
        codes: [Some(parcel_id % 3), Some(261), None, None, None, None, None],
        flags: [None, Some(parcel_id % 2 == 0), None],
    }
}

/// Five sales over three counties with valuations 100k..=300k.
pub fn five_sales() -> Vec<SaleRecord> {
    vec![
        sale(1, "06037", 100_000.0, 1100.0, 2.0, 1960),
        sale(2, "06059", 150_000.0, 1400.0, 3.0, 1985),
        sale(3, "06037", 200_000.0, 1700.0, 3.0, 2001),
        sale(4, "06111", 250_000.0, 2100.0, 4.0, 2010),
        sale(5, "06059", 300_000.0, 2900.0, 5.0, 2015),
    ]
}

pub fn dataset(records: &[SaleRecord]) -> BaseDataset {
    records.iter().collect::<RecordColumns>().into_dataset().unwrap()
}

pub fn context(records: &[SaleRecord]) -> QueryContext {
    QueryContext::new(
        Arc::new(dataset(records)),
        Arc::new(LookupRegistry::default()),
        SliceConfig::default(),
    )
    .unwrap()
}
