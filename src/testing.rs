//! Small fixture dataset shared by the unit tests

use chrono::NaiveDate;

use crate::dataset::BaseDataset;
use crate::records::{RecordColumns, SaleRecord};

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

#[allow(clippy::too_many_arguments)]
fn record(
    parcel_id: i64,
    fips: &str,
    sale_date: Option<NaiveDate>,
    bedrooms: f64,
    pool: Option<i64>,
    year_built: i64,
    valuation: f64,
    area: f64,
    heating: Option<i64>,
    hottub: Option<bool>,
) -> SaleRecord {
    SaleRecord {
        parcel_id,
        fips: Some(fips.to_string()),
        sale_date,
        bedrooms: Some(bedrooms),
        bathrooms: Some(2.0),
        rooms: Some(bedrooms + 3.0),
        pool,
        year_built: Some(year_built),
        valuation: Some(valuation),
        area: Some(area),
        codes: [heating, Some(261), None, None, None, None, None],
        flags: [None, hottub, None],
    }
}

pub(crate) fn sample_records() -> Vec<SaleRecord> {
    vec![
        record(1, "06037", date(2016, 3, 1), 3.0, Some(1), 1990, 100_000.0, 1200.0, Some(2), Some(true)),
        record(2, "06037", date(2016, 6, 15), 4.0, Some(0), 2012, 150_000.0, 1500.0, Some(7), Some(false)),
        record(3, "06059", date(2016, 9, 30), 2.0, None, 2015, 200_000.0, 900.0, Some(2), None),
        record(4, "06059", date(2017, 1, 10), 5.0, Some(1), 1975, 250_000.0, 2600.0, None, Some(true)),
        record(5, "06111", date(2017, 5, 20), 3.0, Some(0), 2011, 300_000.0, 1800.0, Some(7), Some(false)),
    ]
}

/// Five sales over three counties, valuations 100k..=300k in 50k steps.
pub(crate) fn sample_dataset() -> BaseDataset {
    sample_records()
        .iter()
        .collect::<RecordColumns>()
        .into_dataset()
        .expect("fixture batch")
}
