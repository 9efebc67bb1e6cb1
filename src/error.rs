//! Error types
//!
//! `SliceError` covers schema-level contract violations and I/O failures;
//! these abort a request. `InputIssue` covers malformed widget values, which
//! are recovered locally and reported as a `Notice` in the result bundle.

use arrow_schema::{ArrowError, DataType};
use chrono::NaiveDate;
use parquet::errors::ParquetError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SliceError {
    #[error(transparent)]
    Arrow(#[from] ArrowError),

    #[error(transparent)]
    Parquet(#[from] ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Column not found: {0}")]
    UnknownColumn(String),

    #[error("Column {column} has unsupported type {data_type}")]
    UnsupportedColumnType { column: String, data_type: DataType },

    #[error("Quantile fraction {0} outside [0, 1]")]
    InvalidFraction(f64),
}

pub type Result<T> = std::result::Result<T, SliceError>;

/// A malformed widget value. The affected criterion falls back to its
/// identity or default value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputIssue {
    #[error("{what} range [{min}, {max}] is inverted; ignoring it")]
    InvertedRange { what: String, min: f64, max: f64 },

    #[error("Bins must be a whole number between 1 and {max}; showing {fallback} bins")]
    BadBins { max: u32, fallback: u32 },

    #[error("Sale dates {start} to {end} are inverted; ignoring them")]
    InvertedDates { start: NaiveDate, end: NaiveDate },

    #[error("Could not read {bound} date {value:?}; leaving it open")]
    BadDate { bound: &'static str, value: String },

    #[error("Percentile range [{lower}, {upper}] must lie within 0..=100 in order; using [{default_lower}, {default_upper}]")]
    BadPercentile {
        lower: f64,
        upper: f64,
        default_lower: f64,
        default_upper: f64,
    },
}

/// A user-visible message attached to one output slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub slot: &'static str,
    pub message: String,
}

impl Notice {
    pub fn new(slot: &'static str, issue: &InputIssue) -> Self {
        Self {
            slot,
            message: issue.to_string(),
        }
    }
}
