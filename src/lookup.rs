//! Code → description tables for categorical columns
//!
//! The registry is built once from reference data and only read afterwards.
//! Geography codes resolve to county names through the same registry.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A categorical code. Integer codes order numerically and before text
/// codes; text codes keep their exact spelling (`"06037"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum Code {
    Int(i64),
    Text(String),
}

impl Code {
    /// Integer only when the text round-trips, so zero-padded codes stay text.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(value) if value.to_string() == raw => Code::Int(value),
            _ => Code::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Int(value) => write!(f, "{value}"),
            Code::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupTable {
    entries: BTreeMap<Code, String>,
}

impl LookupTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: Code, description: impl Into<String>) {
        self.entries.insert(code, description.into());
    }

    pub fn get(&self, code: &Code) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Code, &str)> {
        self.entries.iter().map(|(code, desc)| (code, desc.as_str()))
    }
}

impl<S: Into<String>> FromIterator<(Code, S)> for LookupTable {
    fn from_iter<I: IntoIterator<Item = (Code, S)>>(iter: I) -> Self {
        let mut table = LookupTable::new();
        for (code, description) in iter {
            table.insert(code, description);
        }
        table
    }
}

/// Resolved metadata of one column, ready to render next to a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataExplanation {
    pub column: String,
    pub entries: Vec<(Code, String)>,
}

impl MetadataExplanation {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Markup shown beside the chart; empty when the column has no table.
    pub fn render_html(&self, heading: &str) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let mut out = format!("<b>{heading}</b> <br/><br/>");
        for (code, description) in &self.entries {
            out.push_str(&format!("{code}\t{description}<br/>"));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRegistry {
    tables: BTreeMap<String, LookupTable>,
    geography_column: String,
}

impl Default for LookupRegistry {
    fn default() -> Self {
        Self::with_builtin_counties("fips")
    }
}

impl LookupRegistry {
    /// A registry with no tables at all.
    pub fn empty(geography_column: impl Into<String>) -> Self {
        Self {
            tables: BTreeMap::new(),
            geography_column: geography_column.into(),
        }
    }

    /// A registry holding only the three counties present in the sale data.
    pub fn with_builtin_counties(geography_column: impl Into<String>) -> Self {
        let mut registry = Self::empty(geography_column);
        let counties = [
            ("06111", "Ventura County"),
            ("06037", "Los Angeles County"),
            ("06059", "Orange County"),
        ]
        .into_iter()
        .map(|(code, name)| (Code::parse(code), name))
        .collect();
        registry.set_geography(counties);
        registry
    }

    pub fn insert_table(&mut self, column: impl Into<String>, table: LookupTable) {
        self.tables.insert(column.into(), table);
    }

    pub fn set_geography(&mut self, table: LookupTable) {
        self.tables.insert(self.geography_column.clone(), table);
    }

    pub fn geography_column(&self) -> &str {
        &self.geography_column
    }

    pub fn is_categorical(&self, column: &str) -> bool {
        self.tables.contains_key(column)
    }

    pub fn table(&self, column: &str) -> Option<&LookupTable> {
        self.tables.get(column)
    }

    /// Ordered `(code, description)` pairs; empty for non-categorical columns.
    pub fn describe(&self, column: &str) -> Vec<(Code, String)> {
        self.tables
            .get(column)
            .map(|table| {
                table
                    .iter()
                    .map(|(code, desc)| (code.clone(), desc.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn explain(&self, column: &str) -> MetadataExplanation {
        MetadataExplanation {
            column: column.to_string(),
            entries: self.describe(column),
        }
    }

    pub fn county_name(&self, code: &str) -> Option<&str> {
        self.tables
            .get(&self.geography_column)
            .and_then(|table| table.get(&Code::parse(code)))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: LookupDocument = serde_json::from_str(json)?;
        Ok(document.into_registry())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let document: LookupDocument = serde_json::from_reader(BufReader::new(file))?;
        Ok(document.into_registry())
    }
}

/// On-disk shape of the reference tables. JSON object keys are always
/// strings, so codes go through `Code::parse`.
#[derive(Debug, Deserialize)]
struct LookupDocument {
    #[serde(default = "default_geography_column")]
    geography_column: String,
    #[serde(default)]
    geography: Option<BTreeMap<String, String>>,
    #[serde(default)]
    categorical: BTreeMap<String, BTreeMap<String, String>>,
}

fn default_geography_column() -> String {
    "fips".to_string()
}

impl LookupDocument {
    fn into_registry(self) -> LookupRegistry {
        let mut registry = match self.geography {
            Some(names) => {
                let mut registry = LookupRegistry::empty(self.geography_column);
                registry.set_geography(to_table(names));
                registry
            }
            None => LookupRegistry::with_builtin_counties(self.geography_column),
        };
        for (column, entries) in self.categorical {
            registry.insert_table(column, to_table(entries));
        }
        registry
    }
}

fn to_table(entries: BTreeMap<String, String>) -> LookupTable {
    entries
        .into_iter()
        .map(|(code, desc)| (Code::parse(&code), desc))
        .collect()
}
