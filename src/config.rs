//! Pipeline configuration
//!
//! Everything here has a default matching the sale-record schema, so an
//! empty JSON object is a valid configuration file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Canonical column names the orchestrator filters and aggregates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub geography: String,
    pub sale_date: String,
    pub bedrooms: String,
    pub pool: String,
    pub year_built: String,
    pub valuation: String,
    pub area: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            geography: "fips".to_string(),
            sale_date: "transactiondate".to_string(),
            bedrooms: "bedroomcnt".to_string(),
            pool: "poolcnt".to_string(),
            year_built: "yearbuilt".to_string(),
            valuation: "taxvaluedollarcnt".to_string(),
            area: "calculatedfinishedsquarefeet".to_string(),
        }
    }
}

/// A column offered in one of the selector dropdowns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectableColumn {
    pub label: String,
    pub column: String,
}

impl SelectableColumn {
    fn new(label: &str, column: &str) -> Self {
        Self {
            label: label.to_string(),
            column: column.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliceConfig {
    pub columns: ColumnNames,
    pub default_bins: u32,
    pub max_bins: u32,
    /// Percentile window used when a slider pair is missing or malformed.
    pub default_percentiles: [f64; 2],
    /// Columns allowed as the x axis / group-by selector.
    pub group_by_columns: Vec<SelectableColumn>,
    /// Columns allowed as the y axis / metric selector.
    pub metric_columns: Vec<SelectableColumn>,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            default_bins: 50,
            max_bins: 500,
            default_percentiles: [30.0, 70.0],
            group_by_columns: vec![
                SelectableColumn::new("Building Construction Material", "typeconstructiontypeid"),
                SelectableColumn::new("Construction Year", "yearbuilt"),
                SelectableColumn::new("Bedroom Count", "bedroomcnt"),
                SelectableColumn::new("Room Count", "roomcnt"),
                SelectableColumn::new("Counties", "fips"),
                SelectableColumn::new("Building Fireproofing Status", "buildingclasstypeid"),
                SelectableColumn::new("Architectural Style", "architecturalstyletypeid"),
                SelectableColumn::new("FirePlace", "fireplaceflag"),
                SelectableColumn::new("Area Zoning", "propertylandusetypeid"),
                SelectableColumn::new("Has Hottub", "hashottuborspa"),
                SelectableColumn::new("Has Pool", "poolcnt"),
                SelectableColumn::new("Heating System", "heatingorsystemtypeid"),
                SelectableColumn::new("Story Type", "storytypeid"),
                SelectableColumn::new("Air Conditioning", "airconditioningtypeid"),
            ],
            metric_columns: vec![
                SelectableColumn::new("Valuation", "taxvaluedollarcnt"),
                SelectableColumn::new("Footage", "calculatedfinishedsquarefeet"),
            ],
        }
    }
}

impl SliceConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Every column name the configuration refers to.
    pub fn referenced_columns(&self) -> impl Iterator<Item = &str> {
        let c = &self.columns;
        [
            &c.geography,
            &c.sale_date,
            &c.bedrooms,
            &c.pool,
            &c.year_built,
            &c.valuation,
            &c.area,
        ]
        .into_iter()
        .map(String::as_str)
        .chain(self.group_by_columns.iter().map(|s| s.column.as_str()))
        .chain(self.metric_columns.iter().map(|s| s.column.as_str()))
    }

    pub fn is_group_by_column(&self, column: &str) -> bool {
        self.group_by_columns.iter().any(|s| s.column == column)
    }

    pub fn is_metric_column(&self, column: &str) -> bool {
        self.metric_columns.iter().any(|s| s.column == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: SliceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SliceConfig::default());
        assert_eq!(config.default_bins, 50);
        assert_eq!(config.default_percentiles, [30.0, 70.0]);
    }

    #[test]
    fn test_partial_override() {
        let config: SliceConfig =
            serde_json::from_str(r#"{"max_bins": 100, "columns": {"geography": "county"}}"#).unwrap();
        assert_eq!(config.max_bins, 100);
        assert_eq!(config.columns.geography, "county");
        assert_eq!(config.columns.valuation, "taxvaluedollarcnt");
    }

    #[test]
    fn test_selector_membership() {
        let config = SliceConfig::default();
        assert!(config.is_group_by_column("fips"));
        assert!(!config.is_group_by_column("parcelid"));
        assert!(config.is_metric_column("calculatedfinishedsquarefeet"));
    }
}
