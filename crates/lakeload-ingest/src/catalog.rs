//! Dataset catalog
//!
//! Declares which datasets the engine knows about and how each one is
//! ingested: the monthly fact dataset, the dependent dataset owned by it, and
//! any number of full-dump dimension snapshots. Dataset names double as store
//! table names, so they must be plain SQL identifiers.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};

/// Default fact dataset (`orders_YYYY-MM.csv`)
pub const DEFAULT_FACT_DATASET: &str = "orders";
/// Default dependent dataset (`order_items.csv`)
pub const DEFAULT_DEPENDENT_DATASET: &str = "order_items";
/// Default dimension snapshots with their key columns
pub const DEFAULT_DIMENSIONS: &str = "customers:customer_id,products:product_id";
/// Column names treated as monetary amounts
pub const DEFAULT_MONETARY_COLUMNS: &str = "price,freight_value,payment_value";

/// How a logical file is ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// One monthly partition of the fact dataset, merged by primary key
    #[serde(alias = "orders_monthly")]
    MonthlyFact,
    /// Dependent records, inserted only alongside their owning facts
    #[serde(rename = "monthly_fact_dependent")]
    FactDependent,
    /// Reference snapshot, replaced wholesale when it changes
    #[serde(alias = "dimension_full_dump")]
    FullDimension,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::MonthlyFact => "monthly_fact",
            FileKind::FactDependent => "monthly_fact_dependent",
            FileKind::FullDimension => "full_dimension",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full-dump reference dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub dataset: String,
    /// Natural key column, if the dump has one
    pub key_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetCatalog {
    pub fact: String,
    pub dependent: String,
    pub dimensions: Vec<DimensionSpec>,
    pub monetary_columns: Vec<String>,
}

impl Default for DatasetCatalog {
    fn default() -> Self {
        Self {
            fact: DEFAULT_FACT_DATASET.to_string(),
            dependent: DEFAULT_DEPENDENT_DATASET.to_string(),
            dimensions: vec![
                DimensionSpec {
                    dataset: "customers".to_string(),
                    key_column: Some("customer_id".to_string()),
                },
                DimensionSpec {
                    dataset: "products".to_string(),
                    key_column: Some("product_id".to_string()),
                },
            ],
            monetary_columns: split_list(DEFAULT_MONETARY_COLUMNS),
        }
    }
}

impl DatasetCatalog {
    /// Parse a dimension list such as `customers:customer_id,products,sellers:seller_id`
    pub fn parse_dimensions(spec: &str) -> Result<Vec<DimensionSpec>> {
        split_list(spec)
            .into_iter()
            .map(|item| {
                let (dataset, key) = match item.split_once(':') {
                    Some((dataset, key)) => (dataset.trim(), Some(key.trim())),
                    None => (item.as_str(), None),
                };
                if dataset.is_empty() {
                    return Err(IngestError::config(format!(
                        "empty dataset name in dimension list '{}'",
                        spec
                    )));
                }
                Ok(DimensionSpec {
                    dataset: dataset.to_string(),
                    key_column: key.filter(|k| !k.is_empty()).map(str::to_string),
                })
            })
            .collect()
    }

    /// Parse a comma-separated column list
    pub fn parse_columns(spec: &str) -> Vec<String> {
        split_list(spec)
    }

    /// Check that every dataset name is a usable, distinct table name
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        let names = std::iter::once(&self.fact)
            .chain(std::iter::once(&self.dependent))
            .chain(self.dimensions.iter().map(|d| &d.dataset));

        for name in names {
            if !is_valid_identifier(name) {
                return Err(IngestError::config(format!(
                    "dataset name '{}' must match [a-z][a-z0-9_]*",
                    name
                )));
            }
            if name == crate::ledger::LEDGER_TABLE {
                return Err(IngestError::config(format!(
                    "dataset name '{}' collides with the ledger table",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(IngestError::config(format!("dataset '{}' is declared twice", name)));
            }
        }

        Ok(())
    }

    pub fn dimension(&self, dataset: &str) -> Option<&DimensionSpec> {
        self.dimensions.iter().find(|d| d.dataset == dataset)
    }

    /// Decide how a file is ingested from its dataset name and whether it
    /// carries a period. Returns `None` for files the catalog does not cover.
    pub fn classify(&self, dataset: &str, has_period: bool) -> Option<FileKind> {
        match (dataset, has_period) {
            (d, true) if d == self.fact => Some(FileKind::MonthlyFact),
            (d, false) if d == self.dependent => Some(FileKind::FactDependent),
            (d, false) if self.dimension(d).is_some() => Some(FileKind::FullDimension),
            _ => None,
        }
    }

    pub fn is_monetary(&self, column: &str) -> bool {
        self.monetary_columns.iter().any(|c| c == column)
    }

    /// Landing file name of the dependent dump
    pub fn dependent_file(&self) -> String {
        format!("{}{}", self.dependent, crate::discovery::CSV_EXTENSION)
    }
}

/// `[a-z][a-z0-9_]*`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {},
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn split_list(spec: &str) -> Vec<String> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
