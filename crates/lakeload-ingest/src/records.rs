//! Typed record definitions per dataset kind
//!
//! Fact and dependent rows decode into explicit structs. Key columns are
//! `Option` so that nulls survive decoding and are rejected by the quality
//! gate rather than by the CSV reader. Dimension snapshots keep their dump's
//! own column list and are stored as text.

use crate::error::{IngestError, Result};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Stand-in for a null field in serialized rows
const NULL_MARKER: char = '~';

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Column access used by the quality gate and fingerprinting
pub trait TypedRecord {
    /// Columns in store order
    const COLUMNS: &'static [&'static str];

    fn is_null(&self, column: &str) -> bool;

    /// Numeric value of a monetary column, if the column exists and is set
    fn amount(&self, column: &str) -> Option<f64>;

    /// Stable single-line serialization of the whole row
    fn canonical_row(&self) -> String;
}

/// One order (fact dataset)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: Option<String>,
    pub customer_id: Option<String>,
    pub order_status: Option<String>,
    pub order_purchase_timestamp: Option<String>,
    pub order_approved_at: Option<String>,
    pub order_delivered_carrier_date: Option<String>,
    pub order_delivered_customer_date: Option<String>,
    pub order_estimated_delivery_date: Option<String>,
}

impl OrderRecord {
    pub fn purchased_at(&self) -> Option<NaiveDateTime> {
        self.order_purchase_timestamp
            .as_deref()
            .and_then(parse_timestamp)
    }

    fn fields(&self) -> [&Option<String>; 8] {
        [
            &self.order_id,
            &self.customer_id,
            &self.order_status,
            &self.order_purchase_timestamp,
            &self.order_approved_at,
            &self.order_delivered_carrier_date,
            &self.order_delivered_customer_date,
            &self.order_estimated_delivery_date,
        ]
    }
}

impl TypedRecord for OrderRecord {
    const COLUMNS: &'static [&'static str] = &[
        "order_id",
        "customer_id",
        "order_status",
        "order_purchase_timestamp",
        "order_approved_at",
        "order_delivered_carrier_date",
        "order_delivered_customer_date",
        "order_estimated_delivery_date",
    ];

    fn is_null(&self, column: &str) -> bool {
        Self::COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|i| self.fields()[i].is_none())
            .unwrap_or(false)
    }

    fn amount(&self, _column: &str) -> Option<f64> {
        None
    }

    fn canonical_row(&self) -> String {
        join_fields(self.fields().iter().map(|f| f.as_deref()))
    }
}

/// Composite key of a dependent record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub order_id: String,
    pub order_item_id: i64,
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.order_id, self.order_item_id)
    }
}

/// One order line (dependent dataset)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub order_id: Option<String>,
    pub order_item_id: Option<i64>,
    pub product_id: Option<String>,
    pub seller_id: Option<String>,
    pub shipping_limit_date: Option<String>,
    pub price: Option<f64>,
    pub freight_value: Option<f64>,
}

impl OrderItemRecord {
    pub fn key(&self) -> Option<ItemKey> {
        Some(ItemKey {
            order_id: self.order_id.clone()?,
            order_item_id: self.order_item_id?,
        })
    }

    /// Key of the owning order
    pub fn owner(&self) -> Option<&str> {
        self.order_id.as_deref()
    }
}

impl TypedRecord for OrderItemRecord {
    const COLUMNS: &'static [&'static str] = &[
        "order_id",
        "order_item_id",
        "product_id",
        "seller_id",
        "shipping_limit_date",
        "price",
        "freight_value",
    ];

    fn is_null(&self, column: &str) -> bool {
        match column {
            "order_id" => self.order_id.is_none(),
            "order_item_id" => self.order_item_id.is_none(),
            "product_id" => self.product_id.is_none(),
            "seller_id" => self.seller_id.is_none(),
            "shipping_limit_date" => self.shipping_limit_date.is_none(),
            "price" => self.price.is_none(),
            "freight_value" => self.freight_value.is_none(),
            _ => false,
        }
    }

    fn amount(&self, column: &str) -> Option<f64> {
        match column {
            "price" => self.price,
            "freight_value" => self.freight_value,
            _ => None,
        }
    }

    fn canonical_row(&self) -> String {
        let item_id = self.order_item_id.map(|v| v.to_string());
        let price = self.price.map(|v| v.to_string());
        let freight = self.freight_value.map(|v| v.to_string());
        join_fields(
            [
                self.order_id.as_deref(),
                item_id.as_deref(),
                self.product_id.as_deref(),
                self.seller_id.as_deref(),
                self.shipping_limit_date.as_deref(),
                price.as_deref(),
                freight.as_deref(),
            ]
            .into_iter(),
        )
    }
}

/// A full-dump reference table, kept with its own column list
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DimensionSnapshot {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl DimensionSnapshot {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Values of one column, nulls included
    pub fn column_values(&self, column: &str) -> Option<impl Iterator<Item = Option<&str>>> {
        let index = self.column_index(column)?;
        Some(
            self.rows
                .iter()
                .map(move |row| row.get(index).and_then(|v| v.as_deref())),
        )
    }

    pub fn canonical_rows(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| join_fields(row.iter().map(|v| v.as_deref())))
            .collect()
    }
}

/// Parse the timestamp formats found in the exports
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Fields as `<byte length>:<value>`, nulls as `~`. The encoding is self
/// delimiting, so no field value can shift a boundary.
fn join_fields<'a>(fields: impl Iterator<Item = Option<&'a str>>) -> String {
    let mut out = String::new();
    for field in fields {
        match field {
            Some(value) => {
                out.push_str(&value.len().to_string());
                out.push(':');
                out.push_str(value);
            },
            None => out.push(NULL_MARKER),
        }
    }
    out
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| IngestError::unreadable(file_label(path), e))
}

/// Decode a CSV partition into typed records
pub fn read_typed<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let label = file_label(path);
    let mut reader = csv_reader(path)?;
    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| {
            row.map_err(|e| IngestError::unreadable(&label, format!("row {}: {}", i + 1, e)))
        })
        .collect()
}

pub fn read_orders(path: &Path) -> Result<Vec<OrderRecord>> {
    read_typed(path)
}

pub fn read_order_items(path: &Path) -> Result<Vec<OrderItemRecord>> {
    read_typed(path)
}

/// Read a full dump, keeping its header as the column list
pub fn read_dimension(path: &Path) -> Result<DimensionSnapshot> {
    let label = file_label(path);
    let mut reader = csv_reader(path)?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::unreadable(&label, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut seen = HashSet::new();
    for column in &columns {
        if column.is_empty() {
            return Err(IngestError::unreadable(&label, "empty column name in header"));
        }
        if !seen.insert(column.as_str()) {
            return Err(IngestError::unreadable(
                &label,
                format!("duplicate column '{}' in header", column),
            ));
        }
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| IngestError::unreadable(&label, format!("row {}: {}", i + 1, e)))?;
        rows.push(
            record
                .iter()
                .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                .collect(),
        );
    }

    Ok(DimensionSnapshot { columns, rows })
}
