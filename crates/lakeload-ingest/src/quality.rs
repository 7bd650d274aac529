//! Data quality gate
//!
//! Every candidate partition passes through [`validate`] before it may touch
//! the store. Hard rules fail the partition; soft rules only produce
//! warnings that the engine logs.

use crate::catalog::{DatasetCatalog, FileKind};
use crate::discovery::Period;
use crate::records::{DimensionSnapshot, OrderItemRecord, OrderRecord, TypedRecord};

/// Rule that rejects a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Empty,
    MissingKeyColumn { column: String },
    NullPrimaryKey { column: String, rows: usize },
    NegativeAmount { column: String, rows: usize },
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Violation::Empty => f.write_str("partition is empty"),
            Violation::MissingKeyColumn { column } => write!(f, "missing key column {}", column),
            Violation::NullPrimaryKey { column, rows } => {
                write!(f, "null primary key {} ({} rows)", column, rows)
            },
            Violation::NegativeAmount { column, rows } => {
                write!(f, "negative {} ({} rows)", column, rows)
            },
        }
    }
}

/// Rule that is reported but does not block the partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    NullJoinKey { column: String, rows: usize },
    OutOfPeriod { period: Period, rows: usize },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::NullJoinKey { column, rows } => {
                write!(f, "null join key {} ({} rows)", column, rows)
            },
            Warning::OutOfPeriod { period, rows } => {
                write!(f, "{} rows timestamped outside {}", rows, period)
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Pass { warnings: Vec<Warning> },
    Fail { violations: Vec<Violation>, warnings: Vec<Warning> },
}

impl ValidationResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, ValidationResult::Pass { .. })
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            ValidationResult::Pass { warnings } | ValidationResult::Fail { warnings, .. } => {
                warnings
            },
        }
    }

    /// Violated rules rendered for the ledger note
    pub fn violation_messages(&self) -> Vec<String> {
        match self {
            ValidationResult::Pass { .. } => Vec::new(),
            ValidationResult::Fail { violations, .. } => {
                violations.iter().map(ToString::to_string).collect()
            },
        }
    }
}

/// Column-level statistics the gate needs from a partition
pub trait PartitionView {
    fn row_count(&self) -> usize;
    fn has_column(&self, column: &str) -> bool;
    fn null_count(&self, column: &str) -> usize;
    fn negative_count(&self, column: &str) -> usize;
}

impl<T: TypedRecord> PartitionView for [T] {
    fn row_count(&self) -> usize {
        self.len()
    }

    fn has_column(&self, column: &str) -> bool {
        T::COLUMNS.iter().any(|c| *c == column)
    }

    fn null_count(&self, column: &str) -> usize {
        self.iter().filter(|r| r.is_null(column)).count()
    }

    fn negative_count(&self, column: &str) -> usize {
        self.iter()
            .filter(|r| r.amount(column).is_some_and(|v| v < 0.0))
            .count()
    }
}

impl PartitionView for DimensionSnapshot {
    fn row_count(&self) -> usize {
        self.len()
    }

    fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    fn null_count(&self, column: &str) -> usize {
        self.column_values(column)
            .map(|values| values.filter(Option::is_none).count())
            .unwrap_or(0)
    }

    fn negative_count(&self, column: &str) -> usize {
        self.column_values(column)
            .map(|values| {
                values
                    .filter_map(|v| v.and_then(|s| s.parse::<f64>().ok()))
                    .filter(|v| *v < 0.0)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Which columns each rule applies to for one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateRules {
    pub primary_key: Vec<String>,
    pub join_keys: Vec<String>,
    pub monetary: Vec<String>,
}

impl GateRules {
    /// Rules for a file of `kind` belonging to `dataset`
    pub fn for_kind(kind: FileKind, catalog: &DatasetCatalog, dataset: &str) -> Self {
        let monetary = catalog.monetary_columns.clone();
        match kind {
            FileKind::MonthlyFact => Self {
                primary_key: vec!["order_id".to_string()],
                join_keys: vec!["customer_id".to_string()],
                monetary,
            },
            FileKind::FactDependent => Self {
                primary_key: vec!["order_id".to_string(), "order_item_id".to_string()],
                join_keys: vec!["product_id".to_string(), "seller_id".to_string()],
                monetary,
            },
            FileKind::FullDimension => Self {
                primary_key: catalog
                    .dimension(dataset)
                    .and_then(|d| d.key_column.clone())
                    .into_iter()
                    .collect(),
                join_keys: Vec::new(),
                monetary,
            },
        }
    }
}

/// Run the gate over a partition
///
/// Monetary rules only apply to columns the partition actually has. A
/// primary key column that is missing altogether is a violation.
pub fn validate<P: PartitionView + ?Sized>(partition: &P, rules: &GateRules) -> ValidationResult {
    let mut violations = Vec::new();
    let mut warnings = Vec::new();

    if partition.row_count() == 0 {
        violations.push(Violation::Empty);
    }

    for column in &rules.primary_key {
        if !partition.has_column(column) {
            violations.push(Violation::MissingKeyColumn {
                column: column.clone(),
            });
            continue;
        }
        let rows = partition.null_count(column);
        if rows > 0 {
            violations.push(Violation::NullPrimaryKey {
                column: column.clone(),
                rows,
            });
        }
    }

    for column in rules.monetary.iter().filter(|c| partition.has_column(c)) {
        let rows = partition.negative_count(column);
        if rows > 0 {
            violations.push(Violation::NegativeAmount {
                column: column.clone(),
                rows,
            });
        }
    }

    for column in rules.join_keys.iter().filter(|c| partition.has_column(c)) {
        let rows = partition.null_count(column);
        if rows > 0 {
            warnings.push(Warning::NullJoinKey {
                column: column.clone(),
                rows,
            });
        }
    }

    if violations.is_empty() {
        ValidationResult::Pass { warnings }
    } else {
        ValidationResult::Fail {
            violations,
            warnings,
        }
    }
}

/// Count orders whose purchase timestamp falls outside the partition's period
pub fn check_period(orders: &[OrderRecord], period: Period) -> Option<Warning> {
    let rows = orders
        .iter()
        .filter_map(OrderRecord::purchased_at)
        .filter(|ts| !period.contains(ts))
        .count();
    (rows > 0).then_some(Warning::OutOfPeriod { period, rows })
}

/// Gate a fact partition, including the period sanity check
pub fn validate_fact(
    orders: &[OrderRecord],
    period: Option<Period>,
    rules: &GateRules,
) -> ValidationResult {
    let mut result = validate(orders, rules);
    if let Some(warning) = period.and_then(|p| check_period(orders, p)) {
        match &mut result {
            ValidationResult::Pass { warnings } | ValidationResult::Fail { warnings, .. } => {
                warnings.push(warning)
            },
        }
    }
    result
}

pub fn validate_dependent(items: &[OrderItemRecord], rules: &GateRules) -> ValidationResult {
    validate(items, rules)
}
