//! Content fingerprints
//!
//! A fingerprint is a deterministic digest of a partition's logical content,
//! independent of row order and of file bytes. Two partitions with the same
//! rows hash the same even if re-exported in a different order.
//!
//! - Fact partitions hash row count, timestamp bounds and the sorted set of
//!   primary keys.
//! - Full dumps hash every row when small enough, otherwise the sorted key
//!   column, otherwise a bounded sample of leading rows. The strategy name is
//!   part of the digest so different strategies never compare equal.

use crate::catalog::{DatasetCatalog, FileKind};
use crate::discovery::DiscoveredFile;
use crate::error::Result;
use crate::records::{self, DimensionSnapshot, OrderItemRecord, OrderRecord, TypedRecord};
use lakeload_common::checksum::{sorted_tokens_digest, TokenDigest};
use serde::{Deserialize, Serialize};

/// Default row limit below which a full dump is hashed row by row
pub const DEFAULT_FULL_HASH_ROW_LIMIT: usize = 5_000_000;
/// Default number of rows sampled when a large dump has no key column
pub const DEFAULT_SAMPLE_ROWS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintOptions {
    pub full_hash_row_limit: usize,
    pub sample_rows: usize,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        Self {
            full_hash_row_limit: DEFAULT_FULL_HASH_ROW_LIMIT,
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }
}

/// How a full dump was hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpStrategy {
    FullRows,
    KeyColumn,
    Sample,
}

impl DumpStrategy {
    fn tag(&self) -> &'static str {
        match self {
            DumpStrategy::FullRows => "full_rows",
            DumpStrategy::KeyColumn => "key_column",
            DumpStrategy::Sample => "sample",
        }
    }
}

/// Digest plus the descriptive stats recorded alongside it in the manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub digest: String,
    pub rows: usize,
    pub min_ts: Option<String>,
    pub max_ts: Option<String>,
    pub columns: Vec<String>,
}

/// Fingerprint a fact partition from its rows
pub fn fingerprint_fact(orders: &[OrderRecord]) -> Fingerprint {
    let timestamps: Vec<_> = orders.iter().filter_map(|o| o.purchased_at()).collect();
    let min_ts = timestamps.iter().min().map(|t| t.to_string());
    let max_ts = timestamps.iter().max().map(|t| t.to_string());

    let keys_hash = sorted_tokens_digest(orders.iter().map(|o| o.order_id.as_deref().unwrap_or("")));

    let mut digest = TokenDigest::new();
    digest.push_field("rows", orders.len());
    digest.push_field("min_ts", min_ts.as_deref().unwrap_or(""));
    digest.push_field("max_ts", max_ts.as_deref().unwrap_or(""));
    digest.push_field("order_ids_hash", &keys_hash);

    Fingerprint {
        digest: digest.finish(),
        rows: orders.len(),
        min_ts,
        max_ts,
        columns: OrderRecord::COLUMNS.iter().map(|c| c.to_string()).collect(),
    }
}

/// Fingerprint the dependent dump by its full row content
pub fn fingerprint_dependent(items: &[OrderItemRecord], options: &FingerprintOptions) -> Fingerprint {
    let (strategy, tokens_hash) = if items.len() <= options.full_hash_row_limit {
        (
            DumpStrategy::FullRows,
            sorted_tokens_digest(items.iter().map(|i| i.canonical_row())),
        )
    } else {
        (
            DumpStrategy::KeyColumn,
            sorted_tokens_digest(
                items
                    .iter()
                    .map(|i| i.key().map(|k| k.to_string()).unwrap_or_default()),
            ),
        )
    };

    Fingerprint {
        digest: dump_digest(strategy, items.len(), OrderItemRecord::COLUMNS.iter().copied(), &tokens_hash),
        rows: items.len(),
        min_ts: None,
        max_ts: None,
        columns: OrderItemRecord::COLUMNS.iter().map(|c| c.to_string()).collect(),
    }
}

/// Fingerprint a dimension snapshot
pub fn fingerprint_dimension(
    snapshot: &DimensionSnapshot,
    key_column: Option<&str>,
    options: &FingerprintOptions,
) -> Fingerprint {
    let key_values = key_column.and_then(|k| snapshot.column_values(k));

    let (strategy, tokens_hash) = if snapshot.len() <= options.full_hash_row_limit {
        (DumpStrategy::FullRows, sorted_tokens_digest(snapshot.canonical_rows()))
    } else if let Some(values) = key_values {
        (
            DumpStrategy::KeyColumn,
            sorted_tokens_digest(values.map(|v| v.unwrap_or(""))),
        )
    } else {
        let sample: Vec<String> = snapshot
            .canonical_rows()
            .into_iter()
            .take(options.sample_rows)
            .collect();
        (DumpStrategy::Sample, sorted_tokens_digest(sample))
    };

    Fingerprint {
        digest: dump_digest(
            strategy,
            snapshot.len(),
            snapshot.columns.iter().map(String::as_str),
            &tokens_hash,
        ),
        rows: snapshot.len(),
        min_ts: None,
        max_ts: None,
        columns: snapshot.columns.clone(),
    }
}

fn dump_digest<'a>(
    strategy: DumpStrategy,
    rows: usize,
    columns: impl Iterator<Item = &'a str>,
    tokens_hash: &str,
) -> String {
    let mut digest = TokenDigest::new();
    digest.push_field("strategy", strategy.tag());
    digest.push_field("rows", rows);
    let mut column_digest = TokenDigest::new();
    for column in columns {
        column_digest.push_token(column);
    }
    digest.push_field("columns", column_digest.finish());
    digest.push_field("content_hash", tokens_hash);
    digest.finish()
}

/// Read a landing file and fingerprint it according to its kind
pub fn fingerprint_file(
    file: &DiscoveredFile,
    catalog: &DatasetCatalog,
    options: &FingerprintOptions,
) -> Result<Fingerprint> {
    match file.kind {
        FileKind::MonthlyFact => Ok(fingerprint_fact(&records::read_orders(&file.path)?)),
        FileKind::FactDependent => Ok(fingerprint_dependent(
            &records::read_order_items(&file.path)?,
            options,
        )),
        FileKind::FullDimension => {
            let snapshot = records::read_dimension(&file.path)?;
            let key = catalog
                .dimension(&file.dataset)
                .and_then(|d| d.key_column.as_deref());
            Ok(fingerprint_dimension(&snapshot, key, options))
        },
    }
}
