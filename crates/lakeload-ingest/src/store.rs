//! Analytical store
//!
//! A single SQLite database holding the fact table, the dependent table, one
//! table per dimension snapshot and the processing ledger. The handle is
//! passed explicitly to every operation; write helpers take a plain
//! `&Connection` so they run inside whatever transaction the caller opened.

use crate::catalog::DatasetCatalog;
use crate::error::Result;
use crate::ledger::ProcessingLedger;
use crate::merge::KeyLookup;
use crate::records::{DimensionSnapshot, ItemKey, OrderItemRecord, OrderRecord};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use std::path::Path;
use tracing::debug;

/// Quote an identifier for use in SQL text
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened store");
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        ProcessingLedger::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    pub fn ledger(&self) -> ProcessingLedger<'_> {
        ProcessingLedger::new(&self.conn)
    }

    /// Create the fact and dependent tables for the catalog
    pub fn ensure_schema(&self, catalog: &DatasetCatalog) -> Result<()> {
        let fact = quote_ident(&catalog.fact);
        let dependent = quote_ident(&catalog.dependent);
        self.conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {fact} (
                order_id TEXT PRIMARY KEY,
                customer_id TEXT,
                order_status TEXT,
                order_purchase_timestamp TEXT,
                order_approved_at TEXT,
                order_delivered_carrier_date TEXT,
                order_delivered_customer_date TEXT,
                order_estimated_delivery_date TEXT,
                source_file TEXT NOT NULL,
                loaded_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS {dependent} (
                order_id TEXT NOT NULL,
                order_item_id INTEGER NOT NULL,
                product_id TEXT,
                seller_id TEXT,
                shipping_limit_date TEXT,
                price REAL,
                freight_value REAL,
                source_file TEXT NOT NULL,
                loaded_at TEXT NOT NULL,
                PRIMARY KEY (order_id, order_item_id),
                FOREIGN KEY (order_id) REFERENCES {fact}(order_id)
            );
            "#
        ))?;
        Ok(())
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Row count of a table, zero when it does not exist
pub fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    if !table_exists(conn, table)? {
        return Ok(0);
    }
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

pub fn insert_orders(
    conn: &Connection,
    table: &str,
    orders: &[&OrderRecord],
    source_file: &str,
) -> Result<u64> {
    let loaded_at = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare_cached(&format!(
        r#"
        INSERT INTO {} (
            order_id, customer_id, order_status, order_purchase_timestamp,
            order_approved_at, order_delivered_carrier_date,
            order_delivered_customer_date, order_estimated_delivery_date,
            source_file, loaded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        quote_ident(table)
    ))?;

    let mut inserted = 0;
    for order in orders {
        inserted += stmt.execute(params![
            order.order_id,
            order.customer_id,
            order.order_status,
            order.order_purchase_timestamp,
            order.order_approved_at,
            order.order_delivered_carrier_date,
            order.order_delivered_customer_date,
            order.order_estimated_delivery_date,
            source_file,
            loaded_at,
        ])? as u64;
    }
    Ok(inserted)
}

pub fn insert_items(
    conn: &Connection,
    table: &str,
    items: &[&OrderItemRecord],
    source_file: &str,
) -> Result<u64> {
    let loaded_at = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare_cached(&format!(
        r#"
        INSERT INTO {} (
            order_id, order_item_id, product_id, seller_id,
            shipping_limit_date, price, freight_value, source_file, loaded_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        quote_ident(table)
    ))?;

    let mut inserted = 0;
    for item in items {
        inserted += stmt.execute(params![
            item.order_id,
            item.order_item_id,
            item.product_id,
            item.seller_id,
            item.shipping_limit_date,
            item.price,
            item.freight_value,
            source_file,
            loaded_at,
        ])? as u64;
    }
    Ok(inserted)
}

/// Drop and recreate a dimension table from a snapshot
pub fn replace_dimension(conn: &Connection, table: &str, snapshot: &DimensionSnapshot) -> Result<u64> {
    let table = quote_ident(table);
    let columns: Vec<String> = snapshot.columns.iter().map(|c| quote_ident(c)).collect();

    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS {table}; CREATE TABLE {table} ({});",
        columns
            .iter()
            .map(|c| format!("{} TEXT", c))
            .collect::<Vec<_>>()
            .join(", ")
    ))?;

    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    ))?;

    let mut inserted = 0;
    for row in &snapshot.rows {
        // short rows pad with NULL
        let values = (0..columns.len()).map(|i| row.get(i).cloned().flatten());
        inserted += stmt.execute(params_from_iter(values))? as u64;
    }
    Ok(inserted)
}

/// Primary keys stored in the fact table
pub struct FactKeys<'c> {
    conn: &'c Connection,
    sql: String,
}

impl<'c> FactKeys<'c> {
    pub fn new(conn: &'c Connection, table: &str) -> Self {
        Self {
            conn,
            sql: format!("SELECT 1 FROM {} WHERE order_id = ?1", quote_ident(table)),
        }
    }
}

impl KeyLookup<str> for FactKeys<'_> {
    fn contains_key(&self, key: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(&self.sql)?;
        Ok(stmt.exists(params![key])?)
    }
}

/// Composite keys stored in the dependent table
pub struct DependentKeys<'c> {
    conn: &'c Connection,
    sql: String,
}

impl<'c> DependentKeys<'c> {
    pub fn new(conn: &'c Connection, table: &str) -> Self {
        Self {
            conn,
            sql: format!(
                "SELECT 1 FROM {} WHERE order_id = ?1 AND order_item_id = ?2",
                quote_ident(table)
            ),
        }
    }
}

impl KeyLookup<ItemKey> for DependentKeys<'_> {
    fn contains_key(&self, key: &ItemKey) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(&self.sql)?;
        Ok(stmt.exists(params![key.order_id, key.order_item_id])?)
    }
}
