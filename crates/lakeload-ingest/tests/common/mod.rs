//! Shared fixtures for ingestion integration tests
#![allow(dead_code)]

use lakeload_ingest::{store, IngestConfig, Store};
use std::fmt::Write as _;
use std::path::PathBuf;
use tempfile::TempDir;

pub const ORDERS_HEADER: &str =
    "order_id,customer_id,order_status,order_purchase_timestamp,order_approved_at\n";
pub const ITEMS_HEADER: &str =
    "order_id,order_item_id,product_id,seller_id,shipping_limit_date,price,freight_value\n";

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lakeload_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A temp landing directory plus a store path next to it
pub struct Landing {
    pub dir: TempDir,
    pub config: IngestConfig,
}

impl Landing {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = IngestConfig::default()
            .with_landing_dir(dir.path().join("landing"))
            .with_db_path(dir.path().join("db").join("warehouse.sqlite"));
        std::fs::create_dir_all(&config.landing_dir).unwrap();
        Self { dir, config }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.config.landing_dir.join(name)
    }

    pub fn write(&self, name: &str, content: &str) {
        std::fs::write(self.path(name), content).unwrap();
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.path(name)).unwrap();
    }

    pub fn open_store(&self) -> Store {
        Store::open(&self.config.db_path).unwrap()
    }
}

pub fn order_id(n: usize) -> String {
    format!("ord{:06}", n)
}

/// Orders `ids` in a `YYYY-MM` period, one per row
pub fn orders_csv(ids: impl IntoIterator<Item = usize>, period: &str) -> String {
    let mut out = String::from(ORDERS_HEADER);
    for n in ids {
        let day = 1 + n % 28;
        writeln!(
            out,
            "{},cust{:06},delivered,{}-{:02} 10:00:00,{}-{:02} 10:30:00",
            order_id(n),
            n,
            period,
            day,
            period,
            day
        )
        .unwrap();
    }
    out
}

/// `lines` items for each of the orders `ids`
pub fn items_csv(ids: impl IntoIterator<Item = usize>, lines: i64, price: f64) -> String {
    let mut out = String::from(ITEMS_HEADER);
    for n in ids {
        for line in 1..=lines {
            writeln!(
                out,
                "{},{},prod{:04},sell{:03},2018-09-10 00:00:00,{:.2},4.50",
                order_id(n),
                line,
                n % 500,
                n % 50,
                price
            )
            .unwrap();
        }
    }
    out
}

pub fn customers_csv(count: usize) -> String {
    let mut out = String::from("customer_id,customer_city,customer_state\n");
    for n in 0..count {
        writeln!(out, "cust{:06},city{},SP", n, n % 97).unwrap();
    }
    out
}

pub fn count(store: &Store, table: &str) -> u64 {
    store::count_rows(store.connection(), table).unwrap()
}

/// Dependents whose owner is not in the fact table
pub fn orphan_dependents(store: &Store) -> i64 {
    store
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM order_items i LEFT JOIN orders o ON o.order_id = i.order_id \
             WHERE o.order_id IS NULL",
            [],
            |row| row.get(0),
        )
        .unwrap()
}
