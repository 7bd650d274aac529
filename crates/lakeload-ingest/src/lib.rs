//! Lakeload Ingest Library
//!
//! Incremental, idempotent ingestion of partitioned CSV exports into a
//! SQLite analytical store.
//!
//! # Datasets
//!
//! - **Fact**: monthly partitions (`orders_2018-09.csv`), merged by primary key
//! - **Dependent**: one dump (`order_items.csv`) whose rows are inserted only
//!   alongside the facts that own them
//! - **Dimensions**: full dumps (`customers.csv`), replaced when they change
//!
//! Every file is fingerprinted by content and tracked in a processing ledger
//! kept in the same store, so re-running on unchanged input is a no-op.
//!
//! # Example
//!
//! ```no_run
//! use lakeload_ingest::{run_incremental_ingestion, IngestConfig, Store};
//!
//! fn main() -> lakeload_ingest::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let mut store = Store::open(&config.db_path)?;
//!     let summary = run_incremental_ingestion(&mut store, &config)?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod catalog;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod manifest;
pub mod merge;
pub mod quality;
pub mod records;
pub mod store;
pub mod summary;

pub use catalog::{DatasetCatalog, FileKind};
pub use config::IngestConfig;
pub use engine::{run_incremental_ingestion, CancellationFlag, Engine};
pub use error::{IngestError, Result};
pub use ledger::{LedgerEntry, LedgerStatus, ProcessingLedger};
pub use store::Store;
pub use summary::{FileReport, RunSummary};
