//! Ingestion configuration
//!
//! Paths, dataset catalog and fingerprint tuning, loaded from `LAKELOAD_*`
//! environment variables with builder-style overrides for the binary and
//! tests.

use crate::catalog::{
    DatasetCatalog, DEFAULT_DEPENDENT_DATASET, DEFAULT_DIMENSIONS, DEFAULT_FACT_DATASET,
    DEFAULT_MONETARY_COLUMNS,
};
use crate::error::{IngestError, Result};
use crate::fingerprint::{FingerprintOptions, DEFAULT_FULL_HASH_ROW_LIMIT, DEFAULT_SAMPLE_ROWS};
use crate::manifest::DEFAULT_MANIFEST_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Defaults
// ============================================================================

/// Default store location
pub const DEFAULT_DB_PATH: &str = "data/warehouse.sqlite";

/// Default landing directory
pub const DEFAULT_LANDING_DIR: &str = "data/lake/landing_zone";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// SQLite store file
    pub db_path: PathBuf,
    /// Directory the producer exports partitions into
    pub landing_dir: PathBuf,
    /// Manifest file name, relative to the landing directory
    pub manifest_file: String,
    /// Skip files whose manifest fingerprint is already applied without reading them
    pub use_manifest_hint: bool,
    pub catalog: DatasetCatalog,
    pub fingerprint: FingerprintOptions,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            landing_dir: PathBuf::from(DEFAULT_LANDING_DIR),
            manifest_file: DEFAULT_MANIFEST_FILE.to_string(),
            use_manifest_hint: true,
            catalog: DatasetCatalog::default(),
            fingerprint: FingerprintOptions::default(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let dimensions = std::env::var("LAKELOAD_DIMENSIONS")
            .unwrap_or_else(|_| DEFAULT_DIMENSIONS.to_string());
        let monetary = std::env::var("LAKELOAD_MONETARY_COLUMNS")
            .unwrap_or_else(|_| DEFAULT_MONETARY_COLUMNS.to_string());

        let config = Self {
            db_path: std::env::var("LAKELOAD_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH)),
            landing_dir: std::env::var("LAKELOAD_LANDING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_LANDING_DIR)),
            manifest_file: std::env::var("LAKELOAD_MANIFEST_FILE")
                .unwrap_or_else(|_| DEFAULT_MANIFEST_FILE.to_string()),
            use_manifest_hint: std::env::var("LAKELOAD_USE_MANIFEST_HINT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
            catalog: DatasetCatalog {
                fact: std::env::var("LAKELOAD_FACT_DATASET")
                    .unwrap_or_else(|_| DEFAULT_FACT_DATASET.to_string()),
                dependent: std::env::var("LAKELOAD_DEPENDENT_DATASET")
                    .unwrap_or_else(|_| DEFAULT_DEPENDENT_DATASET.to_string()),
                dimensions: DatasetCatalog::parse_dimensions(&dimensions)?,
                monetary_columns: DatasetCatalog::parse_columns(&monetary),
            },
            fingerprint: FingerprintOptions {
                full_hash_row_limit: std::env::var("LAKELOAD_FULL_HASH_ROW_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_FULL_HASH_ROW_LIMIT),
                sample_rows: std::env::var("LAKELOAD_SAMPLE_ROWS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SAMPLE_ROWS),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.catalog.validate()?;
        if self.fingerprint.sample_rows == 0 {
            return Err(IngestError::config("LAKELOAD_SAMPLE_ROWS must be greater than 0"));
        }
        if self.manifest_file.is_empty() {
            return Err(IngestError::config("LAKELOAD_MANIFEST_FILE must not be empty"));
        }
        Ok(())
    }

    /// Full path of the manifest document
    pub fn manifest_path(&self) -> PathBuf {
        self.landing_dir.join(&self.manifest_file)
    }

    pub fn with_db_path(mut self, path: impl AsRef<Path>) -> Self {
        self.db_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_landing_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.landing_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_manifest_hint(mut self, enabled: bool) -> Self {
        self.use_manifest_hint = enabled;
        self
    }

    pub fn with_catalog(mut self, catalog: DatasetCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_fingerprint_options(mut self, options: FingerprintOptions) -> Self {
        self.fingerprint = options;
        self
    }
}
