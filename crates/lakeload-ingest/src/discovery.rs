//! Landing-zone discovery
//!
//! Lists the landing directory, parses file names into dataset and period,
//! and groups files by how they are ingested. Fact partitions come back in
//! ascending period order.

use crate::catalog::{DatasetCatalog, FileKind};
use crate::error::{IngestError, Result};
use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CSV_EXTENSION: &str = ".csv";

/// A calendar month, written `YYYY-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Parse `YYYY-MM`
    pub fn parse(value: &str) -> Option<Self> {
        let (year, month) = value.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        ts.year() == self.year && ts.month() == self.month
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Dataset and optional period parsed from a landing file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub dataset: String,
    pub period: Option<Period>,
}

/// Parse `<dataset>_<YYYY-MM>.csv` or `<dataset>.csv`.
///
/// Hidden files and files starting with `_` (the manifest, temp files) are
/// not data files.
pub fn parse_file_name(name: &str) -> Option<ParsedName> {
    if name.starts_with('.') || name.starts_with('_') {
        return None;
    }
    let stem = name.strip_suffix(CSV_EXTENSION)?;
    if stem.is_empty() {
        return None;
    }

    if let Some((dataset, suffix)) = stem.rsplit_once('_') {
        if let Some(period) = Period::parse(suffix) {
            if dataset.is_empty() {
                return None;
            }
            return Some(ParsedName {
                dataset: dataset.to_string(),
                period: Some(period),
            });
        }
    }

    Some(ParsedName {
        dataset: stem.to_string(),
        period: None,
    })
}

/// A landing file the catalog knows how to ingest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub name: String,
    pub path: PathBuf,
    pub dataset: String,
    pub period: Option<Period>,
    pub kind: FileKind,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub dimensions: Vec<DiscoveredFile>,
    pub dependent: Option<DiscoveredFile>,
    /// Fact partitions, oldest period first
    pub facts: Vec<DiscoveredFile>,
    /// CSV files the catalog does not cover
    pub ignored: Vec<String>,
}

impl Discovery {
    /// Every ingestible file, in processing order
    pub fn files(&self) -> impl Iterator<Item = &DiscoveredFile> {
        self.dimensions
            .iter()
            .chain(self.dependent.iter())
            .chain(self.facts.iter())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files().any(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty() && self.dependent.is_none() && self.facts.is_empty()
    }
}

/// Scan the landing directory
///
/// A missing directory yields an empty result; the run then has nothing to
/// do. Any other listing failure is returned.
pub fn discover(landing_dir: &Path, catalog: &DatasetCatalog) -> Result<Discovery> {
    let mut discovery = Discovery::default();

    let entries = match std::fs::read_dir(landing_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(dir = %landing_dir.display(), "Landing directory does not exist");
            return Ok(discovery);
        },
        Err(e) => return Err(IngestError::Io(e)),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(parsed) = parse_file_name(&name) else {
            continue;
        };

        let Some(kind) = catalog.classify(&parsed.dataset, parsed.period.is_some()) else {
            debug!(file = %name, "Ignoring file outside the catalog");
            discovery.ignored.push(name);
            continue;
        };

        let file = DiscoveredFile {
            path: entry.path(),
            name,
            dataset: parsed.dataset,
            period: parsed.period,
            kind,
        };

        match kind {
            FileKind::MonthlyFact => discovery.facts.push(file),
            FileKind::FullDimension => discovery.dimensions.push(file),
            FileKind::FactDependent => discovery.dependent = Some(file),
        }
    }

    discovery.facts.sort_by(|a, b| a.period.cmp(&b.period).then_with(|| a.name.cmp(&b.name)));
    discovery.dimensions.sort_by(|a, b| a.name.cmp(&b.name));
    discovery.ignored.sort();

    debug!(
        dimensions = discovery.dimensions.len(),
        facts = discovery.facts.len(),
        dependent = discovery.dependent.is_some(),
        ignored = discovery.ignored.len(),
        "Landing zone scanned"
    );

    Ok(discovery)
}
