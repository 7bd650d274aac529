//! Landing-zone manifest
//!
//! The producer writes `_manifest.json` next to the partitions it exports,
//! one entry per file with its fingerprint and descriptive stats. The engine
//! reads it only as a hint: a hinted fingerprint that is already applied lets
//! a file be skipped without reading it, but a file is never applied on the
//! manifest's word alone.

use crate::catalog::DatasetCatalog;
use crate::discovery;
use crate::error::{IngestError, Result};
use crate::fingerprint::{self, Fingerprint, FingerprintOptions};
use chrono::Utc;
use lakeload_common::checksum::compute_file_checksum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Default manifest file name inside the landing directory
pub const DEFAULT_MANIFEST_FILE: &str = "_manifest.json";

/// Producer-side record for one landing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Ingestion kind as written by the producer
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ts: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub written_at_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// SHA-256 of the file bytes, lets a refresh skip re-parsing untouched files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_sha256: Option<String>,
}

impl ManifestEntry {
    pub fn from_fingerprint(kind: &str, fp: &Fingerprint, source: Option<String>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            fingerprint: fp.digest.clone(),
            rows: Some(fp.rows as u64),
            min_ts: fp.min_ts.clone(),
            max_ts: fp.max_ts.clone(),
            columns: fp.columns.clone(),
            written_at_utc: Some(Utc::now().to_rfc3339()),
            source,
            file_sha256: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at_utc: Option<String>,
    #[serde(default)]
    pub files: BTreeMap<String, ManifestEntry>,
}

/// Name-keyed access to manifest entries
pub trait ManifestStore {
    /// Entry for a file, if the manifest lists it
    fn get(&self, file_name: &str) -> Option<&ManifestEntry>;

    /// Insert or replace the entry for a file
    fn put(&mut self, file_name: String, entry: ManifestEntry);

    /// Every file name the manifest declares
    fn declared_files(&self) -> Vec<&str>;
}

impl ManifestStore for ManifestDocument {
    fn get(&self, file_name: &str) -> Option<&ManifestEntry> {
        self.files.get(file_name)
    }

    fn put(&mut self, file_name: String, entry: ManifestEntry) {
        self.files.insert(file_name, entry);
        self.generated_at_utc = Some(Utc::now().to_rfc3339());
    }

    fn declared_files(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }
}

impl ManifestDocument {
    /// Load a manifest, `Ok(None)` when the file does not exist
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(IngestError::Io(e)),
        };

        let document = serde_json::from_str(&content).map_err(|e| IngestError::InvalidManifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(document))
    }

    /// Write the manifest through a temp file and rename it into place
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_MANIFEST_FILE.to_string());
        let tmp_path = dir.join(format!(".{}.tmp", file_name));

        let json = serde_json::to_string_pretty(self)?;
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

/// Result of regenerating a manifest from the landing directory
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub written: usize,
    pub unchanged: usize,
    pub removed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Recompute fingerprints for every catalogued landing file and rewrite the
/// manifest. Entries for files no longer on disk are dropped.
pub fn refresh_manifest(
    landing_dir: &Path,
    manifest_path: &Path,
    catalog: &DatasetCatalog,
    options: &FingerprintOptions,
) -> Result<RefreshReport> {
    let mut document = match ManifestDocument::load_optional(manifest_path) {
        Ok(document) => document.unwrap_or_default(),
        Err(IngestError::InvalidManifest { path, reason }) => {
            warn!(path = %path, reason = %reason, "Replacing unreadable manifest");
            ManifestDocument::default()
        },
        Err(e) => return Err(e),
    };

    let found = discovery::discover(landing_dir, catalog)?;
    let mut report = RefreshReport::default();

    let stale: Vec<String> = document
        .files
        .keys()
        .filter(|name| !found.contains(name))
        .cloned()
        .collect();
    for name in stale {
        document.files.remove(&name);
        report.removed.push(name);
    }

    for file in found.files() {
        let file_sha256 = compute_file_checksum(&file.path)?;
        let existing = document.get(&file.name);
        if existing.is_some_and(|e| e.file_sha256.as_deref() == Some(file_sha256.as_str())) {
            report.unchanged += 1;
            continue;
        }

        match fingerprint::fingerprint_file(file, catalog, options) {
            Ok(fp) => {
                if let Some(existing) = existing.filter(|e| e.fingerprint == fp.digest) {
                    // same content, different bytes: keep the entry, record the new bytes
                    let mut entry = existing.clone();
                    entry.file_sha256 = Some(file_sha256);
                    document.files.insert(file.name.clone(), entry);
                    report.unchanged += 1;
                    continue;
                }
                let mut entry = ManifestEntry::from_fingerprint(
                    file.kind.as_str(),
                    &fp,
                    existing.and_then(|e| e.source.clone()),
                );
                entry.file_sha256 = Some(file_sha256);
                document.put(file.name.clone(), entry);
                report.written += 1;
            },
            Err(e) if !e.is_fatal() => {
                warn!(file = %file.name, error = %e, "Cannot fingerprint landing file");
                report.failed.push((file.name.clone(), e.to_string()));
            },
            Err(e) => return Err(e),
        }
    }

    if document.generated_at_utc.is_none() || report.written > 0 || !report.removed.is_empty() {
        document.generated_at_utc = Some(Utc::now().to_rfc3339());
    }
    document.save(manifest_path)?;

    info!(
        path = %manifest_path.display(),
        written = report.written,
        unchanged = report.unchanged,
        removed = report.removed.len(),
        failed = report.failed.len(),
        "Manifest refreshed"
    );

    Ok(report)
}
