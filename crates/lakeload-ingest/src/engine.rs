//! Incremental merge engine
//!
//! Drives one ingestion run over the landing zone:
//!
//! 1. Files declared by the manifest but absent on disk are recorded as FAIL.
//! 2. Dimension snapshots are replaced when their fingerprint changed.
//! 3. The dependent dump is gated once, if its fingerprint is new.
//! 4. Fact partitions are merged oldest period first. Each partition's new
//!    facts, the dependents owned by those facts and the ledger entry commit
//!    in one transaction.
//! 5. The dependent dump gets its own ledger entry. A new dump first
//!    backfills dependents of facts that are stored but have none yet.
//!
//! If a dump seen in an earlier run is absent while facts are inserted, its
//! ledger row is reopened as FAIL so that its next appearance backfills them.
//!
//! Per-file failures are written to the ledger and the run moves on. Store
//! failures abort the run with nothing recorded for the file in flight.

use crate::catalog::FileKind;
use crate::config::IngestConfig;
use crate::discovery::{self, parse_file_name, DiscoveredFile, Discovery};
use crate::error::{IngestError, Result};
use crate::fingerprint::{self, Fingerprint};
use crate::ledger::{LedgerEntry, LedgerStatus, ProcessingLedger};
use crate::manifest::{ManifestDocument, ManifestEntry, ManifestStore};
use crate::merge::{self, OwnerIndex};
use crate::quality::{self, GateRules, ValidationResult};
use crate::records::{self, OrderItemRecord};
use crate::store::{self, DependentKeys, FactKeys, Store};
use crate::summary::{FileReport, RunSummary};
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Shared flag requesting that a run stop at the next file boundary
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one logical file within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Discovered,
    Skipped,
    Validating,
    Failed,
    Merging,
    Applied,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileState::Discovered => "DISCOVERED",
            FileState::Skipped => "SKIPPED",
            FileState::Validating => "VALIDATING",
            FileState::Failed => "FAILED",
            FileState::Merging => "MERGING",
            FileState::Applied => "APPLIED",
        };
        f.write_str(name)
    }
}

fn transition(file: &str, from: FileState, to: FileState) {
    debug!(file = %file, from = %from, to = %to, "File state");
}

/// Split a result into fatal errors (outer) and per-file errors (inner)
fn per_file<T>(result: Result<T>) -> Result<std::result::Result<T, IngestError>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => Ok(Err(e)),
    }
}

fn log_warnings(file: &str, result: &ValidationResult) {
    for warning in result.warnings() {
        warn!(file = %file, warning = %warning, "Quality gate warning");
    }
}

/// Dependent dump rows plus their owner index
struct LoadedDependents {
    items: Vec<OrderItemRecord>,
    index: OwnerIndex,
}

/// The dependent dump as tracked across one run
struct DependentInput {
    file: DiscoveredFile,
    fingerprint: Option<String>,
    /// Fingerprint came from the manifest and content has not been read yet
    hinted: bool,
    applied: bool,
    rows_in: u64,
    loaded: Option<LoadedDependents>,
    /// Per-file error that makes the dump unusable this run
    unusable: Option<IngestError>,
    inserted: u64,
}

impl DependentInput {
    fn new(file: DiscoveredFile) -> Self {
        Self {
            file,
            fingerprint: None,
            hinted: false,
            applied: false,
            rows_in: 0,
            loaded: None,
            unusable: None,
            inserted: 0,
        }
    }

    /// Read, fingerprint and, if new, gate the dump. Per-file problems mark
    /// the dump unusable instead of failing.
    fn load(
        &mut self,
        conn: &Connection,
        config: &IngestConfig,
        manifest: Option<&ManifestDocument>,
    ) -> Result<()> {
        if self.loaded.is_some() || self.unusable.is_some() {
            return Ok(());
        }
        let name = self.file.name.clone();

        let items = match per_file(records::read_order_items(&self.file.path))? {
            Ok(items) => items,
            Err(e) => {
                warn!(file = %name, error = %e, "Dependent dump is unusable");
                self.unusable = Some(e);
                return Ok(());
            },
        };

        let fp = fingerprint::fingerprint_dependent(&items, &config.fingerprint);
        warn_if_stale(manifest, &name, &fp);
        // a hint is only trusted while the content still matches it
        if !self.hinted || self.fingerprint.as_deref() != Some(fp.digest.as_str()) {
            self.applied = ProcessingLedger::new(conn).is_already_applied(&name, &fp.digest)?;
        }
        self.hinted = false;
        self.fingerprint = Some(fp.digest);
        self.rows_in = fp.rows as u64;

        if !self.applied {
            transition(&name, FileState::Discovered, FileState::Validating);
            let rules = GateRules::for_kind(FileKind::FactDependent, &config.catalog, &self.file.dataset);
            let result = quality::validate_dependent(&items, &rules);
            log_warnings(&name, &result);
            if !result.is_pass() {
                transition(&name, FileState::Validating, FileState::Failed);
                self.unusable = Some(IngestError::QualityGate {
                    file: name,
                    violations: result.violation_messages(),
                });
                return Ok(());
            }
        }

        let index = OwnerIndex::build(&items);
        debug!(file = %name, rows = items.len(), owners = index.owner_count(), "Dependent dump loaded");
        self.loaded = Some(LoadedDependents { items, index });
        Ok(())
    }

    fn usable(&self) -> Option<&LoadedDependents> {
        self.loaded.as_ref().filter(|_| self.unusable.is_none())
    }
}

/// Ledger note for a dependent dump that was absent while facts were inserted
const ABSENT_DEPENDENT_NOTE: &str = "missing input; dependents deferred";

/// A dependent dump known to the ledger but absent from the landing zone
struct AbsentDependent {
    name: String,
    fingerprint: String,
    /// The ledger still counts the dump as applied
    applied: bool,
    /// This run reopened the dump's ledger row
    reopened: bool,
}

impl AbsentDependent {
    fn report(&self) -> FileReport {
        FileReport {
            name: self.name.clone(),
            kind: FileKind::FactDependent,
            status: LedgerStatus::Fail,
            fingerprint: Some(self.fingerprint.clone()),
            rows_in: 0,
            rows_inserted: 0,
            note: ABSENT_DEPENDENT_NOTE.to_string(),
        }
    }
}

fn warn_if_stale(manifest: Option<&ManifestDocument>, name: &str, computed: &Fingerprint) {
    if let Some(entry) = manifest.and_then(|m| m.get(name)) {
        if entry.fingerprint != computed.digest {
            warn!(
                file = %name,
                manifest = %entry.fingerprint,
                computed = %computed.digest,
                "Manifest fingerprint is stale; using computed fingerprint"
            );
        }
    }
}

pub struct Engine {
    config: IngestConfig,
    cancel: CancellationFlag,
}

impl Engine {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run one ingestion pass against `store`
    pub fn run(&self, store: &mut Store) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_run", run_id = %run_id);
        let _enter = span.enter();

        self.config.validate()?;
        store.ensure_schema(&self.config.catalog)?;

        let mut summary = RunSummary::new(run_id);
        let manifest = self.load_manifest();
        let found = discovery::discover(&self.config.landing_dir, &self.config.catalog)?;

        info!(
            landing = %self.config.landing_dir.display(),
            dimensions = found.dimensions.len(),
            facts = found.facts.len(),
            dependent = found.dependent.is_some(),
            manifest = manifest.is_some(),
            "Starting incremental ingestion"
        );

        if let Some(manifest) = &manifest {
            for report in self.record_missing_inputs(store, manifest, &found)? {
                summary.push(report);
            }
        }

        if self.run_files(store, manifest.as_ref(), found, &mut summary)?.is_break() {
            summary.cancelled = true;
            warn!("Run cancelled at a file boundary");
        }

        summary.finish();
        info!(
            processed = summary.files_processed,
            skipped = summary.files_skipped,
            failed = summary.files_failed,
            rows_inserted = summary.rows_inserted,
            cancelled = summary.cancelled,
            "Incremental ingestion finished"
        );
        Ok(summary)
    }

    fn run_files(
        &self,
        store: &mut Store,
        manifest: Option<&ManifestDocument>,
        found: Discovery,
        summary: &mut RunSummary,
    ) -> Result<std::ops::ControlFlow<()>> {
        use std::ops::ControlFlow;

        for file in &found.dimensions {
            if self.cancel.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }
            summary.push(self.process_dimension(store, file, manifest)?);
        }

        let mut absent = match found.dependent {
            Some(_) => None,
            None => self.absent_dependent(store.connection())?,
        };
        let mut dependent = found.dependent.map(DependentInput::new);
        if let Some(dep) = dependent.as_mut() {
            if self.cancel.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }
            self.prepare_dependent(store, dep, manifest)?;
        }

        for file in &found.facts {
            if self.cancel.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }
            summary.push(self.process_fact(store, file, manifest, &mut dependent, &mut absent)?);
        }

        if let Some(absent) = absent.filter(|a| a.reopened) {
            warn!(
                file = %absent.name,
                "Dependent dump absent while facts were inserted; it will backfill when it returns"
            );
            summary.push(absent.report());
        }

        if let Some(dep) = dependent.as_mut() {
            if self.cancel.is_cancelled() {
                return Ok(ControlFlow::Break(()));
            }
            summary.push(self.finalize_dependent(store, dep, manifest)?);
        }

        Ok(ControlFlow::Continue(()))
    }

    /// Ledger state of a dependent dump that is not on disk this run
    fn absent_dependent(&self, conn: &Connection) -> Result<Option<AbsentDependent>> {
        let entry = ProcessingLedger::new(conn).get(&self.config.catalog.dependent_file())?;
        Ok(entry.map(|entry| AbsentDependent {
            applied: entry.status != LedgerStatus::Fail,
            name: entry.file_name,
            fingerprint: entry.fingerprint,
            reopened: false,
        }))
    }

    fn load_manifest(&self) -> Option<ManifestDocument> {
        let path = self.config.manifest_path();
        match ManifestDocument::load_optional(&path) {
            Ok(Some(document)) => {
                debug!(path = %path.display(), files = document.files.len(), "Loaded manifest");
                Some(document)
            },
            Ok(None) => {
                warn!(path = %path.display(), "No manifest found; relying on computed fingerprints");
                None
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable manifest");
                None
            },
        }
    }

    /// Manifest entry for `name` when its fingerprint is already applied
    fn applied_hint<'m>(
        &self,
        conn: &Connection,
        manifest: Option<&'m ManifestDocument>,
        name: &str,
    ) -> Result<Option<&'m ManifestEntry>> {
        if !self.config.use_manifest_hint {
            return Ok(None);
        }
        let Some(entry) = manifest.and_then(|m| m.get(name)) else {
            return Ok(None);
        };
        if ProcessingLedger::new(conn).is_already_applied(name, &entry.fingerprint)? {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    fn record_missing_inputs(
        &self,
        store: &Store,
        manifest: &ManifestDocument,
        found: &Discovery,
    ) -> Result<Vec<FileReport>> {
        let mut reports = Vec::new();
        for name in manifest.declared_files() {
            if found.contains(name) {
                continue;
            }
            let Some(kind) = parse_file_name(name)
                .and_then(|p| self.config.catalog.classify(&p.dataset, p.period.is_some()))
            else {
                debug!(file = %name, "Manifest entry outside the catalog");
                continue;
            };
            let fingerprint = manifest.get(name).map(|e| e.fingerprint.clone());
            let error = IngestError::MissingInput {
                file: name.to_string(),
                dir: self.config.landing_dir.display().to_string(),
            };
            reports.push(self.record_failure(
                store.connection(),
                name,
                kind,
                fingerprint.as_deref(),
                0,
                error,
            )?);
        }
        Ok(reports)
    }

    fn record_failure(
        &self,
        conn: &Connection,
        name: &str,
        kind: FileKind,
        fingerprint: Option<&str>,
        rows_in: u64,
        error: IngestError,
    ) -> Result<FileReport> {
        warn!(file = %name, kind = %kind, error = %error, "File failed");
        let note = error.ledger_note();
        ProcessingLedger::new(conn).record(
            &LedgerEntry::new(name, fingerprint.unwrap_or_default(), LedgerStatus::Fail)
                .with_rows(rows_in, 0)
                .with_note(&note),
        )?;
        Ok(FileReport {
            name: name.to_string(),
            kind,
            status: LedgerStatus::Fail,
            fingerprint: fingerprint.map(str::to_string),
            rows_in,
            rows_inserted: 0,
            note,
        })
    }

    fn record_skip(
        &self,
        conn: &Connection,
        file: &DiscoveredFile,
        fingerprint: &str,
        rows_in: u64,
        note: &str,
    ) -> Result<FileReport> {
        transition(&file.name, FileState::Discovered, FileState::Skipped);
        info!(file = %file.name, fingerprint = %fingerprint, "Skipping unchanged file");
        ProcessingLedger::new(conn).record(
            &LedgerEntry::new(&file.name, fingerprint, LedgerStatus::Skip)
                .with_rows(rows_in, 0)
                .with_note(note),
        )?;
        Ok(FileReport {
            name: file.name.clone(),
            kind: file.kind,
            status: LedgerStatus::Skip,
            fingerprint: Some(fingerprint.to_string()),
            rows_in,
            rows_inserted: 0,
            note: note.to_string(),
        })
    }

    fn process_dimension(
        &self,
        store: &mut Store,
        file: &DiscoveredFile,
        manifest: Option<&ManifestDocument>,
    ) -> Result<FileReport> {
        if let Some(entry) = self.applied_hint(store.connection(), manifest, &file.name)? {
            return self.record_skip(
                store.connection(),
                file,
                &entry.fingerprint,
                entry.rows.unwrap_or(0),
                "unchanged (manifest)",
            );
        }

        let snapshot = match per_file(records::read_dimension(&file.path))? {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return self.record_failure(store.connection(), &file.name, file.kind, None, 0, e)
            },
        };
        let rows_in = snapshot.len() as u64;

        let key = self
            .config
            .catalog
            .dimension(&file.dataset)
            .and_then(|d| d.key_column.as_deref());
        let fp = fingerprint::fingerprint_dimension(&snapshot, key, &self.config.fingerprint);
        warn_if_stale(manifest, &file.name, &fp);

        if store.ledger().is_already_applied(&file.name, &fp.digest)? {
            return self.record_skip(
                store.connection(),
                file,
                &fp.digest,
                rows_in,
                "unchanged (fingerprint)",
            );
        }

        transition(&file.name, FileState::Discovered, FileState::Validating);
        let rules = GateRules::for_kind(file.kind, &self.config.catalog, &file.dataset);
        let result = quality::validate(&snapshot, &rules);
        log_warnings(&file.name, &result);
        if !result.is_pass() {
            transition(&file.name, FileState::Validating, FileState::Failed);
            let error = IngestError::QualityGate {
                file: file.name.clone(),
                violations: result.violation_messages(),
            };
            return self.record_failure(
                store.connection(),
                &file.name,
                file.kind,
                Some(&fp.digest),
                rows_in,
                error,
            );
        }

        transition(&file.name, FileState::Validating, FileState::Merging);
        let note = format!("REPLACE -> {}", file.dataset);
        let tx = store.transaction()?;
        let inserted = store::replace_dimension(&tx, &file.dataset, &snapshot)?;
        ProcessingLedger::new(&tx).record(
            &LedgerEntry::new(&file.name, &fp.digest, LedgerStatus::Ok)
                .with_rows(rows_in, inserted)
                .with_note(&note),
        )?;
        tx.commit()?;
        transition(&file.name, FileState::Merging, FileState::Applied);

        info!(file = %file.name, rows_in, rows_inserted = inserted, table = %file.dataset, "Replaced dimension snapshot");
        Ok(FileReport {
            name: file.name.clone(),
            kind: file.kind,
            status: LedgerStatus::Ok,
            fingerprint: Some(fp.digest),
            rows_in,
            rows_inserted: inserted,
            note,
        })
    }

    /// Decide whether the dependent dump is new and, if so, gate it now so
    /// fact partitions know whether they can attach dependents.
    fn prepare_dependent(
        &self,
        store: &Store,
        dep: &mut DependentInput,
        manifest: Option<&ManifestDocument>,
    ) -> Result<()> {
        if let Some(entry) = self.applied_hint(store.connection(), manifest, &dep.file.name)? {
            debug!(file = %dep.file.name, "Dependent dump unchanged per manifest; loading on demand");
            dep.fingerprint = Some(entry.fingerprint.clone());
            dep.rows_in = entry.rows.unwrap_or(0);
            dep.hinted = true;
            dep.applied = true;
            return Ok(());
        }
        dep.load(store.connection(), &self.config, manifest)
    }

    fn process_fact(
        &self,
        store: &mut Store,
        file: &DiscoveredFile,
        manifest: Option<&ManifestDocument>,
        dependent: &mut Option<DependentInput>,
        absent: &mut Option<AbsentDependent>,
    ) -> Result<FileReport> {
        if let Some(entry) = self.applied_hint(store.connection(), manifest, &file.name)? {
            return self.record_skip(
                store.connection(),
                file,
                &entry.fingerprint,
                entry.rows.unwrap_or(0),
                "unchanged (manifest)",
            );
        }

        let orders = match per_file(records::read_orders(&file.path))? {
            Ok(orders) => orders,
            Err(e) => {
                return self.record_failure(store.connection(), &file.name, file.kind, None, 0, e)
            },
        };
        let rows_in = orders.len() as u64;

        let fp = fingerprint::fingerprint_fact(&orders);
        warn_if_stale(manifest, &file.name, &fp);

        if store.ledger().is_already_applied(&file.name, &fp.digest)? {
            return self.record_skip(
                store.connection(),
                file,
                &fp.digest,
                rows_in,
                "unchanged (fingerprint)",
            );
        }

        transition(&file.name, FileState::Discovered, FileState::Validating);
        let rules = GateRules::for_kind(file.kind, &self.config.catalog, &file.dataset);
        let result = quality::validate_fact(&orders, file.period, &rules);
        log_warnings(&file.name, &result);
        if !result.is_pass() {
            transition(&file.name, FileState::Validating, FileState::Failed);
            let error = IngestError::QualityGate {
                file: file.name.clone(),
                violations: result.violation_messages(),
            };
            return self.record_failure(
                store.connection(),
                &file.name,
                file.kind,
                Some(&fp.digest),
                rows_in,
                error,
            );
        }

        transition(&file.name, FileState::Validating, FileState::Merging);
        let catalog = &self.config.catalog;
        let tx = store.transaction()?;

        let fact_merge = merge::plan_fact_merge(&orders, &FactKeys::new(&tx, &catalog.fact))?;
        if !fact_merge.duplicate_keys.is_empty() {
            warn!(
                file = %file.name,
                duplicates = fact_merge.duplicate_keys.len(),
                first = %fact_merge.duplicate_keys[0],
                "Duplicate keys in partition; keeping first occurrence"
            );
        }
        let new_keys = fact_merge.new_keys();
        let orders_inserted =
            store::insert_orders(&tx, &catalog.fact, &fact_merge.new_records, &file.name)?;

        let mut items_inserted = 0;
        let mut deferred = false;
        if !new_keys.is_empty() {
            if let Some(dep) = dependent.as_mut() {
                dep.load(&tx, &self.config, manifest)?;
                match dep.usable() {
                    Some(loaded) => {
                        items_inserted = self.attach_dependents(&tx, loaded, &new_keys, &dep.file.name)?;
                    },
                    None => deferred = true,
                }
                dep.inserted += items_inserted;
            } else if let Some(absent) = absent.as_mut() {
                deferred = true;
                if absent.applied {
                    // the dump's next appearance must not count as applied so it backfills these facts
                    ProcessingLedger::new(&tx).record(
                        &LedgerEntry::new(&absent.name, &absent.fingerprint, LedgerStatus::Fail)
                            .with_note(ABSENT_DEPENDENT_NOTE),
                    )?;
                    absent.applied = false;
                    absent.reopened = true;
                }
            }
        }

        let mut note = format!(
            "{}_inserted={}; {}_inserted={}",
            catalog.fact, orders_inserted, catalog.dependent, items_inserted
        );
        if deferred {
            note.push_str("; dependents deferred");
        }
        ProcessingLedger::new(&tx).record(
            &LedgerEntry::new(&file.name, &fp.digest, LedgerStatus::Ok)
                .with_rows(rows_in, orders_inserted)
                .with_note(&note),
        )?;
        tx.commit()?;
        transition(&file.name, FileState::Merging, FileState::Applied);

        info!(
            file = %file.name,
            fingerprint = %fp.digest,
            rows_in,
            rows_inserted = orders_inserted,
            overlapping = fact_merge.overlapping,
            dependents_inserted = items_inserted,
            "Merged fact partition"
        );

        Ok(FileReport {
            name: file.name.clone(),
            kind: file.kind,
            status: LedgerStatus::Ok,
            fingerprint: Some(fp.digest),
            rows_in,
            rows_inserted: orders_inserted,
            note,
        })
    }

    /// Insert dependents owned by this partition's new facts
    fn attach_dependents(
        &self,
        conn: &Connection,
        loaded: &LoadedDependents,
        new_keys: &HashSet<String>,
        source_file: &str,
    ) -> Result<u64> {
        let table = &self.config.catalog.dependent;
        let candidates = loaded
            .index
            .candidates(&loaded.items, new_keys.iter().map(String::as_str));
        let plan = merge::plan_dependent_merge(candidates, new_keys, &DependentKeys::new(conn, table))?;
        if plan.duplicate_keys > 0 {
            warn!(
                file = %source_file,
                duplicates = plan.duplicate_keys,
                "Duplicate dependent keys; keeping first occurrence"
            );
        }
        store::insert_items(conn, table, &plan.new_records, source_file)
    }

    fn finalize_dependent(
        &self,
        store: &mut Store,
        dep: &mut DependentInput,
        manifest: Option<&ManifestDocument>,
    ) -> Result<FileReport> {
        let name = dep.file.name.clone();
        if !dep.applied {
            dep.load(store.connection(), &self.config, manifest)?;
        }
        if let Some(error) = dep.unusable.take() {
            return self.record_failure(
                store.connection(),
                &name,
                dep.file.kind,
                dep.fingerprint.as_deref(),
                dep.rows_in,
                error,
            );
        }

        let fingerprint = dep.fingerprint.clone().unwrap_or_default();

        if dep.applied && dep.inserted == 0 {
            let file = dep.file.clone();
            return self.record_skip(
                store.connection(),
                &file,
                &fingerprint,
                dep.rows_in,
                "unchanged (fingerprint)",
            );
        }

        let tx = store.transaction()?;
        let mut backfilled = 0;
        if !dep.applied {
            if let Some(loaded) = dep.usable() {
                let table = &self.config.catalog.dependent;
                let plan = merge::plan_dependent_merge(
                    &loaded.items,
                    &FactKeys::new(&tx, &self.config.catalog.fact),
                    &DependentKeys::new(&tx, table),
                )?;
                backfilled = store::insert_items(&tx, table, &plan.new_records, &name)?;
                if backfilled > 0 {
                    info!(file = %name, backfilled, "Backfilled dependents of stored facts");
                }
            }
        }
        dep.inserted += backfilled;

        let note = format!(
            "inserted for new {} only; backfilled={}",
            self.config.catalog.fact, backfilled
        );
        ProcessingLedger::new(&tx).record(
            &LedgerEntry::new(&name, &fingerprint, LedgerStatus::Ok)
                .with_rows(dep.rows_in, dep.inserted)
                .with_note(&note),
        )?;
        tx.commit()?;
        transition(&name, FileState::Merging, FileState::Applied);

        info!(file = %name, rows_in = dep.rows_in, rows_inserted = dep.inserted, "Recorded dependent dump");
        Ok(FileReport {
            name,
            kind: dep.file.kind,
            status: LedgerStatus::Ok,
            fingerprint: Some(fingerprint),
            rows_in: dep.rows_in,
            rows_inserted: dep.inserted,
            note,
        })
    }
}

/// Run one incremental ingestion pass with `config` against `store`
pub fn run_incremental_ingestion(store: &mut Store, config: &IngestConfig) -> Result<RunSummary> {
    Engine::new(config.clone()).run(store)
}
