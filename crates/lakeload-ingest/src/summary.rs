//! Run summary

use crate::catalog::FileKind;
use crate::ledger::LedgerStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of one logical file in a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub name: String,
    pub kind: FileKind,
    pub status: LedgerStatus,
    pub fingerprint: Option<String>,
    pub rows_in: u64,
    pub rows_inserted: u64,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub rows_inserted: u64,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            files_processed: 0,
            files_skipped: 0,
            files_failed: 0,
            rows_inserted: 0,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
        }
    }

    /// Count a file outcome
    pub fn push(&mut self, report: FileReport) {
        self.files_processed += 1;
        match report.status {
            LedgerStatus::Skip => self.files_skipped += 1,
            LedgerStatus::Fail => self.files_failed += 1,
            LedgerStatus::Ok => {},
        }
        self.rows_inserted += report.rows_inserted;
        self.files.push(report);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Failed files with their reasons
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| f.status == LedgerStatus::Fail)
    }

    /// True when the run changed nothing
    pub fn is_noop(&self) -> bool {
        self.files_skipped == self.files_processed && self.rows_inserted == 0
    }

    pub fn report(&self, name: &str) -> Option<&FileReport> {
        self.files.iter().find(|f| f.name == name)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(
            f,
            "  processed={} skipped={} failed={} rows_inserted={}{}",
            self.files_processed,
            self.files_skipped,
            self.files_failed,
            self.rows_inserted,
            if self.cancelled { " (cancelled)" } else { "" }
        )?;
        for file in &self.files {
            writeln!(
                f,
                "  {:<5} {:<28} in={:<8} inserted={:<8} {}",
                file.status, file.name, file.rows_in, file.rows_inserted, file.note
            )?;
        }
        Ok(())
    }
}
