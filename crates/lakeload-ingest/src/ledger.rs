//! Processing ledger
//!
//! One row per logical file name recording the last attempt: fingerprint,
//! outcome, row counts and a note. The ledger lives in the analytical store
//! and every write goes through the caller's connection, so a ledger entry
//! commits or rolls back together with the data it describes.

use crate::error::{IngestError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::str::FromStr;

/// Table holding the ledger
pub const LEDGER_TABLE: &str = "ingest_ledger";

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ingest_ledger (
    file_name TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('OK', 'SKIP', 'FAIL')),
    rows_in INTEGER NOT NULL DEFAULT 0,
    rows_inserted INTEGER NOT NULL DEFAULT 0,
    processed_at TEXT NOT NULL,
    note TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_ingest_ledger_status ON ingest_ledger(status);
"#;

/// Outcome of the last attempt on a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerStatus {
    Ok,
    Skip,
    Fail,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Ok => "OK",
            LedgerStatus::Skip => "SKIP",
            LedgerStatus::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OK" => Ok(LedgerStatus::Ok),
            "SKIP" => Ok(LedgerStatus::Skip),
            "FAIL" => Ok(LedgerStatus::Fail),
            other => Err(IngestError::config(format!("unknown ledger status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub file_name: String,
    pub fingerprint: String,
    pub status: LedgerStatus,
    pub rows_in: u64,
    pub rows_inserted: u64,
    pub processed_at: DateTime<Utc>,
    pub note: String,
}

impl LedgerEntry {
    /// Entry stamped with the current time
    pub fn new(
        file_name: impl Into<String>,
        fingerprint: impl Into<String>,
        status: LedgerStatus,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            fingerprint: fingerprint.into(),
            status,
            rows_in: 0,
            rows_inserted: 0,
            processed_at: Utc::now(),
            note: String::new(),
        }
    }

    pub fn with_rows(mut self, rows_in: u64, rows_inserted: u64) -> Self {
        self.rows_in = rows_in;
        self.rows_inserted = rows_inserted;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let status: String = row.get(2)?;
        let status = LedgerStatus::from_str(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let processed_at: String = row.get(5)?;
        let processed_at = DateTime::parse_from_rfc3339(&processed_at)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            file_name: row.get(0)?,
            fingerprint: row.get(1)?,
            status,
            rows_in: row.get::<_, i64>(3)?.max(0) as u64,
            rows_inserted: row.get::<_, i64>(4)?.max(0) as u64,
            processed_at,
            note: row.get(6)?,
        })
    }
}

/// Ledger view over a store connection or open transaction
pub struct ProcessingLedger<'c> {
    conn: &'c Connection,
}

impl<'c> ProcessingLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Create the ledger table if it does not exist
    pub fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Whether `file_name` was already applied with exactly this fingerprint.
    ///
    /// A FAIL entry never counts, so a fixed or unchanged file is retried.
    pub fn is_already_applied(&self, file_name: &str, fingerprint: &str) -> Result<bool> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM ingest_ledger WHERE file_name = ?1 AND fingerprint = ?2",
                params![file_name, fingerprint],
                |row| row.get(0),
            )
            .optional()?;

        Ok(matches!(status.as_deref(), Some("OK") | Some("SKIP")))
    }

    /// Upsert the entry for its file name. The last attempt wins.
    pub fn record(&self, entry: &LedgerEntry) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO ingest_ledger (
                file_name, fingerprint, status, rows_in, rows_inserted, processed_at, note
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(file_name) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                status = excluded.status,
                rows_in = excluded.rows_in,
                rows_inserted = excluded.rows_inserted,
                processed_at = excluded.processed_at,
                note = excluded.note
            "#,
            params![
                entry.file_name,
                entry.fingerprint,
                entry.status.as_str(),
                entry.rows_in as i64,
                entry.rows_inserted as i64,
                entry.processed_at.to_rfc3339(),
                entry.note,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, file_name: &str) -> Result<Option<LedgerEntry>> {
        let entry = self
            .conn
            .query_row(
                r#"
                SELECT file_name, fingerprint, status, rows_in, rows_inserted, processed_at, note
                FROM ingest_ledger WHERE file_name = ?1
                "#,
                params![file_name],
                LedgerEntry::from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// All entries, ordered by file name
    pub fn list(&self) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT file_name, fingerprint, status, rows_in, rows_inserted, processed_at, note
            FROM ingest_ledger ORDER BY file_name ASC
            "#,
        )?;
        let entries = stmt
            .query_map([], LedgerEntry::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ledger_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ProcessingLedger::init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn test_ok_and_skip_count_as_applied() {
        let conn = ledger_conn();
        let ledger = ProcessingLedger::new(&conn);

        ledger
            .record(&LedgerEntry::new("orders_2018-09.csv", "fp1", LedgerStatus::Ok).with_rows(10, 10))
            .unwrap();
        ledger
            .record(&LedgerEntry::new("products.csv", "fp2", LedgerStatus::Skip))
            .unwrap();

        assert!(ledger.is_already_applied("orders_2018-09.csv", "fp1").unwrap());
        assert!(ledger.is_already_applied("products.csv", "fp2").unwrap());
        assert!(!ledger.is_already_applied("orders_2018-09.csv", "fp-other").unwrap());
        assert!(!ledger.is_already_applied("unknown.csv", "fp1").unwrap());
    }

    #[test]
    fn test_fail_does_not_block_retry() {
        let conn = ledger_conn();
        let ledger = ProcessingLedger::new(&conn);

        ledger
            .record(
                &LedgerEntry::new("orders_2018-10.csv", "fp", LedgerStatus::Fail)
                    .with_note("DQC FAIL: partition is empty"),
            )
            .unwrap();
        assert!(!ledger.is_already_applied("orders_2018-10.csv", "fp").unwrap());
    }

    #[test]
    fn test_record_upserts_last_attempt() {
        let conn = ledger_conn();
        let ledger = ProcessingLedger::new(&conn);

        ledger
            .record(&LedgerEntry::new("orders_2018-10.csv", "fp", LedgerStatus::Fail))
            .unwrap();
        ledger
            .record(
                &LedgerEntry::new("orders_2018-10.csv", "fp", LedgerStatus::Ok)
                    .with_rows(40, 40)
                    .with_note("orders_inserted=40"),
            )
            .unwrap();

        let entries = ledger.list().unwrap();
        assert_eq!(entries.len(), 1);
        let entry = ledger.get("orders_2018-10.csv").unwrap().unwrap();
        assert_eq!(entry.status, LedgerStatus::Ok);
        assert_eq!(entry.rows_inserted, 40);
        assert_eq!(entry.note, "orders_inserted=40");
    }

    #[test]
    fn test_record_rolls_back_with_transaction() {
        let mut conn = ledger_conn();
        {
            let tx = conn.transaction().unwrap();
            ProcessingLedger::new(&tx)
                .record(&LedgerEntry::new("orders_2018-09.csv", "fp", LedgerStatus::Ok))
                .unwrap();
            // dropped without commit
        }
        assert!(ProcessingLedger::new(&conn).get("orders_2018-09.csv").unwrap().is_none());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [LedgerStatus::Ok, LedgerStatus::Skip, LedgerStatus::Fail] {
            assert_eq!(LedgerStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(LedgerStatus::from_str("DONE").is_err());
    }
}
