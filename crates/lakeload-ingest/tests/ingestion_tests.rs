//! Incremental ingestion integration tests
//!
//! Drive `run_incremental_ingestion` against temp landing directories and an
//! on-disk SQLite store, checking:
//! 1. Re-running on unchanged input is a no-op
//! 2. Overlapping partitions insert only new keys
//! 3. Failed partitions are retried
//! 4. Dimension snapshots are replaced wholesale
//! 5. Dependents are only stored with their owners
//! 6. Manifest hints, stale manifests and missing inputs

mod common;

use common::*;
use lakeload_ingest::manifest::{refresh_manifest, ManifestDocument, ManifestStore};
use lakeload_ingest::{
    run_incremental_ingestion, CancellationFlag, Engine, LedgerStatus, ProcessingLedger,
};

#[test]
fn test_monthly_partition_applied_once() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..1150, "2018-09"));

    let first = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    let report = first.report("orders_2018-09.csv").unwrap();
    assert_eq!(report.status, LedgerStatus::Ok);
    assert_eq!(report.rows_in, 1150);
    assert_eq!(report.rows_inserted, 1150);
    assert_eq!(count(&store, "orders"), 1150);

    let second = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    let report = second.report("orders_2018-09.csv").unwrap();
    assert_eq!(report.status, LedgerStatus::Skip);
    assert_eq!(report.rows_inserted, 0);
    assert_eq!(count(&store, "orders"), 1150);

    let entry = store.ledger().get("orders_2018-09.csv").unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Skip);
    assert_eq!(entry.rows_inserted, 0);
}

#[test]
fn test_rerun_on_unchanged_input_is_noop() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("customers.csv", &customers_csv(200));
    landing.write("orders_2018-09.csv", &orders_csv(0..50, "2018-09"));
    landing.write("orders_2018-10.csv", &orders_csv(50..80, "2018-10"));
    landing.write("order_items.csv", &items_csv(0..80, 2, 19.9));

    let first = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(first.files_failed, 0);
    assert_eq!(first.files_processed, 4);
    assert_eq!(count(&store, "order_items"), 160);

    let second = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(second.files_processed, 4);
    assert_eq!(second.files_skipped, second.files_processed);
    assert_eq!(second.rows_inserted, 0);
    assert!(second.is_noop());
    assert_eq!(count(&store, "orders"), 80);
    assert_eq!(count(&store, "order_items"), 160);
}

#[test]
fn test_partial_overlap_inserts_only_new_keys() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..100, "2018-09"));
    run_incremental_ingestion(&mut store, &landing.config).unwrap();

    // 60 keys already stored, 40 new
    landing.write("orders_2018-10.csv", &orders_csv(40..140, "2018-10"));
    let summary = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    let report = summary.report("orders_2018-10.csv").unwrap();
    assert_eq!(report.rows_in, 100);
    assert_eq!(report.rows_inserted, 40);
    assert_eq!(count(&store, "orders"), 140);

    let rerun = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(rerun.rows_inserted, 0);
    assert_eq!(count(&store, "orders"), 140);
}

#[test]
fn test_reexported_partition_in_new_order_is_skipped() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..30, "2018-09"));
    run_incremental_ingestion(&mut store, &landing.config).unwrap();

    landing.write("orders_2018-09.csv", &orders_csv((0..30).rev(), "2018-09"));
    let summary = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(
        summary.report("orders_2018-09.csv").unwrap().status,
        LedgerStatus::Skip
    );
}

#[test]
fn test_fully_overlapping_partition_is_ok_not_skip() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..30, "2018-09"));
    run_incremental_ingestion(&mut store, &landing.config).unwrap();

    // new content, every key already stored
    landing.write("orders_2018-09.csv", &orders_csv(0..20, "2018-09"));
    let summary = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    let report = summary.report("orders_2018-09.csv").unwrap();
    assert_eq!(report.status, LedgerStatus::Ok);
    assert_eq!(report.rows_in, 20);
    assert_eq!(report.rows_inserted, 0);
    assert!(!summary.is_noop());

    let entry = store.ledger().get("orders_2018-09.csv").unwrap().unwrap();
    assert_eq!(entry.status, LedgerStatus::Ok);
    assert_eq!(entry.rows_inserted, 0);
    assert_eq!(count(&store, "orders"), 30);

    let rerun = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(
        rerun.report("orders_2018-09.csv").unwrap().status,
        LedgerStatus::Skip
    );
}

#[test]
fn test_failed_partition_is_retried() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..10, "2018-09"));
    landing.write(
        "orders_2018-10.csv",
        &format!("{ORDERS_HEADER},cust1,delivered,2018-10-01 10:00:00,\n"),
    );

    let first = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(first.files_failed, 1);
    assert_eq!(count(&store, "orders"), 10);
    let failed = first.failures().next().unwrap();
    assert_eq!(failed.name, "orders_2018-10.csv");
    assert!(failed.note.contains("null primary key order_id"));

    // unchanged content is attempted again, not skipped
    let second = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(
        second.report("orders_2018-10.csv").unwrap().status,
        LedgerStatus::Fail
    );

    landing.write("orders_2018-10.csv", &orders_csv(10..25, "2018-10"));
    let third = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    let report = third.report("orders_2018-10.csv").unwrap();
    assert_eq!(report.status, LedgerStatus::Ok);
    assert_eq!(report.rows_inserted, 15);
    assert_eq!(count(&store, "orders"), 25);
}

#[test]
fn test_store_rollback_leaves_no_partial_partition() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..5, "2018-09"));
    run_incremental_ingestion(&mut store, &landing.config).unwrap();

    // a trigger makes the next fact insert fail mid-partition
    store
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_ord000007 BEFORE INSERT ON orders \
             WHEN NEW.order_id = 'ord000007' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();
    landing.write("orders_2018-10.csv", &orders_csv(5..10, "2018-10"));

    let result = run_incremental_ingestion(&mut store, &landing.config);
    assert!(result.is_err());
    assert!(result.unwrap_err().is_fatal());
    assert_eq!(count(&store, "orders"), 5);
    assert!(store.ledger().get("orders_2018-10.csv").unwrap().is_none());
}

#[test]
fn test_dimension_snapshot_replaced_when_changed() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("customers.csv", &customers_csv(1000));

    let first = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(first.report("customers.csv").unwrap().rows_inserted, 1000);
    assert_eq!(count(&store, "customers"), 1000);

    landing.write("customers.csv", &customers_csv(1050));
    let second = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    let report = second.report("customers.csv").unwrap();
    assert_eq!(report.status, LedgerStatus::Ok);
    assert_eq!(report.note, "REPLACE -> customers");
    assert_eq!(count(&store, "customers"), 1050);

    let third = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(
        third.report("customers.csv").unwrap().status,
        LedgerStatus::Skip
    );
    assert_eq!(count(&store, "customers"), 1050);
}

#[test]
fn test_dependents_restricted_to_new_owners() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..20, "2018-09"));
    // items also reference orders that have not landed yet
    landing.write("order_items.csv", &items_csv(0..40, 3, 10.0));

    let first = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(count(&store, "order_items"), 60);
    assert_eq!(orphan_dependents(&store), 0);
    let fact = first.report("orders_2018-09.csv").unwrap();
    assert!(fact.note.contains("order_items_inserted=60"));

    // the dump is unchanged, the next month brings the owners
    landing.write("orders_2018-10.csv", &orders_csv(20..40, "2018-10"));
    let second = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(count(&store, "order_items"), 120);
    assert_eq!(orphan_dependents(&store), 0);
    let dump = second.report("order_items.csv").unwrap();
    assert_eq!(dump.status, LedgerStatus::Ok);
    assert_eq!(dump.rows_inserted, 60);

    let third = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert!(third.is_noop());
}

#[test]
fn test_gated_dependent_dump_is_backfilled_after_fix() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..10, "2018-09"));
    landing.write("order_items.csv", &items_csv(0..10, 2, -1.0));

    let first = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(count(&store, "orders"), 10);
    assert_eq!(count(&store, "order_items"), 0);
    let dump = first.report("order_items.csv").unwrap();
    assert_eq!(dump.status, LedgerStatus::Fail);
    assert!(dump.note.contains("negative price"));
    assert!(first
        .report("orders_2018-09.csv")
        .unwrap()
        .note
        .contains("dependents deferred"));

    landing.write("order_items.csv", &items_csv(0..10, 2, 12.5));
    let second = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(
        second.report("orders_2018-09.csv").unwrap().status,
        LedgerStatus::Skip
    );
    let dump = second.report("order_items.csv").unwrap();
    assert_eq!(dump.status, LedgerStatus::Ok);
    assert_eq!(dump.rows_inserted, 20);
    assert!(dump.note.contains("backfilled=20"));
    assert_eq!(count(&store, "order_items"), 20);
    assert_eq!(orphan_dependents(&store), 0);
}

#[test]
fn test_dependents_backfilled_when_dump_returns_after_absence() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    let dump = items_csv(0..20, 1, 15.0);
    landing.write("orders_2018-09.csv", &orders_csv(0..10, "2018-09"));
    landing.write("order_items.csv", &dump);
    run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(count(&store, "order_items"), 10);

    // dump missing while new facts land
    landing.remove("order_items.csv");
    landing.write("orders_2018-10.csv", &orders_csv(10..20, "2018-10"));
    let second = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(count(&store, "orders"), 20);
    assert_eq!(count(&store, "order_items"), 10);
    assert!(second
        .report("orders_2018-10.csv")
        .unwrap()
        .note
        .contains("dependents deferred"));
    let absent = second.report("order_items.csv").unwrap();
    assert_eq!(absent.status, LedgerStatus::Fail);
    assert_eq!(second.files_failed, 1);

    // the same bytes come back
    landing.write("order_items.csv", &dump);
    let third = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    let report = third.report("order_items.csv").unwrap();
    assert_eq!(report.status, LedgerStatus::Ok);
    assert_eq!(report.rows_inserted, 10);
    assert!(report.note.contains("backfilled=10"));
    assert_eq!(count(&store, "order_items"), 20);
    assert_eq!(orphan_dependents(&store), 0);

    let fourth = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert!(fourth.is_noop());
}

#[test]
fn test_absent_dump_without_new_facts_is_not_reported() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..5, "2018-09"));
    landing.write("order_items.csv", &items_csv(0..5, 1, 15.0));
    run_incremental_ingestion(&mut store, &landing.config).unwrap();

    landing.remove("order_items.csv");
    let summary = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert!(summary.report("order_items.csv").is_none());
    assert_eq!(summary.files_failed, 0);
    assert_eq!(
        store.ledger().get("order_items.csv").unwrap().unwrap().status,
        LedgerStatus::Ok
    );
}

#[test]
fn test_manifest_hint_skips_without_reading() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("products.csv", "product_id,product_category_name\np1,toys\np2,books\n");
    landing.write("orders_2018-09.csv", &orders_csv(0..10, "2018-09"));
    let config = &landing.config;
    refresh_manifest(
        &config.landing_dir,
        &config.manifest_path(),
        &config.catalog,
        &config.fingerprint,
    )
    .unwrap();

    let first = run_incremental_ingestion(&mut store, config).unwrap();
    assert_eq!(first.files_failed, 0);

    // content now unreadable, but the hint is already applied
    landing.write("orders_2018-09.csv", "not,a,valid\n\"unterminated");
    let second = run_incremental_ingestion(&mut store, config).unwrap();
    let report = second.report("orders_2018-09.csv").unwrap();
    assert_eq!(report.status, LedgerStatus::Skip);
    assert_eq!(report.note, "unchanged (manifest)");
    assert_eq!(report.rows_in, 10);
}

#[test]
fn test_stale_manifest_uses_computed_fingerprint() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    let config = &landing.config;
    landing.write("orders_2018-09.csv", &orders_csv(0..10, "2018-09"));
    refresh_manifest(
        &config.landing_dir,
        &config.manifest_path(),
        &config.catalog,
        &config.fingerprint,
    )
    .unwrap();
    run_incremental_ingestion(&mut store, config).unwrap();

    // rewritten after the manifest, manifest not refreshed
    landing.write("orders_2018-09.csv", &orders_csv(0..15, "2018-09"));
    let mut manifest = ManifestDocument::load_optional(&config.manifest_path())
        .unwrap()
        .unwrap();
    let mut entry = manifest.get("orders_2018-09.csv").unwrap().clone();
    entry.fingerprint = "0000".to_string();
    manifest.put("orders_2018-09.csv".to_string(), entry);
    manifest.save(&config.manifest_path()).unwrap();

    let summary = run_incremental_ingestion(&mut store, config).unwrap();
    let report = summary.report("orders_2018-09.csv").unwrap();
    assert_eq!(report.status, LedgerStatus::Ok);
    assert_eq!(report.rows_inserted, 5);
    assert_ne!(report.fingerprint.as_deref(), Some("0000"));
}

#[test]
fn test_missing_input_fails_only_that_file() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    let config = &landing.config;
    landing.write("orders_2018-09.csv", &orders_csv(0..10, "2018-09"));
    landing.write("orders_2018-10.csv", &orders_csv(10..20, "2018-10"));
    refresh_manifest(
        &config.landing_dir,
        &config.manifest_path(),
        &config.catalog,
        &config.fingerprint,
    )
    .unwrap();
    landing.remove("orders_2018-10.csv");

    let summary = run_incremental_ingestion(&mut store, config).unwrap();
    assert_eq!(summary.files_failed, 1);
    let missing = summary.report("orders_2018-10.csv").unwrap();
    assert_eq!(missing.status, LedgerStatus::Fail);
    assert_eq!(missing.note, "missing input");
    assert_eq!(count(&store, "orders"), 10);
}

#[test]
fn test_missing_or_invalid_manifest_is_not_fatal() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..3, "2018-09"));
    landing.write("_manifest.json", "{ this is not json");

    let summary = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    assert_eq!(summary.files_failed, 0);
    assert_eq!(count(&store, "orders"), 3);
}

#[test]
fn test_partitions_applied_in_period_order() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-10.csv", &orders_csv(0..5, "2018-10"));
    landing.write("orders_2017-12.csv", &orders_csv(0..5, "2017-12"));

    let summary = run_incremental_ingestion(&mut store, &landing.config).unwrap();
    let names: Vec<_> = summary.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["orders_2017-12.csv", "orders_2018-10.csv"]);
    // the older partition owns the shared keys
    assert_eq!(summary.report("orders_2017-12.csv").unwrap().rows_inserted, 5);
    assert_eq!(summary.report("orders_2018-10.csv").unwrap().rows_inserted, 0);
    assert_eq!(
        summary.report("orders_2018-10.csv").unwrap().status,
        LedgerStatus::Ok
    );
}

#[test]
fn test_cancelled_run_stops_at_file_boundary() {
    init_tracing();
    let landing = Landing::new();
    let mut store = landing.open_store();
    landing.write("orders_2018-09.csv", &orders_csv(0..5, "2018-09"));

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let summary = Engine::new(landing.config.clone())
        .with_cancellation(cancel)
        .run(&mut store)
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.files_processed, 0);
    assert!(ProcessingLedger::new(store.connection()).list().unwrap().is_empty());
    assert_eq!(count(&store, "orders"), 0);
}
