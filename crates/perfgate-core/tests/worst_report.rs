// crates/perfgate-core/tests/worst_report.rs
// ============================================================================
// Module: Worst Report Tests
// Description: Worst-case retention, context copies and deterministic rendering.
// Purpose: Ensure the run summary is stable for identical inputs.
// ============================================================================

//! Worst report tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;

use perfgate_core::Collector;
use perfgate_core::CollectorKind;
use perfgate_core::Context;
use perfgate_core::Hub;
use perfgate_core::InMemoryQueryLog;
use perfgate_core::InstanceId;
use perfgate_core::Measure;
use perfgate_core::Observation;
use perfgate_core::PerfError;
use perfgate_core::ResultValue;
use perfgate_core::Sender;
use perfgate_core::WorstReport;
use perfgate_core::WorstTable;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn observation(
    identity: Option<&str>,
    kind: CollectorKind,
    results: &[(&str, u64)],
    context: Context,
) -> Observation {
    Observation::new(
        Sender::new(identity, kind, InstanceId::new(7)),
        results
            .iter()
            .map(|(name, value)| ResultValue::new(*name, Measure::Count(*value)))
            .collect(),
        context,
    )
}

fn queries(identity: Option<&str>, results: &[(&str, u64)], context: Context) -> Observation {
    observation(identity, CollectorKind::Queries, results, context)
}

fn test_context(name: &str) -> Context {
    Context::new().with("test name", [name])
}

// ============================================================================
// SECTION: Worst Table
// ============================================================================

/// Verifies only the maximum survives and ties keep the earlier entry.
#[test]
fn keeps_strict_maximum_per_cell() {
    let mut table = WorstTable::new();
    table.observe(&queries(Some("x"), &[("total", 4)], test_context("first"))).unwrap();
    table.observe(&queries(Some("x"), &[("total", 2)], test_context("second"))).unwrap();
    table.observe(&queries(Some("x"), &[("total", 4)], test_context("third"))).unwrap();

    let entry = table.get(Some("x"), "QueryCollector", "total").unwrap();
    assert!(entry.value == 4_u64);
    assert_eq!(entry.context, test_context("first"));

    table.observe(&queries(Some("x"), &[("total", 7)], test_context("fourth"))).unwrap();
    let entry = table.get(Some("x"), "QueryCollector", "total").unwrap();
    assert!(entry.value == 7_u64);
    assert_eq!(entry.context, test_context("fourth"));
}

/// Verifies feeding the same observation twice leaves the table unchanged.
#[test]
fn observing_twice_is_idempotent() {
    let mut table = WorstTable::new();
    let fed = queries(Some("x"), &[("read", 3), ("total", 5)], test_context("a"));
    table.observe(&fed).unwrap();
    let once = table.clone();
    table.observe(&fed).unwrap();
    assert_eq!(table, once);
}

/// Verifies duplicate result names in one batch fail without partial updates.
#[test]
fn duplicate_names_in_batch_fail() {
    let mut table = WorstTable::new();
    let err = table
        .observe(&queries(Some("x"), &[("total", 1), ("total", 2)], Context::new()))
        .unwrap_err();
    assert_eq!(
        err,
        PerfError::DuplicateResultNames {
            names: vec!["total".to_string()]
        }
    );
    assert!(table.is_empty());
}

/// Verifies rendering is empty for an empty table and sorted at every level.
#[test]
fn renders_sorted_hierarchy() {
    let mut table = WorstTable::new();
    assert_eq!(table.rendered(), "");

    let timed =
        observation(Some("test method"), CollectorKind::Time, &[("total", 2)], Context::new());
    table.observe(&timed).unwrap();
    let per_bucket = queries(Some("test method"), &[("write", 1), ("read", 3)], test_context("t1"));
    table.observe(&per_bucket).unwrap();
    table.observe(&queries(Some("Client.request"), &[("total", 9)], Context::new())).unwrap();
    table.observe(&queries(None, &[("total", 1)], Context::new())).unwrap();

    let expected = [
        "Worst Performing Items",
        "(anonymous):",
        "  QueryCollector:",
        "    total: 1",
        "Client.request:",
        "  QueryCollector:",
        "    total: 9",
        "test method:",
        "  QueryCollector:",
        r#"    read: 3 {"test name":["t1"]}"#,
        r#"    write: 1 {"test name":["t1"]}"#,
        "  TimeCollector:",
        "    total: 2",
        "",
    ]
    .join("\n");
    assert_eq!(table.rendered(), expected);
}

// ============================================================================
// SECTION: Worst Report
// ============================================================================

/// Verifies the report listens to live and replayed observations.
#[test]
fn report_listens_to_both_channels() {
    let hub = Hub::new();
    let report = WorstReport::new(&hub);
    assert!(report.is_empty());

    let log = Arc::new(InMemoryQueryLog::new());
    let guard = hub.scoped_context("test name", "test_live");
    let active =
        Collector::queries(&hub, log.clone(), Some("test method")).unwrap().start().unwrap();
    log.execute("SELECT 1");
    active.finish().unwrap();
    guard.exit().unwrap();

    let replayed = queries(Some("test method"), &[("total", 5)], test_context("test_old"));
    hub.results_read().dispatch(&replayed).unwrap();

    let total = report.get(Some("test method"), "QueryCollector", "total").unwrap();
    assert!(total.value == 5_u64);
    let read = report.get(Some("test method"), "QueryCollector", "read").unwrap();
    assert!(read.value == 1_u64);
    assert_eq!(read.context, test_context("test_live"));
    assert!(report.rendered().starts_with("Worst Performing Items\n"));
}

/// Verifies dropping the report disconnects it.
#[test]
fn dropped_report_stops_listening() {
    let hub = Hub::new();
    let report = WorstReport::new(&hub);
    assert_eq!(hub.results_collected().receiver_count(), 1);
    assert_eq!(hub.results_read().receiver_count(), 1);
    drop(report);
    assert_eq!(hub.results_collected().receiver_count(), 0);
    assert_eq!(hub.results_read().receiver_count(), 0);
}
