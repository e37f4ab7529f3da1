// crates/perfgate-store/tests/datafile.rs
// ============================================================================
// Module: Datafile Tests
// Description: Writer windows, round trips, empty files and replay.
// Purpose: Ensure a recorded run reads back exactly as it was broadcast.
// ============================================================================

//! Datafile writer and reader tests.

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

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use perfgate_core::Collector;
use perfgate_core::CollectorKind;
use perfgate_core::Context;
use perfgate_core::Hub;
use perfgate_core::InMemoryQueryLog;
use perfgate_core::InstanceId;
use perfgate_core::Instruments;
use perfgate_core::LimitsRegistry;
use perfgate_core::ManualClock;
use perfgate_core::Measure;
use perfgate_core::Observation;
use perfgate_core::PerfError;
use perfgate_core::ResultValue;
use perfgate_core::RunHarness;
use perfgate_core::Sender;
use perfgate_core::SharedSettings;
use perfgate_core::WorstReport;
use perfgate_store::Reader;
use perfgate_store::StoreError;
use perfgate_store::Writer;
use perfgate_store::decode_observations;
use perfgate_store::encode_observations;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn tagged(tag: &str, value: u64) -> Observation {
    Observation::new(
        Sender::new(Some(tag), CollectorKind::Queries, InstanceId::new(value)),
        vec![ResultValue::new("total", Measure::Count(value))],
        Context::new().with("phase", [tag]),
    )
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Verifies only observations broadcast between start and end are written.
#[test]
fn writes_observations_between_start_and_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("djpt.results_collected");
    let hub = Hub::new();
    let mut writer = Writer::new(&hub, &path);

    hub.results_collected().dispatch(&tagged("before start", 1)).unwrap();
    writer.start();
    assert!(writer.is_active());
    hub.results_collected().dispatch(&tagged("after start", 2)).unwrap();
    assert_eq!(writer.end().unwrap(), 1);
    assert!(!writer.is_active());
    hub.results_collected().dispatch(&tagged("after end", 3)).unwrap();

    let observations = Reader::new(&path).read_all().unwrap();
    assert_eq!(observations, [tagged("after start", 2)]);
    assert_eq!(hub.results_collected().receiver_count(), 0);
}

/// Verifies collector results keep statements, identities and context across a round trip.
#[test]
fn round_trip_keeps_results_and_context() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    let hub = Hub::new();
    let log = Arc::new(InMemoryQueryLog::new());
    let clock = Arc::new(ManualClock::new());
    let mut writer = Writer::new(&hub, &path);
    writer.start();

    let guard = hub.scoped_context("setUp method", "setUp (some.module.TestCase)");
    let queries =
        Collector::queries(&hub, log.clone(), Some("test method")).unwrap().start().unwrap();
    log.execute("SELECT id FROM auth_group");
    log.execute("UPDATE auth_group SET name = 'x'");
    queries.finish().unwrap();
    let timer = Collector::timer(&hub, clock.clone(), None).unwrap().start().unwrap();
    clock.advance(Duration::from_millis(125));
    timer.finish().unwrap();
    guard.exit().unwrap();
    writer.record(&tagged("recorded directly", 9));
    assert_eq!(writer.end().unwrap(), 3);

    let observations = Reader::new(&path).read_all().unwrap();
    assert_eq!(observations.len(), 3);
    let first = &observations[0];
    assert_eq!(first.sender.identity(), Some("test method"));
    assert_eq!(first.sender.kind, CollectorKind::Queries);
    assert_eq!(first.context.get("setUp method").unwrap(), ["setUp (some.module.TestCase)"]);
    let names: Vec<&str> = first.results.iter().map(|result| result.name()).collect();
    assert_eq!(names, ["read", "write", "other", "total"]);
    let write = first.results.iter().find(|result| result.name() == "write").unwrap();
    assert_eq!(write.statements(), ["UPDATE auth_group SET name = 'x'"]);

    let second = &observations[1];
    assert_eq!(second.sender.identity(), None);
    assert_eq!(second.results[0].name(), "total");
    assert!(matches!(
        second.results[0].value(),
        Measure::Seconds(seconds) if seconds.to_bits() == 0.125_f64.to_bits()
    ));
    assert_eq!(observations[2], tagged("recorded directly", 9));
}

/// Verifies restarting a writer discards what it had recorded.
#[test]
fn restart_discards_previous_recording() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    let hub = Hub::new();
    let mut writer = Writer::new(&hub, &path);
    writer.start();
    hub.results_collected().dispatch(&tagged("first", 1)).unwrap();
    writer.start();
    hub.results_collected().dispatch(&tagged("second", 2)).unwrap();
    writer.end().unwrap();
    assert_eq!(Reader::new(&path).read_all().unwrap(), [tagged("second", 2)]);
    assert_eq!(hub.results_collected().receiver_count(), 0);
}

/// Verifies a missing destination directory surfaces as an io error.
#[test]
fn end_fails_for_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let hub = Hub::new();
    let mut writer = Writer::new(&hub, dir.path().join("missing").join("run.json"));
    writer.start();
    assert!(matches!(writer.end(), Err(StoreError::Io(_))));
}

/// Verifies elapsed seconds read back bit for bit across the whole mantissa range.
#[test]
fn seconds_round_trip_bit_exact() {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut results = Vec::new();
    for index in 0 .. 20_000 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let exponent = 1_013 + (state >> 59);
        let seconds = f64::from_bits((exponent << 52) | (state & ((1 << 52) - 1)));
        results.push(ResultValue::seconds(format!("t{index}"), seconds));
    }
    let written = Observation::new(
        Sender::new(Some("test method"), CollectorKind::Time, InstanceId::new(1)),
        results,
        Context::new().with("test name", ["test_timing"]),
    );

    let bytes = encode_observations(std::slice::from_ref(&written)).unwrap();
    let read = decode_observations(&bytes).unwrap();
    assert_eq!(read.len(), 1);
    assert_eq!(read[0].results.len(), written.results.len());
    for (before, after) in written.results.iter().zip(&read[0].results) {
        assert_eq!(after.name(), before.name());
        let (Measure::Seconds(before), Measure::Seconds(after)) = (before.value(), after.value())
        else {
            panic!("unit changed for {}", before.name());
        };
        assert_eq!(after.to_bits(), before.to_bits(), "{before} read back as {after}");
    }
    assert_eq!(read, [written]);
}

/// Verifies result names are part of what a round trip preserves.
#[test]
fn round_trip_distinguishes_result_names() {
    let read = Observation::new(
        Sender::new(Some("test method"), CollectorKind::Queries, InstanceId::new(1)),
        vec![ResultValue::new("read", Measure::Count(1))],
        Context::new(),
    );
    let mut write = read.clone();
    write.results = vec![ResultValue::new("write", Measure::Count(1))];
    assert_ne!(read, write);

    let bytes = encode_observations(std::slice::from_ref(&read)).unwrap();
    let decoded = decode_observations(&bytes).unwrap();
    assert_eq!(decoded, [read]);
    assert_ne!(decoded, [write]);
}

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Verifies an empty file decodes to no observations.
#[test]
fn empty_file_reads_as_empty_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty");
    fs::write(&path, b"").unwrap();
    assert!(Reader::new(&path).read_all().unwrap().is_empty());
    assert!(decode_observations(b"\n").unwrap().is_empty());
}

/// Verifies unreadable and malformed files fail.
#[test]
fn missing_or_malformed_files_fail() {
    let dir = tempfile::tempdir().unwrap();
    let missing = Reader::new(dir.path().join("absent")).read_all();
    assert!(matches!(missing, Err(StoreError::Io(_))));

    let garbage = dir.path().join("garbage");
    fs::write(&garbage, b"not json").unwrap();
    assert!(matches!(Reader::new(&garbage).read_all(), Err(StoreError::Decode(_))));

    let future = decode_observations(br#"{"format_version":2,"observations":[]}"#).unwrap_err();
    assert!(future.to_string().contains("unsupported format_version 2"));
}

/// Verifies replayed observations reach `results_read` receivers.
#[test]
fn read_and_broadcast_feeds_worst_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    let recording_hub = Hub::new();
    let mut writer = Writer::new(&recording_hub, &path);
    writer.start();
    recording_hub.results_collected().dispatch(&tagged("test method", 4)).unwrap();
    recording_hub.results_collected().dispatch(&tagged("test method", 6)).unwrap();
    writer.end().unwrap();

    let hub = Hub::new();
    let report = WorstReport::new(&hub);
    let observations = Reader::new(&path).read_and_broadcast(&hub).unwrap();
    assert_eq!(observations.len(), 2);
    let worst = report.get(Some("test method"), "QueryCollector", "total").unwrap();
    assert!(worst.value == 6_u64);
}

/// Verifies every observation is replayed before a receiver failure is returned.
#[test]
fn replay_continues_after_receiver_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.json");
    let hub = Hub::new();
    let mut writer = Writer::new(&hub, &path);
    writer.record(&tagged("a", 1));
    writer.record(&tagged("b", 2));
    writer.end().unwrap();

    let report = WorstReport::new(&hub);
    let _failing = hub
        .results_read()
        .connect("failing", |_| Err(PerfError::InvalidLimit("replay rejected".to_string())));
    let err = Reader::new(&path).read_and_broadcast(&hub).unwrap_err();
    assert!(matches!(err, StoreError::Dispatch(_)));
    assert!(report.get(Some("b"), "QueryCollector", "total").is_some());
}

// ============================================================================
// SECTION: Recorded Runs
// ============================================================================

/// Verifies a harness run recorded by a writer reads back non-empty.
#[test]
fn recorded_harness_run_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("djpt.results_collected");
    let hub = Hub::new();
    let log = Arc::new(InMemoryQueryLog::new());
    let harness = RunHarness::new(
        &hub,
        Instruments::new(log.clone(), Arc::new(ManualClock::new())),
        LimitsRegistry::defaults(),
        Arc::new(SharedSettings::default()),
        false,
    )
    .unwrap();
    let mut writer = Writer::new(&hub, &path);
    writer.start();
    let outcome: Result<(), PerfError> = harness.run_test("test_recorded", || {
        log.execute("SELECT 1");
        Ok(())
    });
    outcome.unwrap();
    writer.end().unwrap();

    let observations = Reader::new(&path).read_all().unwrap();
    assert!(!observations.is_empty());
    let expected = ["test_recorded".to_string()];
    assert!(
        observations
            .iter()
            .all(|observation| observation.context.get("test name") == Some(&expected[..]))
    );
}
