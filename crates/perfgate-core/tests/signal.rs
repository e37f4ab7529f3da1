// crates/perfgate-core/tests/signal.rs
// ============================================================================
// Module: Broadcast Channel Tests
// Description: Ordering, robust dispatch and subscription lifetime.
// Purpose: Ensure one failing receiver never hides an observation from the rest.
// ============================================================================

//! Broadcast channel tests.

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
use std::sync::Mutex;

use perfgate_core::CollectorKind;
use perfgate_core::Context;
use perfgate_core::InstanceId;
use perfgate_core::Observation;
use perfgate_core::PerfError;
use perfgate_core::ResultValue;
use perfgate_core::Sender;
use perfgate_core::Signal;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn observation() -> Observation {
    Observation::new(
        Sender::new(Some("test method"), CollectorKind::Queries, InstanceId::new(1)),
        vec![ResultValue::counted("total", vec!["SELECT 1".to_string()])],
        Context::new(),
    )
}

fn failure(message: &str) -> PerfError {
    PerfError::InvalidLimit(message.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies receivers run in registration order.
#[test]
fn receivers_run_in_registration_order() {
    let signal = Signal::new("results_collected");
    let calls = Arc::new(Mutex::new(Vec::new()));
    let subscriptions: Vec<_> = ["first", "second", "third"]
        .into_iter()
        .map(|label| {
            let calls = Arc::clone(&calls);
            signal.connect(label, move |_| {
                calls.lock().unwrap().push(label);
                Ok(())
            })
        })
        .collect();
    signal.dispatch(&observation()).unwrap();
    assert_eq!(*calls.lock().unwrap(), ["first", "second", "third"]);
    drop(subscriptions);
    assert_eq!(signal.receiver_count(), 0);
}

/// Verifies robust dispatch runs every receiver and surfaces the first failure.
#[test]
fn dispatch_runs_all_receivers_and_returns_first_error() {
    let signal = Signal::new("results_collected");
    let calls = Arc::new(Mutex::new(0_u32));
    let _failing_a = signal.connect("failing a", |_| Err(failure("a")));
    let _failing_b = signal.connect("failing b", |_| Err(failure("b")));
    let counter = Arc::clone(&calls);
    let _recorder = signal.connect("recorder", move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    let outcomes = signal.send_robust(&observation());
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.is_err());
    assert!(outcomes[1].result.is_err());
    assert!(outcomes[2].result.is_ok());

    let err = signal.dispatch(&observation()).unwrap_err();
    let PerfError::ReceiverFailed {
        receiver,
        trace,
        source,
    } = err
    else {
        panic!("expected receiver failure");
    };
    assert_eq!(receiver, "failing a");
    assert!(trace.starts_with("raised by receiver 'failing a' on signal 'results_collected'"));
    assert_eq!(*source, failure("a"));
    assert_eq!(*calls.lock().unwrap(), 2);
}

/// Verifies plain send stops at the first failure.
#[test]
fn send_stops_at_first_error() {
    let signal = Signal::new("results_collected");
    let calls = Arc::new(Mutex::new(0_u32));
    let _failing = signal.connect("failing", |_| Err(failure("stop")));
    let counter = Arc::clone(&calls);
    let _recorder = signal.connect("recorder", move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    assert_eq!(signal.send(&observation()).unwrap_err(), failure("stop"));
    assert_eq!(*calls.lock().unwrap(), 0);
}

/// Verifies dropping a subscription disconnects only that receiver.
#[test]
fn dropped_subscription_stops_receiving() {
    let signal = Signal::new("results_read");
    let calls = Arc::new(Mutex::new(Vec::new()));
    let kept_calls = Arc::clone(&calls);
    let kept = signal.connect("kept", move |_| {
        kept_calls.lock().unwrap().push("kept");
        Ok(())
    });
    let dropped_calls = Arc::clone(&calls);
    let dropped = signal.connect("dropped", move |_| {
        dropped_calls.lock().unwrap().push("dropped");
        Ok(())
    });
    assert!(kept.is_on(&signal));
    drop(dropped);
    signal.dispatch(&observation()).unwrap();
    assert_eq!(*calls.lock().unwrap(), ["kept"]);
    assert!(signal.disconnect(kept.id()));
    assert_eq!(signal.receiver_count(), 0);
}
