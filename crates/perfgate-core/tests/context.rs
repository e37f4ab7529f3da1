// crates/perfgate-core/tests/context.rs
// ============================================================================
// Module: Scoped Context Tests
// Description: Stack-per-key enter/exit behavior and hub context guards.
// Purpose: Ensure mismatched exits fail without disturbing entered labels.
// ============================================================================

//! Scoped context stack tests.

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

use perfgate_core::Context;
use perfgate_core::ContextStack;
use perfgate_core::Hub;
use perfgate_core::PerfError;
use proptest::prelude::*;

// ============================================================================
// SECTION: Context Stack
// ============================================================================

/// Verifies values under one key behave as a LIFO and the key disappears when empty.
#[test]
fn same_key_values_pop_in_reverse_order() {
    let mut stack = ContextStack::new();
    stack.enter("Client.request", "GET /first");
    stack.enter("Client.request", "GET /redirected");
    assert_eq!(stack.get("Client.request").unwrap(), ["GET /first", "GET /redirected"]);

    stack.exit("Client.request", "GET /redirected").unwrap();
    assert_eq!(stack.get("Client.request").unwrap(), ["GET /first"]);
    stack.exit("Client.request", "GET /first").unwrap();
    assert!(stack.get("Client.request").is_none());
    assert!(stack.is_empty());
}

/// Verifies exiting an unknown key reports the key.
#[test]
fn exit_unknown_key_is_key_mismatch() {
    let mut stack = ContextStack::new();
    stack.enter("test name", "test_one");
    let err = stack.exit("template", "base.html").unwrap_err();
    assert_eq!(
        err,
        PerfError::ContextKeyMismatch {
            key: "template".to_string()
        }
    );
    assert_eq!(err.to_string(), "cannot exit not entered context - key 'template' mismatch");
    assert_eq!(stack.get("test name").unwrap(), ["test_one"]);
}

/// Verifies exiting a value that is not on top reports both values and keeps the stack.
#[test]
fn exit_wrong_value_is_value_mismatch() {
    let mut stack = ContextStack::new();
    stack.enter("template", "outer.html");
    stack.enter("template", "inner.html");
    let before = stack.snapshot();
    let err = stack.exit("template", "outer.html").unwrap_err();
    assert_eq!(
        err.to_string(),
        "cannot exit not entered context - value mismatch (exit: 'outer.html', enter: 'inner.html')"
    );
    assert_eq!(stack.snapshot(), before);
}

/// Verifies snapshots do not follow later changes to the live stack.
#[test]
fn snapshot_is_detached_from_live_stack() {
    let mut stack = ContextStack::new();
    stack.enter("test name", "test_one");
    let snapshot = stack.snapshot();
    stack.enter("template", "page.html");
    stack.exit("test name", "test_one").unwrap();
    assert_eq!(snapshot, Context::new().with("test name", ["test_one"]));
}

/// Verifies context rendering is empty without keys and JSON otherwise.
#[test]
fn context_renders_as_json_or_nothing() {
    assert_eq!(Context::new().to_string(), "");
    let context =
        Context::new().with("test name", ["test_a"]).with("template", ["a.html", "b.html"]);
    assert_eq!(context.to_string(), r#"{"template":["a.html","b.html"],"test name":["test_a"]}"#);
}

// ============================================================================
// SECTION: Hub Guards
// ============================================================================

/// Verifies scoped guards exit on drop and explicit exit.
#[test]
fn scoped_context_guard_exits() {
    let hub = Hub::new();
    {
        let _guard = hub.scoped_context("test name", "test_drop");
        assert_eq!(hub.context_snapshot().get("test name").unwrap(), ["test_drop"]);
    }
    assert!(hub.context_is_empty());

    let guard = hub.scoped_context("test name", "test_exit");
    guard.exit().unwrap();
    assert!(hub.context_is_empty());
}

/// Verifies a failing body exits its context and keeps its own error.
#[test]
fn with_context_prefers_body_error() {
    let hub = Hub::new();
    let result: Result<(), PerfError> = hub.with_context("test name", "test_fails", || {
        Err(PerfError::InvalidLimit("body failed".to_string()))
    });
    assert_eq!(result.unwrap_err(), PerfError::InvalidLimit("body failed".to_string()));
    assert!(hub.context_is_empty());
}

/// Verifies installed hubs are current until their guard drops.
#[test]
fn installed_hub_is_restored() {
    let original = Hub::current();
    let isolated = Hub::new();
    {
        let _override = Hub::install(isolated.clone());
        assert!(Hub::current().ptr_eq(&isolated));
    }
    assert!(Hub::current().ptr_eq(&original));
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    /// Verifies any well-nested sequence of enters and exits returns the stack to empty.
    #[test]
    fn well_nested_sequences_return_to_empty(
        entries in prop::collection::vec(("[a-c]", "[a-z]{1,3}"), 0 .. 16)
    ) {
        let mut stack = ContextStack::new();
        for (key, value) in &entries {
            stack.enter(key, value);
        }
        for (key, value) in entries.iter().rev() {
            prop_assert!(stack.exit(key, value).is_ok());
        }
        prop_assert!(stack.is_empty());
    }

    /// Verifies an out-of-order exit fails and leaves every entry in place.
    #[test]
    fn out_of_order_exit_leaves_entries(
        first in "[a-z]{1,3}",
        second in "[a-z]{1,3}",
    ) {
        prop_assume!(first != second);
        let mut stack = ContextStack::new();
        stack.enter("key", &first);
        stack.enter("key", &second);
        let before = stack.snapshot();
        let is_value_mismatch =
            matches!(stack.exit("key", &first), Err(PerfError::ContextValueMismatch { .. }));
        prop_assert!(is_value_mismatch);
        prop_assert_eq!(stack.snapshot(), before);
    }
}
