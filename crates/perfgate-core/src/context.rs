// crates/perfgate-core/src/context.rs
// ============================================================================
// Module: Perfgate Scoped Context
// Description: Stack-per-key labels attached to every observation.
// Purpose: Record where in a run (test, request, template) a measurement happened.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`ContextStack`] maps each key to a LIFO list of values. Entering pushes,
//! exiting pops and must name the current top value exactly. Collectors copy
//! the stack into an owned [`Context`] when they emit, so later pushes and pops
//! never alter observations that were already broadcast.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::PerfError;
use crate::error::PerfResult;

// ============================================================================
// SECTION: Context Snapshot
// ============================================================================

/// Owned copy of the context stack taken at emission time.
///
/// # Invariants
/// - Keys iterate in sorted order.
/// - Never aliases the live stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(BTreeMap<String, Vec<String>>);

impl Context {
    /// Creates an empty context.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns a copy with `key` set to `values`.
    #[must_use]
    pub fn with<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true when no key is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the values recorded for `key`, outermost first.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Iterates keys and their value stacks in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.0.iter()
    }
}

impl fmt::Display for Context {
    /// Renders the context as compact JSON; an empty context renders as nothing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        let rendered = serde_json::to_string(&self.0).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

// ============================================================================
// SECTION: Context Stack
// ============================================================================

/// Live stack-per-key context owned by a hub.
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    /// Values per key, top of stack last.
    data: BTreeMap<String, Vec<String>>,
}

impl ContextStack {
    /// Creates an empty stack.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    /// Pushes `value` onto the stack for `key`.
    pub fn enter(&mut self, key: &str, value: &str) {
        self.data.entry(key.to_string()).or_default().push(value.to_string());
    }

    /// Pops `value` from the stack for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::ContextKeyMismatch`] when `key` has no entries and
    /// [`PerfError::ContextValueMismatch`] when `value` is not the current top.
    /// The stack is unchanged on error.
    pub fn exit(&mut self, key: &str, value: &str) -> PerfResult<()> {
        let Some(values) = self.data.get_mut(key) else {
            return Err(PerfError::ContextKeyMismatch {
                key: key.to_string(),
            });
        };
        match values.last() {
            Some(top) if top == value => {}
            Some(top) => {
                return Err(PerfError::ContextValueMismatch {
                    exit: value.to_string(),
                    enter: top.clone(),
                });
            }
            None => {
                return Err(PerfError::ContextKeyMismatch {
                    key: key.to_string(),
                });
            }
        }
        values.pop();
        if values.is_empty() {
            self.data.remove(key);
        }
        Ok(())
    }

    /// Returns true when no key is entered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the values currently entered for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.data.get(key).map(Vec::as_slice)
    }

    /// Copies the live stack into an owned snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Context {
        Context(self.data.clone())
    }
}
