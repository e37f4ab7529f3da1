// crates/perfgate-core/src/report.rs
// ============================================================================
// Module: Perfgate Worst Report
// Description: Worst observation per sender identity, type and result name.
// Purpose: Summarize the slowest and heaviest scopes of a whole run.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`WorstTable`] keeps, for every `(identity, collector type, result name)`
//! cell, the maximum value seen and the context it was seen in. A later value
//! replaces the stored one only when strictly greater, so replaying the same
//! observation is a no-op. [`WorstReport`] feeds a table from both hub
//! channels for its whole lifetime.
//!
//! Rendering is deterministic: every level is sorted by name.
//!
//! ```text
//! Worst Performing Items
//! test method:
//!   QueryCollector:
//!     total: 12 {"test name":["test_list (app.tests.ViewTests)"]}
//! ```

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::context::Context;
use crate::error::PerfError;
use crate::error::PerfResult;
use crate::hub::Hub;
use crate::results::Observation;
use crate::results::ResultValue;
use crate::signal::Subscription;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header line written before any rows.
pub const REPORT_HEADER: &str = "Worst Performing Items";

/// Identity label used for collectors without an identity.
pub const ANONYMOUS_LABEL: &str = "(anonymous)";

// ============================================================================
// SECTION: Worst Table
// ============================================================================

/// Stored worst value and its context.
#[derive(Debug, Clone, PartialEq)]
pub struct WorstEntry {
    /// Worst result seen.
    pub value: ResultValue,
    /// Context of that result.
    pub context: Context,
}

impl fmt::Display for WorstEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.context)
        }
    }
}

/// Result name to worst entry.
type NameCells = BTreeMap<String, WorstEntry>;
/// Collector type name to cells.
type TypeCells = BTreeMap<&'static str, NameCells>;

/// Worst-case aggregation table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorstTable {
    /// identity -> type -> name -> entry.
    data: BTreeMap<Option<String>, TypeCells>,
}

impl WorstTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    /// Folds one observation into the table.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::DuplicateResultNames`] when the observation carries
    /// a result name twice; the table is unchanged in that case.
    pub fn observe(&mut self, observation: &Observation) -> PerfResult<()> {
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for result in &observation.results {
            if !seen.insert(result.name()) {
                duplicates.insert(result.name().to_string());
            }
        }
        if !duplicates.is_empty() {
            return Err(PerfError::DuplicateResultNames {
                names: duplicates.into_iter().collect(),
            });
        }
        let cells = self
            .data
            .entry(observation.sender.identity.clone())
            .or_default()
            .entry(observation.sender.kind.type_name())
            .or_default();
        for result in &observation.results {
            let replace = cells.get(result.name()).is_none_or(|current| current.value < *result);
            if replace {
                cells.insert(
                    result.name().to_string(),
                    WorstEntry {
                        value: result.clone(),
                        context: observation.context.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Returns the entry for one cell.
    #[must_use]
    pub fn get(&self, identity: Option<&str>, type_name: &str, name: &str) -> Option<&WorstEntry> {
        self.data
            .get(&identity.map(str::to_string))
            .and_then(|types| types.get(type_name))
            .and_then(|names| names.get(name))
    }

    /// Returns true when nothing was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Writes the report; writes nothing when the table is empty.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from `out`.
    pub fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.data.is_empty() {
            return Ok(());
        }
        writeln!(out, "{REPORT_HEADER}")?;
        for (identity, types) in &self.data {
            writeln!(out, "{}:", identity.as_deref().unwrap_or(ANONYMOUS_LABEL))?;
            for (type_name, names) in types {
                writeln!(out, "  {type_name}:")?;
                for (name, entry) in names {
                    writeln!(out, "    {name}: {entry}")?;
                }
            }
        }
        Ok(())
    }

    /// Renders the report into a string.
    #[must_use]
    pub fn rendered(&self) -> String {
        let mut out = Vec::new();
        if self.render(&mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

// ============================================================================
// SECTION: Worst Report
// ============================================================================

/// Worst table fed by a hub for the report's lifetime.
#[derive(Debug)]
pub struct WorstReport {
    /// Table shared with the receivers.
    table: Arc<Mutex<WorstTable>>,
    /// Receivers on `results_collected` and `results_read`.
    _subscriptions: [Subscription; 2],
}

impl WorstReport {
    /// Creates a report listening on both channels of `hub`.
    #[must_use]
    pub fn new(hub: &Hub) -> Self {
        let table = Arc::new(Mutex::new(WorstTable::new()));
        let collected = {
            let table = Arc::clone(&table);
            hub.results_collected()
                .connect("worst report", move |observation| lock(&table).observe(observation))
        };
        let read = {
            let table = Arc::clone(&table);
            hub.results_read()
                .connect("worst report", move |observation| lock(&table).observe(observation))
        };
        Self {
            table,
            _subscriptions: [collected, read],
        }
    }

    /// Returns a copy of the table.
    #[must_use]
    pub fn snapshot(&self) -> WorstTable {
        lock(&self.table).clone()
    }

    /// Returns a copy of one cell.
    #[must_use]
    pub fn get(&self, identity: Option<&str>, type_name: &str, name: &str) -> Option<WorstEntry> {
        lock(&self.table).get(identity, type_name, name).cloned()
    }

    /// Returns true when nothing was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.table).is_empty()
    }

    /// Writes the report.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from `out`.
    pub fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        lock(&self.table).render(out)
    }

    /// Renders the report into a string.
    #[must_use]
    pub fn rendered(&self) -> String {
        lock(&self.table).rendered()
    }
}

/// Locks the table, recovering from poisoning.
fn lock(table: &Mutex<WorstTable>) -> MutexGuard<'_, WorstTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
