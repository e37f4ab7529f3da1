// crates/perfgate-core/src/queries.rs
// ============================================================================
// Module: Perfgate Query Collector
// Description: Counts and classifies statements executed inside a scope.
// Purpose: Measure database work against a pluggable statement log.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The query collector reads an external [`QueryLog`]. On entry it forces
//! verbose logging on and remembers where the log ended; on exit it takes the
//! statements logged since then and emits `read`, `write`, `other` and `total`
//! results. Logs can be cleared mid-scope (request lifecycle resets); a
//! before-clear hook carries the not-yet-counted statements over so nothing is
//! lost or counted twice.
//!
//! Classification matches the first space-separated token exactly and is case
//! sensitive, after stripping the `QUERY = '` prefix some engines log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::collector::Collector;
use crate::collector::Meter;
use crate::error::PerfResult;
use crate::hub::Hub;
use crate::results::CollectorKind;
use crate::results::ResultValue;

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Prefix some engines put in front of the logged statement text.
pub const QUERY_PREFIX: &str = "QUERY = '";

/// Classification bucket of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryClass {
    /// `SELECT` statements.
    Read,
    /// `INSERT`, `UPDATE` and `DELETE` statements.
    Write,
    /// Anything else.
    Other,
}

impl QueryClass {
    /// Returns the result name for this bucket.
    #[must_use]
    pub const fn bucket(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Other => "other",
        }
    }
}

/// Classifies a logged statement by its first keyword.
#[must_use]
pub fn classify_statement(sql: &str) -> QueryClass {
    let statement = sql.strip_prefix(QUERY_PREFIX).unwrap_or(sql);
    match statement.split(' ').next().unwrap_or_default() {
        "SELECT" => QueryClass::Read,
        "INSERT" | "UPDATE" | "DELETE" => QueryClass::Write,
        _ => QueryClass::Other,
    }
}

// ============================================================================
// SECTION: Query Log Interface
// ============================================================================

/// Hook invoked with the entries a log is about to drop.
pub type ClearHook = Box<dyn Fn(&[String]) + Send + Sync>;

/// Identifier of a registered clear hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClearHookId(u64);

impl ClearHookId {
    /// Creates a hook id from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Statement log collaborator.
pub trait QueryLog: Send + Sync {
    /// Returns the number of statements currently logged.
    fn logged_count(&self) -> usize;

    /// Returns the statements logged at or after `start`.
    fn statements_from(&self, start: usize) -> Vec<String>;

    /// Returns whether verbose logging is forced on.
    fn force_debug(&self) -> bool;

    /// Forces verbose logging on or off.
    fn set_force_debug(&self, enabled: bool);

    /// Registers a hook fired before the log is cleared.
    fn add_clear_hook(&self, hook: ClearHook) -> ClearHookId;

    /// Removes a clear hook.
    fn remove_clear_hook(&self, id: ClearHookId);
}

// ============================================================================
// SECTION: In-Memory Query Log
// ============================================================================

/// Mutable state of [`InMemoryQueryLog`].
#[derive(Default)]
struct LogState {
    /// Logged statements.
    entries: Vec<String>,
    /// Verbose logging flag.
    force_debug: bool,
    /// Registered clear hooks.
    hooks: Vec<(ClearHookId, Arc<dyn Fn(&[String]) + Send + Sync>)>,
    /// Next hook id.
    next_hook: u64,
}

/// Statement log held in memory.
///
/// Statements are recorded only while verbose logging is forced on, the way
/// a database connection only logs through its debug cursor.
#[derive(Default)]
pub struct InMemoryQueryLog {
    /// Guarded state.
    state: Mutex<LogState>,
}

impl InMemoryQueryLog {
    /// Creates an empty log with verbose logging off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a statement if verbose logging is on. Returns whether it was recorded.
    pub fn execute(&self, sql: impl Into<String>) -> bool {
        let mut state = self.lock();
        if !state.force_debug {
            return false;
        }
        state.entries.push(sql.into());
        true
    }

    /// Clears the log after notifying every clear hook.
    pub fn clear(&self) {
        let (entries, hooks) = {
            let state = self.lock();
            let hooks: Vec<_> = state.hooks.iter().map(|(_, hook)| Arc::clone(hook)).collect();
            (state.entries.clone(), hooks)
        };
        for hook in hooks {
            hook(&entries);
        }
        let mut state = self.lock();
        let dropped = entries.len().min(state.entries.len());
        state.entries = state.entries.split_off(dropped);
    }

    /// Returns a copy of the logged statements.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.lock().entries.clone()
    }

    /// Locks the state, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryLog for InMemoryQueryLog {
    fn logged_count(&self) -> usize {
        self.lock().entries.len()
    }

    fn statements_from(&self, start: usize) -> Vec<String> {
        self.lock().entries.get(start ..).map(<[String]>::to_vec).unwrap_or_default()
    }

    fn force_debug(&self) -> bool {
        self.lock().force_debug
    }

    fn set_force_debug(&self, enabled: bool) {
        self.lock().force_debug = enabled;
    }

    fn add_clear_hook(&self, hook: ClearHook) -> ClearHookId {
        let mut state = self.lock();
        let id = ClearHookId::new(state.next_hook);
        state.next_hook += 1;
        state.hooks.push((id, Arc::from(hook)));
        id
    }

    fn remove_clear_hook(&self, id: ClearHookId) {
        self.lock().hooks.retain(|(hook_id, _)| *hook_id != id);
    }
}

impl std::fmt::Debug for InMemoryQueryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryQueryLog")
            .field("entries", &state.entries.len())
            .field("force_debug", &state.force_debug)
            .field("hooks", &state.hooks.len())
            .finish()
    }
}

// ============================================================================
// SECTION: Query Meter
// ============================================================================

/// Measurement window shared with the clear hook.
#[derive(Debug, Default)]
struct QueryWindow {
    /// Log position where the uncounted region starts.
    start: usize,
    /// Statements rescued from cleared logs.
    carried: Vec<String>,
}

/// Meter counting statements logged during the scope.
pub struct QueryMeter {
    /// Observed log.
    log: Arc<dyn QueryLog>,
    /// Window shared with the clear hook.
    window: Arc<Mutex<QueryWindow>>,
    /// Installed clear hook.
    hook: Option<ClearHookId>,
    /// Verbose flag to restore on exit.
    previous_force_debug: Option<bool>,
}

impl QueryMeter {
    /// Creates a meter over `log`.
    #[must_use]
    pub fn new(log: Arc<dyn QueryLog>) -> Self {
        Self {
            log,
            window: Arc::new(Mutex::new(QueryWindow::default())),
            hook: None,
            previous_force_debug: None,
        }
    }

    /// Removes the hook and restores the verbose flag.
    fn cleanup(&mut self) {
        if let Some(hook) = self.hook.take() {
            self.log.remove_clear_hook(hook);
        }
        if let Some(previous) = self.previous_force_debug.take() {
            self.log.set_force_debug(previous);
        }
    }
}

/// Locks a query window, recovering from poisoning.
fn lock_window(window: &Mutex<QueryWindow>) -> MutexGuard<'_, QueryWindow> {
    window.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Meter for QueryMeter {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Queries
    }

    fn begin(&mut self) -> PerfResult<()> {
        self.previous_force_debug = Some(self.log.force_debug());
        self.log.set_force_debug(true);
        {
            let mut window = lock_window(&self.window);
            window.start = self.log.logged_count();
            window.carried.clear();
        }
        let window = Arc::clone(&self.window);
        self.hook = Some(self.log.add_clear_hook(Box::new(move |entries| {
            let mut window = lock_window(&window);
            let uncounted = entries.get(window.start ..).unwrap_or_default();
            window.carried.extend_from_slice(uncounted);
            window.start = 0;
        })));
        Ok(())
    }

    fn finish(&mut self) -> Vec<ResultValue> {
        let statements = {
            let window = lock_window(&self.window);
            let mut statements = window.carried.clone();
            statements.extend(self.log.statements_from(window.start));
            statements
        };
        self.cleanup();
        let mut read = Vec::new();
        let mut write = Vec::new();
        let mut other = Vec::new();
        for statement in &statements {
            match classify_statement(statement) {
                QueryClass::Read => read.push(statement.clone()),
                QueryClass::Write => write.push(statement.clone()),
                QueryClass::Other => other.push(statement.clone()),
            }
        }
        vec![
            ResultValue::counted(QueryClass::Read.bucket(), read),
            ResultValue::counted(QueryClass::Write.bucket(), write),
            ResultValue::counted(QueryClass::Other.bucket(), other),
            ResultValue::counted("total", statements),
        ]
    }

    fn abort(&mut self) {
        self.cleanup();
    }
}

impl Collector {
    /// Creates an idle query collector over `log`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PerfError::DuplicateIdentity`] when `identity` is taken.
    pub fn queries(hub: &Hub, log: Arc<dyn QueryLog>, identity: Option<&str>) -> PerfResult<Self> {
        Self::new(hub, identity, Box::new(QueryMeter::new(log)))
    }
}
