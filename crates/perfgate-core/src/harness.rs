// crates/perfgate-core/src/harness.rs
// ============================================================================
// Module: Perfgate Run Harness
// Description: Scoped entry points for test runners, HTTP clients and templates.
// Purpose: Open and close collectors around framework units of work.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`RunHarness`] is what a test runner integration holds for one run. It
//! owns the run's [`WorstReport`] and one settings-based named limit per
//! registered limit kind and well-known identity. Each wrapper enters a
//! context label first and then starts identified collectors inside it:
//! - [`RunHarness::run_test`]: key `test name`, identity `test method`, one
//!   collector per registered kind.
//! - [`RunHarness::set_up`], [`RunHarness::tear_down`],
//!   [`RunHarness::set_up_class`], [`RunHarness::tear_down_class`]: key
//!   `<hook> method` with value `<hook> (<test case>)`, identity
//!   `test <hook>`, one collector per registered kind.
//! - [`RunHarness::client_request`]: key `Client.request` with value
//!   `<METHOD> <path>`, identity `Client.request`, query collector.
//! - [`RunHarness::render_template`]: key `template`, identity
//!   `Template.render`, query and time collectors.
//!
//! A wrapper nested inside another wrapper with the same identity (a template
//! rendered from a template, a redirect followed by the client) reuses the
//! outer collector instead of opening a second one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::sync::Arc;

use crate::collector::ActiveCollector;
use crate::collector::Instruments;
use crate::error::PerfError;
use crate::hub::Hub;
use crate::limits::Limit;
use crate::registry::LimitsRegistry;
use crate::report::WorstReport;
use crate::results::CollectorKind;
use crate::settings::LimitSettings;
use crate::settings::Thresholds;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Collector identity wrapping test methods.
pub const TEST_METHOD_IDENTITY: &str = "test method";
/// Collector identity wrapping per-test set-up.
pub const SET_UP_IDENTITY: &str = "test setUp";
/// Collector identity wrapping per-test tear-down.
pub const TEAR_DOWN_IDENTITY: &str = "test tearDown";
/// Collector identity wrapping per-class set-up.
pub const SET_UP_CLASS_IDENTITY: &str = "test setUpClass";
/// Collector identity wrapping per-class tear-down.
pub const TEAR_DOWN_CLASS_IDENTITY: &str = "test tearDownClass";
/// Collector identity wrapping client requests.
pub const CLIENT_IDENTITY: &str = "Client.request";
/// Collector identity wrapping template renders.
pub const TEMPLATE_IDENTITY: &str = "Template.render";

/// Context key labelling the running test.
pub const TEST_NAME_CONTEXT_KEY: &str = "test name";
/// Context key labelling client requests.
pub const CLIENT_CONTEXT_KEY: &str = "Client.request";
/// Context key labelling template renders.
pub const TEMPLATE_CONTEXT_KEY: &str = "template";

/// Identities that get settings-based limits.
const LIMITED_IDENTITIES: [&str; 7] = [
    TEST_METHOD_IDENTITY,
    SET_UP_IDENTITY,
    TEAR_DOWN_IDENTITY,
    SET_UP_CLASS_IDENTITY,
    TEAR_DOWN_CLASS_IDENTITY,
    CLIENT_IDENTITY,
    TEMPLATE_IDENTITY,
];

// ============================================================================
// SECTION: Test Case Hooks
// ============================================================================

/// Test case lifecycle hooks wrapped around test bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestHook {
    /// Runs before each test.
    SetUp,
    /// Runs after each test.
    TearDown,
    /// Runs once before the first test of a case.
    SetUpClass,
    /// Runs once after the last test of a case.
    TearDownClass,
}

impl TestHook {
    /// Returns the hook's method name.
    const fn method_name(self) -> &'static str {
        match self {
            Self::SetUp => "setUp",
            Self::TearDown => "tearDown",
            Self::SetUpClass => "setUpClass",
            Self::TearDownClass => "tearDownClass",
        }
    }

    /// Returns the collector identity measuring the hook.
    const fn identity(self) -> &'static str {
        match self {
            Self::SetUp => SET_UP_IDENTITY,
            Self::TearDown => TEAR_DOWN_IDENTITY,
            Self::SetUpClass => SET_UP_CLASS_IDENTITY,
            Self::TearDownClass => TEAR_DOWN_CLASS_IDENTITY,
        }
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Per-run integration state.
pub struct RunHarness {
    /// Hub every collector reports to.
    hub: Hub,
    /// Collaborators for collectors.
    instruments: Instruments,
    /// Known limit kinds.
    registry: LimitsRegistry,
    /// Settings-based named limits, alive for the run.
    limits: Vec<Limit>,
    /// Worst report for the run.
    report: WorstReport,
    /// Whether `finish` prints the report.
    print_worst_report: bool,
}

impl RunHarness {
    /// Creates the harness: worst report first, then the named limits.
    ///
    /// # Errors
    ///
    /// Returns limit construction errors.
    pub fn new(
        hub: &Hub,
        instruments: Instruments,
        registry: LimitsRegistry,
        settings: Arc<dyn LimitSettings>,
        print_worst_report: bool,
    ) -> Result<Self, PerfError> {
        let report = WorstReport::new(hub);
        let mut limits = Vec::new();
        for kind in &registry {
            for identity in LIMITED_IDENTITIES {
                limits.push(
                    Limit::builder(*kind)
                        .collector_identity(identity)
                        .settings_based(Arc::clone(&settings))
                        .build(hub, &instruments)?,
                );
            }
        }
        tracing::debug!(limits = limits.len(), "run harness ready");
        Ok(Self {
            hub: hub.clone(),
            instruments,
            registry,
            limits,
            report,
            print_worst_report,
        })
    }

    /// Returns the hub.
    #[must_use]
    pub const fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Returns the run's worst report.
    #[must_use]
    pub const fn report(&self) -> &WorstReport {
        &self.report
    }

    /// Returns the named limits.
    #[must_use]
    pub fn limits(&self) -> &[Limit] {
        &self.limits
    }

    /// Runs a test body.
    ///
    /// # Errors
    ///
    /// Returns the body's error when it fails; otherwise violations and scope errors.
    pub fn run_test<T, E, F>(&self, test_name: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        let kinds = self.registered_kinds();
        self.scoped(TEST_NAME_CONTEXT_KEY, test_name, TEST_METHOD_IDENTITY, &kinds, body)
    }

    /// Runs a test case's per-test set-up.
    ///
    /// # Errors
    ///
    /// Returns the body's error when it fails; otherwise violations and scope errors.
    pub fn set_up<T, E, F>(&self, test_case: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.hook(TestHook::SetUp, test_case, body)
    }

    /// Runs a test case's per-test tear-down.
    ///
    /// # Errors
    ///
    /// Returns the body's error when it fails; otherwise violations and scope errors.
    pub fn tear_down<T, E, F>(&self, test_case: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.hook(TestHook::TearDown, test_case, body)
    }

    /// Runs a test case's class-level set-up.
    ///
    /// # Errors
    ///
    /// Returns the body's error when it fails; otherwise violations and scope errors.
    pub fn set_up_class<T, E, F>(&self, test_case: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.hook(TestHook::SetUpClass, test_case, body)
    }

    /// Runs a test case's class-level tear-down.
    ///
    /// # Errors
    ///
    /// Returns the body's error when it fails; otherwise violations and scope errors.
    pub fn tear_down_class<T, E, F>(&self, test_case: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.hook(TestHook::TearDownClass, test_case, body)
    }

    /// Runs one client request.
    ///
    /// # Errors
    ///
    /// Returns the body's error when it fails; otherwise violations and scope errors.
    pub fn client_request<T, E, F>(&self, method: &str, path: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        let label = format!("{method} {path}");
        self.scoped(CLIENT_CONTEXT_KEY, &label, CLIENT_IDENTITY, &[CollectorKind::Queries], body)
    }

    /// Renders one template.
    ///
    /// # Errors
    ///
    /// Returns the body's error when it fails; otherwise violations and scope errors.
    pub fn render_template<T, E, F>(&self, template_name: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.scoped(
            TEMPLATE_CONTEXT_KEY,
            template_name,
            TEMPLATE_IDENTITY,
            &[CollectorKind::Queries, CollectorKind::Time],
            body,
        )
    }

    /// Runs a body inside an anonymous limit looked up by name.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::UnknownLimit`] for unregistered names, the body's
    /// error when it fails, otherwise the limit's violation.
    pub fn limit_block<T, E, F>(
        &self,
        limit_name: &str,
        thresholds: Thresholds,
        body: F,
    ) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        let Some(kind) = self.registry.get(limit_name) else {
            return Err(PerfError::UnknownLimit {
                reference: limit_name.to_string(),
            }
            .into());
        };
        let limit =
            Limit::builder(*kind).thresholds(thresholds).build(&self.hub, &self.instruments)?;
        limit.measure(body)
    }

    /// Prints the worst report when enabled.
    ///
    /// # Errors
    ///
    /// Returns I/O errors from `out`.
    pub fn finish(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.print_worst_report {
            self.report.render(out)?;
        }
        Ok(())
    }

    /// Collector kinds of every registered limit.
    fn registered_kinds(&self) -> Vec<CollectorKind> {
        self.registry.iter().map(|kind| kind.collector_kind()).collect()
    }

    /// Wraps a lifecycle hook of `test_case`.
    fn hook<T, E, F>(&self, hook: TestHook, test_case: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        let method = hook.method_name();
        let key = format!("{method} method");
        let value = format!("{method} ({test_case})");
        let kinds = self.registered_kinds();
        self.scoped(&key, &value, hook.identity(), &kinds, body)
    }

    /// Enters the context, starts the collectors and closes them in reverse.
    fn scoped<T, E, F>(
        &self,
        key: &str,
        value: &str,
        identity: &str,
        kinds: &[CollectorKind],
        body: F,
    ) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        self.hub.with_context(key, value, || {
            let mut active: Vec<ActiveCollector> = Vec::with_capacity(kinds.len());
            for kind in kinds {
                if self.hub.identity_in_use(*kind, identity) {
                    tracing::debug!(identity, kind = %kind, "nested scope reuses outer collector");
                    continue;
                }
                let collector = self.instruments.collector(&self.hub, *kind, Some(identity))?;
                active.push(collector.start()?);
            }
            let output = body()?;
            while let Some(collector) = active.pop() {
                collector.finish()?;
            }
            Ok(output)
        })
    }
}

impl std::fmt::Debug for RunHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHarness")
            .field("limits", &self.limits.len())
            .field("print_worst_report", &self.print_worst_report)
            .finish_non_exhaustive()
    }
}
