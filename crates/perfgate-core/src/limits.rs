// crates/perfgate-core/src/limits.rs
// ============================================================================
// Module: Perfgate Limits
// Description: Threshold enforcement over broadcast results.
// Purpose: Turn exceeded thresholds into structured violation errors.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`Limit`] checks named results against per-name thresholds and raises a
//! [`LimitViolation`] for the first result (in name order) above its
//! threshold. Limits run in one of two modes:
//! - **Named**: built with a collector identity, subscribed to
//!   `results_collected` for the limit's whole lifetime, and matching every
//!   collector of its kind with that identity.
//! - **Anonymous**: no identity; [`Limit::enter`] creates a private collector
//!   and listens only to that collector instance until the scope exits.
//!
//! Thresholds are either fixed at build time or, for settings-based limits,
//! looked up from a [`LimitSettings`] accessor on every evaluation.
//!
//! ## Invariants
//! - Unconfigured result names never fail.
//! - A result equal to its threshold passes.
//! - Anonymous limits finish their collector before unsubscribing, so their own
//!   emission is evaluated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::collector::ActiveCollector;
use crate::collector::Instruments;
use crate::context::Context;
use crate::error::PerfError;
use crate::error::PerfResult;
use crate::hub::Hub;
use crate::results::CollectorKind;
use crate::results::ResultValue;
use crate::settings::LimitSettings;
use crate::settings::Thresholds;
use crate::signal::Subscription;

// ============================================================================
// SECTION: Limit Kinds
// ============================================================================

/// Built-in limit implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LimitKind {
    /// Limits on statement counts.
    QueryBatch,
    /// Limits on elapsed seconds.
    Time,
}

impl LimitKind {
    /// Every built-in kind, in default registry order.
    pub const ALL: [Self; 2] = [Self::QueryBatch, Self::Time];

    /// Returns the registry name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::QueryBatch => "QueryBatchLimit",
            Self::Time => "TimeLimit",
        }
    }

    /// Returns the configuration type tag.
    #[must_use]
    pub const fn type_tag(self) -> &'static str {
        match self {
            Self::QueryBatch => "queries",
            Self::Time => "time",
        }
    }

    /// Returns the fully qualified reference used in configuration.
    #[must_use]
    pub const fn dotted_path(self) -> &'static str {
        match self {
            Self::QueryBatch => "perfgate_core::queries::QueryBatchLimit",
            Self::Time => "perfgate_core::timing::TimeLimit",
        }
    }

    /// Returns the quantifier used in violation messages.
    #[must_use]
    pub const fn quantifier(self) -> &'static str {
        match self {
            Self::QueryBatch | Self::Time => "many",
        }
    }

    /// Returns the measured items' name used in violation messages.
    #[must_use]
    pub const fn items_name(self) -> &'static str {
        match self {
            Self::QueryBatch => "queries",
            Self::Time => "elapsed seconds",
        }
    }

    /// Returns the collector kind this limit listens to.
    #[must_use]
    pub const fn collector_kind(self) -> CollectorKind {
        match self {
            Self::QueryBatch => CollectorKind::Queries,
            Self::Time => CollectorKind::Time,
        }
    }

    /// Resolves a configuration type tag.
    #[must_use]
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_tag() == tag)
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a limit in violation reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitDescriptor {
    /// Limit implementation.
    pub kind: LimitKind,
    /// Collector identity for named limits.
    pub collector_identity: Option<String>,
}

impl LimitDescriptor {
    /// Returns true when the limit has no collector identity.
    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        self.collector_identity.is_none()
    }
}

// ============================================================================
// SECTION: Violations
// ============================================================================

/// A result that exceeded its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitViolation {
    /// Violated limit.
    limit: LimitDescriptor,
    /// Offending result.
    result: ResultValue,
    /// Threshold the result exceeded.
    threshold: f64,
    /// Context snapshot of the observation.
    context: Context,
    /// Receiver trace, when the violation was raised during a broadcast.
    trace: Option<String>,
}

impl LimitViolation {
    /// Creates a violation without a trace.
    #[must_use]
    pub const fn new(
        limit: LimitDescriptor,
        result: ResultValue,
        threshold: f64,
        context: Context,
    ) -> Self {
        Self {
            limit,
            result,
            threshold,
            context,
            trace: None,
        }
    }

    /// Returns a copy carrying `trace`.
    #[must_use]
    pub fn with_trace(&self, trace: String) -> Self {
        Self {
            trace: Some(trace),
            ..self.clone()
        }
    }

    /// Returns the violated limit.
    #[must_use]
    pub const fn descriptor(&self) -> &LimitDescriptor {
        &self.limit
    }

    /// Returns the offending result.
    #[must_use]
    pub const fn result(&self) -> &ResultValue {
        &self.result
    }

    /// Returns the observation context.
    #[must_use]
    pub const fn context(&self) -> &Context {
        &self.context
    }

    /// Returns the receiver trace, if any.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    /// Returns the quantifier (`many`).
    #[must_use]
    pub const fn quantifier(&self) -> &'static str {
        self.limit.kind.quantifier()
    }

    /// Returns the measured items' name.
    #[must_use]
    pub const fn items_name(&self) -> &'static str {
        self.limit.kind.items_name()
    }

    /// Returns ` (for <identity>)` for named limits and nothing otherwise.
    #[must_use]
    pub fn collector_text(&self) -> String {
        self.limit
            .collector_identity
            .as_ref()
            .map(|identity| format!(" (for {identity})"))
            .unwrap_or_default()
    }

    /// Returns the offending result's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.result.name()
    }

    /// Returns the rendered actual value.
    #[must_use]
    pub fn actual(&self) -> String {
        self.result.to_string()
    }

    /// Returns the exceeded threshold.
    #[must_use]
    pub const fn limit(&self) -> f64 {
        self.threshold
    }

    /// Returns the rendered context; empty when there is none.
    #[must_use]
    pub fn context_repr(&self) -> String {
        self.context.to_string()
    }

    /// Returns the trace text; empty when there is none.
    #[must_use]
    pub fn trace_msg(&self) -> &str {
        self.trace.as_deref().unwrap_or_default()
    }

    /// Returns the one-line summary.
    #[must_use]
    pub fn base_message(&self) -> String {
        format!(
            "Too {} ({}) {} {}{} (limit: {})",
            self.quantifier(),
            self.actual(),
            self.name(),
            self.items_name(),
            self.collector_text(),
            self.limit()
        )
    }

    /// Returns the full message: summary, context and trace.
    #[must_use]
    pub fn error_message(&self) -> String {
        let mut message = self.base_message();
        let context = self.context_repr();
        if !context.is_empty() {
            message.push(' ');
            message.push_str(&context);
        }
        let trace = self.trace_msg();
        if !trace.is_empty() {
            message.push('\n');
            message.push_str(trace);
        }
        message
    }
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error_message())
    }
}

// ============================================================================
// SECTION: Threshold Evaluation
// ============================================================================

/// Where a limit's thresholds come from.
enum ThresholdSource {
    /// Fixed at build time.
    Fixed(Thresholds),
    /// Read from settings on every evaluation.
    Settings(Arc<dyn LimitSettings>),
}

/// State shared between a limit and its receivers.
struct LimitCore {
    /// Descriptor copied into violations.
    descriptor: LimitDescriptor,
    /// Threshold source.
    source: ThresholdSource,
}

impl LimitCore {
    /// Returns the thresholds in effect right now.
    fn thresholds(&self) -> Thresholds {
        match &self.source {
            ThresholdSource::Fixed(thresholds) => thresholds.clone(),
            ThresholdSource::Settings(settings) => match &self.descriptor.collector_identity {
                Some(identity) => settings.thresholds(identity, self.descriptor.kind.type_tag()),
                None => Thresholds::new(),
            },
        }
    }

    /// Checks results in name order, failing on the first exceeded threshold.
    fn evaluate(&self, results: &[ResultValue], context: &Context) -> PerfResult<()> {
        let thresholds = self.thresholds();
        let mut ordered: Vec<&ResultValue> = results.iter().collect();
        ordered.sort_by(|left, right| left.name().cmp(right.name()));
        for result in ordered {
            let Some(&threshold) = thresholds.get(result.name()) else {
                continue;
            };
            let within = result.value().as_f64().partial_cmp(&threshold);
            if matches!(within, Some(Ordering::Less | Ordering::Equal)) {
                continue;
            }
            return Err(PerfError::LimitViolation(Box::new(LimitViolation::new(
                self.descriptor.clone(),
                result.clone(),
                threshold,
                context.clone(),
            ))));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builder for [`Limit`].
#[must_use]
pub struct LimitBuilder {
    /// Limit implementation.
    kind: LimitKind,
    /// Collector identity for named limits.
    collector_identity: Option<String>,
    /// Literal thresholds.
    thresholds: Thresholds,
    /// Settings accessor for settings-based limits.
    settings: Option<Arc<dyn LimitSettings>>,
}

impl LimitBuilder {
    /// Sets the collector identity, making the limit named.
    pub fn collector_identity(mut self, identity: impl Into<String>) -> Self {
        self.collector_identity = Some(identity.into());
        self
    }

    /// Adds a literal threshold for a result name.
    pub fn threshold(mut self, name: impl Into<String>, value: f64) -> Self {
        self.thresholds.insert(name.into(), value);
        self
    }

    /// Adds literal thresholds.
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds.extend(thresholds);
        self
    }

    /// Reads thresholds from `settings` at evaluation time.
    pub fn settings_based(mut self, settings: Arc<dyn LimitSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Validates the configuration and builds the limit.
    ///
    /// Named limits subscribe to `hub` immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::InvalidLimit`] when both literal thresholds and
    /// settings are given, or when a settings-based limit has no identity.
    pub fn build(self, hub: &Hub, instruments: &Instruments) -> PerfResult<Limit> {
        let source = match self.settings {
            Some(_) if !self.thresholds.is_empty() => {
                return Err(PerfError::InvalidLimit(
                    "Either provide thresholds or settings_based, not both.".to_string(),
                ));
            }
            Some(_) if self.collector_identity.is_none() => {
                return Err(PerfError::InvalidLimit(
                    "Can only be settings based when collector_identity is provided.".to_string(),
                ));
            }
            Some(settings) => ThresholdSource::Settings(settings),
            None => ThresholdSource::Fixed(self.thresholds),
        };
        let core = Arc::new(LimitCore {
            descriptor: LimitDescriptor {
                kind: self.kind,
                collector_identity: self.collector_identity,
            },
            source,
        });
        let mode = match core.descriptor.collector_identity.clone() {
            Some(identity) => {
                let kind = core.descriptor.kind.collector_kind();
                let receiver_core = Arc::clone(&core);
                let subscription = hub.results_collected().connect(
                    format!("{}({identity})", core.descriptor.kind),
                    move |observation| {
                        let sender = &observation.sender;
                        if sender.kind != kind || sender.identity() != Some(identity.as_str()) {
                            return Ok(());
                        }
                        receiver_core.evaluate(&observation.results, &observation.context)
                    },
                );
                LimitMode::Named {
                    _subscription: subscription,
                }
            }
            None => LimitMode::Anonymous {
                instruments: instruments.clone(),
            },
        };
        tracing::debug!(
            limit = %core.descriptor.kind,
            identity = core.descriptor.collector_identity.as_deref(),
            "limit built"
        );
        Ok(Limit {
            hub: hub.clone(),
            core,
            mode,
        })
    }
}

// ============================================================================
// SECTION: Limit
// ============================================================================

/// Mode-specific limit state.
enum LimitMode {
    /// Listening for the limit's whole lifetime.
    Named {
        /// Held to keep the receiver connected.
        _subscription: Subscription,
    },
    /// Listening only while entered.
    Anonymous {
        /// Collaborators for the private collector.
        instruments: Instruments,
    },
}

/// Threshold enforcer over collector results.
pub struct Limit {
    /// Hub the limit listens on.
    hub: Hub,
    /// Shared evaluation state.
    core: Arc<LimitCore>,
    /// Named or anonymous state.
    mode: LimitMode,
}

impl Limit {
    /// Starts a builder for `kind`.
    pub const fn builder(kind: LimitKind) -> LimitBuilder {
        LimitBuilder {
            kind,
            collector_identity: None,
            thresholds: Thresholds::new(),
            settings: None,
        }
    }

    /// Starts a query batch limit builder.
    pub const fn queries() -> LimitBuilder {
        Self::builder(LimitKind::QueryBatch)
    }

    /// Starts a time limit builder.
    pub const fn time() -> LimitBuilder {
        Self::builder(LimitKind::Time)
    }

    /// Returns the limit implementation.
    #[must_use]
    pub fn kind(&self) -> LimitKind {
        self.core.descriptor.kind
    }

    /// Returns the descriptor used in violations.
    #[must_use]
    pub fn descriptor(&self) -> &LimitDescriptor {
        &self.core.descriptor
    }

    /// Returns the collector identity of a named limit.
    #[must_use]
    pub fn collector_identity(&self) -> Option<&str> {
        self.core.descriptor.collector_identity.as_deref()
    }

    /// Returns true for anonymous limits.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.core.descriptor.is_anonymous()
    }

    /// Returns true when thresholds come from settings.
    #[must_use]
    pub fn is_settings_based(&self) -> bool {
        matches!(self.core.source, ThresholdSource::Settings(_))
    }

    /// Returns the thresholds in effect right now.
    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        self.core.thresholds()
    }

    /// Returns the threshold configured for `result`'s name.
    #[must_use]
    pub fn limit_for(&self, result: &ResultValue) -> Option<f64> {
        self.core.thresholds().get(result.name()).copied()
    }

    /// Checks `results` against the current thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::LimitViolation`] for the first result, in name
    /// order, that exceeds its threshold.
    pub fn evaluate(&self, results: &[ResultValue], context: &Context) -> PerfResult<()> {
        self.core.evaluate(results, context)
    }

    /// Opens an anonymous limit's scope: subscribes, then starts the private collector.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::InvalidLimit`] for named limits, which are always
    /// listening, and propagates collector start failures.
    pub fn enter(&self) -> PerfResult<ActiveLimit> {
        let LimitMode::Anonymous {
            instruments,
        } = &self.mode
        else {
            return Err(PerfError::InvalidLimit("only anonymous limits can be entered".to_string()));
        };
        let kind = self.core.descriptor.kind.collector_kind();
        let collector = instruments.collector(&self.hub, kind, None)?;
        let instance = collector.sender().instance;
        let receiver_core = Arc::clone(&self.core);
        let subscription = self.hub.results_collected().connect(
            format!("{} (anonymous)", self.core.descriptor.kind),
            move |observation| {
                if observation.sender.instance != instance {
                    return Ok(());
                }
                receiver_core.evaluate(&observation.results, &observation.context)
            },
        );
        let collector = collector.start()?;
        Ok(ActiveLimit {
            collector,
            subscription,
        })
    }

    /// Runs `body` inside an anonymous limit's scope.
    ///
    /// # Errors
    ///
    /// Returns the body's error when it fails; otherwise scope errors and
    /// violations of this limit or any other receiver.
    pub fn measure<T, E, F>(&self, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        let active = self.enter()?;
        match body() {
            Ok(output) => {
                active.exit()?;
                Ok(output)
            }
            Err(err) => {
                active.abort();
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Limit")
            .field("descriptor", &self.core.descriptor)
            .field("settings_based", &self.is_settings_based())
            .finish_non_exhaustive()
    }
}

/// Entered anonymous limit.
#[derive(Debug)]
pub struct ActiveLimit {
    /// Private collector; declared first so it aborts before unsubscribing.
    collector: ActiveCollector,
    /// Receiver bound to the private collector.
    subscription: Subscription,
}

impl ActiveLimit {
    /// Finishes the private collector, then stops listening.
    ///
    /// # Errors
    ///
    /// Returns the violation raised for the collector's results, or any other
    /// receiver failure.
    pub fn exit(self) -> PerfResult<Vec<ResultValue>> {
        let Self {
            collector,
            subscription,
        } = self;
        let outcome = collector.finish();
        drop(subscription);
        outcome
    }

    /// Aborts the private collector without evaluation.
    pub fn abort(self) {
        let Self {
            collector,
            subscription,
        } = self;
        collector.abort();
        drop(subscription);
    }
}
