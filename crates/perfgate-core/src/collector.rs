// crates/perfgate-core/src/collector.rs
// ============================================================================
// Module: Perfgate Collectors
// Description: Scoped measurement that broadcasts its results on close.
// Purpose: Share one lifecycle between query-count and elapsed-time meters.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`Collector`] pairs a [`Meter`] with a sender descriptor and an optional
//! identity lease. [`Collector::start`] moves it into the active state;
//! [`ActiveCollector::finish`] reads the meter, snapshots the hub context and
//! dispatches one [`Observation`] on `results_collected`. Aborting (explicitly
//! or by dropping the active collector) runs the meter cleanup without
//! emitting, which is how a failing measured body keeps priority over any
//! receiver error.
//!
//! ## Invariants
//! - States are idle, active and closed; a collector never reopens.
//! - Meter cleanup runs on every exit path.
//! - The identity lease is released when the collector value is dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::PerfError;
use crate::error::PerfResult;
use crate::hub::Hub;
use crate::hub::IdentityLease;
use crate::queries::QueryLog;
use crate::queries::QueryMeter;
use crate::results::CollectorKind;
use crate::results::Observation;
use crate::results::ResultValue;
use crate::results::Sender;
use crate::timing::Clock;
use crate::timing::SystemClock;
use crate::timing::TimeMeter;

// ============================================================================
// SECTION: Meter Interface
// ============================================================================

/// Measurement strategy driven by a [`Collector`].
pub trait Meter: Send {
    /// Returns the collector kind this meter implements.
    fn kind(&self) -> CollectorKind;

    /// Starts the measurement window.
    ///
    /// # Errors
    ///
    /// Returns an error when the measurement cannot start.
    fn begin(&mut self) -> PerfResult<()>;

    /// Ends the window, runs cleanup and returns the results to emit.
    fn finish(&mut self) -> Vec<ResultValue>;

    /// Ends the window and runs cleanup without producing results.
    fn abort(&mut self);
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Idle collector; call [`Collector::start`] to open its scope.
pub struct Collector {
    /// Hub receiving the observation.
    hub: Hub,
    /// Descriptor attached to emitted observations.
    sender: Sender,
    /// Identity lease, held for the collector's lifetime.
    lease: Option<IdentityLease>,
    /// Measurement strategy.
    meter: Box<dyn Meter>,
}

impl Collector {
    /// Creates a collector, leasing `identity` when provided.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::DuplicateIdentity`] when a live collector of the
    /// same kind already holds `identity`.
    pub fn new(hub: &Hub, identity: Option<&str>, meter: Box<dyn Meter>) -> PerfResult<Self> {
        let kind = meter.kind();
        let lease = identity.map(|identity| hub.lease_identity(kind, identity)).transpose()?;
        let sender = Sender::new(identity, kind, hub.next_instance());
        Ok(Self {
            hub: hub.clone(),
            sender,
            lease,
            meter,
        })
    }

    /// Returns the sender descriptor used for emitted observations.
    #[must_use]
    pub const fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Returns the leased identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.lease.as_ref().map(IdentityLease::identity)
    }

    /// Returns the collector kind.
    #[must_use]
    pub const fn kind(&self) -> CollectorKind {
        self.sender.kind
    }

    /// Opens the measurement scope.
    ///
    /// # Errors
    ///
    /// Returns an error when the meter fails to start.
    pub fn start(mut self) -> PerfResult<ActiveCollector> {
        self.meter.begin()?;
        tracing::debug!(kind = %self.sender.kind, identity = self.identity(), "collector started");
        Ok(ActiveCollector {
            collector: self,
            open: true,
        })
    }

    /// Measures `body`, emitting results only when it succeeds.
    ///
    /// # Errors
    ///
    /// Returns the body's error unchanged when it fails; otherwise start
    /// failures and the first receiver failure.
    pub fn measure<T, E, F>(self, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        let active = self.start()?;
        match body() {
            Ok(output) => {
                active.finish()?;
                Ok(output)
            }
            Err(err) => {
                active.abort();
                Err(err)
            }
        }
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector").field("sender", &self.sender).finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Active Collector
// ============================================================================

/// Collector whose scope is open; aborts on drop unless finished.
pub struct ActiveCollector {
    /// Underlying collector.
    collector: Collector,
    /// False once finished or aborted.
    open: bool,
}

impl ActiveCollector {
    /// Returns the sender descriptor.
    #[must_use]
    pub const fn sender(&self) -> &Sender {
        &self.collector.sender
    }

    /// Closes the scope and broadcasts the results.
    ///
    /// Every receiver runs even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first receiver failure, augmented with its trace.
    pub fn finish(mut self) -> PerfResult<Vec<ResultValue>> {
        self.open = false;
        let results = self.collector.meter.finish();
        let observation = Observation::new(
            self.collector.sender.clone(),
            results.clone(),
            self.collector.hub.context_snapshot(),
        );
        tracing::debug!(
            kind = %self.collector.sender.kind,
            identity = self.collector.identity(),
            results = results.len(),
            "collector finished"
        );
        self.collector.hub.results_collected().dispatch(&observation)?;
        Ok(results)
    }

    /// Closes the scope without broadcasting.
    pub fn abort(mut self) {
        self.close_without_emit();
    }

    /// Runs meter cleanup once.
    fn close_without_emit(&mut self) {
        if self.open {
            self.open = false;
            self.collector.meter.abort();
            tracing::debug!(kind = %self.collector.sender.kind, "collector aborted");
        }
    }
}

impl Drop for ActiveCollector {
    fn drop(&mut self) {
        self.close_without_emit();
    }
}

impl fmt::Debug for ActiveCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveCollector")
            .field("sender", &self.collector.sender)
            .field("open", &self.open)
            .finish()
    }
}

// ============================================================================
// SECTION: Instruments
// ============================================================================

/// Collaborators collectors measure against.
#[derive(Clone)]
pub struct Instruments {
    /// Statement log read by query collectors.
    pub query_log: Arc<dyn QueryLog>,
    /// Clock read by time collectors.
    pub clock: Arc<dyn Clock>,
}

impl Instruments {
    /// Creates instruments from explicit collaborators.
    #[must_use]
    pub fn new(query_log: Arc<dyn QueryLog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            query_log,
            clock,
        }
    }

    /// Creates instruments using the system clock.
    #[must_use]
    pub fn system(query_log: Arc<dyn QueryLog>) -> Self {
        Self::new(query_log, Arc::new(SystemClock))
    }

    /// Builds an idle collector of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::DuplicateIdentity`] when `identity` is taken.
    pub fn collector(
        &self,
        hub: &Hub,
        kind: CollectorKind,
        identity: Option<&str>,
    ) -> PerfResult<Collector> {
        let meter: Box<dyn Meter> = match kind {
            CollectorKind::Queries => Box::new(QueryMeter::new(Arc::clone(&self.query_log))),
            CollectorKind::Time => Box::new(TimeMeter::new(Arc::clone(&self.clock))),
        };
        Collector::new(hub, identity, meter)
    }
}

impl fmt::Debug for Instruments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruments").finish_non_exhaustive()
    }
}
