// crates/perfgate-core/src/timing.rs
// ============================================================================
// Module: Perfgate Time Collector
// Description: Elapsed wall-clock time of a scope.
// Purpose: Emit a single `total` result in fractional seconds.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The time meter reads a [`Clock`] on entry and exit. Production code uses
//! [`SystemClock`]; tests drive a [`ManualClock`] for exact durations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use crate::collector::Collector;
use crate::collector::Meter;
use crate::error::PerfResult;
use crate::hub::Hub;
use crate::results::CollectorKind;
use crate::results::ResultValue;

// ============================================================================
// SECTION: Clocks
// ============================================================================

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when advanced.
#[derive(Debug)]
pub struct ManualClock {
    /// Fixed origin.
    base: Instant,
    /// Time advanced so far.
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock frozen at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset = offset.saturating_add(by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.base.checked_add(offset).unwrap_or(self.base)
    }
}

// ============================================================================
// SECTION: Time Meter
// ============================================================================

/// Meter emitting the elapsed seconds of its scope as `total`.
pub struct TimeMeter {
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Scope start, set by `begin`.
    started: Option<Instant>,
}

impl TimeMeter {
    /// Creates a meter reading `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            started: None,
        }
    }
}

impl Meter for TimeMeter {
    fn kind(&self) -> CollectorKind {
        CollectorKind::Time
    }

    fn begin(&mut self) -> PerfResult<()> {
        self.started = Some(self.clock.now());
        Ok(())
    }

    fn finish(&mut self) -> Vec<ResultValue> {
        let now = self.clock.now();
        let elapsed = self
            .started
            .take()
            .map_or(Duration::ZERO, |started| now.saturating_duration_since(started));
        vec![ResultValue::seconds("total", elapsed.as_secs_f64())]
    }

    fn abort(&mut self) {
        self.started = None;
    }
}

impl Collector {
    /// Creates an idle time collector reading `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PerfError::DuplicateIdentity`] when `identity` is taken.
    pub fn timer(hub: &Hub, clock: Arc<dyn Clock>, identity: Option<&str>) -> PerfResult<Self> {
        Self::new(hub, identity, Box::new(TimeMeter::new(clock)))
    }
}
