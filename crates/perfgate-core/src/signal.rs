// crates/perfgate-core/src/signal.rs
// ============================================================================
// Module: Perfgate Broadcast Channels
// Description: Synchronous, ordered publish/subscribe for observations.
// Purpose: Decouple measurement from threshold enforcement and recording.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`Signal`] is an ordered list of receiver closures. Sending runs every
//! receiver on the calling thread in registration order. The robust variant
//! keeps going after a receiver fails, collecting one [`DispatchOutcome`] per
//! receiver; [`Signal::dispatch`] then surfaces the first failure augmented
//! with the failing receiver's trace.
//!
//! ## Invariants
//! - The receiver list lock is never held while a receiver runs, so receivers
//!   may connect or disconnect other receivers.
//! - A [`Subscription`] disconnects its receiver when dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::backtrace::Backtrace;
use std::backtrace::BacktraceStatus;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::error::PerfResult;
use crate::results::Observation;

// ============================================================================
// SECTION: Receivers
// ============================================================================

/// Receiver callback invoked for every observation sent on a signal.
pub type Receiver = dyn Fn(&Observation) -> PerfResult<()> + Send + Sync;

/// Identifier of a connected receiver, unique per signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(u64);

/// Connected receiver entry.
struct Connection {
    /// Connection id.
    id: ReceiverId,
    /// Human-readable label used in failure traces.
    label: String,
    /// Receiver callback.
    receiver: Arc<Receiver>,
}

/// Result of running one receiver during a robust send.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Receiver that ran.
    pub receiver: ReceiverId,
    /// Receiver label.
    pub label: String,
    /// Receiver result; errors already carry the receiver trace.
    pub result: PerfResult<()>,
}

// ============================================================================
// SECTION: Signal
// ============================================================================

/// Named broadcast channel.
pub struct Signal {
    /// Channel name used in traces.
    name: &'static str,
    /// Receivers in registration order.
    connections: Mutex<Vec<Connection>>,
    /// Next receiver id.
    next_id: AtomicU64,
}

impl Signal {
    /// Creates a signal with no receivers.
    #[must_use]
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            connections: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        })
    }

    /// Returns the signal name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Connects a receiver; it stays connected until the subscription drops.
    #[must_use = "dropping the subscription disconnects the receiver"]
    pub fn connect<F>(self: &Arc<Self>, label: impl Into<String>, receiver: F) -> Subscription
    where
        F: Fn(&Observation) -> PerfResult<()> + Send + Sync + 'static,
    {
        let id = ReceiverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let label = label.into();
        tracing::debug!(signal = self.name, receiver = %label, "receiver connected");
        self.lock().push(Connection {
            id,
            label,
            receiver: Arc::new(receiver),
        });
        Subscription {
            signal: Arc::clone(self),
            id,
        }
    }

    /// Disconnects a receiver. Returns false when it was not connected.
    pub fn disconnect(&self, id: ReceiverId) -> bool {
        let mut connections = self.lock();
        let before = connections.len();
        connections.retain(|connection| connection.id != id);
        before != connections.len()
    }

    /// Returns the number of connected receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.lock().len()
    }

    /// Sends to every receiver in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first receiver error unchanged.
    pub fn send(&self, observation: &Observation) -> PerfResult<()> {
        for (_, _, receiver) in self.receivers() {
            receiver(observation)?;
        }
        Ok(())
    }

    /// Sends to every receiver in order, running all of them regardless of failures.
    #[must_use]
    pub fn send_robust(&self, observation: &Observation) -> Vec<DispatchOutcome> {
        let receivers = self.receivers();
        tracing::debug!(signal = self.name, receivers = receivers.len(), "dispatching observation");
        receivers
            .into_iter()
            .map(|(id, label, receiver)| {
                let result = receiver(observation).map_err(|err| {
                    tracing::warn!(
                        signal = self.name,
                        receiver = %label,
                        error = %err,
                        "receiver failed"
                    );
                    let trace = self.trace_for(&label);
                    err.with_receiver_trace(&label, trace)
                });
                DispatchOutcome {
                    receiver: id,
                    label,
                    result,
                }
            })
            .collect()
    }

    /// Runs a robust send and returns the first receiver failure, if any.
    ///
    /// # Errors
    ///
    /// Returns the first failing receiver's error after all receivers ran.
    pub fn dispatch(&self, observation: &Observation) -> PerfResult<()> {
        self.send_robust(observation)
            .into_iter()
            .map(|outcome| outcome.result)
            .find(Result::is_err)
            .unwrap_or(Ok(()))
    }

    /// Snapshots the receiver list so the lock is released before dispatch.
    fn receivers(&self) -> Vec<(ReceiverId, String, Arc<Receiver>)> {
        self.lock()
            .iter()
            .map(|connection| {
                (connection.id, connection.label.clone(), Arc::clone(&connection.receiver))
            })
            .collect()
    }

    /// Builds the trace attached to a receiver failure.
    fn trace_for(&self, label: &str) -> String {
        let header = format!("raised by receiver '{label}' on signal '{}'", self.name);
        let backtrace = Backtrace::capture();
        if backtrace.status() == BacktraceStatus::Captured {
            format!("{header}\n{backtrace}")
        } else {
            header
        }
    }

    /// Locks the receiver list, recovering from poisoning.
    fn lock(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

// ============================================================================
// SECTION: Subscriptions
// ============================================================================

/// Connection handle; disconnects its receiver on drop.
pub struct Subscription {
    /// Signal the receiver is connected to.
    signal: Arc<Signal>,
    /// Connected receiver.
    id: ReceiverId,
}

impl Subscription {
    /// Returns the connected receiver id.
    #[must_use]
    pub const fn id(&self) -> ReceiverId {
        self.id
    }

    /// Returns true when this subscription belongs to `signal`.
    #[must_use]
    pub fn is_on(&self, signal: &Arc<Signal>) -> bool {
        Arc::ptr_eq(&self.signal, signal)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.signal.disconnect(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("signal", &self.signal.name)
            .field("id", &self.id)
            .finish()
    }
}
