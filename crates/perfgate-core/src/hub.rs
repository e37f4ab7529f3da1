// crates/perfgate-core/src/hub.rs
// ============================================================================
// Module: Perfgate Hub
// Description: Process state shared by collectors, limits and reports.
// Purpose: Own the context stack, broadcast channels and identity leases.
// Dependencies: tracing
// ============================================================================

//! ## Overview
//! A [`Hub`] bundles everything that was global state in older observation
//! layers: the live [`ContextStack`], the `results_collected` and
//! `results_read` channels, the per-kind identity lease table and the
//! collector instance counter. Hubs are cheap handles; clones share state.
//!
//! Each thread has a default hub reachable through [`Hub::current`]. Tests
//! isolate themselves by creating a fresh hub and [`Hub::install`]ing it; the
//! returned guard restores the previous hub when dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::context::Context;
use crate::context::ContextStack;
use crate::error::PerfError;
use crate::error::PerfResult;
use crate::results::CollectorKind;
use crate::results::InstanceId;
use crate::signal::Signal;

// ============================================================================
// SECTION: Hub
// ============================================================================

/// Channel carrying observations emitted by live collectors.
pub const RESULTS_COLLECTED: &str = "results_collected";
/// Channel carrying observations replayed from a datafile.
pub const RESULTS_READ: &str = "results_read";

/// Shared hub state.
struct HubInner {
    /// Live context stack.
    context: Mutex<ContextStack>,
    /// Observations from live collectors.
    results_collected: Arc<Signal>,
    /// Observations replayed by readers.
    results_read: Arc<Signal>,
    /// Identities currently leased, per collector kind.
    identities: Mutex<BTreeSet<(CollectorKind, String)>>,
    /// Next collector instance id.
    next_instance: AtomicU64,
}

/// Handle to shared observation state.
#[derive(Clone)]
pub struct Hub {
    /// Shared state.
    inner: Arc<HubInner>,
}

thread_local! {
    static CURRENT: RefCell<Hub> = RefCell::new(Hub::new());
}

impl Hub {
    /// Creates an isolated hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                context: Mutex::new(ContextStack::new()),
                results_collected: Signal::new(RESULTS_COLLECTED),
                results_read: Signal::new(RESULTS_READ),
                identities: Mutex::new(BTreeSet::new()),
                next_instance: AtomicU64::new(1),
            }),
        }
    }

    /// Returns this thread's current hub.
    #[must_use]
    pub fn current() -> Self {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Makes `hub` the current hub until the returned guard drops.
    #[must_use = "the previous hub is restored when the guard drops"]
    pub fn install(hub: Self) -> HubOverride {
        let previous = CURRENT.with(|current| current.replace(hub));
        HubOverride {
            previous: Some(previous),
        }
    }

    /// Returns the live-collector channel.
    #[must_use]
    pub fn results_collected(&self) -> &Arc<Signal> {
        &self.inner.results_collected
    }

    /// Returns the replay channel.
    #[must_use]
    pub fn results_read(&self) -> &Arc<Signal> {
        &self.inner.results_read
    }

    /// Returns true when both handles share state.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------------

    /// Pushes a context value.
    pub fn enter_context(&self, key: &str, value: &str) {
        self.context().enter(key, value);
    }

    /// Pops a context value.
    ///
    /// # Errors
    ///
    /// Returns a context mismatch error when `key`/`value` is not the top entry.
    pub fn exit_context(&self, key: &str, value: &str) -> PerfResult<()> {
        self.context().exit(key, value)
    }

    /// Copies the live context.
    #[must_use]
    pub fn context_snapshot(&self) -> Context {
        self.context().snapshot()
    }

    /// Returns true when no context key is entered.
    #[must_use]
    pub fn context_is_empty(&self) -> bool {
        self.context().is_empty()
    }

    /// Enters a context value that is exited when the guard closes or drops.
    #[must_use = "the context is exited when the guard drops"]
    pub fn scoped_context(&self, key: &str, value: &str) -> ContextGuard {
        self.enter_context(key, value);
        ContextGuard {
            hub: self.clone(),
            key: key.to_string(),
            value: value.to_string(),
            open: true,
        }
    }

    /// Runs `body` with a context value entered.
    ///
    /// # Errors
    ///
    /// Returns the body's error if it fails; otherwise any context exit error.
    pub fn with_context<T, E, F>(&self, key: &str, value: &str, body: F) -> Result<T, E>
    where
        E: From<PerfError>,
        F: FnOnce() -> Result<T, E>,
    {
        let guard = self.scoped_context(key, value);
        match body() {
            Ok(output) => {
                guard.exit()?;
                Ok(output)
            }
            Err(err) => {
                drop(guard);
                Err(err)
            }
        }
    }

    /// Locks the context stack, recovering from poisoning.
    fn context(&self) -> MutexGuard<'_, ContextStack> {
        self.inner.context.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Identities
    // ------------------------------------------------------------------------

    /// Leases `identity` for a collector of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::DuplicateIdentity`] when the identity is already
    /// leased by a live collector of the same kind.
    pub fn lease_identity(&self, kind: CollectorKind, identity: &str) -> PerfResult<IdentityLease> {
        let key = (kind, identity.to_string());
        if !self.identities().insert(key.clone()) {
            return Err(PerfError::DuplicateIdentity {
                kind,
                identity: identity.to_string(),
            });
        }
        Ok(IdentityLease {
            hub: self.clone(),
            key,
        })
    }

    /// Returns true when `identity` is leased for `kind`.
    #[must_use]
    pub fn identity_in_use(&self, kind: CollectorKind, identity: &str) -> bool {
        self.identities().contains(&(kind, identity.to_string()))
    }

    /// Allocates a fresh collector instance id.
    #[must_use]
    pub fn next_instance(&self) -> InstanceId {
        InstanceId::new(self.inner.next_instance.fetch_add(1, Ordering::Relaxed))
    }

    /// Locks the lease table, recovering from poisoning.
    fn identities(&self) -> MutexGuard<'_, BTreeSet<(CollectorKind, String)>> {
        self.inner.identities.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("results_collected", &self.inner.results_collected)
            .field("results_read", &self.inner.results_read)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Guards
// ============================================================================

/// Restores the previously current hub on drop.
#[derive(Debug)]
pub struct HubOverride {
    /// Hub that was current before the override.
    previous: Option<Hub>,
}

impl Drop for HubOverride {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT.with(|current| current.replace(previous));
        }
    }
}

/// Entered context value; exits on [`ContextGuard::exit`] or drop.
#[derive(Debug)]
pub struct ContextGuard {
    /// Hub owning the stack.
    hub: Hub,
    /// Entered key.
    key: String,
    /// Entered value.
    value: String,
    /// False once exited.
    open: bool,
}

impl ContextGuard {
    /// Exits the context value.
    ///
    /// # Errors
    ///
    /// Returns a context mismatch error when nested guards were closed out of order.
    pub fn exit(mut self) -> PerfResult<()> {
        self.open = false;
        self.hub.exit_context(&self.key, &self.value)
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if self.open
            && let Err(err) = self.hub.exit_context(&self.key, &self.value)
        {
            tracing::warn!(
                key = %self.key,
                value = %self.value,
                error = %err,
                "context guard dropped out of order"
            );
        }
    }
}

/// Identity lease; the identity is released on drop.
#[derive(Debug)]
pub struct IdentityLease {
    /// Hub owning the lease table.
    hub: Hub,
    /// Leased key.
    key: (CollectorKind, String),
}

impl IdentityLease {
    /// Returns the leased identity.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.key.1
    }
}

impl Drop for IdentityLease {
    fn drop(&mut self) {
        self.hub.identities().remove(&self.key);
    }
}
