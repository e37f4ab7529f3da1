// crates/perfgate-core/src/error.rs
// ============================================================================
// Module: Perfgate Error Taxonomy
// Description: Structured failures raised by the observation pipeline.
// Purpose: Give instrumentation mistakes and exceeded thresholds distinct variants.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every failure in this crate is a broken instrumentation invariant or an
//! exceeded threshold; none are transient, so nothing here is retried.
//! [`PerfError::LimitViolation`] is the domain error surfaced to the caller of
//! a measured scope. [`PerfError::ReceiverFailed`] wraps any other error raised
//! by a broadcast receiver together with the receiver's trace.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::limits::LimitViolation;
use crate::results::CollectorKind;

// ============================================================================
// SECTION: Error Type
// ============================================================================

/// Errors raised by contexts, collectors, limits, registries and reports.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PerfError {
    /// A context exit named a key that was never entered.
    #[error("cannot exit not entered context - key '{key}' mismatch")]
    ContextKeyMismatch {
        /// Key passed to the exit call.
        key: String,
    },
    /// A context exit named a value that is not on top of the key's stack.
    #[error("cannot exit not entered context - value mismatch (exit: '{exit}', enter: '{enter}')")]
    ContextValueMismatch {
        /// Value passed to the exit call.
        exit: String,
        /// Value currently on top of the stack.
        enter: String,
    },
    /// A collector identity is already leased by a live collector of the same kind.
    #[error("There is already a collector named '{identity}' ({kind})")]
    DuplicateIdentity {
        /// Collector kind owning the identity namespace.
        kind: CollectorKind,
        /// Identity that was requested twice.
        identity: String,
    },
    /// Registry references resolved to the same name more than once.
    #[error("duplicate names in registry: {}", .names.join(", "))]
    DuplicateNames {
        /// Names that appeared more than once, sorted.
        names: Vec<String>,
    },
    /// A registry reference did not resolve to a known limit.
    #[error("unknown limit reference '{reference}'")]
    UnknownLimit {
        /// Reference that failed to resolve.
        reference: String,
    },
    /// Limit construction or scoping was invalid.
    #[error("{0}")]
    InvalidLimit(String),
    /// A measured value exceeded its configured threshold.
    #[error("{0}")]
    LimitViolation(Box<LimitViolation>),
    /// One broadcast batch carried the same result name twice.
    #[error("duplicate result names in one observation: {}", .names.join(", "))]
    DuplicateResultNames {
        /// Names that appeared more than once, sorted.
        names: Vec<String>,
    },
    /// A broadcast receiver failed with a non-violation error.
    #[error("receiver '{receiver}' failed: {source}\n{trace}")]
    ReceiverFailed {
        /// Label of the failing receiver.
        receiver: String,
        /// Trace captured when the failure was observed.
        trace: String,
        /// The error the receiver returned.
        #[source]
        source: Box<PerfError>,
    },
}

impl PerfError {
    /// Attaches the trace of the receiver that produced this error.
    ///
    /// Limit violations keep their variant and record the trace inline; other
    /// errors are wrapped in [`PerfError::ReceiverFailed`].
    #[must_use]
    pub fn with_receiver_trace(self, receiver: &str, trace: String) -> Self {
        match self {
            Self::LimitViolation(violation) => {
                Self::LimitViolation(Box::new(violation.with_trace(trace)))
            }
            wrapped @ Self::ReceiverFailed {
                ..
            } => wrapped,
            other => Self::ReceiverFailed {
                receiver: receiver.to_string(),
                trace,
                source: Box::new(other),
            },
        }
    }

    /// Returns the limit violation carried by this error, looking through receiver wrappers.
    #[must_use]
    pub fn as_violation(&self) -> Option<&LimitViolation> {
        match self {
            Self::LimitViolation(violation) => Some(violation),
            Self::ReceiverFailed {
                source,
                ..
            } => source.as_violation(),
            _ => None,
        }
    }
}

/// Result alias for pipeline operations.
pub type PerfResult<T> = Result<T, PerfError>;
