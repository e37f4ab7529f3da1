// crates/perfgate-core/src/settings.rs
// ============================================================================
// Module: Perfgate Limit Settings
// Description: Live accessor for configured per-identity thresholds.
// Purpose: Let settings-based limits read configuration at evaluation time.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Settings-based limits never cache thresholds. They ask a [`LimitSettings`]
//! accessor on every evaluation, keyed by collector identity and limit type
//! tag. [`SharedSettings`] is the standard accessor: a shared, replaceable
//! [`PerformanceLimits`] mapping.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result name to threshold.
pub type Thresholds = BTreeMap<String, f64>;

/// Collector identity to limit type tag to thresholds.
pub type PerformanceLimits = BTreeMap<String, BTreeMap<String, Thresholds>>;

/// Read-only accessor for configured thresholds.
pub trait LimitSettings: Send + Sync {
    /// Returns the thresholds for `identity` and `type_tag`; empty when unconfigured.
    fn thresholds(&self, identity: &str, type_tag: &str) -> Thresholds;
}

impl LimitSettings for PerformanceLimits {
    fn thresholds(&self, identity: &str, type_tag: &str) -> Thresholds {
        self.get(identity).and_then(|by_tag| by_tag.get(type_tag)).cloned().unwrap_or_default()
    }
}

// ============================================================================
// SECTION: Shared Settings
// ============================================================================

/// Replaceable configuration shared between limits and their owner.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    /// Current limits.
    limits: Arc<RwLock<PerformanceLimits>>,
}

impl SharedSettings {
    /// Creates shared settings from an initial mapping.
    #[must_use]
    pub fn new(limits: PerformanceLimits) -> Self {
        Self {
            limits: Arc::new(RwLock::new(limits)),
        }
    }

    /// Replaces the whole mapping.
    pub fn replace(&self, limits: PerformanceLimits) {
        *self.limits.write().unwrap_or_else(PoisonError::into_inner) = limits;
    }

    /// Sets one threshold.
    pub fn set_threshold(&self, identity: &str, type_tag: &str, name: &str, threshold: f64) {
        self.limits
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(identity.to_string())
            .or_default()
            .entry(type_tag.to_string())
            .or_default()
            .insert(name.to_string(), threshold);
    }

    /// Returns a copy of the current mapping.
    #[must_use]
    pub fn snapshot(&self) -> PerformanceLimits {
        self.limits.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl LimitSettings for SharedSettings {
    fn thresholds(&self, identity: &str, type_tag: &str) -> Thresholds {
        self.limits.read().unwrap_or_else(PoisonError::into_inner).thresholds(identity, type_tag)
    }
}
