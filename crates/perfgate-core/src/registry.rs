// crates/perfgate-core/src/registry.rs
// ============================================================================
// Module: Perfgate Limit Registry
// Description: Name-keyed, duplicate-checked catalog of limit implementations.
// Purpose: Resolve configured references to limit kinds by name.
// Dependencies: std
// ============================================================================

//! ## Overview
//! [`UniqueNamedRegistry`] resolves a list of references through a resolver
//! function and keys the results by their simple name, keeping the reference
//! order. Two references that resolve to the same name make the registry
//! ambiguous and fail construction. [`LimitsRegistry`] instantiates it for the
//! built-in [`LimitKind`]s; references may be the full dotted path, the
//! crate-level path or the bare name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use crate::error::PerfError;
use crate::error::PerfResult;
use crate::limits::LimitKind;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Items that carry a registry name.
pub trait Named {
    /// Returns the simple name the registry keys by.
    fn name(&self) -> &str;
}

impl Named for LimitKind {
    fn name(&self) -> &str {
        Self::name(*self)
    }
}

/// Ordered registry with unique names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueNamedRegistry<T> {
    /// Entries in reference order.
    entries: Vec<T>,
}

impl<T: Named> UniqueNamedRegistry<T> {
    /// Resolves every reference and builds the registry.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error for an unresolvable reference and
    /// [`PerfError::DuplicateNames`] when two references share a name.
    pub fn build<S, F>(references: &[S], resolve: F) -> PerfResult<Self>
    where
        S: AsRef<str>,
        F: Fn(&str) -> PerfResult<T>,
    {
        let entries = references
            .iter()
            .map(|reference| resolve(reference.as_ref()))
            .collect::<PerfResult<Vec<T>>>()?;
        let mut seen = BTreeSet::new();
        let mut duplicates = BTreeSet::new();
        for entry in &entries {
            if !seen.insert(entry.name()) {
                duplicates.insert(entry.name().to_string());
            }
        }
        if !duplicates.is_empty() {
            return Err(PerfError::DuplicateNames {
                names: duplicates.into_iter().collect(),
            });
        }
        Ok(Self {
            entries,
        })
    }

    /// Returns the entry registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    /// Returns the registered names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(Named::name).collect()
    }

    /// Iterates entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a UniqueNamedRegistry<T> {
    type IntoIter = std::slice::Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ============================================================================
// SECTION: Limits Registry
// ============================================================================

/// Registry of limit kinds.
pub type LimitsRegistry = UniqueNamedRegistry<LimitKind>;

/// References used when configuration lists no known limits.
pub const DEFAULT_LIMIT_REFERENCES: [&str; 2] =
    [LimitKind::QueryBatch.dotted_path(), LimitKind::Time.dotted_path()];

/// Resolves a limit reference to a built-in kind.
///
/// # Errors
///
/// Returns [`PerfError::UnknownLimit`] when the reference names no built-in limit.
pub fn resolve_limit_reference(reference: &str) -> PerfResult<LimitKind> {
    LimitKind::ALL
        .into_iter()
        .find(|kind| {
            reference == kind.dotted_path()
                || reference == kind.name()
                || reference.strip_prefix("perfgate_core::") == Some(kind.name())
        })
        .ok_or_else(|| PerfError::UnknownLimit {
            reference: reference.to_string(),
        })
}

impl UniqueNamedRegistry<LimitKind> {
    /// Builds the registry of built-in limits.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            entries: LimitKind::ALL.to_vec(),
        }
    }

    /// Builds a limits registry from configured references.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::UnknownLimit`] or [`PerfError::DuplicateNames`].
    pub fn from_references<S: AsRef<str>>(references: &[S]) -> PerfResult<Self> {
        Self::build(references, resolve_limit_reference)
    }

    /// Uses configured references when present, the built-in defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`PerfError::UnknownLimit`] or [`PerfError::DuplicateNames`].
    pub fn settings_or_default(references: Option<&[String]>) -> PerfResult<Self> {
        match references {
            Some(references) => Self::from_references(references),
            None => Self::from_references(&DEFAULT_LIMIT_REFERENCES),
        }
    }
}
