// crates/perfgate-config/src/lib.rs
// ============================================================================
// Module: Perfgate Config Library
// Description: Configuration model, validation and example generation.
// Purpose: Single source of truth for perfgate.toml semantics.
// Dependencies: perfgate-core, serde, toml
// ============================================================================

//! ## Overview
//! `perfgate-config` defines the configuration consumed by a perfgate run:
//! per-identity thresholds, the list of known limits, the datafile location
//! and whether the worst report is printed. Validation is strict; unknown keys
//! and nonsensical thresholds are rejected before any test runs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
