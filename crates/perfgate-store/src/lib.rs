// crates/perfgate-store/src/lib.rs
// ============================================================================
// Module: Perfgate Datafile Store
// Description: Persistence for observations collected during a run.
// Purpose: Let tooling replay a finished run without re-running it.
// Dependencies: perfgate-core, serde_json, tempfile
// ============================================================================

//! ## Overview
//! A [`Writer`] records every observation broadcast on `results_collected`
//! while it is active and writes them to a datafile when it ends. A
//! [`Reader`] loads the datafile back and can replay it on `results_read`,
//! which is how `perfgate worst-report` rebuilds the report offline.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod datafile;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use datafile::FORMAT_VERSION;
pub use datafile::MAX_DATAFILE_BYTES;
pub use datafile::Reader;
pub use datafile::StoreError;
pub use datafile::Writer;
pub use datafile::decode_observations;
pub use datafile::encode_observations;
