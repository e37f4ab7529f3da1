// crates/perfgate-core/src/lib.rs
// ============================================================================
// Module: Perfgate Core Library
// Description: Public API surface for the perfgate observation pipeline.
// Purpose: Expose collectors, limits, reports and their shared hub.
// Dependencies: crate::{collector, context, hub, limits, report, signal}
// ============================================================================

//! ## Overview
//! Perfgate measures scoped units of work (a test method, a client request, a
//! template render) and fails them when a configured threshold is exceeded.
//! Collectors count statements or elapsed time and broadcast their results on
//! the [`Hub`]; [`Limit`]s enforce thresholds, the [`WorstReport`] keeps the
//! worst value per scope, and a datafile writer can persist everything for
//! offline review. All dispatch is synchronous on the calling thread.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod collector;
pub mod context;
pub mod error;
pub mod harness;
pub mod hub;
pub mod limits;
pub mod queries;
pub mod registry;
pub mod report;
pub mod results;
pub mod settings;
pub mod signal;
pub mod timing;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use collector::ActiveCollector;
pub use collector::Collector;
pub use collector::Instruments;
pub use collector::Meter;
pub use context::Context;
pub use context::ContextStack;
pub use error::PerfError;
pub use error::PerfResult;
pub use harness::RunHarness;
pub use hub::ContextGuard;
pub use hub::Hub;
pub use hub::HubOverride;
pub use hub::IdentityLease;
pub use limits::ActiveLimit;
pub use limits::Limit;
pub use limits::LimitBuilder;
pub use limits::LimitDescriptor;
pub use limits::LimitKind;
pub use limits::LimitViolation;
pub use queries::InMemoryQueryLog;
pub use queries::QueryClass;
pub use queries::QueryLog;
pub use queries::classify_statement;
pub use registry::LimitsRegistry;
pub use registry::Named;
pub use registry::UniqueNamedRegistry;
pub use report::WorstEntry;
pub use report::WorstReport;
pub use report::WorstTable;
pub use results::CollectorKind;
pub use results::InstanceId;
pub use results::Measure;
pub use results::Observation;
pub use results::ResultValue;
pub use results::Sender;
pub use settings::LimitSettings;
pub use settings::PerformanceLimits;
pub use settings::SharedSettings;
pub use settings::Thresholds;
pub use signal::DispatchOutcome;
pub use signal::Signal;
pub use signal::Subscription;
pub use timing::Clock;
pub use timing::ManualClock;
pub use timing::SystemClock;
