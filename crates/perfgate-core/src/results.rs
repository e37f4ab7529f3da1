// crates/perfgate-core/src/results.rs
// ============================================================================
// Module: Perfgate Result Values
// Description: Named, comparable measurements and the observations carrying them.
// Purpose: Provide one comparison surface for query counts and elapsed seconds.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`ResultValue`] is a named measurement emitted by a collector when its
//! scope closes. Values compare against each other and against raw numbers by
//! their numeric value only; the name never participates in ordering.
//! [`Observation`] is the `(sender, results, context)` triple broadcast on the
//! hub's channels and persisted by the datafile writer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::context::Context;

// ============================================================================
// SECTION: Collector Kinds
// ============================================================================

/// Kind of collector that produced an observation.
///
/// # Invariants
/// - Variants are stable on the wire (`snake_case`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    /// Counts database statements executed inside the scope.
    Queries,
    /// Measures elapsed wall-clock time of the scope.
    Time,
}

impl CollectorKind {
    /// Returns the type name used in reports.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Queries => "QueryCollector",
            Self::Time => "TimeCollector",
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

// ============================================================================
// SECTION: Measures
// ============================================================================

/// Numeric payload of a result value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Measure {
    /// Number of items (statements).
    Count(u64),
    /// Fractional seconds.
    Seconds(f64),
}

impl Measure {
    /// Returns the measure as a float for threshold comparison.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "Counts stay far below 2^52.")]
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Count(count) => count as f64,
            Self::Seconds(seconds) => seconds,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => count.fmt(f),
            Self::Seconds(seconds) => seconds.fmt(f),
        }
    }
}

impl PartialEq for Measure {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Measure {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Count(left), Self::Count(right)) => Some(left.cmp(right)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl PartialEq<f64> for Measure {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64().partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd<f64> for Measure {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.as_f64().partial_cmp(other)
    }
}

// ============================================================================
// SECTION: Result Values
// ============================================================================

/// Named measurement emitted by a collector.
///
/// # Invariants
/// - Immutable after construction.
/// - Equality and ordering consider only the measure, never the name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultValue {
    /// Result name (`total`, `read`, ...).
    name: String,
    /// Measured value.
    value: Measure,
    /// Statements captured for count results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    statements: Vec<String>,
}

impl ResultValue {
    /// Creates a result value from a name and measure.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Measure) -> Self {
        Self {
            name: name.into(),
            value,
            statements: Vec::new(),
        }
    }

    /// Creates a count result whose value is the number of captured statements.
    #[must_use]
    pub fn counted(name: impl Into<String>, statements: Vec<String>) -> Self {
        let count = u64::try_from(statements.len()).unwrap_or(u64::MAX);
        Self {
            name: name.into(),
            value: Measure::Count(count),
            statements,
        }
    }

    /// Creates an elapsed-seconds result.
    #[must_use]
    pub fn seconds(name: impl Into<String>, seconds: f64) -> Self {
        Self::new(name, Measure::Seconds(seconds))
    }

    /// Returns the result name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the measured value.
    #[must_use]
    pub const fn value(&self) -> Measure {
        self.value
    }

    /// Returns the statements captured for this result (empty for timings).
    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl PartialEq for ResultValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialOrd for ResultValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl PartialEq<f64> for ResultValue {
    fn eq(&self, other: &f64) -> bool {
        self.value == *other
    }
}

impl PartialOrd<f64> for ResultValue {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value.partial_cmp(other)
    }
}

impl PartialEq<u64> for ResultValue {
    fn eq(&self, other: &u64) -> bool {
        self.value == Measure::Count(*other)
    }
}

impl PartialOrd<u64> for ResultValue {
    fn partial_cmp(&self, other: &u64) -> Option<Ordering> {
        self.value.partial_cmp(&Measure::Count(*other))
    }
}

// ============================================================================
// SECTION: Senders
// ============================================================================

/// Per-hub collector instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Creates an instance id from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Descriptor of the collector that emitted an observation.
///
/// # Invariants
/// - Compared by value; `instance` is unique per hub for live collectors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sender {
    /// Optional cross-cutting identity (`test method`, ...).
    pub identity: Option<String>,
    /// Collector kind.
    pub kind: CollectorKind,
    /// Collector instance within its hub.
    pub instance: InstanceId,
}

impl Sender {
    /// Creates a sender descriptor.
    #[must_use]
    pub fn new(identity: Option<&str>, kind: CollectorKind, instance: InstanceId) -> Self {
        Self {
            identity: identity.map(str::to_string),
            kind,
            instance,
        }
    }

    /// Returns the identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }
}

// ============================================================================
// SECTION: Observations
// ============================================================================

/// One broadcast: who measured, what was measured, and where in the run.
///
/// # Invariants
/// - Equality compares each result by name, statements and exact measure
///   (same unit, same bits), unlike [`ResultValue`] equality which compares
///   values only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Emitting collector.
    pub sender: Sender,
    /// Emitted results.
    pub results: Vec<ResultValue>,
    /// Context snapshot taken at emission time.
    pub context: Context,
}

impl Observation {
    /// Creates an observation.
    #[must_use]
    pub const fn new(sender: Sender, results: Vec<ResultValue>, context: Context) -> Self {
        Self {
            sender,
            results,
            context,
        }
    }
}

impl PartialEq for Observation {
    fn eq(&self, other: &Self) -> bool {
        self.sender == other.sender
            && self.context == other.context
            && self.results.len() == other.results.len()
            && self.results.iter().zip(&other.results).all(|(left, right)| {
                left.name() == right.name()
                    && left.statements() == right.statements()
                    && match (left.value(), right.value()) {
                        (Measure::Count(left), Measure::Count(right)) => left == right,
                        (Measure::Seconds(left), Measure::Seconds(right)) => {
                            left.to_bits() == right.to_bits()
                        }
                        _ => false,
                    }
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::float_cmp, reason = "Test-only assertions.")]

    use super::CollectorKind;
    use super::Context;
    use super::InstanceId;
    use super::Measure;
    use super::Observation;
    use super::ResultValue;
    use super::Sender;

    fn observation(name: &str, value: Measure) -> Observation {
        Observation::new(
            Sender::new(Some("test method"), CollectorKind::Queries, InstanceId::new(1)),
            vec![ResultValue::new(name, value)],
            Context::new().with("test name", ["test_a"]),
        )
    }

    #[test]
    fn compares_by_value_not_name() {
        let small = ResultValue::new("read", Measure::Count(1));
        let large = ResultValue::new("write", Measure::Count(3));
        assert!(small < large);
        assert!(large > 2.5);
        assert!(small == 1_u64);
        assert_eq!(
            ResultValue::new("a", Measure::Count(2)),
            ResultValue::new("b", Measure::Count(2))
        );
    }

    #[test]
    fn mixed_measures_compare_numerically() {
        assert!(Measure::Count(2) < Measure::Seconds(2.5));
        assert!(Measure::Seconds(2.0) == Measure::Count(2));
        assert!(Measure::Seconds(f64::NAN).partial_cmp(&Measure::Count(1)).is_none());
    }

    #[test]
    fn counted_uses_statement_len() {
        let result = ResultValue::counted("total", vec!["SELECT 1".to_string(); 3]);
        assert_eq!(result.value().as_f64(), 3.0);
        assert_eq!(result.statements().len(), 3);
        assert_eq!(result.to_string(), "3");
    }

    #[test]
    fn observations_compare_result_names_and_units() {
        let read = observation("read", Measure::Count(1));
        assert_eq!(read, observation("read", Measure::Count(1)));
        assert_ne!(read, observation("write", Measure::Count(1)));
        assert_ne!(read, observation("read", Measure::Seconds(1.0)));
        assert_ne!(
            observation("total", Measure::Seconds(0.951_956_028_402_638_7)),
            observation("total", Measure::Seconds(0.951_956_028_402_638_8)),
        );
    }
}
