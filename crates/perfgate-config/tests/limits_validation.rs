//! Limit threshold validation tests for perfgate-config.
// crates/perfgate-config/tests/limits_validation.rs
// =============================================================================
// Module: Limits Validation Tests
// Description: Validate threshold tables and known limit references.
// Purpose: Ensure malformed thresholds fail before any limit is built.
// =============================================================================

use perfgate_config::PerfgateConfig;

mod common;

type TestResult = Result<(), String>;

#[test]
fn negative_threshold_is_rejected() -> TestResult {
    let result = PerfgateConfig::from_toml_str("[limits.\"test method\".queries]\ntotal = -1\n");
    common::assert_invalid(
        result,
        "limits.test method.queries.total must be finite and non-negative",
    )
}

#[test]
fn non_finite_threshold_is_rejected() -> TestResult {
    let result = PerfgateConfig::from_toml_str("[limits.\"test method\".time]\ntotal = inf\n");
    common::assert_invalid(result, "must be finite and non-negative")
}

#[test]
fn unknown_type_tag_is_rejected() -> TestResult {
    let result = PerfgateConfig::from_toml_str("[limits.\"test method\".memory]\ntotal = 1\n");
    common::assert_invalid(result, "unknown limit type")
}

#[test]
fn blank_identity_is_rejected() -> TestResult {
    let result = PerfgateConfig::from_toml_str("[limits.\" \".queries]\ntotal = 1\n");
    common::assert_invalid(result, "collector identity must be non-empty")
}

#[test]
fn unknown_keys_are_rejected() -> TestResult {
    let result = PerfgateConfig::from_toml_str("print_report = false\n");
    common::assert_invalid(result, "config parse error")
}

#[test]
fn unknown_limit_reference_is_rejected() -> TestResult {
    let result = PerfgateConfig::from_toml_str("known_limits = [\"app.limits.SlowLimit\"]\n");
    common::assert_invalid(result, "unknown limit reference 'app.limits.SlowLimit'")
}

#[test]
fn duplicate_limit_references_are_rejected() -> TestResult {
    let result = PerfgateConfig::from_toml_str(
        "known_limits = [\"TimeLimit\", \"perfgate_core::timing::TimeLimit\"]\n",
    );
    common::assert_invalid(result, "known_limits")
}

#[test]
fn configured_limits_replace_defaults() -> TestResult {
    let config = PerfgateConfig::from_toml_str("known_limits = [\"QueryBatchLimit\"]\n")
        .map_err(|err| err.to_string())?;
    let registry = config.limits_registry().map_err(|err| err.to_string())?;
    if registry.names() != ["QueryBatchLimit"] {
        return Err(format!("unexpected limits {}", registry.names().join(", ")));
    }
    Ok(())
}

#[test]
fn blank_datafile_path_is_rejected() -> TestResult {
    let mut config = common::minimal_config().map_err(|err| err.to_string())?;
    config.datafile_path = Some(" ".into());
    common::assert_invalid(config.validate(), "datafile_path must be non-empty")
}
