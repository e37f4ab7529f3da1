// crates/perfgate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and the CLI.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example `perfgate.toml`. Kept valid by the config test suite.

/// Returns a canonical example `perfgate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"print_worst_report = true
datafile_path = "djpt.results_collected"
known_limits = ["QueryBatchLimit", "TimeLimit"]

[limits."test method".queries]
total = 50
write = 10

[limits."test method".time]
total = 2.5

[limits."Client.request".queries]
total = 20

[limits."Template.render".queries]
total = 5

[limits."Template.render".time]
total = 0.5
"#,
    )
}
