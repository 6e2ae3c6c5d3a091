//! Reserved names and tokens honored in generated identifiers.
//!
//! The synthetic stages of a lowered workflow use fixed names; user call
//! aliases must stay clear of them, since stage and applet names share one
//! namespace on the platform.

/// Name of the synthetic inputs stage of an unlocked workflow.
pub const COMMON_STAGE: &str = "common";

/// Name of the output-collection stage, and the suffix of its applet.
pub const OUTPUT_SECTION: &str = "outputs";

/// Name of the reorganization stage appended on request.
pub const REORG_STAGE: &str = "reorg";

/// Fixed stage id of the output-collection stage.
pub const LAST_STAGE_ID: &str = "stage-last";

/// Prefix of compiler-generated temporaries introduced by the front end
/// when lifting complex expressions.
pub const GENERATED_VAR_PREFIX: &str = "xtmp";

/// Applet-name prefixes user call aliases must not use.
pub const RESERVED_PREFIXES: &[&str] = &["common", "eval", "if", "outputs", "reorg", "scatter"];

/// Substrings user call aliases must not contain; the triple underscore
/// separates name components in generated applet identifiers.
pub const RESERVED_SUBSTRINGS: &[&str] = &["___"];

/// Whether `name` is usable as a call (stage) name.
pub fn is_legal_call_name(name: &str) -> bool {
    if name == LAST_STAGE_ID {
        return false;
    }
    if RESERVED_PREFIXES.iter().any(|p| name.starts_with(p)) {
        return false;
    }
    !RESERVED_SUBSTRINGS.iter().any(|s| name.contains(s))
}
