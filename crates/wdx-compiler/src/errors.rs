//! Error and diagnostic types for the lowering pass.
//!
//! Errors are raised eagerly at the site of detection and abort the pass;
//! no partial namespace is ever returned. Non-fatal findings are collected
//! as [`CompileWarning`]s and handed back alongside the result.

use std::fmt;

use thiserror::Error;

use wdx_ir::IrError;
use wdx_lang::SourcePosition;

/// Errors that abort compilation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CompileError {
    /// Reference to a name absent from the environment.
    #[error("undefined symbol: {0}")]
    UndefinedSymbol(String),

    /// Call alias collides with a reserved prefix, substring, or the
    /// last-stage marker.
    #[error("illegal call name: {0}")]
    IllegalCallName(String),

    /// Construct the lowering cannot express (declaration after a call in
    /// a block body, call to a non-task, nested blocks, unlifted
    /// collections).
    #[error("unsupported construct: {0}")]
    Unsupported(String),

    /// A required call input is missing in a locked workflow.
    #[error("missing required call input: {0}")]
    MissingInput(String),

    /// A call input argument is neither a constant nor a variable
    /// reference; the front end is required to have lifted these out.
    #[error("call input is neither a constant nor a variable: {0}")]
    NonConstInput(String),

    /// A workflow-input declaration carries a non-constant default.
    #[error("workflow input default is not a constant: {0}")]
    NonConstDefault(String),

    /// A synthesized fragment failed the external re-parse check. The
    /// offending source text is carried for debugging.
    #[error("generated fragment is not legal source: {reason}\n--- fragment ---\n{fragment}")]
    IllegalFragment { reason: String, fragment: String },

    /// A call targets a callable that does not exist.
    #[error("call target not found: {0}")]
    UnresolvedCall(String),

    /// The callables reference each other cyclically.
    #[error("callable dependency cycle involving: {0}")]
    CallableCycle(String),

    /// The platform resolver failed to map a URL to a record id.
    #[error("platform lookup failed: {0}")]
    Platform(String),

    #[error(transparent)]
    Ir(#[from] IrError),

    /// Invariant violation inside the compiler (not a user error).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Severity of a non-fatal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    Warning,
    Information,
}

/// Stable diagnostic code: a required call input was left unbound in an
/// unlocked workflow and will be supplied at runtime.
pub const WARN_MISSING_CALL_INPUT: &str = "missing_call_input";
/// Stable diagnostic code: per-compilation summary emitted at verbose
/// level.
pub const INFO_COMPILE_SUMMARY: &str = "compile_summary";

/// A non-fatal diagnostic collected during compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileWarning {
    pub code: &'static str,
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub pos: Option<SourcePosition>,
}

impl CompileWarning {
    pub fn warning(code: &'static str, message: impl Into<String>, pos: SourcePosition) -> Self {
        Self {
            code,
            severity: DiagnosticSeverity::Warning,
            message: message.into(),
            pos: Some(pos),
        }
    }

    pub fn info(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: DiagnosticSeverity::Information,
            message: message.into(),
            pos: None,
        }
    }
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity {
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Information => "info",
        };
        write!(f, "{}[{}]: {}", kind, self.code, self.message)?;
        if let Some(pos) = self.pos {
            write!(f, " (at {})", pos)?;
        }
        Ok(())
    }
}

/// Formats a position suffix for error messages; empty for synthesized
/// nodes with no position.
pub(crate) fn at(pos: SourcePosition) -> String {
    if pos == SourcePosition::unknown() {
        String::new()
    } else {
        format!(" (at {})", pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_render_with_code_and_position() {
        let warning = CompileWarning::warning(
            WARN_MISSING_CALL_INPUT,
            "call 'Add' leaves input 'b' unbound",
            SourcePosition::new(3, 5),
        );
        assert_eq!(
            warning.to_string(),
            "warning[missing_call_input]: call 'Add' leaves input 'b' unbound (at 3:5)"
        );
    }
}
