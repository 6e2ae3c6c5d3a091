//! Compile-time variables and stage arguments.
//!
//! A [`CVar`] is a typed variable as seen by the compiler; its
//! [`dx_name`](CVar::dx_name) is the sanitized form used at the platform
//! boundary, where dots are illegal. A [`SArg`] says how a stage input is
//! satisfied; a [`LinkedVar`] pairs the two, and [`CallEnv`] is the symbol
//! table threaded through backbone assembly.

use indexmap::IndexMap;
use serde::Serialize;

use wdx_lang::ast::DeclAttrs;
use wdx_lang::{Type, Value};

/// A typed compile-time variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CVar {
    /// Source-visible identifier, possibly dotted (`Add.result`).
    pub name: String,
    pub ty: Type,
    pub attrs: DeclAttrs,
    /// The original dotted name, when this variable propagates an unbound
    /// task input out of a block (`Inc.i` behind the flat `Inc_i`).
    pub original_fqn: Option<String>,
}

impl CVar {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
            attrs: DeclAttrs::default(),
            original_fqn: None,
        }
    }

    pub fn with_default(name: impl Into<String>, ty: Type, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            attrs: DeclAttrs {
                default: Some(default),
            },
            original_fqn: None,
        }
    }

    /// A propagated unbound call input: named `<call>_<input>`, remembering
    /// the dotted original for diagnostics.
    pub fn propagated(call: &str, input: &str, ty: Type) -> Self {
        Self {
            name: format!("{}_{}", call, input),
            ty,
            attrs: DeclAttrs::default(),
            original_fqn: Some(format!("{}.{}", call, input)),
        }
    }

    /// The platform-legal form of `name`: dots become underscores. This is
    /// a pure function of the name; distinct variables in one applet
    /// interface must not collide after sanitization.
    pub fn dx_name(&self) -> String {
        self.name.replace('.', "_")
    }
}

/// How a stage input is satisfied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SArg {
    /// No value supplied; the platform must provide one at runtime.
    Empty,
    /// A compile-time constant.
    Const(Value),
    /// Reads `cvar.name` from the named stage's outputs.
    Link { stage: String, cvar: CVar },
    /// Supplied as a workflow-level input.
    WorkflowInput(CVar),
}

/// A variable together with how it is satisfied in the current scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkedVar {
    pub cvar: CVar,
    pub sarg: SArg,
}

impl LinkedVar {
    pub fn new(cvar: CVar, sarg: SArg) -> Self {
        Self { cvar, sarg }
    }
}

/// Symbol table mapping fully qualified source names (`A`, `A.x`) to
/// linked variables. Insertion-ordered so debug dumps and closures are
/// deterministic; keys are unique.
pub type CallEnv = IndexMap<String, LinkedVar>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dx_name_sanitizes_dots() {
        assert_eq!(CVar::new("Add.result", Type::Int).dx_name(), "Add_result");
        assert_eq!(CVar::new("plain", Type::Int).dx_name(), "plain");
    }

    #[test]
    fn propagated_inputs_remember_their_origin() {
        let cvar = CVar::propagated("Inc", "i", Type::Int);
        assert_eq!(cvar.name, "Inc_i");
        assert_eq!(cvar.original_fqn.as_deref(), Some("Inc.i"));
        assert_eq!(cvar.dx_name(), "Inc_i");
    }
}
