//! Abstract syntax tree for a validated workflow namespace.
//!
//! A namespace holds leaf tasks and at most one workflow. The workflow body
//! is an ordered sequence of declarations, calls, scatter blocks, and
//! conditional blocks. The AST arrives parsed and type-checked; this crate
//! only represents it and re-emits it (see [`crate::print`]).

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::expr::Expr;
use crate::types::Type;
use crate::value::Value;

/// 1-based source position carried by AST statements for diagnostics.
///
/// Synthesized nodes use [`SourcePosition::unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourcePosition {
    pub line: u32,
    pub column: u32,
}

impl SourcePosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Position for nodes synthesized by the compiler.
    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Declaration attributes. `default` records a constant default value for
/// declarations promoted to applet or workflow inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeclAttrs {
    pub default: Option<Value>,
}

/// A typed declaration, optionally initialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Declaration {
    pub pos: SourcePosition,
    pub name: String,
    pub ty: Type,
    pub expr: Option<Expr>,
    pub attrs: DeclAttrs,
}

impl Declaration {
    /// An unassigned declaration (`Int x`).
    pub fn unbound(name: impl Into<String>, ty: Type) -> Self {
        Self {
            pos: SourcePosition::unknown(),
            name: name.into(),
            ty,
            expr: None,
            attrs: DeclAttrs::default(),
        }
    }

    /// An initialized declaration (`Int x = expr`).
    pub fn bound(name: impl Into<String>, ty: Type, expr: Expr) -> Self {
        Self {
            pos: SourcePosition::unknown(),
            name: name.into(),
            ty,
            expr: Some(expr),
            attrs: DeclAttrs::default(),
        }
    }
}

/// A call to a task, optionally aliased, with named input mappings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Call {
    pub pos: SourcePosition,
    pub task: String,
    pub alias: Option<String>,
    pub inputs: Vec<(String, Expr)>,
}

impl Call {
    /// The name this call is addressed by: the alias if present, otherwise
    /// the task name.
    pub fn call_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.task)
    }

    pub fn input(&self, name: &str) -> Option<&Expr> {
        self.inputs
            .iter()
            .find(|(input, _)| input == name)
            .map(|(_, expr)| expr)
    }
}

/// A scatter block: `scatter (item in collection) { body }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scatter {
    pub pos: SourcePosition,
    pub item: String,
    pub collection: Expr,
    pub body: Vec<WorkflowElement>,
}

/// A conditional block: `if (condition) { body }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conditional {
    pub pos: SourcePosition,
    pub condition: Expr,
    pub body: Vec<WorkflowElement>,
}

/// One element of a workflow (or block) body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WorkflowElement {
    Decl(Declaration),
    Call(Call),
    Scatter(Scatter),
    Conditional(Conditional),
}

/// A workflow output declaration. `name` may be dotted when the front end
/// derived it from a call-output reference (`Add.result`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowOutput {
    pub pos: SourcePosition,
    pub name: String,
    pub ty: Type,
    pub expr: Expr,
}

/// A workflow definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Workflow {
    pub pos: SourcePosition,
    pub name: String,
    pub elements: Vec<WorkflowElement>,
    /// Explicit output section, when the source declared one.
    pub outputs: Option<Vec<WorkflowOutput>>,
}

/// A task definition: the leaf executable unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Task {
    pub pos: SourcePosition,
    pub name: String,
    pub declarations: Vec<Declaration>,
    /// Raw command section text. Empty for interface stubs.
    pub command: String,
    /// Runtime attributes (`docker`, `memory`, `disks`, `cpu`, ...) in
    /// source order.
    pub runtime: IndexMap<String, Expr>,
    /// Meta attributes in source order.
    pub meta: IndexMap<String, String>,
    pub outputs: Vec<Declaration>,
}

/// A parsed, validated namespace: tasks plus at most one workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Namespace {
    pub tasks: Vec<Task>,
    pub workflow: Option<Workflow>,
}

impl Namespace {
    pub fn find_task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_name_prefers_alias() {
        let plain = Call {
            task: "Add".into(),
            ..Call::default()
        };
        assert_eq!(plain.call_name(), "Add");

        let aliased = Call {
            task: "Add".into(),
            alias: Some("a1".into()),
            ..Call::default()
        };
        assert_eq!(aliased.call_name(), "a1");
    }

    #[test]
    fn namespace_lookup_by_task_name() {
        let ns = Namespace {
            tasks: vec![
                Task {
                    name: "Add".into(),
                    ..Task::default()
                },
                Task {
                    name: "Mul".into(),
                    ..Task::default()
                },
            ],
            workflow: None,
        };
        assert_eq!(ns.find_task("Mul").map(|t| t.name.as_str()), Some("Mul"));
        assert!(ns.find_task("Sub").is_none());
    }
}
