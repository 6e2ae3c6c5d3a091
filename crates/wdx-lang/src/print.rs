//! Deterministic source emission.
//!
//! Every applet carries a self-contained namespace fragment; this module
//! turns such fragments back into source text, both for embedding and for
//! the external re-parse check. Output is a pure function of the AST: two
//! equal fragments always print byte-identically.

use std::fmt::Write;

use crate::ast::{
    Call, Conditional, Declaration, Namespace, Scatter, Task, Workflow, WorkflowElement,
};
use crate::expr::Expr;

const INDENT: &str = "  ";

/// Renders a namespace fragment as source text.
pub fn namespace(ns: &Namespace) -> String {
    let mut out = String::new();
    for task in &ns.tasks {
        write_task(&mut out, task);
        out.push('\n');
    }
    if let Some(wf) = &ns.workflow {
        write_workflow(&mut out, wf);
    }
    out
}

/// Renders a single expression as source text.
pub fn expression(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn pad(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_task(out: &mut String, task: &Task) {
    let _ = writeln!(out, "task {} {{", task.name);
    for decl in &task.declarations {
        pad(out, 1);
        write_decl(out, decl);
        out.push('\n');
    }
    if !task.command.is_empty() {
        pad(out, 1);
        out.push_str("command {\n");
        for line in task.command.lines() {
            pad(out, 2);
            out.push_str(line);
            out.push('\n');
        }
        pad(out, 1);
        out.push_str("}\n");
    }
    if !task.runtime.is_empty() {
        pad(out, 1);
        out.push_str("runtime {\n");
        for (key, expr) in &task.runtime {
            pad(out, 2);
            let _ = write!(out, "{}: ", key);
            write_expr(out, expr);
            out.push('\n');
        }
        pad(out, 1);
        out.push_str("}\n");
    }
    if !task.meta.is_empty() {
        pad(out, 1);
        out.push_str("meta {\n");
        for (key, value) in &task.meta {
            pad(out, 2);
            let _ = writeln!(out, "{}: \"{}\"", key, value);
        }
        pad(out, 1);
        out.push_str("}\n");
    }
    if !task.outputs.is_empty() {
        pad(out, 1);
        out.push_str("output {\n");
        for decl in &task.outputs {
            pad(out, 2);
            write_decl(out, decl);
            out.push('\n');
        }
        pad(out, 1);
        out.push_str("}\n");
    }
    out.push_str("}\n");
}

fn write_workflow(out: &mut String, wf: &Workflow) {
    let _ = writeln!(out, "workflow {} {{", wf.name);
    for element in &wf.elements {
        write_element(out, element, 1);
    }
    if let Some(outputs) = &wf.outputs {
        pad(out, 1);
        out.push_str("output {\n");
        for output in outputs {
            pad(out, 2);
            let _ = write!(out, "{} {} = ", output.ty, output.name);
            write_expr(out, &output.expr);
            out.push('\n');
        }
        pad(out, 1);
        out.push_str("}\n");
    }
    out.push_str("}\n");
}

fn write_element(out: &mut String, element: &WorkflowElement, depth: usize) {
    match element {
        WorkflowElement::Decl(decl) => {
            pad(out, depth);
            write_decl(out, decl);
            out.push('\n');
        }
        WorkflowElement::Call(call) => {
            pad(out, depth);
            write_call(out, call);
            out.push('\n');
        }
        WorkflowElement::Scatter(scatter) => write_scatter(out, scatter, depth),
        WorkflowElement::Conditional(cond) => write_conditional(out, cond, depth),
    }
}

fn write_decl(out: &mut String, decl: &Declaration) {
    let _ = write!(out, "{} {}", decl.ty, decl.name);
    if let Some(expr) = &decl.expr {
        out.push_str(" = ");
        write_expr(out, expr);
    }
}

fn write_call(out: &mut String, call: &Call) {
    let _ = write!(out, "call {}", call.task);
    if let Some(alias) = &call.alias {
        let _ = write!(out, " as {}", alias);
    }
    if !call.inputs.is_empty() {
        out.push_str(" { input: ");
        for (i, (name, expr)) in call.inputs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{} = ", name);
            write_expr(out, expr);
        }
        out.push_str(" }");
    }
}

fn write_scatter(out: &mut String, scatter: &Scatter, depth: usize) {
    pad(out, depth);
    let _ = write!(out, "scatter ({} in ", scatter.item);
    write_expr(out, &scatter.collection);
    out.push_str(") {\n");
    for element in &scatter.body {
        write_element(out, element, depth + 1);
    }
    pad(out, depth);
    out.push_str("}\n");
}

fn write_conditional(out: &mut String, cond: &Conditional, depth: usize) {
    pad(out, depth);
    out.push_str("if (");
    write_expr(out, &cond.condition);
    out.push_str(") {\n");
    for element in &cond.body {
        write_element(out, element, depth + 1);
    }
    pad(out, depth);
    out.push_str("}\n");
}

/// Operands of binary and conditional expressions are parenthesized when
/// they are themselves compound, which keeps emission independent of
/// operator precedence.
fn write_operand(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Binary { .. } | Expr::IfThenElse { .. } => {
            out.push('(');
            write_expr(out, expr);
            out.push(')');
        }
        _ => write_expr(out, expr),
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Boolean(b) => {
            let _ = write!(out, "{}", b);
        }
        Expr::Int(n) => {
            let _ = write!(out, "{}", n);
        }
        Expr::Float(x) => {
            let _ = write!(out, "{}", x);
        }
        Expr::String(s) => {
            let _ = write!(out, "{}", crate::value::Value::String(s.clone()));
        }
        Expr::Ident(name) => out.push_str(name),
        Expr::Access { target, field } => {
            write_operand(out, target);
            out.push('.');
            out.push_str(field);
        }
        Expr::At { target, index } => {
            write_operand(out, target);
            out.push('[');
            write_expr(out, index);
            out.push(']');
        }
        Expr::Apply { func, args } => {
            out.push_str(func);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, arg);
            }
            out.push(')');
        }
        Expr::Unary { op, expr } => {
            let _ = write!(out, "{}", op);
            write_operand(out, expr);
        }
        Expr::Binary { op, left, right } => {
            write_operand(out, left);
            let _ = write!(out, " {} ", op);
            write_operand(out, right);
        }
        Expr::ArrayLit(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, item);
            }
            out.push(']');
        }
        Expr::PairLit { left, right } => {
            out.push('(');
            write_expr(out, left);
            out.push_str(", ");
            write_expr(out, right);
            out.push(')');
        }
        Expr::IfThenElse {
            cond,
            then_expr,
            else_expr,
        } => {
            out.push_str("if ");
            write_operand(out, cond);
            out.push_str(" then ");
            write_operand(out, then_expr);
            out.push_str(" else ");
            write_operand(out, else_expr);
        }
    }
}
