//! Expression utilities shared by the block compilers.
//!
//! Renaming is performed on the AST, never on serialized text: only a node
//! whose full identifier or member-access chain matches a key is replaced,
//! so string literals and identifiers that merely contain a renamed name
//! as a substring are untouched.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use wdx_lang::eval::const_fold;
use wdx_lang::{Expr, Value};

/// Attempts to evaluate `expr` with no environment; `Some` only for
/// compile-time constants.
pub fn try_const_eval(expr: &Expr) -> Option<Value> {
    const_fold(expr)
}

/// Enumerates the free names of `expr`: member-access chains in dotted
/// form, then plain identifiers. Each list is deduplicated and ordered by
/// first occurrence, left to right.
pub fn referenced_names(expr: &Expr) -> (Vec<String>, Vec<String>) {
    let mut chains = Vec::new();
    let mut idents = Vec::new();
    let mut seen = FxHashSet::default();
    collect_names(expr, &mut chains, &mut idents, &mut seen);
    (chains, idents)
}

fn collect_names(
    expr: &Expr,
    chains: &mut Vec<String>,
    idents: &mut Vec<String>,
    seen: &mut FxHashSet<String>,
) {
    match expr {
        Expr::Ident(name) => {
            if seen.insert(name.clone()) {
                idents.push(name.clone());
            }
        }
        Expr::Access { target, .. } => match expr.as_access_chain() {
            Some(chain) => {
                if seen.insert(chain.clone()) {
                    chains.push(chain);
                }
            }
            // Field access off a non-chain target (a call result, an
            // indexed element); only the target can reference names.
            None => collect_names(target, chains, idents, seen),
        },
        Expr::At { target, index } => {
            collect_names(target, chains, idents, seen);
            collect_names(index, chains, idents, seen);
        }
        Expr::Apply { args, .. } => {
            for arg in args {
                collect_names(arg, chains, idents, seen);
            }
        }
        Expr::Unary { expr, .. } => collect_names(expr, chains, idents, seen),
        Expr::Binary { left, right, .. } => {
            collect_names(left, chains, idents, seen);
            collect_names(right, chains, idents, seen);
        }
        Expr::ArrayLit(items) => {
            for item in items {
                collect_names(item, chains, idents, seen);
            }
        }
        Expr::PairLit { left, right } => {
            collect_names(left, chains, idents, seen);
            collect_names(right, chains, idents, seen);
        }
        Expr::IfThenElse {
            cond,
            then_expr,
            else_expr,
        } => {
            collect_names(cond, chains, idents, seen);
            collect_names(then_expr, chains, idents, seen);
            collect_names(else_expr, chains, idents, seen);
        }
        Expr::Boolean(_) | Expr::Int(_) | Expr::Float(_) | Expr::String(_) => {}
    }
}

/// Whether an expression references nothing at all: no identifiers,
/// member accesses, subscripts, or function applications anywhere. A
/// reference-free expression is expected to fold to a constant.
pub fn is_reference_free(expr: &Expr) -> bool {
    match expr {
        Expr::Boolean(_) | Expr::Int(_) | Expr::Float(_) | Expr::String(_) => true,
        Expr::Ident(_) | Expr::Access { .. } | Expr::At { .. } | Expr::Apply { .. } => false,
        Expr::Unary { expr, .. } => is_reference_free(expr),
        Expr::Binary { left, right, .. } => is_reference_free(left) && is_reference_free(right),
        Expr::ArrayLit(items) => items.iter().all(is_reference_free),
        Expr::PairLit { left, right } => is_reference_free(left) && is_reference_free(right),
        Expr::IfThenElse {
            cond,
            then_expr,
            else_expr,
        } => {
            is_reference_free(cond) && is_reference_free(then_expr) && is_reference_free(else_expr)
        }
    }
}

/// Rewrites every occurrence of a renamed variable. A node whose dotted
/// chain equals a key becomes a flat identifier; longer chains are
/// rewritten at their longest renamed prefix.
pub fn rename_free_vars(expr: &Expr, renames: &IndexMap<String, String>) -> Expr {
    if let Some(chain) = expr.as_access_chain() {
        if let Some(new_name) = renames.get(&chain) {
            return Expr::Ident(new_name.clone());
        }
    }
    match expr {
        Expr::Access { target, field } => Expr::Access {
            target: Box::new(rename_free_vars(target, renames)),
            field: field.clone(),
        },
        Expr::At { target, index } => Expr::At {
            target: Box::new(rename_free_vars(target, renames)),
            index: Box::new(rename_free_vars(index, renames)),
        },
        Expr::Apply { func, args } => Expr::Apply {
            func: func.clone(),
            args: args.iter().map(|arg| rename_free_vars(arg, renames)).collect(),
        },
        Expr::Unary { op, expr } => Expr::Unary {
            op: *op,
            expr: Box::new(rename_free_vars(expr, renames)),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(rename_free_vars(left, renames)),
            right: Box::new(rename_free_vars(right, renames)),
        },
        Expr::ArrayLit(items) => Expr::ArrayLit(
            items.iter().map(|item| rename_free_vars(item, renames)).collect(),
        ),
        Expr::PairLit { left, right } => Expr::PairLit {
            left: Box::new(rename_free_vars(left, renames)),
            right: Box::new(rename_free_vars(right, renames)),
        },
        Expr::IfThenElse {
            cond,
            then_expr,
            else_expr,
        } => Expr::IfThenElse {
            cond: Box::new(rename_free_vars(cond, renames)),
            then_expr: Box::new(rename_free_vars(then_expr, renames)),
            else_expr: Box::new(rename_free_vars(else_expr, renames)),
        },
        Expr::Boolean(_) | Expr::Int(_) | Expr::Float(_) | Expr::String(_) | Expr::Ident(_) => {
            expr.clone()
        }
    }
}

/// Re-expresses a constant value as a literal expression, for synthesized
/// fragment declarations.
pub(crate) fn value_expr(value: &Value) -> Expr {
    match value {
        Value::Boolean(b) => Expr::Boolean(*b),
        Value::Int(n) => Expr::Int(*n),
        Value::Float(x) => Expr::Float(*x),
        Value::String(s) | Value::File(s) => Expr::String(s.clone()),
        Value::Array(items) => Expr::ArrayLit(items.iter().map(value_expr).collect()),
        Value::Pair(left, right) => Expr::PairLit {
            left: Box::new(value_expr(left)),
            right: Box::new(value_expr(right)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wdx_lang::BinaryOp;

    #[test]
    fn referenced_names_splits_chains_and_idents() {
        // Add.result + nums[k]
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::access(Expr::ident("Add"), "result"),
            Expr::At {
                target: Box::new(Expr::ident("nums")),
                index: Box::new(Expr::ident("k")),
            },
        );
        let (chains, idents) = referenced_names(&expr);
        assert_eq!(chains, vec!["Add.result"]);
        assert_eq!(idents, vec!["nums", "k"]);
    }

    #[test]
    fn referenced_names_deduplicates_in_order() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::ident("y")),
            Expr::ident("x"),
        );
        let (chains, idents) = referenced_names(&expr);
        assert!(chains.is_empty());
        assert_eq!(idents, vec!["x", "y"]);
    }

    #[test]
    fn rename_rewrites_whole_chains_only() {
        let mut renames = IndexMap::new();
        renames.insert("Add.result".to_string(), "Add_result".to_string());
        renames.insert("x".to_string(), "x_in".to_string());

        // Add.result + x, with a string literal mentioning x
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::binary(
                BinaryOp::Add,
                Expr::access(Expr::ident("Add"), "result"),
                Expr::ident("x"),
            ),
            Expr::String("x marks the spot".into()),
        );
        let renamed = rename_free_vars(&expr, &renames);
        let text = wdx_lang::print::expression(&renamed);
        assert_eq!(text, "(Add_result + x_in) + \"x marks the spot\"");
    }

    #[test]
    fn rename_leaves_longer_identifiers_alone() {
        let mut renames = IndexMap::new();
        renames.insert("x".to_string(), "x_in".to_string());
        let expr = Expr::binary(BinaryOp::Add, Expr::ident("x"), Expr::ident("xs"));
        let renamed = rename_free_vars(&expr, &renames);
        assert_eq!(wdx_lang::print::expression(&renamed), "x_in + xs");
    }

    #[test]
    fn rename_uses_longest_matching_prefix() {
        let mut renames = IndexMap::new();
        renames.insert("A.b".to_string(), "A_b".to_string());
        // A.b.c is not itself renamed, so the prefix A.b is
        let expr = Expr::access(Expr::access(Expr::ident("A"), "b"), "c");
        let renamed = rename_free_vars(&expr, &renames);
        assert_eq!(wdx_lang::print::expression(&renamed), "A_b.c");
    }
}
