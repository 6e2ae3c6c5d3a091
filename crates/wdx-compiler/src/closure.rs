//! Block closure analysis.
//!
//! The closure of a block is the set of free variables it must import
//! from the enclosing environment. Dotted references are resolved by
//! trail search: look the full chain up, then strip one trailing
//! component at a time until a hit. This unifies call-output references
//! (`A.B` where `A` is a stage and `B` an output) with structural member
//! navigation below a bound value. A name with no hit at any prefix is
//! defined inside the block itself and is not part of the closure.

use wdx_lang::Expr;

use wdx_ir::{CallEnv, LinkedVar};

use crate::expr_utils::referenced_names;

/// Prefix-stripping lookup of a dotted name. Returns the matched key and
/// its binding.
pub fn trail_search<'e>(env: &'e CallEnv, fqn: &str) -> Option<(&'e str, &'e LinkedVar)> {
    let mut key = fqn;
    loop {
        if let Some((matched, linked)) = env.get_key_value(key) {
            return Some((matched.as_str(), linked));
        }
        match key.rfind('.') {
            Some(dot) => key = &key[..dot],
            None => return None,
        }
    }
}

/// Computes the closure of a set of expressions against `env`. Entries
/// are keyed by the full matched name and ordered by first reference.
pub fn closure_of<'a>(exprs: impl IntoIterator<Item = &'a Expr>, env: &CallEnv) -> CallEnv {
    let mut closure = CallEnv::new();
    for expr in exprs {
        let (chains, idents) = referenced_names(expr);
        for chain in chains {
            if let Some((key, linked)) = trail_search(env, &chain) {
                if !closure.contains_key(key) {
                    closure.insert(key.to_string(), linked.clone());
                }
            }
        }
        for ident in idents {
            if let Some(linked) = env.get(&ident) {
                if !closure.contains_key(&ident) {
                    closure.insert(ident, linked.clone());
                }
            }
        }
    }
    closure
}

#[cfg(test)]
mod tests {
    use super::*;
    use wdx_ir::{CVar, SArg};
    use wdx_lang::{BinaryOp, Type};

    fn env_with(keys: &[&str]) -> CallEnv {
        let mut env = CallEnv::new();
        for key in keys {
            let cvar = CVar::new(key.rsplit('.').next().unwrap(), Type::Int);
            env.insert(
                key.to_string(),
                LinkedVar::new(cvar.clone(), SArg::WorkflowInput(cvar)),
            );
        }
        env
    }

    #[test]
    fn plain_identifiers_resolve_directly() {
        let env = env_with(&["ai"]);
        let expr = Expr::binary(BinaryOp::Add, Expr::ident("ai"), Expr::Int(1));
        let closure = closure_of([&expr], &env);
        assert_eq!(closure.keys().collect::<Vec<_>>(), vec!["ai"]);
    }

    #[test]
    fn trail_search_strips_trailing_components() {
        let env = env_with(&["A.B"]);
        assert_eq!(trail_search(&env, "A.B.C").map(|(k, _)| k), Some("A.B"));
        assert_eq!(trail_search(&env, "A.B").map(|(k, _)| k), Some("A.B"));
        assert_eq!(trail_search(&env, "A.x"), None);
    }

    #[test]
    fn chains_bind_under_their_matched_key() {
        let env = env_with(&["Add.result"]);
        let expr = Expr::access(Expr::ident("Add"), "result");
        let closure = closure_of([&expr], &env);
        assert_eq!(closure.keys().collect::<Vec<_>>(), vec!["Add.result"]);
    }

    #[test]
    fn locally_defined_names_stay_out_of_the_closure() {
        let env = env_with(&["nums"]);
        // Inc.result refers to a call inside the block; nums is imported.
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::access(Expr::ident("Inc"), "result"),
            Expr::ident("nums"),
        );
        let closure = closure_of([&expr], &env);
        assert_eq!(closure.keys().collect::<Vec<_>>(), vec!["nums"]);
    }

    #[test]
    fn closure_keeps_first_reference_order() {
        let env = env_with(&["b", "a"]);
        let first = Expr::ident("b");
        let second = Expr::binary(BinaryOp::Add, Expr::ident("a"), Expr::ident("b"));
        let closure = closure_of([&first, &second], &env);
        assert_eq!(closure.keys().collect::<Vec<_>>(), vec!["b", "a"]);
    }
}
