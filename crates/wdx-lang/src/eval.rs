//! No-environment constant folding.
//!
//! Implements the "try to evaluate as constant" primitive used when
//! deciding applet defaults, call-input constants, and instance types.
//! An expression folds only when it can be evaluated with no environment
//! and no standard-library call: identifiers, member accesses, subscripts,
//! and function applications never fold. Arithmetic that would trap
//! (overflow, division by zero) folds to `None` rather than erroring; the
//! caller treats the expression as runtime-evaluated.

use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::value::Value;

/// Attempts to evaluate `expr` as a compile-time constant.
pub fn const_fold(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Boolean(b) => Some(Value::Boolean(*b)),
        Expr::Int(n) => Some(Value::Int(*n)),
        Expr::Float(x) => Some(Value::Float(*x)),
        Expr::String(s) => Some(Value::String(s.clone())),
        Expr::ArrayLit(items) => items
            .iter()
            .map(const_fold)
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        Expr::PairLit { left, right } => Some(Value::Pair(
            Box::new(const_fold(left)?),
            Box::new(const_fold(right)?),
        )),
        Expr::Unary { op, expr } => fold_unary(*op, const_fold(expr)?),
        Expr::Binary { op, left, right } => {
            fold_binary(*op, const_fold(left)?, const_fold(right)?)
        }
        Expr::IfThenElse {
            cond,
            then_expr,
            else_expr,
        } => match const_fold(cond)? {
            Value::Boolean(true) => const_fold(then_expr),
            Value::Boolean(false) => const_fold(else_expr),
            _ => None,
        },
        Expr::Ident(_) | Expr::Access { .. } | Expr::At { .. } | Expr::Apply { .. } => None,
    }
}

fn fold_unary(op: UnaryOp, value: Value) -> Option<Value> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(n)) => n.checked_neg().map(Value::Int),
        (UnaryOp::Neg, Value::Float(x)) => Some(Value::Float(-x)),
        (UnaryOp::Not, Value::Boolean(b)) => Some(Value::Boolean(!b)),
        _ => None,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

fn fold_binary(op: BinaryOp, left: Value, right: Value) -> Option<Value> {
    use BinaryOp::*;
    match op {
        Add | Sub | Mul | Div | Rem => fold_arith(op, left, right),
        Eq => Some(Value::Boolean(left == right)),
        Ne => Some(Value::Boolean(left != right)),
        Lt | Le | Gt | Ge => fold_compare(op, left, right),
        And | Or => match (left, right) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(Value::Boolean(match op {
                And => a && b,
                _ => a || b,
            })),
            _ => None,
        },
    }
}

fn fold_arith(op: BinaryOp, left: Value, right: Value) -> Option<Value> {
    use BinaryOp::*;
    // String concatenation is the only non-numeric arithmetic form.
    if let (Add, Value::String(a), Value::String(b)) = (op, &left, &right) {
        return Some(Value::String(format!("{}{}", a, b)));
    }
    if let (Value::Int(a), Value::Int(b)) = (&left, &right) {
        let (a, b) = (*a, *b);
        return match op {
            Add => a.checked_add(b),
            Sub => a.checked_sub(b),
            Mul => a.checked_mul(b),
            Div => a.checked_div(b),
            Rem => a.checked_rem(b),
            _ => unreachable!(),
        }
        .map(Value::Int);
    }
    let (a, b) = (as_f64(&left)?, as_f64(&right)?);
    let result = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => a / b,
        Rem => a % b,
        _ => unreachable!(),
    };
    result.is_finite().then(|| Value::Float(result))
}

fn fold_compare(op: BinaryOp, left: Value, right: Value) -> Option<Value> {
    use BinaryOp::*;
    let ordering = match (&left, &right) {
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => as_f64(&left)?.partial_cmp(&as_f64(&right)?),
    }?;
    let result = match op {
        Lt => ordering.is_lt(),
        Le => ordering.is_le(),
        Gt => ordering.is_gt(),
        Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Some(Value::Boolean(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_and_arithmetic_fold() {
        let expr = Expr::binary(
            BinaryOp::Add,
            Expr::Int(4),
            Expr::binary(BinaryOp::Mul, Expr::Int(2), Expr::Int(3)),
        );
        assert_eq!(const_fold(&expr), Some(Value::Int(10)));

        let mixed = Expr::binary(BinaryOp::Mul, Expr::Int(2), Expr::Float(1.5));
        assert_eq!(const_fold(&mixed), Some(Value::Float(3.0)));

        let concat = Expr::binary(
            BinaryOp::Add,
            Expr::String("2 ".into()),
            Expr::String("GB".into()),
        );
        assert_eq!(const_fold(&concat), Some(Value::String("2 GB".into())));
    }

    #[test]
    fn identifiers_and_calls_never_fold() {
        assert_eq!(const_fold(&Expr::ident("x")), None);
        assert_eq!(
            const_fold(&Expr::apply("size", vec![Expr::ident("input_file")])),
            None
        );
        let partial = Expr::binary(BinaryOp::Add, Expr::Int(1), Expr::ident("x"));
        assert_eq!(const_fold(&partial), None);
    }

    #[test]
    fn trapping_arithmetic_folds_to_none() {
        let div0 = Expr::binary(BinaryOp::Div, Expr::Int(1), Expr::Int(0));
        assert_eq!(const_fold(&div0), None);
        let overflow = Expr::binary(BinaryOp::Add, Expr::Int(i64::MAX), Expr::Int(1));
        assert_eq!(const_fold(&overflow), None);
    }

    #[test]
    fn conditionals_fold_through_the_taken_branch() {
        let expr = Expr::IfThenElse {
            cond: Box::new(Expr::binary(BinaryOp::Lt, Expr::Int(1), Expr::Int(2))),
            then_expr: Box::new(Expr::Int(10)),
            else_expr: Box::new(Expr::ident("x")),
        };
        assert_eq!(const_fold(&expr), Some(Value::Int(10)));
    }

    #[test]
    fn comparisons_fold_on_numbers_and_strings() {
        let lt = Expr::binary(BinaryOp::Lt, Expr::Int(1), Expr::Float(1.5));
        assert_eq!(const_fold(&lt), Some(Value::Boolean(true)));
        let ge = Expr::binary(
            BinaryOp::Ge,
            Expr::String("b".into()),
            Expr::String("a".into()),
        );
        assert_eq!(const_fold(&ge), Some(Value::Boolean(true)));
    }
}
