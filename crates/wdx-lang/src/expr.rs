//! Workflow expression AST.
//!
//! Expressions appear in declarations, call input mappings, scatter
//! collections, conditional guards, and workflow outputs. Nodes carry no
//! source positions; positions live on the enclosing AST statement.

use std::fmt;

use serde::Serialize;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    /// Arithmetic negation (-)
    Neg,
    /// Logical negation (!)
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", op)
    }
}

/// An expression in the workflow language.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// Boolean literal
    Boolean(bool),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    String(String),
    /// Variable reference
    Ident(String),
    /// Member access (`target.field`)
    Access { target: Box<Expr>, field: String },
    /// Array subscript (`target[index]`)
    At { target: Box<Expr>, index: Box<Expr> },
    /// Standard-library function call
    Apply { func: String, args: Vec<Expr> },
    /// Unary operation
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// Binary operation
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Array literal
    ArrayLit(Vec<Expr>),
    /// Pair literal (`(left, right)`)
    PairLit { left: Box<Expr>, right: Box<Expr> },
    /// Conditional expression (`if cond then a else b`)
    IfThenElse {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn access(target: Expr, field: impl Into<String>) -> Expr {
        Expr::Access {
            target: Box::new(target),
            field: field.into(),
        }
    }

    pub fn apply(func: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Apply {
            func: func.into(),
            args,
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The dotted form `A.B.C` when this node is an identifier or a
    /// member-access chain rooted at one; `None` for any other shape.
    pub fn as_access_chain(&self) -> Option<String> {
        match self {
            Expr::Ident(name) => Some(name.clone()),
            Expr::Access { target, field } => target.as_access_chain().map(|mut chain| {
                chain.push('.');
                chain.push_str(field);
                chain
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_chains_flatten_to_dotted_names() {
        let expr = Expr::access(Expr::access(Expr::ident("A"), "B"), "C");
        assert_eq!(expr.as_access_chain().as_deref(), Some("A.B.C"));
        assert_eq!(Expr::ident("x").as_access_chain().as_deref(), Some("x"));
    }

    #[test]
    fn non_chain_shapes_are_rejected() {
        let indexed = Expr::At {
            target: Box::new(Expr::ident("xs")),
            index: Box::new(Expr::Int(0)),
        };
        assert_eq!(indexed.as_access_chain(), None);

        let through_call = Expr::access(Expr::apply("select_first", vec![]), "field");
        assert_eq!(through_call.as_access_chain(), None);
    }
}
