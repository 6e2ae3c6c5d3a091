//! Workflow body partitioning.
//!
//! The body is segmented into an ordered sequence of blocks, each of which
//! lowers to one stage. A run of declarations immediately preceding a
//! scatter or conditional is absorbed into that block, so the run can be
//! evaluated inside the same synthetic applet and a stage is saved.

use wdx_lang::ast::{Call, Conditional, Declaration, Scatter, WorkflowElement};

/// One schedulable segment of a workflow body.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// A maximal run of consecutive declarations not immediately followed
    /// by a scatter or conditional.
    DeclRun(Vec<Declaration>),
    /// A scatter, with any immediately preceding declaration run.
    ScatterBlock {
        decls: Vec<Declaration>,
        scatter: Scatter,
    },
    /// A conditional, with any immediately preceding declaration run.
    CondBlock {
        decls: Vec<Declaration>,
        cond: Conditional,
    },
    /// A single call.
    CallBlock(Call),
}

/// Segments `elements` into blocks, in order.
pub fn partition(elements: &[WorkflowElement]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut pending: Vec<Declaration> = Vec::new();

    for element in elements {
        match element {
            WorkflowElement::Decl(decl) => pending.push(decl.clone()),
            WorkflowElement::Scatter(scatter) => blocks.push(Block::ScatterBlock {
                decls: std::mem::take(&mut pending),
                scatter: scatter.clone(),
            }),
            WorkflowElement::Conditional(cond) => blocks.push(Block::CondBlock {
                decls: std::mem::take(&mut pending),
                cond: cond.clone(),
            }),
            WorkflowElement::Call(call) => {
                if !pending.is_empty() {
                    blocks.push(Block::DeclRun(std::mem::take(&mut pending)));
                }
                blocks.push(Block::CallBlock(call.clone()));
            }
        }
    }
    if !pending.is_empty() {
        blocks.push(Block::DeclRun(pending));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use wdx_lang::{Expr, Type};

    fn decl(name: &str) -> WorkflowElement {
        WorkflowElement::Decl(Declaration::bound(name, Type::Int, Expr::Int(0)))
    }

    fn call(task: &str) -> WorkflowElement {
        WorkflowElement::Call(Call {
            task: task.into(),
            ..Call::default()
        })
    }

    fn scatter() -> WorkflowElement {
        WorkflowElement::Scatter(Scatter {
            pos: Default::default(),
            item: "k".into(),
            collection: Expr::ident("xs"),
            body: vec![],
        })
    }

    fn conditional() -> WorkflowElement {
        WorkflowElement::Conditional(Conditional {
            pos: Default::default(),
            condition: Expr::Boolean(true),
            body: vec![],
        })
    }

    #[test]
    fn declarations_before_a_call_form_their_own_run() {
        let blocks = partition(&[decl("a"), decl("b"), call("Add")]);
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[0], Block::DeclRun(decls) if decls.len() == 2));
        assert!(matches!(&blocks[1], Block::CallBlock(c) if c.task == "Add"));
    }

    #[test]
    fn declarations_before_a_scatter_are_absorbed() {
        let blocks = partition(&[decl("a"), scatter(), call("Add")]);
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[0], Block::ScatterBlock { decls, .. } if decls.len() == 1));
        assert!(matches!(&blocks[1], Block::CallBlock(_)));
    }

    #[test]
    fn declarations_before_a_conditional_are_absorbed() {
        let blocks = partition(&[call("Add"), decl("f0"), decl("f1"), conditional()]);
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[1], Block::CondBlock { decls, .. } if decls.len() == 2));
    }

    #[test]
    fn trailing_declarations_are_flushed() {
        let blocks = partition(&[call("Add"), decl("x")]);
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[1], Block::DeclRun(decls) if decls.len() == 1));
    }

    #[test]
    fn empty_body_partitions_to_nothing() {
        assert!(partition(&[]).is_empty());
    }
}
