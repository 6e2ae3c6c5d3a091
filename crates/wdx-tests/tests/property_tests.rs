//! Property tests for lowering invariants and determinism.

use proptest::prelude::*;
use proptest::test_runner::Config as ProptestConfig;

use wdx_compiler::{compile_namespace, CompileOptions, OfflineResolver, SelfContainedVerifier};
use wdx_ir::CVar;
use wdx_lang::ast::{Call, Declaration, Namespace, Task, Workflow, WorkflowElement, WorkflowOutput};
use wdx_lang::{BinaryOp, Expr, Type};
use wdx_tests::assert_invariants;

fn step_task() -> Task {
    Task {
        name: "Step".into(),
        declarations: vec![Declaration::unbound("i", Type::Int)],
        command: "echo ${i}".into(),
        outputs: vec![Declaration::bound(
            "result",
            Type::Int,
            Expr::apply("read_int", vec![Expr::apply("stdout", vec![])]),
        )],
        ..Task::default()
    }
}

/// Builds `A.B.C` chains back from their dotted form.
fn ref_expr(name: &str) -> Expr {
    let mut parts = name.split('.');
    let mut expr = Expr::ident(parts.next().unwrap_or_default());
    for part in parts {
        expr = Expr::access(expr, part);
    }
    expr
}

/// A chain of `Step` calls interleaved with evaluated temporaries, long
/// enough to exercise links across every block kind the backbone emits.
fn linear_workflow(calls: usize, with_outputs: bool) -> Namespace {
    let mut elements = vec![WorkflowElement::Decl(Declaration::unbound(
        "seed",
        Type::Int,
    ))];
    let mut prev = "seed".to_string();
    for n in 1..=calls {
        let call_name = format!("s{}", n);
        elements.push(WorkflowElement::Call(Call {
            task: "Step".into(),
            alias: Some(call_name.clone()),
            inputs: vec![("i".into(), ref_expr(&prev))],
            ..Call::default()
        }));
        if n % 2 == 1 {
            let tmp = format!("t{}", n);
            elements.push(WorkflowElement::Decl(Declaration::bound(
                tmp.clone(),
                Type::Int,
                Expr::binary(
                    BinaryOp::Add,
                    ref_expr(&format!("{}.result", call_name)),
                    Expr::Int(1),
                ),
            )));
            prev = tmp;
        } else {
            prev = format!("{}.result", call_name);
        }
    }
    let outputs = with_outputs.then(|| {
        vec![WorkflowOutput {
            pos: Default::default(),
            name: prev.clone(),
            ty: Type::Int,
            expr: ref_expr(&prev),
        }]
    });
    Namespace {
        tasks: vec![step_task()],
        workflow: Some(Workflow {
            name: "chain".into(),
            elements,
            outputs,
            ..Workflow::default()
        }),
    }
}

fn type_strategy() -> impl Strategy<Value = Type> {
    let leaf = prop_oneof![
        Just(Type::Boolean),
        Just(Type::Int),
        Just(Type::Float),
        Just(Type::String),
        Just(Type::File),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|t| Type::Array(Box::new(t))),
            // optionals never nest in valid source
            inner.clone().prop_map(|t| {
                if t.is_optional() {
                    t
                } else {
                    Type::Optional(Box::new(t))
                }
            }),
            (inner.clone(), inner)
                .prop_map(|(a, b)| Type::Pair(Box::new(a), Box::new(b))),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lowered_backbones_satisfy_link_arity_and_sanitation(
        calls in 1usize..5,
        locked in any::<bool>(),
        reorg in any::<bool>(),
        with_outputs in any::<bool>(),
    ) {
        let source = linear_workflow(calls, with_outputs);
        let options = CompileOptions { locked, reorg, ..CompileOptions::default() };
        let compiled =
            compile_namespace(&source, options, &OfflineResolver, &SelfContainedVerifier)
                .expect("linear chains always compile");
        assert_invariants(&compiled.namespace);

        let wf = compiled.namespace.workflow.as_ref().unwrap();
        prop_assert_eq!(wf.locked, locked);
        prop_assert_eq!(wf.stages.iter().filter(|s| s.name == "common").count(), usize::from(!locked));
    }

    #[test]
    fn compilation_is_deterministic(
        calls in 1usize..5,
        locked in any::<bool>(),
        reorg in any::<bool>(),
    ) {
        let source = linear_workflow(calls, true);
        let options = CompileOptions { locked, reorg, ..CompileOptions::default() };
        let first =
            compile_namespace(&source, options, &OfflineResolver, &SelfContainedVerifier).unwrap();
        let second =
            compile_namespace(&source, options, &OfflineResolver, &SelfContainedVerifier).unwrap();
        prop_assert_eq!(&first.namespace, &second.namespace);
        prop_assert_eq!(
            serde_json::to_string(&first.namespace).unwrap(),
            serde_json::to_string(&second.namespace).unwrap()
        );
    }

    #[test]
    fn optional_lifting_is_idempotent(ty in type_strategy()) {
        let once = ty.lifted_optional();
        let twice = once.lifted_optional();
        prop_assert_eq!(&once, &twice);
        prop_assert!(
            !matches!(&once, Type::Optional(inner) if inner.is_optional()),
            "lifting must not nest optionals"
        );
    }

    #[test]
    fn platform_names_never_carry_dots(
        parts in prop::collection::vec("[A-Za-z][A-Za-z0-9_]{0,6}", 1..4)
    ) {
        let cvar = CVar::new(parts.join("."), Type::Int);
        let dx_name = cvar.dx_name();
        prop_assert!(!dx_name.contains('.'));
        prop_assert_eq!(dx_name.clone(), CVar::new(cvar.name.clone(), Type::Int).dx_name());
    }
}
