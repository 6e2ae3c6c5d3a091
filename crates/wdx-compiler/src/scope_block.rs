//! Scatter and conditional lowering.
//!
//! Both block kinds compile the same way: compute the closure over every
//! expression the block evaluates, synthesize an applet whose fragment
//! re-runs the block against sanitized inputs, and lift the output types
//! across the block boundary. A scatter lifts `T` to `Array[T]`; a
//! conditional lifts `T` to `T?`. The differences beyond that are the
//! controlling expression (collection vs. guard) and the scatter's
//! collect-mode fallback for outputs the platform cannot hold natively.

use indexmap::IndexMap;

use wdx_ir::reserved::GENERATED_VAR_PREFIX;
use wdx_ir::{
    Applet, AppletKind, CVar, CallEnv, CallTable, DockerImage, InstanceType, SArg, Stage, StageId,
};
use wdx_lang::ast::{Call, Conditional, Declaration, Namespace, Scatter, WorkflowElement};
use wdx_lang::{print, Expr, SourcePosition, Type};

use crate::call::is_required;
use crate::closure::closure_of;
use crate::errors::{at, CompileError, CompileWarning, WARN_MISSING_CALL_INPUT};
use crate::eval_block::{
    closure_interface, fragment_workflow, input_decls, stub_task, verify_fragment,
};
use crate::expr_utils::rename_free_vars;
use crate::platform::FragmentVerifier;

/// Lowers a scatter (with any absorbed preceding declarations) to a stage
/// and applet. The collection must already be a bare variable; the front
/// end lifts complex collections into a preceding declaration.
#[allow(clippy::too_many_arguments)]
pub fn compile_scatter(
    pre_decls: &[Declaration],
    scatter: &Scatter,
    env: &CallEnv,
    task_applets: &IndexMap<String, Applet>,
    locked: bool,
    stage_name: String,
    applet_name: String,
    id: StageId,
    verifier: &dyn FragmentVerifier,
    warnings: &mut Vec<CompileWarning>,
) -> Result<(Stage, Applet), CompileError> {
    if !matches!(scatter.collection, Expr::Ident(_)) {
        return Err(CompileError::Unsupported(format!(
            "scatter collection '{}' has not been lifted to a variable{}",
            print::expression(&scatter.collection),
            at(scatter.pos)
        )));
    }
    let (body_decls, calls) = split_body(&scatter.body, scatter.pos)?;

    let closure = closure_of(
        block_exprs(pre_decls, &scatter.collection, &body_decls, &calls),
        env,
    );
    let (closure_inputs, renames) = closure_interface(&closure);
    let extras = propagate_unbound_inputs(&calls, task_applets, &closure_inputs, locked, warnings)?;

    let mut inputs = closure_inputs;
    inputs.extend(extras.iter().map(|(_, _, cvar)| cvar.clone()));

    let outputs = block_outputs(
        pre_decls,
        &calls,
        &body_decls,
        task_applets,
        Type::lifted_array,
    )?;

    let mut elements = input_decls(&inputs);
    elements.extend(renamed_decls(pre_decls, &renames));
    elements.push(WorkflowElement::Scatter(Scatter {
        pos: SourcePosition::unknown(),
        item: scatter.item.clone(),
        collection: rename_free_vars(&scatter.collection, &renames),
        body: renamed_body(&body_decls, &calls, &renames, &extras),
    }));
    let fragment = Namespace {
        tasks: stubs(&calls, task_applets)?,
        workflow: Some(fragment_workflow(&applet_name, elements, None)),
    };
    verify_fragment(&fragment, verifier)?;

    let table = call_table(&calls);
    let kind = if outputs.iter().all(|cvar| cvar.ty.is_native()) {
        AppletKind::Scatter(table)
    } else {
        AppletKind::ScatterCollect(table)
    };

    finish(
        stage_name,
        applet_name,
        id,
        inputs,
        outputs,
        kind,
        fragment,
        &closure,
        extras.len(),
    )
}

/// Lowers a conditional (with any absorbed preceding declarations) to a
/// stage and applet.
#[allow(clippy::too_many_arguments)]
pub fn compile_if(
    pre_decls: &[Declaration],
    cond: &Conditional,
    env: &CallEnv,
    task_applets: &IndexMap<String, Applet>,
    locked: bool,
    stage_name: String,
    applet_name: String,
    id: StageId,
    verifier: &dyn FragmentVerifier,
    warnings: &mut Vec<CompileWarning>,
) -> Result<(Stage, Applet), CompileError> {
    let (body_decls, calls) = split_body(&cond.body, cond.pos)?;

    let closure = closure_of(
        block_exprs(pre_decls, &cond.condition, &body_decls, &calls),
        env,
    );
    let (closure_inputs, renames) = closure_interface(&closure);
    let extras = propagate_unbound_inputs(&calls, task_applets, &closure_inputs, locked, warnings)?;

    let mut inputs = closure_inputs;
    inputs.extend(extras.iter().map(|(_, _, cvar)| cvar.clone()));

    let outputs = block_outputs(
        pre_decls,
        &calls,
        &body_decls,
        task_applets,
        Type::lifted_optional,
    )?;

    let mut elements = input_decls(&inputs);
    elements.extend(renamed_decls(pre_decls, &renames));
    elements.push(WorkflowElement::Conditional(Conditional {
        pos: SourcePosition::unknown(),
        condition: rename_free_vars(&cond.condition, &renames),
        body: renamed_body(&body_decls, &calls, &renames, &extras),
    }));
    let fragment = Namespace {
        tasks: stubs(&calls, task_applets)?,
        workflow: Some(fragment_workflow(&applet_name, elements, None)),
    };
    verify_fragment(&fragment, verifier)?;

    finish(
        stage_name,
        applet_name,
        id,
        inputs,
        outputs,
        AppletKind::If(call_table(&calls)),
        fragment,
        &closure,
        extras.len(),
    )
}

#[allow(clippy::too_many_arguments)]
fn finish(
    stage_name: String,
    applet_name: String,
    id: StageId,
    inputs: Vec<CVar>,
    outputs: Vec<CVar>,
    kind: AppletKind,
    fragment: Namespace,
    closure: &CallEnv,
    extra_count: usize,
) -> Result<(Stage, Applet), CompileError> {
    let applet = Applet::new(
        applet_name,
        inputs,
        outputs.clone(),
        InstanceType::Default,
        DockerImage::None,
        kind,
        fragment,
    )?;

    let mut stage_inputs: Vec<SArg> =
        closure.values().map(|linked| linked.sarg.clone()).collect();
    stage_inputs.extend(std::iter::repeat_n(SArg::Empty, extra_count));

    Ok((
        Stage {
            name: stage_name,
            id,
            applet: applet.name.clone(),
            inputs: stage_inputs,
            outputs,
        },
        applet,
    ))
}

/// Splits a block body into its leading declarations and trailing calls.
/// A declaration after a call, or a nested block, cannot be lowered.
fn split_body(
    body: &[WorkflowElement],
    pos: SourcePosition,
) -> Result<(Vec<&Declaration>, Vec<&Call>), CompileError> {
    let mut decls = Vec::new();
    let mut calls: Vec<&Call> = Vec::new();
    for element in body {
        match element {
            WorkflowElement::Decl(decl) => {
                if !calls.is_empty() {
                    return Err(CompileError::Unsupported(format!(
                        "declaration '{}' appears after a call in a block body{}",
                        decl.name,
                        at(decl.pos)
                    )));
                }
                decls.push(decl);
            }
            WorkflowElement::Call(call) => calls.push(call),
            WorkflowElement::Scatter(_) | WorkflowElement::Conditional(_) => {
                return Err(CompileError::Unsupported(format!(
                    "nested blocks inside a block body{}",
                    at(pos)
                )));
            }
        }
    }
    Ok((decls, calls))
}

/// Every expression the block evaluates, in source order.
fn block_exprs<'a>(
    pre_decls: &'a [Declaration],
    control: &'a Expr,
    body_decls: &'a [&'a Declaration],
    calls: &'a [&'a Call],
) -> Vec<&'a Expr> {
    let mut exprs: Vec<&Expr> = pre_decls.iter().filter_map(|d| d.expr.as_ref()).collect();
    exprs.push(control);
    exprs.extend(body_decls.iter().filter_map(|d| d.expr.as_ref()));
    exprs.extend(calls.iter().flat_map(|c| c.inputs.iter().map(|(_, e)| e)));
    exprs
}

/// Checks every call's formal inputs. A required formal with no mapping is
/// fatal in a locked workflow; in an unlocked workflow it becomes an extra
/// applet input `<call>_<input>` the platform can satisfy, unless an input
/// of that name already exists.
fn propagate_unbound_inputs(
    calls: &[&Call],
    task_applets: &IndexMap<String, Applet>,
    existing: &[CVar],
    locked: bool,
    warnings: &mut Vec<CompileWarning>,
) -> Result<Vec<(String, String, CVar)>, CompileError> {
    let mut extras: Vec<(String, String, CVar)> = Vec::new();
    for call in calls {
        let applet = task_applets.get(&call.task).ok_or_else(|| {
            CompileError::UnresolvedCall(format!("'{}'{}", call.task, at(call.pos)))
        })?;
        for formal in &applet.inputs {
            if call.input(&formal.name).is_some() || !is_required(formal) {
                continue;
            }
            let description = format!(
                "call '{}' leaves input '{}' unbound{}",
                call.call_name(),
                formal.name,
                at(call.pos)
            );
            if locked {
                return Err(CompileError::MissingInput(description));
            }
            warnings.push(CompileWarning::warning(
                WARN_MISSING_CALL_INPUT,
                description,
                call.pos,
            ));
            let cvar = CVar::propagated(call.call_name(), &formal.name, formal.ty.clone());
            let taken = existing.iter().any(|c| c.name == cvar.name)
                || extras.iter().any(|(_, _, c)| c.name == cvar.name);
            if !taken {
                extras.push((call.call_name().to_string(), formal.name.clone(), cvar));
            }
        }
    }
    Ok(extras)
}

/// Output variables exposed by the block: absorbed preceding declarations
/// unchanged, call outputs lifted, and non-local body declarations lifted.
/// A body declaration is local when it carries the compiler-generated
/// prefix; generated temporaries never escape their block.
fn block_outputs(
    pre_decls: &[Declaration],
    calls: &[&Call],
    body_decls: &[&Declaration],
    task_applets: &IndexMap<String, Applet>,
    lift: impl Fn(&Type) -> Type,
) -> Result<Vec<CVar>, CompileError> {
    let mut outputs: Vec<CVar> = pre_decls
        .iter()
        .map(|decl| CVar::new(decl.name.clone(), decl.ty.clone()))
        .collect();
    for call in calls {
        let applet = task_applets.get(&call.task).ok_or_else(|| {
            CompileError::UnresolvedCall(format!("'{}'{}", call.task, at(call.pos)))
        })?;
        for output in &applet.outputs {
            outputs.push(CVar::new(
                format!("{}.{}", call.call_name(), output.name),
                lift(&output.ty),
            ));
        }
    }
    for decl in body_decls {
        if !decl.name.starts_with(GENERATED_VAR_PREFIX) {
            outputs.push(CVar::new(decl.name.clone(), lift(&decl.ty)));
        }
    }
    Ok(outputs)
}

fn renamed_decls(
    decls: &[Declaration],
    renames: &IndexMap<String, String>,
) -> Vec<WorkflowElement> {
    decls
        .iter()
        .map(|decl| {
            let mut renamed = decl.clone();
            renamed.expr = decl.expr.as_ref().map(|e| rename_free_vars(e, renames));
            WorkflowElement::Decl(renamed)
        })
        .collect()
}

/// The transformed block body: declarations and calls with their
/// expressions rewritten to the sanitized input names, and propagated
/// extras wired into their calls.
fn renamed_body(
    body_decls: &[&Declaration],
    calls: &[&Call],
    renames: &IndexMap<String, String>,
    extras: &[(String, String, CVar)],
) -> Vec<WorkflowElement> {
    let mut elements: Vec<WorkflowElement> = body_decls
        .iter()
        .map(|decl| {
            let mut renamed = (*decl).clone();
            renamed.expr = decl.expr.as_ref().map(|e| rename_free_vars(e, renames));
            WorkflowElement::Decl(renamed)
        })
        .collect();
    for call in calls {
        let mut renamed = (*call).clone();
        let name = renamed.call_name().to_string();
        for (_, expr) in renamed.inputs.iter_mut() {
            *expr = rename_free_vars(expr, renames);
        }
        for (call_name, formal, cvar) in extras {
            if call_name == &name {
                renamed
                    .inputs
                    .push((formal.clone(), Expr::Ident(cvar.dx_name())));
            }
        }
        elements.push(WorkflowElement::Call(renamed));
    }
    elements
}

fn call_table(calls: &[&Call]) -> CallTable {
    calls
        .iter()
        .map(|call| (call.call_name().to_string(), call.task.clone()))
        .collect()
}

fn stubs(
    calls: &[&Call],
    task_applets: &IndexMap<String, Applet>,
) -> Result<Vec<wdx_lang::ast::Task>, CompileError> {
    let mut tasks = Vec::new();
    let mut seen = rustc_hash::FxHashSet::default();
    for call in calls {
        if !seen.insert(call.task.as_str()) {
            continue;
        }
        let applet = task_applets.get(&call.task).ok_or_else(|| {
            CompileError::UnresolvedCall(format!("'{}'{}", call.task, at(call.pos)))
        })?;
        tasks.push(stub_task(applet));
    }
    Ok(tasks)
}
