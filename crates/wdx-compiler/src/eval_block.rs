//! Expression-evaluation applet synthesis.
//!
//! A run of declarations lowers to an `Eval` applet whose inputs are the
//! closure of the declarations' expressions and whose outputs are the
//! declarations themselves. The embedded fragment re-declares the closure
//! under sanitized names and evaluates the original declarations against
//! them.

use indexmap::IndexMap;

use wdx_ir::{
    Applet, AppletKind, CVar, CallEnv, DockerImage, InstanceType, SArg, Stage, StageId,
};
use wdx_lang::ast::{Declaration, Namespace, Task, Workflow, WorkflowElement, WorkflowOutput};
use wdx_lang::{print, Type};

use crate::closure::closure_of;
use crate::errors::CompileError;
use crate::expr_utils::rename_free_vars;
use crate::platform::FragmentVerifier;

/// Wraps fragment elements in a workflow, inserting a dummy integer
/// declaration when the body would otherwise be empty, so the fragment
/// stays parseable.
pub(crate) fn fragment_workflow(
    name: &str,
    mut elements: Vec<WorkflowElement>,
    outputs: Option<Vec<WorkflowOutput>>,
) -> Workflow {
    if elements.is_empty() {
        elements.push(WorkflowElement::Decl(Declaration::bound(
            "placeholder",
            Type::Int,
            wdx_lang::Expr::Int(0),
        )));
    }
    Workflow {
        pos: Default::default(),
        name: name.to_string(),
        elements,
        outputs,
    }
}

/// Input variables and the sanitizing rename map for a closure.
pub(crate) fn closure_interface(closure: &CallEnv) -> (Vec<CVar>, IndexMap<String, String>) {
    let mut inputs = Vec::with_capacity(closure.len());
    let mut renames = IndexMap::with_capacity(closure.len());
    for (fqn, linked) in closure {
        let cvar = CVar::new(fqn.clone(), linked.cvar.ty.clone());
        renames.insert(fqn.clone(), cvar.dx_name());
        inputs.push(cvar);
    }
    (inputs, renames)
}

/// Unassigned fragment declarations mirroring a set of input variables
/// under their sanitized names.
pub(crate) fn input_decls(inputs: &[CVar]) -> Vec<WorkflowElement> {
    inputs
        .iter()
        .map(|cvar| WorkflowElement::Decl(Declaration::unbound(cvar.dx_name(), cvar.ty.clone())))
        .collect()
}

/// Verifies a fragment against the external parser seam.
pub(crate) fn verify_fragment(
    fragment: &Namespace,
    verifier: &dyn FragmentVerifier,
) -> Result<(), CompileError> {
    let source = print::namespace(fragment);
    verifier
        .verify(fragment, &source)
        .map_err(|reason| CompileError::IllegalFragment {
            reason,
            fragment: source,
        })
}

/// Interface stub for a callee: name plus input and output declarations,
/// no command, no runtime.
pub(crate) fn stub_task(applet: &Applet) -> Task {
    Task {
        pos: Default::default(),
        name: applet.name.clone(),
        declarations: applet
            .inputs
            .iter()
            .map(|cvar| Declaration::unbound(cvar.name.clone(), cvar.ty.clone()))
            .collect(),
        command: String::new(),
        runtime: IndexMap::new(),
        meta: IndexMap::new(),
        outputs: applet
            .outputs
            .iter()
            .map(|cvar| Declaration::unbound(cvar.name.clone(), cvar.ty.clone()))
            .collect(),
    }
}

/// Lowers a declaration run to an `Eval` stage and applet.
pub fn compile_eval(
    decls: &[Declaration],
    env: &CallEnv,
    stage_name: String,
    applet_name: String,
    id: StageId,
    verifier: &dyn FragmentVerifier,
) -> Result<(Stage, Applet), CompileError> {
    let closure = closure_of(decls.iter().filter_map(|d| d.expr.as_ref()), env);
    let (inputs, renames) = closure_interface(&closure);

    let outputs: Vec<CVar> = decls
        .iter()
        .map(|decl| CVar::new(decl.name.clone(), decl.ty.clone()))
        .collect();

    let mut elements = input_decls(&inputs);
    for decl in decls {
        let mut renamed = decl.clone();
        renamed.expr = decl.expr.as_ref().map(|e| rename_free_vars(e, &renames));
        elements.push(WorkflowElement::Decl(renamed));
    }
    let fragment = Namespace {
        tasks: vec![],
        workflow: Some(fragment_workflow(&applet_name, elements, None)),
    };
    verify_fragment(&fragment, verifier)?;

    let applet = Applet::new(
        applet_name,
        inputs,
        outputs.clone(),
        InstanceType::Default,
        DockerImage::None,
        AppletKind::Eval,
        fragment,
    )?;

    let stage_inputs: Vec<SArg> = closure.values().map(|linked| linked.sarg.clone()).collect();
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
