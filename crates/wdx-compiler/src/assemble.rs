//! Backbone assembly.
//!
//! Folds the partitioned blocks left to right, threading the growing
//! symbol environment: each block lowers to a stage (plus, for synthetic
//! blocks, an applet), and the stage's outputs are bound into the
//! environment for the blocks after it. Unlocked workflows get a leading
//! `common` stage exposing the workflow inputs as links; an output-section
//! stage collects the declared outputs; a reorganization stage is appended
//! on request.
//!
//! Stage names (`eval1`, `scatter1`, `if1`, ...) and stage ids come from
//! counters owned by one workflow compilation, so concurrent compilations
//! of independent workflows stay deterministic.

use indexmap::IndexMap;

use wdx_ir::reserved::{COMMON_STAGE, LAST_STAGE_ID, OUTPUT_SECTION, REORG_STAGE};
use wdx_ir::{Applet, AppletKind, CVar, CallEnv, DockerImage, InstanceType, LinkedVar, SArg, Stage, StageId, Workflow as IrWorkflow};
use wdx_lang::ast::{Declaration, Namespace, Workflow, WorkflowElement, WorkflowOutput};
use wdx_lang::{print, SourcePosition};

use crate::blocks::{partition, Block};
use crate::call::compile_call;
use crate::closure::trail_search;
use crate::compile::CompileOptions;
use crate::errors::{at, CompileError, CompileWarning};
use crate::eval_block::{compile_eval, fragment_workflow, input_decls, verify_fragment};
use crate::expr_utils::{is_reference_free, rename_free_vars, try_const_eval, value_expr};
use crate::platform::FragmentVerifier;
use crate::scope_block::{compile_if, compile_scatter};

/// Deterministic stage naming, one counter per synthetic block kind.
#[derive(Debug, Default)]
pub struct StageNamer {
    eval: u32,
    scatter: u32,
    cond: u32,
}

impl StageNamer {
    pub fn next_eval(&mut self) -> String {
        self.eval += 1;
        format!("eval{}", self.eval)
    }

    pub fn next_scatter(&mut self) -> String {
        self.scatter += 1;
        format!("scatter{}", self.scatter)
    }

    pub fn next_if(&mut self) -> String {
        self.cond += 1;
        format!("if{}", self.cond)
    }
}

/// Monotonic stage-id assignment local to one workflow compilation.
#[derive(Debug, Default)]
pub struct StageIds {
    next: u32,
}

impl StageIds {
    pub fn next(&mut self) -> StageId {
        let id = StageId(format!("stage-{}", self.next));
        self.next += 1;
        id
    }

    /// The pinned id of the output-collection stage.
    pub fn last() -> StageId {
        StageId(LAST_STAGE_ID.to_string())
    }
}

/// Applet name for a synthetic stage. The triple underscore is reserved,
/// so generated names cannot collide with task applets.
fn block_applet_name(wf_name: &str, stage_name: &str) -> String {
    format!("{}___{}", wf_name, stage_name)
}

/// Lowers a workflow to its IR form plus the applets synthesized along
/// the way.
pub fn lower_workflow(
    wf: &Workflow,
    options: CompileOptions,
    task_applets: &IndexMap<String, Applet>,
    verifier: &dyn FragmentVerifier,
) -> Result<(IrWorkflow, IndexMap<String, Applet>, Vec<CompileWarning>), CompileError> {
    let mut applets: IndexMap<String, Applet> = IndexMap::new();
    let mut warnings: Vec<CompileWarning> = Vec::new();
    let mut stages: Vec<Stage> = Vec::new();
    let mut env = CallEnv::new();
    let mut namer = StageNamer::default();
    let mut ids = StageIds::default();

    let (input_vars, rest) = workflow_inputs(wf)?;

    let wf_inputs: Vec<(CVar, SArg)> = if options.locked {
        for cvar in &input_vars {
            bind(
                &mut env,
                cvar.name.clone(),
                LinkedVar::new(cvar.clone(), SArg::WorkflowInput(cvar.clone())),
            )?;
        }
        input_vars
            .iter()
            .map(|cvar| (cvar.clone(), SArg::WorkflowInput(cvar.clone())))
            .collect()
    } else {
        let (stage, applet) = common_stage(&wf.name, &input_vars, ids.next(), verifier)?;
        for cvar in &input_vars {
            bind(
                &mut env,
                cvar.name.clone(),
                LinkedVar::new(
                    cvar.clone(),
                    SArg::Link {
                        stage: COMMON_STAGE.to_string(),
                        cvar: cvar.clone(),
                    },
                ),
            )?;
        }
        let pairs = input_vars
            .iter()
            .zip(&stage.inputs)
            .map(|(cvar, sarg)| (cvar.clone(), sarg.clone()))
            .collect();
        register_applet(&mut applets, applet)?;
        push_stage(&mut stages, stage)?;
        pairs
    };

    for block in partition(rest) {
        match block {
            Block::DeclRun(decls) => {
                let stage_name = namer.next_eval();
                let applet_name = block_applet_name(&wf.name, &stage_name);
                let (stage, applet) =
                    compile_eval(&decls, &env, stage_name, applet_name, ids.next(), verifier)?;
                bind_outputs_plain(&mut env, &stage)?;
                register_applet(&mut applets, applet)?;
                push_stage(&mut stages, stage)?;
            }
            Block::CallBlock(call) => {
                let stage = compile_call(
                    &call,
                    &env,
                    task_applets,
                    options.locked,
                    ids.next(),
                    &mut warnings,
                )?;
                bind_outputs_dotted(&mut env, &stage)?;
                push_stage(&mut stages, stage)?;
            }
            Block::ScatterBlock { decls, scatter } => {
                let stage_name = namer.next_scatter();
                let applet_name = block_applet_name(&wf.name, &stage_name);
                let (stage, applet) = compile_scatter(
                    &decls,
                    &scatter,
                    &env,
                    task_applets,
                    options.locked,
                    stage_name,
                    applet_name,
                    ids.next(),
                    verifier,
                    &mut warnings,
                )?;
                bind_outputs_plain(&mut env, &stage)?;
                register_applet(&mut applets, applet)?;
                push_stage(&mut stages, stage)?;
            }
            Block::CondBlock { decls, cond } => {
                let stage_name = namer.next_if();
                let applet_name = block_applet_name(&wf.name, &stage_name);
                let (stage, applet) = compile_if(
                    &decls,
                    &cond,
                    &env,
                    task_applets,
                    options.locked,
                    stage_name,
                    applet_name,
                    ids.next(),
                    verifier,
                    &mut warnings,
                )?;
                bind_outputs_plain(&mut env, &stage)?;
                register_applet(&mut applets, applet)?;
                push_stage(&mut stages, stage)?;
            }
        }
    }

    // Outputs are collected by a terminal stage only when the source
    // declared an output section.
    let declared: &[WorkflowOutput] = wf.outputs.as_deref().unwrap_or(&[]);
    let mut wf_outputs: Vec<(CVar, SArg)> = Vec::new();
    if !declared.is_empty() {
        let (stage, applet, outputs) = output_section(&wf.name, declared, &env, verifier)?;
        wf_outputs = outputs;
        register_applet(&mut applets, applet)?;
        push_stage(&mut stages, stage)?;
    }

    if options.reorg {
        let (stage, applet) = reorg_stage(&wf.name, &wf_outputs, ids.next(), verifier)?;
        register_applet(&mut applets, applet)?;
        push_stage(&mut stages, stage)?;
    }

    Ok((
        IrWorkflow {
            name: wf.name.clone(),
            inputs: wf_inputs,
            outputs: wf_outputs,
            stages,
            locked: options.locked,
        },
        applets,
        warnings,
    ))
}

/// The workflow input section: the leading run of declarations that are
/// unassigned or carry a literal default. A declaration computed from
/// other values ends the run and is compiled into the backbone instead;
/// a literal default that still fails to evaluate is fatal, since the
/// platform cannot evaluate an input default at submission time.
fn workflow_inputs(wf: &Workflow) -> Result<(Vec<CVar>, &[WorkflowElement]), CompileError> {
    let mut split = 0;
    for element in &wf.elements {
        let WorkflowElement::Decl(decl) = element else { break };
        let admissible = match &decl.expr {
            None => true,
            Some(expr) => is_reference_free(expr),
        };
        if !admissible {
            break;
        }
        split += 1;
    }

    let mut inputs = Vec::with_capacity(split);
    for element in &wf.elements[..split] {
        if let WorkflowElement::Decl(decl) = element {
            inputs.push(input_cvar(decl)?);
        }
    }
    Ok((inputs, &wf.elements[split..]))
}

fn input_cvar(decl: &Declaration) -> Result<CVar, CompileError> {
    let default = match &decl.expr {
        None => decl.attrs.default.clone(),
        Some(expr) => Some(try_const_eval(expr).ok_or_else(|| {
            CompileError::NonConstDefault(format!(
                "input '{}' defaults to '{}'{}",
                decl.name,
                print::expression(expr),
                at(decl.pos)
            ))
        })?),
    };
    Ok(CVar {
        name: decl.name.clone(),
        ty: decl.ty.clone(),
        attrs: wdx_lang::ast::DeclAttrs { default },
        original_fqn: None,
    })
}

/// The `common` stage of an unlocked workflow: an `Eval` applet whose
/// inputs and outputs are both the workflow inputs, so later stages can
/// link to them.
fn common_stage(
    wf_name: &str,
    inputs: &[CVar],
    id: StageId,
    verifier: &dyn FragmentVerifier,
) -> Result<(Stage, Applet), CompileError> {
    let applet_name = block_applet_name(wf_name, COMMON_STAGE);
    let elements: Vec<WorkflowElement> = inputs
        .iter()
        .map(|cvar| {
            WorkflowElement::Decl(Declaration {
                pos: SourcePosition::unknown(),
                name: cvar.name.clone(),
                ty: cvar.ty.clone(),
                expr: cvar.attrs.default.as_ref().map(value_expr),
                attrs: Default::default(),
            })
        })
        .collect();
    let fragment = Namespace {
        tasks: vec![],
        workflow: Some(fragment_workflow(&applet_name, elements, None)),
    };
    verify_fragment(&fragment, verifier)?;

    let applet = Applet::new(
        applet_name,
        inputs.to_vec(),
        inputs.to_vec(),
        InstanceType::Default,
        DockerImage::None,
        AppletKind::Eval,
        fragment,
    )?;
    let stage_inputs = inputs
        .iter()
        .map(|cvar| match &cvar.attrs.default {
            Some(value) => SArg::Const(value.clone()),
            None => SArg::Empty,
        })
        .collect();
    Ok((
        Stage {
            name: COMMON_STAGE.to_string(),
            id,
            applet: applet.name.clone(),
            inputs: stage_inputs,
            outputs: inputs.to_vec(),
        },
        applet,
    ))
}

/// The output-collection stage. Inputs are the resolved references of the
/// declared outputs; outputs carry sanitized, dot-free names. The stage
/// holds the reserved last-stage id.
fn output_section(
    wf_name: &str,
    declared: &[WorkflowOutput],
    env: &CallEnv,
    verifier: &dyn FragmentVerifier,
) -> Result<(Stage, Applet, Vec<(CVar, SArg)>), CompileError> {
    let applet_name = block_applet_name(wf_name, OUTPUT_SECTION);

    let mut inputs: Vec<CVar> = Vec::new();
    let mut stage_inputs: Vec<SArg> = Vec::new();
    let mut renames: IndexMap<String, String> = IndexMap::new();
    let mut out_cvars: Vec<CVar> = Vec::new();
    let mut entries: Vec<WorkflowOutput> = Vec::new();

    for output in declared {
        let rewritten = if let Some(chain) = output.expr.as_access_chain() {
            let (key, linked) = trail_search(env, &chain).ok_or_else(|| {
                CompileError::UndefinedSymbol(format!(
                    "'{}' in workflow output '{}'{}",
                    chain,
                    output.name,
                    at(output.pos)
                ))
            })?;
            if !renames.contains_key(key) {
                let cvar = CVar::new(key.to_string(), linked.cvar.ty.clone());
                renames.insert(key.to_string(), cvar.dx_name());
                stage_inputs.push(linked.sarg.clone());
                inputs.push(cvar);
            }
            rename_free_vars(&output.expr, &renames)
        } else if try_const_eval(&output.expr).is_some() {
            output.expr.clone()
        } else {
            return Err(CompileError::Unsupported(format!(
                "non-constant expression '{}' in output section{}",
                print::expression(&output.expr),
                at(output.pos)
            )));
        };

        let sanitized = output.name.replace('.', "_");
        out_cvars.push(CVar::new(sanitized.clone(), output.ty.clone()));
        entries.push(WorkflowOutput {
            pos: SourcePosition::unknown(),
            name: sanitized,
            ty: output.ty.clone(),
            expr: rewritten,
        });
    }

    let fragment = Namespace {
        tasks: vec![],
        workflow: Some(fragment_workflow(
            &applet_name,
            input_decls(&inputs),
            Some(entries),
        )),
    };
    verify_fragment(&fragment, verifier)?;

    let applet = Applet::new(
        applet_name,
        inputs,
        out_cvars.clone(),
        InstanceType::Default,
        DockerImage::None,
        AppletKind::Eval,
        fragment,
    )?;
    let wf_outputs = out_cvars
        .iter()
        .map(|cvar| {
            (
                cvar.clone(),
                SArg::Link {
                    stage: OUTPUT_SECTION.to_string(),
                    cvar: cvar.clone(),
                },
            )
        })
        .collect();
    Ok((
        Stage {
            name: OUTPUT_SECTION.to_string(),
            id: StageIds::last(),
            applet: applet.name.clone(),
            inputs: stage_inputs,
            outputs: out_cvars,
        },
        applet,
        wf_outputs,
    ))
}

/// The reorganization stage: takes every workflow output, produces
/// nothing. Its applet moves non-final files into an archive folder at
/// execution time; the compiler only emits the stage.
fn reorg_stage(
    wf_name: &str,
    wf_outputs: &[(CVar, SArg)],
    id: StageId,
    verifier: &dyn FragmentVerifier,
) -> Result<(Stage, Applet), CompileError> {
    let applet_name = block_applet_name(wf_name, REORG_STAGE);
    let inputs: Vec<CVar> = wf_outputs.iter().map(|(cvar, _)| cvar.clone()).collect();
    let stage_inputs: Vec<SArg> = wf_outputs.iter().map(|(_, sarg)| sarg.clone()).collect();

    let fragment = Namespace {
        tasks: vec![],
        workflow: Some(fragment_workflow(&applet_name, input_decls(&inputs), None)),
    };
    verify_fragment(&fragment, verifier)?;

    let applet = Applet::new(
        applet_name,
        inputs,
        vec![],
        InstanceType::Default,
        DockerImage::None,
        AppletKind::WorkflowOutputReorg,
        fragment,
    )?;
    Ok((
        Stage {
            name: REORG_STAGE.to_string(),
            id,
            applet: applet.name.clone(),
            inputs: stage_inputs,
            outputs: vec![],
        },
        applet,
    ))
}

fn bind(env: &mut CallEnv, key: String, linked: LinkedVar) -> Result<(), CompileError> {
    if env.insert(key.clone(), linked).is_some() {
        return Err(CompileError::Internal(format!(
            "symbol '{}' bound twice while assembling the backbone",
            key
        )));
    }
    Ok(())
}

/// Synthetic blocks expose their outputs under the variable names
/// themselves (scatter and conditional outputs already carry dotted call
/// names).
fn bind_outputs_plain(env: &mut CallEnv, stage: &Stage) -> Result<(), CompileError> {
    for cvar in &stage.outputs {
        bind(
            env,
            cvar.name.clone(),
            LinkedVar::new(
                cvar.clone(),
                SArg::Link {
                    stage: stage.name.clone(),
                    cvar: cvar.clone(),
                },
            ),
        )?;
    }
    Ok(())
}

/// Call outputs are addressed as `<stage>.<output>` at the source level.
fn bind_outputs_dotted(env: &mut CallEnv, stage: &Stage) -> Result<(), CompileError> {
    for cvar in &stage.outputs {
        bind(
            env,
            format!("{}.{}", stage.name, cvar.name),
            LinkedVar::new(
                cvar.clone(),
                SArg::Link {
                    stage: stage.name.clone(),
                    cvar: cvar.clone(),
                },
            ),
        )?;
    }
    Ok(())
}

fn register_applet(
    applets: &mut IndexMap<String, Applet>,
    applet: Applet,
) -> Result<(), CompileError> {
    let name = applet.name.clone();
    if applets.insert(name.clone(), applet).is_some() {
        return Err(CompileError::Internal(format!(
            "applet '{}' synthesized twice",
            name
        )));
    }
    Ok(())
}

fn push_stage(stages: &mut Vec<Stage>, stage: Stage) -> Result<(), CompileError> {
    if stages.iter().any(|existing| existing.name == stage.name) {
        return Err(CompileError::Internal(format!(
            "stage '{}' emitted twice",
            stage.name
        )));
    }
    stages.push(stage);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SelfContainedVerifier;
    use wdx_lang::{Expr, Type, Value};

    #[test]
    fn stage_names_count_per_kind() {
        let mut namer = StageNamer::default();
        assert_eq!(namer.next_eval(), "eval1");
        assert_eq!(namer.next_scatter(), "scatter1");
        assert_eq!(namer.next_eval(), "eval2");
        assert_eq!(namer.next_if(), "if1");
    }

    #[test]
    fn stage_ids_count_from_zero() {
        let mut ids = StageIds::default();
        assert_eq!(ids.next().as_str(), "stage-0");
        assert_eq!(ids.next().as_str(), "stage-1");
        assert_eq!(StageIds::last().as_str(), "stage-last");
    }

    #[test]
    fn leading_declarations_become_inputs() {
        let wf = Workflow {
            name: "w".into(),
            elements: vec![
                WorkflowElement::Decl(Declaration::unbound("a", Type::Int)),
                WorkflowElement::Decl(Declaration::bound("b", Type::Int, Expr::Int(3))),
                WorkflowElement::Call(Default::default()),
                WorkflowElement::Decl(Declaration::bound("late", Type::Int, Expr::Int(1))),
            ],
            ..Workflow::default()
        };
        let (inputs, rest) = workflow_inputs(&wf).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].attrs.default, None);
        assert_eq!(inputs[1].attrs.default, Some(Value::Int(3)));
        assert_eq!(rest.len(), 2, "the late declaration stays in the body");
    }

    #[test]
    fn computed_leading_declaration_ends_the_input_section() {
        let wf = Workflow {
            name: "w".into(),
            elements: vec![
                WorkflowElement::Decl(Declaration::unbound("files", Type::Array(Box::new(Type::File)))),
                WorkflowElement::Decl(Declaration::bound(
                    "n",
                    Type::Int,
                    Expr::apply("length", vec![Expr::ident("files")]),
                )),
            ],
            ..Workflow::default()
        };
        let (inputs, rest) = workflow_inputs(&wf).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(rest.len(), 1, "the computed declaration joins the backbone");
    }

    #[test]
    fn trapping_literal_input_default_is_fatal() {
        let wf = Workflow {
            name: "w".into(),
            elements: vec![WorkflowElement::Decl(Declaration::bound(
                "n",
                Type::Int,
                Expr::binary(wdx_lang::BinaryOp::Div, Expr::Int(1), Expr::Int(0)),
            ))],
            ..Workflow::default()
        };
        let err = workflow_inputs(&wf).unwrap_err();
        assert!(matches!(err, CompileError::NonConstDefault(_)));
    }

    #[test]
    fn common_stage_exposes_inputs_as_outputs() {
        let inputs = vec![
            CVar::new("a", Type::Int),
            CVar::with_default("b", Type::Int, Value::Int(3)),
        ];
        let (stage, applet) = common_stage(
            "w",
            &inputs,
            StageId("stage-0".into()),
            &SelfContainedVerifier,
        )
        .unwrap();
        assert_eq!(stage.name, "common");
        assert_eq!(applet.name, "w___common");
        assert_eq!(applet.inputs, applet.outputs);
        assert_eq!(stage.inputs, vec![SArg::Empty, SArg::Const(Value::Int(3))]);
        let source = print::namespace(&applet.fragment);
        assert!(source.contains("Int a"));
        assert!(source.contains("Int b = 3"));
    }

    #[test]
    fn output_section_sanitizes_names_and_links_the_env() {
        let mut env = CallEnv::new();
        let result = CVar::new("result", Type::Int);
        env.insert(
            "Mul.result".to_string(),
            LinkedVar::new(
                result.clone(),
                SArg::Link {
                    stage: "Mul".into(),
                    cvar: result,
                },
            ),
        );
        let declared = vec![WorkflowOutput {
            pos: SourcePosition::unknown(),
            name: "Mul.result".into(),
            ty: Type::Int,
            expr: Expr::access(Expr::ident("Mul"), "result"),
        }];
        let (stage, applet, wf_outputs) =
            output_section("w", &declared, &env, &SelfContainedVerifier).unwrap();

        assert_eq!(stage.id.as_str(), "stage-last");
        assert_eq!(applet.inputs[0].name, "Mul.result");
        assert_eq!(applet.outputs[0].name, "Mul_result");
        assert!(matches!(&stage.inputs[0], SArg::Link { stage, .. } if stage == "Mul"));
        assert!(matches!(&wf_outputs[0].1, SArg::Link { stage, .. } if stage == "outputs"));
        let source = print::namespace(&applet.fragment);
        assert!(source.contains("Int Mul_result = Mul_result"));
    }

    #[test]
    fn non_constant_output_expression_is_unsupported() {
        let env = CallEnv::new();
        let declared = vec![WorkflowOutput {
            pos: SourcePosition::unknown(),
            name: "x".into(),
            ty: Type::Int,
            expr: Expr::apply("length", vec![Expr::ident("xs")]),
        }];
        let err = output_section("w", &declared, &env, &SelfContainedVerifier).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported(_)));
    }
}
