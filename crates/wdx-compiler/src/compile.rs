//! Top-level driver.
//!
//! Dependency-sorts the callables, lowers every task to an applet, lowers
//! the workflow (if any) over those applets, and assembles the final
//! namespace. Compilation either succeeds wholly or fails with the first
//! error; no partial namespace is ever returned.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use wdx_ir::{Applet, Namespace as IrNamespace};
use wdx_lang::ast::{Call, Namespace, WorkflowElement};

use crate::assemble::lower_workflow;
use crate::errors::{at, CompileError, CompileWarning, INFO_COMPILE_SUMMARY};
use crate::platform::{FragmentVerifier, PlatformResolver};
use crate::task::compile_task;

/// Diagnostic chattiness. `Verbose` adds informational diagnostics to the
/// result; it never changes the namespace itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Compilation flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// Lock the primary workflow: its declared inputs and outputs are the
    /// only externally addressable surface.
    pub locked: bool,
    /// Append a reorganization stage that archives non-final outputs.
    pub reorg: bool,
    pub verbosity: Verbosity,
}

/// A successfully lowered namespace plus the diagnostics gathered along
/// the way.
#[derive(Debug)]
pub struct Compiled {
    pub namespace: IrNamespace,
    pub warnings: Vec<CompileWarning>,
}

/// Lowers a validated source namespace to IR.
pub fn compile_namespace(
    source: &Namespace,
    options: CompileOptions,
    resolver: &dyn PlatformResolver,
    verifier: &dyn FragmentVerifier,
) -> Result<Compiled, CompileError> {
    let order = dependency_order(source)?;

    let mut applets: IndexMap<String, Applet> = IndexMap::new();
    for &name in &order {
        if let Some(task) = source.find_task(name) {
            let applet = compile_task(task, resolver, verifier)?;
            if applets.insert(applet.name.clone(), applet).is_some() {
                return Err(CompileError::Internal(format!(
                    "duplicate callable name '{}'",
                    name
                )));
            }
        }
    }

    let mut warnings = Vec::new();
    let workflow = match &source.workflow {
        Some(wf) => {
            let (lowered, synthesized, wf_warnings) =
                lower_workflow(wf, options, &applets, verifier)?;
            warnings.extend(wf_warnings);
            for (name, applet) in synthesized {
                if applets.insert(name.clone(), applet).is_some() {
                    return Err(CompileError::Internal(format!(
                        "synthesized applet '{}' collides with an existing applet",
                        name
                    )));
                }
            }
            Some(lowered)
        }
        None => None,
    };

    if options.verbosity == Verbosity::Verbose {
        let stages = workflow
            .as_ref()
            .map(|wf| format!(", workflow '{}' with {} stage(s)", wf.name, wf.stages.len()))
            .unwrap_or_default();
        warnings.push(CompileWarning::info(
            INFO_COMPILE_SUMMARY,
            format!("compiled {} applet(s){}", applets.len(), stages),
        ));
    }

    Ok(Compiled {
        namespace: IrNamespace { workflow, applets },
        warnings,
    })
}

/// Orders the callables so every callable appears after everything it
/// calls: tasks first, the workflow after all of them. Call targets are
/// validated here; a cycle is fatal.
fn dependency_order(source: &Namespace) -> Result<Vec<&str>, CompileError> {
    let task_names: FxHashSet<&str> = source.tasks.iter().map(|t| t.name.as_str()).collect();

    let mut nodes: Vec<(&str, Vec<&str>)> = source
        .tasks
        .iter()
        .map(|task| (task.name.as_str(), Vec::new()))
        .collect();
    if let Some(wf) = &source.workflow {
        let mut calls = Vec::new();
        collect_calls(&wf.elements, &mut calls);
        let mut deps = Vec::new();
        for call in calls {
            if call.task == wf.name {
                return Err(CompileError::Unsupported(format!(
                    "call '{}' targets a workflow, not a task{}",
                    call.task,
                    at(call.pos)
                )));
            }
            if !task_names.contains(call.task.as_str()) {
                return Err(CompileError::UnresolvedCall(format!(
                    "'{}'{}",
                    call.task,
                    at(call.pos)
                )));
            }
            deps.push(call.task.as_str());
        }
        nodes.push((wf.name.as_str(), deps));
    }

    let mut order: Vec<&str> = Vec::with_capacity(nodes.len());
    let mut done: FxHashSet<&str> = FxHashSet::default();
    while order.len() < nodes.len() {
        let mut progressed = false;
        for (name, deps) in &nodes {
            if !done.contains(name) && deps.iter().all(|dep| done.contains(dep)) {
                done.insert(*name);
                order.push(*name);
                progressed = true;
            }
        }
        if !progressed {
            let stuck: Vec<&str> = nodes
                .iter()
                .map(|(name, _)| *name)
                .filter(|name| !done.contains(name))
                .collect();
            return Err(CompileError::CallableCycle(stuck.join(", ")));
        }
    }
    Ok(order)
}

fn collect_calls<'a>(elements: &'a [WorkflowElement], calls: &mut Vec<&'a Call>) {
    for element in elements {
        match element {
            WorkflowElement::Call(call) => calls.push(call),
            WorkflowElement::Scatter(scatter) => collect_calls(&scatter.body, calls),
            WorkflowElement::Conditional(cond) => collect_calls(&cond.body, calls),
            WorkflowElement::Decl(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{OfflineResolver, SelfContainedVerifier};
    use wdx_lang::ast::{Declaration, Task, Workflow};
    use wdx_lang::Type;

    fn echo_task(name: &str) -> Task {
        Task {
            name: name.into(),
            declarations: vec![Declaration::unbound("i", Type::Int)],
            command: "echo ${i}".into(),
            outputs: vec![Declaration::unbound("result", Type::Int)],
            ..Task::default()
        }
    }

    fn compile(source: &Namespace, options: CompileOptions) -> Result<Compiled, CompileError> {
        compile_namespace(source, options, &OfflineResolver, &SelfContainedVerifier)
    }

    #[test]
    fn task_only_namespace_compiles_to_applets() {
        let source = Namespace {
            tasks: vec![echo_task("Inc"), echo_task("Twice")],
            workflow: None,
        };
        let compiled = compile(&source, CompileOptions::default()).unwrap();
        assert!(compiled.namespace.workflow.is_none());
        assert_eq!(
            compiled.namespace.applets.keys().collect::<Vec<_>>(),
            vec!["Inc", "Twice"]
        );
    }

    #[test]
    fn tasks_sort_before_the_workflow() {
        let source = Namespace {
            tasks: vec![echo_task("Inc")],
            workflow: Some(Workflow {
                name: "w".into(),
                elements: vec![WorkflowElement::Call(Call {
                    task: "Inc".into(),
                    inputs: vec![("i".into(), wdx_lang::Expr::Int(1))],
                    ..Call::default()
                })],
                ..Workflow::default()
            }),
        };
        assert_eq!(dependency_order(&source).unwrap(), vec!["Inc", "w"]);
    }

    #[test]
    fn unresolved_call_target_is_fatal() {
        let source = Namespace {
            tasks: vec![],
            workflow: Some(Workflow {
                name: "w".into(),
                elements: vec![WorkflowElement::Call(Call {
                    task: "Ghost".into(),
                    ..Call::default()
                })],
                ..Workflow::default()
            }),
        };
        let err = compile(&source, CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnresolvedCall(_)));
    }

    #[test]
    fn calling_the_workflow_is_unsupported() {
        let source = Namespace {
            tasks: vec![],
            workflow: Some(Workflow {
                name: "w".into(),
                elements: vec![WorkflowElement::Call(Call {
                    task: "w".into(),
                    ..Call::default()
                })],
                ..Workflow::default()
            }),
        };
        let err = compile(&source, CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::Unsupported(_)));
    }

    #[test]
    fn verbose_compilation_reports_a_summary() {
        let source = Namespace {
            tasks: vec![echo_task("Inc")],
            workflow: None,
        };
        let options = CompileOptions {
            verbosity: Verbosity::Verbose,
            ..CompileOptions::default()
        };
        let compiled = compile(&source, options).unwrap();
        assert_eq!(compiled.warnings.len(), 1);
        assert_eq!(compiled.warnings[0].code, INFO_COMPILE_SUMMARY);
    }
}
