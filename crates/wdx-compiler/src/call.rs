//! Call lowering: a call becomes a stage bound to the callee's applet.
//!
//! Stage inputs are matched positionally against the applet's declared
//! inputs. A missing required input is fatal in a locked workflow; in an
//! unlocked workflow it is left empty for the platform to supply, with a
//! warning.

use indexmap::IndexMap;

use wdx_ir::reserved::is_legal_call_name;
use wdx_ir::{Applet, CVar, CallEnv, SArg, Stage, StageId};
use wdx_lang::ast::Call;
use wdx_lang::print;

use crate::closure::trail_search;
use crate::errors::{at, CompileError, CompileWarning, WARN_MISSING_CALL_INPUT};
use crate::expr_utils::try_const_eval;

/// Whether a callee input must be supplied at the call site.
pub(crate) fn is_required(formal: &CVar) -> bool {
    !formal.ty.is_optional() && formal.attrs.default.is_none()
}

/// Lowers a call to a stage referencing the callee's applet.
pub fn compile_call(
    call: &Call,
    env: &CallEnv,
    task_applets: &IndexMap<String, Applet>,
    locked: bool,
    id: StageId,
    warnings: &mut Vec<CompileWarning>,
) -> Result<Stage, CompileError> {
    let name = call.call_name();
    if !is_legal_call_name(name) {
        return Err(CompileError::IllegalCallName(format!(
            "'{}' collides with a reserved stage name{}",
            name,
            at(call.pos)
        )));
    }
    let applet = task_applets
        .get(&call.task)
        .ok_or_else(|| CompileError::UnresolvedCall(format!("'{}'{}", call.task, at(call.pos))))?;

    let mut inputs = Vec::with_capacity(applet.inputs.len());
    for formal in &applet.inputs {
        inputs.push(stage_arg(call, formal, env, locked, warnings)?);
    }

    Ok(Stage {
        name: name.to_string(),
        id,
        applet: applet.name.clone(),
        inputs,
        outputs: applet.outputs.clone(),
    })
}

fn stage_arg(
    call: &Call,
    formal: &CVar,
    env: &CallEnv,
    locked: bool,
    warnings: &mut Vec<CompileWarning>,
) -> Result<SArg, CompileError> {
    let Some(expr) = call.input(&formal.name) else {
        if is_required(formal) {
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
        }
        return Ok(SArg::Empty);
    };

    if let Some(chain) = expr.as_access_chain() {
        return match trail_search(env, &chain) {
            Some((_, linked)) => Ok(linked.sarg.clone()),
            None => Err(CompileError::UndefinedSymbol(format!(
                "'{}' in input '{}' of call '{}'{}",
                chain,
                formal.name,
                call.call_name(),
                at(call.pos)
            ))),
        };
    }
    if let Some(value) = try_const_eval(expr) {
        return Ok(SArg::Const(value));
    }
    Err(CompileError::NonConstInput(format!(
        "input '{}' of call '{}' is '{}'{}",
        formal.name,
        call.call_name(),
        print::expression(expr),
        at(call.pos)
    )))
}
