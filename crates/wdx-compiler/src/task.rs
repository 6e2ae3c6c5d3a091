//! Task lowering.
//!
//! A task becomes one applet: its inputs are the declarations that can be
//! supplied from outside (unassigned, constant-defaulted, or optional),
//! its outputs are the task outputs verbatim, and the embedded fragment is
//! the task source itself. Instance-type and docker decisions are made
//! here by folding the runtime attributes against an empty environment.

use wdx_ir::{Applet, AppletKind, CVar, DockerImage, InstanceSpec, InstanceType};
use wdx_lang::ast::Task;
use wdx_lang::{print, Expr, Namespace, Value};

use crate::errors::{at, CompileError};
use crate::expr_utils::try_const_eval;
use crate::platform::{FragmentVerifier, PlatformResolver, DX_URL_PREFIX};

/// Lowers a task to an applet.
pub fn compile_task(
    task: &Task,
    resolver: &dyn PlatformResolver,
    verifier: &dyn FragmentVerifier,
) -> Result<Applet, CompileError> {
    let inputs = task_inputs(task);
    let outputs: Vec<CVar> = task
        .outputs
        .iter()
        .map(|decl| CVar::new(decl.name.clone(), decl.ty.clone()))
        .collect();

    let instance_type = instance_type(task);
    let (docker, resolved_record) = docker_image(task, resolver)?;

    // The embedded fragment is the task itself; when the image resolved to
    // a platform asset, the attribute is rewritten so execution does not
    // repeat the lookup.
    let mut embedded = task.clone();
    if let Some(record_id) = resolved_record {
        embedded.runtime.insert(
            "docker".to_string(),
            Expr::String(format!("{}{}", DX_URL_PREFIX, record_id)),
        );
    }
    let fragment = Namespace {
        tasks: vec![embedded],
        workflow: None,
    };
    let source = print::namespace(&fragment);
    verifier
        .verify(&fragment, &source)
        .map_err(|reason| CompileError::IllegalFragment {
            reason,
            fragment: source,
        })?;

    let kind = match (task.meta.get("type"), task.meta.get("id")) {
        (Some(ty), Some(id)) if ty == "native" => AppletKind::Native(id.clone()),
        _ => AppletKind::Task,
    };

    Ok(Applet::new(
        task.name.clone(),
        inputs,
        outputs,
        instance_type,
        docker,
        kind,
        fragment,
    )?)
}

/// Declarations suppliable from outside the task: unassigned, assigned a
/// constant (which becomes the default), or optionally typed. Everything
/// else stays internal.
fn task_inputs(task: &Task) -> Vec<CVar> {
    let mut inputs = Vec::new();
    for decl in &task.declarations {
        match &decl.expr {
            None => inputs.push(CVar::new(decl.name.clone(), decl.ty.clone())),
            Some(expr) => {
                if let Some(value) = try_const_eval(expr) {
                    inputs.push(CVar::with_default(decl.name.clone(), decl.ty.clone(), value));
                } else if decl.ty.is_optional() {
                    inputs.push(CVar::new(decl.name.clone(), decl.ty.clone()));
                }
            }
        }
    }
    inputs
}

/// Folds the instance-shaping runtime attributes. Any attribute that is
/// present but not a parseable constant defers the decision to job-start
/// time.
fn instance_type(task: &Task) -> InstanceType {
    let mut spec = InstanceSpec::default();

    if let Some(expr) = task.runtime.get("dx_instance_type") {
        match try_const_eval(expr) {
            Some(Value::String(name)) => spec.dx_instance = Some(name),
            _ => return InstanceType::Runtime,
        }
    }
    if let Some(expr) = task.runtime.get("memory") {
        match try_const_eval(expr).as_ref().and_then(parse_memory_mb) {
            Some(mb) => spec.memory_mb = Some(mb),
            None => return InstanceType::Runtime,
        }
    }
    if let Some(expr) = task.runtime.get("disks") {
        match try_const_eval(expr).as_ref().and_then(parse_disk_gb) {
            Some(gb) => spec.disk_gb = Some(gb),
            None => return InstanceType::Runtime,
        }
    }
    if let Some(expr) = task.runtime.get("cpu") {
        match try_const_eval(expr).as_ref().and_then(parse_cpu) {
            Some(cores) => spec.cpu = Some(cores),
            None => return InstanceType::Runtime,
        }
    }
    InstanceType::Concrete(spec)
}

/// Accepts `"2 GB"`, `"2048MB"`, binary units, or a bare byte count.
fn parse_memory_mb(value: &Value) -> Option<i64> {
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes = match value {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        Value::String(s) => {
            let s = s.trim();
            let split = s
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .unwrap_or(s.len());
            let number: f64 = s[..split].parse().ok()?;
            let unit = s[split..].trim();
            let scale = match unit.to_ascii_uppercase().as_str() {
                "" | "B" => 1.0,
                "KB" => 1e3,
                "K" | "KIB" => 1024.0,
                "MB" => 1e6,
                "M" | "MIB" => MIB,
                "GB" => 1e9,
                "G" | "GIB" => 1024.0 * MIB,
                "TB" => 1e12,
                "T" | "TIB" => 1024.0 * 1024.0 * MIB,
                _ => return None,
            };
            number * scale
        }
        _ => return None,
    };
    if bytes <= 0.0 || !bytes.is_finite() {
        return None;
    }
    Some((bytes / MIB).ceil().max(1.0) as i64)
}

/// Accepts the `local-disk N <type>` form, `"N GB"`, or a bare gigabyte
/// count.
fn parse_disk_gb(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) if *n > 0 => Some(*n),
        Value::String(s) => {
            let mut tokens = s.split_whitespace();
            let first = tokens.next()?;
            if first == "local-disk" {
                tokens.next()?.parse().ok().filter(|gb| *gb > 0)
            } else {
                first.parse().ok().filter(|gb| *gb > 0)
            }
        }
        _ => None,
    }
}

fn parse_cpu(value: &Value) -> Option<i64> {
    match value {
        Value::Int(n) if *n > 0 => Some(*n),
        Value::Float(x) if *x > 0.0 => Some(x.ceil() as i64),
        Value::String(s) => s.trim().parse().ok().filter(|n| *n > 0),
        _ => None,
    }
}

/// Resolves the docker runtime attribute. Returns the image decision plus
/// the record id when a platform asset was resolved, so the caller can
/// rewrite the embedded attribute.
fn docker_image(
    task: &Task,
    resolver: &dyn PlatformResolver,
) -> Result<(DockerImage, Option<String>), CompileError> {
    let Some(expr) = task.runtime.get("docker") else {
        return Ok((DockerImage::None, None));
    };
    match try_const_eval(expr) {
        Some(Value::String(url)) if url.starts_with(DX_URL_PREFIX) => {
            let record_id = resolver.resolve_dx_url(&url).map_err(|reason| {
                CompileError::Platform(format!(
                    "task '{}': cannot resolve docker image '{}': {}{}",
                    task.name,
                    url,
                    reason,
                    at(task.pos)
                ))
            })?;
            Ok((DockerImage::DxAsset(record_id.clone()), Some(record_id)))
        }
        _ => Ok((DockerImage::Network, None)),
    }
}
