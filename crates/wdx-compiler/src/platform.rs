//! External collaborator seams.
//!
//! The pass talks to two opaque services: the platform object store (to
//! resolve `dx://` URLs to record ids) and the source parser (to confirm
//! that synthesized fragments are legal). Both are traits so deployments
//! wire in real clients while tests substitute fixtures.

use rustc_hash::FxHashMap;

use wdx_lang::ast::{Namespace, Task, WorkflowElement};
use wdx_lang::Expr;

use crate::expr_utils::referenced_names;

/// URL scheme of platform-stored objects.
pub const DX_URL_PREFIX: &str = "dx://";

/// Maps a platform URL to a record id.
pub trait PlatformResolver {
    fn resolve_dx_url(&self, url: &str) -> Result<String, String>;
}

/// Resolver for compilations with no platform connection; every lookup
/// fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineResolver;

impl PlatformResolver for OfflineResolver {
    fn resolve_dx_url(&self, url: &str) -> Result<String, String> {
        Err(format!("no platform connection to resolve '{}'", url))
    }
}

/// Fixed-table resolver for tests and preflighted uploads.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    records: FxHashMap<String, String>,
}

impl StaticResolver {
    pub fn with_record(mut self, url: impl Into<String>, record_id: impl Into<String>) -> Self {
        self.records.insert(url.into(), record_id.into());
        self
    }
}

impl PlatformResolver for StaticResolver {
    fn resolve_dx_url(&self, url: &str) -> Result<String, String> {
        self.records
            .get(url)
            .cloned()
            .ok_or_else(|| format!("object not found: '{}'", url))
    }
}

/// Confirms that a synthesized fragment is legal source. `source` is the
/// pretty-printed form handed to the external parser.
pub trait FragmentVerifier {
    fn verify(&self, fragment: &Namespace, source: &str) -> Result<(), String>;
}

/// In-repo verifier enforcing the self-containment contract: every call
/// inside the fragment targets a task carried by the fragment, every call
/// input names a formal of that task, and every free identifier of every
/// expression is bound by the fragment itself — an applet input
/// declaration or a lexically preceding definition.
///
/// A deployment with the real parser available plugs it in through
/// [`FragmentVerifier`] instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfContainedVerifier;

impl FragmentVerifier for SelfContainedVerifier {
    fn verify(&self, fragment: &Namespace, _source: &str) -> Result<(), String> {
        for task in &fragment.tasks {
            check_task(task)?;
        }
        if let Some(wf) = &fragment.workflow {
            let mut defined = Scope::default();
            check_elements(&wf.elements, &mut defined, fragment)?;
            if let Some(outputs) = &wf.outputs {
                for output in outputs {
                    check_expr(&output.expr, &defined)
                        .map_err(|e| format!("workflow output '{}': {}", output.name, e))?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Scope {
    names: rustc_hash::FxHashSet<String>,
}

impl Scope {
    fn define(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Trail lookup: a dotted reference is bound if any dot-prefix of it
    /// is.
    fn binds(&self, fqn: &str) -> bool {
        let mut key = fqn;
        loop {
            if self.names.contains(key) {
                return true;
            }
            match key.rfind('.') {
                Some(dot) => key = &key[..dot],
                None => return false,
            }
        }
    }
}

fn check_task(task: &Task) -> Result<(), String> {
    let mut defined = Scope::default();
    for decl in &task.declarations {
        if let Some(expr) = &decl.expr {
            check_expr(expr, &defined)
                .map_err(|e| format!("task '{}', declaration '{}': {}", task.name, decl.name, e))?;
        }
        defined.define(decl.name.clone());
    }
    for output in &task.outputs {
        if let Some(expr) = &output.expr {
            check_expr(expr, &defined)
                .map_err(|e| format!("task '{}', output '{}': {}", task.name, output.name, e))?;
        }
        defined.define(output.name.clone());
    }
    Ok(())
}

fn check_elements(
    elements: &[WorkflowElement],
    defined: &mut Scope,
    fragment: &Namespace,
) -> Result<(), String> {
    for element in elements {
        match element {
            WorkflowElement::Decl(decl) => {
                if let Some(expr) = &decl.expr {
                    check_expr(expr, defined)
                        .map_err(|e| format!("declaration '{}': {}", decl.name, e))?;
                }
                defined.define(decl.name.clone());
            }
            WorkflowElement::Call(call) => {
                let task = fragment
                    .find_task(&call.task)
                    .ok_or_else(|| format!("call '{}' targets a task missing from the fragment", call.task))?;
                for (input, expr) in &call.inputs {
                    if !task.declarations.iter().any(|d| &d.name == input) {
                        return Err(format!(
                            "call '{}' sets '{}', which task '{}' does not declare",
                            call.call_name(),
                            input,
                            task.name
                        ));
                    }
                    check_expr(expr, defined)
                        .map_err(|e| format!("call '{}' input '{}': {}", call.call_name(), input, e))?;
                }
                let name = call.call_name().to_string();
                for output in &task.outputs {
                    defined.define(format!("{}.{}", name, output.name));
                }
                defined.define(name);
            }
            WorkflowElement::Scatter(scatter) => {
                check_expr(&scatter.collection, defined)
                    .map_err(|e| format!("scatter collection: {}", e))?;
                defined.define(scatter.item.clone());
                check_elements(&scatter.body, defined, fragment)?;
            }
            WorkflowElement::Conditional(cond) => {
                check_expr(&cond.condition, defined)
                    .map_err(|e| format!("conditional guard: {}", e))?;
                check_elements(&cond.body, defined, fragment)?;
            }
        }
    }
    Ok(())
}

fn check_expr(expr: &Expr, defined: &Scope) -> Result<(), String> {
    let (chains, idents) = referenced_names(expr);
    for ident in idents {
        if !defined.binds(&ident) {
            return Err(format!("unbound identifier '{}'", ident));
        }
    }
    for chain in chains {
        if !defined.binds(&chain) {
            return Err(format!("unbound reference '{}'", chain));
        }
    }
    Ok(())
}
