//! Applets: the leaf executables of the IR.
//!
//! An applet is one unit the platform schedules. Beyond its typed
//! interface it records how an instance type is chosen, which container
//! image it runs in, which flavor of executable it is, and a
//! self-contained source fragment the runtime re-parses to execute the
//! inner body.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use wdx_lang::ast::Namespace as SourceFragment;

use crate::cvar::CVar;

/// Errors raised while constructing IR entities.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum IrError {
    /// Two interface variables sanitize to the same platform name.
    #[error("applet '{applet}': variables '{first}' and '{second}' collide as '{dx_name}'")]
    NameCollision {
        applet: String,
        first: String,
        second: String,
        dx_name: String,
    },
}

/// Resolved concrete instance requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceSpec {
    /// Platform instance name, when the task pinned one.
    pub dx_instance: Option<String>,
    pub memory_mb: Option<i64>,
    pub disk_gb: Option<i64>,
    pub cpu: Option<i64>,
}

/// How the execution instance is chosen for an applet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InstanceType {
    /// Platform default; used by synthesized applets.
    Default,
    /// The decision is deferred to job-start time because a runtime
    /// attribute did not evaluate to a constant.
    Runtime,
    /// All runtime attributes evaluated to constants.
    Concrete(InstanceSpec),
}

/// Container image resolution for an applet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DockerImage {
    /// No `docker` runtime attribute.
    None,
    /// Image fetched from the network at runtime.
    Network,
    /// Platform-stored image asset, resolved to a record id at compile
    /// time.
    DxAsset(String),
}

/// Maps each call name inside a block applet to the task it targets, so
/// the runtime can reconstruct the linkage.
pub type CallTable = IndexMap<String, String>;

/// The flavor of an applet. Block applets (`Scatter`, `ScatterCollect`,
/// `If`) form one family so the assembler can dispatch on them uniformly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AppletKind {
    /// A user task.
    Task,
    /// A wrapper around an existing platform executable.
    Native(String),
    /// Evaluates a run of declarations.
    Eval,
    /// Runs a scatter body; outputs are natively representable.
    Scatter(CallTable),
    /// Runs a scatter body; outputs need a collect step.
    ScatterCollect(CallTable),
    /// Runs a conditional body.
    If(CallTable),
    /// Moves non-final outputs into an archive folder after the run.
    WorkflowOutputReorg,
}

impl AppletKind {
    /// The call table, for the block-applet family.
    pub fn call_table(&self) -> Option<&CallTable> {
        match self {
            AppletKind::Scatter(calls)
            | AppletKind::ScatterCollect(calls)
            | AppletKind::If(calls) => Some(calls),
            _ => None,
        }
    }

    /// Whether this applet embeds a synthesized body fragment (as opposed
    /// to a user task's own source).
    pub fn is_synthetic(&self) -> bool {
        !matches!(self, AppletKind::Task | AppletKind::Native(_))
    }
}

/// A leaf IR executable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Applet {
    pub name: String,
    pub inputs: Vec<CVar>,
    pub outputs: Vec<CVar>,
    pub instance_type: InstanceType,
    pub docker: DockerImage,
    pub kind: AppletKind,
    /// Self-contained source fragment: stub callees plus the inner body.
    /// Verified against the external parser at construction time.
    pub fragment: SourceFragment,
}

impl Applet {
    /// Builds an applet, enforcing that no two inputs (and no two outputs)
    /// share a sanitized platform name.
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<CVar>,
        outputs: Vec<CVar>,
        instance_type: InstanceType,
        docker: DockerImage,
        kind: AppletKind,
        fragment: SourceFragment,
    ) -> Result<Self, IrError> {
        let name = name.into();
        check_interface(&name, &inputs)?;
        check_interface(&name, &outputs)?;
        Ok(Self {
            name,
            inputs,
            outputs,
            instance_type,
            docker,
            kind,
            fragment,
        })
    }
}

fn check_interface(applet: &str, vars: &[CVar]) -> Result<(), IrError> {
    let mut seen: IndexMap<String, &str> = IndexMap::new();
    for var in vars {
        let dx_name = var.dx_name();
        if let Some(first) = seen.get(&dx_name) {
            return Err(IrError::NameCollision {
                applet: applet.to_string(),
                first: first.to_string(),
                second: var.name.clone(),
                dx_name,
            });
        }
        seen.insert(dx_name, &var.name);
    }
    Ok(())
}
