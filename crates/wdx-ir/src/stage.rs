//! Stages, the workflow backbone, and the namespace root.

use indexmap::IndexMap;
use serde::Serialize;

use crate::applet::Applet;
use crate::cvar::{CVar, SArg};

/// Unique stage identifier. Ids are assigned monotonically in block
/// emission order by a counter local to one workflow compilation, except
/// for the output section, which is pinned to the reserved last-stage id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageId(pub String);

impl StageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A node in the workflow backbone, bound to an applet by name.
///
/// `inputs` is positionally aligned with the applet's input variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    pub name: String,
    pub id: StageId,
    pub applet: String,
    pub inputs: Vec<SArg>,
    /// Copy of the applet's outputs, kept on the stage so links can be
    /// resolved without an applet lookup.
    pub outputs: Vec<CVar>,
}

/// The lowered workflow: a linear backbone of stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workflow {
    pub name: String,
    pub inputs: Vec<(CVar, SArg)>,
    pub outputs: Vec<(CVar, SArg)>,
    pub stages: Vec<Stage>,
    /// Locked workflows expose only their declared inputs and outputs;
    /// unlocked workflows additionally accept values for unbound call
    /// inputs of intermediate stages.
    pub locked: bool,
}

impl Workflow {
    pub fn find_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == name)
    }
}

/// The complete compilation result: applets by name plus an optional
/// workflow wiring them together.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Namespace {
    pub workflow: Option<Workflow>,
    pub applets: IndexMap<String, Applet>,
}

impl Namespace {
    pub fn applet(&self, name: &str) -> Option<&Applet> {
        self.applets.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wdx_lang::Type;

    #[test]
    fn stage_lookup_by_name() {
        let wf = Workflow {
            name: "w".into(),
            inputs: vec![],
            outputs: vec![],
            stages: vec![Stage {
                name: "Add".into(),
                id: StageId("stage-0".into()),
                applet: "Add".into(),
                inputs: vec![SArg::Empty],
                outputs: vec![CVar::new("result", Type::Int)],
            }],
            locked: true,
        };
        assert!(wf.find_stage("Add").is_some());
        assert!(wf.find_stage("Mul").is_none());
    }
}
