//! Shared checkers for the lowering-pass test suite: the quantified
//! invariants every compiled namespace must satisfy, asserted over whole
//! namespaces so individual tests stay focused on their scenario.

use wdx_ir::{Namespace, SArg};

/// Link validity: every link in a stage input points at an earlier stage
/// of the backbone, and the linked variable is among that stage's outputs.
pub fn assert_links_valid(ns: &Namespace) {
    let Some(wf) = &ns.workflow else { return };
    for (idx, stage) in wf.stages.iter().enumerate() {
        for sarg in &stage.inputs {
            if let SArg::Link { stage: source, cvar } = sarg {
                let earlier = wf.stages[..idx]
                    .iter()
                    .find(|s| &s.name == source)
                    .unwrap_or_else(|| {
                        panic!(
                            "stage '{}' links to '{}', which does not precede it",
                            stage.name, source
                        )
                    });
                assert!(
                    earlier.outputs.iter().any(|out| out.name == cvar.name),
                    "stage '{}' links to '{}.{}', which '{}' does not produce",
                    stage.name,
                    source,
                    cvar.name,
                    source
                );
            }
        }
    }
}

/// Arity alignment: stage inputs are positionally aligned with the bound
/// applet's inputs.
pub fn assert_arity_aligned(ns: &Namespace) {
    let Some(wf) = &ns.workflow else { return };
    for stage in &wf.stages {
        let applet = ns
            .applet(&stage.applet)
            .unwrap_or_else(|| panic!("stage '{}' binds unknown applet '{}'", stage.name, stage.applet));
        assert_eq!(
            stage.inputs.len(),
            applet.inputs.len(),
            "stage '{}' input arity differs from applet '{}'",
            stage.name,
            applet.name
        );
    }
}

/// Name sanitation: platform names carry no dots and are unique within
/// each side of every applet interface.
pub fn assert_names_sanitized(ns: &Namespace) {
    for applet in ns.applets.values() {
        for side in [&applet.inputs, &applet.outputs] {
            let mut seen = std::collections::HashSet::new();
            for cvar in side {
                let dx_name = cvar.dx_name();
                assert!(
                    !dx_name.contains('.'),
                    "applet '{}': '{}' is not sanitized",
                    applet.name,
                    dx_name
                );
                assert!(
                    seen.insert(dx_name.clone()),
                    "applet '{}': duplicate platform name '{}'",
                    applet.name,
                    dx_name
                );
            }
        }
    }
}

/// Runs every namespace-level invariant.
pub fn assert_invariants(ns: &Namespace) {
    assert_links_valid(ns);
    assert_arity_aligned(ns);
    assert_names_sanitized(ns);
}
