//! # wdx IR
//!
//! Intermediate representation produced by the lowering pass: named applets
//! (leaf computations) plus an optional linear pipeline of stages wiring
//! them together. Every entity is constructed once and is immutable
//! afterwards; applets reference each other by name only, never by
//! pointer, so the whole namespace serializes without cycles.

pub mod applet;
pub mod cvar;
pub mod reserved;
pub mod stage;

// Re-export commonly used types
pub use applet::{Applet, AppletKind, CallTable, DockerImage, InstanceSpec, InstanceType, IrError};
pub use cvar::{CallEnv, CVar, LinkedVar, SArg};
pub use stage::{Namespace, Stage, StageId, Workflow};
