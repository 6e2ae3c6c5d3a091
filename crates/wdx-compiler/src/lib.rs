//! # wdx Compiler
//!
//! Lowers a parsed, type-checked workflow namespace into the staged-graph
//! IR the platform executes: leaf applets plus a linear backbone of
//! stages wired together by symbolic links.
//!
//! The pass is single-threaded, synchronous, and deterministic: the same
//! source namespace and flags always produce an identical IR namespace.
//! The only external effects are the two collaborator seams in
//! [`platform`]: resolving platform URLs and re-parse-checking synthesized
//! fragments.

pub mod assemble;
pub mod blocks;
pub mod call;
pub mod closure;
pub mod compile;
pub mod errors;
pub mod eval_block;
pub mod expr_utils;
pub mod platform;
pub mod scope_block;
pub mod task;

// Re-export the public surface
pub use compile::{compile_namespace, Compiled, CompileOptions, Verbosity};
pub use errors::{CompileError, CompileWarning, DiagnosticSeverity};
pub use platform::{
    FragmentVerifier, OfflineResolver, PlatformResolver, SelfContainedVerifier, StaticResolver,
    DX_URL_PREFIX,
};
