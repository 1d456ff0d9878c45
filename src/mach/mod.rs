//! Compilation pipeline and the machine that runs its output.
//!
//! `compile` turns source text into a flat statement program; `execute`
//! walks that program one statement at a time against a [`Platform`].

mod analyze;
mod builtin;
mod codegen;
mod compile;
mod compiled;
mod exec;
mod operation;
mod platform;
mod value;

pub use compile::{compile, CompileOptions, Compilation};
pub use compiled::{
    ArgCode, CompiledModule, CompiledProc, CompiledStmt, EOp, ExprCode, Op, PathSeg, PrintCode,
    Target,
};
pub use exec::{execute, ExecOptions};
pub use platform::{CapturePlatform, Platform, StdioPlatform};
pub use value::{Array, Ptr, Record, Val};
