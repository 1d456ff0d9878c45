//! # QBasic
//!
//! A compiler and runtime for a QBasic/QuickBASIC dialect.
//!
//! Source text is lexed and parsed into a located AST, resolved and type
//! checked by a single-pass semantic analyzer, lowered into a flat,
//! label-addressed statement array, and executed by a directive-dispatch
//! interpreter. Terminal concerns live behind the [`mach::Platform`] trait.
//!
//! ```no_run
//! use qbasic::mach::{compile, execute, CompileOptions, ExecOptions, StdioPlatform};
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let compilation = compile("PRINT \"HELLO\"", &CompileOptions::default()).unwrap();
//! let mut platform = StdioPlatform::new(Arc::new(AtomicBool::new(false)));
//! execute(&compilation.program, &mut platform, &ExecOptions::default()).unwrap();
//! ```

pub mod lang;
pub mod mach;
