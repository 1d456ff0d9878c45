#![allow(dead_code)]

use qbasic::mach::{compile, execute, CapturePlatform, CompileOptions, ExecOptions};

/// Compile and run a program, returning everything it printed.
pub fn run(source: &str) -> String {
    run_with(source, &[])
}

pub fn run_with(source: &str, inputs: &[&str]) -> String {
    let compilation = compile(source, &CompileOptions::default())
        .unwrap_or_else(|error| panic!("compile failed: {}", error));
    let mut platform = CapturePlatform::with_inputs(inputs);
    execute(&compilation.program, &mut platform, &ExecOptions::default())
        .unwrap_or_else(|error| panic!("execution failed: {}", error));
    platform.output
}

/// The numeric error code a program fails with, at compile time or at
/// runtime.
pub fn run_code(source: &str) -> u16 {
    match compile(source, &CompileOptions::default()) {
        Err(error) => error.code(),
        Ok(compilation) => {
            let mut platform = CapturePlatform::new();
            match execute(&compilation.program, &mut platform, &ExecOptions::default()) {
                Err(error) => error.code(),
                Ok(()) => panic!("expected an error"),
            }
        }
    }
}
