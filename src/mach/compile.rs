//! Source-to-program compilation.

use super::analyze::analyze;
use super::codegen::codegen;
use super::compiled::CompiledModule;
use crate::lang::ast::Module;
use crate::lang::{lex, parse, Error};
use std::rc::Rc;

#[derive(Debug, Default, Clone)]
pub struct CompileOptions {
    /// Source file name attached to diagnostics.
    pub file: Option<Rc<str>>,
}

#[derive(Debug)]
pub struct Compilation {
    pub program: CompiledModule,
    /// The analyzed tree, exposed for tooling.
    pub ast: Module,
}

impl Compilation {
    /// Human-readable listing of the compiled statement arrays.
    pub fn listing(&self) -> String {
        self.program.to_string()
    }
}

/// Run the full pipeline: lex, parse, analyze, lower.
pub fn compile(source: &str, options: &CompileOptions) -> Result<Compilation, Error> {
    let build = || -> Result<Compilation, Error> {
        let tokens = lex(source)?;
        let mut module = parse(&tokens)?;
        analyze(&mut module)?;
        let program = codegen(&module, options.file.clone())?;
        Ok(Compilation {
            program,
            ast: module,
        })
    };
    build().map_err(|error| match &options.file {
        Some(file) => error.in_file(file),
        None => error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_produces_listing() {
        let compilation = compile("PRINT \"HI\"", &CompileOptions::default()).unwrap();
        assert!(compilation.listing().contains("PRINT"));
    }

    #[test]
    fn test_ast_is_annotated() {
        let compilation = compile("A$ = \"X\"", &CompileOptions::default()).unwrap();
        assert!(compilation.ast.vars.lookup("A$").is_some());
    }

    #[test]
    fn test_error_carries_file_name() {
        let options = CompileOptions {
            file: Some("bad.bas".into()),
        };
        let error = compile("PRINT +", &options).unwrap_err();
        assert!(error.to_string().starts_with("bad.bas:"));
    }
}
