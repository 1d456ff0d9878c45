//! The compiled program form: flat statement arrays addressed by
//! synthesized labels, with stack-code expressions.

use super::value::Val;
use crate::lang::ast::DataItem;
use crate::lang::{DataTypeSpec, ElementaryType, Loc};
use std::rc::Rc;

/// A whole compiled program: the module-level statement array plus one
/// statement array per procedure.
#[derive(Debug)]
pub struct CompiledModule {
    pub file: Option<Rc<str>>,
    pub stmts: Vec<CompiledStmt>,
    pub procs: Vec<CompiledProc>,
    /// Module-scope variables created before the first statement runs.
    pub vars: Vec<(Rc<str>, DataTypeSpec)>,
}

#[derive(Debug)]
pub struct CompiledProc {
    pub name: Rc<str>,
    pub is_function: bool,
    pub params: Vec<Rc<str>>,
    pub stmts: Vec<CompiledStmt>,
    /// Per-activation locals, created on every call.
    pub locals: Vec<(Rc<str>, DataTypeSpec)>,
    /// STATIC variables, created on first call and kept across calls.
    pub statics: Vec<(Rc<str>, DataTypeSpec)>,
}

/// One slot in a statement array: either an address or a runnable
/// operation tagged with its source location.
#[derive(Debug)]
pub enum CompiledStmt {
    Label(Rc<str>),
    Run { loc: Loc, op: Op },
}

#[derive(Debug)]
pub enum Op {
    Goto(Rc<str>),
    /// Jump to `dest` when the condition's truth equals `when`.
    Branch {
        cond: ExprCode,
        when: bool,
        dest: Rc<str>,
    },
    Gosub(Rc<str>),
    Return(Option<Rc<str>>),
    End,
    ExitProc,
    /// Create an array in the current frame; bounds are evaluated at
    /// execution time.
    Dim {
        name: Rc<str>,
        elem: DataTypeSpec,
        bounds: Option<Vec<(ExprCode, ExprCode)>>,
    },
    Assign {
        target: Target,
        expr: ExprCode,
        cast: Option<ElementaryType>,
        /// Record assignment copies the whole value.
        deep: bool,
    },
    Swap(Target, Target),
    Call {
        proc: usize,
        args: Vec<ArgCode>,
    },
    CallBuiltin {
        builtin: usize,
        overload: usize,
        args: Vec<ExprCode>,
    },
    Print {
        using: Option<ExprCode>,
        items: Vec<PrintCode>,
        newline: bool,
    },
    Input {
        prompt: Option<Rc<str>>,
        line: bool,
        targets: Vec<(Target, ElementaryType)>,
    },
    Data(Vec<DataItem>),
    Read(Vec<(Target, ElementaryType)>),
    Restore(Option<Rc<str>>),
}

#[derive(Debug)]
pub enum PrintCode {
    Expr(ExprCode),
    /// Advance to the next 14-column zone.
    Zone,
}

/// A storage location reference: a variable name plus a path of
/// subscripts and field selections, resolved against the running frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub name: Rc<str>,
    pub path: Vec<PathSeg>,
}

impl Target {
    pub fn var(name: Rc<str>) -> Target {
        Target { name, path: vec![] }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    Index(Vec<ExprCode>),
    Field(Rc<str>),
}

/// How one argument is passed: by reference as a storage location, or
/// by value as an evaluated expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgCode {
    ByRef(Target),
    ByVal(ExprCode),
}

/// Stack code for one expression, evaluated left to right on a value
/// stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprCode(pub Vec<EOp>);

#[derive(Debug, Clone, PartialEq)]
pub enum EOp {
    Const(Val),
    Load(Target),
    CallUser { proc: usize, args: Vec<ArgCode> },
    CallBuiltin { builtin: usize, overload: usize, args: Vec<ExprCode> },
    Cast(ElementaryType),
    Neg,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl std::fmt::Display for CompiledModule {
    /// A readable listing of the compiled program, one operation per
    /// line with its source line number.
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        list_stmts(f, &self.stmts)?;
        for proc in &self.procs {
            writeln!(
                f,
                "{} {}({})",
                if proc.is_function { "FUNCTION" } else { "SUB" },
                proc.name,
                proc.params
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )?;
            list_stmts(f, &proc.stmts)?;
        }
        Ok(())
    }
}

fn list_stmts(f: &mut std::fmt::Formatter, stmts: &[CompiledStmt]) -> std::fmt::Result {
    for stmt in stmts {
        match stmt {
            CompiledStmt::Label(name) => writeln!(f, "{}:", name)?,
            CompiledStmt::Run { loc, op } => writeln!(f, "    {:<8} {}", loc.to_string(), op)?,
        }
    }
    Ok(())
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Op::Goto(dest) => write!(f, "GOTO {}", dest),
            Op::Branch { cond: _, when, dest } => {
                write!(f, "BRANCH{} {}", if *when { "" } else { "NOT" }, dest)
            }
            Op::Gosub(dest) => write!(f, "GOSUB {}", dest),
            Op::Return(Some(dest)) => write!(f, "RETURN {}", dest),
            Op::Return(None) => write!(f, "RETURN"),
            Op::End => write!(f, "END"),
            Op::ExitProc => write!(f, "EXITPROC"),
            Op::Dim { name, .. } => write!(f, "DIM {}", name),
            Op::Assign { target, .. } => write!(f, "ASSIGN {}", target),
            Op::Swap(a, b) => write!(f, "SWAP {}, {}", a, b),
            Op::Call { proc, .. } => write!(f, "CALL #{}", proc),
            Op::CallBuiltin { builtin, .. } => write!(f, "SYSCALL #{}", builtin),
            Op::Print { .. } => write!(f, "PRINT"),
            Op::Input { .. } => write!(f, "INPUT"),
            Op::Data(items) => write!(f, "DATA ({})", items.len()),
            Op::Read(targets) => write!(f, "READ ({})", targets.len()),
            Op::Restore(Some(dest)) => write!(f, "RESTORE {}", dest),
            Op::Restore(None) => write!(f, "RESTORE"),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for seg in &self.path {
            match seg {
                PathSeg::Index(indices) => write!(f, "({})", indices.len())?,
                PathSeg::Field(name) => write!(f, ".{}", name)?,
            }
        }
        Ok(())
    }
}
