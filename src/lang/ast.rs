//! The located abstract syntax tree.
//!
//! Nodes are tagged unions visited by exhaustive matching. Fields that
//! semantic analysis fills in later (`spec`, resolution targets, symbol
//! tables) are present from construction as `Option`s or empty
//! containers, so the analyzer annotates in place without changing the
//! tree's shape.

use super::{DataTypeSpec, ElementaryType, Ident, Loc, SymbolTable};
use std::collections::HashSet;
use std::rc::Rc;

/// Root of one compilation: module-level statements, procedure and
/// TYPE declarations, plus analysis results.
#[derive(Debug, Default)]
pub struct Module {
    pub stmts: Vec<Stmt>,
    pub procs: Vec<Proc>,
    pub types: Vec<TypeDecl>,
    /// Module-scope variables; SHARED ones carry `SymbolScope::Global`
    /// and are visible inside procedures.
    pub vars: SymbolTable,
    pub labels: HashSet<Rc<str>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProcKind {
    Sub,
    Function,
}

impl std::fmt::Display for ProcKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ProcKind::Sub => write!(f, "SUB"),
            ProcKind::Function => write!(f, "FUNCTION"),
        }
    }
}

/// A SUB or FUNCTION definition. A FUNCTION's return value is an
/// implicit local variable named after the function itself.
#[derive(Debug)]
pub struct Proc {
    pub loc: Loc,
    pub kind: ProcKind,
    pub name: Rc<str>,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    pub param_symbols: SymbolTable,
    pub locals: SymbolTable,
    pub ret_spec: Option<DataTypeSpec>,
    pub labels: HashSet<Rc<str>>,
}

#[derive(Debug)]
pub struct Param {
    pub loc: Loc,
    pub ident: Ident,
    pub as_type: Option<TypeName>,
}

/// A parsed `AS`-clause type annotation, not yet resolved against the
/// module's TYPE declarations.
#[derive(Debug, PartialEq, Clone)]
pub enum TypeName {
    Elementary(ElementaryType),
    Udt(Rc<str>),
}

#[derive(Debug)]
pub struct TypeDecl {
    pub loc: Loc,
    pub name: Rc<str>,
    pub fields: Vec<FieldDecl>,
}

#[derive(Debug)]
pub struct FieldDecl {
    pub loc: Loc,
    pub name: Rc<str>,
    pub type_name: TypeName,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DimKind {
    Local,
    Shared,
    Static,
}

#[derive(Debug)]
pub struct DimVar {
    pub loc: Loc,
    pub ident: Ident,
    /// Array bounds as (min, max) expressions; min defaults to 0 when
    /// the source gives a single bound.
    pub bounds: Option<Vec<(Expr, Expr)>>,
    pub as_type: Option<TypeName>,
}

#[derive(Debug)]
pub enum Stmt {
    Label(Loc, Rc<str>),
    Dim(Loc, DimKind, Vec<DimVar>),
    Assign(Loc, Expr, Expr),
    Const(Loc, Ident, Expr),
    Goto(Loc, Rc<str>),
    Gosub(Loc, Rc<str>),
    Return(Loc, Option<Rc<str>>),
    If {
        loc: Loc,
        /// IF and ELSEIF branches in source order.
        branches: Vec<(Expr, Vec<Stmt>)>,
        else_body: Vec<Stmt>,
    },
    SelectCase {
        loc: Loc,
        test: Expr,
        arms: Vec<CaseArm>,
        else_body: Option<Vec<Stmt>>,
    },
    /// DO/LOOP and WHILE/WEND. `post` means the condition is tested
    /// after the body (LOOP WHILE/UNTIL); `until` negates it.
    CondLoop {
        loc: Loc,
        cond: Expr,
        until: bool,
        post: bool,
        body: Vec<Stmt>,
    },
    UncondLoop(Loc, Vec<Stmt>),
    ExitLoop(Loc),
    For {
        loc: Loc,
        counter: Expr,
        from: Expr,
        to: Expr,
        step: Option<Expr>,
    },
    Next(Loc, Vec<Expr>),
    ExitFor(Loc),
    Call(Loc, CallSite),
    ExitProc(Loc, ProcKind),
    End(Loc),
    Print {
        loc: Loc,
        using: Option<Expr>,
        items: Vec<PrintItem>,
    },
    Input {
        loc: Loc,
        prompt: Option<Rc<str>>,
        line: bool,
        vars: Vec<Expr>,
    },
    Data(Loc, Vec<DataItem>),
    Read(Loc, Vec<Expr>),
    Restore(Loc, Option<Rc<str>>),
    DefType(Loc, ElementaryType, Vec<(char, char)>),
    Swap(Loc, Expr, Expr),
}

impl Stmt {
    pub fn loc(&self) -> Loc {
        use Stmt::*;
        match self {
            Label(loc, ..)
            | Dim(loc, ..)
            | Assign(loc, ..)
            | Const(loc, ..)
            | Goto(loc, ..)
            | Gosub(loc, ..)
            | Return(loc, ..)
            | If { loc, .. }
            | SelectCase { loc, .. }
            | CondLoop { loc, .. }
            | UncondLoop(loc, ..)
            | ExitLoop(loc)
            | For { loc, .. }
            | Next(loc, ..)
            | ExitFor(loc)
            | Call(loc, ..)
            | ExitProc(loc, ..)
            | End(loc)
            | Print { loc, .. }
            | Input { loc, .. }
            | Data(loc, ..)
            | Read(loc, ..)
            | Restore(loc, ..)
            | DefType(loc, ..)
            | Swap(loc, ..) => *loc,
        }
    }
}

/// One CASE arm: any matching condition selects the body.
#[derive(Debug)]
pub struct CaseArm {
    pub loc: Loc,
    pub conds: Vec<CaseCond>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum CaseCond {
    /// `CASE expr`
    Value(Expr),
    /// `CASE lo TO hi`
    Range(Expr, Expr),
    /// `CASE IS <op> expr`
    Compare(BinOp, Expr),
}

/// A SUB invocation (CALL or bare-name form) or, inside an expression,
/// a FUNCTION/built-in call. `target` and `by_ref` are filled in by
/// semantic analysis.
#[derive(Debug)]
pub struct CallSite {
    pub name: Rc<str>,
    pub args: Vec<Expr>,
    pub target: Option<CallTarget>,
    pub by_ref: Vec<bool>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CallTarget {
    /// Index into Module::procs.
    User(usize),
    /// Index into the built-in table, plus the matched overload.
    Builtin(usize, usize),
}

#[derive(Debug)]
pub enum PrintItem {
    Expr(Expr),
    /// `,` advances to the next 14-column print zone.
    Comma,
    /// `;` prints with no separation.
    Semicolon,
}

#[derive(Debug, Clone)]
pub enum DataItem {
    Number(f64),
    String(Rc<str>),
}

#[derive(Debug)]
pub struct Expr {
    pub loc: Loc,
    /// Resolved type, populated by semantic analysis.
    pub spec: Option<DataTypeSpec>,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(loc: Loc, kind: ExprKind) -> Expr {
        Expr {
            loc,
            spec: None,
            kind,
        }
    }

    /// The annotated elementary type, if any.
    pub fn elem(&self) -> Option<ElementaryType> {
        self.spec.as_ref().and_then(|s| s.elementary())
    }

    /// Whether this (post-analysis) expression denotes an assignable
    /// storage location. CONST-bound names are excluded by the
    /// analyzer before this is consulted.
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Var { .. } | ExprKind::Subscript { .. } | ExprKind::Member { .. }
        )
    }
}

#[derive(Debug)]
pub enum ExprKind {
    Integer(i16),
    Long(i32),
    Single(f32),
    Double(f64),
    StringLit(Rc<str>),
    Var {
        ident: Ident,
        scope: Option<VarRefScope>,
    },
    /// `name(args)`: either a FUNCTION/built-in call or an array
    /// subscript; the analyzer rewrites subscripts to
    /// [`ExprKind::Subscript`].
    FnCall(CallSite),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Subscript {
        array: Box<Expr>,
        indices: Vec<Expr>,
    },
    Member {
        record: Box<Expr>,
        field: Rc<str>,
    },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum VarRefScope {
    Arg,
    Local,
    Global,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BinOp {
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

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnOp {
    Neg,
    Not,
}
