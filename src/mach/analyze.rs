//! Semantic analysis: annotates the tree in place.
//!
//! Resolves TYPE declarations (rejecting recursive ones), builds the
//! symbol tables, types every expression, rewrites array subscripts
//! and implicit function calls out of the shared call syntax, folds
//! CONST references, and validates labels and call signatures.
//! Variables spring into existence on first use, typed by suffix or
//! the active DEFtype letter map.

use super::builtin;
use super::operation;
use super::value::Val;
use crate::error;
use crate::lang::ast::*;
use crate::lang::{
    coerce, DataTypeSpec, ElementaryType, Error, Ident, Loc, StorageKind, SymbolScope,
    SymbolTable, VarSymbol,
};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

pub fn analyze(module: &mut Module) -> Result<(), Error> {
    Analyzer::analyze(module)
}

struct ProcSig {
    kind: ProcKind,
    params: Vec<(Rc<str>, DataTypeSpec)>,
    ret: Option<DataTypeSpec>,
}

struct Analyzer {
    types: HashMap<Rc<str>, DataTypeSpec>,
    def_map: [ElementaryType; 26],
    sigs: Vec<ProcSig>,
    proc_index: HashMap<Rc<str>, usize>,
    globals: SymbolTable,
    global_consts: HashMap<Rc<str>, Val>,
}

/// The scope being analyzed: module level or one procedure body.
struct Frame<'a> {
    proc: Option<usize>,
    params: SymbolTable,
    locals: SymbolTable,
    consts: HashMap<Rc<str>, Val>,
    labels: &'a HashSet<Rc<str>>,
}

impl Analyzer {
    fn analyze(module: &mut Module) -> Result<(), Error> {
        let mut analyzer = Analyzer {
            types: HashMap::new(),
            def_map: [ElementaryType::Single; 26],
            sigs: vec![],
            proc_index: HashMap::new(),
            globals: SymbolTable::new(),
            global_consts: HashMap::new(),
        };
        analyzer.resolve_types(&module.types)?;
        analyzer.apply_def_types(&module.stmts)?;
        analyzer.register_procs(&module.procs)?;

        collect_labels(&module.stmts, &mut module.labels)?;
        for proc in module.procs.iter_mut() {
            collect_labels(&proc.body, &mut proc.labels)?;
        }

        // Module level first so SHARED declarations exist before the
        // procedure bodies resolve against them.
        let mut frame = Frame {
            proc: None,
            params: SymbolTable::new(),
            locals: SymbolTable::new(),
            consts: HashMap::new(),
            labels: &module.labels,
        };
        for stmt in module.stmts.iter_mut() {
            analyzer.stmt(&mut frame, stmt)?;
        }
        analyzer.globals = frame.locals;
        analyzer.global_consts = frame.consts;

        for (idx, proc) in module.procs.iter_mut().enumerate() {
            let Proc {
                loc,
                body,
                labels,
                param_symbols,
                locals,
                ret_spec,
                ..
            } = proc;
            let mut frame = Frame {
                proc: Some(idx),
                params: SymbolTable::new(),
                locals: SymbolTable::new(),
                consts: HashMap::new(),
                labels,
            };
            for (name, spec) in analyzer.sigs[idx].params.iter() {
                frame.params.insert(
                    VarSymbol {
                        name: name.clone(),
                        spec: spec.clone(),
                        storage: StorageKind::Arg,
                        scope: SymbolScope::Local,
                    },
                    *loc,
                )?;
            }
            for stmt in body.iter_mut() {
                analyzer.stmt(&mut frame, stmt)?;
            }
            *param_symbols = frame.params;
            *locals = frame.locals;
            *ret_spec = analyzer.sigs[idx].ret.clone();
        }

        module.vars = analyzer.globals;
        Ok(())
    }

    // *** Declaration collection

    fn resolve_types(&mut self, decls: &[TypeDecl]) -> Result<(), Error> {
        let mut by_name: HashMap<&str, &TypeDecl> = HashMap::new();
        for decl in decls {
            if by_name.insert(&decl.name, decl).is_some() {
                return Err(error!(DuplicateDefinition, decl.loc; format!("TYPE {}", decl.name)));
            }
        }
        let mut chain = vec![];
        for decl in decls {
            self.resolve_type(decl, &by_name, &mut chain)?;
        }
        Ok(())
    }

    fn resolve_type(
        &mut self,
        decl: &TypeDecl,
        by_name: &HashMap<&str, &TypeDecl>,
        chain: &mut Vec<Rc<str>>,
    ) -> Result<DataTypeSpec, Error> {
        if let Some(spec) = self.types.get(&decl.name) {
            return Ok(spec.clone());
        }
        if chain.contains(&decl.name) {
            let mut names: Vec<String> = chain.iter().map(|n| n.to_string()).collect();
            names.push(decl.name.to_string());
            return Err(
                error!(TypeMismatch, decl.loc; format!("RECURSIVE TYPE {}", names.join("."))),
            );
        }
        chain.push(decl.name.clone());
        let mut fields: Vec<(Rc<str>, DataTypeSpec)> = vec![];
        for field in &decl.fields {
            if fields.iter().any(|(name, _)| name == &field.name) {
                return Err(
                    error!(DuplicateDefinition, field.loc; format!("FIELD {}", field.name)),
                );
            }
            let spec = match &field.type_name {
                TypeName::Elementary(t) => DataTypeSpec::Elementary(*t),
                TypeName::Udt(name) => match by_name.get(&**name) {
                    Some(inner) => self.resolve_type(inner, by_name, chain)?,
                    None => {
                        return Err(
                            error!(TypeMismatch, field.loc; format!("UNDEFINED TYPE {}", name)),
                        )
                    }
                },
            };
            fields.push((field.name.clone(), spec));
        }
        chain.pop();
        let spec = DataTypeSpec::Udt {
            name: decl.name.clone(),
            fields,
        };
        self.types.insert(decl.name.clone(), spec.clone());
        Ok(spec)
    }

    /// DEFtype letter ranges apply module-wide, in statement order.
    fn apply_def_types(&mut self, stmts: &[Stmt]) -> Result<(), Error> {
        for stmt in stmts {
            if let Stmt::DefType(_, elem, ranges) = stmt {
                for (from, to) in ranges {
                    let from = from.to_ascii_uppercase() as usize - 'A' as usize;
                    let to = to.to_ascii_uppercase() as usize - 'A' as usize;
                    for entry in self.def_map[from..=to].iter_mut() {
                        *entry = *elem;
                    }
                }
            }
        }
        Ok(())
    }

    fn register_procs(&mut self, procs: &[Proc]) -> Result<(), Error> {
        for (idx, proc) in procs.iter().enumerate() {
            if self.proc_index.insert(proc.name.clone(), idx).is_some() {
                return Err(error!(DuplicateDefinition, proc.loc; format!("{}", proc.name)));
            }
            let mut params = vec![];
            for param in &proc.params {
                let spec = match &param.as_type {
                    Some(type_name) => self.resolve_type_name(type_name, param.loc)?,
                    None => self.ident_spec(&param.ident),
                };
                params.push((param.ident.name().clone(), spec));
            }
            let ret = match proc.kind {
                ProcKind::Sub => None,
                ProcKind::Function => {
                    Some(DataTypeSpec::Elementary(self.name_elem(&proc.name)))
                }
            };
            self.sigs.push(ProcSig {
                kind: proc.kind,
                params,
                ret,
            });
        }
        Ok(())
    }

    // *** Name typing helpers

    fn def_of(&self, name: &str) -> ElementaryType {
        match name.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => {
                self.def_map[c.to_ascii_uppercase() as usize - 'A' as usize]
            }
            _ => ElementaryType::Single,
        }
    }

    /// Elementary type of a name, by suffix else DEFtype letter.
    fn name_elem(&self, name: &str) -> ElementaryType {
        match name.chars().last() {
            Some('%') => ElementaryType::Integer,
            Some('&') => ElementaryType::Long,
            Some('!') => ElementaryType::Single,
            Some('#') => ElementaryType::Double,
            Some('$') => ElementaryType::String,
            _ => self.def_of(name),
        }
    }

    fn ident_spec(&self, ident: &Ident) -> DataTypeSpec {
        DataTypeSpec::Elementary(self.name_elem(ident.name()))
    }

    fn resolve_type_name(&self, type_name: &TypeName, loc: Loc) -> Result<DataTypeSpec, Error> {
        match type_name {
            TypeName::Elementary(t) => Ok(DataTypeSpec::Elementary(*t)),
            TypeName::Udt(name) => self
                .types
                .get(name)
                .cloned()
                .ok_or_else(|| error!(TypeMismatch, loc; format!("UNDEFINED TYPE {}", name))),
        }
    }

    fn lookup_var(&self, frame: &Frame, name: &str) -> Option<(DataTypeSpec, VarRefScope)> {
        if let Some(idx) = frame.proc {
            let sig = &self.sigs[idx];
            if sig.kind == ProcKind::Function && &*self.sig_name(idx) == name {
                if let Some(ret) = &sig.ret {
                    return Some((ret.clone(), VarRefScope::Local));
                }
            }
        }
        if let Some(symbol) = frame.params.lookup(name) {
            return Some((symbol.spec.clone(), VarRefScope::Arg));
        }
        // CONST names resolve through the value map, not as storage.
        if let Some(symbol) = frame.locals.lookup(name) {
            if symbol.storage != StorageKind::Const {
                return Some((symbol.spec.clone(), VarRefScope::Local));
            }
            return None;
        }
        if frame.proc.is_some() {
            if let Some(symbol) = self.globals.lookup(name) {
                if symbol.scope == SymbolScope::Global && symbol.storage != StorageKind::Const {
                    return Some((symbol.spec.clone(), VarRefScope::Global));
                }
            }
        }
        None
    }

    fn sig_name(&self, idx: usize) -> Rc<str> {
        self.proc_index
            .iter()
            .find(|(_, i)| **i == idx)
            .map(|(name, _)| name.clone())
            .unwrap_or_else(|| "".into())
    }

    fn lookup_const(&self, frame: &Frame, name: &str) -> Option<Val> {
        frame
            .consts
            .get(name)
            .or_else(|| self.global_consts.get(name))
            .cloned()
    }

    // *** Statements

    fn stmt(&mut self, frame: &mut Frame, stmt: &mut Stmt) -> Result<(), Error> {
        match stmt {
            Stmt::Label(..) | Stmt::Data(..) | Stmt::DefType(..) => Ok(()),
            Stmt::Dim(loc, kind, vars) => self.dim(frame, *loc, *kind, vars),
            Stmt::Assign(loc, target, expr) => {
                self.expr_lvalue(frame, target)?;
                self.expr(frame, expr)?;
                let tspec = target.spec.as_ref().ok_or_else(|| error!(InternalError, *loc))?;
                let espec = expr.spec.as_ref().ok_or_else(|| error!(InternalError, *loc))?;
                if !tspec.assignable_from(espec) {
                    return Err(
                        error!(TypeMismatch, *loc; format!("CANNOT ASSIGN {} TO {}", espec, tspec)),
                    );
                }
                Ok(())
            }
            Stmt::Const(loc, ident, expr) => {
                self.expr(frame, expr)?;
                let val = const_eval(expr)?;
                let val = match ident {
                    Ident::Plain(_) => val,
                    _ => val.cast_to(self.name_elem(ident.name())).map_err(|e| e.at(*loc))?,
                };
                let spec = DataTypeSpec::Elementary(match &val {
                    Val::Integer(_) => ElementaryType::Integer,
                    Val::Long(_) => ElementaryType::Long,
                    Val::Single(_) => ElementaryType::Single,
                    Val::Double(_) => ElementaryType::Double,
                    _ => ElementaryType::String,
                });
                frame.locals.insert(
                    VarSymbol {
                        name: ident.name().clone(),
                        spec,
                        storage: StorageKind::Const,
                        scope: SymbolScope::Local,
                    },
                    *loc,
                )?;
                frame.consts.insert(ident.name().clone(), val);
                Ok(())
            }
            Stmt::Goto(loc, label) | Stmt::Gosub(loc, label) => {
                self.check_label(frame, *loc, label)
            }
            Stmt::Return(loc, Some(label)) => self.check_label(frame, *loc, label),
            Stmt::Return(_, None) | Stmt::End(_) | Stmt::ExitLoop(_) | Stmt::ExitFor(_) => Ok(()),
            Stmt::If {
                branches,
                else_body,
                ..
            } => {
                for (cond, body) in branches.iter_mut() {
                    self.numeric_expr(frame, cond)?;
                    for stmt in body.iter_mut() {
                        self.stmt(frame, stmt)?;
                    }
                }
                for stmt in else_body.iter_mut() {
                    self.stmt(frame, stmt)?;
                }
                Ok(())
            }
            Stmt::SelectCase {
                loc,
                test,
                arms,
                else_body,
            } => {
                self.expr(frame, test)?;
                let test_spec = test
                    .spec
                    .clone()
                    .filter(|s| s.elementary().is_some())
                    .ok_or_else(|| error!(TypeMismatch, *loc; "SELECT CASE TEST"))?;
                for arm in arms.iter_mut() {
                    for cond in arm.conds.iter_mut() {
                        let exprs: Vec<&mut Expr> = match cond {
                            CaseCond::Value(e) | CaseCond::Compare(_, e) => vec![e],
                            CaseCond::Range(a, b) => vec![a, b],
                        };
                        for e in exprs {
                            self.expr(frame, e)?;
                            let spec = e
                                .spec
                                .as_ref()
                                .ok_or_else(|| error!(InternalError, e.loc))?;
                            if !test_spec.comparable_with(spec) {
                                return Err(error!(TypeMismatch, e.loc; "CASE VALUE"));
                            }
                        }
                    }
                    for stmt in arm.body.iter_mut() {
                        self.stmt(frame, stmt)?;
                    }
                }
                if let Some(body) = else_body {
                    for stmt in body.iter_mut() {
                        self.stmt(frame, stmt)?;
                    }
                }
                Ok(())
            }
            Stmt::CondLoop { cond, body, .. } => {
                self.numeric_expr(frame, cond)?;
                for stmt in body.iter_mut() {
                    self.stmt(frame, stmt)?;
                }
                Ok(())
            }
            Stmt::UncondLoop(_, body) => {
                for stmt in body.iter_mut() {
                    self.stmt(frame, stmt)?;
                }
                Ok(())
            }
            Stmt::For {
                loc,
                counter,
                from,
                to,
                step,
            } => {
                self.expr_lvalue(frame, counter)?;
                if !counter.spec.as_ref().map(|s| s.is_numeric()).unwrap_or(false) {
                    return Err(error!(TypeMismatch, *loc; "FOR COUNTER"));
                }
                self.numeric_expr(frame, from)?;
                self.numeric_expr(frame, to)?;
                if let Some(step) = step {
                    self.numeric_expr(frame, step)?;
                }
                Ok(())
            }
            Stmt::Next(loc, counters) => {
                for counter in counters.iter_mut() {
                    self.expr_lvalue(frame, counter)?;
                    if !counter.spec.as_ref().map(|s| s.is_numeric()).unwrap_or(false) {
                        return Err(error!(TypeMismatch, *loc; "NEXT COUNTER"));
                    }
                }
                Ok(())
            }
            Stmt::Call(loc, site) => self.resolve_sub_call(frame, *loc, site),
            Stmt::ExitProc(loc, kind) => match frame.proc {
                Some(idx) if self.sigs[idx].kind == *kind => Ok(()),
                _ => Err(error!(ExitWithoutContext, *loc; format!("EXIT {}", kind))),
            },
            Stmt::Print { using, items, .. } => {
                if let Some(format) = using {
                    self.expr(frame, format)?;
                    if format.elem() != Some(ElementaryType::String) {
                        return Err(error!(TypeMismatch, format.loc; "PRINT USING FORMAT"));
                    }
                }
                for item in items.iter_mut() {
                    if let PrintItem::Expr(expr) = item {
                        self.expr(frame, expr)?;
                        if expr.elem().is_none() {
                            return Err(error!(TypeMismatch, expr.loc; "PRINT ITEM"));
                        }
                    }
                }
                Ok(())
            }
            Stmt::Input { vars, .. } => {
                for var in vars.iter_mut() {
                    self.expr_lvalue(frame, var)?;
                    if var.elem().is_none() {
                        return Err(error!(TypeMismatch, var.loc; "INPUT VARIABLE"));
                    }
                }
                Ok(())
            }
            Stmt::Read(_, vars) => {
                for var in vars.iter_mut() {
                    self.expr_lvalue(frame, var)?;
                    if var.elem().is_none() {
                        return Err(error!(TypeMismatch, var.loc; "READ VARIABLE"));
                    }
                }
                Ok(())
            }
            Stmt::Restore(loc, Some(label)) => self.check_label(frame, *loc, label),
            Stmt::Restore(_, None) => Ok(()),
            Stmt::Swap(loc, a, b) => {
                self.expr_lvalue(frame, a)?;
                self.expr_lvalue(frame, b)?;
                let aspec = a.spec.as_ref().ok_or_else(|| error!(InternalError, *loc))?;
                let bspec = b.spec.as_ref().ok_or_else(|| error!(InternalError, *loc))?;
                if !aspec.assignable_from(bspec) {
                    return Err(error!(TypeMismatch, *loc; "SWAP OPERANDS"));
                }
                Ok(())
            }
        }
    }

    fn check_label(&self, frame: &Frame, loc: Loc, label: &Rc<str>) -> Result<(), Error> {
        if frame.labels.contains(label) {
            Ok(())
        } else {
            Err(error!(UndefinedLabel, loc; format!("{}", label)))
        }
    }

    fn dim(
        &mut self,
        frame: &mut Frame,
        loc: Loc,
        kind: DimKind,
        vars: &mut [DimVar],
    ) -> Result<(), Error> {
        match kind {
            DimKind::Shared if frame.proc.is_some() => {
                return Err(error!(SyntaxError, loc; "SHARED ONLY AT MODULE LEVEL"));
            }
            DimKind::Static if frame.proc.is_none() => {
                return Err(error!(SyntaxError, loc; "STATIC ONLY IN A PROCEDURE"));
            }
            _ => {}
        }
        for var in vars.iter_mut() {
            let base = match &var.as_type {
                Some(type_name) => self.resolve_type_name(type_name, var.loc)?,
                None => self.ident_spec(&var.ident),
            };
            let spec = match &mut var.bounds {
                Some(bounds) => {
                    let mut dims = vec![];
                    for (min, max) in bounds.iter_mut() {
                        self.numeric_expr(frame, min)?;
                        self.numeric_expr(frame, max)?;
                        // Constant bounds land in the static spec;
                        // runtime bounds are rechecked at execution.
                        let lo = const_eval(min).ok().and_then(|v| v.as_i64().ok()).unwrap_or(0);
                        let hi = const_eval(max).ok().and_then(|v| v.as_i64().ok()).unwrap_or(0);
                        dims.push((lo, hi));
                    }
                    DataTypeSpec::Array {
                        elem: Box::new(base),
                        dims,
                    }
                }
                None => base,
            };
            let name = var.ident.name().clone();
            let scope = if kind == DimKind::Shared {
                SymbolScope::Global
            } else {
                SymbolScope::Local
            };
            let storage = if kind == DimKind::Static {
                StorageKind::StaticVar
            } else {
                StorageKind::Var
            };
            if kind == DimKind::Shared && frame.locals.lookup(&name).is_some() {
                frame.locals.promote_to_global(&name, &spec, var.loc)?;
            } else {
                frame.locals.insert(
                    VarSymbol {
                        name,
                        spec,
                        storage,
                        scope,
                    },
                    var.loc,
                )?;
            }
        }
        Ok(())
    }

    // *** Expressions

    fn numeric_expr(&mut self, frame: &mut Frame, expr: &mut Expr) -> Result<(), Error> {
        self.expr(frame, expr)?;
        match expr.elem() {
            Some(t) if t.is_numeric() => Ok(()),
            _ => Err(error!(TypeMismatch, expr.loc; "EXPECTED NUMBER")),
        }
    }

    /// Analyze an expression required to denote storage.
    fn expr_lvalue(&mut self, frame: &mut Frame, expr: &mut Expr) -> Result<(), Error> {
        if let ExprKind::Var { ident, .. } = &expr.kind {
            if self.lookup_const(frame, ident.name()).is_some() {
                return Err(
                    error!(DuplicateDefinition, expr.loc; format!("CANNOT CHANGE CONSTANT {}", ident.name())),
                );
            }
        }
        self.expr(frame, expr)?;
        if !expr.is_lvalue() {
            return Err(error!(TypeMismatch, expr.loc; "EXPECTED VARIABLE"));
        }
        Ok(())
    }

    fn expr(&mut self, frame: &mut Frame, expr: &mut Expr) -> Result<(), Error> {
        match &mut expr.kind {
            ExprKind::Integer(_) => {
                expr.spec = Some(DataTypeSpec::Elementary(ElementaryType::Integer));
                Ok(())
            }
            ExprKind::Long(_) => {
                expr.spec = Some(DataTypeSpec::Elementary(ElementaryType::Long));
                Ok(())
            }
            ExprKind::Single(_) => {
                expr.spec = Some(DataTypeSpec::Elementary(ElementaryType::Single));
                Ok(())
            }
            ExprKind::Double(_) => {
                expr.spec = Some(DataTypeSpec::Elementary(ElementaryType::Double));
                Ok(())
            }
            ExprKind::StringLit(_) => {
                expr.spec = Some(DataTypeSpec::Elementary(ElementaryType::String));
                Ok(())
            }
            ExprKind::Var { .. } => self.var_expr(frame, expr),
            ExprKind::FnCall(_) => self.fn_call_expr(frame, expr),
            ExprKind::Binary { op, lhs, rhs } => {
                let op = *op;
                self.expr(frame, lhs)?;
                self.expr(frame, rhs)?;
                let loc = expr.loc;
                let l = lhs.elem().ok_or_else(|| error!(TypeMismatch, loc))?;
                let r = rhs.elem().ok_or_else(|| error!(TypeMismatch, loc))?;
                let result = self.binary_type(op, l, r, loc)?;
                expr.spec = Some(DataTypeSpec::Elementary(result));
                Ok(())
            }
            ExprKind::Unary { op, expr: inner } => {
                let op = *op;
                self.expr(frame, inner)?;
                let loc = expr.loc;
                let t = inner.elem().ok_or_else(|| error!(TypeMismatch, loc))?;
                if !t.is_numeric() {
                    return Err(error!(TypeMismatch, loc));
                }
                let result = match op {
                    UnOp::Neg => t,
                    UnOp::Not => match t {
                        ElementaryType::Integer => ElementaryType::Integer,
                        _ => ElementaryType::Long,
                    },
                };
                expr.spec = Some(DataTypeSpec::Elementary(result));
                Ok(())
            }
            ExprKind::Subscript { array, indices } => {
                // Only produced by this analyzer, but kept total.
                self.expr(frame, array)?;
                for index in indices.iter_mut() {
                    self.numeric_expr(frame, index)?;
                }
                let loc = expr.loc;
                match array.spec.clone() {
                    Some(DataTypeSpec::Array { elem, .. }) => {
                        expr.spec = Some(*elem);
                        Ok(())
                    }
                    _ => Err(error!(TypeMismatch, loc; "NOT AN ARRAY")),
                }
            }
            ExprKind::Member { record, field } => {
                let field = field.clone();
                self.expr(frame, record)?;
                let loc = expr.loc;
                match record.spec.clone() {
                    Some(DataTypeSpec::Udt { name, fields }) => {
                        match fields.iter().find(|(n, _)| n == &field) {
                            Some((_, spec)) => {
                                expr.spec = Some(spec.clone());
                                Ok(())
                            }
                            None => Err(
                                error!(TypeMismatch, loc; format!("NO FIELD {} IN {}", field, name)),
                            ),
                        }
                    }
                    _ => Err(error!(TypeMismatch, loc; "NOT A RECORD")),
                }
            }
        }
    }

    fn binary_type(
        &self,
        op: BinOp,
        l: ElementaryType,
        r: ElementaryType,
        loc: Loc,
    ) -> Result<ElementaryType, Error> {
        use ElementaryType::*;
        let both_string = l == String && r == String;
        match op {
            BinOp::Add => {
                if both_string {
                    Ok(String)
                } else {
                    coerce(l, r).ok_or_else(|| error!(TypeMismatch, loc))
                }
            }
            BinOp::Sub | BinOp::Mul => {
                coerce(l, r).ok_or_else(|| error!(TypeMismatch, loc))
            }
            BinOp::IDiv | BinOp::Mod => {
                if l.is_numeric() && r.is_numeric() {
                    Ok(if l == Integer && r == Integer { Integer } else { Long })
                } else {
                    Err(error!(TypeMismatch, loc))
                }
            }
            BinOp::And | BinOp::Or => {
                if l.is_numeric() && r.is_numeric() {
                    Ok(Integer)
                } else {
                    Err(error!(TypeMismatch, loc))
                }
            }
            // `/` and `^` are floating even on integral operands.
            BinOp::Div | BinOp::Pow => {
                if l.is_numeric() && r.is_numeric() {
                    Ok(if l == Double || r == Double { Double } else { Single })
                } else {
                    Err(error!(TypeMismatch, loc))
                }
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if (l.is_numeric() && r.is_numeric()) || both_string {
                    Ok(Integer)
                } else {
                    Err(error!(TypeMismatch, loc))
                }
            }
        }
    }

    fn var_expr(&mut self, frame: &mut Frame, expr: &mut Expr) -> Result<(), Error> {
        let loc = expr.loc;
        let ident = match &expr.kind {
            ExprKind::Var { ident, .. } => ident.clone(),
            _ => return Err(error!(InternalError, loc)),
        };
        let name = ident.name().clone();
        if let Some((spec, scope)) = self.lookup_var(frame, &name) {
            expr.kind = ExprKind::Var {
                ident,
                scope: Some(scope),
            };
            expr.spec = Some(spec);
            return Ok(());
        }
        if let Some(val) = self.lookup_const(frame, &name) {
            expr.spec = Some(DataTypeSpec::Elementary(match &val {
                Val::Integer(_) => ElementaryType::Integer,
                Val::Long(_) => ElementaryType::Long,
                Val::Single(_) => ElementaryType::Single,
                Val::Double(_) => ElementaryType::Double,
                _ => ElementaryType::String,
            }));
            expr.kind = val_to_kind(&val);
            return Ok(());
        }
        // A bare FUNCTION or argument-less built-in name reads as a
        // zero-argument call.
        if self.proc_index.contains_key(&name) || zero_arg_builtin(&name) {
            expr.kind = ExprKind::FnCall(CallSite {
                name,
                args: vec![],
                target: None,
                by_ref: vec![],
            });
            return self.fn_call_expr(frame, expr);
        }
        let spec = self.ident_spec(&ident);
        frame.locals.insert(
            VarSymbol {
                name: ident.name().clone(),
                spec: spec.clone(),
                storage: StorageKind::Var,
                scope: SymbolScope::Local,
            },
            loc,
        )?;
        expr.kind = ExprKind::Var {
            ident,
            scope: Some(VarRefScope::Local),
        };
        expr.spec = Some(spec);
        Ok(())
    }

    fn fn_call_expr(&mut self, frame: &mut Frame, expr: &mut Expr) -> Result<(), Error> {
        let loc = expr.loc;
        let name = match &expr.kind {
            ExprKind::FnCall(site) => site.name.clone(),
            _ => return Err(error!(InternalError, loc)),
        };
        // Array subscript wins over calls when the name is an array.
        // A scalar hit can still be a FUNCTION's return slot, which
        // shares the function's name; those fall through to the call
        // path so recursion works.
        if let Some((spec, scope)) = self.lookup_var(frame, &name) {
            match spec {
                DataTypeSpec::Array { elem, dims } => {
                    let site = match std::mem::replace(&mut expr.kind, ExprKind::Integer(0)) {
                        ExprKind::FnCall(site) => site,
                        _ => return Err(error!(InternalError, loc)),
                    };
                    let mut indices = site.args;
                    if indices.len() != dims.len() {
                        return Err(
                            error!(SubscriptOutOfRange, loc; format!("{} NEEDS {} SUBSCRIPTS", name, dims.len())),
                        );
                    }
                    for index in indices.iter_mut() {
                        self.numeric_expr(frame, index)?;
                    }
                    let mut array = Expr::new(loc, ExprKind::Var {
                        ident: ident_from_name(&name),
                        scope: Some(scope),
                    });
                    array.spec = Some(DataTypeSpec::Array {
                        elem: elem.clone(),
                        dims,
                    });
                    expr.kind = ExprKind::Subscript {
                        array: Box::new(array),
                        indices,
                    };
                    expr.spec = Some(*elem);
                    return Ok(());
                }
                _ if !self.proc_index.contains_key(&name) => {
                    return Err(error!(TypeMismatch, loc; format!("{} IS NOT AN ARRAY", name)))
                }
                _ => {}
            }
        }
        if let Some(&idx) = self.proc_index.get(&name) {
            if self.sigs[idx].kind != ProcKind::Function {
                return Err(error!(TypeMismatch, loc; format!("{} IS NOT A FUNCTION", name)));
            }
            let mut site = match std::mem::replace(&mut expr.kind, ExprKind::Integer(0)) {
                ExprKind::FnCall(site) => site,
                _ => return Err(error!(InternalError, loc)),
            };
            self.check_user_call(frame, loc, &mut site, idx)?;
            expr.spec = self.sigs[idx].ret.clone();
            expr.kind = ExprKind::FnCall(site);
            return Ok(());
        }
        if builtin::lookup_builtin(&name, &[]).is_some() {
            let mut site = match std::mem::replace(&mut expr.kind, ExprKind::Integer(0)) {
                ExprKind::FnCall(site) => site,
                _ => return Err(error!(InternalError, loc)),
            };
            let ret = self.check_builtin_call(frame, loc, &mut site, true)?;
            expr.spec = ret.map(DataTypeSpec::Elementary);
            expr.kind = ExprKind::FnCall(site);
            return Ok(());
        }
        Err(error!(UndefinedProcedure, loc; format!("{}", name)))
    }

    fn check_user_call(
        &mut self,
        frame: &mut Frame,
        loc: Loc,
        site: &mut CallSite,
        idx: usize,
    ) -> Result<(), Error> {
        if site.args.len() != self.sigs[idx].params.len() {
            return Err(
                error!(TypeMismatch, loc; format!("{} TAKES {} ARGUMENTS", site.name, self.sigs[idx].params.len())),
            );
        }
        let mut by_ref = vec![];
        for i in 0..site.args.len() {
            self.expr(frame, &mut site.args[i])?;
            let arg = &site.args[i];
            let pspec = &self.sigs[idx].params[i].1;
            let aspec = arg
                .spec
                .as_ref()
                .ok_or_else(|| error!(InternalError, arg.loc))?;
            if arg.is_lvalue() && aspec == pspec {
                by_ref.push(true);
            } else if pspec.assignable_from(aspec) {
                by_ref.push(false);
            } else {
                return Err(
                    error!(TypeMismatch, arg.loc; format!("ARGUMENT {} OF {}", i + 1, site.name)),
                );
            }
        }
        site.by_ref = by_ref;
        site.target = Some(CallTarget::User(idx));
        Ok(())
    }

    fn check_builtin_call(
        &mut self,
        frame: &mut Frame,
        loc: Loc,
        site: &mut CallSite,
        want_function: bool,
    ) -> Result<Option<ElementaryType>, Error> {
        for arg in site.args.iter_mut() {
            self.expr(frame, arg)?;
        }
        let kinds: Vec<Option<ElementaryType>> = site.args.iter().map(|a| a.elem()).collect();
        let (b, o) = match builtin::lookup_builtin(&site.name, &kinds) {
            Some(pair) => pair,
            None => return Err(error!(UndefinedProcedure, loc; format!("{}", site.name))),
        };
        let sig = &builtin::BUILTINS[b].overloads[o];
        let matches = sig.params.len() == kinds.len()
            && sig
                .params
                .iter()
                .zip(kinds.iter())
                .all(|(kind, arg)| match (kind, arg) {
                    (builtin::ParamKind::Num, Some(t)) => t.is_numeric(),
                    (builtin::ParamKind::Str, Some(ElementaryType::String)) => true,
                    _ => false,
                });
        if !matches {
            return Err(error!(TypeMismatch, loc; format!("ARGUMENTS OF {}", site.name)));
        }
        match (want_function, sig.ret) {
            (true, None) => {
                return Err(error!(TypeMismatch, loc; format!("{} IS NOT A FUNCTION", site.name)))
            }
            (false, Some(_)) => {
                return Err(error!(TypeMismatch, loc; format!("{} IS NOT A STATEMENT", site.name)))
            }
            _ => {}
        }
        site.by_ref = vec![false; site.args.len()];
        site.target = Some(CallTarget::Builtin(b, o));
        Ok(sig.ret)
    }

    fn resolve_sub_call(
        &mut self,
        frame: &mut Frame,
        loc: Loc,
        site: &mut CallSite,
    ) -> Result<(), Error> {
        if let Some(&idx) = self.proc_index.get(&site.name) {
            if self.sigs[idx].kind != ProcKind::Sub {
                return Err(error!(TypeMismatch, loc; format!("{} IS NOT A SUB", site.name)));
            }
            return self.check_user_call(frame, loc, site, idx);
        }
        if builtin::lookup_builtin(&site.name, &[]).is_some() {
            self.check_builtin_call(frame, loc, site, false)?;
            return Ok(());
        }
        Err(error!(UndefinedProcedure, loc; format!("{}", site.name)))
    }
}

fn zero_arg_builtin(name: &str) -> bool {
    builtin::BUILTINS
        .iter()
        .any(|b| b.name == name && b.overloads.iter().any(|o| o.params.is_empty() && o.ret.is_some()))
}

fn ident_from_name(name: &Rc<str>) -> Ident {
    match name.chars().last() {
        Some('$') => Ident::String(name.clone()),
        Some('%') => Ident::Integer(name.clone()),
        Some('&') => Ident::Long(name.clone()),
        Some('!') => Ident::Single(name.clone()),
        Some('#') => Ident::Double(name.clone()),
        _ => Ident::Plain(name.clone()),
    }
}

fn val_to_kind(val: &Val) -> ExprKind {
    match val {
        Val::Integer(n) => ExprKind::Integer(*n),
        Val::Long(n) => ExprKind::Long(*n),
        Val::Single(n) => ExprKind::Single(*n),
        Val::Double(n) => ExprKind::Double(*n),
        Val::String(s) => ExprKind::StringLit(s.clone()),
        _ => ExprKind::Integer(0),
    }
}

/// Evaluate an already-analyzed expression made of literals and
/// operators; anything else is not constant.
pub fn const_eval(expr: &Expr) -> Result<Val, Error> {
    let loc = expr.loc;
    match &expr.kind {
        ExprKind::Integer(n) => Ok(Val::Integer(*n)),
        ExprKind::Long(n) => Ok(Val::Long(*n)),
        ExprKind::Single(n) => Ok(Val::Single(*n)),
        ExprKind::Double(n) => Ok(Val::Double(*n)),
        ExprKind::StringLit(s) => Ok(Val::String(s.clone())),
        ExprKind::Unary { op, expr } => {
            let val = const_eval(expr)?;
            match op {
                UnOp::Neg => operation::neg(&val).map_err(|e| e.at(loc)),
                UnOp::Not => operation::not(&val).map_err(|e| e.at(loc)),
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let l = const_eval(lhs)?;
            let r = const_eval(rhs)?;
            let result = match op {
                BinOp::Add => operation::add(&l, &r),
                BinOp::Sub => operation::sub(&l, &r),
                BinOp::Mul => operation::mul(&l, &r),
                BinOp::Div => operation::div(&l, &r),
                BinOp::IDiv => operation::idiv(&l, &r),
                BinOp::Mod => operation::modulus(&l, &r),
                BinOp::Pow => operation::pow(&l, &r),
                BinOp::Eq => operation::compare(&l, &r).map(|o| Val::from_bool(o == std::cmp::Ordering::Equal)),
                BinOp::Ne => operation::compare(&l, &r).map(|o| Val::from_bool(o != std::cmp::Ordering::Equal)),
                BinOp::Lt => operation::compare(&l, &r).map(|o| Val::from_bool(o == std::cmp::Ordering::Less)),
                BinOp::Le => operation::compare(&l, &r).map(|o| Val::from_bool(o != std::cmp::Ordering::Greater)),
                BinOp::Gt => operation::compare(&l, &r).map(|o| Val::from_bool(o == std::cmp::Ordering::Greater)),
                BinOp::Ge => operation::compare(&l, &r).map(|o| Val::from_bool(o != std::cmp::Ordering::Less)),
                BinOp::And => operation::and(&l, &r),
                BinOp::Or => operation::or(&l, &r),
            };
            result.map_err(|e| e.at(loc))
        }
        _ => Err(error!(SyntaxError, loc; "EXPECTED CONSTANT")),
    }
}

fn collect_labels(stmts: &[Stmt], labels: &mut HashSet<Rc<str>>) -> Result<(), Error> {
    for stmt in stmts {
        match stmt {
            Stmt::Label(loc, name) => {
                if !labels.insert(name.clone()) {
                    return Err(error!(DuplicateDefinition, *loc; format!("LABEL {}", name)));
                }
            }
            Stmt::If {
                branches,
                else_body,
                ..
            } => {
                for (_, body) in branches {
                    collect_labels(body, labels)?;
                }
                collect_labels(else_body, labels)?;
            }
            Stmt::SelectCase {
                arms, else_body, ..
            } => {
                for arm in arms {
                    collect_labels(&arm.body, labels)?;
                }
                if let Some(body) = else_body {
                    collect_labels(body, labels)?;
                }
            }
            Stmt::CondLoop { body, .. } | Stmt::UncondLoop(_, body) => {
                collect_labels(body, labels)?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{lex, parse};

    fn analyzed(source: &str) -> Module {
        let mut module = parse(&lex(source).unwrap()).unwrap();
        analyze(&mut module).unwrap();
        module
    }

    fn analyze_err(source: &str) -> Error {
        let mut module = parse(&lex(source).unwrap()).unwrap();
        analyze(&mut module).unwrap_err()
    }

    #[test]
    fn test_auto_vivification_with_def_type() {
        let module = analyzed("DEFINT A-C\nA = 1\nX = 1");
        assert_eq!(
            module.vars.lookup("A").unwrap().spec,
            DataTypeSpec::Elementary(ElementaryType::Integer)
        );
        assert_eq!(
            module.vars.lookup("X").unwrap().spec,
            DataTypeSpec::Elementary(ElementaryType::Single)
        );
    }

    #[test]
    fn test_suffix_beats_def_type() {
        let module = analyzed("DEFINT A-Z\nA$ = \"S\"");
        assert_eq!(
            module.vars.lookup("A$").unwrap().spec,
            DataTypeSpec::Elementary(ElementaryType::String)
        );
    }

    #[test]
    fn test_subscript_rewrite() {
        let module = analyzed("DIM A(5)\nA(2) = 7");
        match &module.stmts[1] {
            Stmt::Assign(_, target, _) => {
                assert!(matches!(target.kind, ExprKind::Subscript { .. }));
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_recursive_type_names_chain() {
        let error = analyze_err(
            "TYPE A\nF AS B\nEND TYPE\nTYPE B\nG AS A\nEND TYPE\nDIM X AS A",
        );
        assert!(error.to_string().contains("A.B.A"), "{}", error);
    }

    #[test]
    fn test_const_folding() {
        let module = analyzed("CONST N = 3 + 4\nA = N * 2");
        match &module.stmts[1] {
            Stmt::Assign(_, _, expr) => match &expr.kind {
                ExprKind::Binary { lhs, .. } => {
                    assert!(matches!(lhs.kind, ExprKind::Integer(7)));
                }
                k => panic!("{:?}", k),
            },
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_assign_to_const_rejected() {
        let error = analyze_err("CONST N = 1\nN = 2");
        assert_eq!(error.code(), 10);
    }

    #[test]
    fn test_by_ref_requires_matching_lvalue() {
        let module = analyzed(
            "A% = 1\nBUMP A%\nBUMP 5\nSUB BUMP (N%)\nN% = N% + 1\nEND SUB",
        );
        match (&module.stmts[1], &module.stmts[2]) {
            (Stmt::Call(_, by_var), Stmt::Call(_, by_val)) => {
                assert_eq!(by_var.by_ref, vec![true]);
                assert_eq!(by_val.by_ref, vec![false]);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_shared_visibility() {
        // Unshared module variables are not visible in procs; the proc
        // gets its own fresh local instead.
        let module = analyzed(
            "DIM SHARED G\nDIM M\nSUB T\nG = 1\nM = 2\nEND SUB",
        );
        assert!(module.procs[0].locals.lookup("M").is_some());
        assert!(module.procs[0].locals.lookup("G").is_none());
    }

    #[test]
    fn test_undefined_label() {
        let error = analyze_err("GOTO NOWHERE");
        assert_eq!(error.code(), 8);
    }

    #[test]
    fn test_label_scope_is_per_proc() {
        let error = analyze_err("TOP:\nSUB T\nGOTO TOP\nEND SUB");
        assert_eq!(error.code(), 8);
        analyzed("SUB T\nTOP:\nGOTO TOP\nEND SUB");
    }

    #[test]
    fn test_implicit_function_call_without_parens() {
        let module = analyzed("A = TWO\nFUNCTION TWO\nTWO = 2\nEND FUNCTION");
        match &module.stmts[0] {
            Stmt::Assign(_, _, expr) => {
                assert!(matches!(expr.kind, ExprKind::FnCall(_)));
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_string_number_mismatch() {
        assert_eq!(analyze_err("A = \"X\" + 1").code(), 13);
        assert_eq!(analyze_err("A$ = 5").code(), 13);
    }

    #[test]
    fn test_exit_outside_context() {
        assert_eq!(analyze_err("EXIT SUB").code(), 26);
        assert_eq!(
            analyze_err("FUNCTION F\nEXIT SUB\nEND FUNCTION").code(),
            26
        );
    }

    #[test]
    fn test_undefined_procedure() {
        assert_eq!(analyze_err("A = NOSUCHFN(1)").code(), 18);
        assert_eq!(analyze_err("NOSUCHSUB 1").code(), 18);
    }

    #[test]
    fn test_member_field_check() {
        analyzed("TYPE PT\nX AS SINGLE\nEND TYPE\nDIM P AS PT\nP.X = 1");
        let error =
            analyze_err("TYPE PT\nX AS SINGLE\nEND TYPE\nDIM P AS PT\nP.Z = 1");
        assert_eq!(error.code(), 13);
    }
}
