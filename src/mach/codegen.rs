//! Lowering from the analyzed tree to flat statement arrays.
//!
//! Structured control flow becomes branches to synthesized labels of
//! the form `$<n>_<suffix>`; FOR loops cache their limit and step in
//! generated `$T<n>` temporaries so the expressions evaluate once.

use super::compiled::*;
use super::value::Val;
use crate::error;
use crate::lang::ast::*;
use crate::lang::{DataTypeSpec, ElementaryType, Error, Loc, StorageKind};
use std::rc::Rc;

pub fn codegen(module: &Module, file: Option<Rc<str>>) -> Result<CompiledModule, Error> {
    let mut label_seq = 0usize;
    let mut temp_seq = 0usize;

    let mut body = BodyGen::new(module, None, &mut label_seq, &mut temp_seq);
    for stmt in &module.stmts {
        body.stmt(stmt)?;
    }
    body.finish()?;
    let mut vars: Vec<(Rc<str>, DataTypeSpec)> = module
        .vars
        .iter()
        .filter(|s| s.storage != StorageKind::Const)
        .map(|s| (s.name.clone(), s.spec.clone()))
        .collect();
    vars.extend(body.temps.clone());
    let stmts = body.out;

    let mut procs = vec![];
    for proc in &module.procs {
        let mut body = BodyGen::new(module, Some(&proc.locals), &mut label_seq, &mut temp_seq);
        for stmt in &proc.body {
            body.stmt(stmt)?;
        }
        body.finish()?;
        let mut locals: Vec<(Rc<str>, DataTypeSpec)> = vec![];
        let mut statics: Vec<(Rc<str>, DataTypeSpec)> = vec![];
        for symbol in proc.locals.iter() {
            match symbol.storage {
                StorageKind::StaticVar => statics.push((symbol.name.clone(), symbol.spec.clone())),
                StorageKind::Const => {}
                _ => locals.push((symbol.name.clone(), symbol.spec.clone())),
            }
        }
        if let Some(ret) = &proc.ret_spec {
            locals.push((proc.name.clone(), ret.clone()));
        }
        locals.extend(body.temps.clone());
        procs.push(CompiledProc {
            name: proc.name.clone(),
            is_function: proc.kind == ProcKind::Function,
            params: proc.params.iter().map(|p| p.ident.name().clone()).collect(),
            stmts: body.out,
            locals,
            statics,
        });
    }

    Ok(CompiledModule {
        file,
        stmts,
        procs,
        vars,
    })
}

enum LoopCtx {
    For {
        start: Rc<str>,
        end: Rc<str>,
        counter: Target,
        elem: ElementaryType,
        step: Rc<str>,
    },
    Loop {
        end: Rc<str>,
    },
}

struct BodyGen<'a> {
    module: &'a Module,
    locals: Option<&'a crate::lang::SymbolTable>,
    out: Vec<CompiledStmt>,
    temps: Vec<(Rc<str>, DataTypeSpec)>,
    loops: Vec<LoopCtx>,
    label_seq: &'a mut usize,
    temp_seq: &'a mut usize,
    last_loc: Loc,
}

impl<'a> BodyGen<'a> {
    fn new(
        module: &'a Module,
        locals: Option<&'a crate::lang::SymbolTable>,
        label_seq: &'a mut usize,
        temp_seq: &'a mut usize,
    ) -> BodyGen<'a> {
        BodyGen {
            module,
            locals,
            out: vec![],
            temps: vec![],
            loops: vec![],
            label_seq,
            temp_seq,
            last_loc: Loc::new(1, 1),
        }
    }

    /// An open FOR at end of body never found its NEXT.
    fn finish(&mut self) -> Result<(), Error> {
        match self.loops.last() {
            Some(LoopCtx::For { .. }) => {
                Err(error!(SyntaxError, self.last_loc; "FOR WITHOUT NEXT"))
            }
            Some(LoopCtx::Loop { .. }) => Err(error!(InternalError, self.last_loc)),
            None => Ok(()),
        }
    }

    fn run(&mut self, loc: Loc, op: Op) {
        self.out.push(CompiledStmt::Run { loc, op });
    }

    fn label(&mut self, name: Rc<str>) {
        self.out.push(CompiledStmt::Label(name));
    }

    fn fresh_label(&mut self, suffix: &str) -> Rc<str> {
        *self.label_seq += 1;
        format!("${}_{}", self.label_seq, suffix).as_str().into()
    }

    fn fresh_temp(&mut self, elem: ElementaryType) -> Rc<str> {
        *self.temp_seq += 1;
        let name: Rc<str> = format!("$T{}", self.temp_seq).as_str().into();
        self.temps
            .push((name.clone(), DataTypeSpec::Elementary(elem)));
        name
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), Error> {
        self.last_loc = stmt.loc();
        match stmt {
            Stmt::Label(_, name) => {
                self.label(name.clone());
                Ok(())
            }
            Stmt::Const(..) | Stmt::DefType(..) => Ok(()),
            Stmt::Dim(loc, kind, vars) => self.dim(*loc, *kind, vars),
            Stmt::Assign(loc, target, expr) => {
                let op = self.assign(target, expr)?;
                self.run(*loc, op);
                Ok(())
            }
            Stmt::Goto(loc, label) => {
                self.run(*loc, Op::Goto(label.clone()));
                Ok(())
            }
            Stmt::Gosub(loc, label) => {
                self.run(*loc, Op::Gosub(label.clone()));
                Ok(())
            }
            Stmt::Return(loc, label) => {
                self.run(*loc, Op::Return(label.clone()));
                Ok(())
            }
            Stmt::End(loc) => {
                self.run(*loc, Op::End);
                Ok(())
            }
            Stmt::ExitProc(loc, _) => {
                self.run(*loc, Op::ExitProc);
                Ok(())
            }
            Stmt::If {
                loc,
                branches,
                else_body,
            } => self.if_stmt(*loc, branches, else_body),
            Stmt::SelectCase {
                loc,
                test,
                arms,
                else_body,
            } => self.select_case(*loc, test, arms, else_body),
            Stmt::CondLoop {
                loc,
                cond,
                until,
                post,
                body,
            } => self.cond_loop(*loc, cond, *until, *post, body),
            Stmt::UncondLoop(loc, body) => {
                let start = self.fresh_label("loop");
                let end = self.fresh_label("endloop");
                self.label(start.clone());
                self.loops.push(LoopCtx::Loop { end: end.clone() });
                for stmt in body {
                    self.stmt(stmt)?;
                }
                self.loops.pop();
                self.run(*loc, Op::Goto(start));
                self.label(end);
                Ok(())
            }
            Stmt::ExitLoop(loc) => {
                let dest = self
                    .loops
                    .iter()
                    .rev()
                    .find_map(|ctx| match ctx {
                        LoopCtx::Loop { end } => Some(end.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| error!(ExitWithoutContext, *loc; "EXIT DO"))?;
                self.run(*loc, Op::Goto(dest));
                Ok(())
            }
            Stmt::ExitFor(loc) => {
                let dest = self
                    .loops
                    .iter()
                    .rev()
                    .find_map(|ctx| match ctx {
                        LoopCtx::For { end, .. } => Some(end.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| error!(ExitWithoutContext, *loc; "EXIT FOR"))?;
                self.run(*loc, Op::Goto(dest));
                Ok(())
            }
            Stmt::For {
                loc,
                counter,
                from,
                to,
                step,
            } => self.for_stmt(*loc, counter, from, to, step.as_ref()),
            Stmt::Next(loc, counters) => self.next_stmt(*loc, counters),
            Stmt::Call(loc, site) => {
                let op = self.call_op(site)?;
                self.run(*loc, op);
                Ok(())
            }
            Stmt::Print { loc, using, items } => self.print(*loc, using, items),
            Stmt::Input {
                loc,
                prompt,
                line,
                vars,
            } => {
                let mut targets = vec![];
                for var in vars {
                    targets.push((self.target(var)?, elem_of(var)?));
                }
                self.run(
                    *loc,
                    Op::Input {
                        prompt: prompt.clone(),
                        line: *line,
                        targets,
                    },
                );
                Ok(())
            }
            Stmt::Data(loc, items) => {
                self.run(*loc, Op::Data(items.clone()));
                Ok(())
            }
            Stmt::Read(loc, vars) => {
                let mut targets = vec![];
                for var in vars {
                    targets.push((self.target(var)?, elem_of(var)?));
                }
                self.run(*loc, Op::Read(targets));
                Ok(())
            }
            Stmt::Restore(loc, label) => {
                self.run(*loc, Op::Restore(label.clone()));
                Ok(())
            }
            Stmt::Swap(loc, a, b) => {
                let op = Op::Swap(self.target(a)?, self.target(b)?);
                self.run(*loc, op);
                Ok(())
            }
        }
    }

    fn dim(&mut self, loc: Loc, kind: DimKind, vars: &[DimVar]) -> Result<(), Error> {
        // Scalars and STATIC variables are created at frame entry from
        // the symbol table; only arrays with runtime bounds need code.
        if kind == DimKind::Static {
            return Ok(());
        }
        for var in vars {
            if let Some(bounds) = &var.bounds {
                let symbol = self
                    .locals
                    .and_then(|table| table.lookup(var.ident.name()))
                    .or_else(|| self.module.vars.lookup(var.ident.name()));
                let elem = match symbol.map(|s| &s.spec) {
                    Some(DataTypeSpec::Array { elem, .. }) => (**elem).clone(),
                    _ => DataTypeSpec::Elementary(ElementaryType::Single),
                };
                let mut bound_codes = vec![];
                for (min, max) in bounds {
                    bound_codes.push((self.expr(min)?, self.expr(max)?));
                }
                self.run(
                    loc,
                    Op::Dim {
                        name: var.ident.name().clone(),
                        elem,
                        bounds: Some(bound_codes),
                    },
                );
            }
        }
        Ok(())
    }

    fn assign(&mut self, target: &Expr, expr: &Expr) -> Result<Op, Error> {
        let spec = target
            .spec
            .as_ref()
            .ok_or_else(|| error!(InternalError, target.loc))?;
        Ok(Op::Assign {
            target: self.target(target)?,
            expr: self.expr(expr)?,
            cast: spec.elementary(),
            deep: spec.is_udt(),
        })
    }

    fn if_stmt(
        &mut self,
        loc: Loc,
        branches: &[(Expr, Vec<Stmt>)],
        else_body: &[Stmt],
    ) -> Result<(), Error> {
        let end = self.fresh_label("endif");
        for (cond, body) in branches {
            let next = self.fresh_label("else");
            let cond_code = self.expr(cond)?;
            self.run(
                loc,
                Op::Branch {
                    cond: cond_code,
                    when: false,
                    dest: next.clone(),
                },
            );
            for stmt in body {
                self.stmt(stmt)?;
            }
            self.run(loc, Op::Goto(end.clone()));
            self.label(next);
        }
        for stmt in else_body {
            self.stmt(stmt)?;
        }
        self.label(end);
        Ok(())
    }

    fn select_case(
        &mut self,
        loc: Loc,
        test: &Expr,
        arms: &[CaseArm],
        else_body: &Option<Vec<Stmt>>,
    ) -> Result<(), Error> {
        let elem = elem_of(test)?;
        let temp = self.fresh_temp(elem);
        let test_code = self.expr(test)?;
        self.run(
            loc,
            Op::Assign {
                target: Target::var(temp.clone()),
                expr: test_code,
                cast: Some(elem),
                deep: false,
            },
        );
        let end = self.fresh_label("endsel");
        for arm in arms {
            let next = self.fresh_label("case");
            let mut code = vec![];
            for (i, cond) in arm.conds.iter().enumerate() {
                self.case_cond(&temp, cond, &mut code)?;
                if i > 0 {
                    code.push(EOp::Or);
                }
            }
            self.run(
                arm.loc,
                Op::Branch {
                    cond: ExprCode(code),
                    when: false,
                    dest: next.clone(),
                },
            );
            for stmt in &arm.body {
                self.stmt(stmt)?;
            }
            self.run(arm.loc, Op::Goto(end.clone()));
            self.label(next);
        }
        if let Some(body) = else_body {
            for stmt in body {
                self.stmt(stmt)?;
            }
        }
        self.label(end);
        Ok(())
    }

    fn case_cond(&mut self, temp: &Rc<str>, cond: &CaseCond, code: &mut Vec<EOp>) -> Result<(), Error> {
        match cond {
            CaseCond::Value(e) => {
                code.push(EOp::Load(Target::var(temp.clone())));
                code.extend(self.expr(e)?.0);
                code.push(EOp::Eq);
            }
            CaseCond::Range(lo, hi) => {
                code.push(EOp::Load(Target::var(temp.clone())));
                code.extend(self.expr(lo)?.0);
                code.push(EOp::Ge);
                code.push(EOp::Load(Target::var(temp.clone())));
                code.extend(self.expr(hi)?.0);
                code.push(EOp::Le);
                code.push(EOp::And);
            }
            CaseCond::Compare(op, e) => {
                code.push(EOp::Load(Target::var(temp.clone())));
                code.extend(self.expr(e)?.0);
                code.push(bin_eop(*op));
            }
        }
        Ok(())
    }

    fn cond_loop(
        &mut self,
        loc: Loc,
        cond: &Expr,
        until: bool,
        post: bool,
        body: &[Stmt],
    ) -> Result<(), Error> {
        let start = self.fresh_label("loop");
        let end = self.fresh_label("endloop");
        self.label(start.clone());
        if !post {
            let code = self.expr(cond)?;
            self.run(
                loc,
                Op::Branch {
                    cond: code,
                    when: until,
                    dest: end.clone(),
                },
            );
        }
        self.loops.push(LoopCtx::Loop { end: end.clone() });
        for stmt in body {
            self.stmt(stmt)?;
        }
        self.loops.pop();
        if post {
            let code = self.expr(cond)?;
            self.run(
                loc,
                Op::Branch {
                    cond: code,
                    when: !until,
                    dest: start,
                },
            );
        } else {
            self.run(loc, Op::Goto(start));
        }
        self.label(end);
        Ok(())
    }

    fn for_stmt(
        &mut self,
        loc: Loc,
        counter: &Expr,
        from: &Expr,
        to: &Expr,
        step: Option<&Expr>,
    ) -> Result<(), Error> {
        let elem = elem_of(counter)?;
        let counter_target = self.target(counter)?;
        let from_code = self.expr(from)?;
        self.run(
            loc,
            Op::Assign {
                target: counter_target.clone(),
                expr: from_code,
                cast: Some(elem),
                deep: false,
            },
        );
        // Limit and step evaluate once, before the first test.
        let t_to = self.fresh_temp(elem);
        let to_code = self.expr(to)?;
        self.run(
            loc,
            Op::Assign {
                target: Target::var(t_to.clone()),
                expr: to_code,
                cast: Some(elem),
                deep: false,
            },
        );
        let t_step = self.fresh_temp(elem);
        let step_code = match step {
            Some(expr) => self.expr(expr)?,
            None => ExprCode(vec![EOp::Const(Val::Integer(1))]),
        };
        self.run(
            loc,
            Op::Assign {
                target: Target::var(t_step.clone()),
                expr: step_code,
                cast: Some(elem),
                deep: false,
            },
        );
        let start = self.fresh_label("for");
        let end = self.fresh_label("next");
        self.label(start.clone());
        // (step >= 0 AND counter <= limit) OR (step < 0 AND counter >= limit)
        let cond = ExprCode(vec![
            EOp::Load(Target::var(t_step.clone())),
            EOp::Const(Val::Integer(0)),
            EOp::Ge,
            EOp::Load(counter_target.clone()),
            EOp::Load(Target::var(t_to.clone())),
            EOp::Le,
            EOp::And,
            EOp::Load(Target::var(t_step.clone())),
            EOp::Const(Val::Integer(0)),
            EOp::Lt,
            EOp::Load(counter_target.clone()),
            EOp::Load(Target::var(t_to.clone())),
            EOp::Ge,
            EOp::And,
            EOp::Or,
        ]);
        self.run(
            loc,
            Op::Branch {
                cond,
                when: false,
                dest: end.clone(),
            },
        );
        self.loops.push(LoopCtx::For {
            start,
            end,
            counter: counter_target,
            elem,
            step: t_step,
        });
        Ok(())
    }

    fn next_stmt(&mut self, loc: Loc, counters: &[Expr]) -> Result<(), Error> {
        if counters.is_empty() {
            return self.close_for(loc, None);
        }
        for counter in counters {
            let target = self.target(counter)?;
            self.close_for(loc, Some(target))?;
        }
        Ok(())
    }

    /// Pop the innermost FOR; a named counter must match it.
    fn close_for(&mut self, loc: Loc, counter: Option<Target>) -> Result<(), Error> {
        let ctx = match self.loops.pop() {
            Some(ctx @ LoopCtx::For { .. }) => ctx,
            Some(other) => {
                self.loops.push(other);
                return Err(error!(NextWithoutFor, loc));
            }
            None => return Err(error!(NextWithoutFor, loc)),
        };
        if let LoopCtx::For {
            start,
            end,
            counter: for_counter,
            elem,
            step,
        } = ctx
        {
            if let Some(named) = counter {
                if named != for_counter {
                    return Err(error!(NextWithoutFor, loc; format!("{}", named)));
                }
            }
            self.run(
                loc,
                Op::Assign {
                    target: for_counter.clone(),
                    expr: ExprCode(vec![
                        EOp::Load(for_counter),
                        EOp::Load(Target::var(step)),
                        EOp::Add,
                    ]),
                    cast: Some(elem),
                    deep: false,
                },
            );
            self.run(loc, Op::Goto(start));
            self.label(end);
        }
        Ok(())
    }

    fn call_op(&mut self, site: &CallSite) -> Result<Op, Error> {
        match site.target {
            Some(CallTarget::User(idx)) => Ok(Op::Call {
                proc: idx,
                args: self.arg_codes(site, idx)?,
            }),
            Some(CallTarget::Builtin(builtin, overload)) => {
                let mut args = vec![];
                for arg in &site.args {
                    args.push(self.expr(arg)?);
                }
                Ok(Op::CallBuiltin {
                    builtin,
                    overload,
                    args,
                })
            }
            None => Err(error!(InternalError; "UNRESOLVED CALL")),
        }
    }

    fn arg_codes(&mut self, site: &CallSite, proc: usize) -> Result<Vec<ArgCode>, Error> {
        let params = &self.module.procs[proc].params;
        let mut codes = vec![];
        for (i, arg) in site.args.iter().enumerate() {
            if site.by_ref.get(i).copied().unwrap_or(false) {
                codes.push(ArgCode::ByRef(self.target(arg)?));
            } else {
                let mut code = self.expr(arg)?;
                // Cast to the parameter's storage type on the way in.
                let pspec = params
                    .get(i)
                    .and_then(|p| self.module.procs[proc].param_symbols.lookup(p.ident.name()));
                if let Some(elem) = pspec.and_then(|s| s.spec.elementary()) {
                    code.0.push(EOp::Cast(elem));
                }
                codes.push(ArgCode::ByVal(code));
            }
        }
        Ok(codes)
    }

    fn print(&mut self, loc: Loc, using: &Option<Expr>, items: &[PrintItem]) -> Result<(), Error> {
        let using_code = match using {
            Some(expr) => Some(self.expr(expr)?),
            None => None,
        };
        let mut codes = vec![];
        for item in items {
            match item {
                PrintItem::Expr(expr) => codes.push(PrintCode::Expr(self.expr(expr)?)),
                PrintItem::Comma => codes.push(PrintCode::Zone),
                PrintItem::Semicolon => {}
            }
        }
        let newline = !matches!(
            items.last(),
            Some(PrintItem::Comma) | Some(PrintItem::Semicolon)
        );
        self.run(
            loc,
            Op::Print {
                using: using_code,
                items: codes,
                newline,
            },
        );
        Ok(())
    }

    // *** Expressions

    fn target(&mut self, expr: &Expr) -> Result<Target, Error> {
        match &expr.kind {
            ExprKind::Var { ident, .. } => Ok(Target::var(ident.name().clone())),
            ExprKind::Subscript { array, indices } => {
                let mut target = self.target(array)?;
                let mut codes = vec![];
                for index in indices {
                    codes.push(self.expr(index)?);
                }
                target.path.push(PathSeg::Index(codes));
                Ok(target)
            }
            ExprKind::Member { record, field } => {
                let mut target = self.target(record)?;
                target.path.push(PathSeg::Field(field.clone()));
                Ok(target)
            }
            _ => Err(error!(InternalError, expr.loc; "EXPECTED STORAGE")),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<ExprCode, Error> {
        let mut code = vec![];
        self.expr_into(expr, &mut code)?;
        Ok(ExprCode(code))
    }

    fn expr_into(&mut self, expr: &Expr, code: &mut Vec<EOp>) -> Result<(), Error> {
        match &expr.kind {
            ExprKind::Integer(n) => code.push(EOp::Const(Val::Integer(*n))),
            ExprKind::Long(n) => code.push(EOp::Const(Val::Long(*n))),
            ExprKind::Single(n) => code.push(EOp::Const(Val::Single(*n))),
            ExprKind::Double(n) => code.push(EOp::Const(Val::Double(*n))),
            ExprKind::StringLit(s) => code.push(EOp::Const(Val::String(s.clone()))),
            ExprKind::Var { .. } | ExprKind::Subscript { .. } | ExprKind::Member { .. } => {
                let target = self.target(expr)?;
                code.push(EOp::Load(target));
            }
            ExprKind::FnCall(site) => match site.target {
                Some(CallTarget::User(idx)) => {
                    let args = self.arg_codes(site, idx)?;
                    code.push(EOp::CallUser { proc: idx, args });
                }
                Some(CallTarget::Builtin(builtin, overload)) => {
                    let mut args = vec![];
                    for arg in &site.args {
                        args.push(self.expr(arg)?);
                    }
                    code.push(EOp::CallBuiltin {
                        builtin,
                        overload,
                        args,
                    });
                }
                None => return Err(error!(InternalError, expr.loc; "UNRESOLVED CALL")),
            },
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr_into(lhs, code)?;
                self.expr_into(rhs, code)?;
                code.push(bin_eop(*op));
            }
            ExprKind::Unary { op, expr: inner } => {
                self.expr_into(inner, code)?;
                code.push(match op {
                    UnOp::Neg => EOp::Neg,
                    UnOp::Not => EOp::Not,
                });
            }
        }
        Ok(())
    }
}

fn bin_eop(op: BinOp) -> EOp {
    match op {
        BinOp::Add => EOp::Add,
        BinOp::Sub => EOp::Sub,
        BinOp::Mul => EOp::Mul,
        BinOp::Div => EOp::Div,
        BinOp::IDiv => EOp::IDiv,
        BinOp::Mod => EOp::Mod,
        BinOp::Pow => EOp::Pow,
        BinOp::Eq => EOp::Eq,
        BinOp::Ne => EOp::Ne,
        BinOp::Lt => EOp::Lt,
        BinOp::Le => EOp::Le,
        BinOp::Gt => EOp::Gt,
        BinOp::Ge => EOp::Ge,
        BinOp::And => EOp::And,
        BinOp::Or => EOp::Or,
    }
}

fn elem_of(expr: &Expr) -> Result<ElementaryType, Error> {
    expr.elem()
        .ok_or_else(|| error!(TypeMismatch, expr.loc))
}
