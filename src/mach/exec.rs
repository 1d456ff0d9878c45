//! The executor.
//!
//! Walks compiled statement arrays one operation at a time against a
//! [`Platform`]. Variables live in frames of shared cells; procedure
//! calls get a fresh frame with unresolved names falling back to the
//! module frame, which is how SHARED visibility works at runtime.

use super::builtin;
use super::compiled::*;
use super::operation;
use super::platform::Platform;
use super::value::{format_number, round_half_even, Array, Ptr, Val};
use crate::error;
use crate::lang::ast::DataItem;
use crate::lang::{ElementaryType, Error};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

const PRINT_ZONE: usize = 14;
const MAX_CALL_DEPTH: usize = 1000;
const MAX_INPUT_RETRIES: usize = 100;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Pause after every statement, in microseconds. Zero runs flat out.
    pub delay_micros: u64,
}

pub fn execute(
    program: &CompiledModule,
    platform: &mut dyn Platform,
    options: &ExecOptions,
) -> Result<(), Error> {
    let attach = |error: Error| match program.file.as_ref() {
        Some(file) => error.in_file(file),
        None => error,
    };
    let mut machine = Machine::new(program, platform, options).map_err(attach)?;
    let frame = Frame::new();
    machine.run_stmts(Scope::Module, &frame).map_err(attach)
}

type Frame = HashMap<Rc<str>, Rc<RefCell<Val>>>;

#[derive(Debug, Clone, Copy)]
enum Scope {
    Module,
    Proc(usize),
}

enum Flow {
    Next,
    Jump(usize),
    Exit,
}

struct Machine<'a> {
    program: &'a CompiledModule,
    platform: &'a mut dyn Platform,
    options: &'a ExecOptions,
    globals: Frame,
    /// STATIC cells per procedure, created on first call.
    statics: HashMap<Rc<str>, Frame>,
    module_labels: HashMap<Rc<str>, usize>,
    proc_labels: Vec<HashMap<Rc<str>, usize>>,
    /// Flattened DATA pool from the module statement stream, plus the
    /// flat offset where each DATA statement's items begin.
    data: Vec<DataItem>,
    data_starts: Vec<(usize, usize)>,
    cursor: usize,
    stopped: bool,
    depth: usize,
}

fn label_map(stmts: &[CompiledStmt]) -> Result<HashMap<Rc<str>, usize>, Error> {
    let mut map = HashMap::new();
    for (idx, stmt) in stmts.iter().enumerate() {
        if let CompiledStmt::Label(name) = stmt {
            if map.insert(name.clone(), idx).is_some() {
                return Err(error!(ExecutionError; format!("DUPLICATE LABEL {}", name)));
            }
        }
    }
    Ok(map)
}

fn scalar_elem(val: &Val) -> Option<ElementaryType> {
    match val {
        Val::Integer(_) => Some(ElementaryType::Integer),
        Val::Long(_) => Some(ElementaryType::Long),
        Val::Single(_) => Some(ElementaryType::Single),
        Val::Double(_) => Some(ElementaryType::Double),
        Val::String(_) => Some(ElementaryType::String),
        _ => None,
    }
}

impl<'a> Machine<'a> {
    fn new(
        program: &'a CompiledModule,
        platform: &'a mut dyn Platform,
        options: &'a ExecOptions,
    ) -> Result<Machine<'a>, Error> {
        let mut globals = Frame::new();
        for (name, spec) in &program.vars {
            globals.insert(name.clone(), Rc::new(RefCell::new(Val::default_for(spec))));
        }
        let mut data = vec![];
        let mut data_starts = vec![];
        for (idx, stmt) in program.stmts.iter().enumerate() {
            if let CompiledStmt::Run {
                op: Op::Data(items),
                ..
            } = stmt
            {
                data_starts.push((idx, data.len()));
                data.extend(items.iter().cloned());
            }
        }
        let module_labels = label_map(&program.stmts)?;
        let mut proc_labels = vec![];
        for proc in &program.procs {
            proc_labels.push(label_map(&proc.stmts)?);
        }
        Ok(Machine {
            program,
            platform,
            options,
            globals,
            statics: HashMap::new(),
            module_labels,
            proc_labels,
            data,
            data_starts,
            cursor: 0,
            stopped: false,
            depth: 0,
        })
    }

    fn run_stmts(&mut self, scope: Scope, frame: &Frame) -> Result<(), Error> {
        let program = self.program;
        let stmts = match scope {
            Scope::Module => &program.stmts,
            Scope::Proc(idx) => &program.procs[idx].stmts,
        };
        let mut gosub: Vec<usize> = vec![];
        let mut idx = 0;
        while idx < stmts.len() {
            if self.stopped {
                return Ok(());
            }
            let (loc, op) = match &stmts[idx] {
                CompiledStmt::Label(_) => {
                    idx += 1;
                    continue;
                }
                CompiledStmt::Run { loc, op } => (*loc, op),
            };
            if self.platform.should_stop() {
                self.platform.clear_stop();
                self.stopped = true;
                return Ok(());
            }
            if self.options.delay_micros > 0 {
                self.platform.delay(self.options.delay_micros);
            }
            let flow = self
                .op(scope, frame, &mut gosub, idx, op)
                .map_err(|error| error.at(loc))?;
            match flow {
                Flow::Next => idx += 1,
                Flow::Jump(dest) => idx = dest,
                Flow::Exit => return Ok(()),
            }
        }
        Ok(())
    }

    fn op(
        &mut self,
        scope: Scope,
        frame: &Frame,
        gosub: &mut Vec<usize>,
        idx: usize,
        op: &Op,
    ) -> Result<Flow, Error> {
        match op {
            Op::Goto(dest) => Ok(Flow::Jump(self.label_idx(scope, dest)?)),
            Op::Branch { cond, when, dest } => {
                if self.eval(frame, cond)?.is_true() == *when {
                    Ok(Flow::Jump(self.label_idx(scope, dest)?))
                } else {
                    Ok(Flow::Next)
                }
            }
            Op::Gosub(dest) => {
                gosub.push(idx + 1);
                Ok(Flow::Jump(self.label_idx(scope, dest)?))
            }
            Op::Return(None) => gosub
                .pop()
                .map(Flow::Jump)
                .ok_or_else(|| error!(ReturnWithoutGosub)),
            Op::Return(Some(dest)) => {
                if gosub.pop().is_none() {
                    return Err(error!(ReturnWithoutGosub));
                }
                Ok(Flow::Jump(self.label_idx(scope, dest)?))
            }
            Op::End => {
                self.stopped = true;
                Ok(Flow::Exit)
            }
            Op::ExitProc => Ok(Flow::Exit),
            Op::Dim { name, elem, bounds } => {
                let mut dims = vec![];
                if let Some(bounds) = bounds {
                    for (min, max) in bounds {
                        let min = self.eval(frame, min)?.as_i64()?;
                        let max = self.eval(frame, max)?.as_i64()?;
                        if max < min {
                            return Err(error!(SubscriptOutOfRange));
                        }
                        dims.push((min, max));
                    }
                }
                let array = Array::new(elem, dims);
                let cell = self.cell(frame, name)?;
                *cell.borrow_mut() = Val::Array(Rc::new(RefCell::new(array)));
                Ok(Flow::Next)
            }
            Op::Assign {
                target,
                expr,
                cast,
                deep,
            } => {
                let mut val = self.eval(frame, expr)?;
                if let Some(elem) = cast {
                    val = val.cast_to(*elem)?;
                }
                if *deep {
                    val = val.clone_deep();
                }
                self.ptr(frame, target)?.set(val)?;
                Ok(Flow::Next)
            }
            Op::Swap(a, b) => {
                let pa = self.ptr(frame, a)?;
                let pb = self.ptr(frame, b)?;
                let va = pa.get()?;
                let vb = pb.get()?;
                // Mixed numeric operands keep each slot's storage type.
                let (into_a, into_b) = match (scalar_elem(&va), scalar_elem(&vb)) {
                    (Some(ea), Some(eb)) if ea != eb => (vb.cast_to(ea)?, va.cast_to(eb)?),
                    _ => (vb, va),
                };
                pa.set(into_a)?;
                pb.set(into_b)?;
                Ok(Flow::Next)
            }
            Op::Call { proc, args } => {
                self.call_user(frame, *proc, args)?;
                Ok(Flow::Next)
            }
            Op::CallBuiltin {
                builtin,
                overload,
                args,
            } => {
                let mut vals = vec![];
                for code in args {
                    vals.push(self.eval(frame, code)?);
                }
                builtin::eval_builtin(*builtin, *overload, &vals, self.platform)?;
                Ok(Flow::Next)
            }
            Op::Print {
                using,
                items,
                newline,
            } => {
                self.print(frame, using, items, *newline)?;
                Ok(Flow::Next)
            }
            Op::Input {
                prompt,
                line,
                targets,
            } => {
                self.input(frame, prompt.as_deref(), *line, targets)?;
                Ok(Flow::Next)
            }
            Op::Data(_) => Ok(Flow::Next),
            Op::Read(targets) => {
                for (target, elem) in targets {
                    let item = self.next_data()?;
                    let val = data_val(&item, *elem)?;
                    self.ptr(frame, target)?.set(val)?;
                }
                Ok(Flow::Next)
            }
            Op::Restore(None) => {
                self.cursor = 0;
                Ok(Flow::Next)
            }
            Op::Restore(Some(label)) => {
                let stmt_idx = self
                    .module_labels
                    .get(label)
                    .copied()
                    .ok_or_else(|| error!(UndefinedLabel; format!("{}", label)))?;
                self.cursor = self
                    .data_starts
                    .iter()
                    .find(|(idx, _)| *idx >= stmt_idx)
                    .map(|(_, offset)| *offset)
                    .unwrap_or(self.data.len());
                Ok(Flow::Next)
            }
        }
    }

    fn label_idx(&self, scope: Scope, name: &str) -> Result<usize, Error> {
        let map = match scope {
            Scope::Module => &self.module_labels,
            Scope::Proc(idx) => &self.proc_labels[idx],
        };
        map.get(name)
            .copied()
            .ok_or_else(|| error!(InternalError; format!("NO LABEL {}", name)))
    }

    fn cell(&self, frame: &Frame, name: &Rc<str>) -> Result<Rc<RefCell<Val>>, Error> {
        frame
            .get(name)
            .or_else(|| self.globals.get(name))
            .cloned()
            .ok_or_else(|| error!(InternalError; format!("NO VARIABLE {}", name)))
    }

    /// Resolve a storage reference to a settable location, evaluating
    /// subscripts along the path.
    fn ptr(&mut self, frame: &Frame, target: &Target) -> Result<Ptr, Error> {
        let mut ptr = Ptr::Var(self.cell(frame, &target.name)?);
        for seg in &target.path {
            match seg {
                PathSeg::Index(codes) => {
                    let mut indices = vec![];
                    for code in codes {
                        indices.push(self.eval(frame, code)?.as_i64()?);
                    }
                    let handle = match ptr.get()? {
                        Val::Array(handle) => handle,
                        _ => return Err(error!(TypeMismatch; "NOT AN ARRAY")),
                    };
                    let flat = handle.borrow().get_idx(&indices)?;
                    ptr = Ptr::Elem(handle, flat);
                }
                PathSeg::Field(name) => {
                    let handle = match ptr.get()? {
                        Val::Record(handle) => handle,
                        _ => return Err(error!(TypeMismatch; "NOT A RECORD")),
                    };
                    ptr = Ptr::Field(handle, name.clone());
                }
            }
        }
        Ok(ptr)
    }

    fn eval(&mut self, frame: &Frame, code: &ExprCode) -> Result<Val, Error> {
        let mut stack: Vec<Val> = Vec::with_capacity(8);
        for eop in &code.0 {
            match eop {
                EOp::Const(val) => stack.push(val.clone()),
                EOp::Load(target) => {
                    let ptr = self.ptr(frame, target)?;
                    stack.push(ptr.get()?);
                }
                EOp::CallUser { proc, args } => {
                    let ret = self.call_user(frame, *proc, args)?;
                    stack.push(ret);
                }
                EOp::CallBuiltin {
                    builtin,
                    overload,
                    args,
                } => {
                    let mut vals = vec![];
                    for code in args {
                        vals.push(self.eval(frame, code)?);
                    }
                    stack.push(builtin::eval_builtin(
                        *builtin,
                        *overload,
                        &vals,
                        self.platform,
                    )?);
                }
                EOp::Cast(elem) => {
                    let val = pop(&mut stack)?;
                    stack.push(val.cast_to(*elem)?);
                }
                EOp::Neg => {
                    let val = pop(&mut stack)?;
                    stack.push(operation::neg(&val)?);
                }
                EOp::Not => {
                    let val = pop(&mut stack)?;
                    stack.push(operation::not(&val)?);
                }
                EOp::Add | EOp::Sub | EOp::Mul | EOp::Div | EOp::IDiv | EOp::Mod | EOp::Pow
                | EOp::And | EOp::Or => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    stack.push(match eop {
                        EOp::Add => operation::add(&lhs, &rhs)?,
                        EOp::Sub => operation::sub(&lhs, &rhs)?,
                        EOp::Mul => operation::mul(&lhs, &rhs)?,
                        EOp::Div => operation::div(&lhs, &rhs)?,
                        EOp::IDiv => operation::idiv(&lhs, &rhs)?,
                        EOp::Mod => operation::modulus(&lhs, &rhs)?,
                        EOp::Pow => operation::pow(&lhs, &rhs)?,
                        EOp::And => operation::and(&lhs, &rhs)?,
                        _ => operation::or(&lhs, &rhs)?,
                    });
                }
                EOp::Eq | EOp::Ne | EOp::Lt | EOp::Le | EOp::Gt | EOp::Ge => {
                    let rhs = pop(&mut stack)?;
                    let lhs = pop(&mut stack)?;
                    let ord = operation::compare(&lhs, &rhs)?;
                    stack.push(Val::from_bool(match eop {
                        EOp::Eq => ord == Ordering::Equal,
                        EOp::Ne => ord != Ordering::Equal,
                        EOp::Lt => ord == Ordering::Less,
                        EOp::Le => ord != Ordering::Greater,
                        EOp::Gt => ord == Ordering::Greater,
                        _ => ord != Ordering::Less,
                    }));
                }
            }
        }
        pop(&mut stack)
    }

    fn call_user(&mut self, caller: &Frame, proc_idx: usize, args: &[ArgCode]) -> Result<Val, Error> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(error!(OutOfMemory; "CALL DEPTH"));
        }
        self.depth += 1;
        let result = self.call_user_inner(caller, proc_idx, args);
        self.depth -= 1;
        result
    }

    fn call_user_inner(
        &mut self,
        caller: &Frame,
        proc_idx: usize,
        args: &[ArgCode],
    ) -> Result<Val, Error> {
        let program = self.program;
        let proc = &program.procs[proc_idx];
        let mut frame = Frame::new();
        // Element and field references are passed copy-in, copy-out;
        // whole variables share their cell directly.
        let mut writebacks: Vec<(Ptr, Rc<RefCell<Val>>)> = vec![];
        for (param, arg) in proc.params.iter().zip(args.iter()) {
            let cell = match arg {
                ArgCode::ByRef(target) if target.path.is_empty() => {
                    self.cell(caller, &target.name)?
                }
                ArgCode::ByRef(target) => {
                    let ptr = self.ptr(caller, target)?;
                    let cell = Rc::new(RefCell::new(ptr.get()?));
                    writebacks.push((ptr, cell.clone()));
                    cell
                }
                ArgCode::ByVal(code) => {
                    let val = self.eval(caller, code)?;
                    let val = match val {
                        Val::Array(_) | Val::Record(_) => val.clone_deep(),
                        val => val,
                    };
                    Rc::new(RefCell::new(val))
                }
            };
            frame.insert(param.clone(), cell);
        }
        for (name, spec) in &proc.locals {
            frame.insert(name.clone(), Rc::new(RefCell::new(Val::default_for(spec))));
        }
        if !proc.statics.is_empty() {
            if !self.statics.contains_key(&proc.name) {
                let mut cells = Frame::new();
                for (name, spec) in &proc.statics {
                    cells.insert(name.clone(), Rc::new(RefCell::new(Val::default_for(spec))));
                }
                self.statics.insert(proc.name.clone(), cells);
            }
            for (name, cell) in &self.statics[&proc.name] {
                frame.insert(name.clone(), cell.clone());
            }
        }
        self.run_stmts(Scope::Proc(proc_idx), &frame)?;
        let ret = if proc.is_function {
            let cell = frame
                .get(&proc.name)
                .ok_or_else(|| error!(InternalError; "NO RETURN SLOT"))?;
            let val = cell.borrow().clone();
            match val {
                Val::Record(_) => val.clone_deep(),
                val => val,
            }
        } else {
            Val::Integer(0)
        };
        for (ptr, cell) in writebacks {
            ptr.set(cell.borrow().clone())?;
        }
        Ok(ret)
    }

    fn print(
        &mut self,
        frame: &Frame,
        using: &Option<ExprCode>,
        items: &[PrintCode],
        newline: bool,
    ) -> Result<(), Error> {
        if let Some(format_code) = using {
            let format = self.eval(frame, format_code)?.as_string()?;
            let mut vals = vec![];
            for item in items {
                if let PrintCode::Expr(code) = item {
                    vals.push(self.eval(frame, code)?);
                }
            }
            let text = print_using(&format, &vals)?;
            self.platform.print(&text);
        } else {
            for item in items {
                match item {
                    PrintCode::Expr(code) => {
                        let val = self.eval(frame, code)?;
                        self.platform.print(&val.to_string());
                    }
                    PrintCode::Zone => {
                        let (_, col) = self.platform.cursor_pos();
                        let pad = PRINT_ZONE - ((col - 1) % PRINT_ZONE);
                        self.platform.print(&" ".repeat(pad));
                    }
                }
            }
        }
        if newline {
            self.platform.print("\n");
        }
        Ok(())
    }

    fn input(
        &mut self,
        frame: &Frame,
        prompt: Option<&str>,
        line: bool,
        targets: &[(Target, ElementaryType)],
    ) -> Result<(), Error> {
        let mut ptrs = vec![];
        for (target, elem) in targets {
            ptrs.push((self.ptr(frame, target)?, *elem));
        }
        for attempt in 0.. {
            if attempt >= MAX_INPUT_RETRIES {
                return Err(error!(ExecutionError; "INPUT RETRY LIMIT"));
            }
            if let Some(prompt) = prompt {
                self.platform.print(prompt);
            }
            if !line {
                self.platform.print("? ");
            }
            let text = self.platform.input_line();
            if line {
                ptrs[0].0.set(Val::String(text.as_str().into()))?;
                return Ok(());
            }
            match parse_input(&text, &ptrs) {
                Some(vals) => {
                    for ((ptr, _), val) in ptrs.iter().zip(vals) {
                        ptr.set(val)?;
                    }
                    return Ok(());
                }
                None => self.platform.print("?REDO FROM START\n"),
            }
        }
        Ok(())
    }

    fn next_data(&mut self) -> Result<DataItem, Error> {
        if self.cursor >= self.data.len() {
            return Err(error!(OutOfData));
        }
        let item = self.data[self.cursor].clone();
        self.cursor += 1;
        Ok(item)
    }
}

fn pop(stack: &mut Vec<Val>) -> Result<Val, Error> {
    stack
        .pop()
        .ok_or_else(|| error!(InternalError; "EXPRESSION STACK"))
}

fn data_val(item: &DataItem, elem: ElementaryType) -> Result<Val, Error> {
    match (item, elem) {
        (DataItem::Number(n), ElementaryType::String) => {
            Ok(Val::String(format_number(*n).as_str().into()))
        }
        (DataItem::Number(n), _) => Val::Double(*n).cast_to(elem),
        (DataItem::String(s), ElementaryType::String) => Ok(Val::String(s.clone())),
        (DataItem::String(_), _) => Err(error!(TypeMismatch; "READ")),
    }
}

/// Split and convert one input line against the target types; None
/// means the whole line must be re-entered.
fn parse_input(text: &str, targets: &[(Ptr, ElementaryType)]) -> Option<Vec<Val>> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    if fields.len() != targets.len() {
        return None;
    }
    let mut vals = vec![];
    for (field, (_, elem)) in fields.iter().zip(targets.iter()) {
        if *elem == ElementaryType::String {
            let field = field
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(field);
            vals.push(Val::String(field.into()));
            continue;
        }
        // An empty response means zero.
        let n = if field.is_empty() {
            0.0
        } else {
            field.parse::<f64>().ok()?
        };
        vals.push(Val::Double(n).cast_to(*elem).ok()?);
    }
    Some(vals)
}

/// A PRINT USING formatter covering the common field kinds: `#` digit
/// runs with an optional decimal point and comma grouping, `&` whole
/// string, `!` first character, `\ \` fixed width, `_` literal escape.
/// The format repeats while values remain.
fn print_using(format: &str, vals: &[Val]) -> Result<String, Error> {
    if format.is_empty() {
        return Err(error!(IllegalFunctionCall; "EMPTY USING FORMAT"));
    }
    let chars: Vec<char> = format.chars().collect();
    let mut out = String::new();
    let mut vi = 0;
    let mut i = 0;
    let mut wrapped_at = usize::MAX;
    loop {
        if i >= chars.len() {
            if vi >= vals.len() || vi == wrapped_at {
                break;
            }
            wrapped_at = vi;
            i = 0;
        }
        match chars[i] {
            '#' => {
                if vi >= vals.len() {
                    break;
                }
                let mut width = 0;
                let mut decimals = None;
                let mut commas = false;
                while i < chars.len() {
                    match chars[i] {
                        '#' => {
                            width += 1;
                            if let Some(d) = decimals {
                                decimals = Some(d + 1);
                            }
                        }
                        ',' if decimals.is_none() => {
                            commas = true;
                            width += 1;
                        }
                        '.' if decimals.is_none() => {
                            decimals = Some(0);
                            width += 1;
                        }
                        _ => break,
                    }
                    i += 1;
                }
                out.push_str(&format_field(&vals[vi], width, decimals, commas)?);
                vi += 1;
            }
            '&' => {
                if vi >= vals.len() {
                    break;
                }
                out.push_str(&vals[vi].as_string()?);
                vi += 1;
                i += 1;
            }
            '!' => {
                if vi >= vals.len() {
                    break;
                }
                let s = vals[vi].as_string()?;
                out.push(s.chars().next().unwrap_or(' '));
                vi += 1;
                i += 1;
            }
            '\\' => {
                let close = chars[i + 1..].iter().position(|c| *c == '\\');
                match close {
                    Some(offset) => {
                        if vi >= vals.len() {
                            break;
                        }
                        let width = offset + 2;
                        let s = vals[vi].as_string()?;
                        let mut field: String = s.chars().take(width).collect();
                        while field.chars().count() < width {
                            field.push(' ');
                        }
                        out.push_str(&field);
                        vi += 1;
                        i += offset + 2;
                    }
                    None => {
                        out.push('\\');
                        i += 1;
                    }
                }
            }
            '_' => {
                if i + 1 < chars.len() {
                    out.push(chars[i + 1]);
                    i += 2;
                } else {
                    i += 1;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn format_field(
    val: &Val,
    width: usize,
    decimals: Option<usize>,
    commas: bool,
) -> Result<String, Error> {
    let n = val.as_f64()?;
    let mut s = match decimals {
        Some(d) => format!("{:.*}", d, n),
        None => format!("{}", round_half_even(n) as i64),
    };
    if commas {
        s = group_thousands(&s);
    }
    if s.len() > width {
        // Field overflow keeps the digits and flags them.
        return Ok(format!("%{}", s));
    }
    Ok(format!("{:>width$}", s, width = width))
}

fn group_thousands(s: &str) -> String {
    let (int_part, rest) = match s.find('.') {
        Some(dot) => (&s[..dot], &s[dot..]),
        None => (s, ""),
    };
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", int_part),
    };
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}{}", sign, grouped, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::{lex, parse};
    use crate::mach::analyze::analyze;
    use crate::mach::codegen::codegen;
    use crate::mach::platform::CapturePlatform;

    fn run(source: &str) -> String {
        run_with(source, &[])
    }

    fn run_with(source: &str, inputs: &[&str]) -> String {
        let mut module = parse(&lex(source).unwrap()).unwrap();
        analyze(&mut module).unwrap();
        let compiled = codegen(&module, None).unwrap();
        let mut platform = CapturePlatform::with_inputs(inputs);
        execute(&compiled, &mut platform, &ExecOptions::default()).unwrap();
        platform.output
    }

    fn run_err(source: &str) -> Error {
        let mut module = parse(&lex(source).unwrap()).unwrap();
        analyze(&mut module).unwrap();
        let compiled = codegen(&module, None).unwrap();
        let mut platform = CapturePlatform::new();
        execute(&compiled, &mut platform, &ExecOptions::default()).unwrap_err()
    }

    #[test]
    fn test_hello() {
        assert_eq!(run("PRINT \"HELLO\""), "HELLO\n");
    }

    #[test]
    fn test_for_loop_counts() {
        assert_eq!(run("FOR I = 1 TO 3\nPRINT I\nNEXT I"), "1\n2\n3\n");
    }

    #[test]
    fn test_for_negative_step() {
        assert_eq!(run("FOR I = 3 TO 1 STEP -1\nPRINT I\nNEXT"), "3\n2\n1\n");
    }

    #[test]
    fn test_for_skipped_when_out_of_range() {
        assert_eq!(run("FOR I = 5 TO 1\nPRINT I\nNEXT\nPRINT \"DONE\""), "DONE\n");
    }

    #[test]
    fn test_if_else() {
        let source = "A = 2\nIF A = 1 THEN\nPRINT \"ONE\"\nELSEIF A = 2 THEN\nPRINT \"TWO\"\nELSE\nPRINT \"MANY\"\nEND IF";
        assert_eq!(run(source), "TWO\n");
    }

    #[test]
    fn test_select_case() {
        let source = "\
FOR I = 1 TO 4
SELECT CASE I
CASE 1
PRINT \"A\"
CASE 2 TO 3
PRINT \"B\"
CASE ELSE
PRINT \"C\"
END SELECT
NEXT";
        assert_eq!(run(source), "A\nB\nB\nC\n");
    }

    #[test]
    fn test_do_loops() {
        assert_eq!(run("I = 0\nDO WHILE I < 3\nI = I + 1\nPRINT I\nLOOP"), "1\n2\n3\n");
        assert_eq!(run("I = 0\nDO\nI = I + 1\nLOOP UNTIL I >= 3\nPRINT I"), "3\n");
        assert_eq!(run("I = 5\nWHILE I > 3\nI = I - 1\nWEND\nPRINT I"), "3\n");
    }

    #[test]
    fn test_exit_do() {
        assert_eq!(run("I = 0\nDO\nI = I + 1\nIF I = 2 THEN EXIT DO\nLOOP\nPRINT I"), "2\n");
    }

    #[test]
    fn test_gosub_return() {
        let source = "GOSUB GREET\nPRINT \"AFTER\"\nEND\nGREET:\nPRINT \"HI\"\nRETURN";
        assert_eq!(run(source), "HI\nAFTER\n");
    }

    #[test]
    fn test_return_without_gosub() {
        assert_eq!(run_err("RETURN").code(), 3);
    }

    #[test]
    fn test_array_elements() {
        let source = "DIM A(5)\nFOR I = 0 TO 5\nA(I) = I * 10\nNEXT\nPRINT A(3)";
        assert_eq!(run(source), "30\n");
    }

    #[test]
    fn test_subscript_out_of_range() {
        assert_eq!(run_err("DIM A(5)\nA(6) = 1").code(), 9);
    }

    #[test]
    fn test_record_assignment_copies() {
        let source = "\
TYPE POINT
X AS SINGLE
Y AS SINGLE
END TYPE
DIM P AS POINT
DIM Q AS POINT
P.X = 1
Q = P
P.X = 9
PRINT Q.X";
        assert_eq!(run(source), "1\n");
    }

    #[test]
    fn test_sub_byref_modifies_caller() {
        let source = "\
A = 5
BUMP A
PRINT A
SUB BUMP (N)
N = N + 1
END SUB";
        assert_eq!(run(source), "6\n");
    }

    #[test]
    fn test_byref_array_element_writes_back() {
        let source = "\
DIM A(3)
A(1) = 5
BUMP A(1)
PRINT A(1)
SUB BUMP (N)
N = N + 1
END SUB";
        assert_eq!(run(source), "6\n");
    }

    #[test]
    fn test_function_recursion() {
        let source = "\
PRINT FACT(5)
FUNCTION FACT (N)
IF N <= 1 THEN
FACT = 1
ELSE
FACT = N * FACT(N - 1)
END IF
END FUNCTION";
        assert_eq!(run(source), "120\n");
    }

    #[test]
    fn test_static_persists_across_calls() {
        let source = "\
TICK
TICK
TICK
SUB TICK
STATIC N
N = N + 1
PRINT N
END SUB";
        assert_eq!(run(source), "1\n2\n3\n");
    }

    #[test]
    fn test_shared_visible_in_proc() {
        let source = "\
DIM SHARED TOTAL
ADDUP 4
ADDUP 3
PRINT TOTAL
SUB ADDUP (N)
TOTAL = TOTAL + N
END SUB";
        assert_eq!(run(source), "7\n");
    }

    #[test]
    fn test_data_read_restore() {
        let source = "\
DATA 10, 20, 30
READ A, B
RESTORE
READ C
PRINT A + B + C";
        assert_eq!(run(source), "40\n");
    }

    #[test]
    fn test_out_of_data() {
        assert_eq!(run_err("DATA 1\nREAD A, B").code(), 4);
    }

    #[test]
    fn test_input_parses_fields() {
        let source = "INPUT A, B$\nPRINT A * 2\nPRINT B$";
        assert_eq!(run_with(source, &["21, HELLO"]), "? \n42\nHELLO\n");
    }

    #[test]
    fn test_swap() {
        assert_eq!(run("A = 1\nB = 2\nSWAP A, B\nPRINT A\nPRINT B"), "2\n1\n");
    }

    #[test]
    fn test_print_zones() {
        assert_eq!(run("PRINT 1, 2"), format!("1{}2\n", " ".repeat(13)));
    }

    #[test]
    fn test_end_stops_inside_proc() {
        let source = "HALT\nPRINT \"UNREACHED\"\nSUB HALT\nEND\nEND SUB";
        assert_eq!(run(source), "");
    }

    #[test]
    fn test_print_using_numeric() {
        assert_eq!(run("PRINT USING \"##.##\"; 3.14159"), " 3.14\n");
    }

    #[test]
    fn test_string_compare_and_concat() {
        assert_eq!(run("A$ = \"AB\" + \"CD\"\nIF A$ = \"ABCD\" THEN PRINT \"YES\""), "YES\n");
    }

    #[test]
    fn test_duplicate_label_is_fatal() {
        let compiled = CompiledModule {
            file: None,
            stmts: vec![
                CompiledStmt::Label("HERE".into()),
                CompiledStmt::Label("HERE".into()),
            ],
            procs: vec![],
            vars: vec![],
        };
        let mut platform = CapturePlatform::new();
        let error = execute(&compiled, &mut platform, &ExecOptions::default()).unwrap_err();
        assert_eq!(error.code(), 40);
    }

    #[test]
    fn test_stop_request_is_acknowledged() {
        let mut module = parse(&lex("AGAIN:\nGOTO AGAIN").unwrap()).unwrap();
        analyze(&mut module).unwrap();
        let compiled = codegen(&module, None).unwrap();
        let mut platform = CapturePlatform::new();
        platform.stop = true;
        execute(&compiled, &mut platform, &ExecOptions::default()).unwrap();
        assert!(!platform.stop);
        assert_eq!(platform.output, "");
    }
}
