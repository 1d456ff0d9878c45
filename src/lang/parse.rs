use super::{ast::*, token::*, ElementaryType, Error, Loc, LocToken};
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

/// Parse a lexed token stream into a [`Module`].
///
/// Produces exactly one tree or fails with a located error; running
/// out of tokens mid-construct reports `UNEXPECTED END OF INPUT` at
/// the last token the lexer produced.
pub fn parse(tokens: &[LocToken]) -> Result<Module> {
    Parser::parse(tokens)
}

struct Parser<'a> {
    tokens: &'a [LocToken],
    idx: usize,
    last_loc: Loc,
}

impl<'a> Parser<'a> {
    fn parse(tokens: &'a [LocToken]) -> Result<Module> {
        let last_loc = match tokens.last() {
            Some(t) => t.loc,
            None => Loc::new(1, 1),
        };
        let mut parser = Parser {
            tokens,
            idx: 0,
            last_loc,
        };
        let mut module = Module::default();
        loop {
            parser.skip_separators();
            if parser.at_end() {
                return Ok(module);
            }
            match parser.peek() {
                Some(Token::Word(Word::Type)) => {
                    let decl = parser.type_decl()?;
                    module.types.push(decl);
                }
                Some(Token::Word(Word::Sub)) => {
                    let proc = parser.proc(ProcKind::Sub)?;
                    module.procs.push(proc);
                }
                Some(Token::Word(Word::Function)) => {
                    let proc = parser.proc(ProcKind::Function)?;
                    module.procs.push(proc);
                }
                _ => {
                    let stmt = parser.statement()?;
                    module.stmts.push(stmt);
                }
            }
        }
    }

    fn at_end(&self) -> bool {
        self.idx >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.idx).map(|t| &t.token)
    }

    fn peek2(&self) -> Option<&'a Token> {
        self.tokens.get(self.idx + 1).map(|t| &t.token)
    }

    fn loc(&self) -> Loc {
        match self.tokens.get(self.idx) {
            Some(t) => t.loc,
            None => self.last_loc,
        }
    }

    fn next(&mut self) -> Result<&'a LocToken> {
        match self.tokens.get(self.idx) {
            Some(t) => {
                self.idx += 1;
                Ok(t)
            }
            None => Err(error!(SyntaxError, self.last_loc; "UNEXPECTED END OF INPUT")),
        }
    }

    fn expect(&mut self, token: Token) -> Result<Loc> {
        let loc = self.loc();
        let t = self.next()?;
        if t.token == token {
            return Ok(t.loc);
        }
        Err(error!(SyntaxError, loc; format!("EXPECTED {}", token)))
    }

    fn expect_word(&mut self, word: Word) -> Result<Loc> {
        self.expect(Token::Word(word))
    }

    fn ident(&mut self) -> Result<(Loc, Ident)> {
        let loc = self.loc();
        match self.next()?.token {
            Token::Ident(ref ident) => Ok((loc, ident.clone())),
            _ => Err(error!(SyntaxError, loc; "EXPECTED IDENTIFIER")),
        }
    }

    fn plain_ident(&mut self) -> Result<(Loc, Rc<str>)> {
        let (loc, ident) = self.ident()?;
        match ident {
            Ident::Plain(name) => Ok((loc, name)),
            _ => Err(error!(SyntaxError, loc; "TYPE SUFFIX NOT ALLOWED HERE")),
        }
    }

    /// `:` and end-of-line both separate statements.
    fn skip_separators(&mut self) {
        while let Some(Token::Colon) | Some(Token::Eol) = self.peek() {
            self.idx += 1;
        }
    }

    fn end_of_statement(&mut self) -> Result<()> {
        match self.peek() {
            Some(Token::Colon) | Some(Token::Eol) | None => Ok(()),
            Some(t) => Err(error!(SyntaxError, self.loc(); format!("UNEXPECTED {}", t))),
        }
    }

    // *** Declarations

    fn type_name(&mut self) -> Result<TypeName> {
        let loc = self.loc();
        match self.next()?.token {
            Token::Word(Word::Integer) => Ok(TypeName::Elementary(ElementaryType::Integer)),
            Token::Word(Word::Long) => Ok(TypeName::Elementary(ElementaryType::Long)),
            Token::Word(Word::Single) => Ok(TypeName::Elementary(ElementaryType::Single)),
            Token::Word(Word::Double) => Ok(TypeName::Elementary(ElementaryType::Double)),
            Token::Word(Word::String) => Ok(TypeName::Elementary(ElementaryType::String)),
            Token::Ident(Ident::Plain(ref name)) => Ok(TypeName::Udt(name.clone())),
            _ => Err(error!(SyntaxError, loc; "EXPECTED TYPE NAME")),
        }
    }

    fn type_decl(&mut self) -> Result<TypeDecl> {
        let loc = self.expect_word(Word::Type)?;
        let (_, name) = self.plain_ident()?;
        self.expect(Token::Eol)?;
        let mut fields = vec![];
        loop {
            self.skip_separators();
            if let Some(Token::Word(Word::End)) = self.peek() {
                self.next()?;
                self.expect_word(Word::Type)?;
                self.end_of_statement()?;
                break;
            }
            let (field_loc, ident) = self.ident()?;
            self.expect_word(Word::As)?;
            let type_name = self.type_name()?;
            self.end_of_statement()?;
            fields.push(FieldDecl {
                loc: field_loc,
                name: ident.name().clone(),
                type_name,
            });
        }
        Ok(TypeDecl { loc, name, fields })
    }

    fn proc(&mut self, kind: ProcKind) -> Result<Proc> {
        let loc = self.loc();
        self.next()?;
        let (_, ident) = self.ident()?;
        let name = ident.name().clone();
        if kind == ProcKind::Sub {
            if let Ident::Plain(_) = ident {
            } else {
                return Err(error!(SyntaxError, loc; "TYPE SUFFIX NOT ALLOWED ON SUB"));
            }
        }
        let mut params = vec![];
        if let Some(Token::LParen) = self.peek() {
            self.next()?;
            if let Some(Token::RParen) = self.peek() {
                self.next()?;
            } else {
                loop {
                    let (param_loc, param_ident) = self.ident()?;
                    let as_type = if let Some(Token::Word(Word::As)) = self.peek() {
                        self.next()?;
                        Some(self.type_name()?)
                    } else {
                        None
                    };
                    params.push(Param {
                        loc: param_loc,
                        ident: param_ident,
                        as_type,
                    });
                    match self.next()?.token {
                        Token::RParen => break,
                        Token::Comma => continue,
                        _ => return Err(error!(SyntaxError, self.loc(); "EXPECTED , OR )")),
                    }
                }
            }
        }
        self.expect(Token::Eol)?;
        let body = self.block(&|parser| parser.at_terminator_end(kind))?;
        self.next()?; // END
        self.next()?; // SUB or FUNCTION
        self.end_of_statement()?;
        Ok(Proc {
            loc,
            kind,
            name,
            params,
            body,
            param_symbols: Default::default(),
            locals: Default::default(),
            ret_spec: None,
            labels: Default::default(),
        })
    }

    fn at_terminator_end(&self, kind: ProcKind) -> bool {
        if let Some(Token::Word(Word::End)) = self.peek() {
            match (kind, self.peek2()) {
                (ProcKind::Sub, Some(Token::Word(Word::Sub))) => true,
                (ProcKind::Function, Some(Token::Word(Word::Function))) => true,
                _ => false,
            }
        } else {
            false
        }
    }

    /// Collect statements until `stop` matches (the terminator tokens
    /// themselves are left unconsumed).
    fn block(&mut self, stop: &dyn Fn(&Parser) -> bool) -> Result<Vec<Stmt>> {
        let mut stmts = vec![];
        loop {
            self.skip_separators();
            if self.at_end() {
                return Err(error!(SyntaxError, self.last_loc; "UNEXPECTED END OF INPUT"));
            }
            if stop(self) {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
        }
    }

    // *** Statements

    fn statement(&mut self) -> Result<Stmt> {
        let loc = self.loc();
        match self.peek() {
            Some(Token::Ident(_)) => self.ident_statement(),
            Some(Token::Word(word)) => {
                let word = *word;
                use Word::*;
                match word {
                    Call => self.r#call(),
                    Const => self.r#const(),
                    Data => self.r#data(),
                    Defdbl | Defint | Deflng | Defsng | Defstr => self.def_type(),
                    Dim | Static => self.r#dim(),
                    Do => self.do_loop(),
                    End => {
                        self.next()?;
                        self.end_of_statement()?;
                        Ok(Stmt::End(loc))
                    }
                    Exit => self.r#exit(),
                    For => self.r#for(),
                    Gosub => {
                        self.next()?;
                        let (_, name) = self.plain_ident()?;
                        self.end_of_statement()?;
                        Ok(Stmt::Gosub(loc, name))
                    }
                    Goto => {
                        self.next()?;
                        let (_, name) = self.plain_ident()?;
                        self.end_of_statement()?;
                        Ok(Stmt::Goto(loc, name))
                    }
                    If => self.r#if(),
                    Input => self.input(false),
                    Let => {
                        self.next()?;
                        self.ident_statement()
                    }
                    Line => {
                        self.next()?;
                        self.expect_word(Word::Input)?;
                        self.input_tail(loc, true)
                    }
                    Next => self.next_stmt(),
                    Print => self.print(),
                    Read => self.read(),
                    Restore => {
                        self.next()?;
                        let label = if let Some(Token::Ident(_)) = self.peek() {
                            Some(self.plain_ident()?.1)
                        } else {
                            None
                        };
                        self.end_of_statement()?;
                        Ok(Stmt::Restore(loc, label))
                    }
                    Return => {
                        self.next()?;
                        let label = if let Some(Token::Ident(_)) = self.peek() {
                            Some(self.plain_ident()?.1)
                        } else {
                            None
                        };
                        self.end_of_statement()?;
                        Ok(Stmt::Return(loc, label))
                    }
                    Select => self.select_case(),
                    Swap => self.swap(),
                    While => self.while_wend(),
                    Sub | Function | Type => {
                        Err(error!(SyntaxError, loc; format!("{} NOT ALLOWED HERE", word)))
                    }
                    _ => Err(error!(SyntaxError, loc; format!("UNEXPECTED {}", word))),
                }
            }
            Some(t) => Err(error!(SyntaxError, loc; format!("UNEXPECTED {}", t))),
            None => Err(error!(SyntaxError, self.last_loc; "UNEXPECTED END OF INPUT")),
        }
    }

    /// A statement opening with an identifier: label, assignment, or a
    /// bare-name SUB invocation.
    fn ident_statement(&mut self) -> Result<Stmt> {
        let loc = self.loc();
        // Label: plain identifier immediately followed by a colon.
        if let (Some(Token::Ident(Ident::Plain(name))), Some(Token::Colon)) =
            (self.peek(), self.peek2())
        {
            let name = name.clone();
            self.idx += 2;
            return Ok(Stmt::Label(loc, name));
        }
        match self.peek2() {
            Some(Token::Operator(Operator::Equal)) | Some(Token::LParen) | Some(Token::Dot) => {}
            _ => {
                // Bare call: `name` or `name arg, arg`.
                return self.bare_call();
            }
        }
        let target = self.variable_expr()?;
        if let Some(Token::Operator(Operator::Equal)) = self.peek() {
            self.next()?;
            let expr = self.expression()?;
            self.end_of_statement()?;
            return Ok(Stmt::Assign(loc, target, expr));
        }
        // `name(...)` with no `=` is not a statement; bare calls take
        // no parentheses in this dialect.
        match target.kind {
            ExprKind::Var { ident, .. } => {
                self.bare_call_with_name(loc, ident.name().clone())
            }
            _ => Err(error!(SyntaxError, self.loc(); "EXPECTED =")),
        }
    }

    fn bare_call(&mut self) -> Result<Stmt> {
        let loc = self.loc();
        let (_, ident) = self.ident()?;
        match ident {
            Ident::Plain(name) => self.bare_call_with_name(loc, name),
            _ => Err(error!(SyntaxError, loc; "TYPE SUFFIX NOT ALLOWED ON SUB")),
        }
    }

    fn bare_call_with_name(&mut self, loc: Loc, name: Rc<str>) -> Result<Stmt> {
        let mut args = vec![];
        match self.peek() {
            Some(Token::Colon) | Some(Token::Eol) | None => {}
            _ => loop {
                args.push(self.expression()?);
                match self.peek() {
                    Some(Token::Comma) => {
                        self.next()?;
                    }
                    _ => break,
                }
            },
        }
        self.end_of_statement()?;
        Ok(Stmt::Call(
            loc,
            CallSite {
                name,
                args,
                target: None,
                by_ref: vec![],
            },
        ))
    }

    fn r#call(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Call)?;
        let (_, name) = self.plain_ident()?;
        let mut args = vec![];
        if let Some(Token::LParen) = self.peek() {
            self.next()?;
            if let Some(Token::RParen) = self.peek() {
                self.next()?;
            } else {
                loop {
                    args.push(self.expression()?);
                    match self.next()?.token {
                        Token::RParen => break,
                        Token::Comma => continue,
                        _ => return Err(error!(SyntaxError, self.loc(); "EXPECTED , OR )")),
                    }
                }
            }
        }
        self.end_of_statement()?;
        Ok(Stmt::Call(
            loc,
            CallSite {
                name,
                args,
                target: None,
                by_ref: vec![],
            },
        ))
    }

    fn r#const(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Const)?;
        let (_, ident) = self.ident()?;
        self.expect(Token::Operator(Operator::Equal))?;
        let expr = self.expression()?;
        self.end_of_statement()?;
        Ok(Stmt::Const(loc, ident, expr))
    }

    fn r#data(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Data)?;
        let mut items = vec![];
        loop {
            let item_loc = self.loc();
            let mut sign = 1.0;
            loop {
                match self.peek() {
                    Some(Token::Operator(Operator::Minus)) => {
                        self.next()?;
                        sign = -sign;
                    }
                    Some(Token::Operator(Operator::Plus)) => {
                        self.next()?;
                    }
                    _ => break,
                }
            }
            match self.next()?.token {
                Token::Literal(Literal::String(ref s)) => {
                    if sign < 0.0 {
                        return Err(error!(SyntaxError, item_loc; "EXPECTED NUMBER"));
                    }
                    items.push(DataItem::String(s.as_str().into()));
                }
                Token::Literal(ref lit) => {
                    let s = match lit {
                        Literal::Integer(s)
                        | Literal::Long(s)
                        | Literal::Single(s)
                        | Literal::Double(s) => s,
                        Literal::String(_) => unreachable!(),
                    };
                    match s.parse::<f64>() {
                        Ok(n) => items.push(DataItem::Number(sign * n)),
                        Err(_) => {
                            return Err(error!(SyntaxError, item_loc; "INVALID NUMBER"));
                        }
                    }
                }
                _ => return Err(error!(SyntaxError, item_loc; "EXPECTED DATA ITEM")),
            }
            match self.peek() {
                Some(Token::Comma) => {
                    self.next()?;
                }
                _ => break,
            }
        }
        self.end_of_statement()?;
        Ok(Stmt::Data(loc, items))
    }

    fn def_type(&mut self) -> Result<Stmt> {
        let loc = self.loc();
        let elem = match self.next()?.token {
            Token::Word(Word::Defint) => ElementaryType::Integer,
            Token::Word(Word::Deflng) => ElementaryType::Long,
            Token::Word(Word::Defsng) => ElementaryType::Single,
            Token::Word(Word::Defdbl) => ElementaryType::Double,
            Token::Word(Word::Defstr) => ElementaryType::String,
            _ => return Err(error!(InternalError, loc)),
        };
        let mut ranges = vec![];
        loop {
            let (range_loc, from) = self.def_type_letter()?;
            let to = if let Some(Token::Operator(Operator::Minus)) = self.peek() {
                self.next()?;
                self.def_type_letter()?.1
            } else {
                from
            };
            if to < from {
                return Err(error!(SyntaxError, range_loc; "INVALID LETTER RANGE"));
            }
            ranges.push((from, to));
            match self.peek() {
                Some(Token::Comma) => {
                    self.next()?;
                }
                _ => break,
            }
        }
        self.end_of_statement()?;
        Ok(Stmt::DefType(loc, elem, ranges))
    }

    fn def_type_letter(&mut self) -> Result<(Loc, char)> {
        let (loc, name) = self.plain_ident()?;
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => Ok((loc, c)),
            _ => Err(error!(SyntaxError, loc; "EXPECTED SINGLE LETTER")),
        }
    }

    fn r#dim(&mut self) -> Result<Stmt> {
        let loc = self.loc();
        let mut kind = match self.next()?.token {
            Token::Word(Word::Static) => DimKind::Static,
            _ => DimKind::Local,
        };
        if kind == DimKind::Local {
            if let Some(Token::Word(Word::Shared)) = self.peek() {
                self.next()?;
                kind = DimKind::Shared;
            }
        }
        let mut vars = vec![];
        loop {
            let (var_loc, ident) = self.ident()?;
            let bounds = if let Some(Token::LParen) = self.peek() {
                self.next()?;
                let mut dims = vec![];
                loop {
                    let first = self.expression()?;
                    let pair = if let Some(Token::Word(Word::To)) = self.peek() {
                        self.next()?;
                        let max = self.expression()?;
                        (first, max)
                    } else {
                        let zero = Expr::new(first.loc, ExprKind::Integer(0));
                        (zero, first)
                    };
                    dims.push(pair);
                    match self.next()?.token {
                        Token::RParen => break,
                        Token::Comma => continue,
                        _ => return Err(error!(SyntaxError, self.loc(); "EXPECTED , OR )")),
                    }
                }
                Some(dims)
            } else {
                None
            };
            let as_type = if let Some(Token::Word(Word::As)) = self.peek() {
                self.next()?;
                Some(self.type_name()?)
            } else {
                None
            };
            vars.push(DimVar {
                loc: var_loc,
                ident,
                bounds,
                as_type,
            });
            match self.peek() {
                Some(Token::Comma) => {
                    self.next()?;
                }
                _ => break,
            }
        }
        self.end_of_statement()?;
        Ok(Stmt::Dim(loc, kind, vars))
    }

    fn do_loop(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Do)?;
        let mut pre = None;
        match self.peek() {
            Some(Token::Word(Word::While)) => {
                self.next()?;
                pre = Some((self.expression()?, false));
            }
            Some(Token::Word(Word::Until)) => {
                self.next()?;
                pre = Some((self.expression()?, true));
            }
            _ => {}
        }
        self.expect(Token::Eol)?;
        let body = self.block(&|parser| {
            matches!(parser.peek(), Some(Token::Word(Word::Loop)))
        })?;
        self.next()?; // LOOP
        let mut post = None;
        match self.peek() {
            Some(Token::Word(Word::While)) => {
                self.next()?;
                post = Some((self.expression()?, false));
            }
            Some(Token::Word(Word::Until)) => {
                self.next()?;
                post = Some((self.expression()?, true));
            }
            _ => {}
        }
        self.end_of_statement()?;
        match (pre, post) {
            (Some(_), Some(_)) => {
                Err(error!(SyntaxError, loc; "CONDITION ON BOTH DO AND LOOP"))
            }
            (Some((cond, until)), None) => Ok(Stmt::CondLoop {
                loc,
                cond,
                until,
                post: false,
                body,
            }),
            (None, Some((cond, until))) => Ok(Stmt::CondLoop {
                loc,
                cond,
                until,
                post: true,
                body,
            }),
            (None, None) => Ok(Stmt::UncondLoop(loc, body)),
        }
    }

    fn while_wend(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::While)?;
        let cond = self.expression()?;
        self.expect(Token::Eol)?;
        let body = self.block(&|parser| {
            matches!(parser.peek(), Some(Token::Word(Word::Wend)))
        })?;
        self.next()?; // WEND
        self.end_of_statement()?;
        Ok(Stmt::CondLoop {
            loc,
            cond,
            until: false,
            post: false,
            body,
        })
    }

    fn r#exit(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Exit)?;
        let stmt = match self.next()?.token {
            Token::Word(Word::For) => Stmt::ExitFor(loc),
            Token::Word(Word::Do) => Stmt::ExitLoop(loc),
            Token::Word(Word::Sub) => Stmt::ExitProc(loc, ProcKind::Sub),
            Token::Word(Word::Function) => Stmt::ExitProc(loc, ProcKind::Function),
            _ => return Err(error!(SyntaxError, loc; "EXPECTED FOR, DO, SUB OR FUNCTION")),
        };
        self.end_of_statement()?;
        Ok(stmt)
    }

    fn r#for(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::For)?;
        let counter = self.variable_expr()?;
        self.expect(Token::Operator(Operator::Equal))?;
        let from = self.expression()?;
        self.expect_word(Word::To)?;
        let to = self.expression()?;
        let step = if let Some(Token::Word(Word::Step)) = self.peek() {
            self.next()?;
            Some(self.expression()?)
        } else {
            None
        };
        self.end_of_statement()?;
        Ok(Stmt::For {
            loc,
            counter,
            from,
            to,
            step,
        })
    }

    fn next_stmt(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Next)?;
        let mut counters = vec![];
        if let Some(Token::Ident(_)) = self.peek() {
            loop {
                counters.push(self.variable_expr()?);
                match self.peek() {
                    Some(Token::Comma) => {
                        self.next()?;
                    }
                    _ => break,
                }
            }
        }
        self.end_of_statement()?;
        Ok(Stmt::Next(loc, counters))
    }

    fn r#if(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::If)?;
        let cond = self.expression()?;
        self.expect_word(Word::Then)?;
        if let Some(Token::Eol) = self.peek() {
            return self.if_block(loc, cond);
        }
        // Single-line form.
        let mut branches = vec![];
        let mut then_body = vec![];
        loop {
            then_body.push(self.statement_single_line()?);
            match self.peek() {
                Some(Token::Colon) => {
                    self.next()?;
                    if let Some(Token::Word(Word::Else)) | Some(Token::Eol) | None = self.peek() {
                        break;
                    }
                }
                _ => break,
            }
        }
        branches.push((cond, then_body));
        let mut else_body = vec![];
        if let Some(Token::Word(Word::Else)) = self.peek() {
            self.next()?;
            loop {
                else_body.push(self.statement_single_line()?);
                match self.peek() {
                    Some(Token::Colon) => {
                        self.next()?;
                    }
                    _ => break,
                }
            }
        }
        self.end_of_statement()?;
        Ok(Stmt::If {
            loc,
            branches,
            else_body,
        })
    }

    /// A statement inside a single-line IF; ELSE belongs to the IF,
    /// not to the statement.
    fn statement_single_line(&mut self) -> Result<Stmt> {
        match self.peek() {
            Some(Token::Word(Word::Else)) | Some(Token::Eol) | None => {
                Err(error!(SyntaxError, self.loc(); "EXPECTED STATEMENT"))
            }
            _ => self.statement_no_terminator(),
        }
    }

    /// Like `statement` but tolerates ELSE as the trailing terminator
    /// (single-line IF bodies).
    fn statement_no_terminator(&mut self) -> Result<Stmt> {
        // Statements verify their own end; ELSE ends a single-line
        // body the same way a colon would. The individual statement
        // parsers only check for Colon/Eol, so patch around them by
        // splicing: parse with a lookahead guard.
        let save = self.idx;
        match self.statement() {
            Ok(stmt) => Ok(stmt),
            Err(e) => {
                // Retry: if the failure was only the trailing ELSE,
                // re-parse up to it.
                self.idx = save;
                let stmt = self.statement_until_else()?;
                match stmt {
                    Some(s) => Ok(s),
                    None => Err(e),
                }
            }
        }
    }

    fn statement_until_else(&mut self) -> Result<Option<Stmt>> {
        // Find the ELSE on this line, temporarily treat it as EOL by
        // restricting the token window.
        let mut end = self.idx;
        while let Some(t) = self.tokens.get(end) {
            match t.token {
                Token::Word(Word::Else) | Token::Eol => break,
                _ => end += 1,
            }
        }
        if let Some(LocToken {
            token: Token::Word(Word::Else),
            ..
        }) = self.tokens.get(end)
        {
            let window = &self.tokens[..end];
            let mut sub = Parser {
                tokens: window,
                idx: self.idx,
                last_loc: self.last_loc,
            };
            let stmt = sub.statement()?;
            if sub.idx == end {
                self.idx = end;
                return Ok(Some(stmt));
            }
        }
        Ok(None)
    }

    fn if_block(&mut self, loc: Loc, first_cond: Expr) -> Result<Stmt> {
        let stop = |parser: &Parser| match parser.peek() {
            Some(Token::Word(Word::Elseif)) | Some(Token::Word(Word::Else)) => true,
            Some(Token::Word(Word::End)) => {
                matches!(parser.peek2(), Some(Token::Word(Word::If)))
            }
            _ => false,
        };
        let mut branches = vec![];
        let mut cond = first_cond;
        let mut else_body = vec![];
        loop {
            let body = self.block(&stop)?;
            branches.push((cond, body));
            match self.next()?.token {
                Token::Word(Word::Elseif) => {
                    cond = self.expression()?;
                    self.expect_word(Word::Then)?;
                    self.expect(Token::Eol)?;
                }
                Token::Word(Word::Else) => {
                    self.expect(Token::Eol)?;
                    else_body = self.block(&|parser| match parser.peek() {
                        Some(Token::Word(Word::End)) => {
                            matches!(parser.peek2(), Some(Token::Word(Word::If)))
                        }
                        _ => false,
                    })?;
                    self.next()?; // END
                    self.next()?; // IF
                    self.end_of_statement()?;
                    break;
                }
                Token::Word(Word::End) => {
                    self.next()?; // IF
                    self.end_of_statement()?;
                    break;
                }
                _ => return Err(error!(InternalError, self.loc())),
            }
        }
        Ok(Stmt::If {
            loc,
            branches,
            else_body,
        })
    }

    fn select_case(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Select)?;
        self.expect_word(Word::Case)?;
        let test = self.expression()?;
        self.expect(Token::Eol)?;
        let stop = |parser: &Parser| match parser.peek() {
            Some(Token::Word(Word::Case)) => true,
            Some(Token::Word(Word::End)) => {
                matches!(parser.peek2(), Some(Token::Word(Word::Select)))
            }
            _ => false,
        };
        self.skip_separators();
        let mut arms = vec![];
        let mut else_body = None;
        loop {
            match self.next()?.token {
                Token::Word(Word::End) => {
                    self.next()?; // SELECT
                    self.end_of_statement()?;
                    break;
                }
                Token::Word(Word::Case) => {
                    let arm_loc = self.loc();
                    if let Some(Token::Word(Word::Else)) = self.peek() {
                        self.next()?;
                        self.expect(Token::Eol)?;
                        else_body = Some(self.block(&stop)?);
                        continue;
                    }
                    let mut conds = vec![];
                    loop {
                        conds.push(self.case_cond()?);
                        match self.peek() {
                            Some(Token::Comma) => {
                                self.next()?;
                            }
                            _ => break,
                        }
                    }
                    self.expect(Token::Eol)?;
                    let body = self.block(&stop)?;
                    arms.push(CaseArm {
                        loc: arm_loc,
                        conds,
                        body,
                    });
                }
                _ => return Err(error!(SyntaxError, self.loc(); "EXPECTED CASE OR END SELECT")),
            }
        }
        Ok(Stmt::SelectCase {
            loc,
            test,
            arms,
            else_body,
        })
    }

    fn case_cond(&mut self) -> Result<CaseCond> {
        if let Some(Token::Word(Word::Is)) = self.peek() {
            self.next()?;
            let loc = self.loc();
            let op = match self.next()?.token {
                Token::Operator(Operator::Equal) => BinOp::Eq,
                Token::Operator(Operator::NotEqual) => BinOp::Ne,
                Token::Operator(Operator::Less) => BinOp::Lt,
                Token::Operator(Operator::LessEqual) => BinOp::Le,
                Token::Operator(Operator::Greater) => BinOp::Gt,
                Token::Operator(Operator::GreaterEqual) => BinOp::Ge,
                _ => return Err(error!(SyntaxError, loc; "EXPECTED COMPARISON OPERATOR")),
            };
            let expr = self.expression()?;
            return Ok(CaseCond::Compare(op, expr));
        }
        let expr = self.expression()?;
        if let Some(Token::Word(Word::To)) = self.peek() {
            self.next()?;
            let hi = self.expression()?;
            return Ok(CaseCond::Range(expr, hi));
        }
        Ok(CaseCond::Value(expr))
    }

    fn print(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Print)?;
        let using = if let Some(Token::Word(Word::Using)) = self.peek() {
            self.next()?;
            let format = self.expression()?;
            self.expect(Token::Semicolon)?;
            Some(format)
        } else {
            None
        };
        let mut items = vec![];
        loop {
            match self.peek() {
                Some(Token::Colon) | Some(Token::Eol) | Some(Token::Word(Word::Else)) | None => {
                    break;
                }
                Some(Token::Semicolon) => {
                    self.next()?;
                    items.push(PrintItem::Semicolon);
                }
                Some(Token::Comma) => {
                    self.next()?;
                    items.push(PrintItem::Comma);
                }
                _ => {
                    items.push(PrintItem::Expr(self.expression()?));
                }
            }
        }
        Ok(Stmt::Print { loc, using, items })
    }

    fn input(&mut self, line: bool) -> Result<Stmt> {
        let loc = self.expect_word(Word::Input)?;
        self.input_tail(loc, line)
    }

    fn input_tail(&mut self, loc: Loc, line: bool) -> Result<Stmt> {
        if let Some(Token::Semicolon) = self.peek() {
            self.next()?;
        }
        let mut prompt = None;
        if let Some(Token::Literal(Literal::String(s))) = self.peek() {
            let s = s.clone();
            if let Some(Token::Semicolon) | Some(Token::Comma) = self.peek2() {
                self.next()?;
                self.next()?;
                prompt = Some(Rc::from(s.as_str()));
            }
        }
        let mut vars = vec![];
        loop {
            vars.push(self.variable_expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.next()?;
                }
                _ => break,
            }
        }
        if line && vars.len() != 1 {
            return Err(error!(SyntaxError, loc; "LINE INPUT TAKES ONE VARIABLE"));
        }
        self.end_of_statement()?;
        Ok(Stmt::Input {
            loc,
            prompt,
            line,
            vars,
        })
    }

    fn read(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Read)?;
        let mut vars = vec![];
        loop {
            vars.push(self.variable_expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.next()?;
                }
                _ => break,
            }
        }
        self.end_of_statement()?;
        Ok(Stmt::Read(loc, vars))
    }

    fn swap(&mut self) -> Result<Stmt> {
        let loc = self.expect_word(Word::Swap)?;
        let lhs = self.variable_expr()?;
        self.expect(Token::Comma)?;
        let rhs = self.variable_expr()?;
        self.end_of_statement()?;
        Ok(Stmt::Swap(loc, lhs, rhs))
    }

    // *** Expressions

    /// A variable reference with optional subscript/member postfix;
    /// used where the grammar requires an lvalue.
    fn variable_expr(&mut self) -> Result<Expr> {
        let loc = self.loc();
        let expr = self.primary()?;
        match expr.kind {
            ExprKind::Var { .. } | ExprKind::FnCall(_) | ExprKind::Member { .. } => Ok(expr),
            _ => Err(error!(SyntaxError, loc; "EXPECTED VARIABLE")),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        self.binary_expr(0)
    }

    fn binary_expr(&mut self, min_prec: usize) -> Result<Expr> {
        // NOT sits between the comparisons and AND, so `NOT B = C`
        // negates the comparison.
        let mut lhs = match self.peek() {
            Some(Token::Operator(Operator::Not)) if min_prec <= NOT_PREC => {
                let loc = self.loc();
                self.next()?;
                let expr = self.binary_expr(NOT_PREC)?;
                Expr::new(
                    loc,
                    ExprKind::Unary {
                        op: UnOp::Not,
                        expr: Box::new(expr),
                    },
                )
            }
            _ => self.unary_expr()?,
        };
        while let Some(Token::Operator(op)) = self.peek() {
            let (bin_op, prec) = match binary_op(*op) {
                Some(entry) => entry,
                None => break,
            };
            if prec < min_prec {
                break;
            }
            let loc = self.loc();
            self.next()?;
            // Left-associative: the right side binds one level tighter.
            let rhs = self.binary_expr(prec + 1)?;
            lhs = Expr::new(
                loc,
                ExprKind::Binary {
                    op: bin_op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            );
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr> {
        let loc = self.loc();
        match self.peek() {
            Some(Token::Operator(Operator::Minus)) => {
                self.next()?;
                let expr = self.unary_expr()?;
                Ok(Expr::new(
                    loc,
                    ExprKind::Unary {
                        op: UnOp::Neg,
                        expr: Box::new(expr),
                    },
                ))
            }
            Some(Token::Operator(Operator::Plus)) => {
                self.next()?;
                self.unary_expr()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        let loc = self.loc();
        let mut expr = match self.next()?.token {
            Token::LParen => {
                let expr = self.expression()?;
                self.expect(Token::RParen)?;
                expr
            }
            Token::Literal(ref lit) => Expr::new(loc, literal_kind(loc, lit)?),
            Token::Ident(ref ident) => {
                let ident = ident.clone();
                if let Some(Token::LParen) = self.peek() {
                    self.next()?;
                    let mut args = vec![];
                    if let Some(Token::RParen) = self.peek() {
                        self.next()?;
                    } else {
                        loop {
                            args.push(self.expression()?);
                            match self.next()?.token {
                                Token::RParen => break,
                                Token::Comma => continue,
                                _ => {
                                    return Err(
                                        error!(SyntaxError, self.loc(); "EXPECTED , OR )"),
                                    )
                                }
                            }
                        }
                    }
                    Expr::new(
                        loc,
                        ExprKind::FnCall(CallSite {
                            name: ident.name().clone(),
                            args,
                            target: None,
                            by_ref: vec![],
                        }),
                    )
                } else {
                    Expr::new(loc, ExprKind::Var { ident, scope: None })
                }
            }
            ref t => return Err(error!(SyntaxError, loc; format!("UNEXPECTED {}", t))),
        };
        // Member access postfix; chains like `a(1).p.x` are allowed
        // and resolved against TYPE declarations by the analyzer.
        while let Some(Token::Dot) = self.peek() {
            let dot_loc = self.loc();
            self.next()?;
            let (_, field) = self.ident()?;
            expr = Expr::new(
                dot_loc,
                ExprKind::Member {
                    record: Box::new(expr),
                    field: field.name().clone(),
                },
            );
        }
        Ok(expr)
    }
}

fn literal_kind(loc: Loc, lit: &Literal) -> Result<ExprKind> {
    let kind = match lit {
        Literal::Integer(s) => match s.parse::<i16>() {
            Ok(n) => ExprKind::Integer(n),
            Err(_) => return Err(error!(Overflow, loc)),
        },
        Literal::Long(s) => match s.parse::<i32>() {
            Ok(n) => ExprKind::Long(n),
            Err(_) => return Err(error!(Overflow, loc)),
        },
        Literal::Single(s) => match s.parse::<f32>() {
            Ok(n) => ExprKind::Single(n),
            Err(_) => return Err(error!(Overflow, loc)),
        },
        Literal::Double(s) => match s.parse::<f64>() {
            Ok(n) => ExprKind::Double(n),
            Err(_) => return Err(error!(Overflow, loc)),
        },
        Literal::String(s) => ExprKind::StringLit(s.as_str().into()),
    };
    Ok(kind)
}

/// Operator precedence, loosest to tightest: OR, AND, comparison,
/// addition, MOD, integer division, multiplication, exponentiation.
const NOT_PREC: usize = 3;

fn binary_op(op: Operator) -> Option<(BinOp, usize)> {
    use Operator::*;
    let entry = match op {
        Or => (BinOp::Or, 1),
        And => (BinOp::And, 2),
        Equal => (BinOp::Eq, 4),
        NotEqual => (BinOp::Ne, 4),
        Less => (BinOp::Lt, 4),
        LessEqual => (BinOp::Le, 4),
        Greater => (BinOp::Gt, 4),
        GreaterEqual => (BinOp::Ge, 4),
        Plus => (BinOp::Add, 5),
        Minus => (BinOp::Sub, 5),
        Modulus => (BinOp::Mod, 6),
        DivideInt => (BinOp::IDiv, 7),
        Multiply => (BinOp::Mul, 8),
        Divide => (BinOp::Div, 8),
        Caret => (BinOp::Pow, 10),
        Not => return None,
    };
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::lex;

    fn module(source: &str) -> Module {
        parse(&lex(source).unwrap()).unwrap()
    }

    fn parse_err(source: &str) -> Error {
        parse(&lex(source).unwrap()).unwrap_err()
    }

    #[test]
    fn test_precedence() {
        let m = module("A = 1 + 2 * 3");
        match &m.stmts[0] {
            Stmt::Assign(_, _, expr) => match &expr.kind {
                ExprKind::Binary { op, rhs, .. } => {
                    assert_eq!(*op, BinOp::Add);
                    assert!(matches!(
                        rhs.kind,
                        ExprKind::Binary { op: BinOp::Mul, .. }
                    ));
                }
                k => panic!("{:?}", k),
            },
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_comparison_binds_looser_than_addition() {
        let m = module("A = B + 1 > C");
        match &m.stmts[0] {
            Stmt::Assign(_, _, expr) => {
                assert!(matches!(expr.kind, ExprKind::Binary { op: BinOp::Gt, .. }));
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let m = module("A = NOT B = C");
        match &m.stmts[0] {
            Stmt::Assign(_, _, expr) => match &expr.kind {
                ExprKind::Unary { op: UnOp::Not, expr } => {
                    assert!(matches!(expr.kind, ExprKind::Binary { op: BinOp::Eq, .. }));
                }
                k => panic!("{:?}", k),
            },
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_block_if_elseif_else() {
        let m = module(
            "IF A = 1 THEN\nPRINT 1\nELSEIF A = 2 THEN\nPRINT 2\nELSE\nPRINT 3\nEND IF",
        );
        match &m.stmts[0] {
            Stmt::If {
                branches,
                else_body,
                ..
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(else_body.len(), 1);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_single_line_if_else() {
        let m = module("IF A THEN PRINT 1 ELSE PRINT 2");
        match &m.stmts[0] {
            Stmt::If {
                branches,
                else_body,
                ..
            } => {
                assert_eq!(branches.len(), 1);
                assert_eq!(branches[0].1.len(), 1);
                assert_eq!(else_body.len(), 1);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_select_case_forms() {
        let m = module(
            "SELECT CASE X\nCASE 1, 2\nPRINT 1\nCASE 3 TO 5\nPRINT 2\nCASE IS > 9\nPRINT 3\nCASE ELSE\nPRINT 4\nEND SELECT",
        );
        match &m.stmts[0] {
            Stmt::SelectCase {
                arms, else_body, ..
            } => {
                assert_eq!(arms.len(), 3);
                assert_eq!(arms[0].conds.len(), 2);
                assert!(matches!(arms[1].conds[0], CaseCond::Range(..)));
                assert!(matches!(arms[2].conds[0], CaseCond::Compare(BinOp::Gt, _)));
                assert!(else_body.is_some());
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_do_loop_post_condition() {
        let m = module("DO\nPRINT 1\nLOOP UNTIL A > 3");
        match &m.stmts[0] {
            Stmt::CondLoop {
                until, post, body, ..
            } => {
                assert!(*until);
                assert!(*post);
                assert_eq!(body.len(), 1);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_while_wend() {
        let m = module("WHILE A < 3\nA = A + 1\nWEND");
        assert!(matches!(
            m.stmts[0],
            Stmt::CondLoop {
                until: false,
                post: false,
                ..
            }
        ));
    }

    #[test]
    fn test_for_with_step() {
        let m = module("FOR I = 10 TO 1 STEP -1\nNEXT I");
        assert!(matches!(m.stmts[0], Stmt::For { step: Some(_), .. }));
        match &m.stmts[1] {
            Stmt::Next(_, counters) => assert_eq!(counters.len(), 1),
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_dim_bounds_and_as() {
        let m = module("DIM A(5), B(1 TO 3, 0 TO 2) AS LONG");
        match &m.stmts[0] {
            Stmt::Dim(_, DimKind::Local, vars) => {
                assert_eq!(vars.len(), 2);
                assert_eq!(vars[0].bounds.as_ref().unwrap().len(), 1);
                assert_eq!(vars[1].bounds.as_ref().unwrap().len(), 2);
                assert_eq!(
                    vars[1].as_type,
                    Some(TypeName::Elementary(ElementaryType::Long))
                );
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_dim_shared() {
        let m = module("DIM SHARED A AS DOUBLE");
        assert!(matches!(m.stmts[0], Stmt::Dim(_, DimKind::Shared, _)));
    }

    #[test]
    fn test_label_and_goto() {
        let m = module("START:\nGOTO START");
        assert!(matches!(m.stmts[0], Stmt::Label(..)));
        assert!(matches!(m.stmts[1], Stmt::Goto(..)));
    }

    #[test]
    fn test_sub_definition_and_bare_call() {
        let m = module("GREET \"WORLD\", 2\nSUB GREET (NAME$, N)\nPRINT NAME$\nEND SUB");
        assert_eq!(m.procs.len(), 1);
        assert_eq!(m.procs[0].params.len(), 2);
        match &m.stmts[0] {
            Stmt::Call(_, site) => {
                assert_eq!(&*site.name, "GREET");
                assert_eq!(site.args.len(), 2);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_function_definition() {
        let m = module("FUNCTION ADD%(A%, B%)\nADD% = A% + B%\nEND FUNCTION");
        assert_eq!(m.procs[0].kind, ProcKind::Function);
        assert_eq!(&*m.procs[0].name, "ADD%");
    }

    #[test]
    fn test_type_declaration() {
        let m = module("TYPE POINT\nX AS SINGLE\nY AS SINGLE\nEND TYPE");
        assert_eq!(m.types.len(), 1);
        assert_eq!(m.types[0].fields.len(), 2);
    }

    #[test]
    fn test_member_access_chain() {
        let m = module("A = P.POS.X");
        match &m.stmts[0] {
            Stmt::Assign(_, _, expr) => match &expr.kind {
                ExprKind::Member { record, field } => {
                    assert_eq!(&**field, "X");
                    assert!(matches!(record.kind, ExprKind::Member { .. }));
                }
                k => panic!("{:?}", k),
            },
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_member_assignment() {
        let m = module("P.X = 1.5");
        match &m.stmts[0] {
            Stmt::Assign(_, target, _) => {
                assert!(matches!(target.kind, ExprKind::Member { .. }));
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_data_signs_and_strings() {
        let m = module("DATA 1, -2.5, \"THREE\"");
        match &m.stmts[0] {
            Stmt::Data(_, items) => {
                assert!(matches!(items[0], DataItem::Number(n) if n == 1.0));
                assert!(matches!(items[1], DataItem::Number(n) if n == -2.5));
                assert!(matches!(items[2], DataItem::String(ref s) if &**s == "THREE"));
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_print_separators() {
        let m = module("PRINT 1; 2, 3;");
        match &m.stmts[0] {
            Stmt::Print { items, .. } => {
                assert_eq!(items.len(), 6);
                assert!(matches!(items[5], PrintItem::Semicolon));
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_input_with_prompt() {
        let m = module("INPUT \"NAME? \"; N$");
        match &m.stmts[0] {
            Stmt::Input {
                prompt, line, vars, ..
            } => {
                assert_eq!(prompt.as_deref(), Some("NAME? "));
                assert!(!line);
                assert_eq!(vars.len(), 1);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_def_type_ranges() {
        let m = module("DEFINT A-C, I");
        match &m.stmts[0] {
            Stmt::DefType(_, ElementaryType::Integer, ranges) => {
                assert_eq!(ranges, &vec![('A', 'C'), ('I', 'I')]);
            }
            s => panic!("{:?}", s),
        }
    }

    #[test]
    fn test_unterminated_block_reports_end_of_input() {
        let error = parse_err("DO\nPRINT 1");
        assert_eq!(error.code(), 2);
        assert!(error.to_string().contains("UNEXPECTED END OF INPUT"));
    }

    #[test]
    fn test_next_without_ident_allowed() {
        let m = module("FOR I = 1 TO 3\nNEXT");
        match &m.stmts[1] {
            Stmt::Next(_, counters) => assert!(counters.is_empty()),
            s => panic!("{:?}", s),
        }
    }
}
