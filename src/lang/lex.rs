use super::{token::*, Error, Loc};
use std::rc::Rc;

/// A token with its source position.
#[derive(Debug, PartialEq, Clone)]
pub struct LocToken {
    pub loc: Loc,
    pub token: Token,
}

/// Tokenize an entire source text.
///
/// Identifiers and keywords are case-insensitive and normalized to
/// uppercase. Comments (`'` and `REM`) are discarded to end of line.
/// A final end-of-line token is always present so statement termination
/// never falls off the stream.
pub fn lex(source: &str) -> Result<Vec<LocToken>, Error> {
    Lexer::lex(source)
}

fn is_basic_whitespace(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r'
}

fn is_basic_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_basic_alphabetic(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_suffix(c: char) -> bool {
    c == '$' || c == '%' || c == '&' || c == '!' || c == '#'
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    loc: Loc,
}

impl<'a> Lexer<'a> {
    fn lex(source: &str) -> Result<Vec<LocToken>, Error> {
        let mut lexer = Lexer {
            chars: source.chars().peekable(),
            loc: Loc::new(1, 1),
        };
        let mut tokens: Vec<LocToken> = vec![];
        loop {
            let loc = lexer.loc;
            let token = match lexer.scan()? {
                Some(token) => token,
                None => break,
            };
            // Collapse runs of blank lines into one separator.
            if token == Token::Eol {
                if let Some(LocToken {
                    token: Token::Eol, ..
                }) = tokens.last()
                {
                    continue;
                }
            }
            tokens.push(LocToken { loc, token });
        }
        let loc = match tokens.last() {
            Some(t) => t.loc,
            None => Loc::new(1, 1),
        };
        tokens.push(LocToken {
            loc,
            token: Token::Eol,
        });
        Ok(tokens)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.loc.line += 1;
            self.loc.col = 1;
        } else {
            self.loc.col += 1;
        }
        Some(ch)
    }

    fn scan(&mut self) -> Result<Option<Token>, Error> {
        loop {
            let pk = match self.chars.peek() {
                Some(pk) => *pk,
                None => return Ok(None),
            };
            if is_basic_whitespace(pk) {
                self.advance();
                continue;
            }
            if pk == '\'' {
                self.remark();
                continue;
            }
            if pk == '\n' {
                self.advance();
                return Ok(Some(Token::Eol));
            }
            if is_basic_digit(pk) {
                return Ok(Some(self.number(false)));
            }
            if pk == '.' {
                // A dot opens a number only when digits follow;
                // otherwise it is member access.
                self.advance();
                if let Some(pk2) = self.chars.peek() {
                    if is_basic_digit(*pk2) {
                        return Ok(Some(self.number(true)));
                    }
                }
                return Ok(Some(Token::Dot));
            }
            if is_basic_alphabetic(pk) {
                match self.alphabetic() {
                    Token::Word(Word::Rem) => {
                        self.remark();
                        continue;
                    }
                    token => return Ok(Some(token)),
                }
            }
            if pk == '"' {
                return Ok(Some(self.string()));
            }
            return self.minutia().map(Some);
        }
    }

    /// Discard everything up to, but not including, the newline.
    fn remark(&mut self) {
        while let Some(pk) = self.chars.peek() {
            if *pk == '\n' {
                return;
            }
            self.advance();
        }
    }

    fn number(&mut self, leading_dot: bool) -> Token {
        let mut s = String::new();
        let mut digits = 0;
        let mut decimal = leading_dot;
        let mut exp = false;
        if leading_dot {
            s.push('.');
        }
        loop {
            let mut ch = match self.advance() {
                Some(ch) => ch.to_ascii_uppercase(),
                None => break,
            };
            // Suffix characters classify the literal and are not kept.
            match ch {
                '%' => return Token::Literal(Literal::Integer(s)),
                '&' => return Token::Literal(Literal::Long(s)),
                '!' => return Token::Literal(Literal::Single(s)),
                '#' => return Token::Literal(Literal::Double(s)),
                _ => {}
            }
            if ch == 'D' {
                ch = 'E';
                digits += 8;
            }
            s.push(ch);
            if !exp && is_basic_digit(ch) {
                digits += 1;
            }
            if ch == '.' {
                decimal = true;
            }
            let pk = match self.chars.peek() {
                Some(pk) => pk.to_ascii_uppercase(),
                None => break,
            };
            if ch == 'E' {
                exp = true;
                if pk == '+' || pk == '-' {
                    continue;
                }
            }
            if is_basic_digit(pk) {
                continue;
            }
            if !decimal && !exp && pk == '.' {
                continue;
            }
            if !exp && (pk == 'E' || pk == 'D') {
                continue;
            }
            if is_suffix(pk) && pk != '$' {
                continue;
            }
            break;
        }
        if digits > 7 {
            return Token::Literal(Literal::Double(s));
        }
        if !exp && !decimal {
            if s.parse::<i16>().is_ok() {
                return Token::Literal(Literal::Integer(s));
            }
            if s.parse::<i32>().is_ok() {
                return Token::Literal(Literal::Long(s));
            }
            return Token::Literal(Literal::Double(s));
        }
        Token::Literal(Literal::Single(s))
    }

    /// String literals have no escape mechanism; a quote always
    /// terminates, and end of line terminates an unclosed literal.
    fn string(&mut self) -> Token {
        let mut s = String::new();
        self.advance();
        loop {
            match self.chars.peek() {
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\n') | None => break,
                Some(_) => {
                    if let Some(ch) = self.advance() {
                        s.push(ch);
                    }
                }
            }
        }
        Token::Literal(Literal::String(s))
    }

    fn alphabetic(&mut self) -> Token {
        let mut s = String::new();
        loop {
            match self.advance() {
                Some(ch) => s.push(ch.to_ascii_uppercase()),
                None => break,
            }
            let pk = match self.chars.peek() {
                Some(pk) => *pk,
                None => break,
            };
            if is_basic_alphabetic(pk) || is_basic_digit(pk) {
                continue;
            }
            if is_suffix(pk) {
                if let Some(ch) = self.advance() {
                    s.push(ch);
                }
            }
            break;
        }
        let name: Rc<str> = s.as_str().into();
        match s.chars().last() {
            Some('$') => Token::Ident(Ident::String(name)),
            Some('%') => Token::Ident(Ident::Integer(name)),
            Some('&') => Token::Ident(Ident::Long(name)),
            Some('!') => Token::Ident(Ident::Single(name)),
            Some('#') => Token::Ident(Ident::Double(name)),
            _ => match Token::from_word(&s) {
                Some(token) => token,
                None => Token::Ident(Ident::Plain(name)),
            },
        }
    }

    fn minutia(&mut self) -> Result<Token, Error> {
        let loc = self.loc;
        let ch = match self.advance() {
            Some(ch) => ch,
            None => return Err(error!(InternalError, loc)),
        };
        use Operator::*;
        let token = match ch {
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            '^' => Token::Operator(Caret),
            '*' => Token::Operator(Multiply),
            '/' => Token::Operator(Divide),
            '\\' => Token::Operator(DivideInt),
            '+' => Token::Operator(Plus),
            '-' => Token::Operator(Minus),
            '=' => Token::Operator(Equal),
            '<' => match self.chars.peek() {
                Some('=') => {
                    self.advance();
                    Token::Operator(LessEqual)
                }
                Some('>') => {
                    self.advance();
                    Token::Operator(NotEqual)
                }
                _ => Token::Operator(Less),
            },
            '>' => match self.chars.peek() {
                Some('=') => {
                    self.advance();
                    Token::Operator(GreaterEqual)
                }
                _ => Token::Operator(Greater),
            },
            _ => return Err(error!(SyntaxError, loc; format!("UNEXPECTED CHARACTER '{}'", ch))),
        };
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<Token> {
        lex(s).unwrap().into_iter().map(|t| t.token).collect()
    }

    #[test]
    fn test_case_insensitive_keywords() {
        assert_eq!(
            tokens("select Case x"),
            vec![
                Token::Word(Word::Select),
                Token::Word(Word::Case),
                Token::Ident(Ident::Plain("X".into())),
                Token::Eol,
            ]
        );
    }

    #[test]
    fn test_suffixed_idents_and_keyword_collision() {
        assert_eq!(
            tokens("string$(2, 65)"),
            vec![
                Token::Ident(Ident::String("STRING$".into())),
                Token::LParen,
                Token::Literal(Literal::Integer("2".into())),
                Token::Comma,
                Token::Literal(Literal::Integer("65".into())),
                Token::RParen,
                Token::Eol,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("1 40000 1.5 1e3 12#"),
            vec![
                Token::Literal(Literal::Integer("1".into())),
                Token::Literal(Literal::Long("40000".into())),
                Token::Literal(Literal::Single("1.5".into())),
                Token::Literal(Literal::Single("1E3".into())),
                Token::Literal(Literal::Double("12".into())),
                Token::Eol,
            ]
        );
    }

    #[test]
    fn test_comment_and_locations() {
        let lts = lex("A = 1 ' ignored\nB = 2").unwrap();
        assert_eq!(lts[0].loc, Loc::new(1, 1));
        assert_eq!(lts[3].token, Token::Eol);
        assert_eq!(lts[4].loc, Loc::new(2, 1));
        assert_eq!(lts[4].token, Token::Ident(Ident::Plain("B".into())));
    }

    #[test]
    fn test_string_literal_no_escapes() {
        assert_eq!(
            tokens(r#"PRINT "HE SAID ""#),
            vec![
                Token::Word(Word::Print),
                Token::Literal(Literal::String("HE SAID ".into())),
                Token::Eol,
            ]
        );
    }

    #[test]
    fn test_relational_digraphs() {
        assert_eq!(
            tokens("a <= b <> c >= d"),
            vec![
                Token::Ident(Ident::Plain("A".into())),
                Token::Operator(Operator::LessEqual),
                Token::Ident(Ident::Plain("B".into())),
                Token::Operator(Operator::NotEqual),
                Token::Ident(Ident::Plain("C".into())),
                Token::Operator(Operator::GreaterEqual),
                Token::Ident(Ident::Plain("D".into())),
                Token::Eol,
            ]
        );
    }
}
