use std::rc::Rc;

/// A lexed token. Identifiers carry their type-suffix character as part
/// of the name, so `A` and `A$` are distinct names.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Word(Word),
    Operator(Operator),
    Literal(Literal),
    Ident(Ident),
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Eol,
}

impl Token {
    /// Case-insensitive reserved word lookup. `s` must already be uppercase.
    pub fn from_word(s: &str) -> Option<Token> {
        use Operator::*;
        use Word::*;
        let word = match s {
            "AS" => As,
            "CALL" => Call,
            "CASE" => Case,
            "CONST" => Const,
            "DATA" => Data,
            "DEFDBL" => Defdbl,
            "DEFINT" => Defint,
            "DEFLNG" => Deflng,
            "DEFSNG" => Defsng,
            "DEFSTR" => Defstr,
            "DIM" => Dim,
            "DO" => Do,
            "DOUBLE" => Double,
            "ELSE" => Else,
            "ELSEIF" => Elseif,
            "END" => End,
            "EXIT" => Exit,
            "FOR" => For,
            "FUNCTION" => Function,
            "GOSUB" => Gosub,
            "GOTO" => Goto,
            "IF" => If,
            "INPUT" => Input,
            "INTEGER" => Integer,
            "IS" => Is,
            "LET" => Let,
            "LINE" => Line,
            "LONG" => Long,
            "LOOP" => Loop,
            "NEXT" => Next,
            "PRINT" => Print,
            "READ" => Read,
            "REM" => Rem,
            "RESTORE" => Restore,
            "RETURN" => Return,
            "SELECT" => Select,
            "SHARED" => Shared,
            "SINGLE" => Single,
            "STATIC" => Static,
            "STEP" => Step,
            "STRING" => String,
            "SUB" => Sub,
            "SWAP" => Swap,
            "THEN" => Then,
            "TO" => To,
            "TYPE" => Type,
            "UNTIL" => Until,
            "USING" => Using,
            "WEND" => Wend,
            "WHILE" => While,
            "AND" => return Some(Token::Operator(And)),
            "MOD" => return Some(Token::Operator(Modulus)),
            "NOT" => return Some(Token::Operator(Not)),
            "OR" => return Some(Token::Operator(Or)),
            _ => return None,
        };
        Some(Token::Word(word))
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Token::*;
        match self {
            Word(s) => write!(f, "{}", s),
            Operator(s) => write!(f, "{}", s),
            Literal(s) => write!(f, "{}", s),
            Ident(s) => write!(f, "{}", s),
            LParen => write!(f, "("),
            RParen => write!(f, ")"),
            Comma => write!(f, ","),
            Colon => write!(f, ":"),
            Semicolon => write!(f, ";"),
            Dot => write!(f, "."),
            Eol => write!(f, "end of line"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Word {
    As,
    Call,
    Case,
    Const,
    Data,
    Defdbl,
    Defint,
    Deflng,
    Defsng,
    Defstr,
    Dim,
    Do,
    Double,
    Else,
    Elseif,
    End,
    Exit,
    For,
    Function,
    Gosub,
    Goto,
    If,
    Input,
    Integer,
    Is,
    Let,
    Line,
    Long,
    Loop,
    Next,
    Print,
    Read,
    Rem,
    Restore,
    Return,
    Select,
    Shared,
    Single,
    Static,
    Step,
    String,
    Sub,
    Swap,
    Then,
    To,
    Type,
    Until,
    Using,
    Wend,
    While,
}

impl std::fmt::Display for Word {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Word::*;
        let s = match self {
            As => "AS",
            Call => "CALL",
            Case => "CASE",
            Const => "CONST",
            Data => "DATA",
            Defdbl => "DEFDBL",
            Defint => "DEFINT",
            Deflng => "DEFLNG",
            Defsng => "DEFSNG",
            Defstr => "DEFSTR",
            Dim => "DIM",
            Do => "DO",
            Double => "DOUBLE",
            Else => "ELSE",
            Elseif => "ELSEIF",
            End => "END",
            Exit => "EXIT",
            For => "FOR",
            Function => "FUNCTION",
            Gosub => "GOSUB",
            Goto => "GOTO",
            If => "IF",
            Input => "INPUT",
            Integer => "INTEGER",
            Is => "IS",
            Let => "LET",
            Line => "LINE",
            Long => "LONG",
            Loop => "LOOP",
            Next => "NEXT",
            Print => "PRINT",
            Read => "READ",
            Rem => "REM",
            Restore => "RESTORE",
            Return => "RETURN",
            Select => "SELECT",
            Shared => "SHARED",
            Single => "SINGLE",
            Static => "STATIC",
            Step => "STEP",
            String => "STRING",
            Sub => "SUB",
            Swap => "SWAP",
            Then => "THEN",
            To => "TO",
            Type => "TYPE",
            Until => "UNTIL",
            Using => "USING",
            Wend => "WEND",
            While => "WHILE",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Operator {
    Caret,
    Multiply,
    Divide,
    DivideInt,
    Modulus,
    Plus,
    Minus,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Not,
    And,
    Or,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Operator::*;
        let s = match self {
            Caret => "^",
            Multiply => "*",
            Divide => "/",
            DivideInt => "\\",
            Modulus => "MOD",
            Plus => "+",
            Minus => "-",
            Equal => "=",
            NotEqual => "<>",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            Not => "NOT",
            And => "AND",
            Or => "OR",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Integer(String),
    Long(String),
    Single(String),
    Double(String),
    String(String),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        use Literal::*;
        match self {
            Integer(s) | Long(s) | Single(s) | Double(s) => write!(f, "{}", s),
            String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// An identifier, classified by its type-suffix character.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Ident {
    Plain(Rc<str>),
    String(Rc<str>),
    Integer(Rc<str>),
    Long(Rc<str>),
    Single(Rc<str>),
    Double(Rc<str>),
}

impl Ident {
    /// Full name including any suffix character.
    pub fn name(&self) -> &Rc<str> {
        use Ident::*;
        match self {
            Plain(s) | String(s) | Integer(s) | Long(s) | Single(s) | Double(s) => s,
        }
    }

    /// Name without the suffix character, for DEFtype first-letter rules.
    pub fn base_name(&self) -> &str {
        let name: &str = self.name();
        match self {
            Ident::Plain(_) => name,
            _ => &name[..name.len() - 1],
        }
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
