use super::Loc;
use std::rc::Rc;

/// A located compile or runtime error.
///
/// Every failure in the compiler and the executor is one of these; the
/// display form is `file:line:col: MESSAGE; detail`.
#[derive(Clone)]
pub struct Error {
    code: u16,
    loc: Option<Loc>,
    file: Option<Rc<str>>,
    message: String,
}

#[doc(hidden)]
#[macro_export]
macro_rules! error {
    ($err:ident) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
    };
    ($err:ident, $loc:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).at($loc)
    };
    ($err:ident; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err).message($msg)
    };
    ($err:ident, $loc:expr; $msg:expr) => {
        $crate::lang::Error::new($crate::lang::ErrorCode::$err)
            .at($loc)
            .message($msg)
    };
}

impl Error {
    pub fn new(code: ErrorCode) -> Error {
        Error {
            code: code as u16,
            loc: None,
            file: None,
            message: String::new(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn loc(&self) -> Option<Loc> {
        self.loc
    }

    /// Attach a location; an already-located error keeps its position.
    pub fn at(mut self, loc: Loc) -> Error {
        if self.loc.is_none() {
            self.loc = Some(loc);
        }
        self
    }

    pub fn in_file(mut self, file: &Rc<str>) -> Error {
        if self.file.is_none() {
            self.file = Some(file.clone());
        }
        self
    }

    pub fn message<S: Into<String>>(mut self, message: S) -> Error {
        debug_assert!(self.message.is_empty());
        self.message = message.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NextWithoutFor = 1,
    SyntaxError = 2,
    ReturnWithoutGosub = 3,
    OutOfData = 4,
    IllegalFunctionCall = 5,
    Overflow = 6,
    OutOfMemory = 7,
    UndefinedLabel = 8,
    SubscriptOutOfRange = 9,
    DuplicateDefinition = 10,
    DivisionByZero = 11,
    TypeMismatch = 13,
    UndefinedProcedure = 18,
    ExitWithoutContext = 26,
    ExecutionError = 40,
    InternalError = 51,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error {{ {} }}", self)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let code_str = match self.code {
            1 => "NEXT WITHOUT FOR",
            2 => "SYNTAX ERROR",
            3 => "RETURN WITHOUT GOSUB",
            4 => "OUT OF DATA",
            5 => "ILLEGAL FUNCTION CALL",
            6 => "OVERFLOW",
            7 => "OUT OF MEMORY",
            8 => "UNDEFINED LABEL",
            9 => "SUBSCRIPT OUT OF RANGE",
            10 => "DUPLICATE DEFINITION",
            11 => "DIVISION BY ZERO",
            13 => "TYPE MISMATCH",
            18 => "UNDEFINED PROCEDURE",
            26 => "EXIT WITHOUT CONTEXT",
            40 => "EXECUTION ERROR",
            51 => "INTERNAL ERROR",
            _ => "",
        };
        if let Some(loc) = self.loc {
            match &self.file {
                Some(file) => write!(f, "{}:{}: ", file, loc)?,
                None => write!(f, "{}: ", loc)?,
            }
        } else if let Some(file) = &self.file {
            write!(f, "{}: ", file)?;
        }
        if code_str.is_empty() {
            write!(f, "PROGRAM ERROR {}", self.code)?;
        } else {
            write!(f, "{}", code_str)?;
        }
        if !self.message.is_empty() {
            write!(f, "; {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}
