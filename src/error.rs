use std::fmt;
use thiserror::Error;

/// A line/column location inside a template source, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Lex Error: {message} (template '{template}', {pos})")]
    Lex {
        template: String,
        pos: Position,
        message: String,
    },
    #[error("Parse Error: {message} (template '{template}', {pos})")]
    Parse {
        template: String,
        pos: Position,
        message: String,
    },
    #[error("Eval Error: {message} ({pos})")]
    Eval { pos: Position, message: String },
    #[error("Invalid Call: {name}: {reason}")]
    InvalidCall { name: String, reason: String },
    #[error("Template Not Found: {0}")]
    TemplateNotFound(String),
    #[error("Loader Error: {0}")]
    Loader(String),
    #[error("Undefined: '{name}' is undefined ({pos})")]
    Undefined { name: String, pos: Position },
    #[error("Type Mismatch: {0}")]
    TypeMismatch(String),
    #[error("Serialization Error: {0}")]
    Serialization(String),
    #[error("Write Error: output sink rejected the rendered text")]
    Write,
}

impl Error {
    pub fn eval(pos: Position, message: impl Into<String>) -> Self {
        Error::Eval {
            pos,
            message: message.into(),
        }
    }

    pub fn invalid_call(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidCall {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// True for failures that mean "the requested template does not exist",
    /// the only kind an `ignore missing` include swallows.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::TemplateNotFound(_))
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::Write
    }
}

impl serde::ser::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::Serialization(msg.to_string())
    }
}
