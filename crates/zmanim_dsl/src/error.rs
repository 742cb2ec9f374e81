//! Error types for the formula language.

use std::fmt;

use thiserror::Error;
use zmanim_astro::AstroError;

/// Errors from lexing, parsing, validating or evaluating a formula.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum DslError {
    /// Malformed formula text, with a 1-based source position.
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },
    /// An identifier that names nothing in the language.
    #[error("unknown symbol '{0}'")]
    UnknownSymbol(String),
    /// A reference to a key that has no value in the current run.
    #[error("undefined reference '@{0}'")]
    UndefinedReference(String),
    /// A required solar crossing does not happen on this date at this location.
    #[error("no crossing: {0}")]
    NoCrossing(String),
    /// Formulas that reference each other in a loop.
    #[error("circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),
    /// Operands of incompatible kinds.
    #[error("type error: {0}")]
    Type(String),
    /// Argument outside its accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("division by zero")]
    DivisionByZero,
    /// Duration or instant arithmetic outside the representable range.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),
    /// A conditional without `else` whose condition was false.
    #[error("condition is false and no else branch is given")]
    MissingElse,
    /// A date literal that does not exist in the evaluation year.
    #[error("invalid date: {0}")]
    InvalidDate(String),
    /// Every alternative of `first_valid` failed.
    #[error("first_valid: all arguments failed")]
    AllFailed,
    /// Evaluation context rejected (bad location, out-of-range date).
    #[error("invalid context: {0}")]
    InvalidContext(String),
}

/// Coarse classification of a [`DslError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    UnknownSymbol,
    NoCrossing,
    CircularDependency,
    Evaluation,
    InvalidContext,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::UnknownSymbol => "unknown_symbol",
            Self::NoCrossing => "no_crossing",
            Self::CircularDependency => "circular_dependency",
            Self::Evaluation => "evaluation",
            Self::InvalidContext => "invalid_context",
        };
        f.write_str(s)
    }
}

impl DslError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::UnknownSymbol(_) | Self::UndefinedReference(_) => ErrorKind::UnknownSymbol,
            Self::NoCrossing(_) => ErrorKind::NoCrossing,
            Self::CircularDependency(_) => ErrorKind::CircularDependency,
            Self::InvalidContext(_) => ErrorKind::InvalidContext,
            _ => ErrorKind::Evaluation,
        }
    }

    pub(crate) fn parse(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::Parse {
            message: message.into(),
            line,
            column,
        }
    }
}

impl From<AstroError> for DslError {
    fn from(e: AstroError) -> Self {
        match e {
            AstroError::InvalidLocation(msg) => Self::InvalidContext(msg.to_string()),
            AstroError::InvalidDate(msg) => Self::InvalidDate(msg),
            AstroError::OutOfRange(msg) => Self::Overflow(msg),
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}
