//! Engine errors and per-entry calculation failures.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zmanim_dsl::{DslError, ErrorKind};

use crate::linking::LinkError;

/// Errors that abort an engine operation as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("config load error: {0}")]
    ConfigLoad(String),
    #[error("invalid context: {0}")]
    InvalidContext(String),
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("invalid rounding mode '{0}'")]
    InvalidRounding(String),
    /// Formula preview failure (parse or evaluation).
    #[error(transparent)]
    Formula(#[from] DslError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Classification of a per-entry failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationErrorKind {
    Parse,
    UnknownSymbol,
    NoCrossing,
    BrokenLink,
    CircularDependency,
    InvalidContext,
    Evaluation,
}

impl fmt::Display for CalculationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::UnknownSymbol => "unknown_symbol",
            Self::NoCrossing => "no_crossing",
            Self::BrokenLink => "broken_link",
            Self::CircularDependency => "circular_dependency",
            Self::InvalidContext => "invalid_context",
            Self::Evaluation => "evaluation",
        };
        f.write_str(s)
    }
}

/// Failure of one entry inside a batch; carried as data, never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct CalculationError {
    pub kind: CalculationErrorKind,
    pub message: String,
}

impl CalculationError {
    pub fn new(kind: CalculationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<DslError> for CalculationError {
    fn from(e: DslError) -> Self {
        let kind = match e.kind() {
            ErrorKind::Parse => CalculationErrorKind::Parse,
            ErrorKind::UnknownSymbol => CalculationErrorKind::UnknownSymbol,
            ErrorKind::NoCrossing => CalculationErrorKind::NoCrossing,
            ErrorKind::CircularDependency => CalculationErrorKind::CircularDependency,
            ErrorKind::InvalidContext => CalculationErrorKind::InvalidContext,
            _ => CalculationErrorKind::Evaluation,
        };
        Self::new(kind, e.to_string())
    }
}

impl From<LinkError> for CalculationError {
    fn from(e: LinkError) -> Self {
        let kind = match e {
            LinkError::MissingFormula { .. } => CalculationErrorKind::Evaluation,
            _ => CalculationErrorKind::BrokenLink,
        };
        Self::new(kind, e.to_string())
    }
}
