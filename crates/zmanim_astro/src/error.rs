//! Error types for astronomical primitives.

use thiserror::Error;

/// Errors from solar computations.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AstroError {
    /// Invalid geographic location parameter.
    #[error("invalid location: {0}")]
    InvalidLocation(&'static str),
    /// Calendar date outside the supported range.
    #[error("invalid date: {0}")]
    InvalidDate(String),
    /// Proportional interval whose end precedes its start.
    #[error("invalid interval: {0}")]
    InvalidInterval(&'static str),
    /// Offset that leaves the representable time range.
    #[error("out of range: {0}")]
    OutOfRange(String),
}
