use std::time::Duration;

use thiserror::Error;
use zmanim_engine::EngineError;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CollaboratorError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

/// Errors from service operations.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("config load error: {0}")]
    ConfigLoad(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<zmanim_dsl::DslError> for ServiceError {
    fn from(e: zmanim_dsl::DslError) -> Self {
        Self::Engine(EngineError::Formula(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_operation() {
        let e = ServiceError::Timeout {
            operation: "location_context",
            after: Duration::from_millis(250),
        };
        assert_eq!(e.to_string(), "location_context timed out after 250ms");
    }

    #[test]
    fn engine_errors_pass_through() {
        let e: ServiceError = EngineError::InvalidRange("too long".into()).into();
        assert_eq!(e.to_string(), "invalid range: too long");
        let e: ServiceError = zmanim_dsl::DslError::DivisionByZero.into();
        assert!(matches!(e, ServiceError::Engine(EngineError::Formula(_))));
    }
}
