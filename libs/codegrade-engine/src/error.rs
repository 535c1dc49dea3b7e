use thiserror::Error;

/// Failures at the execution service boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// Service unreachable, non-success status, or a body we could not decode
    #[error("execution service unavailable: {0}")]
    Unavailable(String),

    #[error("language '{language}' is not supported by the execution service")]
    LanguageUnsupported { language: String },
}

impl ExecutionError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn unsupported(language: impl Into<String>) -> Self {
        Self::LanguageUnsupported {
            language: language.into(),
        }
    }
}

/// Errors raised to callers of the evaluator.
///
/// `evaluate` only ever returns the request-shape variants; execution-time
/// failures are folded into the submission result. `ExecutionUnavailable` is
/// only produced by single executions, which have no result to fold into.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("language '{language}' is not supported")]
    LanguageUnsupported { language: String },

    #[error("execution service unavailable: {0}")]
    ExecutionUnavailable(String),
}

impl From<ExecutionError> for EvaluationError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Unavailable(message) => EvaluationError::ExecutionUnavailable(message),
            ExecutionError::LanguageUnsupported { language } => {
                EvaluationError::LanguageUnsupported { language }
            }
        }
    }
}
