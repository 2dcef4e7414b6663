//! Error types for the tutoring pipeline.
//!
//! Every failure the orchestrator can surface is one of these variants.
//! The HTTP layer maps them onto status codes via [`TutorError::status_code`].

use axum::http::StatusCode;
use std::fmt;

/// Result alias used across the pipeline.
pub type Result<T> = std::result::Result<T, TutorError>;

/// The pipeline stage an upstream failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Analyser,
    Teacher,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Analyser => write!(f, "analyser"),
            Stage::Teacher => write!(f, "teacher"),
        }
    }
}

/// Errors raised while handling a tutoring request.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// A referenced session or message does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The analyser output did not satisfy the analysis contract.
    #[error("analysis failed schema validation: {0}")]
    SchemaValidation(String),

    /// An LLM call failed (connection, timeout, non-2xx status, bad body).
    #[error("{stage} stage upstream error: {message}")]
    Upstream { stage: Stage, message: String },

    /// The teacher stream broke after delivery had started.
    #[error("teacher stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The session store failed for a reason other than a missing row.
    #[error("session store error: {0}")]
    Store(String),
}

impl TutorError {
    pub fn session_not_found(id: impl Into<String>) -> Self {
        TutorError::NotFound {
            entity: "session",
            id: id.into(),
        }
    }

    pub fn message_not_found(id: i64) -> Self {
        TutorError::NotFound {
            entity: "message",
            id: id.to_string(),
        }
    }

    pub fn upstream(stage: Stage, message: impl Into<String>) -> Self {
        TutorError::Upstream {
            stage,
            message: message.into(),
        }
    }

    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            TutorError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for TutorError {
    fn from(e: rusqlite::Error) -> Self {
        TutorError::Store(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            TutorError::session_not_found("abc").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            TutorError::SchemaValidation("bad".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            TutorError::upstream(Stage::Teacher, "timeout").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_message_names_stage() {
        let err = TutorError::upstream(Stage::Analyser, "connection refused");
        assert_eq!(
            err.to_string(),
            "analyser stage upstream error: connection refused"
        );
        assert_eq!(
            TutorError::session_not_found("does-not-exist").to_string(),
            "session not found: does-not-exist"
        );
    }
}
