//! Error types for civic-board
//!
//! Every failure carries a caller-facing message and a classification
//! ([`ErrorKind`]) that selects the HTTP status, so a client can tell
//! "fix your input" apart from "not found" and "not allowed".

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure classification exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Main error type for civic-board
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing input
    #[error("{0}")]
    Validation(String),

    /// Coordinates missing, out of range, or place name not resolvable
    #[error("{0}")]
    InvalidLocation(String),

    /// Poll choice outside confirm/deny/unsure
    #[error("{0}")]
    InvalidChoice(String),

    /// Unknown incident or user
    #[error("{0} not found")]
    NotFound(String),

    /// One response per user per incident
    #[error("You have already responded to incident {incident_id}")]
    AlreadyVoted { incident_id: String },

    /// No principal supplied or token rejected
    #[error("{0}")]
    Unauthorized(String),

    /// Principal lacks the required role
    #[error("{0}")]
    Forbidden(String),

    /// Infrastructure failure from civic-common
    #[error(transparent)]
    Common(#[from] civic_common::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::InvalidLocation(_) | Error::InvalidChoice(_) => {
                ErrorKind::Validation
            }
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyVoted { .. } => ErrorKind::Conflict,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Common(_) => ErrorKind::Internal,
        }
    }

    pub fn incident_not_found(id: &str) -> Self {
        Error::NotFound(format!("Incident {}", id))
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation(rejection.body_text())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": kind.code(),
                "message": self.to_string(),
            }
        }));

        (kind.status(), body).into_response()
    }
}

/// Convenience Result type using civic-board Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_selects_status() {
        assert_eq!(
            Error::InvalidLocation("x".into()).kind().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvalidChoice("x".into()).kind().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::incident_not_found("inc_1").kind().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::AlreadyVoted { incident_id: "inc_1".into() }.kind().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Unauthorized("x".into()).kind().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(Error::Forbidden("x".into()).kind().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_common_errors_map_to_kinds() {
        let io = Error::from(civic_common::Error::Io(std::io::Error::other("disk")));
        assert_eq!(io.kind(), ErrorKind::Internal);

        let config = Error::from(civic_common::Error::Config("bad port".into()));
        assert_eq!(config.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_messages_are_caller_facing() {
        assert_eq!(Error::incident_not_found("inc_9").to_string(), "Incident inc_9 not found");
        assert!(Error::AlreadyVoted { incident_id: "inc_9".into() }
            .to_string()
            .contains("already responded"));
    }
}
