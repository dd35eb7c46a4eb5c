//! Boundary error taxonomy.
//!
//! Every user-visible failure carries a machine-readable [`ErrorCode`] and
//! maps to an HTTP class. Errors are values — only programming defects abort
//! a request. Internal detail stays in logs; callers see
//! `{code, message, request_id}` via [`ErrorBody`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error code, shared across the whole engine surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    Timeout,
    Internal,
}

impl ErrorCode {
    /// Canonical wire label, e.g. `VALIDATION_ERROR`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// HTTP status this code maps to at the API boundary.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorCode::ValidationError => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::Conflict => 409,
            ErrorCode::RateLimited => 429,
            ErrorCode::Timeout => 504,
            ErrorCode::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The response body rendered for any user-visible failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl ErrorBody {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: request_id.into(),
        }
    }
}

/// One field-level issue from definition or input validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON-path-ish location, e.g. `rules[2].then.action`.
    pub path: String,
    pub message: String,
    /// Short issue code, e.g. `unknown_action`.
    pub code: String,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Trait implemented by subsystem errors that surface at the API boundary.
pub trait BoundaryError {
    /// The machine-readable code this error maps to.
    fn code(&self) -> ErrorCode;

    /// Render the caller-facing body. Internal detail must not leak here.
    fn to_body(&self, request_id: &str) -> ErrorBody
    where
        Self: fmt::Display,
    {
        let message = match self.code() {
            // Never leak internals on unexpected failures.
            ErrorCode::Internal => "internal error".to_string(),
            _ => self.to_string(),
        };
        ErrorBody::new(self.code(), message, request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_screaming_snake() {
        assert_eq!(ErrorCode::ValidationError.as_str(), "VALIDATION_ERROR");
        assert_eq!(
            serde_json::to_string(&ErrorCode::RateLimited).unwrap(),
            r#""RATE_LIMITED""#
        );
    }

    #[test]
    fn http_classes() {
        assert_eq!(ErrorCode::ValidationError.http_status(), 400);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ErrorCode::Timeout.http_status(), 504);
    }
}
