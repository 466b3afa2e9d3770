use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anthropic::AnthropicError;
use crate::content::WorkStatus;

/// Convenience alias used throughout the library.
pub type Result<T, E = PressError> = std::result::Result<T, E>;

/// Governs whether a failure is retried and how a work item is rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network errors, timeouts, rate limiting, 5xx. Retried by the retry policy.
    Transient,
    /// Bad credentials, malformed configuration, unresolved plugin. Never retried.
    Fatal,
    /// Content that failed validation, or nothing to ground it in. Never retried.
    Logic,
}

impl ErrorKind {
    /// Maps an HTTP status code onto a kind.
    ///
    /// 408 and 429 are transient even though they sit in the 4xx range.
    pub fn from_status(status: u16) -> Self {
        match status {
            408 | 429 => ErrorKind::Transient,
            400..=499 => ErrorKind::Fatal,
            _ => ErrorKind::Transient,
        }
    }

    pub fn is_retryable(self) -> bool {
        self == ErrorKind::Transient
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "Transient"),
            ErrorKind::Fatal => write!(f, "Fatal"),
            ErrorKind::Logic => write!(f, "Logic"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PressError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A collaborator failure that already knows its own kind.
    #[error("{service} failed ({kind}): {message}")]
    Service {
        service: String,
        kind: ErrorKind,
        message: String,
    },

    /// HTTP response with a non-success status from a collaborator we call directly.
    #[error("{service} returned status {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    #[error("Model response could not be parsed: {0}")]
    MalformedResponse(String),

    #[error("Adapter not found for platform '{0}'")]
    AdapterNotFound(String),

    #[error("Authentication failed for platform '{platform}': {message}")]
    Authentication { platform: String, message: String },

    #[error("Content failed validation: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("No grounding material available for '{0}'")]
    NoGrounding(String),

    #[error("Publish to '{platform}' was rejected: {message}")]
    PublishRejected { platform: String, message: String },

    #[error("{context} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        context: String,
        attempts: u32,
        #[source]
        source: Box<PressError>,
    },

    #[error("Invalid transition for work item: {from} cannot become {to}")]
    InvalidTransition {
        from: WorkStatus,
        to: WorkStatus,
    },

    #[error("Run cancelled")]
    Cancelled,
}

impl PressError {
    /// Total classification over the error representation.
    ///
    /// Inferred from variant identity and structured status codes only.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PressError::Anthropic(e) => e.kind(),
            PressError::Http(e) => e
                .status()
                .map(|s| ErrorKind::from_status(s.as_u16()))
                .unwrap_or(ErrorKind::Transient),
            PressError::Io(_) => ErrorKind::Transient,
            PressError::Service { kind, .. } => *kind,
            PressError::Status { status, .. } => ErrorKind::from_status(*status),
            PressError::Timeout { .. } => ErrorKind::Transient,
            PressError::MalformedResponse(_) => ErrorKind::Transient,
            PressError::PublishRejected { .. } => ErrorKind::Transient,
            PressError::Cancelled => ErrorKind::Transient,
            PressError::Config(_)
            | PressError::Json(_)
            | PressError::Toml(_)
            | PressError::AdapterNotFound(_)
            | PressError::Authentication { .. }
            | PressError::InvalidTransition { .. } => ErrorKind::Fatal,
            PressError::Validation(_) | PressError::NoGrounding(_) => ErrorKind::Logic,
            PressError::RetriesExhausted { source, .. } => source.kind(),
        }
    }

    pub fn service(service: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        PressError::Service {
            service: service.into(),
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Fatal);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Fatal);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::Fatal);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(408), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::Transient);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Transient);
    }

    #[test]
    fn variant_classification() {
        assert_eq!(
            PressError::AdapterNotFound("x".into()).kind(),
            ErrorKind::Fatal
        );
        assert_eq!(
            PressError::Validation(vec!["no tags".into()]).kind(),
            ErrorKind::Logic
        );
        assert_eq!(PressError::NoGrounding("t".into()).kind(), ErrorKind::Logic);
        assert_eq!(
            PressError::Timeout {
                operation: "search".into(),
                after: Duration::from_secs(30)
            }
            .kind(),
            ErrorKind::Transient
        );
    }

    #[test]
    fn exhausted_reports_cause_kind() {
        let err = PressError::RetriesExhausted {
            context: "publish".into(),
            attempts: 4,
            source: Box::new(PressError::Status {
                service: "webhook".into(),
                status: 502,
                message: "bad gateway".into(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.to_string().contains("after 4 attempts"));
    }

    #[test]
    fn classification_is_stable_for_the_same_error() {
        let err = PressError::service("search", ErrorKind::Fatal, "quota revoked");
        let first = err.kind();
        for _ in 0..10 {
            assert_eq!(err.kind(), first);
        }
    }

    #[test]
    fn validation_display_joins_problems() {
        let err = PressError::Validation(vec!["title is empty".into(), "no tags".into()]);
        assert_eq!(
            err.to_string(),
            "Content failed validation: title is empty; no tags"
        );
    }

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::Transient.to_string(), "Transient");
        assert_eq!(ErrorKind::Fatal.to_string(), "Fatal");
        assert_eq!(ErrorKind::Logic.to_string(), "Logic");
    }
}
