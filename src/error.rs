//! Error taxonomy shared by every pipeline stage.

use std::time::Duration;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by ingestion, retrieval, generation and delivery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input or configuration, rejected at the call site.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Server-side or connection failure that may succeed on retry.
    #[error("{service} transient failure{}: {message}", fmt_status(.status))]
    TransientExternal {
        /// Collaborator that failed (e.g. `openai`, `webhook:ops-slack`).
        service: String,
        /// HTTP status when the failure carried one.
        status: Option<u16>,
        /// Response body or transport error text.
        message: String,
    },

    /// Client-side rejection (4xx) that must not be retried.
    #[error("{service} rejected request ({status}): {message}")]
    PermanentExternal {
        /// Collaborator that rejected the request.
        service: String,
        /// HTTP status code.
        status: u16,
        /// Response body text.
        message: String,
    },

    /// A bounded wait elapsed before the collaborator answered.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that was waiting.
        operation: &'static str,
        /// Configured bound.
        after: Duration,
    },

    /// Vector store failure.
    #[error("vector store error: {0}")]
    Store(String),

    /// Enrichment collaborator failure.
    #[error("enrichment failed: {0}")]
    Enrichment(String),

    /// Document source failure.
    #[error("document source error: {0}")]
    DocumentSource(String),

    /// Local I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Postgres failure from the pgvector-backed store.
    #[cfg(feature = "pgvector")]
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({code})")).unwrap_or_default()
}

impl Error {
    /// Classifies a non-success HTTP status: 5xx and 429 are transient, everything else permanent.
    pub fn from_status(service: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        let service = service.into();
        let message = body.into();
        if status >= 500 || status == 429 {
            Self::TransientExternal {
                service,
                status: Some(status),
                message,
            }
        } else {
            Self::PermanentExternal {
                service,
                status,
                message,
            }
        }
    }

    /// Wraps a transport-level `reqwest` failure. A response status, when
    /// present, is classified like [`Error::from_status`].
    pub fn from_transport(service: impl Into<String>, err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(service, status.as_u16(), err.to_string()),
            None => Self::TransientExternal {
                service: service.into(),
                status: None,
                message: err.to_string(),
            },
        }
    }

    /// Shorthand for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the failure may succeed if the same request is repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientExternal { .. })
    }

    /// HTTP status attached to an external failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::TransientExternal { status, .. } => *status,
            Self::PermanentExternal { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = Error::from_status("webhook", 503, "unavailable");
        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(503));
        assert_eq!(
            err.to_string(),
            "webhook transient failure (503): unavailable"
        );
    }

    #[test]
    fn rate_limits_are_retryable() {
        assert!(Error::from_status("openai", 429, "slow down").is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = Error::from_status("webhook", 404, "missing");
        assert!(!err.is_retryable());
        assert!(matches!(err, Error::PermanentExternal { status: 404, .. }));
    }
}
