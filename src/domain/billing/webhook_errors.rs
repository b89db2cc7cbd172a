//! Failures of webhook ingress and event processing.
//!
//! The HTTP status returned to Stripe decides whether it redelivers, so each
//! variant maps to one status. The queue worker uses [`WebhookError::is_retryable`]
//! to decide whether another attempt is worth it.

use axum::http::StatusCode;
use thiserror::Error;

use crate::domain::foundation::DomainError;

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    /// No `v1` signature in the header matched the payload.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp too far in the future.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// `data.object` does not have the shape its event type implies.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Provider error: {0}")]
    Provider(String),

    /// Job queue closed or at capacity.
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl WebhookError {
    /// Transient failures: store, provider or queue trouble.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_) | WebhookError::Provider(_) | WebhookError::QueueUnavailable(_)
        )
    }

    /// 4xx tells Stripe to stop, 5xx asks it to redeliver.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::InvalidTimestamp
            | WebhookError::ParseError(_)
            | WebhookError::MissingField(_)
            | WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Database(_) | WebhookError::Provider(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            WebhookError::QueueUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<DomainError> for WebhookError {
    fn from(err: DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;

    // ══════════════════════════════════════════════════════════════
    // Conversion Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn missing_field_names_the_field() {
        let err = WebhookError::MissingField("subscription");
        assert_eq!(err.to_string(), "Missing field: subscription");
    }

    #[test]
    fn store_failure_is_retryable_database_error() {
        let err: WebhookError = DomainError::new(ErrorCode::DatabaseError, "pool timed out").into();
        assert!(matches!(err, WebhookError::Database(_)));
        assert!(err.is_retryable());
    }

    // ══════════════════════════════════════════════════════════════
    // Status Mapping Tests
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn auth_failures_are_unauthorized() {
        assert_eq!(
            WebhookError::InvalidSignature.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            WebhookError::TimestampOutOfRange.status_code(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn malformed_payloads_are_not_retried() {
        let err = WebhookError::ParseError("bad json".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_retryable());
    }

    #[test]
    fn queue_unavailable_asks_for_redelivery() {
        let err = WebhookError::QueueUnavailable("closed".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.is_retryable());
    }
}
