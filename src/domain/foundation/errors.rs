//! Shared error vocabulary for stores and value parsing.

use thiserror::Error;

/// Raised when a raw value cannot become a domain value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// What went wrong at a store boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotFound,
    UserNotFound,
    EventNotFound,
    DatabaseError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
            ErrorCode::EventNotFound => "EVENT_NOT_FOUND",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by repository ports.
///
/// Handlers never branch on the message; callers that care use `code`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct DomainError {
    pub code: ErrorCode,
    pub message: String,
}

impl DomainError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_format_names_field_and_reason() {
        let err = ValidationError::invalid_format("plan", "unknown plan 'gold'");
        assert_eq!(
            err.to_string(),
            "Field 'plan' has invalid format: unknown plan 'gold'"
        );
    }

    #[test]
    fn domain_error_display_prefixes_code() {
        let err = DomainError::new(ErrorCode::EventNotFound, "evt_1 missing from log");
        assert_eq!(err.to_string(), "[EVENT_NOT_FOUND] evt_1 missing from log");
    }

    #[test]
    fn database_constructor_sets_code() {
        let err = DomainError::database("insert into billing_ledger failed");
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert_eq!(
            err.to_string(),
            "[DATABASE_ERROR] insert into billing_ledger failed"
        );
    }
}
