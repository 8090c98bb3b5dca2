use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::credentials::TokenUnavailable;
use crate::sync::ErrorKind;

/// Errors from the remote inventory client.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credential missing, invalid or expired.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// The user or organization does not exist (or is invisible to us).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Quota exhausted and the wait-and-retry budget is spent.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Network failure or 5xx. Retried with backoff before surfacing.
    #[error("Transient remote error: {message}")]
    Transient { message: String },

    /// Any other 4xx. Never retried.
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("Unexpected response: {message}")]
    Parse { message: String },

    #[error(transparent)]
    Credential(#[from] TokenUnavailable),
}

impl RemoteError {
    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    #[inline]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Network failures and 5xx responses.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Map onto the batch failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } | Self::Credential(_) => ErrorKind::RemoteAuthError,
            Self::NotFound { .. } => ErrorKind::RemoteNotFoundError,
            Self::RateLimited { .. } => ErrorKind::RemoteRateLimitedError,
            Self::Transient { .. } | Self::Rejected { .. } | Self::Parse { .. } => {
                ErrorKind::RemoteTransientError
            }
        }
    }
}

/// First line of an error message, for progress events and log lines.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        assert!(RemoteError::transient("502").is_transient());
        assert!(!RemoteError::transient("502").is_rate_limited());
        let limited = RemoteError::RateLimited {
            reset_at: Utc::now(),
        };
        assert!(limited.is_rate_limited());
        assert!(!limited.is_transient());
        assert!(
            !RemoteError::Rejected {
                status: 422,
                message: "bad".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn kinds_map_to_taxonomy() {
        assert_eq!(RemoteError::auth("x").kind(), ErrorKind::RemoteAuthError);
        assert_eq!(RemoteError::not_found("acme").kind(), ErrorKind::RemoteNotFoundError);
        assert_eq!(
            RemoteError::from(TokenUnavailable::new("keyring locked")).kind(),
            ErrorKind::RemoteAuthError
        );
    }

    #[test]
    fn short_message_takes_first_line() {
        let err = RemoteError::transient("connection reset\nbacktrace follows");
        assert_eq!(
            short_error_message(&err),
            "Transient remote error: connection reset"
        );
    }
}
