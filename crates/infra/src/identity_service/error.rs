//! Public error taxonomy of the identity lifecycle flows.
//!
//! Internal causes are logged where they are mapped and replaced by a short
//! public message; they never travel inside a [`ServiceError`].

use thiserror::Error;

use passport_auth::{CredentialError, TokenError};
use passport_core::DomainError;

use crate::store::{RepositoryError, TransactionError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The identity does not exist or is soft-deleted.
    #[error("identity not found")]
    NotFound,

    #[error("username is already taken")]
    DuplicateUsername,

    /// Credential mismatch, token mismatch, or an expired token.
    #[error("unauthorized")]
    Unauthorized,

    /// Bad input, or a persistence failure not otherwise classified.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Programming or integrity error. Not retryable.
    #[error("internal error: {0}")]
    Fatal(String),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ServiceError::Validation(msg)
            }
            DomainError::Conflict(_) => {
                ServiceError::Validation("identity was modified concurrently".to_string())
            }
        }
    }
}

impl From<TransactionError> for ServiceError {
    fn from(value: TransactionError) -> Self {
        match value {
            TransactionError::Nested => {
                tracing::error!("nested transaction attempted");
                ServiceError::Fatal("nested transaction".to_string())
            }
            TransactionError::Conflict(cause) => {
                tracing::warn!(%cause, "commit conflict");
                ServiceError::Validation("identity was modified concurrently".to_string())
            }
            TransactionError::Store(cause) => {
                tracing::error!(%cause, "commit failed");
                ServiceError::Validation("changes could not be saved".to_string())
            }
            TransactionError::TimedOut => {
                tracing::error!("commit timed out");
                ServiceError::Validation("changes could not be saved".to_string())
            }
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(value: RepositoryError) -> Self {
        tracing::error!(cause = %value, "identity lookup failed");
        ServiceError::Validation("identity store unavailable".to_string())
    }
}

impl From<CredentialError> for ServiceError {
    fn from(value: CredentialError) -> Self {
        tracing::error!(cause = %value, "credential processing failed");
        ServiceError::Fatal("credential processing failed".to_string())
    }
}

impl From<TokenError> for ServiceError {
    fn from(value: TokenError) -> Self {
        match value {
            TokenError::InvalidToken | TokenError::Expired => ServiceError::Unauthorized,
            TokenError::Signing(cause) => {
                tracing::error!(%cause, "token signing failed");
                ServiceError::Fatal("token issuance failed".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_transaction_is_fatal() {
        assert!(matches!(
            ServiceError::from(TransactionError::Nested),
            ServiceError::Fatal(_)
        ));
    }

    #[test]
    fn store_causes_are_not_leaked() {
        let err = ServiceError::from(TransactionError::Store("pg: relation missing".to_string()));
        assert_eq!(
            err,
            ServiceError::Validation("changes could not be saved".to_string())
        );

        let err = ServiceError::from(RepositoryError::Unavailable("socket closed".to_string()));
        assert!(!err.to_string().contains("socket"));
    }

    #[test]
    fn timeouts_and_conflicts_are_validation_failures() {
        assert!(matches!(
            ServiceError::from(TransactionError::TimedOut),
            ServiceError::Validation(_)
        ));
        assert!(matches!(
            ServiceError::from(TransactionError::Conflict("v2 != v3".to_string())),
            ServiceError::Validation(_)
        ));
    }

    #[test]
    fn corrupt_hash_is_fatal() {
        let err = ServiceError::from(CredentialError::CorruptRecord("bad phc".to_string()));
        assert_eq!(err, ServiceError::Fatal("credential processing failed".to_string()));
    }

    #[test]
    fn token_rejections_are_unauthorized() {
        assert_eq!(ServiceError::from(TokenError::Expired), ServiceError::Unauthorized);
        assert_eq!(ServiceError::from(TokenError::InvalidToken), ServiceError::Unauthorized);
    }
}
