// src/error.rs
//! Error taxonomy for the credential trust engine.
//!
//! Every failure surfaced by the registry, the ledger, the proof protocol, the
//! issuance pipeline or the verification exchange is a [`CredentialError`].
//! Each variant maps onto exactly one [`ErrorKind`], which is what callers and
//! the API layer branch on. Only [`ErrorKind::TransactionFailed`] is retryable.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse error classification exposed to callers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller lacks the required role or relationship to the entity
    Unauthorized,
    /// Referenced issuer, credential, job or request does not exist
    NotFound,
    /// Operation targets an entity that already reached a terminal state
    AlreadyInTerminalState,
    /// Zero/empty keys, malformed DIDs, invalid transitions
    InvalidInput,
    /// Ledger submission error, retried by the issuance pipeline
    TransactionFailed,
    /// A time-boxed window elapsed
    RequestExpired,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyInTerminalState => "already_in_terminal_state",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::TransactionFailed => "transaction_failed",
            ErrorKind::RequestExpired => "request_expired",
        };
        f.write_str(name)
    }
}

/// Domain error returned by every core operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Caller is not allowed to perform the operation
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An issuer with the same controller key or DID already exists
    #[error("duplicate issuer: {field} '{value}' is already registered")]
    DuplicateIssuer { field: &'static str, value: String },

    /// Issuer id is unknown to the trust registry
    #[error("issuer '{0}' is not registered")]
    NotRegistered(String),

    /// Issuer was verified before
    #[error("issuer '{0}' is already verified")]
    AlreadyVerified(String),

    /// Issuer is not currently verified
    #[error("issuer '{0}' is not verified")]
    NotVerified(String),

    /// Generic lookup miss
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Revocation of a credential that is already revoked
    #[error("credential '{0}' is already revoked")]
    AlreadyRevoked(String),

    /// Entity already resolved; the stored outcome is final
    #[error("{entity} '{id}' is already {state}")]
    AlreadyInTerminalState {
        entity: &'static str,
        id: String,
        state: String,
    },

    /// Lifecycle edge that the state machine does not allow
    #[error("invalid transition for '{id}': {from} -> {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// Holder key is empty or the zero address
    #[error("invalid holder key")]
    InvalidHolder,

    /// DID does not follow `did:<method>:<method-specific-id>`
    #[error("malformed DID '{0}'")]
    InvalidDid(String),

    /// Any other rejected input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Ledger submission or confirmation failed
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// Time-boxed window elapsed before the operation
    #[error("'{0}' has expired")]
    RequestExpired(String),
}

impl CredentialError {
    /// Shorthand for a [`CredentialError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CredentialError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Classifies the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CredentialError::Unauthorized(_) => ErrorKind::Unauthorized,
            CredentialError::NotRegistered(_) | CredentialError::NotFound { .. } => {
                ErrorKind::NotFound
            }
            CredentialError::AlreadyVerified(_)
            | CredentialError::AlreadyRevoked(_)
            | CredentialError::AlreadyInTerminalState { .. } => ErrorKind::AlreadyInTerminalState,
            CredentialError::DuplicateIssuer { .. }
            | CredentialError::NotVerified(_)
            | CredentialError::InvalidTransition { .. }
            | CredentialError::InvalidHolder
            | CredentialError::InvalidDid(_)
            | CredentialError::InvalidInput(_) => ErrorKind::InvalidInput,
            CredentialError::TransactionFailed(_) => ErrorKind::TransactionFailed,
            CredentialError::RequestExpired(_) => ErrorKind::RequestExpired,
        }
    }

    /// Only ledger submission failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransactionFailed
    }

    /// Structured form handed to callers.
    pub fn report(&self) -> ErrorReport {
        ErrorReport::from(self)
    }
}

/// Caller-visible failure: a kind plus a human readable message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CredentialError> for ErrorReport {
    fn from(err: &CredentialError) -> Self {
        ErrorReport {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result alias used across the crate.
pub type CredentialResult<T> = Result<T, CredentialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_errors_map_to_taxonomy() {
        let dup = CredentialError::DuplicateIssuer {
            field: "did",
            value: "did:web:a".into(),
        };
        assert_eq!(dup.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            CredentialError::NotRegistered("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CredentialError::AlreadyVerified("x".into()).kind(),
            ErrorKind::AlreadyInTerminalState
        );
        assert_eq!(
            CredentialError::AlreadyRevoked("x".into()).kind(),
            ErrorKind::AlreadyInTerminalState
        );
    }

    #[test]
    fn test_only_transaction_failures_retry() {
        assert!(CredentialError::TransactionFailed("nonce too low".into()).is_retryable());
        assert!(!CredentialError::Unauthorized("nope".into()).is_retryable());
        assert!(!CredentialError::InvalidHolder.is_retryable());
        assert!(!CredentialError::RequestExpired("req".into()).is_retryable());
    }

    #[test]
    fn test_report_serializes_kind_and_message() {
        let report = CredentialError::not_found("credential", "abc").report();
        assert_eq!(report.kind, ErrorKind::NotFound);
        assert_eq!(report.message, "credential 'abc' not found");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "not_found");
    }
}
