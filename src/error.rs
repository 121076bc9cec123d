use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures of the field encryption layer.
///
/// A wrong master password and a tampered ciphertext both surface as
/// [`CipherError::DecryptionFailed`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),
    #[error("invalid password or corrupted data")]
    DecryptionFailed,
    #[error("salt must be 16 bytes, got {0}")]
    InvalidSaltLength(usize),
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("OS random generator unavailable")]
    RandomUnavailable,
}

/// Failures of a single one-time code check.
///
/// A malformed stored secret is reported as `VerificationFailed` so the
/// caller cannot tell it apart from a wrong code.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum TotpError {
    #[error("code must be exactly 6 digits")]
    InvalidCodeFormat,
    #[error("code did not verify")]
    VerificationFailed,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("item '{id}' is unreadable")]
    Unreadable {
        id: String,
        #[source]
        source: CipherError,
    },
    #[error("item '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("item '{0}' already exists")]
    RecordAlreadyExists(String),
    #[error("item '{0}' not found")]
    RecordNotFound(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TwoFactorError {
    #[error("two-factor setup has not been started")]
    NoPendingSetup,
    #[error("two-factor authentication is not enabled")]
    NotEnabled,
    #[error("two-factor code rejected")]
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("too many failed attempts; locked until {until}")]
    Locked { until: DateTime<Utc> },
}

/// Outcome of a login that did not produce a session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("invalid master password")]
    InvalidPassword,
    #[error("two-factor code required")]
    CodeRequired,
    #[error("invalid two-factor code")]
    Rejected,
    #[error(transparent)]
    Throttled(#[from] ThrottleError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session expired; unlock the vault again")]
    Expired,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_keeps_cipher_error_as_source() {
        use std::error::Error;

        let err = RecordError::Unreadable {
            id: "abc".into(),
            source: CipherError::DecryptionFailed,
        };
        assert_eq!(err.to_string(), "item 'abc' is unreadable");
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "invalid password or corrupted data");
    }

    #[test]
    fn store_errors_name_the_item() {
        assert_eq!(
            StoreError::RecordNotFound("x1".into()).to_string(),
            "item 'x1' not found"
        );
    }
}
