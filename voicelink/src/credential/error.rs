/// Credential error types

use thiserror::Error;

/// Failures while obtaining a credential
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The token request could not be sent or completed
    #[error("Credential request failed: {0}")]
    RequestFailed(String),

    /// The issuer answered with a non-success status
    #[error("Credential issuer rejected the request (status {0})")]
    IssuerRejected(u16),

    /// The issuer's response could not be decoded
    #[error("Malformed credential response: {0}")]
    MalformedResponse(String),
}

/// Result type for credential operations
pub type CredentialResult<T> = Result<T, CredentialError>;
