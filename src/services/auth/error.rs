//! Error kinds produced while verifying a bearer token.
//!
//! None of these leave the auth boundary: the authorizer turns every one of them into a
//! Deny decision and only logs `kind()`.
use thiserror::Error;

/// Key set could not be obtained from the issuer.
#[derive(Debug, Clone, Error)]
pub enum KeyFetchError {
    #[error("key set transport error: {0}")]
    Transport(String),
    #[error("key set endpoint returned status {0}")]
    Status(u16),
    #[error("malformed key set: {0}")]
    Malformed(String),
    #[error("key set fetch timed out")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimError {
    #[error("audience mismatch")]
    Audience,
    #[error("issuer mismatch")]
    Issuer,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("missing or empty subject")]
    Subject,
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),
    #[error("no signing key for kid {kid:?}")]
    UnknownKey { kid: String },
    #[error("invalid signature")]
    InvalidSignature,
    #[error("claim validation failed: {0}")]
    ClaimValidation(ClaimError),
    #[error(transparent)]
    KeyFetch(#[from] KeyFetchError),
}

/// Payload-free classification of a `VerifyError`, safe to log and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedToken,
    UnknownKey,
    InvalidSignature,
    Claim(ClaimError),
    KeyFetch,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed_token",
            Self::UnknownKey => "unknown_key",
            Self::InvalidSignature => "invalid_signature",
            Self::Claim(ClaimError::Audience) => "audience",
            Self::Claim(ClaimError::Issuer) => "issuer",
            Self::Claim(ClaimError::Expired) => "expired",
            Self::Claim(ClaimError::NotYetValid) => "not_yet_valid",
            Self::Claim(ClaimError::Subject) => "subject",
            Self::KeyFetch => "key_fetch",
        }
    }
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedToken(_) => ErrorKind::MalformedToken,
            Self::UnknownKey { .. } => ErrorKind::UnknownKey,
            Self::InvalidSignature => ErrorKind::InvalidSignature,
            Self::ClaimValidation(claim) => ErrorKind::Claim(*claim),
            Self::KeyFetch(_) => ErrorKind::KeyFetch,
        }
    }
}

impl From<ClaimError> for VerifyError {
    fn from(e: ClaimError) -> Self {
        Self::ClaimValidation(e)
    }
}
