//! Unverified token header decoding.
//!
//! Only tells the verifier which key to use next. Nothing read here is trusted: the
//! signature and claims are not looked at.
use jsonwebtoken::Algorithm;

use crate::services::auth::error::VerifyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    pub kid: String,
    pub algorithm: Algorithm,
}

pub fn decode_header(token: &str) -> Result<TokenHeader, VerifyError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(VerifyError::MalformedToken("expected three non-empty segments"));
    }

    let header = jsonwebtoken::decode_header(token).map_err(|e| {
        tracing::debug!(error = %e, "undecodable token header");
        VerifyError::MalformedToken("undecodable header")
    })?;

    let kid = header
        .kid
        .filter(|kid| !kid.trim().is_empty())
        .ok_or(VerifyError::MalformedToken("missing kid"))?;

    Ok(TokenHeader {
        kid,
        algorithm: header.alg,
    })
}
