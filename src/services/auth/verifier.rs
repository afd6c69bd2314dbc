use std::collections::BTreeMap;

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};

use crate::services::auth::error::{ClaimError, VerifyError};
use crate::services::auth::jwks::KeySet;
use crate::services::auth::token;

/// Claims of a verified token.
///
/// NOTE:
/// - `aud` may be a string or an array; it is kept as `Value` and checked by `Validation`.
/// - Required claims default to empty so a missing one surfaces as a claim error
///   instead of a decode error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub aud: serde_json::Value,
    #[serde(default)]
    pub exp: u64,

    // token_use, email, cognito:username, ...
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Flattens every claim to a string: strings verbatim, anything else as compact JSON.
    pub fn to_context(&self) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();
        context.insert("sub".to_string(), self.sub.clone());
        context.insert("iss".to_string(), self.iss.clone());
        context.insert("aud".to_string(), value_to_string(&self.aud));
        context.insert("exp".to_string(), self.exp.to_string());
        for (name, value) in &self.extra {
            context.insert(name.clone(), value_to_string(value));
        }
        context
    }
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Identity established by a successful verification.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject: String,
    pub claims: Claims,
}

pub type VerificationResult = Result<Identity, VerifyError>;

/// Signature and claim verifier for issuer-signed tokens.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    audience: String,
    issuer: String,
    leeway_seconds: u64,
}

impl TokenVerifier {
    pub fn new(
        audience: impl Into<String>,
        issuer: impl Into<String>,
        leeway_seconds: u64,
    ) -> Self {
        Self {
            audience: audience.into(),
            issuer: issuer.into(),
            leeway_seconds,
        }
    }

    /// Verifies `token` against the key its header names.
    ///
    /// Steps:
    /// - header kid must be present in `keys` (no fallback to another key)
    /// - header alg must equal the key's declared algorithm
    /// - signature (jsonwebtoken)
    /// - `aud`, `iss`, `exp`, `nbf`, `sub`
    pub fn verify(&self, token: &str, keys: &KeySet) -> VerificationResult {
        let header = token::decode_header(token)?;

        let key = keys.get(&header.kid).ok_or_else(|| VerifyError::UnknownKey {
            kid: header.kid.clone(),
        })?;

        if header.algorithm != key.algorithm() {
            tracing::debug!(
                kid = %header.kid,
                token_alg = ?header.algorithm,
                key_alg = ?key.algorithm(),
                "token alg does not match key alg"
            );
            return Err(VerifyError::InvalidSignature);
        }

        let data = jsonwebtoken::decode::<Claims>(
            token,
            key.decoding_key(),
            &self.validation(key.algorithm()),
        )
        .map_err(map_jwt_error)?;

        let claims = data.claims;
        if claims.sub.trim().is_empty() {
            return Err(ClaimError::Subject.into());
        }

        Ok(Identity {
            subject: claims.sub.clone(),
            claims,
        })
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.validate_nbf = true;
        validation.leeway = self.leeway_seconds;
        // `exp` equal to the current second is already expired.
        validation.reject_tokens_expiring_in_less_than = 1;
        validation
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> VerifyError {
    match e.kind() {
        JwtErrorKind::InvalidSignature
        | JwtErrorKind::InvalidAlgorithm
        | JwtErrorKind::InvalidKeyFormat => VerifyError::InvalidSignature,
        JwtErrorKind::ExpiredSignature => ClaimError::Expired.into(),
        JwtErrorKind::ImmatureSignature => ClaimError::NotYetValid.into(),
        JwtErrorKind::InvalidAudience => ClaimError::Audience.into(),
        JwtErrorKind::InvalidIssuer => ClaimError::Issuer.into(),
        JwtErrorKind::InvalidSubject => ClaimError::Subject.into(),
        JwtErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "aud" => ClaimError::Audience.into(),
            "iss" => ClaimError::Issuer.into(),
            "exp" => ClaimError::Expired.into(),
            _ => ClaimError::Subject.into(),
        },
        _ => {
            tracing::debug!(error = %e, "undecodable token");
            VerifyError::MalformedToken("undecodable token")
        }
    }
}
