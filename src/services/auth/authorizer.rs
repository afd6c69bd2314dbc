//! Bearer token → Allow/Deny decision.
//!
//! Every failure (missing header, malformed token, unknown key, bad signature, claim
//! mismatch, issuer unreachable) becomes the same Deny. The reason is logged, never
//! returned to the caller.
use std::collections::BTreeMap;
use std::fmt;

use crate::services::auth::error::VerifyError;
use crate::services::auth::jwks::KeySetCache;
use crate::services::auth::token;
use crate::services::auth::verifier::{Identity, TokenVerifier, VerificationResult};

/// Principal reported for every Deny; never derived from request input.
pub const ANONYMOUS_PRINCIPAL: &str = "anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

/// Outcome handed to the calling infrastructure.
///
/// Fields are private: an Allow can only be built from a verified `Identity`, and a Deny
/// never carries context.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthDecision {
    principal_id: String,
    effect: Effect,
    resource: String,
    context: BTreeMap<String, String>,
}

impl AuthDecision {
    fn allow(identity: Identity, resource: &str) -> Self {
        let mut context = identity.claims.to_context();
        // Field the portfolio handlers read their partition key from.
        context.insert("userId".to_string(), identity.subject.clone());

        Self {
            principal_id: identity.subject,
            effect: Effect::Allow,
            resource: resource.to_string(),
            context,
        }
    }

    fn deny(resource: &str) -> Self {
        Self {
            principal_id: ANONYMOUS_PRINCIPAL.to_string(),
            effect: Effect::Deny,
            resource: resource.to_string(),
            context: BTreeMap::new(),
        }
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn is_allowed(&self) -> bool {
        self.effect == Effect::Allow
    }
}

pub struct Authorizer {
    keys: KeySetCache,
    verifier: TokenVerifier,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("keys", &self.keys)
            .field("verifier", &self.verifier)
            .finish()
    }
}

impl Authorizer {
    pub fn new(keys: KeySetCache, verifier: TokenVerifier) -> Self {
        Self { keys, verifier }
    }

    /// Decides whether `raw_auth_header` grants access to `resource`.
    pub async fn authorize(&self, raw_auth_header: &str, resource: &str) -> AuthDecision {
        match self.evaluate(raw_auth_header).await {
            Ok(identity) => {
                tracing::debug!(principal = %identity.subject, resource, "authorization allowed");
                AuthDecision::allow(identity, resource)
            }
            Err(err) => {
                tracing::warn!(
                    kind = err.kind().as_str(),
                    error = %err,
                    resource,
                    "authorization denied"
                );
                AuthDecision::deny(resource)
            }
        }
    }

    /// Full verification of a raw `Authorization` value, with the internal error kind.
    pub async fn evaluate(&self, raw_auth_header: &str) -> VerificationResult {
        let token = bearer_token(raw_auth_header)
            .ok_or(VerifyError::MalformedToken("authorization is not a bearer token"))?;

        let header = token::decode_header(token)?;

        let mut keys = self.keys.get_key_set().await?;
        if keys.get(&header.kid).is_none() {
            tracing::info!(kid = %header.kid, "unknown kid; refreshing key set");
            keys = self.keys.refresh_on_unknown_kid().await?;
        }

        self.verifier.verify(token, &keys)
    }
}

/// Extracts `<token>` from `Bearer <token>`. The scheme is case-insensitive; the token
/// must be a single non-empty word.
pub fn bearer_token(raw: &str) -> Option<&str> {
    let (scheme, rest) = raw.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = rest.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}
