//! Test doubles: an in-process token issuer and scripted key set fetchers.
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::Signer;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use crate::services::auth::error::KeyFetchError;
use crate::services::auth::jwks::{KeySet, KeySetFetcher};

pub const ISSUER: &str = "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_TestPool";
pub const AUDIENCE: &str = "test-app-client";

pub fn now() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

/// Ed25519 signer publishing its public half as an OKP JWK under `kid`.
///
/// The seed makes keys deterministic; two issuers with the same seed share key material.
pub struct TestIssuer {
    kid: String,
    signing_key: ed25519_dalek::SigningKey,
}

impl TestIssuer {
    pub fn new(kid: &str, seed: u8) -> Self {
        Self {
            kid: kid.to_string(),
            signing_key: ed25519_dalek::SigningKey::from_bytes(&[seed; 32]),
        }
    }

    pub fn public_x(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().as_bytes())
    }

    pub fn jwk(&self) -> Value {
        json!({
            "kid": self.kid,
            "kty": "OKP",
            "crv": "Ed25519",
            "alg": "EdDSA",
            "use": "sig",
            "x": self.public_x(),
        })
    }

    pub fn jwks(&self) -> Value {
        json!({ "keys": [self.jwk()] })
    }

    pub fn key_set(&self) -> KeySet {
        KeySet::from_jwks_json(self.jwks().to_string().as_bytes()).expect("test key set")
    }

    pub fn claims_for(&self, sub: &str) -> Value {
        let now = now();
        json!({
            "sub": sub,
            "iss": ISSUER,
            "aud": AUDIENCE,
            "iat": now,
            "exp": now + 3600,
        })
    }

    // PKCS#8 v1 wrapping of the raw seed (RFC 8410).
    fn pkcs8_der(&self) -> Vec<u8> {
        let mut der = vec![
            0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22,
            0x04, 0x20,
        ];
        der.extend_from_slice(&self.signing_key.to_bytes());
        der
    }

    pub fn token(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone());
        let key = EncodingKey::from_ed_der(&self.pkcs8_der());
        jsonwebtoken::encode(&header, claims, &key).expect("sign test token")
    }

    /// Ed25519-signed token whose header claims a different `alg`.
    pub fn token_with_header_alg(&self, claims: &Value, alg: &str) -> String {
        let header = json!({ "alg": alg, "kid": self.kid, "typ": "JWT" });
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        );
        let signature = self.signing_key.sign(signing_input.as_bytes());
        format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }
}

/// Flips one byte of the signature segment.
pub fn tamper_signature(token: &str, index: usize) -> String {
    let (signing_input, signature) = token.rsplit_once('.').expect("three segments");
    let mut bytes = URL_SAFE_NO_PAD.decode(signature).expect("base64url signature");
    let index = index % bytes.len();
    bytes[index] ^= 0x01;
    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(bytes))
}

/// Fetcher that serves whatever document it currently holds (or fails when it holds
/// none) and counts calls.
pub struct ScriptedFetcher {
    document: Mutex<Option<Value>>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn serving(document: Value) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            document: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn serve(&self, document: Option<Value>) {
        *self.document.lock().unwrap() = document;
    }
}

#[async_trait]
impl KeySetFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let document = self.document.lock().unwrap().clone();
        match document {
            Some(doc) => KeySet::from_jwks_json(doc.to_string().as_bytes()),
            None => Err(KeyFetchError::Transport("issuer unreachable".to_string())),
        }
    }
}
