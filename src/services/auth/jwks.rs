//! Issuer key set (JWKS): parsing, fetching and caching.
//!
//! The cache holds one complete `Arc<KeySet>` at a time and swaps it wholesale, so a
//! reader sees either the previous set or the new one. Refreshes are serialized and a
//! failed refresh keeps the previous set.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey};
use reqwest::header;
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use url::Url;

use crate::services::auth::error::KeyFetchError;

/// A public verification key published by the issuer.
///
/// Key material is intentionally not printable via Debug.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    key: DecodingKey,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

impl SigningKey {
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// Parses one member of the `keys` array.
    ///
    /// `Err` carries the reason the key is unusable; the caller skips it.
    fn from_jwk_value(mut value: serde_json::Value) -> Result<Self, String> {
        if value.get("use").and_then(|v| v.as_str()) == Some("enc") {
            return Err("encryption key".to_string());
        }

        // `alg` is read separately so an algorithm jsonwebtoken does not model only
        // disqualifies this key instead of the whole document.
        let alg = value
            .as_object_mut()
            .and_then(|obj| obj.remove("alg"))
            .and_then(|v| v.as_str().map(str::to_owned));

        let jwk: Jwk = serde_json::from_value(value).map_err(|e| format!("invalid jwk: {}", e))?;

        let kid = jwk
            .common
            .key_id
            .clone()
            .filter(|kid| !kid.trim().is_empty())
            .ok_or_else(|| "missing kid".to_string())?;

        let algorithm = match alg {
            Some(alg) => alg
                .parse::<Algorithm>()
                .map_err(|_| format!("unsupported alg {:?} (kid {})", alg, kid))?,
            None => infer_algorithm(&jwk.algorithm)
                .ok_or_else(|| format!("cannot infer alg (kid {})", kid))?,
        };

        if !algorithm_fits_key(algorithm, &jwk.algorithm) {
            return Err(format!("alg {:?} does not match key type (kid {})", algorithm, kid));
        }

        let key = DecodingKey::from_jwk(&jwk)
            .map_err(|e| format!("unusable key material (kid {}): {}", kid, e))?;

        Ok(Self {
            kid,
            algorithm,
            key,
        })
    }
}

fn infer_algorithm(params: &AlgorithmParameters) -> Option<Algorithm> {
    match params {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(p) => match p.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(p) => match p.curve {
            EllipticCurve::Ed25519 => Some(Algorithm::EdDSA),
            _ => None,
        },
        // Symmetric (`oct`) keys are never accepted from a public key set.
        _ => None,
    }
}

fn algorithm_fits_key(algorithm: Algorithm, params: &AlgorithmParameters) -> bool {
    match (algorithm, params) {
        (
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
            AlgorithmParameters::RSA(_),
        ) => true,
        (Algorithm::ES256, AlgorithmParameters::EllipticCurve(p)) => {
            matches!(p.curve, EllipticCurve::P256)
        }
        (Algorithm::ES384, AlgorithmParameters::EllipticCurve(p)) => {
            matches!(p.curve, EllipticCurve::P384)
        }
        (Algorithm::EdDSA, AlgorithmParameters::OctetKeyPair(p)) => {
            matches!(p.curve, EllipticCurve::Ed25519)
        }
        _ => false,
    }
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<serde_json::Value>,
}

/// Issuer keys, unique by kid, in the order the issuer published them.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: Vec<SigningKey>,
}

impl KeySet {
    pub fn new(keys: Vec<SigningKey>) -> Result<Self, KeyFetchError> {
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].iter().any(|k| k.kid == key.kid) {
                return Err(KeyFetchError::Malformed(format!(
                    "duplicate kid {:?}",
                    key.kid
                )));
            }
        }
        Ok(Self { keys })
    }

    /// Parses a `{"keys": [...]}` document. Unusable keys are skipped; a document with
    /// no usable key at all is malformed.
    pub fn from_jwks_json(body: &[u8]) -> Result<Self, KeyFetchError> {
        let doc: JwksDocument = serde_json::from_slice(body)
            .map_err(|e| KeyFetchError::Malformed(format!("invalid key set document: {}", e)))?;

        let mut keys = Vec::with_capacity(doc.keys.len());
        for raw in doc.keys {
            match SigningKey::from_jwk_value(raw) {
                Ok(key) => keys.push(key),
                Err(reason) => tracing::warn!(%reason, "skipping unusable key set entry"),
            }
        }

        let set = Self::new(keys)?;
        if set.is_empty() {
            return Err(KeyFetchError::Malformed(
                "key set contains no usable signing keys".to_string(),
            ));
        }
        Ok(set)
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }

    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|k| k.kid.as_str())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Source of the issuer's key set. The HTTP implementation is used in production;
/// tests plug in scripted fetchers.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self) -> Result<KeySet, KeyFetchError>;
}

/// Fetches `https://<issuer>/.well-known/jwks.json` (no auth).
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
    url: Url,
}

impl HttpKeySetFetcher {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, KeyFetchError> {
        if url.scheme() != "https" {
            tracing::warn!(url = %url, "key set URL should use HTTPS");
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyFetchError::Transport(e.to_string()))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
        tracing::info!(url = %self.url, "fetching issuer key set");

        let response = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyFetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        KeySet::from_jwks_json(&body)
    }
}

fn transport_error(e: reqwest::Error) -> KeyFetchError {
    if e.is_timeout() {
        KeyFetchError::Timeout
    } else {
        KeyFetchError::Transport(e.to_string())
    }
}

/// Cache policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    // How long a fetched key set is served without asking the issuer again.
    pub ttl: Duration,
    // Lower bound between two fetches triggered by unknown kids or after a failure.
    pub min_refresh_interval: Duration,
    // Upper bound for one fetch.
    pub fetch_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
struct RefreshState {
    last_attempt: Option<Instant>,
    // Set while the most recent attempt failed.
    last_error: Option<KeyFetchError>,
}

impl RefreshState {
    fn attempted_within(&self, window: Duration) -> bool {
        self.last_attempt.is_some_and(|at| at.elapsed() < window)
    }

    fn failed_within(&self, window: Duration) -> Option<&KeyFetchError> {
        self.last_error
            .as_ref()
            .filter(|_| self.attempted_within(window))
    }
}

pub struct KeySetCache {
    fetcher: Arc<dyn KeySetFetcher>,
    policy: CachePolicy,
    current: RwLock<Option<CachedKeySet>>,
    // Serializes refreshes: one fetch per cache-miss event.
    refresh: Mutex<RefreshState>,
}

impl fmt::Debug for KeySetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySetCache")
            .field("policy", &self.policy)
            .finish()
    }
}

impl KeySetCache {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, policy: CachePolicy) -> Self {
        Self {
            fetcher,
            policy,
            current: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    /// Returns the current key set, fetching it when missing or older than the TTL.
    ///
    /// When a refresh fails the previous key set is returned; the error surfaces only
    /// if nothing was ever fetched.
    pub async fn get_key_set(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        if let Some(keys) = self.fresh().await {
            return Ok(keys);
        }

        let mut state = match self.lock_refresh().await {
            Ok(state) => state,
            Err(err) => return self.cached().await.ok_or(err),
        };

        // Another caller may have refreshed while we waited for the lock.
        if let Some(keys) = self.fresh().await {
            tracing::debug!("key set refreshed while waiting for lock");
            return Ok(keys);
        }

        // Back off after a failed refresh instead of hitting the issuer on every request.
        // With nothing cached, callers queued behind the failed fetch get its error.
        if let Some(err) = state.failed_within(self.policy.min_refresh_interval) {
            let err = err.clone();
            return self.cached().await.ok_or(err);
        }

        self.refresh_locked(&mut state).await
    }

    /// Re-fetches after a token named a kid the cached set does not contain (key
    /// rotation). Rate limited by `min_refresh_interval`; within the window the
    /// current set is returned unchanged.
    pub async fn refresh_on_unknown_kid(&self) -> Result<Arc<KeySet>, KeyFetchError> {
        let mut state = match self.lock_refresh().await {
            Ok(state) => state,
            Err(err) => return self.cached().await.ok_or(err),
        };

        if let Some(err) = state.failed_within(self.policy.min_refresh_interval) {
            let err = err.clone();
            return self.cached().await.ok_or(err);
        }
        if state.attempted_within(self.policy.min_refresh_interval) {
            if let Some(keys) = self.cached().await {
                return Ok(keys);
            }
        }

        self.refresh_locked(&mut state).await
    }

    // Waiting on another caller's fetch is bounded like the fetch itself.
    async fn lock_refresh(&self) -> Result<MutexGuard<'_, RefreshState>, KeyFetchError> {
        tokio::time::timeout(self.policy.fetch_timeout, self.refresh.lock())
            .await
            .map_err(|_| {
                tracing::warn!("timed out waiting for in-flight key set fetch");
                KeyFetchError::Timeout
            })
    }

    async fn fresh(&self) -> Option<Arc<KeySet>> {
        let current = self.current.read().await;
        current
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.policy.ttl)
            .map(|c| Arc::clone(&c.keys))
    }

    async fn cached(&self) -> Option<Arc<KeySet>> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|c| Arc::clone(&c.keys))
    }

    // Caller holds the refresh lock.
    async fn refresh_locked(
        &self,
        state: &mut RefreshState,
    ) -> Result<Arc<KeySet>, KeyFetchError> {
        state.last_attempt = Some(Instant::now());

        let fetched = match tokio::time::timeout(self.policy.fetch_timeout, self.fetcher.fetch())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(KeyFetchError::Timeout),
        };

        match fetched {
            Ok(set) => {
                state.last_error = None;
                let keys = Arc::new(set);
                *self.current.write().await = Some(CachedKeySet {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                });
                tracing::info!(
                    keys = keys.len(),
                    kids = ?keys.kids().collect::<Vec<_>>(),
                    "issuer key set cached"
                );
                Ok(keys)
            }
            Err(err) => {
                state.last_error = Some(err.clone());
                match self.cached().await {
                    Some(previous) => {
                        tracing::warn!(error = %err, "key set refresh failed; keeping previous key set");
                        Ok(previous)
                    }
                    None => {
                        tracing::warn!(error = %err, "key set fetch failed and nothing is cached");
                        Err(err)
                    }
                }
            }
        }
    }
}
