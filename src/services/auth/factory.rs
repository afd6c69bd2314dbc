/// Factory: build the `Authorizer` from `AuthConfig`.
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::services::auth::authorizer::Authorizer;
use crate::services::auth::jwks::{CachePolicy, HttpKeySetFetcher, KeySetCache};
use crate::services::auth::verifier::TokenVerifier;

pub fn build_authorizer(config: &AuthConfig) -> Result<Arc<Authorizer>, AppError> {
    let fetcher = HttpKeySetFetcher::new(config.jwks_url.clone(), config.jwks_fetch_timeout)
        .map_err(|err| {
            tracing::error!(error = %err, "failed to build jwks http client");
            AppError::Internal
        })?;

    let policy = CachePolicy {
        ttl: config.jwks_cache_ttl,
        min_refresh_interval: config.jwks_min_refresh_interval,
        fetch_timeout: config.jwks_fetch_timeout,
    };

    let verifier = TokenVerifier::new(
        config.audience.clone(),
        config.issuer.clone(),
        config.leeway_seconds,
    );

    tracing::info!(
        issuer = %config.issuer,
        jwks_url = %config.jwks_url,
        ttl_secs = policy.ttl.as_secs(),
        "authorizer configured"
    );

    Ok(Arc::new(Authorizer::new(
        KeySetCache::new(Arc::new(fetcher), policy),
        verifier,
    )))
}
