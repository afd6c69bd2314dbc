/*
 * Responsibility
 * - Load settings from the environment (issuer/audience, JWKS cache policy, DB, market data)
 * - Validate them up front (missing or unparseable values fail startup)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Token verification settings, split out so the auth services do not depend on the
/// whole `Config`.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub audience: String,
    pub jwks_url: Url,
    pub jwks_cache_ttl: Duration,
    pub jwks_min_refresh_interval: Duration,
    pub jwks_fetch_timeout: Duration,
    pub leeway_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
    pub fetch_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub request_timeout: Duration,

    // None -> in-memory holdings store
    pub database_url: Option<String>,

    pub auth: AuthConfig,
    pub prices: PriceConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port: u16 = match var("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid("PORT"))?,
            None => 3000,
        };

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = var("APP_ENV")
            .map(|v| AppEnv::parse(&v))
            .unwrap_or(AppEnv::Development);

        let request_timeout = seconds(&var, "REQUEST_TIMEOUT_SECONDS", 30)?;

        let database_url = var("DATABASE_URL");

        // AUTH_ISSUER wins; otherwise derive the Cognito user pool issuer.
        let issuer = match var("AUTH_ISSUER") {
            Some(issuer) => issuer,
            None => {
                let region =
                    var("COGNITO_REGION").ok_or(ConfigError::Missing("AUTH_ISSUER"))?;
                let pool_id =
                    var("COGNITO_USER_POOL_ID").ok_or(ConfigError::Missing("AUTH_ISSUER"))?;
                format!("https://cognito-idp.{}.amazonaws.com/{}", region, pool_id)
            }
        };
        let issuer = issuer.trim_end_matches('/').to_string();

        let audience = var("AUTH_AUDIENCE").ok_or(ConfigError::Missing("AUTH_AUDIENCE"))?;

        let jwks_url = match var("AUTH_JWKS_URL") {
            Some(raw) => Url::parse(&raw).map_err(|_| ConfigError::Invalid("AUTH_JWKS_URL"))?,
            None => Url::parse(&format!("{}/.well-known/jwks.json", issuer))
                .map_err(|_| ConfigError::Invalid("AUTH_ISSUER"))?,
        };

        let jwks_cache_ttl = seconds(&var, "JWKS_CACHE_TTL_SECONDS", 3600)?;
        let jwks_min_refresh_interval = seconds(&var, "JWKS_MIN_REFRESH_SECONDS", 60)?;
        let jwks_fetch_timeout = seconds(&var, "JWKS_FETCH_TIMEOUT_SECONDS", 5)?;

        let leeway_seconds = match var("ACCESS_TOKEN_LEEWAY_SECONDS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid("ACCESS_TOKEN_LEEWAY_SECONDS"))?,
            None => 0,
        };

        let price_base_url = var("PRICE_API_BASE_URL")
            .unwrap_or_else(|| "https://api.polygon.io".to_string());
        let price_base_url =
            Url::parse(&price_base_url).map_err(|_| ConfigError::Invalid("PRICE_API_BASE_URL"))?;

        Ok(Self {
            addr,
            app_env,
            request_timeout,
            database_url,
            auth: AuthConfig {
                issuer,
                audience,
                jwks_url,
                jwks_cache_ttl,
                jwks_min_refresh_interval,
                jwks_fetch_timeout,
                leeway_seconds,
            },
            prices: PriceConfig {
                base_url: price_base_url,
                api_key: var("PRICE_API_KEY"),
                fetch_timeout: seconds(&var, "PRICE_FETCH_TIMEOUT_SECONDS", 5)?,
            },
        })
    }
}

fn seconds<F>(var: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(v) => v
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError::Invalid(key)),
        None => Ok(Duration::from_secs(default)),
    }
}
