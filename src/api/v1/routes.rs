/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /health, /authorize は公開; /portfolio は access middleware 配下
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::v1::handlers::{
    authorize::authorize,
    health::health,
    portfolio::{add_holding, get_portfolio},
};
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(health))
        .route("/authorize", post(authorize));

    let protected = Router::new().route("/portfolio", get(get_portfolio).post(add_holding));
    let protected = middleware::auth::access::apply(protected, state);

    public.merge(protected)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::repos::MemoryHoldingStore;
    use crate::services::auth::Authorizer;
    use crate::services::auth::jwks::{CachePolicy, KeySetCache};
    use crate::services::auth::verifier::TokenVerifier;
    use crate::services::market::{PriceError, PriceSource};
    use crate::test_support::{AUDIENCE, ISSUER, ScriptedFetcher, TestIssuer};

    struct StaticPrices(HashMap<&'static str, f64>);

    #[async_trait]
    impl PriceSource for StaticPrices {
        async fn last_price(&self, ticker: &str) -> Result<f64, PriceError> {
            self.0.get(ticker).copied().ok_or(PriceError::MissingPrice)
        }
    }

    fn app(issuer: &TestIssuer) -> Router {
        let authorizer = Authorizer::new(
            KeySetCache::new(
                Arc::new(ScriptedFetcher::serving(issuer.jwks())),
                CachePolicy::default(),
            ),
            TokenVerifier::new(AUDIENCE, ISSUER, 0),
        );
        let state = AppState::new(
            Arc::new(authorizer),
            Arc::new(MemoryHoldingStore::new()),
            Arc::new(StaticPrices(HashMap::from([("AAPL", 120.0)]))),
        );

        Router::new()
            .nest("/api/v1", routes(state.clone()))
            .with_state(state)
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app(&TestIssuer::new("kid-1", 100));
        let (status, body) = send(&app, get_request("/api/v1/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn authorize_endpoint_allows_valid_token() {
        let issuer = TestIssuer::new("kid-1", 101);
        let app = app(&issuer);
        let token = issuer.token(&issuer.claims_for("42"));
        let arn = "arn:aws:execute-api:us-east-1:123456789012:abc123/prod/GET/portfolio";

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/authorize",
                None,
                json!({
                    "headers": { "Authorization": format!("Bearer {token}") },
                    "methodArn": arn
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["principalId"], "42");
        assert_eq!(body["policyDocument"]["Statement"][0]["Effect"], "Allow");
        assert_eq!(body["policyDocument"]["Statement"][0]["Resource"], arn);
        assert_eq!(body["context"]["userId"], "42");
    }

    #[tokio::test]
    async fn authorize_endpoint_denies_with_200() {
        let app = app(&TestIssuer::new("kid-1", 102));

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/authorize",
                None,
                json!({
                    "headers": { "Authorization": "Bearer malformed.token" },
                    "methodArn": "arn:x"
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["principalId"], "anonymous");
        assert_eq!(body["policyDocument"]["Statement"][0]["Effect"], "Deny");
        assert_eq!(body["context"], json!({}));
    }

    #[tokio::test]
    async fn portfolio_requires_a_valid_token() {
        let issuer = TestIssuer::new("kid-1", 103);
        let stranger = TestIssuer::new("kid-1", 104);
        let app = app(&issuer);

        let (status, body) = send(&app, get_request("/api/v1/portfolio", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        // same kid, different key: signature check fails
        let forged = stranger.token(&stranger.claims_for("42"));
        let (status, _) = send(&app, get_request("/api/v1/portfolio", Some(&forged))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn add_then_list_portfolio() {
        let issuer = TestIssuer::new("kid-1", 105);
        let app = app(&issuer);
        let token = issuer.token(&issuer.claims_for("user-7"));

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/portfolio",
                Some(&token),
                json!({ "ticker": "aapl", "shares": 10, "buy_price": 100.0 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Stock added!" }));

        let (status, body) = send(&app, get_request("/api/v1/portfolio", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "portfolio": [{
                    "ticker": "AAPL",
                    "shares": 10.0,
                    "buy_price": 100.0,
                    "current_price": 120.0,
                    "pnl_pct": 20.0
                }],
                "total_pnl_pct": 20.0
            })
        );
    }

    #[tokio::test]
    async fn holdings_are_partitioned_by_token_subject() {
        let issuer = TestIssuer::new("kid-1", 106);
        let app = app(&issuer);
        let alice = issuer.token(&issuer.claims_for("alice"));
        let bob = issuer.token(&issuer.claims_for("bob"));

        let (status, _) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/portfolio",
                Some(&alice),
                json!({ "ticker": "AAPL", "shares": 1, "buy_price": 100, "user_id": "bob" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, get_request("/api/v1/portfolio", Some(&bob))).await;
        assert_eq!(body["portfolio"], json!([]));

        let (_, body) = send(&app, get_request("/api/v1/portfolio", Some(&alice))).await;
        assert_eq!(body["portfolio"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn invalid_holding_is_400() {
        let issuer = TestIssuer::new("kid-1", 107);
        let app = app(&issuer);
        let token = issuer.token(&issuer.claims_for("user-7"));

        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/portfolio",
                Some(&token),
                json!({ "ticker": "AAPL", "shares": -3, "buy_price": 100 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_SHARES");
    }
}
