//! Bearer token 検証 → AuthCtx を extensions に入れる
//!
//! - API Gateway 経由の `/authorize` と同じ Authorizer を使う (判定ロジックは一箇所)
//! - resource は `"{METHOD} {path}"`
//! - Deny は理由を問わず 401 (理由は Authorizer 側で warn ログ)

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::AppError;
use crate::state::AppState;

/// 保護対象の Router に認証 middleware を適用する。
///
/// ```ignore
/// let protected = middleware::auth::access::apply(protected, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    OriginalUri(original_uri): OriginalUri,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // missing or non-UTF-8 header → "" → Deny
    let raw = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let resource = format!("{} {}", req.method(), original_uri.path());
    let decision = state.authorizer.authorize(raw, &resource).await;
    if !decision.is_allowed() {
        return Err(AppError::Unauthorized);
    }

    let auth_ctx = AuthCtx::new(decision.principal_id());

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(auth_ctx);

    Ok(next.run(req).await)
}
