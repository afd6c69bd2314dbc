/*
 * Responsibility
 * - POST /authorize: API Gateway custom authorizer 相当
 * - 常に 200 を返し、Allow/Deny は policy document で表す
 */
use axum::{Json, extract::State};

use crate::api::v1::dto::authorize::AuthorizeRequest;
use crate::services::auth::AuthorizerResponse;
use crate::state::AppState;

pub async fn authorize(
    State(state): State<AppState>,
    Json(req): Json<AuthorizeRequest>,
) -> Json<AuthorizerResponse> {
    let decision = state
        .authorizer
        .authorize(req.authorization(), &req.method_arn)
        .await;

    Json(AuthorizerResponse::from(&decision))
}
