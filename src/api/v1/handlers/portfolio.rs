/*
 * Responsibility
 * - /portfolio handler (保有銘柄の登録 / 損益サマリ)
 * - user_id は AuthCtx からのみ取得する (body/query からは取らない)
 */
use axum::{Json, extract::State};

use crate::api::v1::dto::portfolio::{AddHoldingRequest, MessageResponse};
use crate::api::v1::extractors::AuthCtxExtractor;
use crate::error::AppError;
use crate::services::portfolio::{self, PortfolioSummary};
use crate::state::AppState;

pub async fn add_holding(
    State(state): State<AppState>,
    AuthCtxExtractor(auth): AuthCtxExtractor,
    Json(req): Json<AddHoldingRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()
        .map_err(|(code, message)| AppError::bad_request(code, message))?;

    portfolio::add_holding(
        state.holdings.as_ref(),
        &auth.user_id,
        req.into_new_holding(),
    )
    .await?;

    Ok(Json(MessageResponse {
        message: "Stock added!",
    }))
}

pub async fn get_portfolio(
    State(state): State<AppState>,
    AuthCtxExtractor(auth): AuthCtxExtractor,
) -> Result<Json<PortfolioSummary>, AppError> {
    let summary = portfolio::summarize(
        state.holdings.as_ref(),
        state.prices.as_ref(),
        &auth.user_id,
    )
    .await?;

    Ok(Json(summary))
}
