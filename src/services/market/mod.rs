/*
 * Responsibility
 * - 現在値 (last trade price) の取得口 (PriceSource)
 * - 外部 API 実装 (polygon) は差し替え可能にしておく
 */
use async_trait::async_trait;
use thiserror::Error;

pub mod polygon;

pub use polygon::PolygonPriceSource;

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("price request failed: {0}")]
    Transport(String),
    #[error("price endpoint returned status {0}")]
    Status(u16),
    #[error("price response missing results.p")]
    MissingPrice,
    #[error("price request timed out")]
    Timeout,
}

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Last traded price for `ticker` (already upper-cased by the caller).
    async fn last_price(&self, ticker: &str) -> Result<f64, PriceError>;
}
