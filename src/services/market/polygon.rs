//! Polygon.io last-trade client: `GET {base}/v2/last/trade/{TICKER}?apiKey=...` → `results.p`.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{PriceError, PriceSource};

#[derive(Debug, Deserialize)]
struct LastTradeResponse {
    results: Option<LastTrade>,
}

#[derive(Debug, Deserialize)]
struct LastTrade {
    p: Option<f64>,
}

pub struct PolygonPriceSource {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl fmt::Debug for PolygonPriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolygonPriceSource")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl PolygonPriceSource {
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PriceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn last_trade_url(&self, ticker: &str) -> Result<Url, PriceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| PriceError::Transport("base url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v2", "last", "trade", ticker]);

        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("apiKey", key);
        }
        Ok(url)
    }
}

#[async_trait]
impl PriceSource for PolygonPriceSource {
    async fn last_price(&self, ticker: &str) -> Result<f64, PriceError> {
        let url = self.last_trade_url(ticker)?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                PriceError::Timeout
            } else {
                PriceError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceError::Status(status.as_u16()));
        }

        let body: LastTradeResponse = response
            .json()
            .await
            .map_err(|e| PriceError::Transport(e.to_string()))?;

        body.results
            .and_then(|r| r.p)
            .filter(|p| p.is_finite())
            .ok_or(PriceError::MissingPrice)
    }
}
