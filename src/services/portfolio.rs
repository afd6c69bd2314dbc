/*
 * Responsibility
 * - holdings + 現在値 → 銘柄ごとの損益率 / 合計損益率
 * - 価格取得の失敗は 0 として扱う (warn ログのみ, リクエストは失敗させない)
 */
use std::collections::HashMap;

use serde::Serialize;

use crate::repos::{Holding, HoldingStore, NewHolding, RepoError};
use crate::services::market::PriceSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSummary {
    pub ticker: String,
    pub shares: f64,
    pub buy_price: f64,
    pub current_price: f64,
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSummary {
    pub portfolio: Vec<PositionSummary>,
    pub total_pnl_pct: f64,
}

pub async fn add_holding(
    store: &dyn HoldingStore,
    user_id: &str,
    holding: NewHolding,
) -> Result<Holding, RepoError> {
    let saved = store.put(user_id, holding).await?;
    tracing::info!(user_id, sk = %saved.sk, "holding stored");
    Ok(saved)
}

pub async fn summarize(
    store: &dyn HoldingStore,
    prices: &dyn PriceSource,
    user_id: &str,
) -> Result<PortfolioSummary, RepoError> {
    let holdings = store.list(user_id).await?;

    // one lookup per ticker even when it is held under several dates
    let mut quotes: HashMap<String, f64> = HashMap::new();
    for holding in &holdings {
        if !quotes.contains_key(&holding.ticker) {
            let price = current_price(prices, &holding.ticker).await;
            quotes.insert(holding.ticker.clone(), price);
        }
    }

    let mut total_cost = 0.0;
    let mut total_value = 0.0;
    let mut portfolio = Vec::with_capacity(holdings.len());

    for holding in holdings {
        let current = quotes.get(&holding.ticker).copied().unwrap_or(0.0);
        let cost = holding.shares * holding.buy_price;
        let value = holding.shares * current;

        portfolio.push(PositionSummary {
            pnl_pct: round2(pnl_pct(cost, value)),
            ticker: holding.ticker,
            shares: holding.shares,
            buy_price: holding.buy_price,
            current_price: current,
        });

        total_cost += cost;
        total_value += value;
    }

    Ok(PortfolioSummary {
        portfolio,
        total_pnl_pct: round2(pnl_pct(total_cost, total_value)),
    })
}

async fn current_price(prices: &dyn PriceSource, ticker: &str) -> f64 {
    match prices.last_price(ticker).await {
        Ok(price) => price,
        Err(err) => {
            tracing::warn!(ticker, error = %err, "price lookup failed; using 0");
            0.0
        }
    }
}

fn pnl_pct(cost: f64, value: f64) -> f64 {
    if cost == 0.0 {
        return 0.0;
    }
    (value - cost) / cost * 100.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::repos::MemoryHoldingStore;
    use crate::services::market::PriceError;

    struct FixedPrices {
        prices: HashMap<&'static str, f64>,
        calls: AtomicUsize,
    }

    impl FixedPrices {
        fn new(prices: &[(&'static str, f64)]) -> Self {
            Self {
                prices: prices.iter().copied().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PriceSource for FixedPrices {
        async fn last_price(&self, ticker: &str) -> Result<f64, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prices
                .get(ticker)
                .copied()
                .ok_or(PriceError::MissingPrice)
        }
    }

    fn holding(ticker: &str, shares: f64, buy_price: f64, date: Option<&str>) -> NewHolding {
        NewHolding {
            ticker: ticker.to_string(),
            shares,
            buy_price,
            date: date.map(str::to_string),
        }
    }

    #[test]
    fn pnl_is_zero_without_cost() {
        assert_eq!(pnl_pct(0.0, 50.0), 0.0);
        assert_eq!(round2(pnl_pct(100.0, 150.0)), 50.0);
        assert_eq!(round2(1.0 / 3.0 * 100.0), 33.33);
    }

    #[tokio::test]
    async fn summarizes_positions_and_totals() {
        let store = MemoryHoldingStore::new();
        add_holding(&store, "u1", holding("aapl", 10.0, 100.0, None)).await.unwrap();
        add_holding(&store, "u1", holding("msft", 2.0, 300.0, None)).await.unwrap();
        let prices = FixedPrices::new(&[("AAPL", 110.0), ("MSFT", 270.0)]);

        let summary = summarize(&store, &prices, "u1").await.unwrap();

        assert_eq!(summary.portfolio.len(), 2);
        assert_eq!(summary.portfolio[0].ticker, "AAPL");
        assert_eq!(summary.portfolio[0].current_price, 110.0);
        assert_eq!(summary.portfolio[0].pnl_pct, 10.0);
        assert_eq!(summary.portfolio[1].pnl_pct, -10.0);
        // cost 1600, value 1640
        assert_eq!(summary.total_pnl_pct, 2.5);
    }

    #[tokio::test]
    async fn failed_price_counts_as_zero() {
        let store = MemoryHoldingStore::new();
        add_holding(&store, "u1", holding("NOPE", 4.0, 25.0, None)).await.unwrap();
        let prices = FixedPrices::new(&[]);

        let summary = summarize(&store, &prices, "u1").await.unwrap();
        assert_eq!(summary.portfolio[0].current_price, 0.0);
        assert_eq!(summary.portfolio[0].pnl_pct, -100.0);
        assert_eq!(summary.total_pnl_pct, -100.0);
    }

    #[tokio::test]
    async fn ticker_is_priced_once() {
        let store = MemoryHoldingStore::new();
        add_holding(&store, "u1", holding("AAPL", 1.0, 100.0, Some("2024-01-01"))).await.unwrap();
        add_holding(&store, "u1", holding("AAPL", 1.0, 120.0, Some("2024-02-01"))).await.unwrap();
        let prices = FixedPrices::new(&[("AAPL", 110.0)]);

        let summary = summarize(&store, &prices, "u1").await.unwrap();
        assert_eq!(summary.portfolio.len(), 2);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 1);
        assert_eq!(summary.total_pnl_pct, 0.0);
    }

    #[tokio::test]
    async fn empty_portfolio() {
        let store = MemoryHoldingStore::new();
        let prices = FixedPrices::new(&[]);

        let summary = summarize(&store, &prices, "nobody").await.unwrap();
        assert!(summary.portfolio.is_empty());
        assert_eq!(summary.total_pnl_pct, 0.0);
        assert_eq!(prices.calls.load(Ordering::SeqCst), 0);
    }
}
