/*
 * Responsibility
 * - holdings (user_id, sk) の保存と一覧
 * - user_id は必ず AuthCtx 由来 (handler 側で request body から取らない)
 * - Postgres 実装と in-memory 実装 (DATABASE_URL 未設定時 / テスト用)
 */
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use crate::repos::error::RepoError;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Holding {
    pub user_id: String,
    pub sk: String,
    pub ticker: String,
    pub shares: f64,
    pub buy_price: f64,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

/// Holding as submitted by a client; normalized by `HoldingStore::put`.
#[derive(Debug, Clone)]
pub struct NewHolding {
    pub ticker: String,
    pub shares: f64,
    pub buy_price: f64,
    pub date: Option<String>,
}

impl NewHolding {
    pub fn normalized_ticker(&self) -> String {
        self.ticker.trim().to_uppercase()
    }

    /// Sort key: `{TICKER}#{date}`, `nodate` when no date was given.
    pub fn sort_key(&self) -> String {
        let date = self
            .date
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("nodate");
        format!("{}#{}", self.normalized_ticker(), date)
    }

    fn into_holding(self, user_id: &str) -> Holding {
        Holding {
            user_id: user_id.to_string(),
            sk: self.sort_key(),
            ticker: self.normalized_ticker(),
            shares: self.shares,
            buy_price: self.buy_price,
            cost: self.shares * self.buy_price,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait HoldingStore: Send + Sync {
    /// Inserts or replaces the holding at `(user_id, sk)`.
    async fn put(&self, user_id: &str, holding: NewHolding) -> Result<Holding, RepoError>;

    async fn list(&self, user_id: &str) -> Result<Vec<Holding>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct PgHoldingStore {
    db: PgPool,
}

impl PgHoldingStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn ensure_schema(&self) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS holdings (
                user_id    TEXT             NOT NULL,
                sk         TEXT             NOT NULL,
                ticker     TEXT             NOT NULL,
                shares     DOUBLE PRECISION NOT NULL,
                buy_price  DOUBLE PRECISION NOT NULL,
                cost       DOUBLE PRECISION NOT NULL,
                created_at TIMESTAMPTZ      NOT NULL DEFAULT now(),
                PRIMARY KEY (user_id, sk)
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl HoldingStore for PgHoldingStore {
    async fn put(&self, user_id: &str, holding: NewHolding) -> Result<Holding, RepoError> {
        let holding = holding.into_holding(user_id);

        let row = sqlx::query_as::<_, Holding>(
            r#"
            INSERT INTO holdings (user_id, sk, ticker, shares, buy_price, cost)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, sk) DO UPDATE
            SET
                ticker = EXCLUDED.ticker,
                shares = EXCLUDED.shares,
                buy_price = EXCLUDED.buy_price,
                cost = EXCLUDED.cost,
                created_at = now()
            RETURNING user_id, sk, ticker, shares, buy_price, cost, created_at
            "#,
        )
        .bind(&holding.user_id)
        .bind(&holding.sk)
        .bind(&holding.ticker)
        .bind(holding.shares)
        .bind(holding.buy_price)
        .bind(holding.cost)
        .fetch_one(&self.db)
        .await?;

        Ok(row)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Holding>, RepoError> {
        let rows = sqlx::query_as::<_, Holding>(
            r#"
            SELECT user_id, sk, ticker, shares, buy_price, cost, created_at
            FROM holdings
            WHERE user_id = $1
            ORDER BY sk
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }
}

/// Process-local store keyed by `(user_id, sk)`. Lost on restart.
#[derive(Debug, Default)]
pub struct MemoryHoldingStore {
    items: RwLock<HashMap<(String, String), Holding>>,
}

impl MemoryHoldingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HoldingStore for MemoryHoldingStore {
    async fn put(&self, user_id: &str, holding: NewHolding) -> Result<Holding, RepoError> {
        let holding = holding.into_holding(user_id);
        self.items.write().await.insert(
            (holding.user_id.clone(), holding.sk.clone()),
            holding.clone(),
        );
        Ok(holding)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<Holding>, RepoError> {
        let items = self.items.read().await;
        let mut rows: Vec<Holding> = items
            .values()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect();
        // same order as the Postgres query
        rows.sort_by(|a, b| a.sk.cmp(&b.sk));
        Ok(rows)
    }
}
