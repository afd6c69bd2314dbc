/*
 * Responsibility
 * - /portfolio の request/response DTO
 * - validate() は形式チェックのみ (正規化は repo 側)
 */
use serde::{Deserialize, Serialize};

use crate::repos::NewHolding;

#[derive(Debug, Deserialize)]
pub struct AddHoldingRequest {
    pub ticker: String,
    pub shares: f64,
    pub buy_price: f64,
    pub date: Option<String>,
}

impl AddHoldingRequest {
    pub fn validate(&self) -> Result<(), (&'static str, &'static str)> {
        if self.ticker.trim().is_empty() {
            return Err(("INVALID_TICKER", "ticker is required"));
        }
        let valid_chars = self
            .ticker
            .trim()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
        if self.ticker.len() > 16 || !valid_chars {
            return Err(("INVALID_TICKER", "ticker must be <= 16 chars of [A-Z0-9.:-]"));
        }
        if !self.shares.is_finite() || self.shares <= 0.0 {
            return Err(("INVALID_SHARES", "shares must be a positive number"));
        }
        if !self.buy_price.is_finite() || self.buy_price < 0.0 {
            return Err(("INVALID_BUY_PRICE", "buy_price must be a non-negative number"));
        }
        if let Some(date) = &self.date
            && date.len() > 32
        {
            return Err(("INVALID_DATE", "date must be <= 32 chars"));
        }
        Ok(())
    }

    pub fn into_new_holding(self) -> NewHolding {
        NewHolding {
            ticker: self.ticker,
            shares: self.shares,
            buy_price: self.buy_price,
            date: self.date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(ticker: &str, shares: f64, buy_price: f64) -> AddHoldingRequest {
        AddHoldingRequest {
            ticker: ticker.to_string(),
            shares,
            buy_price,
            date: None,
        }
    }

    #[test]
    fn accepts_a_plain_holding() {
        assert!(req("aapl", 10.0, 150.0).validate().is_ok());
        assert!(req("BRK.B", 0.5, 0.0).validate().is_ok());
    }

    #[test]
    fn rejects_bad_fields() {
        assert_eq!(req(" ", 1.0, 1.0).validate().unwrap_err().0, "INVALID_TICKER");
        assert_eq!(req("AA PL", 1.0, 1.0).validate().unwrap_err().0, "INVALID_TICKER");
        assert_eq!(req("AAPL", 0.0, 1.0).validate().unwrap_err().0, "INVALID_SHARES");
        assert_eq!(req("AAPL", f64::NAN, 1.0).validate().unwrap_err().0, "INVALID_SHARES");
        assert_eq!(req("AAPL", 1.0, -1.0).validate().unwrap_err().0, "INVALID_BUY_PRICE");
        assert_eq!(
            req("AAPL", 1.0, f64::INFINITY).validate().unwrap_err().0,
            "INVALID_BUY_PRICE"
        );
    }
}
