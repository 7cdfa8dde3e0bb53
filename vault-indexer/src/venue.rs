//! Read-only client for the perpetuals venue the agent trades on. Used for
//! display sizing only; nothing here feeds feasibility arithmetic.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use vault_types::{VaultError, VaultResult};

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    /// USD per ADA.
    pub price_usd: f64,
    pub long_open_interest: f64,
    pub short_open_interest: f64,
}

impl MarketInfo {
    /// Display conversion of a lovelace amount.
    pub fn lovelace_to_usd(&self, lovelace: u64) -> f64 {
        lovelace as f64 / vault_types::LOVELACE_PER_ADA as f64 * self.price_usd
    }
}

pub struct VenueClient {
    client: Client,
    base_url: String,
}

impl VenueClient {
    pub fn new(base_url: &str, timeout: Duration) -> VaultResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::IndexerUnavailable(format!("venue client init: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn market_info(&self) -> VaultResult<MarketInfo> {
        let url = format!("{}/api/market/info", self.base_url);
        let body: Value = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VaultError::IndexerUnavailable(format!("venue request failed: {e}")))?
            .json()
            .await
            .map_err(|e| VaultError::IndexerUnavailable(format!("venue response: {e}")))?;
        parse_market_info(&body)
    }
}

fn number(body: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match body.get(*k) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

fn parse_market_info(body: &Value) -> VaultResult<MarketInfo> {
    let body = body.get("data").unwrap_or(body);
    let price_usd = number(body, &["price", "currentPrice", "markPrice"])
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| VaultError::Decoding("venue response has no usable price".into()))?;
    Ok(MarketInfo {
        price_usd,
        long_open_interest: number(body, &["longInterest", "longOpenInterest"]).unwrap_or(0.0),
        short_open_interest: number(body, &["shortInterest", "shortOpenInterest"]).unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_and_string_fields() {
        let info = parse_market_info(&json!({
            "data": { "currentPrice": "0.6512", "longInterest": 1200000.0, "shortInterest": 800000 }
        }))
        .unwrap();
        assert_eq!(info.price_usd, 0.6512);
        assert_eq!(info.long_open_interest, 1_200_000.0);
        assert_eq!(info.short_open_interest, 800_000.0);
        assert!((info.lovelace_to_usd(100_000_000) - 65.12).abs() < 1e-9);
    }

    #[test]
    fn missing_price_is_rejected() {
        assert!(parse_market_info(&json!({ "longInterest": 1 })).is_err());
        assert!(parse_market_info(&json!({ "price": 0 })).is_err());
    }
}
