//! REST client for the order execution gateway.
//!
//! The gateway owns the on-chain mechanics (order placement, collateral
//! transfers, settlement); this client only speaks its HTTP surface on
//! behalf of one wallet.

use super::traits::ExchangeAdapter;
use super::types::{OrderResult, Position, PositionSide};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Execution gateway client bound to a single wallet.
pub struct GatewayExchange {
    http: Client,
    base_url: String,
    api_key: String,
    wallet_ref: String,
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    positions: Vec<Position>,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

#[derive(Debug, Serialize)]
struct OpenOrderRequest<'a> {
    wallet: &'a str,
    token: &'a str,
    side: PositionSide,
    usd_amount: Decimal,
    leverage: u32,
}

#[derive(Debug, Serialize)]
struct CloseOrderRequest<'a> {
    wallet: &'a str,
    token: &'a str,
}

impl GatewayExchange {
    pub fn new(base_url: &str, api_key: &str, wallet_ref: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            wallet_ref: wallet_ref.to_string(),
        })
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} rejected with HTTP {}: {}", what, status, body);
        }
        Ok(response)
    }
}

#[async_trait]
impl ExchangeAdapter for GatewayExchange {
    #[instrument(skip(self))]
    async fn get_open_positions(&self) -> Result<HashMap<String, Vec<Position>>> {
        let url = format!("{}/positions", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("wallet", self.wallet_ref.as_str())])
            .send()
            .await
            .context("Failed to fetch open positions")?;

        let parsed: PositionsResponse = Self::check(response, "position query")
            .await?
            .json()
            .await
            .context("Failed to parse positions response")?;

        let mut by_token: HashMap<String, Vec<Position>> = HashMap::new();
        for position in parsed.positions {
            by_token.entry(position.token.clone()).or_default().push(position);
        }

        debug!(tokens = by_token.len(), "Fetched open positions");
        Ok(by_token)
    }

    #[instrument(skip(self))]
    async fn open_position(
        &self,
        token: &str,
        side: PositionSide,
        usd_amount: Decimal,
        leverage: u32,
    ) -> Result<OrderResult> {
        let url = format!("{}/orders/open", self.base_url);
        let request = OpenOrderRequest {
            wallet: &self.wallet_ref,
            token,
            side,
            usd_amount,
            leverage,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to submit open order")?;

        Self::check(response, "open order")
            .await?
            .json()
            .await
            .context("Failed to parse open order response")
    }

    #[instrument(skip(self))]
    async fn close_position(&self, token: &str) -> Result<OrderResult> {
        let url = format!("{}/orders/close", self.base_url);
        let request = CloseOrderRequest {
            wallet: &self.wallet_ref,
            token,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to submit close order")?;

        Self::check(response, "close order")
            .await?
            .json()
            .await
            .context("Failed to parse close order response")
    }

    #[instrument(skip(self))]
    async fn get_wallet_balance(&self, asset: &str) -> Result<Decimal> {
        let url = format!("{}/balance", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("wallet", self.wallet_ref.as_str()), ("asset", asset)])
            .send()
            .await
            .context("Failed to fetch wallet balance")?;

        let parsed: BalanceResponse = Self::check(response, "balance query")
            .await?
            .json()
            .await
            .context("Failed to parse balance response")?;

        Ok(parsed.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_positions_grouped_by_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/positions"))
            .and(query_param("wallet", "w1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "positions": [
                    {"token": "ETH", "side": "long", "size_usd": "1000",
                     "entry_price": "2500", "mark_price": "2510"},
                    {"token": "SOL", "side": "short", "size_usd": "400",
                     "entry_price": "150", "mark_price": "149"},
                ]
            })))
            .mount(&server)
            .await;

        let gateway = GatewayExchange::new(&server.uri(), "key", "w1", 5).unwrap();
        let positions = gateway.get_open_positions().await.unwrap();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions["ETH"][0].side, PositionSide::Long);
        assert_eq!(positions["SOL"][0].size_usd, dec!(400));
    }

    #[tokio::test]
    async fn test_open_order_carries_full_notional_and_leverage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/open"))
            .and(body_partial_json(json!({
                "wallet": "w1", "token": "ETH", "side": "long", "leverage": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "order_id": "o-1", "token": "ETH", "side": "long", "usd_amount": "950"
            })))
            .mount(&server)
            .await;

        let gateway = GatewayExchange::new(&server.uri(), "key", "w1", 5).unwrap();
        let result = gateway
            .open_position("ETH", PositionSide::Long, dec!(950), 3)
            .await
            .unwrap();

        assert_eq!(result.order_id, "o-1");
        assert_eq!(result.usd_amount, dec!(950));
    }

    #[tokio::test]
    async fn test_close_without_position_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/close"))
            .respond_with(ResponseTemplate::new(409).set_body_string("no open position"))
            .mount(&server)
            .await;

        let gateway = GatewayExchange::new(&server.uri(), "key", "w1", 5).unwrap();
        let err = gateway.close_position("ETH").await.unwrap_err();
        assert!(err.to_string().contains("409"));
    }
}
