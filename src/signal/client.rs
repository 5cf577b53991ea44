//! HTTP client for the signal API.

use super::types::{sort_batch, Signal};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

/// Source of directional trading signals for a token.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Recent signals for `token`, sorted ascending by prediction time.
    async fn get_signals(&self, token: &str) -> Result<Vec<Signal>>;
}

/// Typed failure of a signal API request, kept distinguishable from generic
/// transport errors so callers can tell a rejected request from a dead host.
#[derive(Debug, Error)]
pub enum SignalApiError {
    #[error("signal API returned HTTP {status}")]
    Status { status: reqwest::StatusCode },
    #[error("signal API request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// REST client for the signal API.
pub struct HttpSignalProvider {
    http: Client,
    base_url: String,
    api_password: String,
}

impl HttpSignalProvider {
    pub fn new(base_url: &str, api_password: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_password: api_password.to_string(),
        })
    }
}

#[async_trait]
impl SignalProvider for HttpSignalProvider {
    #[instrument(skip(self))]
    async fn get_signals(&self, token: &str) -> Result<Vec<Signal>> {
        let url = format!("{}/signal", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("pwd", self.api_password.as_str())])
            .send()
            .await
            .map_err(SignalApiError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalApiError::Status { status }.into());
        }

        let mut signals: Vec<Signal> = response
            .json()
            .await
            .context("Failed to parse signal response")?;

        signals.retain(|s| s.symbol == token);
        sort_batch(&mut signals);

        debug!(%token, count = signals.len(), "Fetched signal batch");
        Ok(signals)
    }
}
