//! REST API client for KuCoin spot market data

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, instrument};

use super::auth::{generate_auth_headers, AuthHeaders};
use super::messages::*;
use crate::common::errors::{DetectorError, Result};
use crate::common::traits::MarketData;
use crate::common::types::StreamToken;
use crate::config::types::{ApiCredentials, KucoinConfig};

const BULLET_PUBLIC_PATH: &str = "/api/v1/bullet-public";
const LEVEL1_PATH: &str = "/api/v1/market/orderbook/level1";

/// REST API client for KuCoin
#[derive(Debug, Clone)]
pub struct KucoinRestClient {
    /// HTTP client
    client: Client,
    /// Base URL for the REST API
    base_url: String,
    /// Currency reference prices are expressed in
    quote_currency: String,
    /// Optional API credentials; requests are signed when present
    credentials: Option<ApiCredentials>,
}

impl KucoinRestClient {
    /// Create a new REST client (unsigned)
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    /// Create a new REST client with custom timeout
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            quote_currency: "USDT".to_string(),
            credentials: None,
        })
    }

    /// Build a client from configuration
    pub fn from_config(config: &KucoinConfig, timeout: Duration) -> Result<Self> {
        let client = Self::with_timeout(&config.rest_url, timeout)?
            .with_quote_currency(&config.quote_currency);
        Ok(match config.credentials() {
            Some(credentials) => client.with_credentials(credentials),
            None => client,
        })
    }

    /// Set API credentials for signed requests
    pub fn with_credentials(mut self, credentials: ApiCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_quote_currency(mut self, quote: &str) -> Self {
        self.quote_currency = quote.to_uppercase();
        self
    }

    pub fn quote_currency(&self) -> &str {
        &self.quote_currency
    }

    /// Generate authentication headers if credentials are set
    fn auth_headers(&self, method: &str, endpoint: &str, body: &str) -> Result<Option<AuthHeaders>> {
        match &self.credentials {
            Some(creds) => Ok(Some(generate_auth_headers(creds, method, endpoint, body)?)),
            None => Ok(None),
        }
    }

    /// Request a public websocket token and the server to use it with
    #[instrument(skip(self))]
    pub async fn get_bullet_public(&self) -> Result<BulletData> {
        let url = format!("{}{}", self.base_url, BULLET_PUBLIC_PATH);
        debug!("Requesting stream token from: {}", url);

        let mut request = self.client.post(&url);
        if let Some(headers) = self.auth_headers("POST", BULLET_PUBLIC_PATH, "")? {
            request = headers.apply_to_request(request);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Authentication(format!(
                "Token endpoint returned status {}: {}",
                status, body
            )));
        }

        let bullet: BulletResponse = response.json().await?;
        if bullet.code != SUCCESS_CODE {
            return Err(DetectorError::Authentication(format!(
                "Token request rejected with code {}: {}",
                bullet.code,
                bullet.msg.unwrap_or_default()
            )));
        }
        bullet
            .data
            .ok_or_else(|| DetectorError::InvalidResponse("Token response without data".to_string()))
    }

    /// Best bid/ask and last price for a trading symbol such as `PEPE-USDT`
    #[instrument(skip(self))]
    pub async fn get_level1(&self, trading_symbol: &str) -> Result<Option<Level1Data>> {
        let endpoint = format!("{}?symbol={}", LEVEL1_PATH, trading_symbol);
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("Fetching level1 from: {}", url);

        let mut request = self.client.get(&url);
        if let Some(headers) = self.auth_headers("GET", &endpoint, "")? {
            request = headers.apply_to_request(request);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::InvalidResponse(format!(
                "Server returned status {}: {}",
                status, body
            )));
        }

        let level1: Level1Response = response.json().await?;
        if level1.code != SUCCESS_CODE {
            return Err(DetectorError::InvalidResponse(format!(
                "Level1 request rejected with code {}: {}",
                level1.code,
                level1.msg.unwrap_or_default()
            )));
        }
        Ok(level1.data)
    }
}

#[async_trait]
impl MarketData for KucoinRestClient {
    #[instrument(skip(self))]
    async fn get_reference_price(&self, symbol: &str) -> Result<Decimal> {
        let symbol = symbol.to_uppercase();
        if symbol == self.quote_currency {
            return Ok(Decimal::ONE);
        }

        let trading_symbol = format!("{}-{}", symbol, self.quote_currency);
        self.get_level1(&trading_symbol)
            .await?
            .and_then(|data| data.price)
            .ok_or(DetectorError::PriceUnavailable(trading_symbol))
    }

    #[instrument(skip(self))]
    async fn get_auth_token(&self) -> Result<StreamToken> {
        let bullet = self.get_bullet_public().await?;
        let server = bullet.instance_servers.into_iter().next().ok_or_else(|| {
            DetectorError::InvalidResponse("Token response lists no instance servers".to_string())
        })?;

        Ok(StreamToken {
            token: bullet.token,
            endpoint: server.endpoint,
            ping_interval: Duration::from_millis(server.ping_interval),
            ping_timeout: Duration::from_millis(server.ping_timeout),
        })
    }
}
