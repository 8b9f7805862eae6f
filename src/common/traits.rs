//! Interfaces of the collaborators the detection pipeline talks to

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::errors::Result;
use super::types::{StreamToken, SymbolPair};

/// Market data collaborator (venue REST API)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Latest price of `symbol` expressed in the configured quote currency
    async fn get_reference_price(&self, symbol: &str) -> Result<Decimal>;

    /// One-shot token request that must precede every stream connection
    async fn get_auth_token(&self) -> Result<StreamToken>;
}

/// Outbound alert channel (messaging bot, log, ...)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send_notification(&self, text: &str) -> Result<()>;
}

/// Server-side interest management on the venue stream.
///
/// Implementations must remember the desired set so it can be replayed
/// after a reconnect.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionControl: Send + Sync {
    async fn subscribe(&self, pair: &SymbolPair) -> Result<()>;

    async fn unsubscribe(&self, pair: &SymbolPair) -> Result<()>;
}
