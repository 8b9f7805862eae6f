//! Domain types shared by the stream, the pipeline and the collaborators

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::{DetectorError, Result};

/// Ordered symbol pair, e.g. `PEPE-USDT`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SymbolPair {
    /// Base asset (the one being traded)
    pub base: String,
    /// Quote asset (the one prices are expressed in)
    pub quote: String,
}

impl SymbolPair {
    /// Create a pair, normalising both symbols to upper case
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Venue topic for the public match feed of this pair
    pub fn match_topic(&self) -> String {
        format!("/market/match:{}", self)
    }
}

impl fmt::Display for SymbolPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for SymbolPair {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once('-') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('-') => {
                Ok(SymbolPair::new(base, quote))
            }
            _ => Err(DetectorError::InvalidTrigger(format!(
                "invalid symbol pair '{}', expected BASE-QUOTE",
                s
            ))),
        }
    }
}

impl TryFrom<String> for SymbolPair {
    type Error = DetectorError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SymbolPair> for String {
    fn from(pair: SymbolPair) -> Self {
        pair.to_string()
    }
}

/// Taker side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

impl FromStr for Side {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            other => Err(DetectorError::MalformedFrame(format!("unknown side '{}'", other))),
        }
    }
}

/// Which trade sides a trigger reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideFilter {
    Buy,
    Sell,
    #[default]
    Both,
}

impl SideFilter {
    /// Whether a trade on `side` passes this filter
    pub fn accepts(&self, side: Side) -> bool {
        match self {
            SideFilter::Buy => side == Side::Buy,
            SideFilter::Sell => side == Side::Sell,
            SideFilter::Both => true,
        }
    }
}

impl fmt::Display for SideFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideFilter::Buy => write!(f, "buy"),
            SideFilter::Sell => write!(f, "sell"),
            SideFilter::Both => write!(f, "both"),
        }
    }
}

impl FromStr for SideFilter {
    type Err = DetectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(SideFilter::Buy),
            "sell" => Ok(SideFilter::Sell),
            "both" | "buy,sell" | "sell,buy" => Ok(SideFilter::Both),
            other => Err(DetectorError::InvalidTrigger(format!(
                "unknown side filter '{}'",
                other
            ))),
        }
    }
}

/// Longest accepted trailing window (one year)
pub const MAX_PERIOD_SECONDS: u64 = 365 * 24 * 60 * 60;

/// User-tunable part of a trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerParams {
    /// Lower bound of the trade value (exclusive)
    pub min_value: Decimal,
    /// Upper bound of the trade value (exclusive)
    pub max_value: Decimal,
    /// Number of matching trades inside the window that fires the alert
    pub max_count: u64,
    /// Side filter
    #[serde(default)]
    pub side: SideFilter,
    /// Length of the trailing window
    pub period_seconds: u64,
}

impl TriggerParams {
    /// Reject parameter sets that can never match or never fire
    pub fn validate(&self) -> Result<()> {
        if self.min_value < Decimal::ZERO {
            return Err(DetectorError::InvalidTrigger(
                "min_value must not be negative".to_string(),
            ));
        }
        if self.min_value >= self.max_value {
            return Err(DetectorError::InvalidTrigger(format!(
                "min_value {} must be lower than max_value {}",
                self.min_value, self.max_value
            )));
        }
        if self.max_count == 0 {
            return Err(DetectorError::InvalidTrigger(
                "max_count must be at least 1".to_string(),
            ));
        }
        if self.period_seconds == 0 || self.period_seconds > MAX_PERIOD_SECONDS {
            return Err(DetectorError::InvalidTrigger(format!(
                "period_seconds must be between 1 and {}, got {}",
                MAX_PERIOD_SECONDS, self.period_seconds
            )));
        }
        Ok(())
    }
}

/// Durable trigger definition owned by the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub pair: SymbolPair,
    #[serde(flatten)]
    pub params: TriggerParams,
    pub created_at: DateTime<Utc>,
}

/// Per-pair snapshot the pipeline works against.
///
/// Its presence in the state store is what makes a pair actively monitored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTriggerState {
    pub reference_price: Decimal,
    pub min_value: Decimal,
    pub max_value: Decimal,
    pub max_count: u64,
    pub side: SideFilter,
    pub period_seconds: u64,
    pub is_notified: bool,
}

impl CachedTriggerState {
    /// Fresh, armed state for a trigger at the given price
    pub fn new(params: &TriggerParams, reference_price: Decimal) -> Self {
        Self {
            reference_price,
            min_value: params.min_value,
            max_value: params.max_value,
            max_count: params.max_count,
            side: params.side,
            period_seconds: params.period_seconds,
            is_notified: false,
        }
    }

    /// Monetary value of a trade of `size` at the cached reference price.
    /// `None` when the product does not fit a `Decimal`.
    pub fn value_of(&self, size: Decimal) -> Option<Decimal> {
        self.reference_price.checked_mul(size)
    }

    /// Lower edge of the trailing window ending at `now`
    pub fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        i64::try_from(self.period_seconds)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .and_then(|period| now.checked_sub_signed(period))
            .ok_or_else(|| {
                DetectorError::InvalidTrigger(format!(
                    "period of {} seconds is out of range",
                    self.period_seconds
                ))
            })
    }

    /// Open interval check: boundary values never match
    pub fn value_in_range(&self, value: Decimal) -> bool {
        self.min_value < value && value < self.max_value
    }

    pub fn params(&self) -> TriggerParams {
        TriggerParams {
            min_value: self.min_value,
            max_value: self.max_value,
            max_count: self.max_count,
            side: self.side,
            period_seconds: self.period_seconds,
        }
    }
}

/// Trade as decoded from the venue stream. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTradeEvent {
    pub pair: SymbolPair,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub trade_time: DateTime<Utc>,
    pub sequence: u64,
}

/// Payload carried by the decoupling queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub symbol: SymbolPair,
    pub side: Side,
    pub size: Decimal,
    #[serde(with = "chrono::serde::ts_nanoseconds")]
    pub trade_time: DateTime<Utc>,
    /// Venue sequence number, used as the timeline member identity
    #[serde(default)]
    pub sequence: u64,
}

impl From<&RawTradeEvent> for QueuedEvent {
    fn from(event: &RawTradeEvent) -> Self {
        Self {
            symbol: event.pair.clone(),
            side: event.side,
            size: event.size,
            trade_time: event.trade_time,
            sequence: event.sequence,
        }
    }
}

/// Snapshot returned to the administrative layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerStatus {
    pub pair: SymbolPair,
    pub params: TriggerParams,
    pub reference_price: Decimal,
    /// Matches inside the trailing window
    pub count_in_period: u64,
    /// Matches since the timeline was last cleared (display only)
    pub total_count: u64,
    pub is_notified: bool,
}

/// Credentials for one streaming session, obtained right before connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamToken {
    pub token: String,
    /// Websocket endpoint the token is valid for
    pub endpoint: String,
    pub ping_interval: std::time::Duration,
    pub ping_timeout: std::time::Duration,
}

/// Connection status of the venue stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Disconnected,
    Connecting,
    /// Session open, (re)subscribing every active pair
    Subscribing,
    Streaming,
    Closing,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::Disconnected => "disconnected",
            StreamState::Connecting => "connecting",
            StreamState::Subscribing => "subscribing",
            StreamState::Streaming => "streaming",
            StreamState::Closing => "closing",
        };
        write!(f, "{}", name)
    }
}
