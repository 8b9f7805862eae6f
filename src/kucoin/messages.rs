//! KuCoin-specific message types

use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::common::errors::{DetectorError, Result};
use crate::common::types::{RawTradeEvent, SymbolPair};

/// Topic prefix of the public match (trade) feed
pub const MATCH_TOPIC_PREFIX: &str = "/market/match:";

/// Code KuCoin returns on every successful REST call
pub const SUCCESS_CODE: &str = "200000";

// ============================================================================
// WebSocket outgoing frames
// ============================================================================

/// Subscribe/unsubscribe operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Subscribe,
    Unsubscribe,
}

/// Subscribe/unsubscribe frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsOperationMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub operation: OperationType,
    pub topic: String,
    pub private_channel: bool,
    /// Ask the server for an `ack` frame
    pub response: bool,
}

impl WsOperationMessage {
    pub fn subscribe(pair: &SymbolPair) -> Self {
        Self::new(OperationType::Subscribe, pair)
    }

    pub fn unsubscribe(pair: &SymbolPair) -> Self {
        Self::new(OperationType::Unsubscribe, pair)
    }

    fn new(operation: OperationType, pair: &SymbolPair) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation,
            topic: pair.match_topic(),
            private_channel: false,
            response: true,
        }
    }
}

/// Application-level keepalive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsPingMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub frame_type: String,
}

impl WsPingMessage {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            frame_type: "ping".to_string(),
        }
    }
}

impl Default for WsPingMessage {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// WebSocket incoming frames
// ============================================================================

/// Envelope shared by every frame the server sends
#[derive(Debug, Clone, Deserialize)]
pub struct WsIncomingMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Payload of a `/market/match` message
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchData {
    pub symbol: String,
    pub side: String,
    pub size: Decimal,
    pub price: Decimal,
    /// Trade time in nanoseconds since the epoch
    #[serde(deserialize_with = "string_or_number")]
    pub time: u64,
    #[serde(deserialize_with = "string_or_number")]
    pub sequence: u64,
    #[serde(default)]
    pub trade_id: Option<String>,
}

impl MatchData {
    pub fn into_trade(self) -> Result<RawTradeEvent> {
        let nanos = i64::try_from(self.time).map_err(|_| {
            DetectorError::MalformedFrame(format!("trade time {} out of range", self.time))
        })?;
        Ok(RawTradeEvent {
            pair: self
                .symbol
                .parse()
                .map_err(|_| DetectorError::MalformedFrame(format!("bad symbol '{}'", self.symbol)))?,
            side: self.side.parse()?,
            size: self.size,
            price: self.price,
            trade_time: DateTime::from_timestamp_nanos(nanos),
            sequence: self.sequence,
        })
    }
}

/// A decoded server frame
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Welcome { id: Option<String> },
    Ack { id: Option<String> },
    Pong { id: Option<String> },
    Error { code: Option<String>, message: String },
    Trade(RawTradeEvent),
    /// Anything else the server may send; ignored
    Other(String),
}

/// Decode one text frame
pub fn parse_frame(text: &str) -> Result<StreamFrame> {
    let frame: WsIncomingMessage = serde_json::from_str(text)
        .map_err(|e| DetectorError::MalformedFrame(format!("{}: {}", e, text)))?;

    match frame.frame_type.as_str() {
        "welcome" => Ok(StreamFrame::Welcome { id: frame.id }),
        "ack" => Ok(StreamFrame::Ack { id: frame.id }),
        "pong" => Ok(StreamFrame::Pong { id: frame.id }),
        "error" => Ok(StreamFrame::Error {
            code: frame.code.map(|c| match c {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            message: match frame.data {
                Some(serde_json::Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => String::new(),
            },
        }),
        "message" => {
            let is_match = frame
                .topic
                .as_deref()
                .map(|t| t.starts_with(MATCH_TOPIC_PREFIX))
                .unwrap_or(false);
            if !is_match {
                return Ok(StreamFrame::Other(frame.topic.unwrap_or_default()));
            }
            let data = frame
                .data
                .ok_or_else(|| DetectorError::MalformedFrame("message without data".to_string()))?;
            let data: MatchData = serde_json::from_value(data)
                .map_err(|e| DetectorError::MalformedFrame(e.to_string()))?;
            Ok(StreamFrame::Trade(data.into_trade()?))
        }
        other => Ok(StreamFrame::Other(other.to_string())),
    }
}

/// KuCoin sends some integers as strings
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Raw::Num(n) => Ok(n),
    }
}

// ============================================================================
// REST API Response Types
// ============================================================================

/// Response from POST /api/v1/bullet-public
#[derive(Debug, Clone, Deserialize)]
pub struct BulletResponse {
    pub code: String,
    #[serde(default)]
    pub data: Option<BulletData>,
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletData {
    pub token: String,
    pub instance_servers: Vec<InstanceServer>,
}

/// One websocket endpoint the token can be used with
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceServer {
    pub endpoint: String,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Milliseconds
    pub ping_interval: u64,
    /// Milliseconds
    pub ping_timeout: u64,
}

/// Response from GET /api/v1/market/orderbook/level1
#[derive(Debug, Clone, Deserialize)]
pub struct Level1Response {
    pub code: String,
    #[serde(default)]
    pub data: Option<Level1Data>,
    #[serde(default)]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level1Data {
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub best_bid: Option<Decimal>,
    #[serde(default)]
    pub best_ask: Option<Decimal>,
    #[serde(default)]
    pub time: Option<i64>,
}
