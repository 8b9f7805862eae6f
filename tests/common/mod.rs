//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use trigger_detector::common::errors::{DetectorError, Result};
use trigger_detector::common::traits::{AlertChannel, MarketData, SubscriptionControl};
use trigger_detector::common::types::{
    Side, SideFilter, StreamToken, SymbolPair, TriggerParams,
};

pub fn pepe() -> SymbolPair {
    SymbolPair::new("PEPE", "USDT")
}

/// min=300, max=1000, max_count=3, period=180
pub fn pepe_params(side: SideFilter) -> TriggerParams {
    TriggerParams {
        min_value: dec!(300),
        max_value: dec!(1000),
        max_count: 3,
        side,
        period_seconds: 180,
    }
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// Collaborator fakes
// ============================================================================

/// Alert channel that keeps every message
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    sent: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingAlerts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Alerts mentioning `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.sent().iter().filter(|text| text.contains(needle)).count()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertChannel for RecordingAlerts {
    async fn send_notification(&self, text: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DetectorError::Notification("channel down".to_string()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Market data with settable prices and an optional stream endpoint
#[derive(Debug, Default)]
pub struct FakeMarketData {
    prices: Mutex<HashMap<String, Decimal>>,
    endpoint: Mutex<Option<String>>,
    token_requests: AtomicUsize,
}

impl FakeMarketData {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_endpoint(&self, endpoint: &str) {
        *self.endpoint.lock().unwrap() = Some(endpoint.to_string());
    }

    pub fn token_requests(&self) -> usize {
        self.token_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketData for FakeMarketData {
    async fn get_reference_price(&self, symbol: &str) -> Result<Decimal> {
        self.prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| DetectorError::PriceUnavailable(symbol.to_string()))
    }

    async fn get_auth_token(&self) -> Result<StreamToken> {
        self.token_requests.fetch_add(1, Ordering::SeqCst);
        let endpoint = self
            .endpoint
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| DetectorError::Authentication("no endpoint".to_string()))?;
        Ok(StreamToken {
            token: "test-token".to_string(),
            endpoint,
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(2),
        })
    }
}

/// Subscription control that records calls
#[derive(Debug, Default)]
pub struct RecordingSubscriptions {
    calls: Mutex<Vec<(String, SymbolPair)>>,
}

impl RecordingSubscriptions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, SymbolPair)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionControl for RecordingSubscriptions {
    async fn subscribe(&self, pair: &SymbolPair) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(("subscribe".to_string(), pair.clone()));
        Ok(())
    }

    async fn unsubscribe(&self, pair: &SymbolPair) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(("unsubscribe".to_string(), pair.clone()));
        Ok(())
    }
}

// ============================================================================
// Fake venue websocket
// ============================================================================

/// What the fake venue does on the current connection
#[derive(Debug, Clone)]
pub enum VenueAction {
    Send(String),
    /// Drop the connection without a close handshake
    Drop,
}

/// Local websocket server speaking enough of the KuCoin protocol:
/// greets with `welcome`, acks operations, answers pings and records
/// every frame it receives, tagged with the connection number.
pub struct FakeVenue {
    pub endpoint: String,
    frames: Arc<Mutex<Vec<(usize, Value)>>>,
    connections: Arc<AtomicUsize>,
    actions: mpsc::UnboundedSender<VenueAction>,
}

impl FakeVenue {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}/", listener.local_addr().unwrap());
        let frames = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let actions_rx = Arc::new(tokio::sync::Mutex::new(actions_rx));

        let frames_srv = frames.clone();
        let connections_srv = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let number = connections_srv.fetch_add(1, Ordering::SeqCst) + 1;
                let frames = frames_srv.clone();
                let actions = actions_rx.clone();
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    serve_connection(number, ws, frames, actions).await;
                });
            }
        });

        Self {
            endpoint,
            frames,
            connections,
            actions: actions_tx,
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn act(&self, action: VenueAction) {
        self.actions.send(action).unwrap();
    }

    /// Topics subscribed on connection `number`
    pub fn subscribed_topics(&self, number: usize) -> Vec<String> {
        self.frames_of_type(number, "subscribe")
    }

    pub fn unsubscribed_topics(&self, number: usize) -> Vec<String> {
        self.frames_of_type(number, "unsubscribe")
    }

    fn frames_of_type(&self, number: usize, frame_type: &str) -> Vec<String> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(conn, frame)| *conn == number && frame["type"] == frame_type)
            .filter_map(|(_, frame)| frame["topic"].as_str().map(str::to_string))
            .collect()
    }
}

async fn serve_connection(
    number: usize,
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    frames: Arc<Mutex<Vec<(usize, Value)>>>,
    actions: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<VenueAction>>>,
) {
    let (mut write, mut read) = ws.split();
    let welcome = json!({"id": format!("conn-{}", number), "type": "welcome"});
    if write.send(Message::Text(welcome.to_string())).await.is_err() {
        return;
    }

    let mut actions = actions.lock().await;
    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<Value>(&text) else { continue };
                    let reply = match frame["type"].as_str() {
                        Some("ping") => Some(json!({"id": frame["id"], "type": "pong"})),
                        Some("subscribe") | Some("unsubscribe") => {
                            Some(json!({"id": frame["id"], "type": "ack"}))
                        }
                        _ => None,
                    };
                    frames.lock().unwrap().push((number, frame));
                    if let Some(reply) = reply {
                        if write.send(Message::Text(reply.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
            action = actions.recv() => match action {
                Some(VenueAction::Send(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                Some(VenueAction::Drop) | None => return,
            },
        }
    }
}

/// A `/market/match` message frame
pub fn match_frame(pair: &SymbolPair, side: Side, size: Decimal, sequence: u64) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    json!({
        "type": "message",
        "topic": pair.match_topic(),
        "subject": "trade.l3match",
        "data": {
            "sequence": sequence.to_string(),
            "type": "match",
            "symbol": pair.to_string(),
            "side": side.to_string(),
            "price": "0.00000184",
            "size": size.to_string(),
            "tradeId": format!("trade-{}", sequence),
            "time": nanos.to_string(),
        }
    })
    .to_string()
}
