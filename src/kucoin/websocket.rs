//! WebSocket client for the KuCoin public trade feed
//!
//! One [`KucoinStreamClient`] owns one session at a time and drives it
//! through [`StreamState`]:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribing -> Streaming
//!       ^              |              |            |
//!       +--------------+--------------+------------+   (transport fault, backoff)
//!                                                  |
//!                                     Closing <----+   (shutdown)
//! ```
//!
//! The set of desired pairs lives in the cloneable [`StreamHandle`], so a
//! pair subscribed while the session is down is still streamed once the
//! next session reaches `Subscribing`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::messages::*;
use crate::common::errors::{DetectorError, Result};
use crate::common::traits::{MarketData, SubscriptionControl};
use crate::common::types::{RawTradeEvent, StreamState, StreamToken, SymbolPair};
use crate::config::types::AppSettings;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Reconnect policy of the stream
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound of the exponential backoff
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up (0 = never)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay(),
            max_delay: settings.max_reconnect_delay(),
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Delay before reconnect attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

#[derive(Debug, Clone)]
enum Command {
    Subscribe(SymbolPair),
    Unsubscribe(SymbolPair),
}

/// How a session ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Remote closed or the transport failed after streaming
    Disconnected,
    /// Orderly shutdown, do not reconnect
    Shutdown,
}

/// Cloneable handle used to change the stream's interest and observe its state
#[derive(Clone)]
pub struct StreamHandle {
    desired: Arc<RwLock<BTreeSet<SymbolPair>>>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<StreamState>,
}

impl StreamHandle {
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Pairs the stream (re)subscribes on every session
    pub async fn desired_pairs(&self) -> Vec<SymbolPair> {
        self.desired.read().await.iter().cloned().collect()
    }

    /// Wait until the stream reaches `target`
    pub async fn wait_for_state(&self, target: StreamState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|e| DetectorError::ChannelReceive(e.to_string()))
    }

    fn send(&self, command: Command) {
        // Nothing to tell a stream that is not running; the desired set
        // is replayed when it starts
        if self.commands.send(command).is_err() {
            debug!("stream not running, command kept in desired set only");
        }
    }
}

#[async_trait]
impl SubscriptionControl for StreamHandle {
    async fn subscribe(&self, pair: &SymbolPair) -> Result<()> {
        if self.desired.write().await.insert(pair.clone()) {
            info!(pair = %pair, "subscribing");
            self.send(Command::Subscribe(pair.clone()));
        }
        Ok(())
    }

    async fn unsubscribe(&self, pair: &SymbolPair) -> Result<()> {
        if self.desired.write().await.remove(pair) {
            info!(pair = %pair, "unsubscribing");
            self.send(Command::Unsubscribe(pair.clone()));
        }
        Ok(())
    }
}

/// WebSocket client for the KuCoin match feed
pub struct KucoinStreamClient {
    /// Token source, consulted before every connection attempt
    market: Arc<dyn MarketData>,
    /// Reconnect policy
    policy: ReconnectPolicy,
    /// Pairs to subscribe on every session
    desired: Arc<RwLock<BTreeSet<SymbolPair>>>,
    /// Incremental subscription changes from handles
    commands: mpsc::UnboundedReceiver<Command>,
    /// Published state
    state: watch::Sender<StreamState>,
    handle: StreamHandle,
}

impl KucoinStreamClient {
    /// Create a client and the handle that controls it
    pub fn new(market: Arc<dyn MarketData>, policy: ReconnectPolicy) -> (Self, StreamHandle) {
        let desired = Arc::new(RwLock::new(BTreeSet::new()));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(StreamState::Disconnected);

        let handle = StreamHandle {
            desired: desired.clone(),
            commands: commands_tx,
            state: state_rx,
        };

        let client = Self {
            market,
            policy,
            desired,
            commands: commands_rx,
            state: state_tx,
            handle: handle.clone(),
        };

        (client, handle)
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    fn set_state(&self, state: StreamState) {
        if *self.state.borrow() != state {
            debug!(state = %state, "stream state");
            self.state.send_replace(state);
        }
    }

    /// Run sessions until shutdown, reconnecting with backoff.
    ///
    /// Returns an error only when the reconnect policy gives up.
    #[instrument(skip_all)]
    pub async fn run(
        mut self,
        trades: mpsc::Sender<RawTradeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(StreamState::Connecting);
            match self.run_session(&trades, &mut shutdown, &mut attempt).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Disconnected) => info!("stream session ended"),
                Err(e) => warn!(error = %e, "stream session failed"),
            }
            self.set_state(StreamState::Disconnected);

            attempt += 1;
            if self.policy.exhausted(attempt) {
                error!(attempts = attempt, "giving up on the stream");
                return Err(DetectorError::WebSocketConnection(format!(
                    "no session after {} attempts",
                    attempt
                )));
            }

            let delay = self.policy.delay_for(attempt);
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_state(StreamState::Disconnected);
        info!("stream stopped");
        Ok(())
    }

    async fn run_session(
        &mut self,
        trades: &mpsc::Sender<RawTradeEvent>,
        shutdown: &mut watch::Receiver<bool>,
        attempt: &mut u32,
    ) -> Result<SessionEnd> {
        let token = self.market.get_auth_token().await?;
        let url = connect_url(&token)?;
        info!(endpoint = %token.endpoint, "connecting to KuCoin WebSocket");

        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| DetectorError::WebSocketConnection(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        timeout(token.ping_timeout, wait_for_welcome(&mut read))
            .await
            .map_err(|_| DetectorError::Timeout("no welcome frame".to_string()))??;

        // Subscribing: replay the whole desired set
        self.set_state(StreamState::Subscribing);
        *attempt = 0;
        while self.commands.try_recv().is_ok() {}
        let pairs: Vec<SymbolPair> = self.desired.read().await.iter().cloned().collect();
        for pair in &pairs {
            send_json(&mut write, &WsOperationMessage::subscribe(pair)).await?;
        }
        info!(pairs = pairs.len(), "subscriptions replayed");

        self.set_state(StreamState::Streaming);

        let mut ping = interval(token.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    self.set_state(StreamState::Closing);
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "close frame not sent");
                    }
                    let _ = write.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
                Some(command) = self.commands.recv() => {
                    let frame = match &command {
                        Command::Subscribe(pair) => WsOperationMessage::subscribe(pair),
                        Command::Unsubscribe(pair) => WsOperationMessage::unsubscribe(pair),
                    };
                    send_json(&mut write, &frame).await?;
                }
                _ = ping.tick() => {
                    send_json(&mut write, &WsPingMessage::new()).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !forward_frame(&text, trades) {
                                info!("trade receiver dropped, closing stream");
                                self.set_state(StreamState::Closing);
                                let _ = write.close().await;
                                return Ok(SessionEnd::Shutdown);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed: {:?}", frame);
                            return Ok(SessionEnd::Disconnected);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(DetectorError::WebSocketCommunication(e.to_string()));
                        }
                        None => {
                            info!("WebSocket stream ended");
                            return Ok(SessionEnd::Disconnected);
                        }
                    }
                }
            }
        }
    }
}

/// Tokenised websocket URL for one session
pub fn connect_url(token: &StreamToken) -> Result<Url> {
    let mut url = Url::parse(&token.endpoint)
        .map_err(|e| DetectorError::InvalidResponse(format!("bad endpoint '{}': {}", token.endpoint, e)))?;
    url.query_pairs_mut()
        .append_pair("token", &token.token)
        .append_pair("connectId", &uuid::Uuid::new_v4().to_string());
    Ok(url)
}

async fn send_json<T: serde::Serialize>(write: &mut WsWrite, frame: &T) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    debug!("sending frame: {}", text);
    write.send(Message::Text(text)).await?;
    Ok(())
}

/// Read until the server greets the session
async fn wait_for_welcome(read: &mut WsRead) -> Result<()> {
    while let Some(msg) = read.next().await {
        match msg? {
            Message::Text(text) => match parse_frame(&text) {
                Ok(StreamFrame::Welcome { id }) => {
                    debug!(?id, "session accepted");
                    return Ok(());
                }
                Ok(StreamFrame::Error { code, message }) => {
                    return Err(DetectorError::Authentication(format!(
                        "session rejected ({}): {}",
                        code.unwrap_or_default(),
                        message
                    )));
                }
                Ok(other) => debug!(?other, "frame before welcome ignored"),
                Err(e) => warn!(error = %e, "malformed frame skipped"),
            },
            Message::Close(frame) => {
                return Err(DetectorError::WebSocketConnection(format!(
                    "closed before welcome: {:?}",
                    frame
                )));
            }
            _ => {}
        }
    }
    Err(DetectorError::WebSocketConnection(
        "stream ended before welcome".to_string(),
    ))
}

/// Handle one text frame. Returns `false` once nobody consumes trades.
///
/// Never waits on the evaluator: a trade that finds the channel full is
/// dropped so the session keeps reading and pinging.
fn forward_frame(text: &str, trades: &mpsc::Sender<RawTradeEvent>) -> bool {
    match parse_frame(text) {
        Ok(StreamFrame::Trade(trade)) => match trades.try_send(trade) {
            Ok(()) => true,
            Err(TrySendError::Full(trade)) => {
                warn!(pair = %trade.pair, sequence = trade.sequence, "trade channel full, trade dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        },
        Ok(StreamFrame::Ack { id }) => {
            debug!(?id, "server confirmed");
            true
        }
        Ok(StreamFrame::Pong { .. }) => {
            debug!("received pong");
            true
        }
        Ok(StreamFrame::Error { code, message }) => {
            warn!(?code, %message, "venue error frame");
            true
        }
        Ok(StreamFrame::Welcome { .. }) | Ok(StreamFrame::Other(_)) => true,
        Err(e) => {
            warn!(error = %e, "malformed frame skipped");
            true
        }
    }
}
