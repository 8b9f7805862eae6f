//! Trigger evaluator: decides which raw trades are of interest
//!
//! Runs on the stream's side of the queue, so it only reads cached state
//! and publishes; everything slower happens behind the queue.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::common::errors::{DetectorError, Result};
use crate::common::types::{QueuedEvent, RawTradeEvent};
use crate::queue::EventQueue;
use crate::store::TriggerStateRepository;

/// What happened to one raw trade
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// No cached state for the pair
    Unmonitored,
    /// Side not accepted by the trigger
    SideFiltered,
    /// Value outside the open interval
    OutOfRange { value: Decimal },
    /// Size times price does not fit a `Decimal`
    ValueOverflow,
    /// Published to the queue
    Matched { value: Decimal, event: QueuedEvent },
}

pub struct TriggerEvaluator {
    state: Arc<dyn TriggerStateRepository>,
    queue: Arc<dyn EventQueue>,
    publish_attempts: u32,
    retry_delay: Duration,
}

impl TriggerEvaluator {
    pub fn new(state: Arc<dyn TriggerStateRepository>, queue: Arc<dyn EventQueue>) -> Self {
        Self {
            state,
            queue,
            publish_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Publish attempts per matching trade and the pause between them
    pub fn with_publish_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.publish_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }

    /// Side and value checks against the cached state, without publishing
    pub async fn evaluate(&self, event: &RawTradeEvent) -> Result<Evaluation> {
        let Some(state) = self.state.get(&event.pair).await? else {
            return Ok(Evaluation::Unmonitored);
        };

        if !state.side.accepts(event.side) {
            return Ok(Evaluation::SideFiltered);
        }

        let Some(value) = state.value_of(event.size) else {
            warn!(pair = %event.pair, size = %event.size, "trade value overflows, skipped");
            return Ok(Evaluation::ValueOverflow);
        };
        if !state.value_in_range(value) {
            return Ok(Evaluation::OutOfRange { value });
        }

        Ok(Evaluation::Matched {
            value,
            event: QueuedEvent::from(event),
        })
    }

    /// Evaluate one trade and publish it when it matches
    #[instrument(skip(self, event), fields(pair = %event.pair, sequence = event.sequence))]
    pub async fn on_raw_trade(&self, event: &RawTradeEvent) -> Result<Evaluation> {
        let evaluation = self.evaluate(event).await?;
        if let Evaluation::Matched { value, event } = &evaluation {
            debug!(side = %event.side, size = %event.size, value = %value, "trade matched");
            self.publish(event).await?;
        }
        Ok(evaluation)
    }

    async fn publish(&self, event: &QueuedEvent) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.queue.publish(event).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < self.publish_attempts => {
                    warn!(attempt, error = %e, "publish failed, retrying");
                    attempt += 1;
                    sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Consume raw trades until shutdown or until the stream goes away
    pub async fn run(
        self,
        mut trades: mpsc::Receiver<RawTradeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("trigger evaluator started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                trade = trades.recv() => {
                    let Some(trade) = trade else {
                        debug!("trade channel closed");
                        break;
                    };
                    if let Err(e) = self.on_raw_trade(&trade).await {
                        match e {
                            DetectorError::QueueUnavailable(_) => {
                                warn!(pair = %trade.pair, error = %e, "matching trade dropped, queue unavailable")
                            }
                            _ => warn!(pair = %trade.pair, error = %e, "failed to evaluate trade"),
                        }
                    }
                }
            }
        }
        info!("trigger evaluator stopped");
        Ok(())
    }
}
