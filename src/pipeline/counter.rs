//! Window counter and notifier
//!
//! Consumes the queue, records each event in the pair's timeline and raises
//! exactly one alert per crossing of `max_count`.
//!
//! Firing is guarded twice: a per-pair lock serialises record, count and
//! check for one pair, and `mark_notified` is a compare-and-set in the state
//! repository, so only one caller can win the flag even across counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::common::clock::{Clock, SystemClock};
use crate::common::errors::Result;
use crate::common::traits::AlertChannel;
use crate::common::types::{QueuedEvent, SymbolPair};
use crate::notify::templates;
use crate::queue::{Delivery, EventQueue};
use crate::store::TriggerStateRepository;

/// What happened to one queued event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    /// The trigger was removed after the event was published
    TriggerGone,
    /// The trigger's side filter changed after the event was published
    SideFiltered,
    /// Recorded, threshold not reached
    Counted { count: u64 },
    /// Threshold reached and the alert was delivered
    Fired { count: u64 },
    /// Threshold reached but this crossing was already alerted
    AlreadyNotified { count: u64 },
}

pub struct WindowCounter {
    state: Arc<dyn TriggerStateRepository>,
    alerts: Arc<dyn AlertChannel>,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<SymbolPair, Arc<Mutex<()>>>>,
}

impl WindowCounter {
    pub fn new(state: Arc<dyn TriggerStateRepository>, alerts: Arc<dyn AlertChannel>) -> Self {
        Self {
            state,
            alerts,
            clock: Arc::new(SystemClock),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    async fn pair_lock(&self, pair: &SymbolPair) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(pair.clone())
            .or_default()
            .clone()
    }

    /// Record one event and fire if this is the crossing.
    ///
    /// An error means the event must be redelivered; if it happened while
    /// sending the alert, the notified flag has already been released.
    #[instrument(skip(self, event), fields(pair = %event.symbol, sequence = event.sequence))]
    pub async fn on_queued_event(&self, event: &QueuedEvent) -> Result<CounterOutcome> {
        let pair = &event.symbol;
        let lock = self.pair_lock(pair).await;
        let _guard = lock.lock().await;

        // The state may have changed since the evaluator looked at it
        let Some(state) = self.state.get(pair).await? else {
            debug!("trigger no longer exists, event dropped");
            return Ok(CounterOutcome::TriggerGone);
        };
        if !state.side.accepts(event.side) {
            return Ok(CounterOutcome::SideFiltered);
        }

        let now = self.clock.now();
        let at = event.trade_time.min(now);
        if !self.state.record_event(pair, at, event.sequence).await? {
            debug!("event already recorded");
        }

        let from = state.window_start(now)?;
        let count = self.state.count_in_window(pair, from, now).await?;

        if count != state.max_count {
            return Ok(CounterOutcome::Counted { count });
        }
        if state.is_notified || !self.state.mark_notified(pair).await? {
            return Ok(CounterOutcome::AlreadyNotified { count });
        }

        let text = templates::alert_text(pair, &state, count);
        if let Err(e) = self.alerts.send_notification(&text).await {
            warn!(error = %e, "alert delivery failed, re-arming for redelivery");
            self.state.clear_notified(pair).await?;
            return Err(e);
        }

        info!(count, "trigger fired");
        Ok(CounterOutcome::Fired { count })
    }

    /// Process one delivery and settle it with the queue
    pub async fn handle_delivery(&self, queue: &dyn EventQueue, delivery: Delivery) {
        let event = match delivery.decode() {
            Ok(event) => event,
            Err(e) => {
                warn!(tag = delivery.tag, error = %e, "undecodable payload dropped");
                if let Err(e) = queue.ack(delivery.tag).await {
                    warn!(tag = delivery.tag, error = %e, "ack failed");
                }
                return;
            }
        };

        if delivery.redelivered {
            debug!(tag = delivery.tag, pair = %event.symbol, "processing redelivered event");
        }

        let settled = match self.on_queued_event(&event).await {
            Ok(_) => queue.ack(delivery.tag).await,
            Err(e) if e.is_retryable() => {
                warn!(pair = %event.symbol, error = %e, "event processing failed, requeueing");
                queue.nack(delivery.tag).await
            }
            Err(e) => {
                error!(pair = %event.symbol, error = %e, "event cannot be processed, dropped");
                queue.ack(delivery.tag).await
            }
        };
        if let Err(e) = settled {
            warn!(tag = delivery.tag, error = %e, "failed to settle delivery");
        }
    }

    /// Consume the queue until shutdown
    pub async fn run(
        self,
        queue: Arc<dyn EventQueue>,
        retry_delay: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("window counter started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                delivery = queue.next_delivery() => match delivery {
                    Ok(delivery) => self.handle_delivery(queue.as_ref(), delivery).await,
                    Err(e) => {
                        warn!(error = %e, "queue unavailable, retrying");
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = sleep(retry_delay) => {}
                        }
                    }
                },
            }
        }
        info!("window counter stopped");
        Ok(())
    }
}
