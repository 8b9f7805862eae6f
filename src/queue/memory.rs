//! In-process acknowledgement-based queue

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use super::{encode, Delivery, EventQueue};
use crate::common::errors::{DetectorError, Result};
use crate::common::types::QueuedEvent;

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    in_flight: HashMap<u64, Delivery>,
    next_tag: u64,
    closed: bool,
}

/// FIFO queue with explicit acknowledgements and prefetch of one.
///
/// `next_delivery` does not hand out a new message while another one is in
/// flight, which keeps the single consumer stream strictly ordered.
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Messages waiting to be delivered
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages delivered but not acknowledged
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    fn unavailable(&self) -> DetectorError {
        DetectorError::QueueUnavailable(format!("queue '{}' is closed", self.name))
    }
}

#[async_trait]
impl EventQueue for InMemoryQueue {
    async fn publish(&self, event: &QueuedEvent) -> Result<()> {
        let payload = encode(event)?;
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(self.unavailable());
            }
            state.next_tag += 1;
            let tag = state.next_tag;
            state.ready.push_back(Delivery {
                tag,
                payload,
                redelivered: false,
            });
            debug!(queue = %self.name, tag, pair = %event.symbol, "published event");
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn next_delivery(&self) -> Result<Delivery> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(self.unavailable());
                }
                if state.in_flight.is_empty() {
                    if let Some(delivery) = state.ready.pop_front() {
                        state.in_flight.insert(delivery.tag, delivery.clone());
                        return Ok(delivery);
                    }
                }
            }

            notified.await;
        }
    }

    async fn ack(&self, tag: u64) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.in_flight.remove(&tag).is_none() {
                warn!(queue = %self.name, tag, "ack for unknown delivery tag");
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn nack(&self, tag: u64) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match state.in_flight.remove(&tag) {
                Some(mut delivery) => {
                    delivery.redelivered = true;
                    state.ready.push_front(delivery);
                }
                None => warn!(queue = %self.name, tag, "nack for unknown delivery tag"),
            }
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.closed {
            state.closed = true;
            // Unacknowledged work goes back so nothing is lost if the queue is inspected later
            let mut in_flight: Vec<Delivery> = state.in_flight.drain().map(|(_, d)| d).collect();
            in_flight.sort_by_key(|delivery| std::cmp::Reverse(delivery.tag));
            for mut delivery in in_flight {
                delivery.redelivered = true;
                state.ready.push_front(delivery);
            }
            warn!(queue = %self.name, pending = state.ready.len(), "queue closed");
        }
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }
}
