//! In-process implementation of the trigger state repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::timeline::EventTimeline;
use super::TriggerStateRepository;
use crate::common::errors::Result;
use crate::common::types::{CachedTriggerState, SymbolPair};

/// Trigger snapshots and timelines held behind async locks.
///
/// Every method takes the lock it needs for the whole read-modify-write, so
/// `update_reference_price` and `mark_notified` cannot interleave on a pair.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    triggers: RwLock<HashMap<SymbolPair, CachedTriggerState>>,
    timelines: RwLock<HashMap<SymbolPair, EventTimeline>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of monitored pairs
    pub async fn len(&self) -> usize {
        self.triggers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.triggers.read().await.is_empty()
    }
}

#[async_trait]
impl TriggerStateRepository for InMemoryStateStore {
    async fn get(&self, pair: &SymbolPair) -> Result<Option<CachedTriggerState>> {
        Ok(self.triggers.read().await.get(pair).cloned())
    }

    async fn put(&self, pair: &SymbolPair, state: CachedTriggerState) -> Result<()> {
        debug!(pair = %pair, price = %state.reference_price, "caching trigger state");
        self.triggers.write().await.insert(pair.clone(), state);
        Ok(())
    }

    async fn remove(&self, pair: &SymbolPair) -> Result<bool> {
        let existed = self.triggers.write().await.remove(pair).is_some();
        self.timelines.write().await.remove(pair);
        Ok(existed)
    }

    async fn update_reference_price(&self, pair: &SymbolPair, price: Decimal) -> Result<bool> {
        let mut triggers = self.triggers.write().await;
        match triggers.get_mut(pair) {
            Some(state) => {
                state.reference_price = price;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_notified(&self, pair: &SymbolPair) -> Result<bool> {
        let mut triggers = self.triggers.write().await;
        match triggers.get_mut(pair) {
            Some(state) if !state.is_notified => {
                state.is_notified = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_notified(&self, pair: &SymbolPair) -> Result<()> {
        if let Some(state) = self.triggers.write().await.get_mut(pair) {
            state.is_notified = false;
        }
        Ok(())
    }

    async fn record_event(
        &self,
        pair: &SymbolPair,
        at: DateTime<Utc>,
        sequence: u64,
    ) -> Result<bool> {
        let mut timelines = self.timelines.write().await;
        Ok(timelines
            .entry(pair.clone())
            .or_default()
            .insert(at, sequence))
    }

    async fn count_in_window(
        &self,
        pair: &SymbolPair,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64> {
        let timelines = self.timelines.read().await;
        Ok(timelines
            .get(pair)
            .map(|timeline| timeline.count_in_range(from, to))
            .unwrap_or(0))
    }

    async fn total_count(&self, pair: &SymbolPair) -> Result<u64> {
        let timelines = self.timelines.read().await;
        Ok(timelines.get(pair).map(EventTimeline::len).unwrap_or(0))
    }

    async fn reset_timelines(&self) -> Result<usize> {
        let mut timelines = self.timelines.write().await;
        let cleared = timelines.len();
        timelines.clear();
        Ok(cleared)
    }

    async fn rearm_all(&self) -> Result<usize> {
        let mut triggers = self.triggers.write().await;
        let mut rearmed = 0;
        for state in triggers.values_mut().filter(|state| state.is_notified) {
            state.is_notified = false;
            rearmed += 1;
        }
        Ok(rearmed)
    }

    async fn pairs(&self) -> Result<Vec<SymbolPair>> {
        let mut pairs: Vec<SymbolPair> = self.triggers.read().await.keys().cloned().collect();
        pairs.sort();
        Ok(pairs)
    }
}
