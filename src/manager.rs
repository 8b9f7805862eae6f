//! Trigger manager: the operations exposed to the administrative layer
//!
//! Every mutating call updates the state store before it returns, so an
//! `add_trigger` that succeeded is already evaluated against the next trade.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::common::clock::{Clock, SystemClock};
use crate::common::errors::{DetectorError, Result};
use crate::common::traits::{MarketData, SubscriptionControl};
use crate::common::types::{
    CachedTriggerState, SymbolPair, TriggerDefinition, TriggerParams, TriggerStatus,
};
use crate::notify::templates;
use crate::persistence::TriggerRepository;
use crate::store::TriggerStateRepository;

pub struct TriggerManager {
    triggers: Arc<dyn TriggerRepository>,
    state: Arc<dyn TriggerStateRepository>,
    market: Arc<dyn MarketData>,
    subscriptions: Arc<dyn SubscriptionControl>,
    clock: Arc<dyn Clock>,
}

impl TriggerManager {
    pub fn new(
        triggers: Arc<dyn TriggerRepository>,
        state: Arc<dyn TriggerStateRepository>,
        market: Arc<dyn MarketData>,
        subscriptions: Arc<dyn SubscriptionControl>,
    ) -> Self {
        Self {
            triggers,
            state,
            market,
            subscriptions,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persist, cache and subscribe a new trigger
    #[instrument(skip(self, params), fields(pair = %pair))]
    pub async fn add_trigger(&self, pair: &SymbolPair, params: TriggerParams) -> Result<TriggerStatus> {
        params.validate()?;
        if self.triggers.exists(pair).await? {
            return Err(DetectorError::TriggerExists(pair.clone()));
        }

        // Price first: a trigger that cannot be priced is not created at all
        let price = self.market.get_reference_price(&pair.base).await?;
        let definition = self.triggers.create(pair, &params).await?;
        if let Err(e) = self.activate(&definition, price).await {
            warn!(error = %e, "activation failed, rolling back trigger");
            self.rollback(pair).await;
            return Err(e);
        }

        info!(price = %price, "trigger added");
        self.get_trigger_status(pair).await
    }

    /// Create the definition only if the pair has none. Returns whether it was created.
    pub async fn ensure_trigger(&self, pair: &SymbolPair, params: &TriggerParams) -> Result<bool> {
        params.validate()?;
        if self.triggers.exists(pair).await? {
            return Ok(false);
        }
        match self.triggers.create(pair, params).await {
            Ok(_) => Ok(true),
            Err(DetectorError::TriggerExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Unsubscribe, delete and evict a trigger
    #[instrument(skip(self), fields(pair = %pair))]
    pub async fn remove_trigger(&self, pair: &SymbolPair) -> Result<TriggerDefinition> {
        self.subscriptions.unsubscribe(pair).await?;
        let removed = self.triggers.remove(pair).await?;
        let was_cached = self.state.remove(pair).await?;

        match removed {
            Some(definition) => {
                info!("trigger removed");
                Ok(definition)
            }
            None => {
                if was_cached {
                    warn!("evicted cached state without a stored definition");
                }
                Err(DetectorError::TriggerNotFound(pair.clone()))
            }
        }
    }

    /// Cached state and window counts of one monitored pair
    pub async fn get_trigger_status(&self, pair: &SymbolPair) -> Result<TriggerStatus> {
        let state = self
            .state
            .get(pair)
            .await?
            .ok_or_else(|| DetectorError::TriggerNotFound(pair.clone()))?;
        self.status_of(pair, state).await
    }

    /// Status of every monitored pair, ordered by pair
    pub async fn list_all(&self) -> Result<Vec<TriggerStatus>> {
        let mut statuses = Vec::new();
        for pair in self.state.pairs().await? {
            // Removed between listing and reading
            if let Some(state) = self.state.get(&pair).await? {
                statuses.push(self.status_of(&pair, state).await?);
            }
        }
        Ok(statuses)
    }

    /// Cache and subscribe every persisted trigger. Returns how many were restored.
    pub async fn restore_triggers(&self) -> Result<usize> {
        let definitions = self.triggers.list_active_triggers().await?;
        let total = definitions.len();
        let mut restored = 0;

        for definition in &definitions {
            let pair = &definition.pair;
            let result = async {
                definition.params.validate()?;
                let price = self.market.get_reference_price(&pair.base).await?;
                self.activate(definition, price).await
            }
            .await;

            match result {
                Ok(()) => restored += 1,
                Err(e) => warn!(pair = %pair, error = %e, "failed to restore trigger"),
            }
        }

        info!(restored, total, "triggers restored");
        Ok(restored)
    }

    /// Human-readable report of every monitored trigger
    pub async fn status_report(&self) -> Result<String> {
        Ok(templates::status_report(&self.list_all().await?))
    }

    async fn activate(&self, definition: &TriggerDefinition, price: rust_decimal::Decimal) -> Result<()> {
        let pair = &definition.pair;
        self.state
            .put(pair, CachedTriggerState::new(&definition.params, price))
            .await?;
        self.subscriptions.subscribe(pair).await
    }

    /// Undo a half-finished `add_trigger`; failures are only logged
    async fn rollback(&self, pair: &SymbolPair) {
        if let Err(e) = self.subscriptions.unsubscribe(pair).await {
            warn!(error = %e, "rollback: unsubscribe failed");
        }
        if let Err(e) = self.state.remove(pair).await {
            warn!(error = %e, "rollback: cache eviction failed");
        }
        if let Err(e) = self.triggers.remove(pair).await {
            warn!(error = %e, "rollback: definition removal failed");
        }
    }

    async fn status_of(&self, pair: &SymbolPair, state: CachedTriggerState) -> Result<TriggerStatus> {
        let now = self.clock.now();
        let from = state.window_start(now)?;
        let count_in_period = self.state.count_in_window(pair, from, now).await?;
        let total_count = self.state.total_count(pair).await?;

        Ok(TriggerStatus {
            pair: pair.clone(),
            params: state.params(),
            reference_price: state.reference_price,
            count_in_period,
            total_count,
            is_notified: state.is_notified,
        })
    }
}
