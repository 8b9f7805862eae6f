//! Periodic reference price refresh

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::common::errors::Result;
use crate::common::traits::MarketData;
use crate::persistence::TriggerRepository;
use crate::store::TriggerStateRepository;

/// Outcome of one refresh cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub updated: usize,
    /// Price fetch or write failed
    pub failed: usize,
    /// Defined but not currently cached
    pub skipped: usize,
}

pub struct PriceRefresher {
    triggers: Arc<dyn TriggerRepository>,
    state: Arc<dyn TriggerStateRepository>,
    market: Arc<dyn MarketData>,
    interval: Duration,
}

impl PriceRefresher {
    pub fn new(
        triggers: Arc<dyn TriggerRepository>,
        state: Arc<dyn TriggerStateRepository>,
        market: Arc<dyn MarketData>,
        interval: Duration,
    ) -> Self {
        Self {
            triggers,
            state,
            market,
            interval,
        }
    }

    /// Refresh every active trigger once. A single pair's failure is logged
    /// and counted; only failing to list the triggers fails the cycle.
    pub async fn refresh_once(&self) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();

        for definition in self.triggers.list_active_triggers().await? {
            let pair = &definition.pair;
            let price = match self.market.get_reference_price(&pair.base).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(pair = %pair, error = %e, "price refresh failed");
                    report.failed += 1;
                    continue;
                }
            };

            match self.state.update_reference_price(pair, price).await {
                Ok(true) => {
                    debug!(pair = %pair, price = %price, "reference price updated");
                    report.updated += 1;
                }
                Ok(false) => {
                    debug!(pair = %pair, "trigger not cached, price not stored");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(pair = %pair, error = %e, "failed to store price");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Refresh on a fixed interval until shutdown. The first cycle runs one
    /// interval after start, prices having just been fetched by the restore.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "price refresher started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => match self.refresh_once().await {
                    Ok(report) => info!(
                        updated = report.updated,
                        failed = report.failed,
                        skipped = report.skipped,
                        "prices refreshed"
                    ),
                    Err(e) => warn!(error = %e, "price refresh cycle failed, retrying next interval"),
                },
            }
        }

        info!("price refresher stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::DetectorError;
    use crate::common::traits::MockMarketData;
    use crate::common::types::{CachedTriggerState, SideFilter, SymbolPair, TriggerParams};
    use crate::persistence::InMemoryTriggerRepository;
    use crate::store::InMemoryStateStore;
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    fn params() -> TriggerParams {
        TriggerParams {
            min_value: dec!(300),
            max_value: dec!(1000),
            max_count: 3,
            side: SideFilter::Both,
            period_seconds: 180,
        }
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_cycle() {
        let triggers = Arc::new(InMemoryTriggerRepository::new());
        let state = Arc::new(InMemoryStateStore::new());
        let pepe = SymbolPair::new("PEPE", "USDT");
        let doge = SymbolPair::new("DOGE", "USDT");
        let shib = SymbolPair::new("SHIB", "USDT");
        for pair in [&pepe, &doge, &shib] {
            triggers.create(pair, &params()).await.unwrap();
        }
        state.put(&pepe, CachedTriggerState::new(&params(), dec!(1))).await.unwrap();
        state.put(&doge, CachedTriggerState::new(&params(), dec!(1))).await.unwrap();

        let mut market = MockMarketData::new();
        market
            .expect_get_reference_price()
            .with(eq("PEPE"))
            .returning(|_| Ok(dec!(0.0000019)));
        market
            .expect_get_reference_price()
            .with(eq("DOGE"))
            .returning(|s| Err(DetectorError::PriceUnavailable(s.to_string())));
        market
            .expect_get_reference_price()
            .with(eq("SHIB"))
            .returning(|_| Ok(dec!(0.00001)));

        let refresher = PriceRefresher::new(
            triggers,
            state.clone(),
            Arc::new(market),
            Duration::from_secs(300),
        );
        let report = refresher.refresh_once().await.unwrap();

        assert_eq!(
            report,
            RefreshReport {
                updated: 1,
                failed: 1,
                skipped: 1
            }
        );
        let cached = state.get(&pepe).await.unwrap().unwrap();
        assert_eq!(cached.reference_price, dec!(0.0000019));
        assert_eq!(cached.params(), params());
        assert_eq!(state.get(&doge).await.unwrap().unwrap().reference_price, dec!(1));
    }
}
