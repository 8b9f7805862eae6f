//! Service wiring: builds the collaborators and runs every loop until shutdown

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::common::channels::create_trade_channel_with_size;
use crate::common::clock::{Clock, SystemClock};
use crate::common::errors::Result;
use crate::common::traits::{AlertChannel, MarketData};
use crate::config::types::{AppConfig, AppSettings, SeedTrigger};
use crate::kucoin::{KucoinRestClient, KucoinStreamClient, ReconnectPolicy, StreamHandle};
use crate::manager::TriggerManager;
use crate::notify::{templates, LogNotifier, TelegramNotifier};
use crate::persistence::{InMemoryTriggerRepository, PgTriggerRepository, TriggerRepository};
use crate::pipeline::{Housekeeper, PriceRefresher, TriggerEvaluator, WindowCounter};
use crate::queue::{EventQueue, InMemoryQueue, PgEventQueue, TRIGGER_EVENTS_QUEUE};
use crate::store::{InMemoryStateStore, TriggerStateRepository};

/// Every long-running part of the detector, ready to run
pub struct DetectorService {
    settings: AppSettings,
    seeds: Vec<SeedTrigger>,
    triggers: Arc<dyn TriggerRepository>,
    state: Arc<dyn TriggerStateRepository>,
    queue: Arc<dyn EventQueue>,
    market: Arc<dyn MarketData>,
    alerts: Arc<dyn AlertChannel>,
    clock: Arc<dyn Clock>,
    stream: KucoinStreamClient,
    stream_handle: StreamHandle,
    manager: Arc<TriggerManager>,
}

impl DetectorService {
    /// Pick implementations from configuration: Postgres when a database is
    /// configured, Telegram when a bot is configured, in-memory and log otherwise.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let settings = config.settings.clone();

        let (triggers, queue): (Arc<dyn TriggerRepository>, Arc<dyn EventQueue>) =
            match &config.database {
                Some(db) => {
                    let pool = PgTriggerRepository::connect(db).await?;
                    let triggers = PgTriggerRepository::new(pool.clone()).await?;
                    let queue = PgEventQueue::new(pool, TRIGGER_EVENTS_QUEUE)
                        .await?
                        .with_poll_interval(db.queue_poll_interval())
                        .with_visibility_timeout(db.queue_visibility_timeout());
                    info!("using Postgres persistence and queue");
                    (Arc::new(triggers), Arc::new(queue))
                }
                None => {
                    info!("no database configured, using in-memory persistence and queue");
                    (
                        Arc::new(InMemoryTriggerRepository::new()),
                        Arc::new(InMemoryQueue::new(TRIGGER_EVENTS_QUEUE)),
                    )
                }
            };

        let alerts: Arc<dyn AlertChannel> = match &config.telegram {
            Some(telegram) => Arc::new(TelegramNotifier::with_timeout(
                telegram,
                settings.request_timeout(),
            )?),
            None => {
                info!("no Telegram bot configured, alerts go to the log");
                Arc::new(LogNotifier)
            }
        };

        let market = Arc::new(KucoinRestClient::from_config(
            &config.kucoin,
            settings.request_timeout(),
        )?);

        Ok(Self::new(
            settings,
            triggers,
            Arc::new(InMemoryStateStore::new()),
            queue,
            market,
            alerts,
        )
        .with_seeds(config.triggers.clone()))
    }

    pub fn new(
        settings: AppSettings,
        triggers: Arc<dyn TriggerRepository>,
        state: Arc<dyn TriggerStateRepository>,
        queue: Arc<dyn EventQueue>,
        market: Arc<dyn MarketData>,
        alerts: Arc<dyn AlertChannel>,
    ) -> Self {
        let (stream, stream_handle) =
            KucoinStreamClient::new(market.clone(), ReconnectPolicy::from_settings(&settings));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let manager = Arc::new(
            TriggerManager::new(
                triggers.clone(),
                state.clone(),
                market.clone(),
                Arc::new(stream_handle.clone()),
            )
            .with_clock(clock.clone()),
        );

        Self {
            settings,
            seeds: Vec::new(),
            triggers,
            state,
            queue,
            market,
            alerts,
            clock,
            stream,
            stream_handle,
            manager,
        }
    }

    /// Triggers to create on startup when absent
    pub fn with_seeds(mut self, seeds: Vec<SeedTrigger>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Manager for the administrative layer
    pub fn manager(&self) -> Arc<TriggerManager> {
        self.manager.clone()
    }

    pub fn stream_handle(&self) -> StreamHandle {
        self.stream_handle.clone()
    }

    /// Restore triggers, start every loop and block until shutdown.
    ///
    /// The queue is closed once every loop has stopped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        for seed in &self.seeds {
            match self.manager.ensure_trigger(&seed.pair, &seed.params).await {
                Ok(true) => info!(pair = %seed.pair, "seed trigger created"),
                Ok(false) => {}
                Err(e) => warn!(pair = %seed.pair, error = %e, "seed trigger rejected"),
            }
        }
        let restored = self.manager.restore_triggers().await?;

        if let Err(e) = self
            .alerts
            .send_notification(&templates::startup_text(restored))
            .await
        {
            warn!(error = %e, "startup notification not delivered");
        }

        let settings = &self.settings;
        let (trades_tx, trades_rx) = create_trade_channel_with_size(settings.channel_size);

        let evaluator = TriggerEvaluator::new(self.state.clone(), self.queue.clone())
            .with_publish_retry(settings.publish_retry_attempts, settings.queue_retry_delay());
        let counter = WindowCounter::new(self.state.clone(), self.alerts.clone())
            .with_clock(self.clock.clone());
        let refresher = PriceRefresher::new(
            self.triggers.clone(),
            self.state.clone(),
            self.market.clone(),
            settings.price_refresh_interval(),
        );
        let housekeeper = Housekeeper::new(
            self.state.clone(),
            self.manager.clone(),
            self.alerts.clone(),
            settings.housekeeping_interval(),
        )
        .with_status_report(settings.send_status_report);

        let mut stream_task = tokio::spawn(self.stream.run(trades_tx, shutdown.clone()));
        let workers: Vec<(&str, JoinHandle<Result<()>>)> = vec![
            ("evaluator", tokio::spawn(evaluator.run(trades_rx, shutdown.clone()))),
            (
                "window counter",
                tokio::spawn(counter.run(
                    self.queue.clone(),
                    settings.queue_retry_delay(),
                    shutdown.clone(),
                )),
            ),
            ("price refresher", tokio::spawn(refresher.run(shutdown.clone()))),
            ("housekeeper", tokio::spawn(housekeeper.run(shutdown.clone()))),
        ];
        info!("detector running");

        // The stream only returns early when its reconnect policy gives up
        let finished_early = tokio::select! {
            _ = shutdown.changed() => None,
            result = &mut stream_task => Some(result),
        };
        let stream_result = match finished_early {
            Some(result) => {
                warn!("stream stopped before shutdown");
                result
            }
            None => stream_task.await,
        };
        match stream_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "stream failed"),
            Err(e) => error!(error = %e, "stream task panicked"),
        }

        for (name, handle) in workers {
            // A worker still waiting on the signal after the stream failed
            if !*shutdown.borrow() {
                handle.abort();
            }
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(task = name, error = %e, "task failed"),
                Err(e) if e.is_cancelled() => info!(task = name, "task cancelled"),
                Err(e) => error!(task = name, error = %e, "task panicked"),
            }
        }

        self.queue.close().await?;
        info!("detector stopped");
        Ok(())
    }
}
