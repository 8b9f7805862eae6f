//! Periodic housekeeping: clear timelines and re-arm every trigger

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use crate::common::errors::Result;
use crate::common::traits::AlertChannel;
use crate::manager::TriggerManager;
use crate::store::TriggerStateRepository;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HousekeepingReport {
    pub timelines_cleared: usize,
    pub rearmed: usize,
}

pub struct Housekeeper {
    state: Arc<dyn TriggerStateRepository>,
    manager: Arc<TriggerManager>,
    alerts: Arc<dyn AlertChannel>,
    interval: Duration,
    send_report: bool,
}

impl Housekeeper {
    pub fn new(
        state: Arc<dyn TriggerStateRepository>,
        manager: Arc<TriggerManager>,
        alerts: Arc<dyn AlertChannel>,
        interval: Duration,
    ) -> Self {
        Self {
            state,
            manager,
            alerts,
            interval,
            send_report: false,
        }
    }

    /// Send the status report before each reset
    pub fn with_status_report(mut self, enabled: bool) -> Self {
        self.send_report = enabled;
        self
    }

    pub async fn run_once(&self) -> Result<HousekeepingReport> {
        if self.send_report {
            // The report shows the counts that are about to be cleared
            match self.manager.status_report().await {
                Ok(report) => {
                    if let Err(e) = self.alerts.send_notification(&report).await {
                        warn!(error = %e, "status report not delivered");
                    }
                }
                Err(e) => warn!(error = %e, "failed to build status report"),
            }
        }

        let timelines_cleared = self.state.reset_timelines().await?;
        let rearmed = self.state.rearm_all().await?;
        Ok(HousekeepingReport {
            timelines_cleared,
            rearmed,
        })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "housekeeper started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => match self.run_once().await {
                    Ok(report) => info!(
                        timelines_cleared = report.timelines_cleared,
                        rearmed = report.rearmed,
                        "housekeeping done"
                    ),
                    Err(e) => warn!(error = %e, "housekeeping failed"),
                },
            }
        }

        info!("housekeeper stopped");
        Ok(())
    }
}
