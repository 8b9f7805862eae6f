use async_trait::async_trait;
use tracing::info;

use crate::common::errors::Result;
use crate::common::traits::AlertChannel;

/// Alert channel that writes alerts to the log, used when no bot is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl AlertChannel for LogNotifier {
    async fn send_notification(&self, text: &str) -> Result<()> {
        info!(target: "alerts", "{}", text);
        Ok(())
    }
}
