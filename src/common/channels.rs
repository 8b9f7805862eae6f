//! Channel type definitions for inter-task communication

use tokio::sync::{mpsc, watch};

use super::types::RawTradeEvent;

/// Create a new raw trade channel with a custom buffer size
pub fn create_trade_channel_with_size(
    size: usize,
) -> (mpsc::Sender<RawTradeEvent>, mpsc::Receiver<RawTradeEvent>) {
    mpsc::channel(size)
}

/// Shutdown signal shared by every loop; flips to `true` once
pub fn create_shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}
