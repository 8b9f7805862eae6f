//! TriggerDetector Library
//!
//! Watches the KuCoin public trade stream and raises one de-duplicated alert
//! whenever trading on a symbol pair matches a trigger: a value range, a side
//! filter and a number of occurrences inside a sliding time window.

pub mod common;
pub mod config;
pub mod kucoin;
pub mod manager;
pub mod notify;
pub mod persistence;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use common::errors::{DetectorError, Result};
pub use common::types::{
    CachedTriggerState, QueuedEvent, RawTradeEvent, Side, SideFilter, StreamState, SymbolPair,
    TriggerDefinition, TriggerParams, TriggerStatus,
};
pub use config::types::AppConfig;
pub use kucoin::{KucoinRestClient, KucoinStreamClient, StreamHandle};
pub use manager::TriggerManager;
pub use service::DetectorService;
