//! Trigger state repository
//!
//! Key-value snapshots of every actively monitored trigger plus one
//! [`EventTimeline`] per pair. The repository is injected into every loop
//! that reads or writes trigger state:
//!
//! | loop            | access                                   |
//! |-----------------|------------------------------------------|
//! | evaluator       | `get`                                    |
//! | window counter  | `get`, `record_event`, `count_in_window`, `mark_notified` |
//! | price refresher | `update_reference_price`                 |
//! | housekeeper     | `reset_timelines`, `rearm_all`           |
//! | trigger manager | `put`, `remove`, `get`, counts           |

mod memory;
mod timeline;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::common::errors::Result;
use crate::common::types::{CachedTriggerState, SymbolPair};

pub use memory::InMemoryStateStore;
pub use timeline::EventTimeline;

#[async_trait]
pub trait TriggerStateRepository: Send + Sync {
    /// Snapshot for `pair`; `None` means the pair is not monitored
    async fn get(&self, pair: &SymbolPair) -> Result<Option<CachedTriggerState>>;

    /// Create or overwrite the snapshot for `pair`
    async fn put(&self, pair: &SymbolPair, state: CachedTriggerState) -> Result<()>;

    /// Drop the snapshot and the timeline of `pair`. Returns whether a snapshot existed.
    async fn remove(&self, pair: &SymbolPair) -> Result<bool>;

    /// Last-write-wins update of the price, other fields untouched.
    /// Returns `false` when the pair is not monitored.
    async fn update_reference_price(&self, pair: &SymbolPair, price: Decimal) -> Result<bool>;

    /// Atomically flip `is_notified` from `false` to `true`.
    /// Returns `true` only for the caller that performed the flip.
    async fn mark_notified(&self, pair: &SymbolPair) -> Result<bool>;

    /// Re-arm a single pair
    async fn clear_notified(&self, pair: &SymbolPair) -> Result<()>;

    /// Add a member to the pair's timeline. Returns `false` when the
    /// sequence was already recorded, whatever its timestamp.
    async fn record_event(&self, pair: &SymbolPair, at: DateTime<Utc>, sequence: u64)
        -> Result<bool>;

    /// Members with `from <= timestamp <= to`
    async fn count_in_window(
        &self,
        pair: &SymbolPair,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64>;

    /// Cardinality of the pair's timeline
    async fn total_count(&self, pair: &SymbolPair) -> Result<u64>;

    /// Clear every timeline. Returns the number of timelines cleared.
    async fn reset_timelines(&self) -> Result<usize>;

    /// Set `is_notified = false` on every snapshot. Returns the number re-armed.
    async fn rearm_all(&self) -> Result<usize>;

    /// Every monitored pair
    async fn pairs(&self) -> Result<Vec<SymbolPair>>;
}
