//! Durable trigger definitions
//!
//! The detection core only reads definitions; creation and removal are
//! driven by the trigger manager on behalf of the administrative layer.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::common::errors::Result;
use crate::common::types::{SymbolPair, TriggerDefinition, TriggerParams};

pub use memory::InMemoryTriggerRepository;
pub use postgres::PgTriggerRepository;

#[async_trait]
pub trait TriggerRepository: Send + Sync {
    /// Every active definition, oldest first
    async fn list_active_triggers(&self) -> Result<Vec<TriggerDefinition>>;

    async fn get(&self, pair: &SymbolPair) -> Result<Option<TriggerDefinition>>;

    /// Persist a new definition. Fails with `TriggerExists` if the pair is taken.
    async fn create(&self, pair: &SymbolPair, params: &TriggerParams) -> Result<TriggerDefinition>;

    /// Delete the definition, returning it if there was one
    async fn remove(&self, pair: &SymbolPair) -> Result<Option<TriggerDefinition>>;

    async fn exists(&self, pair: &SymbolPair) -> Result<bool>;
}
