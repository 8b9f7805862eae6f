use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::TriggerRepository;
use crate::common::errors::{DetectorError, Result};
use crate::common::types::{SymbolPair, TriggerDefinition, TriggerParams};

/// Definitions kept in memory, used when no database is configured
#[derive(Debug, Default)]
pub struct InMemoryTriggerRepository {
    triggers: RwLock<HashMap<SymbolPair, TriggerDefinition>>,
}

impl InMemoryTriggerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TriggerRepository for InMemoryTriggerRepository {
    async fn list_active_triggers(&self) -> Result<Vec<TriggerDefinition>> {
        let mut triggers: Vec<TriggerDefinition> =
            self.triggers.read().await.values().cloned().collect();
        triggers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.pair.cmp(&b.pair)));
        Ok(triggers)
    }

    async fn get(&self, pair: &SymbolPair) -> Result<Option<TriggerDefinition>> {
        Ok(self.triggers.read().await.get(pair).cloned())
    }

    async fn create(&self, pair: &SymbolPair, params: &TriggerParams) -> Result<TriggerDefinition> {
        let mut triggers = self.triggers.write().await;
        if triggers.contains_key(pair) {
            return Err(DetectorError::TriggerExists(pair.clone()));
        }
        let definition = TriggerDefinition {
            pair: pair.clone(),
            params: params.clone(),
            created_at: Utc::now(),
        };
        triggers.insert(pair.clone(), definition.clone());
        Ok(definition)
    }

    async fn remove(&self, pair: &SymbolPair) -> Result<Option<TriggerDefinition>> {
        Ok(self.triggers.write().await.remove(pair))
    }

    async fn exists(&self, pair: &SymbolPair) -> Result<bool> {
        Ok(self.triggers.read().await.contains_key(pair))
    }
}
