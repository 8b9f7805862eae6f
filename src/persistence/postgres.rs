//! sqlx/Postgres trigger persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::TriggerRepository;
use crate::common::errors::{DetectorError, Result};
use crate::common::types::{SymbolPair, TriggerDefinition, TriggerParams};
use crate::config::types::DatabaseConfig;

pub struct PgTriggerRepository {
    pool: PgPool,
}

impl PgTriggerRepository {
    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect(&config.url)
            .await?;
        Ok(pool)
    }

    /// Wrap a pool and make sure the schema exists
    pub async fn new(pool: PgPool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS triggers (
                id BIGSERIAL PRIMARY KEY,
                from_symbol TEXT NOT NULL,
                to_symbol TEXT NOT NULL,
                min_value NUMERIC NOT NULL,
                max_value NUMERIC NOT NULL,
                max_count BIGINT NOT NULL,
                side TEXT NOT NULL DEFAULT 'both',
                period_seconds BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (from_symbol, to_symbol)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        info!("trigger table ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn definition_from_row(row: &PgRow) -> Result<TriggerDefinition> {
    let from_symbol: String = row.try_get("from_symbol")?;
    let to_symbol: String = row.try_get("to_symbol")?;
    let side: String = row.try_get("side")?;
    let max_count: i64 = row.try_get("max_count")?;
    let period_seconds: i64 = row.try_get("period_seconds")?;
    let min_value: Decimal = row.try_get("min_value")?;
    let max_value: Decimal = row.try_get("max_value")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(TriggerDefinition {
        pair: SymbolPair::new(from_symbol, to_symbol),
        params: TriggerParams {
            min_value,
            max_value,
            max_count: u64::try_from(max_count)
                .map_err(|_| DetectorError::Internal(format!("negative max_count {}", max_count)))?,
            side: side.parse()?,
            period_seconds: u64::try_from(period_seconds).map_err(|_| {
                DetectorError::Internal(format!("negative period_seconds {}", period_seconds))
            })?,
        },
        created_at,
    })
}

const SELECT_COLUMNS: &str = "SELECT from_symbol, to_symbol, min_value, max_value, max_count, side, period_seconds, created_at FROM triggers";

#[async_trait]
impl TriggerRepository for PgTriggerRepository {
    #[instrument(skip(self))]
    async fn list_active_triggers(&self) -> Result<Vec<TriggerDefinition>> {
        let rows = sqlx::query(&format!("{} ORDER BY id", SELECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(definition_from_row).collect()
    }

    async fn get(&self, pair: &SymbolPair) -> Result<Option<TriggerDefinition>> {
        let row = sqlx::query(&format!(
            "{} WHERE from_symbol = $1 AND to_symbol = $2",
            SELECT_COLUMNS
        ))
        .bind(&pair.base)
        .bind(&pair.quote)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(definition_from_row).transpose()
    }

    #[instrument(skip(self, params), fields(pair = %pair))]
    async fn create(&self, pair: &SymbolPair, params: &TriggerParams) -> Result<TriggerDefinition> {
        let row = sqlx::query(
            r#"
            INSERT INTO triggers (from_symbol, to_symbol, min_value, max_value, max_count, side, period_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (from_symbol, to_symbol) DO NOTHING
            RETURNING from_symbol, to_symbol, min_value, max_value, max_count, side, period_seconds, created_at
            "#,
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .bind(params.min_value)
        .bind(params.max_value)
        .bind(params.max_count as i64)
        .bind(params.side.to_string())
        .bind(params.period_seconds as i64)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                debug!("trigger persisted");
                definition_from_row(&row)
            }
            None => Err(DetectorError::TriggerExists(pair.clone())),
        }
    }

    #[instrument(skip(self), fields(pair = %pair))]
    async fn remove(&self, pair: &SymbolPair) -> Result<Option<TriggerDefinition>> {
        let row = sqlx::query(
            r#"
            DELETE FROM triggers WHERE from_symbol = $1 AND to_symbol = $2
            RETURNING from_symbol, to_symbol, min_value, max_value, max_count, side, period_seconds, created_at
            "#,
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(definition_from_row).transpose()
    }

    async fn exists(&self, pair: &SymbolPair) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM triggers WHERE from_symbol = $1 AND to_symbol = $2)",
        )
        .bind(&pair.base)
        .bind(&pair.quote)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
