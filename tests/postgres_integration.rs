//! Postgres trigger repository and durable queue against a live database
//!
//! Runs only when `DATABASE_URL` points at a scratch Postgres; every test
//! works on its own pairs and queue names so runs never collide.

use chrono::Utc;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPool;
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::assert_ok;
use uuid::Uuid;

use trigger_detector::common::errors::DetectorError;
use trigger_detector::common::types::{QueuedEvent, Side, SideFilter, SymbolPair, TriggerParams};
use trigger_detector::config::types::DatabaseConfig;
use trigger_detector::persistence::{PgTriggerRepository, TriggerRepository};
use trigger_detector::queue::{EventQueue, PgEventQueue};

async fn pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let config = DatabaseConfig {
        url,
        max_connections: 4,
        connection_timeout_seconds: 10,
        queue_poll_interval_ms: 20,
        queue_visibility_timeout_seconds: 300,
    };
    Some(PgTriggerRepository::connect(&config).await.unwrap())
}

fn unique_pair() -> SymbolPair {
    let tag = Uuid::new_v4().simple().to_string();
    SymbolPair::new(format!("T{}", &tag[..12]), "USDT")
}

fn params() -> TriggerParams {
    TriggerParams {
        min_value: dec!(300.5),
        max_value: dec!(1000),
        max_count: 3,
        side: SideFilter::Sell,
        period_seconds: 180,
    }
}

fn event(pair: &SymbolPair, sequence: u64) -> QueuedEvent {
    QueuedEvent {
        symbol: pair.clone(),
        side: Side::Buy,
        size: dec!(250000000),
        trade_time: Utc::now(),
        sequence,
    }
}

async fn queue(pool: &PgPool) -> PgEventQueue {
    PgEventQueue::new(pool.clone(), format!("test-{}", Uuid::new_v4()))
        .await
        .unwrap()
        .with_poll_interval(Duration::from_millis(20))
}

// ============================================================================
// Trigger repository
// ============================================================================

#[tokio::test]
async fn test_trigger_lifecycle() {
    let Some(pool) = pool().await else { return };
    let repo = PgTriggerRepository::new(pool).await.unwrap();
    let pair = unique_pair();

    assert!(!repo.exists(&pair).await.unwrap());
    let created = assert_ok!(repo.create(&pair, &params()).await);
    assert_eq!(created.pair, pair);
    assert_eq!(created.params, params());

    assert!(repo.exists(&pair).await.unwrap());
    let stored = repo.get(&pair).await.unwrap().unwrap();
    assert_eq!(stored.params, params());
    assert!(repo
        .list_active_triggers()
        .await
        .unwrap()
        .iter()
        .any(|d| d.pair == pair));

    let removed = repo.remove(&pair).await.unwrap();
    assert_eq!(removed.map(|d| d.pair), Some(pair.clone()));
    assert!(!repo.exists(&pair).await.unwrap());
    assert!(repo.remove(&pair).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_pair_is_rejected() {
    let Some(pool) = pool().await else { return };
    let repo = PgTriggerRepository::new(pool).await.unwrap();
    let pair = unique_pair();

    repo.create(&pair, &params()).await.unwrap();
    let result = repo.create(&pair, &params()).await;
    assert!(matches!(result, Err(DetectorError::TriggerExists(p)) if p == pair));

    repo.remove(&pair).await.unwrap();
}

// ============================================================================
// Durable queue
// ============================================================================

#[tokio::test]
async fn test_ack_removes_and_nack_redelivers() {
    let Some(pool) = pool().await else { return };
    let queue = queue(&pool).await;
    let pair = unique_pair();

    queue.publish(&event(&pair, 1)).await.unwrap();
    queue.publish(&event(&pair, 2)).await.unwrap();

    let first = queue.next_delivery().await.unwrap();
    assert_eq!(first.decode().unwrap().sequence, 1);
    assert!(!first.redelivered);
    queue.nack(first.tag).await.unwrap();

    // Returned to the head, flagged as seen before
    let again = queue.next_delivery().await.unwrap();
    assert_eq!(again.tag, first.tag);
    assert!(again.redelivered);
    queue.ack(again.tag).await.unwrap();

    let second = queue.next_delivery().await.unwrap();
    assert_eq!(second.decode().unwrap().sequence, 2);
    queue.ack(second.tag).await.unwrap();

    // Nothing left to claim
    assert!(timeout(Duration::from_millis(200), queue.next_delivery())
        .await
        .is_err());
}

#[tokio::test]
async fn test_abandoned_claim_is_redelivered() {
    let Some(pool) = pool().await else { return };
    let queue = queue(&pool)
        .await
        .with_visibility_timeout(Duration::from_millis(300));
    let pair = unique_pair();

    queue.publish(&event(&pair, 7)).await.unwrap();
    let claimed = queue.next_delivery().await.unwrap();

    // Never acknowledged, so it comes back once the claim expires
    let reclaimed = timeout(Duration::from_secs(5), queue.next_delivery())
        .await
        .expect("abandoned claim never came back")
        .unwrap();
    assert_eq!(reclaimed.tag, claimed.tag);
    assert!(reclaimed.redelivered);
    queue.ack(reclaimed.tag).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_consumers_claim_distinct_rows() {
    let Some(pool) = pool().await else { return };
    let queue = queue(&pool).await;
    let pair = unique_pair();

    for sequence in 1..=2 {
        queue.publish(&event(&pair, sequence)).await.unwrap();
    }

    let (a, b) = tokio::join!(queue.next_delivery(), queue.next_delivery());
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.tag, b.tag);

    let mut sequences = vec![a.decode().unwrap().sequence, b.decode().unwrap().sequence];
    sequences.sort_unstable();
    assert_eq!(sequences, vec![1, 2]);

    queue.ack(a.tag).await.unwrap();
    queue.ack(b.tag).await.unwrap();
}

#[tokio::test]
async fn test_closed_queue_is_unavailable() {
    let Some(pool) = pool().await else { return };
    let queue = queue(&pool).await;

    queue.close().await.unwrap();
    let result = queue.publish(&event(&unique_pair(), 1)).await;
    assert!(matches!(result, Err(DetectorError::QueueUnavailable(_))));
}
