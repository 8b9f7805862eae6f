//! Whole detector wired with in-memory parts against a local venue

mod common;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;

use common::{
    eventually, match_frame, pepe, pepe_params, FakeMarketData, FakeVenue, RecordingAlerts,
    VenueAction,
};
use trigger_detector::common::types::{Side, SideFilter, StreamState, SymbolPair};
use trigger_detector::config::types::{AppSettings, SeedTrigger};
use trigger_detector::persistence::{InMemoryTriggerRepository, TriggerRepository};
use trigger_detector::queue::InMemoryQueue;
use trigger_detector::store::InMemoryStateStore;
use trigger_detector::DetectorService;

#[test_log::test(tokio::test)]
async fn test_seeded_trigger_fires_from_live_trades() {
    let venue = FakeVenue::start().await;
    let market = FakeMarketData::new();
    market.set_endpoint(&venue.endpoint);
    market.set_price("PEPE", dec!(0.000002));
    market.set_price("DOGE", dec!(0.15));
    let alerts = RecordingAlerts::new();
    let triggers = Arc::new(InMemoryTriggerRepository::new());

    // Persisted before startup, restored on run
    let doge = SymbolPair::new("DOGE", "USDT");
    triggers
        .create(&doge, &pepe_params(SideFilter::Sell))
        .await
        .unwrap();

    let settings = AppSettings {
        reconnect_delay_ms: 20,
        max_reconnect_delay_ms: 100,
        ..AppSettings::default()
    };
    let service = DetectorService::new(
        settings,
        triggers.clone(),
        Arc::new(InMemoryStateStore::new()),
        Arc::new(InMemoryQueue::new("e2e")),
        market.clone(),
        alerts.clone(),
    )
    .with_seeds(vec![SeedTrigger {
        pair: pepe(),
        params: pepe_params(SideFilter::Buy),
    }]);
    let manager = service.manager();
    let stream = service.stream_handle();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(service.run(shutdown_rx));

    timeout(Duration::from_secs(5), stream.wait_for_state(StreamState::Streaming))
        .await
        .expect("stream never reached streaming")
        .unwrap();
    assert_eq!(alerts.sent()[0], "Trigger detector started, 2 active triggers");
    assert_eq!(triggers.list_active_triggers().await.unwrap().len(), 2);

    let venue = &venue;
    assert!(eventually(|| async move { venue.subscribed_topics(1).len() == 2 }).await);

    // 250M PEPE at 0.000002 is 500 USDT
    for sequence in 1..=3 {
        venue.act(VenueAction::Send(match_frame(
            &pepe(),
            Side::Buy,
            dec!(250000000),
            sequence,
        )));
    }
    // Wrong side for the DOGE trigger
    venue.act(VenueAction::Send(match_frame(&doge, Side::Buy, dec!(4000), 4)));

    let alerts_ref = &alerts;
    assert!(eventually(|| async move { alerts_ref.count_containing("PEPE-USDT") == 1 }).await);

    let status = manager.get_trigger_status(&pepe()).await.unwrap();
    assert_eq!(status.count_in_period, 3);
    assert!(status.is_notified);
    assert_eq!(manager.get_trigger_status(&doge).await.unwrap().total_count, 0);

    // Removing unsubscribes on the live session
    manager.remove_trigger(&doge).await.unwrap();
    let doge_topic = &doge.match_topic();
    assert!(
        eventually(|| async move { venue.unsubscribed_topics(1) == vec![doge_topic.clone()] })
            .await
    );

    shutdown_tx.send_replace(true);
    timeout(Duration::from_secs(5), task)
        .await
        .expect("service ignored shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(stream.state(), StreamState::Disconnected);
    assert_eq!(alerts.count_containing("DOGE-USDT"), 0);
}
