//! KuCoin REST client against a mocked API

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio_test::assert_ok;
use std::time::Duration;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trigger_detector::common::errors::DetectorError;
use trigger_detector::common::traits::MarketData;
use trigger_detector::config::types::{ApiCredentials, KucoinConfig};
use trigger_detector::kucoin::KucoinRestClient;

fn level1_body(price: Option<&str>) -> serde_json::Value {
    json!({
        "code": "200000",
        "data": {
            "time": 1700000000000i64,
            "sequence": "1550467636704",
            "price": price,
            "size": "17.00000000",
            "bestBid": "0.00000183",
            "bestBidSize": "1000000",
            "bestAsk": "0.00000185",
            "bestAskSize": "1000000"
        }
    })
}

async fn client(server: &MockServer) -> KucoinRestClient {
    KucoinRestClient::new(&server.uri()).unwrap()
}

// ============================================================================
// Stream token
// ============================================================================

#[tokio::test]
async fn test_public_token_maps_first_instance_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/bullet-public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "200000",
            "data": {
                "token": "2neAiuYvAU61ZD",
                "instanceServers": [
                    {
                        "endpoint": "wss://ws-api-spot.kucoin.com/",
                        "encrypt": true,
                        "protocol": "websocket",
                        "pingInterval": 18000,
                        "pingTimeout": 10000
                    },
                    {
                        "endpoint": "wss://backup.example/",
                        "pingInterval": 1,
                        "pingTimeout": 1
                    }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = assert_ok!(client(&server).await.get_auth_token().await);

    assert_eq!(token.token, "2neAiuYvAU61ZD");
    assert_eq!(token.endpoint, "wss://ws-api-spot.kucoin.com/");
    assert_eq!(token.ping_interval, Duration::from_secs(18));
    assert_eq!(token.ping_timeout, Duration::from_secs(10));
}

#[tokio::test]
async fn test_rejected_token_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/bullet-public"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": "429000", "msg": "Too Many Requests"})),
        )
        .mount(&server)
        .await;

    let result = client(&server).await.get_auth_token().await;
    assert!(matches!(result, Err(DetectorError::Authentication(msg)) if msg.contains("429000")));
}

#[tokio::test]
async fn test_token_http_failure_is_an_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/bullet-public"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = client(&server).await.get_auth_token().await;
    assert!(matches!(result, Err(DetectorError::Authentication(_))));
}

#[tokio::test]
async fn test_token_without_servers_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/bullet-public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "200000",
            "data": {"token": "t", "instanceServers": []}
        })))
        .mount(&server)
        .await;

    let result = client(&server).await.get_auth_token().await;
    assert!(matches!(result, Err(DetectorError::InvalidResponse(_))));
}

// ============================================================================
// Reference prices
// ============================================================================

#[tokio::test]
async fn test_reference_price_uses_quote_currency_pair() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/market/orderbook/level1"))
        .and(query_param("symbol", "PEPE-USDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(level1_body(Some("0.00000184"))))
        .expect(1)
        .mount(&server)
        .await;

    let price = client(&server).await.get_reference_price("pepe").await.unwrap();
    assert_eq!(price, dec!(0.00000184));
}

#[tokio::test]
async fn test_configured_quote_currency() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/market/orderbook/level1"))
        .and(query_param("symbol", "BTC-USDC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(level1_body(Some("67000.5"))))
        .expect(1)
        .mount(&server)
        .await;

    let config = KucoinConfig {
        rest_url: server.uri(),
        quote_currency: "usdc".to_string(),
        ..KucoinConfig::default()
    };
    let client = KucoinRestClient::from_config(&config, Duration::from_secs(5)).unwrap();

    assert_eq!(client.get_reference_price("BTC").await.unwrap(), dec!(67000.5));
    // Pricing the quote itself needs no request
    assert_eq!(client.get_reference_price("USDC").await.unwrap(), dec!(1));
}

#[tokio::test]
async fn test_missing_price_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/market/orderbook/level1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(level1_body(None)))
        .mount(&server)
        .await;

    let result = client(&server).await.get_reference_price("NOPE").await;
    assert!(matches!(result, Err(DetectorError::PriceUnavailable(symbol)) if symbol == "NOPE-USDT"));
}

#[tokio::test]
async fn test_unknown_symbol_has_no_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/market/orderbook/level1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": "200000", "data": null})))
        .mount(&server)
        .await;

    let result = client(&server).await.get_reference_price("NOPE").await;
    assert!(matches!(result, Err(DetectorError::PriceUnavailable(_))));
}

#[tokio::test]
async fn test_rejected_level1_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/market/orderbook/level1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": "400100", "msg": "bad symbol"})),
        )
        .mount(&server)
        .await;

    let result = client(&server).await.get_level1("??").await;
    assert!(matches!(result, Err(DetectorError::InvalidResponse(msg)) if msg.contains("400100")));
}

#[tokio::test]
async fn test_signed_requests_carry_kc_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/market/orderbook/level1"))
        .and(header("KC-API-KEY", "key"))
        .and(header("KC-API-KEY-VERSION", "2"))
        .and(header_exists("KC-API-SIGN"))
        .and(header_exists("KC-API-TIMESTAMP"))
        .and(header_exists("KC-API-PASSPHRASE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(level1_body(Some("0.5"))))
        .expect(1)
        .mount(&server)
        .await;

    let client = KucoinRestClient::new(&server.uri())
        .unwrap()
        .with_credentials(ApiCredentials::new(
            "key".to_string(),
            "secret".to_string(),
            "passphrase".to_string(),
        ));

    assert_eq!(client.get_reference_price("DOGE").await.unwrap(), dec!(0.5));
}
