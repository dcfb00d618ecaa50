//! ExchangeGateway 통합 테스트 (mock 거래소 서버).

use std::sync::Arc;

use mockito::{Matcher, Server};
use serde_json::json;

use cryptodesk_core::{SimulationConfig, TradingMode, TradingModeGate};
use cryptodesk_exchange::{
    BatchOrderResult, BitvavoClient, BitvavoConfig, ExchangeError, ExchangeGateway, OrderOutcome,
    OrderPayload, SimulationEngine, SlidingWindowLimiter,
};

fn gateway(base_url: &str, credentials: bool, gate: TradingModeGate, limit: u32) -> ExchangeGateway {
    let config = if credentials {
        BitvavoConfig::new("test-api-key-123", "test-api-secret-456")
    } else {
        BitvavoConfig::default()
    }
    .with_base_url(base_url)
    .with_timeout(5);

    ExchangeGateway::new(
        BitvavoClient::new(config).unwrap(),
        Arc::new(gate),
        Arc::new(SlidingWindowLimiter::new(limit)),
        Arc::new(SimulationEngine::new(SimulationConfig::default())),
    )
}

fn live_gate() -> TradingModeGate {
    TradingModeGate::new(TradingMode::Live, false)
}

fn market_buy() -> OrderPayload {
    OrderPayload::new("BTC-EUR", "buy", "market").with_amount(0.01)
}

#[tokio::test]
async fn test_dry_run_order_makes_no_network_call() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/order")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, TradingModeGate::default(), 1000);
    let outcome = gw.place_order(&market_buy()).await.unwrap();

    assert!(outcome.is_simulated());
    assert_eq!(outcome.status(), "filled");
    assert!(outcome.order_id().unwrap().starts_with("SIM-"));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_live_mode_with_override_is_still_simulated() {
    let mut server = Server::new_async().await;
    let mock = server.mock("POST", "/order").expect(0).create_async().await;

    let gw = gateway(&server.url(), true, TradingModeGate::new(TradingMode::Live, true), 1000);
    let outcome = gw.place_order(&market_buy()).await.unwrap();

    match outcome {
        OrderOutcome::Simulated(order) => assert_eq!(order.trading_mode, TradingMode::Live),
        other => panic!("expected simulated order, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_order_without_credentials_fails() {
    let gw = gateway("http://127.0.0.1:9", false, TradingModeGate::default(), 1000);
    let err = gw.place_order(&market_buy()).await.unwrap_err();
    assert!(matches!(err, ExchangeError::CredentialsMissing));
}

#[tokio::test]
async fn test_invalid_order_rejected_before_io() {
    let gw = gateway("http://127.0.0.1:9", true, live_gate(), 1000);
    let err = gw
        .place_order(&OrderPayload::new("BTC-EUR", "buy", "limit").with_amount(1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::InvalidOrder(_)));
}

#[tokio::test]
async fn test_live_order_is_signed_and_stringified() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/order")
        .match_header("bitvavo-access-key", "test-api-key-123")
        .match_header("bitvavo-access-signature", Matcher::Regex("^[0-9a-f]{64}$".into()))
        .match_header("bitvavo-access-timestamp", Matcher::Regex("^[0-9]{13}$".into()))
        .match_header("user-agent", Matcher::Regex("^cryptodesk/".into()))
        .match_body(Matcher::PartialJson(json!({
            "market": "BTC-EUR",
            "side": "buy",
            "orderType": "limit",
            "amount": "0.5",
            "price": "40000"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"orderId": "1be6d0df-d5dc-4b53-a250-3376f3b393e6", "status": "new"}"#)
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, live_gate(), 1000);
    let order = OrderPayload::new("BTC-EUR", "buy", "limit")
        .with_amount(0.5)
        .with_price(40000.0);
    let outcome = gw.place_order(&order).await.unwrap();

    assert!(!outcome.is_simulated());
    assert_eq!(outcome.status(), "new");
    assert_eq!(
        outcome.order_id().as_deref(),
        Some("1be6d0df-d5dc-4b53-a250-3376f3b393e6")
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_live_order_rate_limited() {
    let mut server = Server::new_async().await;
    let mock = server.mock("POST", "/order").expect(0).create_async().await;

    let gw = gateway(&server.url(), true, live_gate(), 5);
    let err = gw.place_order(&market_buy()).await.unwrap_err();

    assert!(matches!(err, ExchangeError::RateLimited { .. }));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_exchange_error_mapped() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/order")
        .with_status(400)
        .with_body(r#"{"errorCode": 216, "error": "You do not have sufficient balance to complete this operation."}"#)
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, live_gate(), 1000);
    let err = gw.place_order(&market_buy()).await.unwrap_err();
    assert!(matches!(err, ExchangeError::InsufficientBalance(_)));
}

#[tokio::test]
async fn test_unauthorized_response() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/balance")
        .with_status(403)
        .with_body(r#"{"errorCode": 305, "error": "No active API key found."}"#)
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, live_gate(), 1000);
    let err = gw.get_balance().await.unwrap_err();
    assert!(matches!(err, ExchangeError::Unauthorized(msg) if msg == "No active API key found."));
}

#[tokio::test]
async fn test_simulated_balance_in_dry_run() {
    let gw = gateway("http://127.0.0.1:9", false, TradingModeGate::default(), 1000);
    let balances = gw.get_balance().await.unwrap();

    assert_eq!(balances.len(), 3);
    assert_eq!(balances[0].symbol, "EUR");
    assert_eq!(balances[0].available, 10000.0);
    assert_eq!(balances[2].available, 2.5);
}

#[tokio::test]
async fn test_live_balance_coerced_to_numbers() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/balance")
        .with_status(200)
        .with_body(r#"[{"symbol": "EUR", "available": "1234.56", "inOrder": "10.00"}]"#)
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, live_gate(), 1000);
    let balances = gw.get_balance().await.unwrap();

    assert_eq!(balances[0].available, 1234.56);
    assert_eq!(balances[0].in_order, 10.0);
}

#[tokio::test]
async fn test_market_data_without_credentials_has_no_auth_headers() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/ticker/24h")
        .match_query(Matcher::UrlEncoded("market".into(), "BTC-EUR".into()))
        .match_header("bitvavo-access-key", Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"market": "BTC-EUR", "last": "45000"}"#)
        .create_async()
        .await;

    let gw = gateway(&server.url(), false, TradingModeGate::default(), 1000);
    let ticker = gw.get_ticker(Some("BTC-EUR")).await.unwrap();

    assert_eq!(ticker["last"], "45000");
    assert_eq!(gw.rate_limit_status().current_requests, 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_candles_endpoint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/BTC-EUR/candles")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("interval".into(), "1h".into()),
            Matcher::UrlEncoded("limit".into(), "2".into()),
        ]))
        .with_status(200)
        .with_body(r#"[[1700000000000, "1", "2", "0.5", "1.5", "10"]]"#)
        .create_async()
        .await;

    let gw = gateway(&server.url(), false, TradingModeGate::default(), 1000);
    let candles = gw.get_candles("BTC-EUR", "1h", 2).await.unwrap();

    assert_eq!(candles.as_array().map(Vec::len), Some(1));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cancel_in_dry_run() {
    let gw = gateway("http://127.0.0.1:9", true, TradingModeGate::default(), 1000);
    let response = gw.cancel_order("SIM-ABCD1234", None).await.unwrap();

    assert_eq!(response["status"], "dry_run");
    assert_eq!(response["cancelled"], true);
}

#[tokio::test]
async fn test_batch_orders() {
    let gw = gateway("http://127.0.0.1:9", true, TradingModeGate::default(), 1000);
    let orders = vec![market_buy(), OrderPayload::new("bad", "buy", "market")];

    let results = gw.place_batch_orders(&orders).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], BatchOrderResult::Success { .. }));
    assert!(matches!(&results[1], BatchOrderResult::Error { error, .. } if error.contains("Invalid market")));

    let value = serde_json::to_value(&results).unwrap();
    assert_eq!(value[0]["status"], "success");
    assert_eq!(value[1]["status"], "error");

    let too_many = vec![market_buy(); 11];
    assert!(matches!(
        gw.place_batch_orders(&too_many).await,
        Err(ExchangeError::InvalidOrder(_))
    ));
}

#[tokio::test]
async fn test_connection_success() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/time")
        .with_status(200)
        .with_body(r#"{"time": 1700000000000}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/balance")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, TradingModeGate::default(), 1000);
    let result = gw.test_connection().await;

    assert!(result.is_success());
    assert_eq!(result.server_time, Some(1_700_000_000_000));
}

#[tokio::test]
async fn test_connection_auth_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/time")
        .with_status(200)
        .with_body(r#"{"time": 1700000000000}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/balance")
        .with_status(401)
        .with_body(r#"{"errorCode": 309, "error": "The signature is invalid."}"#)
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, TradingModeGate::default(), 1000);
    let result = gw.test_connection().await;

    assert!(!result.is_success());
    assert!(result.message.starts_with("Authentication failed"));
    assert_eq!(result.kind.map(|k| k.as_str()), Some("auth_error"));
}

/// 연결은 받지만 응답하지 않는 로컬 서버.
async fn silent_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

/// 바인딩되지 않은 로컬 포트.
fn unbound_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn test_unresponsive_exchange_is_timeout() {
    let base_url = silent_server().await;
    let config = BitvavoConfig::default().with_base_url(base_url).with_timeout(1);
    let gw = ExchangeGateway::new(
        BitvavoClient::new(config).unwrap(),
        Arc::new(TradingModeGate::default()),
        Arc::new(SlidingWindowLimiter::new(1000)),
        Arc::new(SimulationEngine::new(SimulationConfig::default())),
    );

    let err = gw.get_time().await.unwrap_err();
    assert!(matches!(err, ExchangeError::Timeout(_)), "got {err:?}");
    assert!(err.is_retryable());
    assert_eq!(err.kind().as_str(), "network_error");
}

#[tokio::test]
async fn test_refused_connection_is_network_error() {
    let gw = gateway(&unbound_url(), false, TradingModeGate::default(), 1000);

    let err = gw.get_markets().await.unwrap_err();
    assert!(matches!(err, ExchangeError::Network(_)), "got {err:?}");
    assert_eq!(err.retry_after_secs(), Some(30));
}

#[tokio::test]
async fn test_market_filter_is_percent_encoded_and_signed() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/ordersOpen")
        .match_query(Matcher::UrlEncoded("market".into(), "BTC-EUR&limit=1".into()))
        .match_header("bitvavo-access-signature", Matcher::Regex("^[0-9a-f]{64}$".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, live_gate(), 1000);
    let orders = gw.get_orders(Some("BTC-EUR&limit=1")).await.unwrap();

    assert_eq!(orders, json!([]));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cancel_order_id_is_percent_encoded() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/order")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("orderId".into(), "abc#def".into()),
            Matcher::UrlEncoded("market".into(), "BTC-EUR".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"orderId": "abc#def"}"#)
        .create_async()
        .await;

    let gw = gateway(&server.url(), true, live_gate(), 1000);
    let response = gw.cancel_order("abc#def", Some("BTC-EUR")).await.unwrap();

    assert_eq!(response["orderId"], "abc#def");
    mock.assert_async().await;
}
