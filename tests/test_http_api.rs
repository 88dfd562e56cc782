//! Integration tests for the HTTP surface
//!
//! Exercises the warp routes end to end against a mock broker connection,
//! checking the status mapping and that payload bytes survive the trip
//! from HTTP body to broker wire without extra escaping.

use pubgate::broker::ConnectionHolder;
use pubgate::error::GatewayError;
use pubgate::gateway::PublishGateway;
use pubgate::http::{routes, ApiServer};
use pubgate::testing::mocks::MockConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use warp::http::StatusCode;

fn api(default_subject: Option<&str>) -> (
    impl warp::Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone,
    Arc<MockConnection>,
    Arc<ConnectionHolder>,
) {
    let holder = Arc::new(ConnectionHolder::new());
    let connection = Arc::new(MockConnection::new());
    let gateway = Arc::new(PublishGateway::new(
        holder.clone(),
        default_subject.map(String::from),
    ));
    (routes(gateway), connection, holder)
}

#[tokio::test]
async fn test_publish_delivered_returns_200_with_outcome() {
    let (routes, connection, holder) = api(Some("orders"));
    holder.set(connection.clone()).await;

    let response = warp::test::request()
        .method("POST")
        .path("/api/message")
        .body(r#"{"message": {"a": "<b>"}}"#)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["published"], json!(true));
    assert_eq!(body["subject"], json!("orders"));
    assert_eq!(body["message"], json!({"a": "<b>"}));

    // Angle brackets must hit the broker unescaped
    let wire = connection.published()[0].1.clone();
    assert_eq!(wire.as_slice(), br#"{"a":"<b>"}"#);
}

#[tokio::test]
async fn test_string_payload_reaches_broker_verbatim() {
    let (routes, connection, holder) = api(None);
    holder.set(connection.clone()).await;

    let response = warp::test::request()
        .method("POST")
        .path("/api/message")
        .body(r#"{"message": "<xml>hi</xml>", "subject": "logs"}"#)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["subject"], json!("logs"));
    assert_eq!(body["message"], json!("<xml>hi</xml>"));

    let published = connection.published();
    assert_eq!(published[0].0, "logs");
    assert_eq!(published[0].1.as_slice(), b"<xml>hi</xml>");
}

#[tokio::test]
async fn test_publish_failure_still_returns_200() {
    let (routes, connection, holder) = api(None);
    holder.set(connection.clone()).await;
    connection.set_fail_publish(true);

    let response = warp::test::request()
        .method("POST")
        .path("/api/message")
        .body(r#"{"message": {"a": 1}}"#)
        .reply(&routes)
        .await;

    // The request was well-formed and a connection was held; the failure
    // shows up in the body, not the status
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["published"], json!(false));
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_publish_without_connection_returns_503() {
    let (routes, _connection, _holder) = api(None);

    let response = warp::test::request()
        .method("POST")
        .path("/api/message")
        .body(r#"{"message": {"a": 1}}"#)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["published"], json!(false));
    assert_eq!(body["error"], json!("connection not available"));
}

#[tokio::test]
async fn test_missing_message_field_returns_400() {
    let (routes, _connection, holder) = api(None);
    holder.set(Arc::new(MockConnection::new())).await;

    let response = warp::test::request()
        .method("POST")
        .path("/api/message")
        .body(r#"{"subject": "orders"}"#)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Invalid request body"));
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let (routes, _connection, _holder) = api(None);

    let oversized = "x".repeat(300 * 1024);
    let response = warp::test::request()
        .method("POST")
        .path("/api/message")
        .body(oversized)
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_health_degrades_without_broker() {
    let (routes, connection, holder) = api(None);

    let response = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["status"], json!("degraded"));
    assert_eq!(body["checks"]["broker"]["status"], json!("unhealthy"));

    holder.set(connection).await;

    let response = warp::test::request()
        .method("GET")
        .path("/health")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["checks"]["broker"]["status"], json!("healthy"));
}

#[tokio::test]
async fn test_metrics_exposes_publish_and_broker_sections() {
    let (routes, connection, holder) = api(None);
    holder.set(connection).await;

    // At least one request so the counters are exercised
    warp::test::request()
        .method("POST")
        .path("/api/message")
        .body(r#"{"message": {"a": 1}}"#)
        .reply(&routes)
        .await;

    let response = warp::test::request()
        .method("GET")
        .path("/metrics")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(response.body()).unwrap();
    // Counters are process-global, so assert shape rather than exact counts
    assert!(body["publishes"]["requests_received"].as_u64().unwrap() >= 1);
    assert!(body["publishes"]["delivered"].is_u64());
    assert!(body["broker"]["connected"].is_boolean());
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_start_reports_bind_failure_on_occupied_port() {
    let occupant = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = occupant.local_addr().unwrap();

    let holder = Arc::new(ConnectionHolder::new());
    let gateway = Arc::new(PublishGateway::new(holder, None));
    let server = ApiServer::new(gateway, address);
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Startup must surface the bind failure instead of serving nothing
    let error = server.start(shutdown_rx).await.unwrap_err();
    assert!(matches!(error, GatewayError::Http(_)));
}
