//! HTTP surface for the publish gateway
//!
//! Thin plumbing between HTTP callers and the [`PublishGateway`]: one publish
//! endpoint plus the probe endpoints container orchestration expects. The
//! handlers never talk to the broker themselves; they map gateway outcomes to
//! status codes and pass the structured outcome body through.

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{PublishDisposition, PublishGateway, PublishRequest};
use crate::observability::metrics::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::info;
use warp::http::StatusCode;
use warp::Filter;

/// Largest accepted request body; matches the broker packet-size limit
const MAX_BODY_BYTES: u64 = 256 * 1024;

/// HTTP server wiring the gateway to its routes
pub struct ApiServer {
    gateway: Arc<PublishGateway>,
    address: SocketAddr,
}

impl ApiServer {
    pub fn new(gateway: Arc<PublishGateway>, address: SocketAddr) -> Self {
        Self { gateway, address }
    }

    /// Serve until the shutdown signal flips to true.
    ///
    /// Binding happens before this returns control to the runtime, so a port
    /// clash surfaces as an error instead of a silent dead server. In-flight
    /// requests complete after the signal; new connections are refused.
    pub async fn start(&self, mut shutdown_rx: watch::Receiver<bool>) -> GatewayResult<()> {
        let routes = routes(self.gateway.clone());

        let (address, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(self.address, async move {
                while shutdown_rx.changed().await.is_ok() {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            })
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        info!(%address, "HTTP listener started");
        server.await;
        info!("HTTP listener stopped");
        Ok(())
    }
}

/// All routes of the API surface; exposed separately so tests can drive the
/// filters without binding a socket
pub fn routes(
    gateway: Arc<PublishGateway>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    publish_route(gateway.clone())
        .or(health_route(gateway.clone()))
        .or(metrics_route())
        .or(ready_route(gateway))
        .or(live_route())
        .or(root_route())
        .with(warp::cors().allow_any_origin())
}

/// POST /api/message - publish one payload through the gateway
///
/// The body is parsed here rather than through warp's JSON rejection so that
/// malformed input gets a JSON diagnostic with a 400 instead of warp's plain
/// text reply.
fn publish_route(
    gateway: Arc<PublishGateway>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path!("api" / "message")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and_then(move |body: bytes::Bytes| {
            let gateway = gateway.clone();
            async move {
                let started = Instant::now();
                metrics().record_request_received();

                let request: PublishRequest = match serde_json::from_slice(&body) {
                    Ok(request) => request,
                    Err(e) => {
                        metrics().record_publish_rejected();
                        let diagnostic = ErrorResponse {
                            error: format!("Invalid request body: {e}"),
                            timestamp: current_timestamp(),
                        };
                        return Ok::<_, Infallible>(warp::reply::with_status(
                            warp::reply::json(&diagnostic),
                            StatusCode::BAD_REQUEST,
                        ));
                    }
                };

                let outcome = gateway.publish(request).await;
                metrics().record_request_latency(started.elapsed());

                let status = match outcome.disposition {
                    PublishDisposition::Delivered | PublishDisposition::Failed => StatusCode::OK,
                    PublishDisposition::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    PublishDisposition::Rejected => StatusCode::BAD_REQUEST,
                };

                Ok::<_, Infallible>(warp::reply::with_status(
                    warp::reply::json(&outcome),
                    status,
                ))
            }
        })
}

/// GET /health - overall status document with a broker check
fn health_route(
    gateway: Arc<PublishGateway>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("health").and(warp::get()).and_then(move || {
        let gateway = gateway.clone();
        async move {
            let status = health_status(&gateway).await;
            let status_code = if status.status == "healthy" {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            Ok::<_, Infallible>(warp::reply::with_status(
                warp::reply::json(&status),
                status_code,
            ))
        }
    })
}

/// GET /metrics - complete metrics export
fn metrics_route() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("metrics").and(warp::get()).and_then(|| async {
        let snapshot = metrics().get_metrics();
        Ok::<_, Infallible>(warp::reply::json(&snapshot))
    })
}

/// GET /ready - readiness probe; ready only while a broker connection is held
fn ready_route(
    gateway: Arc<PublishGateway>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("ready").and(warp::get()).and_then(move || {
        let gateway = gateway.clone();
        async move {
            let ready = gateway.is_broker_connected().await;
            let response = ReadinessResponse {
                ready,
                timestamp: current_timestamp(),
            };
            let status_code = if ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            Ok::<_, Infallible>(warp::reply::with_status(
                warp::reply::json(&response),
                status_code,
            ))
        }
    })
}

/// GET /live - liveness probe
fn live_route() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("live").and(warp::get()).and_then(|| async {
        let response = LivenessResponse {
            alive: true,
            timestamp: current_timestamp(),
        };
        Ok::<_, Infallible>(warp::reply::json(&response))
    })
}

/// GET / - API documentation
fn root_route() -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path::end().and(warp::get()).and_then(|| async {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            "/api/message".to_string(),
            "POST a JSON payload to publish it to the broker".to_string(),
        );
        endpoints.insert(
            "/health".to_string(),
            "Overall health status with broker check".to_string(),
        );
        endpoints.insert(
            "/metrics".to_string(),
            "Publish and connection metrics".to_string(),
        );
        endpoints.insert(
            "/ready".to_string(),
            "Readiness probe for Kubernetes".to_string(),
        );
        endpoints.insert(
            "/live".to_string(),
            "Liveness probe for Kubernetes".to_string(),
        );

        let response = ApiDocumentationResponse { endpoints };
        Ok::<_, Infallible>(warp::reply::json(&response))
    })
}

async fn health_status(gateway: &PublishGateway) -> HealthStatus {
    let now = current_timestamp();
    let connected = gateway.is_broker_connected().await;

    let broker_check = if connected {
        HealthCheck {
            status: "healthy".to_string(),
            message: Some("Broker connection established".to_string()),
            last_check: now,
        }
    } else {
        HealthCheck {
            status: "unhealthy".to_string(),
            message: Some("No broker connection; publishes report unavailable".to_string()),
            last_check: now,
        }
    };

    let mut checks = HashMap::new();
    checks.insert("broker".to_string(), broker_check);

    let overall_status = if connected { "healthy" } else { "degraded" };

    HealthStatus {
        status: overall_status.to_string(),
        timestamp: now,
        uptime_seconds: metrics().get_metrics().uptime_seconds,
        checks,
    }
}

#[derive(Debug, Clone, Serialize)]
struct HealthCheck {
    status: String,
    message: Option<String>,
    last_check: u64,
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    timestamp: u64,
    uptime_seconds: u64,
    checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    endpoints: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
