//! Request-facing publish façade
//!
//! The gateway reads the current connection out of the holder and publishes
//! through it. It never opens connections itself; when the holder is empty it
//! reports unavailability and leaves reconnection to the supervisor. Every
//! request gets a structured outcome, so broker trouble degrades service
//! instead of crashing it.

pub mod payload;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::ConnectionHolder;
use crate::observability::metrics::METRICS;
use payload::{echo_payload, encode_payload};

/// Subject used when neither the request nor the configuration names one
pub const FALLBACK_SUBJECT: &str = "subjectName";

/// Error text reported while no broker connection is held
pub const UNAVAILABLE_MESSAGE: &str = "connection not available";

/// Inbound publish request body
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    /// Payload to transmit. A JSON string goes out verbatim; anything else
    /// is serialized to compact JSON.
    pub message: Value,
    /// Subject override for this request
    #[serde(default)]
    pub subject: Option<String>,
}

/// How a publish attempt ended. Drives the HTTP status mapping but stays out
/// of the serialized response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishDisposition {
    /// Broker accepted the message
    Delivered,
    /// A connection was held but the publish failed
    Failed,
    /// No connection held; the broker was never contacted
    Unavailable,
    /// Payload could not be encoded; the broker was never contacted
    Rejected,
}

/// Outcome returned for every publish request
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    /// Payload as the gateway interpreted it, rebuilt from the wire bytes
    pub message: Value,
    /// Subject the publish went to (or would have gone to)
    pub subject: String,
    pub published: bool,
    /// Failure detail, null on success
    pub error: Option<String>,
    #[serde(skip)]
    pub disposition: PublishDisposition,
}

impl PublishOutcome {
    fn delivered(message: Value, subject: String) -> Self {
        Self {
            message,
            subject,
            published: true,
            error: None,
            disposition: PublishDisposition::Delivered,
        }
    }

    fn failed(message: Value, subject: String, error: String) -> Self {
        Self {
            message,
            subject,
            published: false,
            error: Some(error),
            disposition: PublishDisposition::Failed,
        }
    }

    fn unavailable(message: Value, subject: String) -> Self {
        Self {
            message,
            subject,
            published: false,
            error: Some(UNAVAILABLE_MESSAGE.to_string()),
            disposition: PublishDisposition::Unavailable,
        }
    }

    fn rejected(message: Value, subject: String, error: String) -> Self {
        Self {
            message,
            subject,
            published: false,
            error: Some(error),
            disposition: PublishDisposition::Rejected,
        }
    }
}

/// Resolve the subject for a request: request-supplied wins, then the
/// configured default, then the fallback literal. Blank strings count as
/// absent at every step.
fn resolve_subject(requested: Option<&str>, configured: Option<&str>) -> String {
    requested
        .map(str::trim)
        .filter(|subject| !subject.is_empty())
        .or_else(|| configured.map(str::trim).filter(|subject| !subject.is_empty()))
        .unwrap_or(FALLBACK_SUBJECT)
        .to_string()
}

/// Publishes inbound requests through whatever connection is currently held
pub struct PublishGateway {
    holder: Arc<ConnectionHolder>,
    default_subject: Option<String>,
}

impl PublishGateway {
    pub fn new(holder: Arc<ConnectionHolder>, default_subject: Option<String>) -> Self {
        Self {
            holder,
            default_subject,
        }
    }

    /// Publish one request and report how it went.
    ///
    /// Never panics and never returns early with an error: broker failures
    /// come back as outcomes with `published=false`. A failed publish leaves
    /// the held connection in place; replacing dead connections is the
    /// supervisor's job.
    pub async fn publish(&self, request: PublishRequest) -> PublishOutcome {
        let request_id = Uuid::new_v4();
        let subject = resolve_subject(request.subject.as_deref(), self.default_subject.as_deref());

        let wire = match encode_payload(&request.message) {
            Ok(bytes) => bytes,
            Err(e) => {
                METRICS.record_publish_rejected();
                warn!(
                    request_id = %request_id,
                    subject = %subject,
                    error = %e,
                    "Rejected payload that could not be encoded"
                );
                return PublishOutcome::rejected(request.message, subject, e.to_string());
            }
        };

        let connection = match self.holder.get().await {
            Some(connection) => connection,
            None => {
                METRICS.record_publish_unavailable();
                warn!(
                    request_id = %request_id,
                    subject = %subject,
                    "No broker connection held, reporting unavailable"
                );
                return PublishOutcome::unavailable(echo_payload(&request.message, &wire), subject);
            }
        };

        debug!(
            request_id = %request_id,
            subject = %subject,
            payload_bytes = wire.len(),
            "Publishing message"
        );

        match connection.publish(&subject, wire.clone()).await {
            Ok(()) => {
                METRICS.record_publish_success();
                info!(request_id = %request_id, subject = %subject, "Message published");
                PublishOutcome::delivered(echo_payload(&request.message, &wire), subject)
            }
            Err(e) => {
                METRICS.record_publish_failure();
                let detail = e.sanitized();
                warn!(
                    request_id = %request_id,
                    subject = %subject,
                    error = %detail,
                    "Publish failed, connection left in place"
                );
                PublishOutcome::failed(echo_payload(&request.message, &wire), subject, detail)
            }
        }
    }

    /// Whether a live connection is currently held
    pub async fn is_broker_connected(&self) -> bool {
        self.holder.is_connected().await
    }
}
