//! Observability support for the publish gateway
//!
//! Structured logging via tracing and a process-wide metrics collector
//! surfaced through the HTTP metrics endpoint.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{LogFormat, init_default_logging, init_logging};
pub use metrics::{MetricsCollector, MetricsSnapshot, metrics};
