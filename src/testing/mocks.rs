//! Mock implementations for testing
//!
//! Provides mock broker connections and connectors so the holder, supervisor,
//! gateway, and shutdown paths can be tested without a running broker.

use crate::broker::{BrokerConnection, BrokerConnector};
use crate::error::BrokerError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type PublishedMessage = (String, Vec<u8>);

/// Mock broker connection for testing
///
/// Records every published (subject, payload) pair and exposes switches for
/// failing publishes or drains and for delaying the drain, so timeout paths
/// can be exercised.
#[derive(Debug, Default)]
pub struct MockConnection {
    published: Mutex<Vec<PublishedMessage>>,
    open: AtomicBool,
    fail_publish: AtomicBool,
    fail_drain: AtomicBool,
    drain_delay: Mutex<Option<Duration>>,
    drain_calls: AtomicUsize,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            ..Default::default()
        }
    }

    /// Every message published through this connection, in order
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// How many times `drain` has been invoked
    pub fn drain_calls(&self) -> usize {
        self.drain_calls.load(Ordering::SeqCst)
    }

    /// Flip the session-open flag, simulating a dropped broker session
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_drain(&self, fail: bool) {
        self.fail_drain.store(fail, Ordering::SeqCst);
    }

    /// Make the next drain sleep before completing
    pub fn set_drain_delay(&self, delay: Duration) {
        *self.drain_delay.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl BrokerConnection for MockConnection {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::PublishFailed(
                "mock publish failure".to_string().into(),
            ));
        }

        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        Ok(())
    }

    async fn drain(&self) -> Result<(), BrokerError> {
        self.drain_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.drain_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.open.store(false, Ordering::SeqCst);

        if self.fail_drain.load(Ordering::SeqCst) {
            return Err(BrokerError::CloseFailed(
                "mock drain failure".to_string().into(),
            ));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

/// Mock connector with scripted connect results
///
/// Counts attempts and keeps every connection it handed out, so tests can
/// reach the installed connection or simulate its session dropping.
#[derive(Debug, Default)]
pub struct MockConnector {
    fail_first: usize,
    always_fail: bool,
    attempts: AtomicUsize,
    connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockConnector {
    /// Every attempt succeeds
    pub fn always_succeed() -> Self {
        Self::default()
    }

    /// Every attempt fails with a connect error
    pub fn always_fail() -> Self {
        Self {
            always_fail: true,
            ..Default::default()
        }
    }

    /// The first `n` attempts fail, then attempts succeed
    pub fn fail_times(n: usize) -> Self {
        Self {
            fail_first: n,
            ..Default::default()
        }
    }

    /// Total connect attempts so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The most recent connection handed out, if any
    pub fn last_connection(&self) -> Option<Arc<MockConnection>> {
        self.connections.lock().unwrap().last().cloned()
    }

    /// Mark the most recently handed out connection as closed
    pub fn close_last_connection(&self) {
        if let Some(connection) = self.last_connection() {
            connection.set_open(false);
        }
    }
}

#[async_trait]
impl BrokerConnector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if self.always_fail || attempt <= self.fail_first {
            return Err(BrokerError::ConnectFailed(
                "mock broker refused the connection".to_string().into(),
            ));
        }

        let connection = Arc::new(MockConnection::new());
        self.connections.lock().unwrap().push(connection.clone());
        Ok(connection)
    }
}
