//! MQTT session driver and the connection built on top of it

use super::options::{configure_options, SessionState};
use crate::broker::{BrokerConnection, BrokerConnector};
use crate::error::BrokerError;
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, EventLoop};
use rumqttc::Outgoing;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Capacity of the rumqttc request channel
const REQUEST_CAPACITY: usize = 16;

/// Pause between polls once an established session has dropped
const REDIAL_PAUSE: Duration = Duration::from_secs(1);

/// How long drain waits for the driver to flush the queue and stop
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// One-shot connector for MQTT brokers
///
/// `connect` performs exactly one attempt: options are built, a session
/// driver task is spawned, and the call resolves once the broker
/// acknowledges the connection or the attempt fails. A failed attempt tears
/// the driver down so nothing keeps polling. Retry policy belongs to the
/// caller.
pub struct MqttConnector {
    address: String,
    connect_timeout: Duration,
}

impl MqttConnector {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl BrokerConnector for MqttConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let options = configure_options(&self.address)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let (close_tx, close_rx) = watch::channel(false);

        let driver = tokio::spawn(drive_session(event_loop, state_tx, close_rx));

        match wait_until_connected(state_rx.clone(), self.connect_timeout).await {
            Ok(()) => {
                info!(address = %self.address, "Broker connection established");
                Ok(Arc::new(MqttConnection {
                    client,
                    state_rx,
                    close_tx,
                    driver: Mutex::new(Some(driver)),
                }))
            }
            Err(e) => {
                let _ = close_tx.send(true);
                driver.abort();
                Err(e)
            }
        }
    }
}

/// A live MQTT connection: the shared client plus its driver task
pub struct MqttConnection {
    client: AsyncClient,
    state_rx: watch::Receiver<SessionState>,
    close_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl BrokerConnection for MqttConnection {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let payload = Bytes::from(payload);
        self.client
            .publish(subject, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| BrokerError::PublishFailed(Box::new(e)))
    }

    async fn drain(&self) -> Result<(), BrokerError> {
        // The disconnect request queues behind pending publishes, so the
        // driver flushes them before the session actually closes.
        let disconnect = self.client.disconnect().await;

        if let Some(handle) = self.driver.lock().await.take() {
            let abort = handle.abort_handle();
            match timeout(DRAIN_GRACE, handle).await {
                Ok(Ok(())) => debug!("Session driver stopped after drain"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(error = %e, "Session driver ended abnormally during drain");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!("Session driver did not stop within the drain grace period, aborting");
                    let _ = self.close_tx.send(true);
                    abort.abort();
                }
            }
        }

        disconnect.map_err(|e| BrokerError::CloseFailed(Box::new(e)))
    }

    fn is_open(&self) -> bool {
        matches!(&*self.state_rx.borrow(), SessionState::Connected)
    }
}

impl Drop for MqttConnection {
    fn drop(&mut self) {
        // A connection discarded without drain must not leave a polling task
        if let Ok(mut guard) = self.driver.try_lock() {
            if let Some(handle) = guard.take() {
                let _ = self.close_tx.send(true);
                handle.abort();
            }
        }
    }
}

/// Poll the event loop and mirror what it sees into the state channel.
///
/// Before the first ConnAck a poll error ends the task: the attempt is
/// single-shot and the connector reports the failure. After confirmation the
/// loop keeps polling so rumqttc can re-establish a dropped session, pausing
/// between failures. The task stops on the close signal or once the
/// disconnect packet has gone out.
async fn drive_session(
    mut event_loop: EventLoop,
    state_tx: watch::Sender<SessionState>,
    mut close_rx: watch::Receiver<bool>,
) {
    let mut confirmed = false;

    loop {
        tokio::select! {
            changed = close_rx.changed() => {
                if changed.is_err() || *close_rx.borrow() {
                    debug!("Session driver received close signal");
                    break;
                }
            }

            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    confirmed = true;
                    let _ = state_tx.send(SessionState::Connected);
                }
                Ok(Event::Incoming(Packet::Disconnect(disconnect))) => {
                    let _ = state_tx.send(SessionState::Lost(format!(
                        "Broker sent disconnect: {:?}",
                        disconnect.reason_code
                    )));
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    // The request queue is flushed through this point
                    let _ = state_tx.send(SessionState::Lost("Client disconnected".to_string()));
                    break;
                }
                Ok(_) => {}
                Err(e) if !confirmed => {
                    let _ = state_tx.send(SessionState::Lost(e.to_string()));
                    debug!(error = %e, "Connection attempt failed");
                    break;
                }
                Err(e) => {
                    let _ = state_tx.send(SessionState::Lost(e.to_string()));
                    warn!(error = %e, "Broker session dropped, polling for recovery");
                    if !pause_for_redial(&mut close_rx).await {
                        break;
                    }
                }
            }
        }
    }

    debug!("Session driver stopped");
}

/// Interruptible pause between redial polls; false means close was signalled
async fn pause_for_redial(close_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        changed = close_rx.changed() => changed.is_ok() && !*close_rx.borrow(),
        _ = tokio::time::sleep(REDIAL_PAUSE) => true,
    }
}

/// Wait until the driver reports a confirmed session, a failure, or the
/// timeout elapses
async fn wait_until_connected(
    mut state_rx: watch::Receiver<SessionState>,
    connect_timeout: Duration,
) -> Result<(), BrokerError> {
    let confirmed = timeout(connect_timeout, async {
        loop {
            let state = state_rx.borrow_and_update().clone();
            match state {
                SessionState::Connected => return Ok(()),
                SessionState::Lost(reason) => {
                    return Err(BrokerError::ConnectFailed(reason.into()));
                }
                SessionState::Connecting => {}
            }

            if state_rx.changed().await.is_err() {
                return Err(BrokerError::ConnectFailed(
                    "session driver stopped before the broker replied"
                        .to_string()
                        .into(),
                ));
            }
        }
    })
    .await;

    match confirmed {
        Ok(result) => result,
        Err(_) => Err(BrokerError::ConnectTimeout(connect_timeout)),
    }
}
