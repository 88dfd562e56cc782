//! Pure helpers for the MQTT session: address parsing and session state

use crate::error::BrokerError;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use url::Url;

/// Observed state of one MQTT session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Waiting for the broker to acknowledge the connection
    Connecting,
    /// ConnAck received, session usable
    Connected,
    /// Session ended or failed, with reason
    Lost(String),
}

pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

// Default broker limit is 10KB which is too small for larger payloads
pub const MAX_PACKET_SIZE: u32 = 256 * 1024;

/// Build rumqttc options from a broker address
///
/// Accepts `mqtt://` and `mqtts://` with default ports 1883/8883; `mqtts`
/// enables TLS with the platform trust store. Client ids carry a millisecond
/// suffix so rapid reconnects never collide on the broker.
pub fn configure_options(address: &str) -> Result<MqttOptions, BrokerError> {
    let url =
        Url::parse(address).map_err(|_| BrokerError::InvalidAddress(address.to_string()))?;

    if url.scheme() != "mqtt" && url.scheme() != "mqtts" {
        return Err(BrokerError::InvalidAddress(address.to_string()));
    }

    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| BrokerError::InvalidAddress(address.to_string()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let client_id = format!("pubgate-{timestamp}");
    let mut options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    options.set_keep_alive(KEEP_ALIVE);
    // MQTT v5 expects Option<u32> for max packet size
    options.set_max_packet_size(Some(MAX_PACKET_SIZE));

    Ok(options)
}
