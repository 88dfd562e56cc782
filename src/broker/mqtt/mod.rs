//! MQTT implementation of the broker connection traits
//!
//! Split into pure option/state handling and the impure session driver so
//! the former stays unit-testable without a broker.

pub mod options;
pub mod session;

pub use options::{configure_options, SessionState};
pub use session::{MqttConnection, MqttConnector};
