//! Testing utilities and mock implementations
//!
//! This module provides mock broker implementations for testing the gateway
//! without requiring a running MQTT broker.

pub mod mocks;

pub use mocks::*;
