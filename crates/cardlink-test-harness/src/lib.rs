//! cardlink-test-harness: Test utilities for cardlink.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! AT protocol engine without a real modem, and [`MockConnector`] for
//! exercising connect and reconnect paths.

pub mod mock_connector;
pub mod mock_serial;

pub use mock_connector::MockConnector;
pub use mock_serial::{MockHandle, MockTransport};
