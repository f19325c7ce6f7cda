//! Transport implementations for cardlink.
//!
//! Provides [`SerialTransport`], the [`Transport`](cardlink_core::Transport)
//! used for both modem channels, and [`SerialConnector`], which opens them
//! by device path for the registry.

pub mod serial;

pub use serial::{FlowControl, SerialConfig, SerialConnector, SerialTransport};
