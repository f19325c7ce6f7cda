//! Transport and connector traits for modem communication.
//!
//! A modem exposes two channels: the control channel carrying the AT
//! command protocol, and the audio channel whose health is probed but
//! whose samples are moved by the host. Both are reached through a
//! [`Transport`]; a [`Connector`] opens them by address so the registry
//! can reconnect a device without knowing what kind of link it uses.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to one modem channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the modem.
    ///
    /// Implementations should return only once all bytes have been handed
    /// to the underlying device. A partial write is an error.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the modem into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing arrived within the deadline. Dropping the returned future
    /// before completion must not lose bytes.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    /// Closing an already closed transport is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Liveness probe: whether the channel is open and the device behind
    /// it is still present.
    fn is_connected(&self) -> bool;
}

/// Opens [`Transport`]s by address (e.g. `/dev/ttyUSB1`).
///
/// `baud_rate` is the line rate configured for the device; connectors for
/// links without one ignore it.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, address: &str, baud_rate: u32) -> Result<Box<dyn Transport>>;
}
