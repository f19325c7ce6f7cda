//! Mock transport for deterministic testing of the protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs. When the engine sends the expected request, the
//! matching response becomes readable. Bytes can also be injected at any
//! time through a [`MockHandle`] to simulate unsolicited modem output, and
//! the handle keeps working after the transport has been moved into an IO
//! task.
//!
//! # Example
//!
//! ```
//! use cardlink_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the engine sends the probe, answer OK.
//! mock.expect(b"AT\r", b"\r\nOK\r\n");
//! let handle = mock.handle();
//! handle.inject(b"\r\nRING\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use cardlink_core::error::{Error, Result};
use cardlink_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    expectations: VecDeque<Expectation>,
    /// Bytes readable by the next `receive()` calls.
    inbound: VecDeque<u8>,
    connected: bool,
    sent_log: Vec<Vec<u8>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    readable: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panic while holding the lock already failed the test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A mock [`Transport`] for testing without hardware.
///
/// Expectations are consumed in order. A `send()` that does not match the
/// next expectation, or that arrives when none are left, fails with
/// [`Error::Protocol`]. `receive()` waits up to its timeout for readable
/// bytes, so an idle mock behaves like a silent modem.
#[derive(Debug)]
pub struct MockTransport {
    shared: Arc<Shared>,
}

/// Shared view of a [`MockTransport`] for inspection and injection.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            shared: Arc::new(Shared {
                state: Mutex::new(MockState {
                    expectations: VecDeque::new(),
                    inbound: VecDeque::new(),
                    connected: true,
                    sent_log: Vec::new(),
                }),
                readable: Notify::new(),
            }),
        }
    }

    /// Add an expected request/response pair.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.shared.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// A handle that stays valid after the transport is boxed and moved.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: self.shared.clone(),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHandle {
    /// Make bytes readable as if the modem had sent them unprompted.
    pub fn inject(&self, data: &[u8]) {
        self.shared.lock().inbound.extend(data.iter().copied());
        self.shared.readable.notify_one();
    }

    /// Add an expected request/response pair.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.shared.lock().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Every `send()` payload so far, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.shared.lock().sent_log.clone()
    }

    /// Number of expectations not yet consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.shared.lock().expectations.len()
    }

    /// Simulate the device appearing or disappearing.
    pub fn set_connected(&self, connected: bool) {
        self.shared.lock().connected = connected;
        self.shared.readable.notify_one();
    }

    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.shared.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }
        state.sent_log.push(data.to_vec());

        let Some(expectation) = state.expectations.pop_front() else {
            return Err(Error::Protocol(format!(
                "no more expectations in mock transport (sent {:?})",
                String::from_utf8_lossy(data)
            )));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        state.inbound.extend(expectation.response);
        drop(state);
        self.shared.readable.notify_one();
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut state = self.shared.lock();
                if !state.connected {
                    return Err(Error::NotConnected);
                }
                if !state.inbound.is_empty() {
                    let n = state.inbound.len().min(buf.len());
                    for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
                        *slot = byte;
                    }
                    return Ok(n);
                }
            }
            if tokio::time::timeout_at(deadline, self.shared.readable.notified())
                .await
                .is_err()
            {
                return Err(Error::Timeout);
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.connected = false;
        state.inbound.clear();
        drop(state);
        self.shared.readable.notify_one();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_then_receive_expected_response() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT\r", b"\r\nOK\r\n");

        mock.send(b"AT\r").await.unwrap();
        let mut buf = [0u8; 64];
        let n = mock
            .receive(&mut buf, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(&buf[..n], b"\r\nOK\r\n");
    }

    #[tokio::test]
    async fn tracks_sent_data() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        mock.expect(b"AT\r", b"");
        mock.expect(b"ATE0\r", b"");

        mock.send(b"AT\r").await.unwrap();
        mock.send(b"ATE0\r").await.unwrap();

        assert_eq!(handle.sent_data(), vec![b"AT\r".to_vec(), b"ATE0\r".to_vec()]);
        assert_eq!(handle.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn wrong_data_errors() {
        let mut mock = MockTransport::new();
        mock.expect(b"AT\r", b"OK");
        let result = mock.send(b"ATZ\r").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test]
    async fn no_expectations_errors() {
        let mut mock = MockTransport::new();
        let result = mock.send(b"AT\r").await;
        assert!(matches!(result.unwrap_err(), Error::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_without_data_times_out() {
        let mut mock = MockTransport::new();
        let mut buf = [0u8; 16];
        let result = mock.receive(&mut buf, Duration::from_millis(1000)).await;
        assert!(matches!(result.unwrap_err(), Error::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn injected_bytes_wake_a_pending_receive() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            let n = mock.receive(&mut buf, Duration::from_secs(5)).await.unwrap();
            buf[..n].to_vec()
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.inject(b"RING\r\n");
        assert_eq!(reader.await.unwrap(), b"RING\r\n");
    }

    #[tokio::test]
    async fn partial_receive() {
        let mut mock = MockTransport::new();
        mock.handle().inject(b"ABCD");
        let mut buf = [0u8; 2];
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"AB");
        let n = mock.receive(&mut buf, Duration::from_millis(10)).await.unwrap();
        assert_eq!(&buf[..n], b"CD");
    }

    #[tokio::test]
    async fn close_disconnects() {
        let mut mock = MockTransport::new();
        let handle = mock.handle();
        assert!(mock.is_connected());
        mock.close().await.unwrap();
        assert!(!handle.is_connected());
        assert!(matches!(
            mock.send(b"AT\r").await.unwrap_err(),
            Error::NotConnected
        ));
        // Closing twice is harmless.
        mock.close().await.unwrap();
    }

    #[tokio::test]
    async fn set_connected_false_fails_io() {
        let mut mock = MockTransport::new();
        mock.handle().set_connected(false);
        let mut buf = [0u8; 8];
        let result = mock.receive(&mut buf, Duration::from_millis(10)).await;
        assert!(matches!(result.unwrap_err(), Error::NotConnected));
    }
}
