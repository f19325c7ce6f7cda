//! Mock [`Connector`] that hands out scripted transports by address.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use cardlink_core::error::{Error, Result};
use cardlink_core::transport::{Connector, Transport};

use crate::mock_serial::{MockHandle, MockTransport};

#[derive(Debug, Default)]
struct ConnectorState {
    ready: HashMap<String, VecDeque<MockTransport>>,
    opened: Vec<String>,
}

/// Opens queued [`MockTransport`]s. An address with nothing queued fails
/// to open, like an absent serial device.
#[derive(Debug, Default)]
pub struct MockConnector {
    state: Mutex<ConnectorState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a transport for the next open of `address`. Returns its handle.
    pub fn add(&self, address: &str, transport: MockTransport) -> MockHandle {
        let handle = transport.handle();
        self.lock()
            .ready
            .entry(address.to_string())
            .or_default()
            .push_back(transport);
        handle
    }

    /// Addresses opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    pub fn open_count(&self, address: &str) -> usize {
        self.lock().opened.iter().filter(|a| *a == address).count()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, address: &str, _baud_rate: u32) -> Result<Box<dyn Transport>> {
        let mut state = self.lock();
        let transport = state
            .ready
            .get_mut(address)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| Error::Transport(format!("unable to open {address}")))?;
        state.opened.push(address.to_string());
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_queued_transports_in_order() {
        let connector = MockConnector::new();
        let first = connector.add("/dev/ttyUSB1", MockTransport::new());
        connector.add("/dev/ttyUSB1", MockTransport::new());

        let transport = connector.open("/dev/ttyUSB1", 115_200).await.unwrap();
        assert!(transport.is_connected());
        first.set_connected(false);
        assert!(!transport.is_connected());

        assert!(connector.open("/dev/ttyUSB1", 115_200).await.is_ok());
        assert!(matches!(
            connector.open("/dev/ttyUSB1", 115_200).await,
            Err(Error::Transport(_))
        ));
        assert_eq!(connector.open_count("/dev/ttyUSB1"), 2);
    }

    #[tokio::test]
    async fn unknown_address_fails() {
        let connector = MockConnector::new();
        assert!(connector.open("/dev/ttyUSB9", 115_200).await.is_err());
        assert!(connector.opened().is_empty());
    }
}
