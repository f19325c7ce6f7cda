//! Serial port transport for modem channels.
//!
//! USB modems of this family enumerate as several virtual serial ports:
//! one carries the AT command protocol, another carries PCM audio. Both
//! are opened as a [`SerialTransport`]. The audio port is never read here;
//! the IO task only probes it for liveness.
//!
//! # Example
//!
//! ```no_run
//! use cardlink_transport::SerialTransport;
//! use cardlink_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> cardlink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB1", 115_200).await?;
//! transport.send(b"AT\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use cardlink_core::error::{Error, Result};
use cardlink_core::transport::{Connector, Transport};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};

/// Serial port configuration.
///
/// Ports are always opened 8N1. The defaults match the modem's virtual
/// ports: 115200 baud with RTS/CTS flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            flow_control: FlowControl::Hardware,
        }
    }
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => tokio_serial::FlowControl::None,
            FlowControl::Software => tokio_serial::FlowControl::Software,
            FlowControl::Hardware => tokio_serial::FlowControl::Hardware,
        }
    }
}

/// One modem channel over a serial port.
pub struct SerialTransport {
    port: Option<SerialStream>,
    port_name: String,
}

impl SerialTransport {
    /// Open a serial port with the given baud rate and default settings.
    pub async fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let config = SerialConfig {
            baud_rate,
            ..Default::default()
        };
        Self::open_with_config(port, &config).await
    }

    /// Open a serial port with full configuration control.
    pub async fn open_with_config(port: &str, config: &SerialConfig) -> Result<Self> {
        tracing::debug!(
            port = %port,
            baud_rate = config.baud_rate,
            flow_control = ?config.flow_control,
            "Opening serial port"
        );

        let serial_stream = tokio_serial::new(port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(config.flow_control.into())
            .open_native_async()
            .map_err(|e| {
                tracing::error!(port = %port, error = %e, "Failed to open serial port");
                Error::Transport(format!("Failed to open serial port {}: {}", port, e))
            })?;

        // Stale input from before the open would be framed as responses.
        if let Err(e) = serial_stream.clear(tokio_serial::ClearBuffer::All) {
            tracing::warn!(port = %port, error = %e, "Failed to flush serial buffers");
        }

        tracing::info!(port = %port, baud_rate = config.baud_rate, "Serial port opened");

        Ok(Self {
            port: Some(serial_stream),
            port_name: port.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

fn map_io_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::BrokenPipe || e.kind() == std::io::ErrorKind::NotConnected
    {
        Error::ConnectionLost
    } else {
        Error::Io(e)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!(port = %self.port_name, bytes = data.len(), "Sending data");

        port.write_all(data).await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to send data");
            map_io_error(e)
        })?;
        port.flush().await.map_err(|e| {
            tracing::error!(port = %self.port_name, error = %e, "Failed to flush serial port");
            Error::Io(e)
        })?;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;

        match tokio::time::timeout(timeout, port.read(buf)).await {
            Ok(Ok(n)) => {
                tracing::trace!(port = %self.port_name, bytes = n, "Received data");
                Ok(n)
            }
            Ok(Err(e)) => {
                tracing::error!(port = %self.port_name, error = %e, "Failed to receive data");
                Err(map_io_error(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            if let Err(e) = port.flush().await {
                tracing::warn!(
                    port = %self.port_name,
                    error = %e,
                    "Failed to flush before closing (continuing anyway)"
                );
            }
            tracing::info!(port = %self.port_name, "Serial port closed");
        }
        Ok(())
    }

    /// Probes the port: a modem that was unplugged fails the query even
    /// though the descriptor is still open.
    fn is_connected(&self) -> bool {
        self.port
            .as_ref()
            .is_some_and(|port| port.bytes_to_read().is_ok())
    }
}

/// Opens [`SerialTransport`]s at each device's configured baud rate.
#[derive(Debug, Clone, Copy)]
pub struct SerialConnector {
    flow_control: FlowControl,
}

impl SerialConnector {
    pub fn new(flow_control: FlowControl) -> Self {
        SerialConnector { flow_control }
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        SerialConnector::new(SerialConfig::default().flow_control)
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn open(&self, address: &str, baud_rate: u32) -> Result<Box<dyn Transport>> {
        let config = SerialConfig {
            baud_rate,
            flow_control: self.flow_control,
        };
        let transport = SerialTransport::open_with_config(address, &config).await?;
        Ok(Box::new(transport))
    }
}
