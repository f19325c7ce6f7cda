//! Error types for cardlink.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer, and
//! caller-facing errors are all captured here.

/// The error type for all cardlink operations.
///
/// Fatal conditions ([`Error::Framing`], [`Error::Transport`],
/// [`Error::ConnectionLost`], [`Error::Io`] and a pre-ready
/// [`Error::Timeout`]) force the device back to `Disconnected`. The
/// remaining variants are reported to the caller and leave the device
/// running.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open, write or read failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected response, handshake failure).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The line framer overflowed its buffer or reached an invalid state.
    #[error("framing fault: {0}")]
    Framing(String),

    /// Timed out waiting for the modem.
    ///
    /// Before initialization completes this is fatal; afterwards it only
    /// fails the stale in-flight command.
    #[error("timeout waiting for response")]
    Timeout,

    /// The modem answered the in-flight command with an error response.
    #[error("command rejected: {0}")]
    Rejected(String),

    /// No connection to the modem has been established.
    #[error("not connected")]
    NotConnected,

    /// The modem is connected but has not finished initialization.
    #[error("device not ready")]
    NotReady,

    /// The modem is ready but not registered with a network.
    #[error("not registered with a network")]
    NotRegistered,

    /// The modem does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The call binding no longer refers to an active call.
    #[error("no active call")]
    NoActiveCall,

    /// An invalid parameter was passed to an operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No device with the given name is registered.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// The connection to the modem was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
