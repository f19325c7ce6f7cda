//! Asynchronous modem event types.
//!
//! Events are emitted through a `tokio::sync::broadcast` channel
//! owned by the registry. The call-routing layer subscribes to learn about
//! incoming calls and network notifications without polling.

use crate::types::{ModemIdentity, RegistrationStatus};

/// An event emitted when a device's state changes or the modem pushes an
/// unsolicited notification.
///
/// Every variant carries the name of the device it came from. Delivery is
/// best-effort; slow subscribers may miss events.
#[derive(Debug, Clone, PartialEq)]
pub enum ModemEvent {
    /// Both channels opened; initialization has started.
    Connected { device: String },

    /// Initialization completed.
    Ready {
        device: String,
        identity: ModemIdentity,
    },

    /// The device returned to `Disconnected`.
    Disconnected { device: String },

    /// Signal level update (`^RSSI` or `+CSQ`), 0-31 or 99 for unknown.
    Signal { device: String, level: u8 },

    /// Network registration changed.
    Registration {
        device: String,
        status: RegistrationStatus,
    },

    /// An incoming call is ringing. Emitted once per call: on `+CLIP`, or
    /// on the second `RING` if no caller id arrived after the first.
    IncomingCall {
        device: String,
        caller: Option<String>,
    },

    /// The modem reported the call as connected (`^CONN`).
    CallConnected { device: String },

    /// The call ended on the modem side (`^CEND`, `NO CARRIER`, `BUSY`).
    CallEnded {
        device: String,
        cause: Option<String>,
    },

    /// A stored message was read. `body` is the raw wire form.
    MessageReceived {
        device: String,
        index: u32,
        header: String,
        body: String,
    },

    /// A queued outgoing message completed.
    MessageSent { device: String, success: bool },

    /// Result of a feature code (USSD) request, raw text.
    FeatureCodeResult { device: String, response: String },

    /// The modem's message storage is full.
    MemoryFull { device: String },
}

impl ModemEvent {
    /// Name of the device the event came from.
    pub fn device(&self) -> &str {
        match self {
            ModemEvent::Connected { device }
            | ModemEvent::Ready { device, .. }
            | ModemEvent::Disconnected { device }
            | ModemEvent::Signal { device, .. }
            | ModemEvent::Registration { device, .. }
            | ModemEvent::IncomingCall { device, .. }
            | ModemEvent::CallConnected { device }
            | ModemEvent::CallEnded { device, .. }
            | ModemEvent::MessageReceived { device, .. }
            | ModemEvent::MessageSent { device, .. }
            | ModemEvent::FeatureCodeResult { device, .. }
            | ModemEvent::MemoryFull { device } => device,
        }
    }
}
