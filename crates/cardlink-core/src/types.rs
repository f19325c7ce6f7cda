//! Core data types shared across cardlink crates.

use std::fmt;

/// Overall readiness of a device.
///
/// `Ready` implies both channels are open and the initialization
/// handshake has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    Disconnected,
    Connecting,
    Initializing,
    Ready,
}

impl LifecycleState {
    /// Whether caller operations are accepted in this state.
    pub fn is_ready(self) -> bool {
        self == LifecycleState::Ready
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Disconnected => "disconnected",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Features discovered during the initialization handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// The modem accepted `AT^CVOICE?` and reported voice support.
    pub voice: bool,
    /// The modem accepted text-mode message configuration.
    pub message: bool,
}

/// Network registration status as reported by `+CREG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationStatus {
    NotRegistered,
    Home,
    Searching,
    Denied,
    #[default]
    Unknown,
    Roaming,
}

impl RegistrationStatus {
    /// Map the numeric `<stat>` field of a `+CREG` response.
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => RegistrationStatus::NotRegistered,
            1 => RegistrationStatus::Home,
            2 => RegistrationStatus::Searching,
            3 => RegistrationStatus::Denied,
            5 => RegistrationStatus::Roaming,
            _ => RegistrationStatus::Unknown,
        }
    }

    pub fn is_registered(self) -> bool {
        matches!(self, RegistrationStatus::Home | RegistrationStatus::Roaming)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrationStatus::NotRegistered => "not registered",
            RegistrationStatus::Home => "registered, home network",
            RegistrationStatus::Searching => "searching",
            RegistrationStatus::Denied => "registration denied",
            RegistrationStatus::Unknown => "unknown",
            RegistrationStatus::Roaming => "registered, roaming",
        };
        f.write_str(s)
    }
}

/// Call-scoped state of a device. Reset on hangup and disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallFlags {
    /// A `RING` arrived and the call has not been answered yet.
    pub incoming: bool,
    /// The modem reported `^ORIG` for a call it originated.
    pub outgoing: bool,
    /// An incoming call still needs to be announced to the routing layer.
    pub ring: bool,
    /// A call is up on the modem, so hangup must send `AT+CHUP`.
    pub hangup: bool,
    /// The incoming call was answered.
    pub answered: bool,
}

impl CallFlags {
    pub fn is_idle(&self) -> bool {
        *self == CallFlags::default()
    }
}

/// Identity strings reported by the modem during initialization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModemIdentity {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub imei: Option<String>,
    pub imsi: Option<String>,
    pub own_number: Option<String>,
}

/// Point-in-time snapshot of a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub data_address: String,
    pub audio_address: String,
    pub state: LifecycleState,
    pub capabilities: Capabilities,
    pub registration: RegistrationStatus,
    /// Last reported signal level (0-31, 99 = unknown).
    pub signal: Option<u8>,
    pub identity: ModemIdentity,
    pub call: CallFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_defaults_to_disconnected() {
        assert_eq!(LifecycleState::default(), LifecycleState::Disconnected);
        assert!(LifecycleState::Ready.is_ready());
        assert!(!LifecycleState::Initializing.is_ready());
    }

    #[test]
    fn registration_codes() {
        assert!(RegistrationStatus::from_code(1).is_registered());
        assert!(RegistrationStatus::from_code(5).is_registered());
        assert!(!RegistrationStatus::from_code(2).is_registered());
        assert_eq!(RegistrationStatus::from_code(4), RegistrationStatus::Unknown);
        assert_eq!(RegistrationStatus::from_code(3), RegistrationStatus::Denied);
    }

    #[test]
    fn call_flags_idle() {
        let mut flags = CallFlags::default();
        assert!(flags.is_idle());
        flags.ring = true;
        assert!(!flags.is_idle());
    }

    #[test]
    fn lifecycle_display() {
        assert_eq!(LifecycleState::Initializing.to_string(), "initializing");
    }
}
