//! # cardlink
//!
//! Asynchronous control of UMTS voice/data modems that expose two serial
//! channels: one carrying the AT command protocol, one carrying call audio.
//!
//! ```no_run
//! use cardlink::{ModemEvent, Registry, RegistryConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RegistryConfig::load("cardlink.toml")?;
//! let registry = Registry::with_serial(config)?;
//! let mut events = registry.subscribe();
//! registry.start().await;
//!
//! while let Ok(event) = events.recv().await {
//!     if let ModemEvent::IncomingCall { device, .. } = event {
//!         let call = registry.bind_call(&device, ()).await?;
//!         call.answer().await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate                   | Purpose                                               |
//! |-------------------------|-------------------------------------------------------|
//! | `cardlink-core`         | Error type, transport traits, events, state types     |
//! | `cardlink-at`           | Line framer, classifier, command queue, IO task       |
//! | `cardlink-transport`    | Serial transport (tokio-serial)                       |
//! | **`cardlink`**          | This crate: configuration, devices, calls, registry   |
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                   | Default |
//! |----------|-------------------------------------------|---------|
//! | `serial` | [`SerialConnector`] and `Registry::with_serial` | yes |

pub mod call;
pub mod config;
pub mod device;
mod handshake;
pub mod lifecycle;
mod notify;
pub mod registry;

pub use call::CallBinding;
pub use config::{ConfigError, DeviceConfig, RegistryConfig};
pub use device::Device;
pub use registry::Registry;

pub use cardlink_core::{
    CallFlags, Capabilities, Connector, DeviceInfo, Error, LifecycleState, ModemEvent,
    ModemIdentity, RegistrationStatus, Result, Transport,
};

#[cfg(feature = "serial")]
pub use cardlink_transport::{FlowControl, SerialConfig, SerialConnector, SerialTransport};
