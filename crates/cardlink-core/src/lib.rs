//! cardlink-core: Core traits, types, and error definitions for cardlink.
//!
//! This crate defines the link-agnostic abstractions shared by the AT
//! protocol engine, the transports, and the device facade.
//!
//! # Key types
//!
//! - [`Transport`] / [`Connector`] -- byte-level channels and how to open them
//! - [`ModemEvent`] -- asynchronous notifications for the call-routing layer
//! - [`LifecycleState`], [`Capabilities`], [`CallFlags`] -- device state
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::ModemEvent;
pub use transport::{Connector, Transport};
pub use types::*;
