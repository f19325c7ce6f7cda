//! Device and registry configuration.
//!
//! Configuration arrives as TOML:
//!
//! ```toml
//! reconnect_interval_ms = 5000
//!
//! [[device]]
//! name = "card0"
//! data = "/dev/ttyUSB2"
//! audio = "/dev/ttyUSB1"
//! command_timeout_ms = 10000
//! ```
//!
//! The raw `*Input` structs mirror the file; [`RegistryConfigInput::resolve`]
//! fills defaults and validates into the typed [`RegistryConfig`].

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("device #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("device name {0:?} is used more than once")]
    DuplicateName(String),

    #[error("device {device:?} has an empty {field} address")]
    EmptyAddress { device: String, field: &'static str },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryConfigInput {
    pub reconnect_interval_ms: Option<u64>,
    #[serde(rename = "device")]
    pub devices: Vec<DeviceConfigInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfigInput {
    pub name: String,
    pub data: String,
    pub audio: String,
    pub baud_rate: Option<u32>,
    pub command_timeout_ms: Option<u64>,
}

/// One modem: its name and the addresses of its two channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    /// Control channel (AT commands).
    pub data: String,
    /// Audio channel, probed for liveness only.
    pub audio: String,
    pub baud_rate: u32,
    /// How long a command may stay in flight once the device is ready.
    pub command_timeout: Duration,
}

impl DeviceConfig {
    pub fn new(
        name: impl Into<String>,
        data: impl Into<String>,
        audio: impl Into<String>,
    ) -> Self {
        DeviceConfig {
            name: name.into(),
            data: data.into(),
            audio: audio.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName { index: 0 });
        }
        for (field, value) in [("data", &self.data), ("audio", &self.audio)] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyAddress {
                    device: self.name.clone(),
                    field,
                });
            }
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Zero("baud_rate"));
        }
        if self.command_timeout.is_zero() {
            return Err(ConfigError::Zero("command_timeout_ms"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Period of the reconnect scan.
    pub reconnect_interval: Duration,
    pub devices: Vec<DeviceConfig>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            devices: Vec::new(),
        }
    }
}

impl RegistryConfigInput {
    pub fn resolve(self) -> Result<RegistryConfig, ConfigError> {
        let reconnect_interval = match self.reconnect_interval_ms {
            Some(0) => return Err(ConfigError::Zero("reconnect_interval_ms")),
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_RECONNECT_INTERVAL,
        };

        let mut seen = HashSet::new();
        let mut devices = Vec::with_capacity(self.devices.len());
        for (index, input) in self.devices.into_iter().enumerate() {
            let name = input.name.trim().to_string();
            if name.is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateName(name));
            }
            let mut device = DeviceConfig::new(name, input.data.trim(), input.audio.trim());
            if let Some(baud) = input.baud_rate {
                device = device.baud_rate(baud);
            }
            if let Some(ms) = input.command_timeout_ms {
                device = device.command_timeout(Duration::from_millis(ms));
            }
            device.validate()?;
            devices.push(device);
        }

        Ok(RegistryConfig {
            reconnect_interval,
            devices,
        })
    }
}

impl RegistryConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: RegistryConfigInput = toml::from_str(input)?;
        raw.resolve()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
