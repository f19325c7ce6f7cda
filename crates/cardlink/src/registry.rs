//! The set of configured devices and their reconnect scan.
//!
//! The collection lock is held only to look up, snapshot, add or remove
//! devices. Device operations run on a cloned [`Device`] handle after the
//! collection lock is released, so the two locks never nest.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cardlink_core::error::{Error, Result};
use cardlink_core::events::ModemEvent;
use cardlink_core::transport::Connector;
use cardlink_core::types::{DeviceInfo, LifecycleState};

use crate::call::CallBinding;
use crate::config::{DeviceConfig, RegistryConfig};
use crate::device::Device;

const EVENT_CAPACITY: usize = 256;

struct ReconnectTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct RegistryInner {
    connector: Arc<dyn Connector>,
    events: broadcast::Sender<ModemEvent>,
    devices: Mutex<BTreeMap<String, Device>>,
    reconnect_interval: Duration,
    reconnect: Mutex<Option<ReconnectTask>>,
}

/// Owns every device. Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Build a registry with one disconnected device per configured entry.
    pub fn new(config: RegistryConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut devices = BTreeMap::new();
        for device in config.devices {
            check_config(&device)?;
            if devices.contains_key(&device.name) {
                return Err(Error::InvalidParameter(format!(
                    "duplicate device name {:?}",
                    device.name
                )));
            }
            let name = device.name.clone();
            devices.insert(name, Device::new(device, connector.clone(), events.clone()));
        }
        Ok(Registry {
            inner: Arc::new(RegistryInner {
                connector,
                events,
                devices: Mutex::new(devices),
                reconnect_interval: config.reconnect_interval,
                reconnect: Mutex::new(None),
            }),
        })
    }

    /// Build a registry that opens devices as serial ports.
    #[cfg(feature = "serial")]
    pub fn with_serial(config: RegistryConfig) -> Result<Self> {
        Self::new(config, Arc::new(cardlink_transport::SerialConnector::default()))
    }

    /// Receive events from every device.
    pub fn subscribe(&self) -> broadcast::Receiver<ModemEvent> {
        self.inner.events.subscribe()
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.inner.reconnect_interval
    }

    pub async fn add_device(&self, config: DeviceConfig) -> Result<Device> {
        check_config(&config)?;
        let mut devices = self.inner.devices.lock().await;
        if devices.contains_key(&config.name) {
            return Err(Error::InvalidParameter(format!(
                "duplicate device name {:?}",
                config.name
            )));
        }
        let name = config.name.clone();
        let device = Device::new(config, self.inner.connector.clone(), self.inner.events.clone());
        devices.insert(name.clone(), device.clone());
        info!(device = %name, "device added");
        Ok(device)
    }

    /// Remove a device, disconnecting it first.
    pub async fn remove_device(&self, name: &str) -> Result<()> {
        let device = self
            .inner
            .devices
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| Error::UnknownDevice(name.to_string()))?;
        device.disconnect().await;
        info!(device = %name, "device removed");
        Ok(())
    }

    pub async fn device(&self, name: &str) -> Option<Device> {
        self.inner.devices.lock().await.get(name).cloned()
    }

    /// Snapshot of all devices, ordered by name.
    pub async fn devices(&self) -> Vec<Device> {
        self.inner.devices.lock().await.values().cloned().collect()
    }

    pub async fn infos(&self) -> Vec<DeviceInfo> {
        let mut infos = Vec::new();
        for device in self.devices().await {
            infos.push(device.info().await);
        }
        infos
    }

    async fn lookup(&self, name: &str) -> Result<Device> {
        self.device(name)
            .await
            .ok_or_else(|| Error::UnknownDevice(name.to_string()))
    }

    pub async fn send_message(&self, name: &str, destination: &str, payload: &[u8]) -> Result<()> {
        self.lookup(name).await?.send_message(destination, payload).await
    }

    pub async fn send_code(&self, name: &str, code: &str) -> Result<()> {
        self.lookup(name).await?.send_code(code).await
    }

    /// Bind the device's current call to `context`.
    ///
    /// Fails with [`Error::NoActiveCall`] if the device has no call.
    pub async fn bind_call<C>(&self, name: &str, context: C) -> Result<CallBinding<C>> {
        let call_id = self.lookup(name).await?.current_call().await?;
        debug!(device = %name, call_id, "call bound");
        Ok(CallBinding::new(self.clone(), name.to_string(), call_id, context))
    }

    /// Start a connection attempt on every disconnected device.
    pub async fn reconnect_all(&self) {
        for device in self.devices().await {
            if device.state().await != LifecycleState::Disconnected {
                continue;
            }
            if let Err(e) = device.connect().await {
                debug!(device = %device.name(), error = %e, "reconnect attempt failed");
            }
        }
    }

    /// Spawn the periodic reconnect scan. Does nothing if it is running.
    pub async fn start(&self) {
        let mut slot = self.inner.reconnect.lock().await;
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return;
        }
        let cancel = CancellationToken::new();
        let registry = self.clone();
        let token = cancel.clone();
        let interval = self.inner.reconnect_interval;
        let handle = tokio::spawn(async move {
            info!(?interval, "reconnect scan started");
            loop {
                registry.reconnect_all().await;
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            debug!("reconnect scan stopped");
        });
        *slot = Some(ReconnectTask { cancel, handle });
    }

    /// Stop the reconnect scan and disconnect every device.
    pub async fn shutdown(&self) {
        let task = self.inner.reconnect.lock().await.take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "reconnect task ended abnormally");
            }
        }
        for device in self.devices().await {
            device.disconnect().await;
        }
        info!("registry shut down");
    }
}

fn check_config(config: &DeviceConfig) -> Result<()> {
    config
        .validate()
        .map_err(|e| Error::InvalidParameter(e.to_string()))
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("reconnect_interval", &self.inner.reconnect_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_test_harness::MockConnector;

    fn registry(names: &[&str]) -> Registry {
        let config = RegistryConfig {
            devices: names
                .iter()
                .map(|n| DeviceConfig::new(*n, format!("/dev/{n}-data"), format!("/dev/{n}-audio")))
                .collect(),
            ..Default::default()
        };
        Registry::new(config, Arc::new(MockConnector::new())).unwrap()
    }

    #[tokio::test]
    async fn devices_are_ordered_by_name() {
        let registry = registry(&["card1", "card0"]);
        let names: Vec<String> = registry
            .devices()
            .await
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, ["card0", "card1"]);
    }

    #[tokio::test]
    async fn rejects_duplicates() {
        let config = RegistryConfig {
            devices: vec![
                DeviceConfig::new("card0", "a", "b"),
                DeviceConfig::new("card0", "c", "d"),
            ],
            ..Default::default()
        };
        assert!(Registry::new(config, Arc::new(MockConnector::new())).is_err());

        let registry = registry(&["card0"]);
        assert!(matches!(
            registry.add_device(DeviceConfig::new("card0", "x", "y")).await,
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            registry.add_device(DeviceConfig::new("card1", "", "y")).await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn add_and_remove() {
        let registry = registry(&[]);
        registry
            .add_device(DeviceConfig::new("card0", "/dev/a", "/dev/b"))
            .await
            .unwrap();
        assert!(registry.device("card0").await.is_some());

        registry.remove_device("card0").await.unwrap();
        assert!(registry.device("card0").await.is_none());
        assert!(matches!(
            registry.remove_device("card0").await,
            Err(Error::UnknownDevice(_))
        ));
    }

    #[tokio::test]
    async fn lookups_report_unknown_devices() {
        let registry = registry(&["card0"]);
        assert!(matches!(
            registry.send_code("nope", "*100#").await,
            Err(Error::UnknownDevice(_))
        ));
        assert!(matches!(
            registry.bind_call("nope", ()).await,
            Err(Error::UnknownDevice(_))
        ));
        assert!(matches!(
            registry.bind_call("card0", ()).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn reconnect_leaves_unreachable_devices_disconnected() {
        let registry = registry(&["card0"]);
        registry.reconnect_all().await;
        let info = registry.infos().await;
        assert_eq!(info[0].state, LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn start_and_shutdown_are_repeatable() {
        let registry = registry(&["card0"]);
        registry.start().await;
        registry.start().await;
        registry.shutdown().await;
        registry.shutdown().await;
    }
}
