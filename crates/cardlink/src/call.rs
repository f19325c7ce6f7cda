//! Live-call handle for the call-routing layer.
//!
//! A [`CallBinding`] names its device by key and the call by id; it owns
//! neither. Each operation looks the device up again and checks the call is
//! still the device's current one, so a binding that outlived its call
//! (remote hangup, disconnect, device removal) fails cleanly instead of
//! acting on the next call.
//!
//! Operations queue one command each and return without waiting for the
//! modem's answer. A modem that rejects the command is only logged.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use cardlink_core::error::{Error, Result};

use crate::device::Device;
use crate::registry::Registry;

pub struct CallBinding<C> {
    registry: Registry,
    device: String,
    call_id: u64,
    context: C,
    active: AtomicBool,
}

impl<C> CallBinding<C> {
    pub(crate) fn new(registry: Registry, device: String, call_id: u64, context: C) -> Self {
        CallBinding {
            registry,
            device,
            call_id,
            context,
            active: AtomicBool::new(true),
        }
    }

    /// The caller-supplied context this binding carries.
    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn device_name(&self) -> &str {
        &self.device
    }

    /// Whether the binding has not been hung up locally and its call is
    /// still current on the device.
    pub async fn is_active(&self) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        match self.registry.device(&self.device).await {
            Some(device) => device.call_active(self.call_id).await,
            None => false,
        }
    }

    async fn resolve(&self) -> Result<Device> {
        if !self.active.load(Ordering::Acquire) {
            return Err(Error::NoActiveCall);
        }
        self.registry
            .device(&self.device)
            .await
            .ok_or_else(|| Error::UnknownDevice(self.device.clone()))
    }

    /// Answer the incoming call (`ATA`).
    pub async fn answer(&self) -> Result<()> {
        let result = match self.resolve().await {
            Ok(device) => device.answer(self.call_id).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(device = %self.device, error = %e, "answer not sent");
        }
        result
    }

    /// Send one DTMF digit on the call. Accepts `0-9`, `*`, `#` and `A-D`.
    pub async fn send_tone(&self, digit: char) -> Result<()> {
        let result = match self.resolve().await {
            Ok(device) => device.send_tone(self.call_id, digit).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(device = %self.device, %digit, error = %e, "tone not sent");
        }
        result
    }

    /// Hang up and release the binding.
    ///
    /// Local call state is cleared whether or not the device is reachable
    /// or answers. Calling it again does nothing.
    pub async fn hangup(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let current = match self.registry.device(&self.device).await {
            Some(device) => device.hangup(self.call_id).await,
            None => false,
        };
        info!(device = %self.device, current, "call released");
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for CallBinding<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallBinding")
            .field("device", &self.device)
            .field("call_id", &self.call_id)
            .field("context", &self.context)
            .field("active", &self.active.load(Ordering::Relaxed))
            .finish()
    }
}
