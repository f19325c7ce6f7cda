//! A single modem: lifecycle, protocol state and caller operations.
//!
//! Every piece of mutable per-device state lives in one [`DeviceState`]
//! behind one lock. The IO task reaches it through [`DeviceLink`], the
//! device's [`LinkHandler`]; caller operations lock it directly. Neither
//! side holds the lock across a channel wait.
//!
//! Each connect starts a new session. The IO task carries the session
//! number it was started for and ignores the device once the number has
//! moved on, so a loop that is still winding down can never touch a
//! reconnected device.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard, broadcast, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use cardlink_at::command::{self, Command, CommandKind};
use cardlink_at::io::{IoConfig, LinkHandler, LinkIo, spawn_io_task};
use cardlink_at::protocol::{ResponseKind, classify};
use cardlink_at::queue::{Completion, LineOutcome, TransactionManager};
use cardlink_core::error::{Error, Result};
use cardlink_core::events::ModemEvent;
use cardlink_core::transport::{Connector, Transport};
use cardlink_core::types::{
    CallFlags, Capabilities, DeviceInfo, LifecycleState, ModemIdentity, RegistrationStatus,
};

use crate::config::DeviceConfig;
use crate::handshake;
use crate::lifecycle::{Effect, LifecycleEvent, transition};
use crate::notify;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DeviceState {
    lifecycle: LifecycleState,
    session: u64,
    queue: TransactionManager,
    capabilities: Capabilities,
    registration: RegistrationStatus,
    signal: Option<u8>,
    identity: ModemIdentity,
    call: CallFlags,
    /// Id of the current call, 0 when there is none.
    call_id: u64,
    next_call_id: u64,
    /// Index into [`handshake::STEPS`] of the step in flight.
    handshake: usize,
    io: Option<LinkIo>,
}

impl DeviceState {
    fn apply(&mut self, event: LifecycleEvent) -> Effect {
        let t = transition(self.lifecycle, event);
        self.lifecycle = t.state;
        t.effect
    }

    /// Queue a command and wake the IO task to send it.
    fn submit(&mut self, command: Command) {
        self.queue.enqueue(command);
        if let Some(io) = &self.io {
            io.wake();
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.lifecycle {
            LifecycleState::Ready => Ok(()),
            LifecycleState::Disconnected => Err(Error::NotConnected),
            _ => Err(Error::NotReady),
        }
    }

    /// Ready and registered with a network.
    fn ensure_registered(&self) -> Result<()> {
        self.ensure_ready()?;
        if !self.registration.is_registered() {
            return Err(Error::NotRegistered);
        }
        Ok(())
    }

    fn ensure_call(&self, call_id: u64) -> Result<()> {
        if call_id == 0 || self.call_id != call_id {
            return Err(Error::NoActiveCall);
        }
        Ok(())
    }

    fn start_call(&mut self) {
        self.next_call_id += 1;
        self.call_id = self.next_call_id;
    }

    fn end_call(&mut self) {
        self.call = CallFlags::default();
        self.call_id = 0;
    }

    /// Release everything session-scoped. Identity survives for the next
    /// connect. Returns the IO task handle for the caller to stop.
    fn teardown(&mut self, device: &str) -> Option<LinkIo> {
        self.session += 1;
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(device, dropped, "queue cleared");
        }
        self.end_call();
        self.handshake = 0;
        self.capabilities = Capabilities::default();
        self.registration = RegistrationStatus::Unknown;
        self.signal = None;
        self.io.take()
    }
}

struct DeviceShared {
    config: DeviceConfig,
    connector: Arc<dyn Connector>,
    events: broadcast::Sender<ModemEvent>,
    state: Mutex<DeviceState>,
}

impl DeviceShared {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn emit(&self, event: ModemEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// Handle to one modem. Cheap to clone; clones share the same device.
#[derive(Clone)]
pub struct Device {
    shared: Arc<DeviceShared>,
}

impl Device {
    /// Create a disconnected device. Events go to `events`.
    pub fn new(
        config: DeviceConfig,
        connector: Arc<dyn Connector>,
        events: broadcast::Sender<ModemEvent>,
    ) -> Self {
        Device {
            shared: Arc::new(DeviceShared {
                config,
                connector,
                events,
                state: Mutex::new(DeviceState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.shared.config
    }

    pub async fn state(&self) -> LifecycleState {
        self.shared.state.lock().await.lifecycle
    }

    /// Snapshot of the device's current state.
    pub async fn info(&self) -> DeviceInfo {
        let st = self.shared.state.lock().await;
        let config = &self.shared.config;
        DeviceInfo {
            name: config.name.clone(),
            data_address: config.data.clone(),
            audio_address: config.audio.clone(),
            state: st.lifecycle,
            capabilities: st.capabilities,
            registration: st.registration,
            signal: st.signal,
            identity: st.identity.clone(),
            call: st.call,
        }
    }

    /// Open both channels through the connector and start initializing.
    ///
    /// Returns once the IO task is running; readiness is announced later
    /// with [`ModemEvent::Ready`]. Does nothing if the device is already
    /// connecting or connected.
    pub async fn connect(&self) -> Result<()> {
        let Some(session) = self.begin_connect().await else {
            return Ok(());
        };
        let config = &self.shared.config;
        info!(device = %config.name, data = %config.data, audio = %config.audio, "connecting");

        match self.open_channels().await {
            Ok((control, audio)) => self.start_session(session, control, audio).await,
            Err(e) => {
                let mut st = self.shared.state.lock().await;
                if st.session == session {
                    st.apply(LifecycleEvent::OpenFailed);
                }
                warn!(device = %config.name, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Start a session on channels the caller has already opened.
    pub async fn connect_with(
        &self,
        mut control: Box<dyn Transport>,
        mut audio: Box<dyn Transport>,
    ) -> Result<()> {
        match self.begin_connect().await {
            Some(session) => self.start_session(session, control, audio).await,
            None => {
                let _ = control.close().await;
                let _ = audio.close().await;
                Err(Error::Protocol(format!("{} is already connected", self.name())))
            }
        }
    }

    async fn begin_connect(&self) -> Option<u64> {
        let mut st = self.shared.state.lock().await;
        if st.apply(LifecycleEvent::ConnectRequested) != Effect::OpenChannels {
            return None;
        }
        st.session += 1;
        Some(st.session)
    }

    async fn open_channels(&self) -> Result<(Box<dyn Transport>, Box<dyn Transport>)> {
        let config = &self.shared.config;
        let connector = &self.shared.connector;
        let mut control = connector.open(&config.data, config.baud_rate).await?;
        match connector.open(&config.audio, config.baud_rate).await {
            Ok(audio) => Ok((control, audio)),
            Err(e) => {
                let _ = control.close().await;
                Err(e)
            }
        }
    }

    async fn start_session(
        &self,
        session: u64,
        mut control: Box<dyn Transport>,
        mut audio: Box<dyn Transport>,
    ) -> Result<()> {
        let device = self.name();
        let mut st = self.shared.state.lock().await;
        if st.session != session || st.apply(LifecycleEvent::ChannelsOpened) != Effect::StartSession
        {
            drop(st);
            debug!(device, "connect superseded by disconnect");
            let _ = control.close().await;
            let _ = audio.close().await;
            return Err(Error::NotConnected);
        }

        st.handshake = 0;
        st.queue.clear();
        st.queue.enqueue(handshake::first());
        let link = Arc::new(DeviceLink {
            shared: self.shared.clone(),
            session,
        });
        st.io = Some(spawn_io_task(control, audio, IoConfig::new(device), link));

        info!(device, "channels open, initializing");
        self.shared.emit(ModemEvent::Connected {
            device: device.to_string(),
        });
        Ok(())
    }

    /// Tear the device down to `Disconnected`.
    ///
    /// Idempotent. Stops the IO task, which closes both channels, drops
    /// every queued command and resets call state. Identity is kept.
    pub async fn disconnect(&self) {
        let device = self.name();
        let io = {
            let mut st = self.shared.state.lock().await;
            if st.apply(LifecycleEvent::DisconnectRequested) != Effect::Teardown {
                return;
            }
            let io = st.teardown(device);
            info!(device, "disconnected");
            self.shared.emit(ModemEvent::Disconnected {
                device: device.to_string(),
            });
            io
        };
        if let Some(io) = io {
            io.shutdown().await;
        }
    }

    /// Send a text message. The payload is already in wire form.
    ///
    /// Resolves when the modem accepts or rejects it. Fails with
    /// [`Error::NotRegistered`] while the modem has no network, and with
    /// [`Error::Unsupported`] if it did not accept text-mode messaging
    /// during initialization.
    pub async fn send_message(&self, destination: &str, payload: &[u8]) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let command = command::cmd_send_message(destination, payload)?.with_reply(tx);
        {
            let mut st = self.shared.state.lock().await;
            st.ensure_registered()?;
            if !st.capabilities.message {
                return Err(Error::Unsupported(format!(
                    "{} does not accept messages",
                    self.name()
                )));
            }
            st.submit(command);
        }
        debug!(device = self.name(), destination, bytes = payload.len(), "message queued");
        rx.await.map_err(|_| Error::ConnectionLost)?.map(|_| ())
    }

    /// Send a feature code (USSD). The network's answer arrives later as
    /// [`ModemEvent::FeatureCodeResult`].
    pub async fn send_code(&self, code: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let command = command::cmd_send_code(code)?.with_reply(tx);
        {
            let mut st = self.shared.state.lock().await;
            st.ensure_registered()?;
            st.submit(command);
        }
        debug!(device = self.name(), code, "feature code queued");
        rx.await.map_err(|_| Error::ConnectionLost)?.map(|_| ())
    }

    // -----------------------------------------------------------------------
    // Call operations, reached through a CallBinding
    // -----------------------------------------------------------------------

    pub(crate) async fn current_call(&self) -> Result<u64> {
        let st = self.shared.state.lock().await;
        st.ensure_ready()?;
        if st.call_id == 0 {
            return Err(Error::NoActiveCall);
        }
        Ok(st.call_id)
    }

    pub(crate) async fn call_active(&self, call_id: u64) -> bool {
        self.shared.state.lock().await.ensure_call(call_id).is_ok()
    }

    pub(crate) async fn answer(&self, call_id: u64) -> Result<()> {
        let mut st = self.shared.state.lock().await;
        st.ensure_ready()?;
        st.ensure_call(call_id)?;
        if !st.call.incoming || st.call.answered {
            return Err(Error::Protocol("no unanswered incoming call".into()));
        }
        st.submit(command::cmd_answer());
        Ok(())
    }

    pub(crate) async fn send_tone(&self, call_id: u64, digit: char) -> Result<()> {
        let command = command::cmd_tone(digit)?;
        let mut st = self.shared.state.lock().await;
        st.ensure_ready()?;
        st.ensure_call(call_id)?;
        st.submit(command);
        Ok(())
    }

    /// Queue `AT+CHUP` if the call is still current and the device can
    /// take commands, then clear call state either way. Returns whether
    /// the call was still current.
    pub(crate) async fn hangup(&self, call_id: u64) -> bool {
        let mut st = self.shared.state.lock().await;
        if st.ensure_call(call_id).is_err() {
            return false;
        }
        if st.lifecycle.is_ready() {
            st.submit(command::cmd_hangup());
        }
        st.end_call();
        true
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.shared.config.name)
            .field("data", &self.shared.config.data)
            .field("audio", &self.shared.config.audio)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Protocol interpretation
// ---------------------------------------------------------------------------

impl DeviceShared {
    /// Act on a command leaving the in-flight slot.
    fn complete(&self, st: &mut DeviceState, mut completion: Completion) -> Result<()> {
        completion.notify_caller();
        let device = self.name();
        let kind = completion.command.kind();

        if st.lifecycle == LifecycleState::Initializing {
            if let Some(step) = handshake::STEPS.get(st.handshake).filter(|s| s.kind == kind) {
                return self.advance_handshake(st, &completion, step.required);
            }
        }

        let success = completion.is_success();
        match kind {
            CommandKind::SendMessage => {
                if !success {
                    warn!(device, response = ?completion.response, "message rejected");
                }
                self.emit(ModemEvent::MessageSent {
                    device: device.to_string(),
                    success,
                });
            }
            CommandKind::ReadMessage { index } if success => {
                match notify::stored_message(&completion.lines) {
                    Some((header, body)) => self.emit(ModemEvent::MessageReceived {
                        device: device.to_string(),
                        index,
                        header,
                        body,
                    }),
                    None => warn!(device, index, "stored message had no content"),
                }
                st.submit(command::cmd_delete_message(index));
            }
            CommandKind::Answer if success => {
                st.call.answered = true;
                st.call.hangup = true;
                info!(device, "call answered");
            }
            CommandKind::Answer => match completion.response {
                Some(
                    kind @ (ResponseKind::NoCarrier | ResponseKind::Busy | ResponseKind::NoDialtone),
                ) => self.call_ended(st, kind.as_str().to_string()),
                response => warn!(device, ?response, "answer failed"),
            },
            _ if !success => warn!(
                device,
                verb = completion.command.verb(),
                response = ?completion.response,
                "command failed"
            ),
            _ => {}
        }
        Ok(())
    }

    fn advance_handshake(
        &self,
        st: &mut DeviceState,
        completion: &Completion,
        required: bool,
    ) -> Result<()> {
        let device = self.name();
        let verb = completion.command.verb();
        if completion.is_success() {
            handshake::record(completion, &mut st.identity, &mut st.capabilities);
        } else if required {
            return Err(Error::Rejected(format!("initialization step {verb} failed")));
        } else {
            debug!(device, verb, "optional initialization step rejected");
            handshake::reject(completion.command.kind(), &mut st.capabilities);
        }

        st.handshake += 1;
        match handshake::STEPS.get(st.handshake) {
            Some(next) => st.queue.enqueue((next.build)()),
            None => {
                if st.apply(LifecycleEvent::HandshakeComplete) == Effect::Announce {
                    info!(
                        device,
                        manufacturer = ?st.identity.manufacturer,
                        model = ?st.identity.model,
                        voice = st.capabilities.voice,
                        message = st.capabilities.message,
                        "ready"
                    );
                    self.emit(ModemEvent::Ready {
                        device: device.to_string(),
                        identity: st.identity.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The network or the modem ended the current call, if there is one.
    fn call_ended(&self, st: &mut DeviceState, cause: String) {
        if st.call_id == 0 {
            return;
        }
        st.end_call();
        info!(device = self.name(), %cause, "call ended");
        self.emit(ModemEvent::CallEnded {
            device: self.name().to_string(),
            cause: Some(cause),
        });
    }

    /// Fail the in-flight command once it has outlived the command timeout.
    fn expire_stale(&self, st: &mut DeviceState) -> Result<()> {
        let timeout = self.config.command_timeout;
        if let Some(completion) = st.queue.expire(Instant::now(), timeout) {
            warn!(
                device = self.name(),
                verb = completion.command.verb(),
                ?timeout,
                "command timed out"
            );
            self.complete(st, completion)?;
        }
        Ok(())
    }

    /// Act on a line that no transaction claimed.
    fn notification(&self, st: &mut DeviceState, kind: ResponseKind, line: &str) {
        let device = self.name();
        match kind {
            ResponseKind::SignalStrength | ResponseKind::SignalQuality => {
                if let Some(level) = notify::signal(line) {
                    st.signal = Some(level);
                    self.emit(ModemEvent::Signal {
                        device: device.to_string(),
                        level,
                    });
                }
            }
            ResponseKind::RegistrationStatus => {
                if let Some(status) = notify::registration(line) {
                    if st.registration != status {
                        info!(device, %status, "registration changed");
                    }
                    st.registration = status;
                    self.emit(ModemEvent::Registration {
                        device: device.to_string(),
                        status,
                    });
                }
            }
            ResponseKind::Ring => {
                if st.call_id == 0 {
                    st.start_call();
                    st.call.incoming = true;
                    st.call.ring = true;
                    debug!(device, "incoming call");
                } else if st.call.ring {
                    st.call.ring = false;
                    self.emit(ModemEvent::IncomingCall {
                        device: device.to_string(),
                        caller: None,
                    });
                }
            }
            ResponseKind::CallerId => {
                if st.call_id == 0 {
                    st.start_call();
                    st.call.incoming = true;
                    st.call.ring = true;
                }
                if st.call.ring {
                    st.call.ring = false;
                    let caller = notify::caller(line);
                    info!(device, caller = ?caller, "incoming call");
                    self.emit(ModemEvent::IncomingCall {
                        device: device.to_string(),
                        caller,
                    });
                }
            }
            ResponseKind::CallOrig => {
                if st.call_id == 0 {
                    st.start_call();
                }
                st.call.outgoing = true;
            }
            ResponseKind::CallConn => {
                st.call.hangup = true;
                self.emit(ModemEvent::CallConnected {
                    device: device.to_string(),
                });
            }
            ResponseKind::CallEnd | ResponseKind::NoCarrier | ResponseKind::Busy => {
                let cause = match kind {
                    ResponseKind::CallEnd => notify::payload(line).to_string(),
                    _ => kind.as_str().to_string(),
                };
                self.call_ended(st, cause);
            }
            ResponseKind::OwnNumber => {
                if let Some(number) = notify::own_number(line) {
                    st.identity.own_number = Some(number);
                }
            }
            ResponseKind::MessageIndication => match notify::message_index(line) {
                Some(index) => {
                    debug!(device, index, "new message stored");
                    st.submit(command::cmd_read_message(index));
                }
                None => warn!(device, line, "malformed message indication"),
            },
            ResponseKind::FeatureCodeResult => {
                self.emit(ModemEvent::FeatureCodeResult {
                    device: device.to_string(),
                    response: notify::payload(line).to_string(),
                });
            }
            ResponseKind::MemoryFull => {
                warn!(device, "message storage full");
                self.emit(ModemEvent::MemoryFull {
                    device: device.to_string(),
                });
            }
            ResponseKind::Unknown => warn!(device, line, "unclassified line"),
            ResponseKind::Ok
            | ResponseKind::Error
            | ResponseKind::MessageError
            | ResponseKind::Prompt
            | ResponseKind::MessageSent
            | ResponseKind::MessageContent
            | ResponseKind::VoiceSupport
            | ResponseKind::PinStatus => warn!(device, %kind, "response with nothing in flight"),
            _ => debug!(device, %kind, line, "notification ignored"),
        }
    }
}

// ---------------------------------------------------------------------------
// LinkHandler
// ---------------------------------------------------------------------------

/// The device as seen from its IO task.
struct DeviceLink {
    shared: Arc<DeviceShared>,
    session: u64,
}

impl DeviceLink {
    /// Lock the device state if this task's session is still current.
    async fn lock_session(&self) -> Option<MutexGuard<'_, DeviceState>> {
        let st = self.shared.state.lock().await;
        (st.session == self.session).then_some(st)
    }
}

#[async_trait]
impl LinkHandler for DeviceLink {
    async fn poll_transmit(&self) -> Option<Vec<u8>> {
        self.lock_session().await?.queue.pump_if_idle()
    }

    async fn on_line(&self, line: &[u8]) -> Result<Option<Vec<u8>>> {
        let text = String::from_utf8_lossy(line);
        let kind = classify(line);
        debug!(device = self.shared.name(), %kind, line = %text.escape_debug(), "line");

        let Some(mut st) = self.lock_session().await else {
            return Ok(None);
        };
        let reply = match st.queue.on_line(kind, &text) {
            LineOutcome::Transmit(bytes) => Some(bytes),
            LineOutcome::Information => None,
            LineOutcome::Completed(completion) => {
                self.shared.complete(&mut st, completion)?;
                None
            }
            LineOutcome::Notification => {
                self.shared.notification(&mut st, kind, &text);
                None
            }
        };
        // Notifications can arrive faster than the readiness wait elapses.
        if st.lifecycle.is_ready() {
            self.shared.expire_stale(&mut st)?;
        }
        Ok(reply)
    }

    async fn on_idle(&self) -> Result<()> {
        let device = self.shared.name();
        let Some(mut st) = self.lock_session().await else {
            return Ok(());
        };
        if !st.lifecycle.is_ready() {
            error!(device, state = %st.lifecycle, "modem silent during initialization");
            return Err(Error::Timeout);
        }
        self.shared.expire_stale(&mut st)
    }

    async fn on_exit(&self, fault: Option<Error>) {
        let device = self.shared.name();
        let Some(mut st) = self.lock_session().await else {
            return;
        };
        if let Some(e) = &fault {
            error!(device, error = %e, "device fault");
        }
        if st.apply(LifecycleEvent::Fault) == Effect::Teardown {
            // The handle is this task's own; dropping it detaches.
            let _ = st.teardown(device);
            info!(device, "disconnected");
            self.shared.emit(ModemEvent::Disconnected {
                device: device.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardlink_test_harness::{MockConnector, MockTransport};

    fn device() -> (Device, broadcast::Receiver<ModemEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let config = DeviceConfig::new("card0", "/dev/data", "/dev/audio");
        (Device::new(config, Arc::new(MockConnector::new()), tx), rx)
    }

    #[tokio::test]
    async fn new_device_is_disconnected() {
        let (device, _rx) = device();
        let info = device.info().await;
        assert_eq!(info.state, LifecycleState::Disconnected);
        assert_eq!(info.name, "card0");
        assert_eq!(info.data_address, "/dev/data");
        assert!(info.call.is_idle());
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let (device, _rx) = device();
        assert!(matches!(device.send_code("*100#").await, Err(Error::NotConnected)));
        assert!(matches!(
            device.send_message("555", b"hi").await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(device.current_call().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn invalid_arguments_fail_before_state_checks() {
        let (device, _rx) = device();
        assert!(matches!(
            device.send_message("", b"hi").await,
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            device.send_tone(1, 'x').await,
            Err(Error::InvalidParameter(_))
        ));
    }

    #[tokio::test]
    async fn failed_open_returns_to_disconnected() {
        let (device, _rx) = device();
        assert!(matches!(device.connect().await, Err(Error::Transport(_))));
        assert_eq!(device.state().await, LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn audio_open_failure_closes_control() {
        let (tx, _rx) = broadcast::channel(16);
        let connector = Arc::new(MockConnector::new());
        let control = connector.add("/dev/data", MockTransport::new());
        let device = Device::new(
            DeviceConfig::new("card0", "/dev/data", "/dev/audio"),
            connector,
            tx,
        );
        assert!(device.connect().await.is_err());
        assert!(!control.is_connected());
        assert_eq!(device.state().await, LifecycleState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_when_disconnected_is_a_no_op() {
        let (device, mut rx) = device();
        device.disconnect().await;
        device.disconnect().await;
        assert_eq!(device.state().await, LifecycleState::Disconnected);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn teardown_keeps_identity() {
        let mut st = DeviceState {
            lifecycle: LifecycleState::Ready,
            identity: ModemIdentity {
                imei: Some("351234567890123".into()),
                ..Default::default()
            },
            capabilities: Capabilities {
                voice: true,
                message: true,
            },
            signal: Some(20),
            ..Default::default()
        };
        st.start_call();
        st.call.incoming = true;
        st.queue.enqueue(command::cmd_probe());

        assert!(st.teardown("card0").is_none());
        assert_eq!(st.identity.imei.as_deref(), Some("351234567890123"));
        assert_eq!(st.capabilities, Capabilities::default());
        assert!(st.queue.is_empty());
        assert!(st.call.is_idle());
        assert_eq!(st.call_id, 0);
        assert_eq!(st.signal, None);
        assert_eq!(st.session, 1);
    }

    #[test]
    fn call_ids_are_never_reused() {
        let mut st = DeviceState::default();
        st.start_call();
        let first = st.call_id;
        st.end_call();
        st.start_call();
        assert_ne!(st.call_id, first);
        assert!(st.ensure_call(first).is_err());
        assert!(st.ensure_call(st.call_id).is_ok());
        assert!(st.ensure_call(0).is_err());
    }
}
