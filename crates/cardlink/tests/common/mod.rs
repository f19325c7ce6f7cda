//! Shared fixtures for the facade integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cardlink::{Device, DeviceConfig, LifecycleState, ModemEvent};
use cardlink_test_harness::{MockConnector, MockHandle, MockTransport};
use tokio::sync::broadcast;

pub const DATA: &str = "/dev/card0-data";
pub const AUDIO: &str = "/dev/card0-audio";

/// Initialization requests and the answers of a voice-enabled modem with
/// text messaging.
pub const HANDSHAKE: &[(&[u8], &[u8])] = &[
    (b"AT\r", b"\r\nOK\r\n"),
    (b"ATE0\r", b"\r\nOK\r\n"),
    (b"AT+CGMI\r", b"\r\nhuawei\r\n\r\nOK\r\n"),
    (b"AT+CGMM\r", b"\r\nE1550\r\n\r\nOK\r\n"),
    (b"AT+CGMR\r", b"\r\n11.608.12.02.21\r\n\r\nOK\r\n"),
    (b"AT+CGSN\r", b"\r\n351234567890123\r\n\r\nOK\r\n"),
    (b"AT+CIMI\r", b"\r\n250991234567890\r\n\r\nOK\r\n"),
    (b"AT+CPIN?\r", b"\r\n+CPIN: READY\r\n\r\nOK\r\n"),
    (b"AT+CREG=2\r", b"\r\nOK\r\n"),
    (b"AT+CREG?\r", b"\r\n+CREG: 2,1,\"00C3\",\"0A1F\"\r\n\r\nOK\r\n"),
    (b"AT+CNUM\r", b"\r\n+CNUM: \"\",\"+15550000\",145\r\n\r\nOK\r\n"),
    (b"AT^CVOICE?\r", b"\r\n^CVOICE: 0,8000,16,20\r\n\r\nOK\r\n"),
    (b"AT+CMGF=1\r", b"\r\nOK\r\n"),
    (b"AT+CNMI=2,1,0,0,0\r", b"\r\nOK\r\n"),
    (b"AT+CSQ\r", b"\r\n+CSQ: 20,99\r\n\r\nOK\r\n"),
];

pub fn script_handshake(mock: &mut MockTransport) {
    for (request, response) in HANDSHAKE {
        mock.expect(request, response);
    }
}

/// The handshake script with one response replaced.
pub fn script_handshake_with(mock: &mut MockTransport, request: &[u8], response: &[u8]) {
    for &(req, resp) in HANDSHAKE {
        mock.expect(req, if req == request { response } else { resp });
    }
}

pub struct Rig {
    pub device: Device,
    pub control: MockHandle,
    pub audio: MockHandle,
    pub events: broadcast::Receiver<ModemEvent>,
}

pub fn config() -> DeviceConfig {
    DeviceConfig::new("card0", DATA, AUDIO).command_timeout(Duration::from_secs(3))
}

/// A device connected through a mock connector with the given control
/// script. The connect has been issued but not awaited to readiness.
pub async fn connect(control: MockTransport) -> Rig {
    let connector = Arc::new(MockConnector::new());
    let control = connector.add(DATA, control);
    let audio = connector.add(AUDIO, MockTransport::new());
    let (tx, events) = broadcast::channel(64);
    let device = Device::new(config(), connector, tx);
    device.connect().await.unwrap();
    Rig {
        device,
        control,
        audio,
        events,
    }
}

/// A device that has completed initialization.
pub async fn ready() -> Rig {
    let mut control = MockTransport::new();
    script_handshake(&mut control);
    let mut rig = connect(control).await;
    wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Ready { .. })).await;
    assert_eq!(rig.device.state().await, LifecycleState::Ready);
    rig
}

/// Receive events until one matches, failing after a generous bound.
pub async fn wait_for(
    events: &mut broadcast::Receiver<ModemEvent>,
    mut pred: impl FnMut(&ModemEvent) -> bool,
) -> ModemEvent {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(60), wait)
        .await
        .expect("timed out waiting for event")
}

/// Let the IO task run until the control script is used up.
pub async fn drain(handle: &MockHandle) {
    for _ in 0..100 {
        if handle.remaining_expectations() == 0 {
            // One more pass so the last response is processed.
            tokio::time::sleep(Duration::from_millis(10)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "script not consumed, {} expectations left",
        handle.remaining_expectations()
    );
}
