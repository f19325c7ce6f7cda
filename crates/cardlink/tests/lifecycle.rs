//! Connect, initialize, ready and disconnect against a scripted modem.

mod common;

use std::time::Duration;

use cardlink::{Error, LifecycleState, ModemEvent, RegistrationStatus};
use cardlink_test_harness::MockTransport;
use tokio::time::Instant;

use common::*;

#[tokio::test(start_paused = true)]
async fn handshake_reaches_ready() {
    let mut rig = ready().await;

    let info = rig.device.info().await;
    assert_eq!(info.state, LifecycleState::Ready);
    assert!(info.capabilities.voice);
    assert!(info.capabilities.message);
    assert_eq!(info.registration, RegistrationStatus::Home);
    assert_eq!(info.signal, Some(20));
    assert_eq!(info.identity.manufacturer.as_deref(), Some("huawei"));
    assert_eq!(info.identity.model.as_deref(), Some("E1550"));
    assert_eq!(info.identity.imsi.as_deref(), Some("250991234567890"));
    assert_eq!(info.identity.own_number.as_deref(), Some("+15550000"));

    let sent = rig.control.sent_data();
    assert_eq!(sent.len(), HANDSHAKE.len());
    for (sent, (expected, _)) in sent.iter().zip(HANDSHAKE) {
        assert_eq!(sent.as_slice(), *expected);
    }
    assert!(rig.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn connect_and_ready_are_announced_in_order() {
    let mut control = MockTransport::new();
    script_handshake(&mut control);
    let mut rig = connect(control).await;

    let first = wait_for(&mut rig.events, |_| true).await;
    assert_eq!(
        first,
        ModemEvent::Connected {
            device: "card0".into()
        }
    );
    let ready = wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Ready { .. })).await;
    let ModemEvent::Ready { identity, .. } = ready else {
        unreachable!()
    };
    assert_eq!(identity.imei.as_deref(), Some("351234567890123"));
}

#[tokio::test(start_paused = true)]
async fn probe_answer_advances_initialization() {
    let mut control = MockTransport::new();
    control.expect(b"AT\r", b"\r\nOK\r\n");
    // Echo-off is never answered; the device must still be initializing
    // after the probe completes.
    control.expect(b"ATE0\r", b"");
    let rig = connect(control).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rig.device.state().await, LifecycleState::Initializing);
    assert_eq!(
        rig.control.sent_data(),
        vec![b"AT\r".to_vec(), b"ATE0\r".to_vec()]
    );
}

#[tokio::test(start_paused = true)]
async fn silence_during_initialization_disconnects() {
    let mut control = MockTransport::new();
    control.expect(b"AT\r", b"");
    let start = Instant::now();
    let mut rig = connect(control).await;

    wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Disconnected { .. })).await;
    assert!(start.elapsed() >= Duration::from_millis(1000));
    assert!(start.elapsed() < Duration::from_millis(2000));
    assert_eq!(rig.device.state().await, LifecycleState::Disconnected);
    assert!(!rig.control.is_connected());
    assert!(!rig.audio.is_connected());
}

#[tokio::test(start_paused = true)]
async fn silence_while_ready_is_harmless() {
    let mut rig = ready().await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(rig.device.state().await, LifecycleState::Ready);
    assert!(rig.control.is_connected());
    assert!(rig.events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn rejected_required_step_disconnects() {
    let mut control = MockTransport::new();
    script_handshake_with(&mut control, b"ATE0\r", b"\r\nERROR\r\n");
    let mut rig = connect(control).await;

    wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Disconnected { .. })).await;
    assert_eq!(rig.device.state().await, LifecycleState::Disconnected);
    // Nothing after the failed step was sent.
    assert_eq!(rig.control.sent_data().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_optional_step_clears_capability() {
    let mut control = MockTransport::new();
    script_handshake_with(&mut control, b"AT+CMGF=1\r", b"\r\nERROR\r\n");
    let mut rig = connect(control).await;

    wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Ready { .. })).await;
    let info = rig.device.info().await;
    assert!(!info.capabilities.message);
    assert!(info.capabilities.voice);

    assert!(matches!(
        rig.device.send_message("555", b"hi").await,
        Err(Error::Unsupported(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn missing_own_number_is_not_an_error() {
    let mut control = MockTransport::new();
    script_handshake_with(
        &mut control,
        b"AT+CNUM\r",
        b"\r\nERROR+CNUM: \"\",\"\",129\r\n\r\nOK\r\n",
    );
    let mut rig = connect(control).await;

    wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Ready { .. })).await;
    assert_eq!(rig.device.info().await.identity.own_number, None);
}

#[tokio::test(start_paused = true)]
async fn operations_wait_for_ready() {
    let mut control = MockTransport::new();
    control.expect(b"AT\r", b"");
    let rig = connect(control).await;

    assert!(matches!(rig.device.send_code("*100#").await, Err(Error::NotReady)));
    assert!(matches!(
        rig.device.send_message("555", b"hi").await,
        Err(Error::NotReady)
    ));
}

#[tokio::test(start_paused = true)]
async fn double_disconnect_is_idempotent() {
    let mut rig = ready().await;

    rig.device.disconnect().await;
    let first = rig.device.info().await;
    rig.device.disconnect().await;
    let second = rig.device.info().await;

    assert_eq!(first, second);
    assert_eq!(second.state, LifecycleState::Disconnected);
    assert!(second.call.is_idle());
    assert_eq!(second.identity.manufacturer.as_deref(), Some("huawei"));
    assert!(!rig.control.is_connected());
    assert!(!rig.audio.is_connected());

    let mut disconnects = 0;
    while let Ok(event) = rig.events.try_recv() {
        if matches!(event, ModemEvent::Disconnected { .. }) {
            disconnects += 1;
        }
    }
    assert_eq!(disconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn audio_loss_disconnects() {
    let mut rig = ready().await;

    rig.audio.set_connected(false);
    wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Disconnected { .. })).await;
    assert_eq!(rig.device.state().await, LifecycleState::Disconnected);
    assert!(!rig.control.is_connected());
}

#[tokio::test(start_paused = true)]
async fn oversized_line_disconnects() {
    let mut rig = ready().await;

    rig.control.inject(&[b'x'; 2048]);
    wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Disconnected { .. })).await;
    assert_eq!(rig.device.state().await, LifecycleState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connect_with_rejects_active_device() {
    let rig = ready().await;
    let result = rig
        .device
        .connect_with(Box::new(MockTransport::new()), Box::new(MockTransport::new()))
        .await;
    assert!(matches!(result, Err(Error::Protocol(_))));
    assert_eq!(rig.device.state().await, LifecycleState::Ready);
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_disconnect() {
    let mut rig = ready().await;
    rig.device.disconnect().await;

    let mut control = MockTransport::new();
    script_handshake(&mut control);
    rig.device
        .connect_with(Box::new(control), Box::new(MockTransport::new()))
        .await
        .unwrap();
    wait_for(&mut rig.events, |e| matches!(e, ModemEvent::Ready { .. })).await;
    assert_eq!(rig.device.state().await, LifecycleState::Ready);
}
