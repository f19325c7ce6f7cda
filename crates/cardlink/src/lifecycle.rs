//! Device lifecycle state machine.
//!
//! The device never assigns its [`LifecycleState`] directly. Every change
//! goes through [`transition`], which returns the next state and the side
//! effect the caller must carry out. Events that make no sense in the
//! current state leave it unchanged with [`Effect::None`].

use cardlink_core::types::LifecycleState;

/// Something that happened to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A caller or the reconnect scan asked for a connection.
    ConnectRequested,
    /// Both channels opened.
    ChannelsOpened,
    /// Opening a channel failed.
    OpenFailed,
    /// The last initialization step completed.
    HandshakeComplete,
    /// The IO task stopped on a fatal condition.
    Fault,
    /// A caller asked for teardown.
    DisconnectRequested,
}

/// Work the device must do to realise a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Open both channels (outside the device lock).
    OpenChannels,
    /// Spawn the IO task and queue the first handshake command.
    StartSession,
    /// Emit the ready announcement.
    Announce,
    /// Stop the IO task, release channels, clear the queue and call state.
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: LifecycleState,
    pub effect: Effect,
}

impl Transition {
    fn to(state: LifecycleState, effect: Effect) -> Self {
        Transition { state, effect }
    }

    fn stay(state: LifecycleState) -> Self {
        Transition {
            state,
            effect: Effect::None,
        }
    }
}

pub fn transition(state: LifecycleState, event: LifecycleEvent) -> Transition {
    use LifecycleEvent as E;
    use LifecycleState as S;

    match (state, event) {
        (S::Disconnected, E::ConnectRequested) => Transition::to(S::Connecting, Effect::OpenChannels),
        (S::Connecting, E::ChannelsOpened) => Transition::to(S::Initializing, Effect::StartSession),
        (S::Connecting, E::OpenFailed) => Transition::to(S::Disconnected, Effect::None),
        (S::Initializing, E::HandshakeComplete) => Transition::to(S::Ready, Effect::Announce),
        (S::Disconnected, E::Fault | E::DisconnectRequested) => Transition::stay(S::Disconnected),
        (_, E::Fault | E::DisconnectRequested) => Transition::to(S::Disconnected, Effect::Teardown),
        (state, _) => Transition::stay(state),
    }
}
