//! AT command construction.
//!
//! Every request the library makes of a modem is a [`Command`]: the verb
//! text, the response kinds that finish it, the kinds it collects as
//! information text, and an optional payload deferred until the modem
//! prompts for it. Builders below produce the commands used by the
//! initialization handshake and by caller operations.

use tokio::sync::oneshot;

use cardlink_core::error::{Error, Result};

use crate::protocol::{COMMAND_TERMINATOR, PAYLOAD_TERMINATOR, ResponseKind};

/// Kinds that finish an ordinary command.
pub const FINAL_RESPONSES: &[ResponseKind] = &[
    ResponseKind::Ok,
    ResponseKind::Error,
    ResponseKind::MessageError,
];

/// Kinds that finish a call-setup command. The call-failure codes are
/// final result codes for `ATA`.
pub const CALL_SETUP_RESPONSES: &[ResponseKind] = &[
    ResponseKind::Ok,
    ResponseKind::Error,
    ResponseKind::MessageError,
    ResponseKind::NoCarrier,
    ResponseKind::Busy,
    ResponseKind::NoDialtone,
];

/// What a command is for. The device layer dispatches completions on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Probe,
    EchoOff,
    Manufacturer,
    Model,
    Firmware,
    Imei,
    Imsi,
    PinStatus,
    RegistrationNotify,
    RegistrationQuery,
    OwnNumber,
    VoiceQuery,
    MessageFormat,
    MessageIndications,
    SignalQuery,
    SendMessage,
    SendCode,
    ReadMessage { index: u32 },
    DeleteMessage { index: u32 },
    Answer,
    Hangup,
    Tone { digit: char },
}

/// Reply channel for callers that wait on a command's outcome.
pub type CommandReply = oneshot::Sender<Result<Vec<String>>>;

/// A queued request to the modem.
#[derive(Debug)]
pub struct Command {
    kind: CommandKind,
    verb: String,
    completes_on: &'static [ResponseKind],
    collects: &'static [ResponseKind],
    payload: Option<Vec<u8>>,
    reply: Option<CommandReply>,
}

impl Command {
    /// A command finished by `OK` or an error response.
    pub fn new(kind: CommandKind, verb: impl Into<String>) -> Self {
        Command {
            kind,
            verb: verb.into(),
            completes_on: FINAL_RESPONSES,
            collects: &[],
            payload: None,
            reply: None,
        }
    }

    /// Replace the set of response kinds that finish this command.
    pub fn completing(mut self, kinds: &'static [ResponseKind]) -> Self {
        self.completes_on = kinds;
        self
    }

    /// Response kinds besides unclassified text that belong to this command.
    pub fn collecting(mut self, kinds: &'static [ResponseKind]) -> Self {
        self.collects = kinds;
        self
    }

    /// Payload sent only after the modem answers with a prompt.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach a channel that receives the command's outcome.
    pub fn with_reply(mut self, reply: CommandReply) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn completes_on(&self, kind: ResponseKind) -> bool {
        self.completes_on.contains(&kind)
    }

    pub fn collects(&self, kind: ResponseKind) -> bool {
        kind == ResponseKind::Unknown || self.collects.contains(&kind)
    }

    /// Verb bytes followed by the command terminator.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.verb.len() + 1);
        out.extend_from_slice(self.verb.as_bytes());
        out.push(COMMAND_TERMINATOR);
        out
    }

    /// Payload bytes followed by the payload terminator, if a payload is set.
    pub fn encode_payload(&self) -> Option<Vec<u8>> {
        self.payload.as_ref().map(|payload| {
            let mut out = Vec::with_capacity(payload.len() + 1);
            out.extend_from_slice(payload);
            out.push(PAYLOAD_TERMINATOR);
            out
        })
    }

    pub(crate) fn take_reply(&mut self) -> Option<CommandReply> {
        self.reply.take()
    }
}

// ---------------------------------------------------------------------------
// Handshake commands
// ---------------------------------------------------------------------------

pub fn cmd_probe() -> Command {
    Command::new(CommandKind::Probe, "AT")
}

pub fn cmd_echo_off() -> Command {
    Command::new(CommandKind::EchoOff, "ATE0")
}

pub fn cmd_manufacturer() -> Command {
    Command::new(CommandKind::Manufacturer, "AT+CGMI")
}

pub fn cmd_model() -> Command {
    Command::new(CommandKind::Model, "AT+CGMM")
}

pub fn cmd_firmware() -> Command {
    Command::new(CommandKind::Firmware, "AT+CGMR")
}

pub fn cmd_imei() -> Command {
    Command::new(CommandKind::Imei, "AT+CGSN")
}

pub fn cmd_imsi() -> Command {
    Command::new(CommandKind::Imsi, "AT+CIMI")
}

pub fn cmd_pin_status() -> Command {
    Command::new(CommandKind::PinStatus, "AT+CPIN?").collecting(&[ResponseKind::PinStatus])
}

/// Enable `+CREG` notifications with location info.
pub fn cmd_registration_notify() -> Command {
    Command::new(CommandKind::RegistrationNotify, "AT+CREG=2")
}

pub fn cmd_registration_query() -> Command {
    Command::new(CommandKind::RegistrationQuery, "AT+CREG?")
}

pub fn cmd_own_number() -> Command {
    Command::new(CommandKind::OwnNumber, "AT+CNUM")
}

pub fn cmd_voice_query() -> Command {
    Command::new(CommandKind::VoiceQuery, "AT^CVOICE?").collecting(&[ResponseKind::VoiceSupport])
}

/// Select text-mode messaging.
pub fn cmd_message_format() -> Command {
    Command::new(CommandKind::MessageFormat, "AT+CMGF=1")
}

/// Route new-message indications to the control channel as `+CMTI`.
pub fn cmd_message_indications() -> Command {
    Command::new(CommandKind::MessageIndications, "AT+CNMI=2,1,0,0,0")
}

pub fn cmd_signal_query() -> Command {
    Command::new(CommandKind::SignalQuery, "AT+CSQ")
}

// ---------------------------------------------------------------------------
// Caller operations
// ---------------------------------------------------------------------------

/// Two-phase message submission: `AT+CMGS="<dest>"`, then the payload after
/// the prompt.
pub fn cmd_send_message(destination: &str, payload: &[u8]) -> Result<Command> {
    if destination.is_empty() || destination.contains(['"', '\r', '\n']) {
        return Err(Error::InvalidParameter(format!(
            "invalid message destination {destination:?}"
        )));
    }
    if payload.contains(&PAYLOAD_TERMINATOR) {
        return Err(Error::InvalidParameter(
            "message payload contains the Ctrl-Z terminator".into(),
        ));
    }
    Ok(
        Command::new(CommandKind::SendMessage, format!("AT+CMGS=\"{destination}\""))
            .collecting(&[ResponseKind::MessageSent])
            .with_payload(payload.to_vec()),
    )
}

/// Feature code (USSD) request. The result arrives later as `+CUSD`.
pub fn cmd_send_code(code: &str) -> Result<Command> {
    if code.is_empty() || code.contains(['"', '\r', '\n']) {
        return Err(Error::InvalidParameter(format!("invalid feature code {code:?}")));
    }
    Ok(Command::new(
        CommandKind::SendCode,
        format!("AT+CUSD=1,\"{code}\",15"),
    ))
}

pub fn cmd_read_message(index: u32) -> Command {
    Command::new(CommandKind::ReadMessage { index }, format!("AT+CMGR={index}"))
        .collecting(&[ResponseKind::MessageContent])
}

pub fn cmd_delete_message(index: u32) -> Command {
    Command::new(CommandKind::DeleteMessage { index }, format!("AT+CMGD={index}"))
}

pub fn cmd_answer() -> Command {
    Command::new(CommandKind::Answer, "ATA").completing(CALL_SETUP_RESPONSES)
}

pub fn cmd_hangup() -> Command {
    Command::new(CommandKind::Hangup, "AT+CHUP")
}

/// DTMF tone on the active call. Accepts `0-9`, `*`, `#` and `A-D`.
pub fn cmd_tone(digit: char) -> Result<Command> {
    let digit = digit.to_ascii_uppercase();
    if !(digit.is_ascii_digit() || matches!(digit, '*' | '#' | 'A'..='D')) {
        return Err(Error::InvalidParameter(format!("invalid DTMF digit {digit:?}")));
    }
    Ok(Command::new(
        CommandKind::Tone { digit },
        format!("AT^DTMF=1,{digit}"),
    ))
}
