//! Initialization handshake.
//!
//! After the channels open the device walks [`STEPS`] in order, one queued
//! command at a time. A rejected required step is fatal to the session; a
//! rejected optional step only clears the capability it was probing.

use cardlink_at::command::{self, Command, CommandKind};
use cardlink_at::queue::Completion;
use cardlink_core::types::{Capabilities, ModemIdentity};

pub struct Step {
    pub kind: CommandKind,
    pub build: fn() -> Command,
    pub required: bool,
}

const fn step(kind: CommandKind, build: fn() -> Command, required: bool) -> Step {
    Step {
        kind,
        build,
        required,
    }
}

pub const STEPS: &[Step] = &[
    step(CommandKind::Probe, command::cmd_probe, true),
    step(CommandKind::EchoOff, command::cmd_echo_off, true),
    step(CommandKind::Manufacturer, command::cmd_manufacturer, false),
    step(CommandKind::Model, command::cmd_model, false),
    step(CommandKind::Firmware, command::cmd_firmware, false),
    step(CommandKind::Imei, command::cmd_imei, false),
    step(CommandKind::Imsi, command::cmd_imsi, false),
    step(CommandKind::PinStatus, command::cmd_pin_status, true),
    step(CommandKind::RegistrationNotify, command::cmd_registration_notify, true),
    step(CommandKind::RegistrationQuery, command::cmd_registration_query, true),
    step(CommandKind::OwnNumber, command::cmd_own_number, false),
    step(CommandKind::VoiceQuery, command::cmd_voice_query, false),
    step(CommandKind::MessageFormat, command::cmd_message_format, false),
    step(CommandKind::MessageIndications, command::cmd_message_indications, false),
    step(CommandKind::SignalQuery, command::cmd_signal_query, false),
];

pub fn first() -> Command {
    (STEPS[0].build)()
}

/// Fold a successful step's collected text into the device's identity and
/// capabilities.
pub fn record(completion: &Completion, identity: &mut ModemIdentity, caps: &mut Capabilities) {
    let text = completion.first_line().map(str::to_string);
    match completion.command.kind() {
        CommandKind::Manufacturer => identity.manufacturer = text,
        CommandKind::Model => identity.model = text,
        CommandKind::Firmware => identity.firmware = text,
        CommandKind::Imei => identity.imei = text,
        CommandKind::Imsi => identity.imsi = text,
        CommandKind::VoiceQuery => {
            caps.voice = completion
                .lines
                .iter()
                .any(|line| line.starts_with("^CVOICE:") && voice_enabled(line));
        }
        CommandKind::MessageFormat => caps.message = true,
        _ => {}
    }
}

/// A rejected optional step withdraws the capability it stood for.
pub fn reject(kind: CommandKind, caps: &mut Capabilities) {
    match kind {
        CommandKind::VoiceQuery => caps.voice = false,
        CommandKind::MessageFormat | CommandKind::MessageIndications => caps.message = false,
        _ => {}
    }
}

/// `^CVOICE: <mode>,<rate>,<bits>,<period>` with mode 0 means voice is on.
fn voice_enabled(line: &str) -> bool {
    let fields: Vec<&str> = line["^CVOICE:".len()..].split(',').map(str::trim).collect();
    fields.len() >= 4 && fields.iter().all(|f| f.parse::<u32>().is_ok()) && fields[0] == "0"
}
