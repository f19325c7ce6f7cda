//! Line framing and response classification for the AT command protocol.
//!
//! Modem output is a stream of lines separated by carriage-return and/or
//! line-feed bytes. Runs of separators between lines carry no content and
//! are dropped. Each completed line is classified once by literal prefix
//! against [`RESPONSE_TABLE`] and then discarded.
//!
//! The one line the modem never terminates is the message prompt `"> "`,
//! which it sends and then waits for the message body. [`LineFramer::take_prompt`]
//! lets the IO loop pick it out of the partial buffer.

use cardlink_core::error::{Error, Result};

/// Terminator appended to every outbound command.
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Terminator appended to a deferred payload sent after a prompt (Ctrl-Z).
pub const PAYLOAD_TERMINATOR: u8 = 0x1A;

/// The unterminated prompt literal that requests a deferred payload.
pub const PROMPT: &[u8] = b"> ";

/// Default bound on a single line's length.
pub const DEFAULT_MAX_LINE: usize = 1024;

// ---------------------------------------------------------------------------
// Framer
// ---------------------------------------------------------------------------

/// State of the [`LineFramer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    /// Between lines: separator bytes are discarded.
    AwaitingLineStart,
    /// Inside a line: bytes accumulate until a separator.
    Accumulating,
}

/// Incremental splitter from raw bytes into protocol lines.
///
/// Fed one read at a time; a line split across reads is kept in the
/// accumulation buffer until its separator arrives. NUL bytes are dropped
/// so yielded lines are NUL-free.
#[derive(Debug)]
pub struct LineFramer {
    state: FramerState,
    buf: Vec<u8>,
    max_line: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE)
    }

    /// Create a framer whose lines may hold at most `max_line` bytes.
    pub fn with_max_line(max_line: usize) -> Self {
        LineFramer {
            state: FramerState::AwaitingLineStart,
            buf: Vec::with_capacity(max_line.min(DEFAULT_MAX_LINE)),
            max_line,
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Number of bytes held for the line in progress.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn max_line(&self) -> usize {
        self.max_line
    }

    /// Drop any partial line and return to [`FramerState::AwaitingLineStart`].
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = FramerState::AwaitingLineStart;
    }

    /// Consume one byte. Returns the completed line when `byte` ends one.
    ///
    /// Fails with [`Error::Framing`] when the line would exceed the bound;
    /// the partial line is discarded and the framer reset.
    pub fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
        if byte == 0 {
            return Ok(None);
        }
        let separator = byte == b'\r' || byte == b'\n';

        match self.state {
            FramerState::AwaitingLineStart => {
                if !separator {
                    self.state = FramerState::Accumulating;
                    self.append(byte)?;
                }
                Ok(None)
            }
            FramerState::Accumulating => {
                if separator {
                    self.state = FramerState::AwaitingLineStart;
                    Ok(Some(std::mem::take(&mut self.buf)))
                } else {
                    self.append(byte)?;
                    Ok(None)
                }
            }
        }
    }

    /// Consume a chunk of bytes, returning every line it completes in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        for &byte in bytes {
            if let Some(line) = self.push(byte)? {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// If the partial line is exactly the prompt literal, consume it.
    pub fn take_prompt(&mut self) -> bool {
        if self.state == FramerState::Accumulating && self.buf == PROMPT {
            self.reset();
            true
        } else {
            false
        }
    }

    fn append(&mut self, byte: u8) -> Result<()> {
        if self.buf.len() >= self.max_line {
            let len = self.buf.len();
            self.reset();
            return Err(Error::Framing(format!(
                "line exceeded {} bytes ({len} buffered)",
                self.max_line
            )));
        }
        self.buf.push(byte);
        Ok(())
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classification of a completed response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    BootNotice,
    OwnNumber,
    Ok,
    SignalStrength,
    NetworkMode,
    CallEnd,
    SupplementaryIntermediate,
    CallOrig,
    CallConf,
    CallConn,
    RegistrationStatus,
    Operator,
    ServiceStatus,
    SignalQuality,
    PinStatus,
    Ring,
    CallerId,
    Error,
    MessageIndication,
    MessageContent,
    SupplementaryUnsolicited,
    Busy,
    NoDialtone,
    NoCarrier,
    MessageError,
    MemoryFull,
    Prompt,
    FeatureCodeResult,
    VoiceSupport,
    MessageSent,
    Unknown,
}

impl ResponseKind {
    /// Whether this kind signals that the command it answers failed.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            ResponseKind::Error
                | ResponseKind::MessageError
                | ResponseKind::NoCarrier
                | ResponseKind::Busy
                | ResponseKind::NoDialtone
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::BootNotice => "^BOOT",
            ResponseKind::OwnNumber => "+CNUM",
            ResponseKind::Ok => "OK",
            ResponseKind::SignalStrength => "^RSSI",
            ResponseKind::NetworkMode => "^MODE",
            ResponseKind::CallEnd => "^CEND",
            ResponseKind::SupplementaryIntermediate => "+CSSI",
            ResponseKind::CallOrig => "^ORIG",
            ResponseKind::CallConf => "^CONF",
            ResponseKind::CallConn => "^CONN",
            ResponseKind::RegistrationStatus => "+CREG",
            ResponseKind::Operator => "+COPS",
            ResponseKind::ServiceStatus => "^SRVST",
            ResponseKind::SignalQuality => "+CSQ",
            ResponseKind::PinStatus => "+CPIN",
            ResponseKind::Ring => "RING",
            ResponseKind::CallerId => "+CLIP",
            ResponseKind::Error => "ERROR",
            ResponseKind::MessageIndication => "+CMTI",
            ResponseKind::MessageContent => "+CMGR",
            ResponseKind::SupplementaryUnsolicited => "+CSSU",
            ResponseKind::Busy => "BUSY",
            ResponseKind::NoDialtone => "NO DIALTONE",
            ResponseKind::NoCarrier => "NO CARRIER",
            ResponseKind::MessageError => "+CMS ERROR",
            ResponseKind::MemoryFull => "^SMMEMFULL",
            ResponseKind::Prompt => "> ",
            ResponseKind::FeatureCodeResult => "+CUSD",
            ResponseKind::VoiceSupport => "^CVOICE",
            ResponseKind::MessageSent => "+CMGS",
            ResponseKind::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix table, first match wins.
///
/// `ERROR+CNUM:` must stay ahead of `ERROR`: it is the modem's way of
/// answering `AT+CNUM` on a SIM without a stored number, not a failure.
pub const RESPONSE_TABLE: &[(&[u8], ResponseKind)] = &[
    (b"^BOOT:", ResponseKind::BootNotice),
    (b"+CNUM:", ResponseKind::OwnNumber),
    (b"ERROR+CNUM:", ResponseKind::OwnNumber),
    (b"OK", ResponseKind::Ok),
    (b"^RSSI:", ResponseKind::SignalStrength),
    (b"^MODE:", ResponseKind::NetworkMode),
    (b"^CEND:", ResponseKind::CallEnd),
    (b"+CSSI:", ResponseKind::SupplementaryIntermediate),
    (b"^ORIG:", ResponseKind::CallOrig),
    (b"^CONF:", ResponseKind::CallConf),
    (b"^CONN:", ResponseKind::CallConn),
    (b"+CREG:", ResponseKind::RegistrationStatus),
    (b"+COPS:", ResponseKind::Operator),
    (b"^SRVST:", ResponseKind::ServiceStatus),
    (b"+CSQ:", ResponseKind::SignalQuality),
    (b"+CPIN:", ResponseKind::PinStatus),
    (b"RING", ResponseKind::Ring),
    (b"+CLIP:", ResponseKind::CallerId),
    (b"ERROR", ResponseKind::Error),
    (b"+CMTI:", ResponseKind::MessageIndication),
    (b"+CMGR:", ResponseKind::MessageContent),
    (b"+CSSU:", ResponseKind::SupplementaryUnsolicited),
    (b"BUSY", ResponseKind::Busy),
    (b"NO DIALTONE", ResponseKind::NoDialtone),
    (b"NO CARRIER", ResponseKind::NoCarrier),
    (b"COMMAND NOT SUPPORT", ResponseKind::Error),
    (b"+CMS ERROR:", ResponseKind::MessageError),
    (b"^SMMEMFULL:", ResponseKind::MemoryFull),
    (b"> ", ResponseKind::Prompt),
    (b"+CUSD:", ResponseKind::FeatureCodeResult),
    (b"^CVOICE:", ResponseKind::VoiceSupport),
    (b"+CMGS:", ResponseKind::MessageSent),
];

/// Classify a completed line.
pub fn classify(line: &[u8]) -> ResponseKind {
    RESPONSE_TABLE
        .iter()
        .find(|(prefix, _)| line.starts_with(prefix))
        .map(|&(_, kind)| kind)
        .unwrap_or(ResponseKind::Unknown)
}
