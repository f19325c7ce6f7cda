//! Single-in-flight command queue.
//!
//! The [`TransactionManager`] serializes the wire protocol: commands wait in
//! a FIFO until nothing is in flight, then the head is encoded for
//! transmission and held in the in-flight slot until a completing response
//! (or expiry) removes it. Classified lines are matched against that slot;
//! anything that does not belong to it is handed back as a notification.
//!
//! The manager never touches a transport. It returns the bytes to write and
//! the IO loop writes them, which keeps it testable without channels.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use cardlink_core::error::{Error, Result};

use crate::command::Command;
use crate::protocol::ResponseKind;

/// What a classified line meant to the transaction in flight.
#[derive(Debug)]
pub enum LineOutcome {
    /// The modem prompted for the deferred payload; write these bytes. The
    /// transaction stays open.
    Transmit(Vec<u8>),
    /// The line was information text for the in-flight command.
    Information,
    /// The in-flight command finished.
    Completed(Completion),
    /// The line is unrelated to any transaction.
    Notification,
}

/// A command removed from the in-flight slot.
#[derive(Debug)]
pub struct Completion {
    pub command: Command,
    /// The response that finished the command, `None` if it expired.
    pub response: Option<ResponseKind>,
    /// Information text collected while the command was in flight.
    pub lines: Vec<String>,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self.response, Some(kind) if !kind.is_error())
    }

    /// First collected line, trimmed, that is not empty.
    pub fn first_line(&self) -> Option<&str> {
        self.lines
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
    }

    fn outcome(&self) -> Result<Vec<String>> {
        match self.response {
            Some(kind) if kind.is_error() => Err(Error::Rejected(format!(
                "{} answered {kind}",
                self.command.verb()
            ))),
            Some(_) => Ok(self.lines.clone()),
            None => Err(Error::Timeout),
        }
    }

    /// Deliver the outcome to a waiting caller, if there is one.
    pub fn notify_caller(&mut self) {
        if let Some(reply) = self.command.take_reply() {
            let _ = reply.send(self.outcome());
        }
    }
}

#[derive(Debug)]
struct InFlight {
    command: Command,
    sent_at: Instant,
    payload_sent: bool,
    lines: Vec<String>,
}

/// Pending-command FIFO plus the single in-flight slot.
#[derive(Debug, Default)]
pub struct TransactionManager {
    pending: VecDeque<Command>,
    in_flight: Option<InFlight>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command to the FIFO. Never blocks and never transmits.
    pub fn enqueue(&mut self, command: Command) {
        debug!(verb = command.verb(), queued = self.pending.len() + 1, "command queued");
        self.pending.push_back(command);
    }

    pub fn in_flight(&self) -> Option<&Command> {
        self.in_flight.as_ref().map(|f| &f.command)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_none()
    }

    /// If idle, move the FIFO head into the in-flight slot and return the
    /// bytes to transmit for it.
    pub fn pump_if_idle(&mut self) -> Option<Vec<u8>> {
        if self.in_flight.is_some() {
            return None;
        }
        let command = self.pending.pop_front()?;
        let bytes = command.encode();
        debug!(verb = command.verb(), "command in flight");
        self.in_flight = Some(InFlight {
            command,
            sent_at: Instant::now(),
            payload_sent: false,
            lines: Vec::new(),
        });
        Some(bytes)
    }

    /// Match a classified line against the in-flight command.
    pub fn on_line(&mut self, kind: ResponseKind, line: &str) -> LineOutcome {
        let Some(flight) = self.in_flight.as_mut() else {
            return LineOutcome::Notification;
        };

        if kind == ResponseKind::Prompt {
            if flight.payload_sent {
                debug!(verb = flight.command.verb(), "repeated prompt ignored");
                return LineOutcome::Information;
            }
            return match flight.command.encode_payload() {
                Some(bytes) => {
                    flight.payload_sent = true;
                    LineOutcome::Transmit(bytes)
                }
                None => {
                    debug!(verb = flight.command.verb(), "prompt for command without payload");
                    LineOutcome::Information
                }
            };
        }

        if flight.command.completes_on(kind) {
            let Some(flight) = self.in_flight.take() else {
                return LineOutcome::Notification;
            };
            debug!(verb = flight.command.verb(), response = %kind, "command completed");
            return LineOutcome::Completed(Completion {
                command: flight.command,
                response: Some(kind),
                lines: flight.lines,
            });
        }

        if flight.command.collects(kind) {
            flight.lines.push(line.to_string());
            return LineOutcome::Information;
        }

        LineOutcome::Notification
    }

    /// Fail the in-flight command if it has waited longer than `timeout`.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Option<Completion> {
        let stale = self
            .in_flight
            .as_ref()
            .is_some_and(|f| now.saturating_duration_since(f.sent_at) >= timeout);
        if !stale {
            return None;
        }
        self.in_flight.take().map(|flight| Completion {
            command: flight.command,
            response: None,
            lines: flight.lines,
        })
    }

    /// Drop every queued and in-flight command. Waiting callers see their
    /// reply channel close.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len() + usize::from(self.in_flight.is_some());
        self.pending.clear();
        self.in_flight = None;
        dropped
    }
}
