//! AT command protocol engine for cardlink.
//!
//! This crate turns the raw byte stream of a modem's control channel into
//! classified lines and serializes the commands sent back to it.
//!
//! # Architecture
//!
//! - [`protocol`]: line framer, response classifier, wire constants
//! - [`command`]: command type and the AT command builders
//! - [`queue`]: the single-in-flight transaction manager
//! - [`io`]: the per-device IO task and its [`LinkHandler`](io::LinkHandler) seam

pub mod command;
pub mod io;
pub mod protocol;
pub mod queue;

pub use command::{Command, CommandKind};
pub use io::{IoConfig, LinkHandler, LinkIo, spawn_io_task};
pub use protocol::{LineFramer, ResponseKind, classify};
pub use queue::{Completion, LineOutcome, TransactionManager};
