//! Per-device IO task.
//!
//! One tokio task owns both channels of a device exclusively. It waits on
//! control-channel readability with a fixed bound, writes whatever the
//! protocol layer has ready, feeds received bytes through the
//! [`LineFramer`], and hands each completed line to a [`LinkHandler`].
//! The handler owns protocol interpretation (transaction matching,
//! lifecycle); this module owns only the mechanics.
//!
//! The loop ends on cancellation, observed once per wake, or on any fatal
//! condition: a read or write failure, a framing fault, a dead channel, or
//! a handler error. Both channels are closed on the way out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use cardlink_core::error::{Error, Result};
use cardlink_core::transport::Transport;

use crate::protocol::{DEFAULT_MAX_LINE, LineFramer, PROMPT};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Bound on a single readiness wait.
pub const READINESS_WAIT: Duration = Duration::from_millis(1000);

/// Bound on a single transmit.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(1000);

const READ_CHUNK: usize = 256;

/// Tuning for the IO task.
#[derive(Debug, Clone)]
pub struct IoConfig {
    /// Device name used in log fields.
    pub device: String,
    /// How long one readiness wait may last before it counts as idle.
    pub readiness_wait: Duration,
    /// How long one write may take before it counts as a transport failure.
    pub write_timeout: Duration,
    /// Line length bound for the framer.
    pub max_line: usize,
}

impl IoConfig {
    pub fn new(device: impl Into<String>) -> Self {
        IoConfig {
            device: device.into(),
            readiness_wait: READINESS_WAIT,
            write_timeout: WRITE_TIMEOUT,
            max_line: DEFAULT_MAX_LINE,
        }
    }
}

/// Protocol side of the IO task.
///
/// Implementations take their own lock inside each call; the IO task holds
/// no lock across a wait.
#[async_trait]
pub trait LinkHandler: Send + Sync + 'static {
    /// Bytes to write now, if the queue is idle and non-empty.
    async fn poll_transmit(&self) -> Option<Vec<u8>>;

    /// A completed line arrived. May return bytes to write immediately
    /// (a prompted payload). An error is fatal.
    async fn on_line(&self, line: &[u8]) -> Result<Option<Vec<u8>>>;

    /// A readiness wait elapsed with nothing to read. An error is fatal.
    async fn on_idle(&self) -> Result<()>;

    /// The loop has stopped and closed both channels. `fault` is `None`
    /// when it stopped because of cancellation.
    async fn on_exit(&self, fault: Option<Error>);
}

/// Handle to a running IO task.
pub struct LinkIo {
    wake: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LinkIo {
    /// Ask the task to re-check the queue for work to write.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task for one device.
pub fn spawn_io_task(
    control: Box<dyn Transport>,
    audio: Box<dyn Transport>,
    config: IoConfig,
    handler: Arc<dyn LinkHandler>,
) -> LinkIo {
    let wake = Arc::new(Notify::new());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(io_loop(
        control,
        audio,
        config,
        handler,
        wake.clone(),
        cancel.clone(),
    ));
    LinkIo { wake, cancel, task }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

async fn io_loop(
    mut control: Box<dyn Transport>,
    mut audio: Box<dyn Transport>,
    config: IoConfig,
    handler: Arc<dyn LinkHandler>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    let device = config.device.as_str();
    let mut framer = LineFramer::with_max_line(config.max_line);
    let mut buf = [0u8; READ_CHUNK];

    let fault = loop {
        if cancel.is_cancelled() {
            break None;
        }
        if !control.is_connected() || !audio.is_connected() {
            break Some(Error::ConnectionLost);
        }

        if let Some(bytes) = handler.poll_transmit().await {
            if let Err(e) = transmit(&mut *control, &bytes, config.write_timeout, device).await {
                break Some(e);
            }
            continue;
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => break None,

            _ = wake.notified() => {}

            res = control.receive(&mut buf, config.readiness_wait) => match res {
                Ok(0) => break Some(Error::ConnectionLost),
                Ok(n) => {
                    trace!(device, bytes = n, data = ?&buf[..n], "received");
                    if let Err(e) = process_bytes(
                        &buf[..n], &mut framer, &mut *control, &*handler, &config,
                    ).await {
                        break Some(e);
                    }
                }
                Err(Error::Timeout) => {
                    if let Err(e) = handler.on_idle().await {
                        break Some(e);
                    }
                }
                Err(e) => break Some(e),
            },
        }
    };

    match &fault {
        Some(e) => debug!(device, error = %e, "IO task stopping on fault"),
        None => debug!(device, "IO task cancelled"),
    }
    let _ = control.close().await;
    let _ = audio.close().await;
    handler.on_exit(fault).await;
}

/// Frame a chunk of received bytes and dispatch every completed line.
async fn process_bytes(
    data: &[u8],
    framer: &mut LineFramer,
    control: &mut dyn Transport,
    handler: &dyn LinkHandler,
    config: &IoConfig,
) -> Result<()> {
    for line in framer.feed(data)? {
        dispatch(&line, control, handler, config).await?;
    }
    if framer.take_prompt() {
        dispatch(PROMPT, control, handler, config).await?;
    }
    Ok(())
}

async fn dispatch(
    line: &[u8],
    control: &mut dyn Transport,
    handler: &dyn LinkHandler,
    config: &IoConfig,
) -> Result<()> {
    if let Some(reply) = handler.on_line(line).await? {
        transmit(control, &reply, config.write_timeout, &config.device).await?;
    }
    Ok(())
}

async fn transmit(
    control: &mut dyn Transport,
    bytes: &[u8],
    limit: Duration,
    device: &str,
) -> Result<()> {
    trace!(device, data = %String::from_utf8_lossy(bytes).escape_debug(), "sending");
    match tokio::time::timeout(limit, control.send(bytes)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Transport(format!(
            "write of {} bytes did not finish within {limit:?}",
            bytes.len()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
