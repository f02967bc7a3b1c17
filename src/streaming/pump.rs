//! Send pump: the one task per connection that writes to the socket.
//!
//! ```text
//! Walker / Streamer ─► FrameSender ─► mpsc(1) ─► pump task ─► socket
//! ```
//!
//! The queue holds a single frame, so a producer can be at most one frame
//! ahead of the socket. A slow peer stalls the producer; that is the only
//! backpressure in the system. Frames are written whole and in submission
//! order.

use crate::error::{Result, TransferError};
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

/// Queue depth between producer and pump.
pub const PUMP_QUEUE_DEPTH: usize = 1;

/// Producer side of the pump.
pub struct FrameSender {
    tx: mpsc::Sender<Bytes>,
}

impl FrameSender {
    /// Queue a pre-encoded frame, waiting until the pump can take it.
    pub async fn submit(&self, frame: Bytes) -> Result<()> {
        trace!(len = frame.len(), "submit frame");
        self.tx
            .send(frame)
            .await
            .map_err(|_| TransferError::PumpClosed)
    }
}

/// Handle to a running pump task.
pub struct SendPump<W> {
    task: JoinHandle<Result<(W, u64)>>,
    _guard: DropGuard,
}

impl<W> SendPump<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Spawn a pump that owns `writer`.
    ///
    /// Dropping the returned `SendPump` cancels the task.
    pub fn spawn(writer: W) -> (Self, FrameSender) {
        let (tx, rx) = mpsc::channel(PUMP_QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump_loop(rx, writer, cancel.clone()));
        let pump = Self {
            task,
            _guard: cancel.drop_guard(),
        };
        (pump, FrameSender { tx })
    }

    /// Wait for every submitted frame to be written, then flush.
    ///
    /// The queue closes once the `FrameSender` is dropped, so callers must
    /// drop theirs first. Returns the writer and the bytes written.
    pub async fn finish(self) -> Result<(W, u64)> {
        self.task.await?
    }
}

async fn pump_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    cancel: CancellationToken,
) -> Result<(W, u64)>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;

    loop {
        let frame = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(written, "send pump cancelled");
                return Ok((writer, written));
            }
            next = rx.recv() => match next {
                Some(frame) => frame,
                None => break,
            },
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(written, "send pump cancelled mid-frame");
                return Ok((writer, written));
            }
            res = writer.write_all(&frame) => res.map_err(TransferError::Connection)?,
        }
        written += frame.len() as u64;
    }

    writer.flush().await.map_err(TransferError::Connection)?;
    Ok((writer, written))
}
