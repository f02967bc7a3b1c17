//! Transfer sessions: both ends of one connection.
//!
//! A session is a single transfer. The client picks a direction, writes the
//! header frames and then either streams content or reads the reply. The
//! serving side reads the header, dispatches on it, and closes.
//!
//! ```text
//! SEND:     true, single, destRoot, [fileName], chunks | dir sequence
//! REQUEST:  false, bufSize, sourcePath      ->  chunks | dir sequence
//! ```
//!
//! Outgoing frames always go through a [`SendPump`]; incoming frames are read
//! directly from the read half.

use crate::error::{Result, TransferError};
use crate::streaming::chunk::{assemble_file, stream_path};
use crate::streaming::codec::{
    encode_bool, encode_int, encode_path, read_bool, read_int, read_path,
};
use crate::streaming::protocol::{
    path_to_wire, wire_to_path, wire_to_relative, Direction, TransferMode, TransferRequest,
    MAX_CHUNK_SIZE,
};
use crate::streaming::pump::{FrameSender, SendPump};
use crate::streaming::receiver::receive_directory;
use crate::streaming::stats::TransferStats;
use crate::streaming::walker::send_directory;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, info, warn};

/// What the serving side did for one connection.
#[derive(Debug, Clone)]
pub struct ServedTransfer {
    pub direction: Direction,
    pub mode: TransferMode,
    /// Destination root for SEND, source path for REQUEST
    pub path: PathBuf,
    pub stats: TransferStats,
}

// =============================================================================
// Client side
// =============================================================================

/// Push `source` to the peer under `destination`.
///
/// `Ok` means every frame was written and the peer then closed the
/// connection. The protocol has no acknowledgement, so a peer that failed to
/// store the data closes the same way; a failed push can come back `Ok`.
pub async fn send_path<S>(
    conn: S,
    source: impl Into<PathBuf>,
    destination: impl Into<PathBuf>,
    buf_size: usize,
) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let request = TransferRequest::send(source, destination)?.with_buffer_size(buf_size)?;
    execute(conn, &request).await
}

/// Pull `source` from the peer into `destination`.
pub async fn request_path<S>(
    conn: S,
    source: impl Into<PathBuf>,
    destination: impl Into<PathBuf>,
    buf_size: usize,
) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let request = TransferRequest::request(source, destination)?.with_buffer_size(buf_size)?;
    execute(conn, &request).await
}

/// Run `request` over `conn`, consuming the connection.
pub async fn execute<S>(conn: S, request: &TransferRequest) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(conn);
    let stats = match request.direction() {
        Direction::Send => execute_send(reader, writer, request).await?,
        Direction::Request => execute_request(reader, writer, request).await?,
    };

    info!(
        direction = ?request.direction(),
        mode = ?request.mode(),
        source = %request.source().display(),
        destination = %request.destination().display(),
        files = stats.files,
        bytes = stats.bytes,
        "transfer complete"
    );
    Ok(stats)
}

async fn execute_send<S>(
    mut reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    request: &TransferRequest,
) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (pump, frames) = SendPump::spawn(writer);
    let produced = produce_send(&frames, request).await;
    let (stats, writer) = settle(pump, frames, produced).await?;
    close_writer(writer).await?;

    // Wait for the peer to stop reading and close. This does not tell a
    // stored transfer from a failed one.
    let mut trailing = [0u8; 1];
    match reader.read(&mut trailing).await {
        Ok(0) => Ok(stats),
        Ok(_) => Err(TransferError::protocol("unexpected data after transfer")),
        Err(e) => Err(TransferError::Connection(e)),
    }
}

async fn produce_send(frames: &FrameSender, request: &TransferRequest) -> Result<TransferStats> {
    let single = request.mode() == TransferMode::SingleFile;

    frames.submit(encode_bool(Direction::Send.as_wire())).await?;
    frames.submit(encode_bool(single)).await?;
    frames
        .submit(encode_path(&path_to_wire(request.dest_root())))
        .await?;

    if single {
        let name = request.dest_file_name()?;
        frames.submit(encode_path(&path_to_wire(&name))).await?;

        let bytes = stream_path(frames, request.source(), request.buf_size()).await?;
        let mut stats = TransferStats::new();
        stats.record_file(bytes);
        Ok(stats)
    } else {
        send_directory(frames, request.source(), request.buf_size()).await
    }
}

async fn execute_request<S>(
    mut reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    request: &TransferRequest,
) -> Result<TransferStats>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (pump, frames) = SendPump::spawn(writer);
    let produced = produce_request(&frames, request).await;
    let ((), writer) = settle(pump, frames, produced).await?;
    // Nothing else goes out; the reply follows on the read half.
    close_writer(writer).await?;

    let max_chunk = request.buf_size();
    match request.mode() {
        TransferMode::SingleFile => {
            let dest = request.dest_root().join(request.dest_file_name()?);
            let assembled = assemble_file(&mut reader, &dest, max_chunk).await?;
            let mut stats = TransferStats::new();
            stats.record_file(assembled.bytes);
            if !assembled.complete {
                stats.truncated += 1;
            }
            Ok(stats)
        }
        TransferMode::Directory => {
            receive_directory(&mut reader, request.dest_root(), max_chunk).await
        }
    }
}

async fn produce_request(frames: &FrameSender, request: &TransferRequest) -> Result<()> {
    frames
        .submit(encode_bool(Direction::Request.as_wire()))
        .await?;
    frames.submit(encode_int(request.buf_size() as i64)).await?;
    frames
        .submit(encode_path(&path_to_wire(request.source())))
        .await
}

// =============================================================================
// Serving side
// =============================================================================

/// Handle one inbound transfer on `conn`, then drop the connection.
pub async fn serve_connection<S>(conn: S) -> Result<ServedTransfer>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(conn);

    let direction = Direction::from_wire(read_bool(&mut reader).await?);
    let served = match direction {
        Direction::Send => serve_send(&mut reader).await?,
        Direction::Request => serve_request(&mut reader, writer).await?,
    };

    info!(
        direction = ?served.direction,
        mode = ?served.mode,
        path = %served.path.display(),
        files = served.stats.files,
        bytes = served.stats.bytes,
        truncated = served.stats.truncated,
        "served transfer"
    );
    Ok(served)
}

async fn serve_send<R>(reader: &mut R) -> Result<ServedTransfer>
where
    R: AsyncRead + Unpin,
{
    let single = read_bool(reader).await?;
    let root = wire_to_path(read_path(reader).await?)?;

    let (mode, stats) = if single {
        let name = wire_to_relative(&read_path(reader).await?)?;
        let dest = root.join(&name);
        debug!(path = %dest.display(), "receiving file");

        let assembled = assemble_file(reader, &dest, MAX_CHUNK_SIZE).await?;
        let mut stats = TransferStats::new();
        stats.record_file(assembled.bytes);
        if !assembled.complete {
            stats.truncated += 1;
        }
        (TransferMode::SingleFile, stats)
    } else {
        debug!(root = %root.display(), "receiving directory");
        let stats = receive_directory(reader, &root, MAX_CHUNK_SIZE).await?;
        (TransferMode::Directory, stats)
    };

    Ok(ServedTransfer {
        direction: Direction::Send,
        mode,
        path: root,
        stats,
    })
}

async fn serve_request<R, W>(reader: &mut R, writer: W) -> Result<ServedTransfer>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let requested = read_int(reader).await?;
    if requested <= 0 || requested as u64 > MAX_CHUNK_SIZE as u64 {
        return Err(TransferError::protocol(format!(
            "requested buffer size {} outside 1..={}",
            requested, MAX_CHUNK_SIZE
        )));
    }
    let buf_size = requested as usize;
    let source = wire_to_path(read_path(reader).await?)?;
    let mode = TransferMode::infer(&source);
    debug!(source = %source.display(), ?mode, buf_size, "serving request");

    let (pump, frames) = SendPump::spawn(writer);
    let produced = produce_reply(&frames, &source, mode, buf_size).await;
    let (stats, writer) = settle(pump, frames, produced).await?;
    close_writer(writer).await?;

    Ok(ServedTransfer {
        direction: Direction::Request,
        mode,
        path: source,
        stats,
    })
}

async fn produce_reply(
    frames: &FrameSender,
    source: &Path,
    mode: TransferMode,
    buf_size: usize,
) -> Result<TransferStats> {
    match mode {
        TransferMode::SingleFile => {
            let bytes = stream_path(frames, source, buf_size).await?;
            let mut stats = TransferStats::new();
            stats.record_file(bytes);
            Ok(stats)
        }
        TransferMode::Directory => send_directory(frames, source, buf_size).await,
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Drain the pump after the producer is done and pick the error to report.
///
/// Frames already queued are still written, so a directory terminator
/// submitted after a walk error reaches the peer. When the producer only saw
/// the queue close, the pump's own failure is the cause.
async fn settle<W, T>(
    pump: SendPump<W>,
    frames: FrameSender,
    produced: Result<T>,
) -> Result<(T, W)>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    drop(frames);
    let drained = pump.finish().await;

    match (produced, drained) {
        (Ok(value), Ok((writer, written))) => {
            debug!(written, "send pump drained");
            Ok((value, writer))
        }
        (Ok(_), Err(e)) => Err(e),
        (Err(TransferError::PumpClosed), Err(e)) => Err(e),
        (Err(e), drained) => {
            if let Err(pump_err) = drained {
                warn!(error = %pump_err, "send pump failed after producer error");
            }
            Err(e)
        }
    }
}

async fn close_writer<W: AsyncWrite + Unpin>(mut writer: W) -> Result<()> {
    writer.shutdown().await.map_err(TransferError::Connection)
}

// =============================================================================
// Tests
// =============================================================================
