//! Chunked file content: streaming a file out and assembling it back.
//!
//! A chunk sequence is one or more `{ n, isLast, n bytes }` frames. A chunk
//! is last when it is shorter than the buffer size or when the bytes sent so
//! far reach the size the file had when the transfer started. An empty file
//! is exactly one chunk with `n = 0`.

use crate::error::{Result, TransferError};
use crate::streaming::codec::{encode_chunk, read_bool, read_len};
use crate::streaming::pump::FrameSender;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Copy buffer used when moving chunk payloads from the stream to disk.
const COPY_BUF_SIZE: usize = 64 * 1024;

// =============================================================================
// Streamer
// =============================================================================

/// Emit `file` as a chunk sequence. `total` is the file size taken once
/// before the first read. Returns the content bytes sent.
pub async fn stream_file(
    frames: &FrameSender,
    file: &mut File,
    path: &Path,
    total: u64,
    buf_size: usize,
) -> Result<u64> {
    let mut buf = vec![0u8; buf_size];
    let mut sent = 0u64;

    loop {
        let n = read_full(file, &mut buf)
            .await
            .map_err(|e| TransferError::fs(path, e))?;

        if n == 0 && total > 0 {
            return Err(TransferError::IncompleteRead {
                path: path.to_path_buf(),
                read: sent,
                expected: total,
            });
        }
        sent += n as u64;

        let is_last = n < buf_size || sent == total;
        frames.submit(encode_chunk(&buf[..n], is_last)).await?;

        if is_last {
            break;
        }
    }

    debug!(path = %path.display(), bytes = sent, "streamed file");
    Ok(sent)
}

/// Read until `buf` is full or the file ends. A short count means EOF.
async fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Open `path`, size it, and stream it.
pub async fn stream_path(frames: &FrameSender, path: &Path, buf_size: usize) -> Result<u64> {
    let mut file = File::open(path)
        .await
        .map_err(|e| TransferError::fs(path, e))?;
    let total = file
        .metadata()
        .await
        .map_err(|e| TransferError::fs(path, e))?
        .len();
    stream_file(frames, &mut file, path, total, buf_size).await
}

// =============================================================================
// Assembler
// =============================================================================

/// Result of assembling one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assembled {
    /// Bytes written to the destination.
    pub bytes: u64,
    /// False when the stream closed inside a chunk payload.
    pub complete: bool,
}

/// Consume a chunk sequence from `reader` into `dest`, creating parent
/// directories and truncating any existing file.
///
/// Chunks longer than `max_chunk` are a protocol violation. If the stream
/// closes partway through a payload the partial file is kept and the call
/// still succeeds; the stream carries no total size to check against.
pub async fn assemble_file<R>(reader: &mut R, dest: &Path, max_chunk: usize) -> Result<Assembled>
where
    R: AsyncRead + Unpin,
{
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TransferError::fs(parent, e))?;
        }
    }
    let mut file = File::create(dest)
        .await
        .map_err(|e| TransferError::fs(dest, e))?;

    let mut copy_buf = vec![0u8; COPY_BUF_SIZE.min(max_chunk.max(1))];
    let mut bytes = 0u64;
    let mut complete = true;

    loop {
        let declared = read_len(reader, max_chunk, "chunk").await?;
        let is_last = read_bool(reader).await?;

        let copied = copy_exact(reader, &mut file, dest, declared, &mut copy_buf).await?;
        bytes += copied;

        if copied < declared as u64 {
            warn!(
                path = %dest.display(),
                declared,
                copied,
                "stream closed mid-chunk, keeping partial file"
            );
            complete = false;
            break;
        }
        if is_last {
            break;
        }
    }

    file.flush().await.map_err(|e| TransferError::fs(dest, e))?;
    debug!(path = %dest.display(), bytes, complete, "assembled file");
    Ok(Assembled { bytes, complete })
}

/// Copy up to `len` bytes from `reader` to `file`. Stops early only on a
/// clean end of stream.
async fn copy_exact<R>(
    reader: &mut R,
    file: &mut File,
    dest: &Path,
    len: usize,
    buf: &mut [u8],
) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(buf.len());
        let n = reader
            .read(&mut buf[..want])
            .await
            .map_err(TransferError::Connection)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .await
            .map_err(|e| TransferError::fs(dest, e))?;
        remaining -= n;
    }
    Ok((len - remaining) as u64)
}

// =============================================================================
// Tests
// =============================================================================
