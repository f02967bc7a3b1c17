//! Directory walker for the sending side.
//!
//! Walks the source tree depth-first in file-name order and streams every
//! regular file as `BoolFrame(false)`, `PathFrame relPath`, chunk sequence.
//! Directories are never framed; they only prefix the paths of their files.
//! The sequence always ends with one `BoolFrame(true)`, even when the walk
//! fails, and the walk error is still what the caller gets back.
//!
//! ```text
//! spawn_blocking(WalkBuilder) --mpsc(1)--> send_directory --> FrameSender
//! ```

use crate::error::{Result, TransferError};
use crate::streaming::chunk::stream_path;
use crate::streaming::codec::{encode_bool, encode_path};
use crate::streaming::protocol::relative_to_wire;
use crate::streaming::pump::FrameSender;
use crate::streaming::stats::TransferStats;
use ignore::WalkBuilder;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Records buffered between the blocking walk and the sender.
pub const WALK_QUEUE_DEPTH: usize = 1;

/// A regular file found by the walk. Lives for one file's transfer.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Path relative to the walk root, `/`-joined on the wire
    pub relative: PathBuf,

    /// Path on disk
    pub absolute: PathBuf,
}

// =============================================================================
// Walk
// =============================================================================

/// A directory walk running on the blocking pool.
///
/// Records arrive one at a time in walk order. A traversal error is the last
/// item; nothing follows it.
pub struct FileWalk {
    rx: mpsc::Receiver<Result<FileRecord>>,
    task: JoinHandle<()>,
}

impl FileWalk {
    /// Start walking `root`. A root that is a file yields that one file under
    /// its own name.
    pub fn start(root: &Path) -> Self {
        let (tx, rx) = mpsc::channel(WALK_QUEUE_DEPTH);
        let root = root.to_path_buf();
        let task = tokio::task::spawn_blocking(move || walk_blocking(&root, tx));
        Self { rx, task }
    }

    pub async fn next(&mut self) -> Option<Result<FileRecord>> {
        self.rx.recv().await
    }

    /// Stop the walk, whether or not it was drained, and wait for its task.
    pub async fn finish(self) -> Result<()> {
        drop(self.rx);
        self.task.await?;
        Ok(())
    }
}

fn walk_blocking(root: &Path, tx: mpsc::Sender<Result<FileRecord>>) {
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let _ = tx.blocking_send(Err(walk_error(root, e)));
                return;
            }
        };

        let file_type = entry.file_type();
        if !file_type.map(|t| t.is_file()).unwrap_or(false) {
            if !file_type.map(|t| t.is_dir()).unwrap_or(false) {
                debug!(path = %entry.path().display(), "skipping non-regular entry");
            }
            continue;
        }

        let absolute = entry.into_path();
        let relative = match absolute.strip_prefix(root) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
            // The root itself is a file: send it under its own name.
            _ => absolute.file_name().map(PathBuf::from).unwrap_or_default(),
        };

        // The receiving side hung up: stop walking.
        if tx
            .blocking_send(Ok(FileRecord { relative, absolute }))
            .is_err()
        {
            return;
        }
    }
}

fn walk_error(root: &Path, err: ignore::Error) -> TransferError {
    let msg = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, msg));
    TransferError::fs(root, source)
}

// =============================================================================
// Sending
// =============================================================================

/// Stream the tree under `root` as a directory sequence.
pub async fn send_directory(
    frames: &FrameSender,
    root: &Path,
    buf_size: usize,
) -> Result<TransferStats> {
    let mut walk = FileWalk::start(root);
    let mut stats = TransferStats::new();
    let mut result = Ok(());

    while let Some(item) = walk.next().await {
        let sent = match item {
            Ok(record) => send_record(frames, &record, buf_size).await,
            Err(e) => Err(e),
        };
        match sent {
            Ok(bytes) => stats.record_file(bytes),
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }

    let walked = walk.finish().await;
    let closed = frames.submit(encode_bool(true)).await;

    match (result.and(walked), closed) {
        (Err(e), _) => {
            warn!(root = %root.display(), error = %e, "directory walk failed");
            Err(e)
        }
        (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => {
            debug!(root = %root.display(), files = stats.files, bytes = stats.bytes, "sent directory");
            Ok(stats)
        }
    }
}

/// Frame one file. Its size is taken when it is opened, right before the
/// first chunk. Returns the content bytes sent.
async fn send_record(frames: &FrameSender, record: &FileRecord, buf_size: usize) -> Result<u64> {
    frames.submit(encode_bool(false)).await?;
    frames
        .submit(encode_path(&relative_to_wire(&record.relative)))
        .await?;
    stream_path(frames, &record.absolute, buf_size).await
}
