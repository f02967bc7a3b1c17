//! Directory receiver.
//!
//! Reads a directory sequence off the stream and recreates each file under
//! the destination root. Intermediate directories are created on demand.

use crate::error::{Result, TransferError};
use crate::streaming::chunk::assemble_file;
use crate::streaming::codec::{read_bool, read_path};
use crate::streaming::protocol::wire_to_relative;
use crate::streaming::stats::TransferStats;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, info};

/// Join a checked relative path onto `root` and make sure the result stays
/// under it.
fn resolve_under(root: &Path, relative: &Path) -> Result<PathBuf> {
    let full = root.join(relative);
    if !normalize_path(&full).starts_with(normalize_path(root)) {
        return Err(TransferError::protocol(format!(
            "path escapes destination root: {}",
            relative.display()
        )));
    }
    Ok(full)
}

/// Normalize a path without requiring it to exist (unlike canonicalize)
fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            c => normalized.push(c),
        }
    }
    normalized
}

/// Consume `{ false, relPath, chunks }* true` into `dest_root`.
///
/// `max_chunk` bounds each declared chunk length. The root is created even
/// when the sequence carries no files.
pub async fn receive_directory<R>(
    reader: &mut R,
    dest_root: &Path,
    max_chunk: usize,
) -> Result<TransferStats>
where
    R: AsyncRead + Unpin,
{
    if !dest_root.as_os_str().is_empty() {
        fs::create_dir_all(dest_root)
            .await
            .map_err(|e| TransferError::fs(dest_root, e))?;
    }

    let mut stats = TransferStats::new();

    while !read_bool(reader).await? {
        let raw = read_path(reader).await?;
        let relative = wire_to_relative(&raw)?;
        let dest = resolve_under(dest_root, &relative)?;

        let assembled = assemble_file(reader, &dest, max_chunk).await?;
        stats.record_file(assembled.bytes);
        if !assembled.complete {
            stats.truncated += 1;
            // The stream is gone; nothing more can follow.
            break;
        }
        debug!(path = %dest.display(), bytes = assembled.bytes, "received file");
    }

    info!(
        root = %dest_root.display(),
        files = stats.files,
        bytes = stats.bytes,
        "directory received"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::codec::{encode_chunk, put_bool, put_path};
    use bytes::{BufMut, BytesMut};
    use tempfile::TempDir;

    fn push_file(wire: &mut BytesMut, rel: &[u8], content: &[u8]) {
        put_bool(wire, false);
        put_path(wire, rel);
        wire.put_slice(&encode_chunk(content, true));
    }

    #[tokio::test]
    async fn test_receive_nested_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("dest");

        let mut wire = BytesMut::new();
        push_file(&mut wire, b"top.txt", b"top");
        push_file(&mut wire, b"a/b/c.txt", b"deep");
        push_file(&mut wire, b"a/empty.bin", b"");
        put_bool(&mut wire, true);

        let stats = receive_directory(&mut &wire[..], &root, 1024)
            .await
            .unwrap();

        assert_eq!(stats.files, 3);
        assert_eq!(stats.bytes, 7);
        assert_eq!(std::fs::read(root.join("top.txt")).unwrap(), b"top");
        assert_eq!(std::fs::read(root.join("a/b/c.txt")).unwrap(), b"deep");
        assert_eq!(std::fs::read(root.join("a/empty.bin")).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_empty_sequence_creates_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("fresh");

        let stats = receive_directory(&mut &[1u8][..], &root, 1024)
            .await
            .unwrap();

        assert_eq!(stats, TransferStats::default());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("dest");

        for evil in [&b"../escape.txt"[..], b"/etc/passwd", b"a/../../x", b""] {
            let mut wire = BytesMut::new();
            push_file(&mut wire, evil, b"bad");
            put_bool(&mut wire, true);

            let err = receive_directory(&mut &wire[..], &root, 1024)
                .await
                .unwrap_err();
            assert!(matches!(err, TransferError::ProtocolViolation(_)));
        }
        assert!(!tmp.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_terminator_is_short_read() {
        let tmp = TempDir::new().unwrap();
        let mut wire = BytesMut::new();
        push_file(&mut wire, b"one.txt", b"1");

        let err = receive_directory(&mut &wire[..], tmp.path(), 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::ShortRead { .. }));
        assert_eq!(std::fs::read(tmp.path().join("one.txt")).unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_truncated_payload_keeps_partial_file() {
        let tmp = TempDir::new().unwrap();
        let mut wire = BytesMut::new();
        put_bool(&mut wire, false);
        put_path(&mut wire, b"cut.bin");
        let chunk = encode_chunk(b"0123456789", true);
        wire.put_slice(&chunk[..chunk.len() - 4]);

        let stats = receive_directory(&mut &wire[..], tmp.path(), 1024)
            .await
            .unwrap();
        assert_eq!(stats.truncated, 1);
        assert_eq!(std::fs::read(tmp.path().join("cut.bin")).unwrap(), b"012345");
    }

    #[test]
    fn test_resolve_under() {
        let root = Path::new("/srv/dest");
        assert_eq!(
            resolve_under(root, Path::new("a/b.txt")).unwrap(),
            PathBuf::from("/srv/dest/a/b.txt")
        );
        assert!(resolve_under(root, Path::new("../x")).is_err());
    }
}
