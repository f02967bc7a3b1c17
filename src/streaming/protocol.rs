//! Protocol constants, transfer requests and wire path rules.
//!
//! Wire format: all integers are 8-byte big-endian, booleans are one byte
//! (0 or 1). No frame carries a type tag; the reader knows what comes next
//! from its position in the exchange.
//!
//! ```text
//! Connection preamble:       BoolFrame direction
//! SEND payload:              BoolFrame singleFile, PathFrame destRoot,
//!                            [PathFrame fileName] ChunkSeq | DirSeq
//! REQUEST payload:           IntFrame bufSize, PathFrame sourcePath
//! REQUEST reply (single):    ChunkSeq
//! REQUEST reply (directory): DirSeq
//! ChunkSeq:                  { IntFrame n, BoolFrame isLast, n bytes }+
//! DirSeq:                    { BoolFrame false, PathFrame relPath, ChunkSeq }* BoolFrame true
//! ```

use crate::error::{Result, TransferError};
use std::path::{Component, Path, PathBuf};

/// Default chunk buffer size.
pub const DEFAULT_BUF_SIZE: usize = 16 * 1024;

/// Largest chunk payload accepted from a peer (64MB) - prevents OOM from
/// corrupted length frames.
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Largest path frame accepted from a peer.
pub const MAX_PATH_LEN: usize = 32 * 1024;

// =============================================================================
// Direction / Mode
// =============================================================================

/// First byte on every connection, written by the initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Initiator pushes data; the peer stores it.
    Send,
    /// Initiator asks the peer to read a path and send it back.
    Request,
}

impl Direction {
    pub fn as_wire(self) -> bool {
        matches!(self, Direction::Send)
    }

    pub fn from_wire(flag: bool) -> Self {
        if flag {
            Direction::Send
        } else {
            Direction::Request
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    SingleFile,
    Directory,
}

impl TransferMode {
    /// Guess the mode of a path that cannot be inspected (it lives on the
    /// peer): a final component with a dot is a file, anything else a
    /// directory. A directory named `archive.bak` is misread as a file and an
    /// extensionless file as a directory.
    pub fn infer(path: &Path) -> Self {
        if has_extension(path) {
            TransferMode::SingleFile
        } else {
            TransferMode::Directory
        }
    }

    /// Mode of a path on this host, from its metadata.
    pub fn of_local(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path).map_err(|e| TransferError::fs(path, e))?;
        Ok(if meta.is_dir() {
            TransferMode::Directory
        } else {
            TransferMode::SingleFile
        })
    }
}

/// True when the last path element contains a dot. Scans the raw text back to
/// the nearest separator, so `dir/` has no extension and `.profile` has one.
pub fn has_extension(path: &Path) -> bool {
    let text = path.to_string_lossy();
    for c in text.chars().rev() {
        if std::path::is_separator(c) {
            return false;
        }
        if c == '.' {
            return true;
        }
    }
    false
}

// =============================================================================
// TransferRequest
// =============================================================================

/// One transfer, fixed at construction.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    direction: Direction,
    mode: TransferMode,
    buf_size: usize,
    source: PathBuf,
    destination: PathBuf,
}

impl TransferRequest {
    /// Push a local `source` into `destination` on the peer.
    pub fn send(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let destination = destination.into();
        let mode = TransferMode::of_local(&source)?;
        if mode == TransferMode::Directory && has_extension(&destination) {
            return Err(TransferError::InvalidRequest(format!(
                "cannot send directory {} to {}: both sides must be directories",
                source.display(),
                destination.display()
            )));
        }
        Ok(Self {
            direction: Direction::Send,
            mode,
            buf_size: DEFAULT_BUF_SIZE,
            source,
            destination,
        })
    }

    /// Pull `source` from the peer into the local `destination`.
    pub fn request(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Result<Self> {
        let source = source.into();
        let destination = destination.into();
        let mode = TransferMode::infer(&source);
        if mode == TransferMode::Directory && has_extension(&destination) {
            return Err(TransferError::InvalidRequest(format!(
                "cannot request directory {} into {}: both sides must be directories",
                source.display(),
                destination.display()
            )));
        }
        Ok(Self {
            direction: Direction::Request,
            mode,
            buf_size: DEFAULT_BUF_SIZE,
            source,
            destination,
        })
    }

    pub fn with_buffer_size(mut self, buf_size: usize) -> Result<Self> {
        validate_buf_size(buf_size)?;
        self.buf_size = buf_size;
        Ok(self)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Directory the transfer lands in. For a single file whose destination
    /// carries an extension, the destination names the file and its parent is
    /// the root.
    pub fn dest_root(&self) -> &Path {
        if self.names_target_file() {
            self.destination.parent().unwrap_or_else(|| Path::new(""))
        } else {
            &self.destination
        }
    }

    /// File name of a single-file transfer at the destination.
    pub fn dest_file_name(&self) -> Result<PathBuf> {
        let named = if self.names_target_file() {
            self.destination.file_name()
        } else {
            self.source.file_name()
        };
        named.map(PathBuf::from).ok_or_else(|| {
            TransferError::InvalidRequest(format!(
                "no file name in {}",
                self.source.display()
            ))
        })
    }

    fn names_target_file(&self) -> bool {
        self.mode == TransferMode::SingleFile
            && has_extension(&self.destination)
            && self.destination.file_name().is_some()
    }
}

/// Buffer sizes must be positive and within what a peer will accept.
pub fn validate_buf_size(buf_size: usize) -> Result<()> {
    if buf_size == 0 || buf_size > MAX_CHUNK_SIZE {
        return Err(TransferError::InvalidRequest(format!(
            "buffer size {} outside 1..={}",
            buf_size, MAX_CHUNK_SIZE
        )));
    }
    Ok(())
}

// =============================================================================
// Wire paths
// =============================================================================

/// Raw bytes of a host path (roots and request paths, sent as-is).
pub fn path_to_wire(path: &Path) -> Vec<u8> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    }
    #[cfg(not(unix))]
    {
        path.to_string_lossy().into_owned().into_bytes()
    }
}

/// Host path from raw wire bytes.
pub fn wire_to_path(bytes: Vec<u8>) -> Result<PathBuf> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
    }
    #[cfg(not(unix))]
    {
        String::from_utf8(bytes)
            .map(PathBuf::from)
            .map_err(|_| TransferError::protocol("path frame is not valid UTF-8"))
    }
}

/// Encode a root-relative path with `/` separators whatever the host uses.
pub fn relative_to_wire(relative: &Path) -> Vec<u8> {
    let mut out = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push(b'/');
            }
            out.extend_from_slice(&path_to_wire(Path::new(part)));
        }
    }
    out
}

/// Decode a `/`-separated relative path, refusing anything that could land
/// outside the destination root.
pub fn wire_to_relative(bytes: &[u8]) -> Result<PathBuf> {
    if bytes.is_empty() {
        return Err(TransferError::protocol("empty relative path"));
    }
    if bytes.contains(&0) {
        return Err(TransferError::protocol("relative path contains NUL byte"));
    }
    if bytes[0] == b'/' {
        return Err(TransferError::protocol("relative path is absolute"));
    }

    let mut relative = PathBuf::new();
    for part in bytes.split(|b| *b == b'/') {
        match part {
            b"" | b"." => continue,
            b".." => return Err(TransferError::protocol("relative path escapes root")),
            _ => {}
        }
        let part = wire_to_path(part.to_vec())?;
        if part.is_absolute() || part.components().count() != 1 {
            return Err(TransferError::protocol(format!(
                "invalid path component {}",
                part.display()
            )));
        }
        relative.push(part);
    }

    if relative.as_os_str().is_empty() {
        return Err(TransferError::protocol("relative path has no components"));
    }
    Ok(relative)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("/data/report.pdf")));
        assert!(has_extension(Path::new("archive.tar.gz")));
        assert!(has_extension(Path::new("/home/u/.profile")));
        assert!(!has_extension(Path::new("/data/set")));
        assert!(!has_extension(Path::new("/data.d/set")));
        assert!(!has_extension(Path::new("/data/set.d/")));
        assert!(!has_extension(Path::new("")));
    }

    #[test]
    fn test_extensionless_request_is_directory() {
        let req = TransferRequest::request("/data/set", "/tmp/out").unwrap();
        assert_eq!(req.mode(), TransferMode::Directory);
        assert_eq!(req.direction(), Direction::Request);
        assert_eq!(req.dest_root(), Path::new("/tmp/out"));
    }

    #[test]
    fn test_request_file_keeps_source_name() {
        let req = TransferRequest::request("/srv/a/report.pdf", "/tmp/out").unwrap();
        assert_eq!(req.mode(), TransferMode::SingleFile);
        assert_eq!(req.dest_root(), Path::new("/tmp/out"));
        assert_eq!(req.dest_file_name().unwrap(), PathBuf::from("report.pdf"));
    }

    #[test]
    fn test_request_file_renamed_by_destination() {
        let req = TransferRequest::request("/srv/a/report.pdf", "/tmp/out/copy.pdf").unwrap();
        assert_eq!(req.dest_root(), Path::new("/tmp/out"));
        assert_eq!(req.dest_file_name().unwrap(), PathBuf::from("copy.pdf"));
    }

    #[test]
    fn test_directory_into_file_rejected() {
        let err = TransferRequest::request("/srv/set", "/tmp/out.txt").unwrap_err();
        assert!(matches!(err, TransferError::InvalidRequest(_)));

        let tmp = TempDir::new().unwrap();
        let err = TransferRequest::send(tmp.path(), "/srv/in.txt").unwrap_err();
        assert!(matches!(err, TransferError::InvalidRequest(_)));
    }

    #[test]
    fn test_send_mode_from_metadata() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("noext");
        fs::write(&file, b"x").unwrap();

        let req = TransferRequest::send(&file, "/srv/in").unwrap();
        assert_eq!(req.mode(), TransferMode::SingleFile);
        assert_eq!(req.dest_file_name().unwrap(), PathBuf::from("noext"));

        let req = TransferRequest::send(tmp.path(), "/srv/in").unwrap();
        assert_eq!(req.mode(), TransferMode::Directory);
    }

    #[test]
    fn test_send_missing_source_is_filesystem_error() {
        let err = TransferRequest::send("/definitely/not/here.bin", "/srv").unwrap_err();
        assert!(matches!(err, TransferError::Filesystem { .. }));
    }

    #[test]
    fn test_buffer_size_bounds() {
        let req = TransferRequest::request("/a/b.txt", "/c").unwrap();
        assert_eq!(req.buf_size(), DEFAULT_BUF_SIZE);
        assert!(req.clone().with_buffer_size(0).is_err());
        assert!(req.clone().with_buffer_size(MAX_CHUNK_SIZE + 1).is_err());
        assert_eq!(req.with_buffer_size(1).unwrap().buf_size(), 1);
    }

    #[test]
    fn test_relative_to_wire_uses_forward_slashes() {
        let rel: PathBuf = ["nested", "deeper", "file.txt"].iter().collect();
        assert_eq!(relative_to_wire(&rel), b"nested/deeper/file.txt".to_vec());
    }

    #[test]
    fn test_wire_to_relative() {
        let rel = wire_to_relative(b"nested/./deeper//file.txt").unwrap();
        let expected: PathBuf = ["nested", "deeper", "file.txt"].iter().collect();
        assert_eq!(rel, expected);
    }

    #[test]
    fn test_wire_to_relative_rejects_escapes() {
        assert!(wire_to_relative(b"").is_err());
        assert!(wire_to_relative(b"/etc/passwd").is_err());
        assert!(wire_to_relative(b"../etc/passwd").is_err());
        assert!(wire_to_relative(b"a/../../b").is_err());
        assert!(wire_to_relative(b"a/\0b").is_err());
        assert!(wire_to_relative(b"./.").is_err());
    }
}
