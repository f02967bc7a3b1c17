//! Primitive frame encoding.
//!
//! Writers build pre-encoded `Bytes` buffers for the send pump; readers pull
//! straight off the stream. Frames are positional: nothing on the wire says
//! which frame comes next.

use crate::error::{Result, TransferError};
use crate::streaming::protocol::MAX_PATH_LEN;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Encoded size of a bool frame.
pub const BOOL_LEN: usize = 1;
/// Encoded size of an int frame.
pub const INT_LEN: usize = 8;
/// Chunk header: declared length + isLast.
pub const CHUNK_HEADER_LEN: usize = INT_LEN + BOOL_LEN;

// =============================================================================
// Encoding
// =============================================================================

pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

pub fn put_int(buf: &mut BytesMut, value: i64) {
    buf.put_i64(value);
}

pub fn put_path(buf: &mut BytesMut, path: &[u8]) {
    buf.put_i64(path.len() as i64);
    buf.put_slice(path);
}

pub fn encode_bool(value: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(BOOL_LEN);
    put_bool(&mut buf, value);
    buf.freeze()
}

pub fn encode_int(value: i64) -> Bytes {
    let mut buf = BytesMut::with_capacity(INT_LEN);
    put_int(&mut buf, value);
    buf.freeze()
}

pub fn encode_path(path: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(INT_LEN + path.len());
    put_path(&mut buf, path);
    buf.freeze()
}

/// One chunk frame: length, isLast, then the payload.
pub fn encode_chunk(payload: &[u8], is_last: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + payload.len());
    put_int(&mut buf, payload.len() as i64);
    put_bool(&mut buf, is_last);
    buf.put_slice(payload);
    buf.freeze()
}

// =============================================================================
// Decoding
// =============================================================================

pub async fn read_bool<R: AsyncRead + Unpin>(r: &mut R) -> Result<bool> {
    let byte = r
        .read_u8()
        .await
        .map_err(|e| TransferError::from_read(e, "bool frame", BOOL_LEN as u64))?;
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(TransferError::protocol(format!(
            "bool frame holds {:#04x}, expected 0 or 1",
            other
        ))),
    }
}

pub async fn read_int<R: AsyncRead + Unpin>(r: &mut R) -> Result<i64> {
    r.read_i64()
        .await
        .map_err(|e| TransferError::from_read(e, "int frame", INT_LEN as u64))
}

/// Read a declared length and check it against `0..=max`.
pub async fn read_len<R: AsyncRead + Unpin>(
    r: &mut R,
    max: usize,
    what: &'static str,
) -> Result<usize> {
    let len = read_int(r).await?;
    if len < 0 || len as u64 > max as u64 {
        return Err(TransferError::protocol(format!(
            "{} length {} outside 0..={}",
            what, len, max
        )));
    }
    Ok(len as usize)
}

/// Read a path frame, blocking until all declared bytes arrive.
pub async fn read_path<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_len(r, MAX_PATH_LEN, "path frame").await?;
    let mut path = vec![0u8; len];
    r.read_exact(&mut path)
        .await
        .map_err(|e| TransferError::from_read(e, "path frame", len as u64))?;
    Ok(path)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_encoding() {
        assert_eq!(&encode_bool(false)[..], &[0]);
        assert_eq!(&encode_bool(true)[..], &[1]);
    }

    #[test]
    fn test_int_is_big_endian() {
        assert_eq!(&encode_int(20000)[..], &[0, 0, 0, 0, 0, 0, 0x4E, 0x20]);
        assert_eq!(&encode_int(-1)[..], &[0xFF; 8]);
    }

    #[test]
    fn test_path_encoding() {
        let encoded = encode_path(b"a/b.txt");
        assert_eq!(&encoded[..8], &7i64.to_be_bytes());
        assert_eq!(&encoded[8..], b"a/b.txt");
    }

    #[test]
    fn test_chunk_encoding() {
        let encoded = encode_chunk(b"xyz", true);
        assert_eq!(encoded.len(), CHUNK_HEADER_LEN + 3);
        assert_eq!(&encoded[..8], &3i64.to_be_bytes());
        assert_eq!(encoded[8], 1);
        assert_eq!(&encoded[9..], b"xyz");
    }

    #[tokio::test]
    async fn test_read_sequence() {
        let mut wire = BytesMut::new();
        put_bool(&mut wire, true);
        put_int(&mut wire, 16384);
        put_path(&mut wire, b"/srv/data");
        put_bool(&mut wire, false);
        let wire = wire.freeze();

        let mut r = &wire[..];
        assert!(read_bool(&mut r).await.unwrap());
        assert_eq!(read_int(&mut r).await.unwrap(), 16384);
        assert_eq!(read_path(&mut r).await.unwrap(), b"/srv/data".to_vec());
        assert!(!read_bool(&mut r).await.unwrap());
        assert!(r.is_empty());
    }

    #[tokio::test]
    async fn test_read_path_short_read() {
        let mut wire = BytesMut::new();
        put_int(&mut wire, 10);
        wire.put_slice(b"abc");
        let wire = wire.freeze();

        let mut r = &wire[..];
        let err = read_path(&mut r).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::ShortRead {
                what: "path frame",
                expected: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_read_int_on_closed_stream() {
        let mut r: &[u8] = &[0, 0, 1];
        let err = read_int(&mut r).await.unwrap_err();
        assert!(matches!(err, TransferError::ShortRead { .. }));
    }

    #[tokio::test]
    async fn test_bad_bool_is_protocol_violation() {
        let mut r: &[u8] = &[7];
        let err = read_bool(&mut r).await.unwrap_err();
        assert!(matches!(err, TransferError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_negative_and_oversized_lengths() {
        let neg = encode_int(-5);
        let mut r = &neg[..];
        assert!(matches!(
            read_path(&mut r).await.unwrap_err(),
            TransferError::ProtocolViolation(_)
        ));

        let huge = encode_int(MAX_PATH_LEN as i64 + 1);
        let mut r = &huge[..];
        assert!(matches!(
            read_path(&mut r).await.unwrap_err(),
            TransferError::ProtocolViolation(_)
        ));
    }
}
