//! TCP transport.
//!
//! Any ordered, reliable byte stream works for the protocol; TCP is the one
//! this crate dials and listens on.

use crate::error::{Result, TransferError};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::debug;

/// Dial `addr` and return a connected stream with Nagle disabled.
pub async fn connect<A>(addr: A) -> Result<TcpStream>
where
    A: ToSocketAddrs,
{
    let stream = TcpStream::connect(addr)
        .await
        .map_err(TransferError::Connection)?;
    stream.set_nodelay(true).map_err(TransferError::Connection)?;
    if let Ok(peer) = stream.peer_addr() {
        debug!(%peer, "connected");
    }
    Ok(stream)
}

/// Bind a listener on `addr`.
pub async fn listen<A>(addr: A) -> Result<TcpListener>
where
    A: ToSocketAddrs,
{
    TcpListener::bind(addr)
        .await
        .map_err(TransferError::Connection)
}
