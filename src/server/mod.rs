//! Listener: accepts connections and serves one transfer on each.
//!
//! A persistent server spawns a task per connection and keeps accepting.
//! A one-shot server serves exactly one connection inline and returns.
//! Either way a failing connection is logged and closed; it never takes the
//! listener down.

use crate::error::{Result, TransferError};
use crate::streaming::session::{serve_connection, ServedTransfer};
use crate::transport;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Default listen address.
pub const DEFAULT_BIND: &str = "0.0.0.0:7878";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,

    /// Keep accepting after the first connection
    pub persistent: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            persistent: true,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    persistent: bool,
}

impl Server {
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = transport::listen(config.bind.as_str()).await?;
        Ok(Self {
            listener,
            persistent: config.persistent,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransferError::Connection)
    }

    /// Serve until the process ends (persistent) or one connection is done.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Serve until `shutdown` resolves. Transfers already running in their
    /// own tasks are left to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, persistent = self.persistent, "listening");
        }

        tokio::pin!(shutdown);

        if !self.persistent {
            return tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    Ok(())
                }
                res = self.serve_once() => res,
            };
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        tokio::spawn(handle_connection(stream, peer));
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                },
            }
        }
    }

    /// Accept one connection and serve it. Its error, if any, is returned.
    async fn serve_once(&self) -> Result<()> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransferError::Connection)?;
        debug!(%peer, "accepted connection");
        prepare(&stream);

        match serve_connection(stream).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(%peer, error = %e, "connection failed");
                Err(e)
            }
        }
    }
}

fn prepare(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "set_nodelay failed");
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr) -> Option<ServedTransfer> {
    prepare(&stream);
    match serve_connection(stream).await {
        Ok(served) => Some(served),
        Err(e) => {
            warn!(%peer, error = %e, "connection failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(persistent: bool) -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1:0".to_string(),
            persistent,
        }
    }

    #[test]
    fn test_default_config_is_persistent() {
        let config = ServerConfig::default();
        assert!(config.persistent);
        assert_eq!(config.bind, DEFAULT_BIND);
    }

    #[tokio::test]
    async fn test_shutdown_stops_persistent_server() {
        let server = Server::bind(&local(true)).await.unwrap();
        server.run_until(async {}).await.unwrap();
    }

    #[tokio::test]
    async fn test_one_shot_returns_connection_error() {
        let server = Server::bind(&local(false)).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.run());

        // Connect and hang up without sending a direction byte.
        drop(transport::connect(addr).await.unwrap());

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TransferError::ShortRead { .. }));
    }
}
