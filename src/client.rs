//! Client handle: a server address plus a buffer size.
//!
//! Each call dials a fresh connection and runs one transfer on it.

use crate::error::Result;
use crate::streaming::protocol::{validate_buf_size, TransferRequest, DEFAULT_BUF_SIZE};
use crate::streaming::session::execute;
use crate::streaming::stats::TransferStats;
use crate::transport;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TransferClient {
    server_address: String,
    buf_size: usize,
}

impl TransferClient {
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            buf_size: DEFAULT_BUF_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buf_size: usize) -> Result<Self> {
        validate_buf_size(buf_size)?;
        self.buf_size = buf_size;
        Ok(self)
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Push a local file or directory to `destination` on the server.
    ///
    /// Returns once every frame is written and the server has closed the
    /// connection. The server closes the same way when it fails to store the
    /// files, and nothing on the wire reports that, so `Ok` does not prove the
    /// files are on its disk.
    pub async fn send(
        &self,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Result<TransferStats> {
        let request = TransferRequest::send(source, destination)?.with_buffer_size(self.buf_size)?;
        self.run(&request).await
    }

    /// Pull `source` from the server into the local `destination`.
    ///
    /// Whether `source` is a file or a directory is guessed from its
    /// extension.
    pub async fn request(
        &self,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Result<TransferStats> {
        let request =
            TransferRequest::request(source, destination)?.with_buffer_size(self.buf_size)?;
        self.run(&request).await
    }

    async fn run(&self, request: &TransferRequest) -> Result<TransferStats> {
        let conn = transport::connect(self.server_address.as_str()).await?;
        execute(conn, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;

    #[test]
    fn test_client_defaults() {
        let client = TransferClient::new("127.0.0.1:7878");
        assert_eq!(client.server_address(), "127.0.0.1:7878");
        assert_eq!(client.buf_size(), DEFAULT_BUF_SIZE);
    }

    #[test]
    fn test_client_rejects_zero_buffer() {
        let err = TransferClient::new("127.0.0.1:7878")
            .with_buffer_size(0)
            .unwrap_err();
        assert!(matches!(err, TransferError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_fails_before_dialing() {
        // Nothing listens on port 9; a dial would fail with a connection error.
        let client = TransferClient::new("127.0.0.1:9");
        let err = client.request("/srv/set", "/tmp/out.txt").await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidRequest(_)));
    }
}
