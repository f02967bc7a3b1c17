//! spool: file and directory transfer over a positional binary protocol.
//!
//! A client either pushes a local path to a server (SEND) or asks the server
//! to stream one of its paths back (REQUEST). See [`streaming`] for the wire
//! format and the pipeline behind it.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod streaming;
pub mod transport;

pub use client::TransferClient;
pub use error::{Result, TransferError};
pub use server::{Server, ServerConfig};
