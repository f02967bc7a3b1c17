use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spool")]
#[command(about = "Stream files and directory trees over TCP", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (default: <config dir>/spool/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept transfers
    Serve(ServeOpts),

    /// Push a local file or directory to the server
    Send(TransferOpts),

    /// Pull a file or directory from the server
    Request(TransferOpts),
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeOpts {
    /// Bind address (host:port)
    #[arg(long, env = "SPOOL_BIND")]
    pub bind: Option<String>,

    /// Serve a single connection, then exit
    #[arg(long)]
    pub once: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct TransferOpts {
    /// Source path (local for send, on the server for request)
    pub source: PathBuf,

    /// Destination root (on the server for send, local for request)
    pub destination: PathBuf,

    /// Server address (host:port)
    #[arg(long, env = "SPOOL_SERVER")]
    pub server: Option<String>,

    /// Chunk buffer size in bytes
    #[arg(long, env = "SPOOL_BUFFER_SIZE")]
    pub buffer_size: Option<usize>,
}

impl Cli {
    /// Default log filter for the `-v` count.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
