//! Configuration file.
//!
//! File: `--config PATH`, else `<config dir>/spool/config.toml`. A missing
//! file means defaults; a file that exists but does not parse is an error.
//! Command-line flags and their environment variables override it.

use crate::server::DEFAULT_BIND;
use crate::streaming::protocol::DEFAULT_BUF_SIZE;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default address the client dials.
pub const DEFAULT_SERVER: &str = "127.0.0.1:7878";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Listen address (default 0.0.0.0:7878).
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Keep accepting after the first connection (default true).
    #[serde(default = "default_persistent")]
    pub persistent: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    /// Server to dial (default 127.0.0.1:7878).
    #[serde(default = "default_server")]
    pub server: String,
    /// Chunk buffer size in bytes (default 16384).
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_persistent() -> bool {
    true
}
fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}
fn default_buffer_size() -> usize {
    DEFAULT_BUF_SIZE
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            persistent: default_persistent(),
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server: default_server(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// `<config dir>/spool/config.toml`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("spool").join("config.toml"))
}

impl Config {
    /// Load from `path`, or from [`default_path`] when none is given.
    ///
    /// An explicit path must exist; the default one may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        if config.client.buffer_size == 0 {
            anyhow::bail!("client.buffer_size must be positive");
        }
        Ok(config)
    }
}
