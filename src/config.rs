//! Runtime configuration.
//!
//! Values come from built-in defaults, then an optional JSON file named by
//! `RAWHTTP_CONFIG`, then individual `RAWHTTP_*` environment variables.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::http::chunked::DEFAULT_CHUNK_SIZE;
use crate::http::request::{
    DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_LINE_BYTES, ReadLimits,
};

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroLimit { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the listener binds to.
    pub listen_addr: String,
    /// Cap on unconsumed bytes while waiting for a line terminator.
    pub max_line_bytes: usize,
    /// Cap on the whole request head.
    pub max_header_bytes: usize,
    /// Cap on a declared request `Content-Length`.
    pub max_body_bytes: usize,
    /// Largest chunk record written by the proxy route.
    pub chunk_size: usize,
    /// Base URL the `/httpbin/` route forwards to.
    pub upstream_base: String,
    /// Directory holding static assets such as `vim.mp4`.
    pub assets_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_owned(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            upstream_base: "https://httpbin.org".to_owned(),
            assets_dir: PathBuf::from("assets"),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed, or
    /// an environment variable holds an invalid value.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|var| std::env::var(var).ok())
    }

    /// Same as [`load`](Self::load) with a custom variable lookup.
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("RAWHTTP_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(addr) = lookup("RAWHTTP_LISTEN") {
            config.listen_addr = addr;
        }
        if let Some(v) = lookup("RAWHTTP_MAX_LINE_BYTES") {
            config.max_line_bytes = parse_size("RAWHTTP_MAX_LINE_BYTES", v)?;
        }
        if let Some(v) = lookup("RAWHTTP_MAX_HEADER_BYTES") {
            config.max_header_bytes = parse_size("RAWHTTP_MAX_HEADER_BYTES", v)?;
        }
        if let Some(v) = lookup("RAWHTTP_MAX_BODY_BYTES") {
            config.max_body_bytes = parse_size("RAWHTTP_MAX_BODY_BYTES", v)?;
        }
        if let Some(v) = lookup("RAWHTTP_CHUNK_SIZE") {
            config.chunk_size = parse_size("RAWHTTP_CHUNK_SIZE", v)?;
        }
        if let Some(base) = lookup("RAWHTTP_UPSTREAM") {
            config.upstream_base = base;
        }
        if let Some(dir) = lookup("RAWHTTP_ASSETS") {
            config.assets_dir = PathBuf::from(dir);
        }

        config.validate()
    }

    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    fn validate(self) -> Result<Self, ConfigError> {
        let sizes = [
            ("max_line_bytes", self.max_line_bytes),
            ("max_header_bytes", self.max_header_bytes),
            ("max_body_bytes", self.max_body_bytes),
            ("chunk_size", self.chunk_size),
        ];
        match sizes.iter().find(|(_, v)| *v == 0) {
            Some(&(field, _)) => Err(ConfigError::ZeroLimit { field }),
            None => Ok(self),
        }
    }

    /// Byte budgets for the request reader.
    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits {
            max_line_bytes: self.max_line_bytes,
            max_header_bytes: self.max_header_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

// Sizes must be positive; a zero budget would reject every request.
fn parse_size(var: &'static str, value: String) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidEnv { var, value }),
    }
}
