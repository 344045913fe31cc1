//! Configuration for binary API connections
//!
//! Centralized configuration with sensible defaults.

use crate::error::{BinapiError, Result};
use crate::protocol::{ParamValue, Params};

/// Default binary API host
pub const DEFAULT_SERVER: &str = "binapi.pcloud.com";

/// Default plain TCP port
pub const DEFAULT_PORT: u16 = 80;

/// Main configuration for a binary connection
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Endpoint Configuration
    // -------------------------------------------------------------------------
    /// Host name of the binary API server
    pub server: String,

    /// TCP port
    pub port: u16,

    /// Connect/read/write timeout (milliseconds, 0 disables)
    pub timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Codec Configuration
    // -------------------------------------------------------------------------
    /// Chunk size for raw payload transfers and channel buffering
    pub chunk_size: usize,

    /// Maximum map/list nesting accepted when decoding a response
    pub max_depth: usize,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Parameters merged into every outgoing command (e.g. `auth`).
    /// These override same-named command parameters.
    pub persistent_params: Params,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            timeout_ms: 30_000,
            chunk_size: 8192,
            max_depth: 1024,
            persistent_params: Params::new(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// `host:port` string for address resolution
    pub fn address(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    /// Check the settings that would make a connection unusable
    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            return Err(BinapiError::Config("server must not be empty".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(BinapiError::Config("chunk_size must be positive".to_string()));
        }
        if self.max_depth == 0 {
            return Err(BinapiError::Config("max_depth must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the server host name
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = server.into();
        self
    }

    /// Set the TCP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the socket timeout (in milliseconds)
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set the transfer chunk size (in bytes)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the maximum decoding depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    /// Add a persistent parameter
    pub fn persistent_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.config.persistent_params.set(key, value);
        self
    }

    /// Set the `auth` token persistent parameter
    pub fn auth(self, token: impl Into<String>) -> Self {
        let token: String = token.into();
        self.persistent_param("auth", token)
    }

    pub fn build(self) -> Config {
        self.config
    }
}
