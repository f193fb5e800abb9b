//! # Server Configuration
//!
//! Optional TOML configuration file for the `server` subcommand.
//! Explicit CLI flags always win over file values.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! database = "tracis.db"
//! backend = "redb"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracis_core::TracisError;

/// Default bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum config file size (64 KB) accepted before parsing.
const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024;

/// Server settings loaded from a TOML file. Every field is optional;
/// missing values fall back to CLI defaults.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
    pub backend: Option<String>,
}

impl ServerConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, TracisError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| TracisError::Storage(format!("Cannot read config metadata: {}", e)))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(TracisError::Validation(format!(
                "config file exceeds {} bytes",
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| TracisError::Storage(format!("Cannot read config: {}", e)))?;
        toml::from_str(&raw)
            .map_err(|e| TracisError::Serialization(format!("Invalid config: {}", e)))
    }

    /// Resolve host and port: explicit flags beat file values beat defaults.
    #[must_use]
    pub fn resolve_addr(&self, host_flag: Option<String>, port_flag: Option<u16>) -> (String, u16) {
        let host = host_flag
            .or_else(|| self.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = port_flag.or(self.port).unwrap_or(DEFAULT_PORT);
        (host, port)
    }
}

// =============================================================================
// TESTS
// =============================================================================
