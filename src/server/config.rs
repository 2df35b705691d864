//! Server configuration
//!
//! Layers built-in defaults, an optional TOML file and `RAX_BROWSE_*`
//! environment variables. Command line arguments are applied on top by the
//! binary. Everything is fixed once the server starts.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StartupError;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "rax-browse";

const DEFAULT_DIRECTORY: &str = ".";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;
const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_REQUEST_LINE: usize = 8192;
const DEFAULT_MAX_HEADERS: usize = 100;
const DEFAULT_DIRECTORY_DOWNLOADABLE: bool = true;
const DEFAULT_ARCHIVE_BUFFER_SIZE: usize = 256 * 1024;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Directory exposed by the server
    pub directory: String,

    /// IP address or host name to bind
    pub host: String,

    /// Port to bind, 0 picks a free one
    pub port: u16,

    /// Chunk size used when streaming files
    pub buffer_size: usize,

    /// Idle time allowed while waiting for a request head
    pub connection_timeout_secs: u64,

    /// Longest accepted request line or header line, in bytes
    pub max_request_line: usize,

    /// Most header lines accepted per request
    pub max_headers: usize,

    /// Whether `?download` on a directory streams a `.tgz` of it
    pub directory_downloadable: bool,

    /// Chunk size handed from the archiver to the connection
    pub archive_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            directory: DEFAULT_DIRECTORY.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            max_request_line: DEFAULT_MAX_REQUEST_LINE,
            max_headers: DEFAULT_MAX_HEADERS,
            directory_downloadable: DEFAULT_DIRECTORY_DOWNLOADABLE,
            archive_buffer_size: DEFAULT_ARCHIVE_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from defaults, a config file and environment overrides.
    ///
    /// An explicitly given file must exist; the default `rax-browse.toml` is optional.
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match config_file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .set_default("directory", DEFAULT_DIRECTORY)?
            .set_default("host", DEFAULT_HOST)?
            .set_default("port", i64::from(DEFAULT_PORT))?
            .set_default("buffer_size", DEFAULT_BUFFER_SIZE as i64)?
            .set_default(
                "connection_timeout_secs",
                DEFAULT_CONNECTION_TIMEOUT_SECS as i64,
            )?
            .set_default("max_request_line", DEFAULT_MAX_REQUEST_LINE as i64)?
            .set_default("max_headers", DEFAULT_MAX_HEADERS as i64)?
            .set_default("directory_downloadable", DEFAULT_DIRECTORY_DOWNLOADABLE)?
            .set_default("archive_buffer_size", DEFAULT_ARCHIVE_BUFFER_SIZE as i64)?
            .add_source(file)
            .add_source(Environment::with_prefix("RAX_BROWSE").try_parsing(true))
            .build()?;

        settings.try_deserialize()
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.is_empty() {
            return Err(ConfigError::Message("directory cannot be empty".into()));
        }

        if self.buffer_size == 0 {
            return Err(ConfigError::Message(
                "buffer_size must be greater than 0".into(),
            ));
        }

        if self.connection_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "connection_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.max_request_line < 16 {
            return Err(ConfigError::Message(
                "max_request_line must be at least 16".into(),
            ));
        }

        if self.max_headers == 0 {
            return Err(ConfigError::Message(
                "max_headers must be greater than 0".into(),
            ));
        }

        if self.archive_buffer_size == 0 {
            return Err(ConfigError::Message(
                "archive_buffer_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve host and port into the address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr, StartupError> {
        let display = format!("{}:{}", self.host, self.port);
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(StartupError::InvalidAddress(display))
    }

    pub fn directory_path(&self) -> PathBuf {
        PathBuf::from(&self.directory)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:8080".parse().unwrap()
        );
        assert_eq!(config.connection_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let config = ServerConfig {
            buffer_size: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            directory: String::new(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            max_headers: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            archive_buffer_size: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(
            &path,
            "directory = \"/data\"\nhost = \"0.0.0.0\"\nport = 12345\nbuffer_size = 4096\n\
             directory_downloadable = false\n",
        )
        .unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.directory, "/data");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 12345);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.max_headers, DEFAULT_MAX_HEADERS);
        assert!(!config.directory_downloadable);
        assert_eq!(config.archive_buffer_size, DEFAULT_ARCHIVE_BUFFER_SIZE);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(ServerConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_invalid_host_is_rejected() {
        let config = ServerConfig {
            host: "not a host".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            config.socket_addr(),
            Err(StartupError::InvalidAddress(_))
        ));
    }
}
