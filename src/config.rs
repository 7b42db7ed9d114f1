//! # Configuration Management
//!
//! Centralized configuration for Bedrock client sessions.
//!
//! This module provides structured configuration for the dialer, the batch codec
//! and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment variable overrides via `from_env()`
//!
//! ## Notes
//! - `connection_timeout` is only applied by `Dialer::dial_timeout`; a plain dial
//!   waits for the server indefinitely
//! - `max_payload_size` bounds decompressed batch size (decompression bomb guard)

use crate::error::{ProtocolError, Result};
use crate::transport::Network;
use crate::utils::compression::CompressionKind;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Protocol version sent in the login packet
pub const PROTOCOL_VERSION: i32 = 361;

/// Game version matching `PROTOCOL_VERSION`, reported in client data
pub const GAME_VERSION: &str = "1.12.0";

/// First byte of every batch frame
pub const BATCH_HEADER: u8 = 0xFE;

/// Max allowed decompressed batch size (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Max number of packets accepted from a single batch
pub const MAX_BATCH_PACKETS: usize = 4096;

/// Chunk size used when offering resource packs (128 KB)
pub const RESOURCE_PACK_CHUNK_SIZE: u32 = 128 * 1024;

/// Largest resource pack the client agrees to download (256 MB)
pub const MAX_RESOURCE_PACK_SIZE: u64 = 256 * 1024 * 1024;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Transport/codec configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BEDROCK_CLIENT_ADDRESS") {
            config.client.address = addr;
        }

        if let Ok(network) = std::env::var("BEDROCK_CLIENT_NETWORK") {
            config.client.network = network;
        }

        if let Ok(timeout) = std::env::var("BEDROCK_CLIENT_CONNECTION_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connection_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(radius) = std::env::var("BEDROCK_CLIENT_CHUNK_RADIUS") {
            if let Ok(val) = radius.parse::<i32>() {
                config.client.chunk_radius = val;
            }
        }

        if let Ok(compression) = std::env::var("BEDROCK_CLIENT_COMPRESSION") {
            config.transport.compression = compression;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Target server address (e.g., "play.example.net:19132")
    pub address: String,

    /// Network to dial over: "raknet", "tcp", "tcp4", "tcp6" or "unix"
    pub network: String,

    /// Bound used by `Dialer::dial_timeout`
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Chunk radius requested once the server starts the game
    pub chunk_radius: i32,

    /// Language code reported in generated client data
    pub language_code: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:19132"),
            network: String::from("raknet"),
            connection_timeout: timeout::DEFAULT_TIMEOUT,
            chunk_radius: 16,
            language_code: String::from("en_UK"),
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Client address cannot be empty".to_string());
        }

        if self.network.parse::<Network>().is_err() {
            errors.push(format!(
                "Unknown network '{}' (expected raknet, tcp, tcp4, tcp6 or unix)",
                self.network
            ));
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        } else if self.connection_timeout.as_secs() > 300 {
            errors.push("Connection timeout too long (maximum: 300s)".to_string());
        }

        if self.chunk_radius < 1 {
            errors.push("Chunk radius must be at least 1".to_string());
        } else if self.chunk_radius > 96 {
            errors.push(format!(
                "Chunk radius too large: {} (maximum: 96)",
                self.chunk_radius
            ));
        }

        if self.language_code.is_empty() {
            errors.push("Language code cannot be empty".to_string());
        }

        errors
    }
}

/// Transport and batch codec configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Batch compression: "none", "flate", "lz4" or "zstd"
    pub compression: String,

    /// Compression level (when compression is enabled)
    pub compression_level: i32,

    /// Maximum decompressed batch size in bytes
    pub max_payload_size: usize,

    /// Maximum number of packets accepted from one batch
    pub max_batch_packets: usize,

    /// Chunk size used when offering resource packs
    pub resource_pack_chunk_size: u32,

    /// Largest resource pack accepted for download
    pub max_resource_pack_size: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            compression: String::from("flate"),
            compression_level: 6,
            max_payload_size: MAX_PAYLOAD_SIZE,
            max_batch_packets: MAX_BATCH_PACKETS,
            resource_pack_chunk_size: RESOURCE_PACK_CHUNK_SIZE,
            max_resource_pack_size: MAX_RESOURCE_PACK_SIZE,
        }
    }
}

impl TransportConfig {
    /// The parsed compression stage
    pub fn compression_kind(&self) -> Result<CompressionKind> {
        self.compression.parse()
    }

    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        match self.compression_kind() {
            Err(_) => errors.push(format!(
                "Unknown compression '{}' (expected none, flate, lz4 or zstd)",
                self.compression
            )),
            Ok(CompressionKind::Flate) if !(0..=9).contains(&self.compression_level) => {
                errors.push(format!(
                    "Invalid compression level: {} (valid range for flate: 0-9)",
                    self.compression_level
                ))
            }
            Ok(CompressionKind::Zstd) if !(1..=22).contains(&self.compression_level) => {
                errors.push(format!(
                    "Invalid compression level: {} (valid range for zstd: 1-22)",
                    self.compression_level
                ))
            }
            Ok(_) => {}
        }

        if self.max_payload_size < 1024 {
            errors.push("Max payload size too small (minimum: 1 KB)".to_string());
        } else if self.max_payload_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max payload size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_payload_size
            ));
        }

        if self.max_batch_packets == 0 {
            errors.push("Max batch packets must be greater than 0".to_string());
        }

        if self.resource_pack_chunk_size == 0 {
            errors.push("Resource pack chunk size must be greater than 0".to_string());
        } else if self.resource_pack_chunk_size as usize > self.max_payload_size {
            errors.push("Resource pack chunk size cannot exceed max payload size".to_string());
        }

        if self.max_resource_pack_size == 0 {
            errors.push("Max resource pack size must be greater than 0".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("bedrock-client"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!(
                            "Log file directory does not exist: {}",
                            parent.display()
                        ));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors
                .push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
