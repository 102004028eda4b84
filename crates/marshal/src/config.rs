//! Codec configuration
//!
//! Version bytes and encoding choices are fixed when a [`Marshal`] codec is
//! built and never change afterwards.
//!
//! # Example
//!
//! ```rust
//! use marshal::CodecConfig;
//!
//! let config = CodecConfig::new()
//!     .with_depth_limit(64)
//!     .with_whole_float_suffix(false);
//! assert_eq!(config.depth_limit, 64);
//!
//! let from_file = CodecConfig::from_toml_str("minor_version = 9").unwrap();
//! assert_eq!(from_file.minor_version, 9);
//! assert_eq!(from_file.major_version, 4);
//! ```
//!
//! [`Marshal`]: crate::Marshal

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Major format version written and required by default
pub const MAJOR_VERSION: u8 = 4;

/// Minor format version written by default
pub const MINOR_VERSION: u8 = 8;

/// Default nesting limit applied while loading
///
/// Streams nested this deep load on a 2 MiB thread stack in debug builds.
pub const DEFAULT_LOAD_DEPTH_LIMIT: usize = 256;

/// Error loading a configuration file
#[derive(Debug)]
pub enum ConfigError {
    /// File could not be read
    Io(std::io::Error),
    /// File is not valid configuration TOML
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read codec config: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse codec config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Settings fixed at codec construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// Preamble major byte; a stream with any other major fails to load
    pub major_version: u8,

    /// Preamble minor byte; a newer stream minor loads with a warning
    pub minor_version: u8,

    /// Default Dump depth budget; negative means unlimited
    pub depth_limit: i32,

    /// Maximum nesting accepted while loading (`None` disables the check)
    pub load_depth_limit: Option<usize>,

    /// Write whole floats as `"3.0"` rather than `"3"`
    pub whole_float_suffix: bool,

    /// Write integers outside the 31-bit fixnum range as bignums
    pub wide_fixnums_as_bignums: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            major_version: MAJOR_VERSION,
            minor_version: MINOR_VERSION,
            depth_limit: -1,
            load_depth_limit: Some(DEFAULT_LOAD_DEPTH_LIMIT),
            whole_float_suffix: true,
            wide_fixnums_as_bignums: false,
        }
    }
}

impl CodecConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Speak a different format version
    pub fn with_version(mut self, major: u8, minor: u8) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    pub fn with_depth_limit(mut self, limit: i32) -> Self {
        self.depth_limit = limit;
        self
    }

    pub fn with_load_depth_limit(mut self, limit: Option<usize>) -> Self {
        self.load_depth_limit = limit;
        self
    }

    pub fn with_whole_float_suffix(mut self, suffix: bool) -> Self {
        self.whole_float_suffix = suffix;
        self
    }

    pub fn with_wide_fixnums_as_bignums(mut self, promote: bool) -> Self {
        self.wide_fixnums_as_bignums = promote;
        self
    }

    /// (major, minor) pair written in every preamble
    pub fn version(&self) -> (u8, u8) {
        (self.major_version, self.minor_version)
    }

    /// Parse configuration from a TOML string; missing keys keep defaults
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
