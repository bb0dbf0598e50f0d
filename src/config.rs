// Configuration schema for the rfgate receiver.
// Numan Thabit 2025

use std::{
    env, fs,
    io::{self, Read},
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    crypto::key::{KeyError, SecretKey},
    io::OutputMode,
    replay::DEFAULT_MAX_SOURCES,
};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "RFGATE_CONFIG";

/// Environment variable overriding the configured secret (hex).
pub const SECRET_ENV: &str = "RFGATE_SECRET_HEX";

/// Default UDP port for the demodulator bridge.
pub const DEFAULT_PORT: u16 = 7355;

/// Error returned while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Error when reading a configuration file from disk.
    #[error("failed to read config '{path}': {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
    /// Error when parsing the configuration contents.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration did not pass validation checks.
    #[error("invalid config: {0}")]
    Validation(String),
    /// The secret could not be loaded.
    #[error("secret: {0}")]
    Key(#[from] KeyError),
}

/// Top-level configuration loaded at startup.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Where the pre-shared secret comes from.
    pub key: KeySettings,
    /// Replay store sizing.
    pub replay: ReplaySettings,
    /// Inbound frame source.
    pub input: InputSettings,
    /// Host stream target.
    pub output: OutputSettings,
}

impl Config {
    /// Loads configuration from `RFGATE_CONFIG` if set, otherwise returns defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_path(path),
            Err(_missing) => {
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    /// Loads a configuration file from the provided path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads configuration from any reader implementing [`Read`].
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, ConfigError> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(|source| ConfigError::Io {
                path: PathBuf::from("<reader>"),
                source,
            })?;
        Self::from_toml_str(&buf)
    }

    /// Loads configuration from a TOML string slice.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        <Self as FromStr>::from_str(input)
    }

    /// Validates the configuration, returning an error when constraints are violated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.key.validate().map_err(ConfigError::Validation)?;
        self.replay.validate().map_err(ConfigError::Validation)?;
        self.output.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }

    /// Resolves the secret, preferring `RFGATE_SECRET_HEX` over the file.
    pub fn secret(&self) -> Result<SecretKey, ConfigError> {
        match env::var(SECRET_ENV) {
            Ok(hex) => Ok(SecretKey::from_hex(&hex)?),
            Err(_missing) => self.key.resolve(),
        }
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Secret sources; at most one may be set.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct KeySettings {
    /// Secret given as text; its UTF-8 bytes are the key.
    pub secret: Option<String>,
    /// Secret given as hex.
    pub secret_hex: Option<String>,
    /// File holding the secret as hex.
    pub secret_file: Option<PathBuf>,
}

impl KeySettings {
    fn validate(&self) -> Result<(), String> {
        let configured = [
            self.secret.is_some(),
            self.secret_hex.is_some(),
            self.secret_file.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if configured > 1 {
            return Err("set only one of key.secret, key.secret_hex, key.secret_file".into());
        }
        Ok(())
    }

    /// Loads the configured secret.
    pub fn resolve(&self) -> Result<SecretKey, ConfigError> {
        if let Some(text) = &self.secret {
            return Ok(SecretKey::from_slice(text.as_bytes())?);
        }
        if let Some(hex) = &self.secret_hex {
            return Ok(SecretKey::from_hex(hex)?);
        }
        if let Some(path) = &self.secret_file {
            return Ok(SecretKey::from_hex_file(path)?);
        }
        Err(ConfigError::Validation(format!(
            "no secret configured; set key.secret_hex, key.secret_file or {SECRET_ENV}"
        )))
    }
}

/// Replay store sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// Maximum number of distinct sources tracked.
    pub max_sources: usize,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            max_sources: DEFAULT_MAX_SOURCES,
        }
    }
}

impl ReplaySettings {
    fn validate(&self) -> Result<(), String> {
        if self.max_sources == 0 {
            return Err("replay.max_sources must be > 0".into());
        }
        Ok(())
    }
}

/// Inbound source selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// One frame per UDP datagram.
    #[default]
    Udp,
    /// Back-to-back fixed-size frames on stdin.
    Stdin,
}

/// Inbound source configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    pub kind: InputKind,
    /// Bind address used when `kind = "udp"`.
    pub bind: SocketAddr,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            kind: InputKind::Udp,
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        }
    }
}

/// Host stream target selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Stdout,
    /// A file or character device such as a serial port.
    File,
}

/// Host stream configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OutputSettings {
    pub kind: OutputKind,
    /// Target path when `kind = "file"`.
    pub path: Option<PathBuf>,
    pub mode: OutputMode,
}

impl OutputSettings {
    fn validate(&self) -> Result<(), String> {
        if self.kind == OutputKind::File && self.path.is_none() {
            return Err("output.path is required when output.kind = \"file\"".into());
        }
        Ok(())
    }
}
