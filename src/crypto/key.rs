// Numan Thabit 2025
// crypto/key.rs - pre-shared secret loading

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

/// Length of the pre-shared secret shared by all senders and the receiver.
pub const SECRET_LEN: usize = 32;

/// Errors returned while loading the pre-shared secret.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("secret must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("secret is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("failed to read secret file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Pre-shared symmetric secret used to key the packet tag.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; SECRET_LEN]);

impl SecretKey {
    pub const fn new(bytes: [u8; SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Builds a key from raw bytes, enforcing the fixed length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let array: [u8; SECRET_LEN] =
            bytes.try_into().map_err(|_| KeyError::InvalidLength {
                expected: SECRET_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Builds a key from a hex string; surrounding whitespace is ignored.
    pub fn from_hex(input: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(input.trim())?;
        Self::from_slice(&bytes)
    }

    /// Reads a hex-encoded key from a file.
    pub fn from_hex_file<P: AsRef<Path>>(path: P) -> Result<Self, KeyError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| KeyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_hex(&contents)
    }

    pub const fn as_bytes(&self) -> &[u8; SECRET_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}
