//! Pre-shared key handling and packet authentication.
//!
//! Every datagram carries a 16-byte keyed digest over the preceding bytes,
//! computed as HMAC-SHA256 truncated to 16 bytes. Both ends must be configured
//! with the same key; the key itself is never transmitted.

use std::{fs, path::Path};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Minimum pre-shared key length in bytes.
pub const MIN_PSK_LENGTH: usize = 16;

/// Length of the authentication tag appended to every packet.
pub const TAG_LENGTH: usize = 16;

/// Errors that can occur while loading a pre-shared key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PskError {
    /// The provided key is too short.
    #[error("Key length {0} is less than minimum required {MIN_PSK_LENGTH} bytes")]
    KeyTooShort(usize),

    /// Invalid hexadecimal string.
    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    /// Failed to read key from file.
    #[error("Failed to read key file: {0}")]
    FileReadError(String),
}

/// Pre-shared key for packet authentication.
///
/// Wraps the key bytes and provides tag computation and constant-time
/// verification.
#[derive(Clone)]
pub struct Psk(Vec<u8>);

impl Psk {
    /// Creates a new Psk from raw bytes.
    ///
    /// # Errors
    /// Returns `PskError::KeyTooShort` if the key is less than 16 bytes.
    pub fn new(key: Vec<u8>) -> Result<Self, PskError> {
        if key.len() < MIN_PSK_LENGTH {
            return Err(PskError::KeyTooShort(key.len()));
        }
        Ok(Self(key))
    }

    /// Creates a new Psk from a hexadecimal string.
    ///
    /// # Errors
    /// Returns `PskError::InvalidHex` if the string is not valid hex.
    /// Returns `PskError::KeyTooShort` if the decoded key is less than 16 bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self, PskError> {
        let key = hex::decode(hex_str).map_err(|e| PskError::InvalidHex(e.to_string()))?;
        Self::new(key)
    }

    /// Creates a new Psk by reading from a file.
    ///
    /// The file may contain the key hex-encoded or as raw bytes; hex is tried
    /// first, raw bytes are the fallback.
    ///
    /// # Errors
    /// Returns `PskError::FileReadError` if the file cannot be read.
    /// Returns `PskError::KeyTooShort` if the key is less than 16 bytes.
    pub fn from_file(path: &Path) -> Result<Self, PskError> {
        if let Ok(content) = fs::read_to_string(path) {
            if let Ok(key) = Self::from_hex(content.trim()) {
                return Ok(key);
            }
        }

        let raw_bytes = fs::read(path).map_err(|e| PskError::FileReadError(e.to_string()))?;

        Self::new(raw_bytes)
    }

    /// Computes the 16-byte authentication tag over `data`.
    #[must_use]
    pub fn tag(&self, data: &[u8]) -> [u8; TAG_LENGTH] {
        let mut mac = HmacSha256::new_from_slice(&self.0).expect("HMAC can take key of any size");
        mac.update(data);
        let full = mac.finalize().into_bytes();

        let mut truncated = [0u8; TAG_LENGTH];
        truncated.copy_from_slice(&full[..TAG_LENGTH]);
        truncated
    }

    /// Verifies a tag using constant-time comparison.
    #[must_use]
    pub fn verify(&self, data: &[u8], expected: &[u8]) -> bool {
        let computed = self.tag(data);
        // Constant-time comparison to prevent timing attacks on the key
        constant_time_compare(&computed, expected)
    }
}

/// Performs constant-time comparison of two byte slices.
///
/// Always compares all bytes; only the length check short-circuits.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
