//! # Record Format
//!
//! Binary encoding for every value the redb store writes.
//!
//! Format: Header (5 bytes) + postcard payload.
//! - 4 bytes: Magic ("TNDR")
//! - 1 byte: Version
//!
//! The header is checked before the payload is touched, and records larger
//! than `MAX_RECORD_SIZE` are refused outright so a corrupted database cannot
//! drive an unbounded allocation.

use crate::primitives;
use crate::types::TenderflowError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Upper bound for one stored record.
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

const HEADER_LEN: usize = 5;

/// The header that precedes each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl RecordHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn current() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), TenderflowError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(TenderflowError::Serialization(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(TenderflowError::Serialization(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let [a, b, c, d] = self.magic;
        [a, b, c, d, self.version]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TenderflowError> {
        match bytes {
            [a, b, c, d, version, ..] => Ok(Self {
                magic: [*a, *b, *c, *d],
                version: *version,
            }),
            _ => Err(TenderflowError::Serialization(
                "Header too short".to_string(),
            )),
        }
    }
}

impl Default for RecordHeader {
    fn default() -> Self {
        Self::current()
    }
}

/// Encode a value as header + payload.
pub fn encode_record<T: Serialize>(value: &T) -> Result<Vec<u8>, TenderflowError> {
    let payload =
        postcard::to_stdvec(value).map_err(|e| TenderflowError::Serialization(e.to_string()))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(&RecordHeader::current().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a record written by [`encode_record`].
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TenderflowError> {
    if bytes.len() > MAX_RECORD_SIZE {
        return Err(TenderflowError::Serialization(format!(
            "Record size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_RECORD_SIZE
        )));
    }
    let header = RecordHeader::from_bytes(bytes)?;
    header.validate()?;

    let payload = bytes.get(HEADER_LEN..).unwrap_or_default();
    postcard::from_bytes(payload)
        .map_err(|e| TenderflowError::Serialization(format!("Failed to decode record: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
