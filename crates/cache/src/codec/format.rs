//! On-disk envelope format
//!
//! An entry file is a bincode-encoded [`EnvelopeHeader`] immediately followed
//! by the stored payload bytes. The header is self-describing: it records the
//! serializer and compression that produced the payload, so a reader never
//! needs the writer's configuration.

use crate::config::{CompressionAlgorithm, SerializerKind};
use crate::errors::{CacheError, Result};
use bincode::Options;
use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Magic number for entry files: "FCHE"
pub const ENTRY_MAGIC: u32 = 0x4643_4845;

/// Current envelope format version
pub const FORMAT_VERSION: u16 = 1;

/// Upper bound on a header; keys and tags are short, so anything larger is garbage
const MAX_HEADER_BYTES: u64 = 1024 * 1024;

fn header_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_HEADER_BYTES)
}

/// Current wall-clock time in unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Metadata written in front of every payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    magic: u32,
    version: u16,
    /// CRC32C of the header encoded with this field set to 0
    header_crc: u32,
    /// Original key, so scans can find tag memberships and detect hash collisions
    pub key: String,
    pub serializer: SerializerKind,
    /// Algorithm applied to the payload, `None` when stored raw
    pub compression: Option<CompressionAlgorithm>,
    /// Unix milliseconds
    pub created_at: i64,
    /// Unix milliseconds; `None` never expires
    pub expires_at: Option<i64>,
    pub tags: Vec<String>,
    /// Serialized payload size before compression
    pub size: u64,
    /// Number of payload bytes following the header
    pub stored_len: u64,
    /// CRC32C of the stored payload bytes
    pub payload_crc: u32,
}

impl EnvelopeHeader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: &str,
        serializer: SerializerKind,
        compression: Option<CompressionAlgorithm>,
        created_at: i64,
        expires_at: Option<i64>,
        tags: Vec<String>,
        size: u64,
        stored: &[u8],
    ) -> Self {
        Self {
            magic: ENTRY_MAGIC,
            version: FORMAT_VERSION,
            header_crc: 0,
            key: key.to_string(),
            serializer,
            compression,
            created_at,
            expires_at,
            tags,
            size,
            stored_len: stored.len() as u64,
            payload_crc: crc32c(stored),
        }
    }

    /// Whether the entry has expired at `now` (unix ms)
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    pub fn is_compressed(&self) -> bool {
        self.compression.is_some()
    }

    fn calculate_crc(&self) -> Result<u32> {
        let mut temp = self.clone();
        temp.header_crc = 0;
        let bytes = header_options()
            .serialize(&temp)
            .map_err(|e| CacheError::corruption(&self.key, format!("header encoding failed: {e}")))?;
        Ok(crc32c(&bytes))
    }

    fn validate(&self) -> Result<()> {
        if self.magic != ENTRY_MAGIC {
            return Err(CacheError::corruption(
                &self.key,
                format!(
                    "Invalid magic number: expected {ENTRY_MAGIC:08x}, got {:08x}",
                    self.magic
                ),
            ));
        }

        if self.version > FORMAT_VERSION {
            return Err(CacheError::corruption(
                &self.key,
                format!("Unsupported envelope version: {}", self.version),
            ));
        }

        let expected_crc = self.calculate_crc()?;
        if self.header_crc != expected_crc {
            return Err(CacheError::corruption(
                &self.key,
                format!(
                    "Header CRC mismatch: expected {expected_crc:08x}, got {:08x}",
                    self.header_crc
                ),
            ));
        }

        Ok(())
    }

    /// Header bytes followed by the payload
    pub fn assemble(mut self, stored: &[u8]) -> Result<Vec<u8>> {
        self.header_crc = self.calculate_crc()?;
        let mut bytes = header_options().serialize(&self).map_err(|e| {
            CacheError::corruption(&self.key, format!("header encoding failed: {e}"))
        })?;
        bytes.extend_from_slice(stored);
        Ok(bytes)
    }

    /// Read and validate only the header from `reader`
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let header: EnvelopeHeader = header_options()
            .deserialize_from(reader)
            .map_err(|e| CacheError::corruption("", format!("unreadable header: {e}")))?;
        header.validate()?;
        Ok(header)
    }

    /// Split a whole entry file into its validated header and payload
    pub fn split(bytes: &[u8]) -> Result<(Self, &[u8])> {
        let mut rest = bytes;
        let header = Self::read_from(&mut rest)?;

        if rest.len() as u64 != header.stored_len {
            return Err(CacheError::corruption(
                &header.key,
                format!(
                    "payload is {} bytes, header declares {}",
                    rest.len(),
                    header.stored_len
                ),
            ));
        }

        let actual_crc = crc32c(rest);
        if actual_crc != header.payload_crc {
            return Err(CacheError::corruption(
                &header.key,
                format!(
                    "Payload CRC mismatch: expected {:08x}, got {actual_crc:08x}",
                    header.payload_crc
                ),
            ));
        }

        Ok((header, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(stored: &[u8]) -> EnvelopeHeader {
        EnvelopeHeader::new(
            "user.1",
            SerializerKind::Native,
            None,
            1_000,
            Some(2_000),
            vec!["users".to_string()],
            stored.len() as u64,
            stored,
        )
    }

    #[test]
    fn test_assemble_then_split() {
        let bytes = sample(b"payload").assemble(b"payload").unwrap();
        let (header, payload) = EnvelopeHeader::split(&bytes).unwrap();

        assert_eq!(header.key, "user.1");
        assert_eq!(header.tags, vec!["users".to_string()]);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_expiry_boundary() {
        let header = sample(b"x");
        assert!(!header.is_expired_at(1_999));
        assert!(header.is_expired_at(2_000));
    }

    #[test]
    fn test_truncated_payload_is_corruption() {
        let bytes = sample(b"payload").assemble(b"payload").unwrap();
        let err = EnvelopeHeader::split(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_flipped_payload_byte_is_corruption() {
        let mut bytes = sample(b"payload").assemble(b"payload").unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(EnvelopeHeader::split(&bytes).unwrap_err().is_corruption());
    }

    #[test]
    fn test_garbage_is_corruption() {
        assert!(EnvelopeHeader::split(b"").unwrap_err().is_corruption());
        assert!(EnvelopeHeader::split(b"not an envelope at all")
            .unwrap_err()
            .is_corruption());
    }

    #[test]
    fn test_header_only_read_ignores_payload() {
        let bytes = sample(b"payload").assemble(b"payload").unwrap();
        let header = EnvelopeHeader::read_from(&bytes[..]).unwrap();
        assert_eq!(header.stored_len, 7);
    }
}
