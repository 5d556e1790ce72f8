//! Entry codec: serialize, optionally compress, wrap in a self-describing envelope

pub mod compression;
pub mod format;
pub mod serializer;

use crate::config::{CacheConfig, CompressionConfig, SerializerKind};
use crate::errors::Result;
use crate::value::Value;

pub use format::{now_millis, EnvelopeHeader, ENTRY_MAGIC, FORMAT_VERSION};

/// A fully decoded entry
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntry {
    pub header: EnvelopeHeader,
    pub value: Value,
}

/// Encodes entries with the writer's configuration; decoding needs none
#[derive(Debug, Clone, Copy)]
pub struct EntryCodec {
    serializer: SerializerKind,
    compression: CompressionConfig,
}

impl EntryCodec {
    pub fn new(serializer: SerializerKind, compression: CompressionConfig) -> Self {
        Self {
            serializer,
            compression,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.serializer, config.compression)
    }

    /// Encode `value` into a complete entry file
    pub fn encode(
        &self,
        key: &str,
        value: &Value,
        created_at: i64,
        expires_at: Option<i64>,
        tags: Vec<String>,
    ) -> Result<Vec<u8>> {
        let serialized = serializer::serialize(self.serializer, key, value)?;
        let size = serialized.len() as u64;

        let (stored, algorithm) =
            if self.compression.enabled && serialized.len() > self.compression.min_size {
                let packed = compression::compress(
                    self.compression.algorithm,
                    self.compression.level,
                    key,
                    &serialized,
                )?;
                (packed, Some(self.compression.algorithm))
            } else {
                (serialized, None)
            };

        EnvelopeHeader::new(
            key,
            self.serializer,
            algorithm,
            created_at,
            expires_at,
            tags,
            size,
            &stored,
        )
        .assemble(&stored)
    }

    /// Decode a complete entry file
    pub fn decode(bytes: &[u8]) -> Result<DecodedEntry> {
        let (header, payload) = EnvelopeHeader::split(bytes)?;
        let value = Self::decode_value(&header, payload)?;
        Ok(DecodedEntry { header, value })
    }

    /// Decode the payload described by `header`
    pub fn decode_value(header: &EnvelopeHeader, payload: &[u8]) -> Result<Value> {
        match header.compression {
            Some(algorithm) => {
                let raw = compression::decompress(algorithm, &header.key, payload, header.size)?;
                serializer::deserialize(header.serializer, &header.key, &raw)
            }
            None => serializer::deserialize(header.serializer, &header.key, payload),
        }
    }

    /// Rewrite an entry with a changed header and the same payload
    pub fn reencode(header: EnvelopeHeader, payload: &[u8]) -> Result<Vec<u8>> {
        header.assemble(payload)
    }
}
