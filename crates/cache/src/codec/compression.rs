//! Payload compression

use crate::config::CompressionAlgorithm;
use crate::errors::{CacheError, RecoveryHint, Result, SerializationOp};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compress `data` at `level`
pub fn compress(algorithm: CompressionAlgorithm, level: i32, key: &str, data: &[u8]) -> Result<Vec<u8>> {
    let result = match algorithm {
        CompressionAlgorithm::Zstd => zstd::stream::encode_all(data, level),
        CompressionAlgorithm::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.clamp(0, 9) as u32));
            encoder.write_all(data).and_then(|()| encoder.finish())
        }
    };

    result.map_err(|e| CacheError::Serialization {
        key: key.to_string(),
        operation: SerializationOp::Compress,
        source: Box::new(e),
        recovery_hint: RecoveryHint::UpdateConfiguration,
    })
}

/// Decompress a stored payload, expecting `expected_size` bytes back
pub fn decompress(
    algorithm: CompressionAlgorithm,
    key: &str,
    data: &[u8],
    expected_size: u64,
) -> Result<Vec<u8>> {
    let result = match algorithm {
        CompressionAlgorithm::Zstd => zstd::stream::decode_all(data),
        CompressionAlgorithm::Gzip => {
            let mut out = Vec::with_capacity(expected_size.min(16 * 1024 * 1024) as usize);
            GzDecoder::new(data).read_to_end(&mut out).map(|_| out)
        }
    };

    let out = result.map_err(|e| CacheError::corruption(key, format!("{algorithm} payload: {e}")))?;
    if out.len() as u64 != expected_size {
        return Err(CacheError::corruption(
            key,
            format!(
                "decompressed to {} bytes, header declares {expected_size}",
                out.len()
            ),
        ));
    }
    Ok(out)
}
