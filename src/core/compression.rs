//! Record payload compression and framing
//!
//! Every record written to a container is framed as
//!
//! ```text
//! [method: u8][crc32 of the uncompressed payload: u32 LE][data]
//! ```
//!
//! Payloads below the configured threshold, or that do not shrink below the
//! configured ratio, are stored uncompressed.

use crate::core::error::{CloudError, Result};
use serde::{Deserialize, Serialize};

/// Size of the frame header in bytes
pub const FRAME_HEADER_SIZE: usize = 5;

/// Upper bound on a decompressed record
const MAX_RECORD_SIZE: usize = 256 * 1024 * 1024;

/// Compression method for record payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CompressionMethod {
    None = 0,
    /// Fast, moderate ratio
    Lz4 = 1,
    /// Slower, better ratio
    Zstd = 2,
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionMethod::None),
            1 => Some(CompressionMethod::Lz4),
            2 => Some(CompressionMethod::Zstd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionConfig {
    pub method: CompressionMethod,

    /// Payloads shorter than this are never compressed
    pub threshold: usize,

    /// Compressed/original size ratio that must be beaten
    pub min_ratio: f32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        CompressionConfig::none()
    }
}

impl CompressionConfig {
    pub fn none() -> Self {
        CompressionConfig {
            method: CompressionMethod::None,
            threshold: usize::MAX,
            min_ratio: 0.0,
        }
    }

    pub fn lz4() -> Self {
        CompressionConfig {
            method: CompressionMethod::Lz4,
            threshold: 512,
            min_ratio: 0.9,
        }
    }

    pub fn zstd() -> Self {
        CompressionConfig {
            method: CompressionMethod::Zstd,
            threshold: 1024,
            min_ratio: 0.85,
        }
    }
}

pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionMethod::Zstd => zstd::bulk::compress(data, 3)
            .map_err(|e| CloudError::Compression(format!("Zstd compression failed: {}", e))),
    }
}

pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Lz4 => {
            if let Some(prefix) = data.get(..4) {
                let size = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
                if size as usize > MAX_RECORD_SIZE {
                    return Err(CloudError::Compression(format!(
                        "LZ4 record claims {} bytes",
                        size
                    )));
                }
            }
            lz4_flex::decompress_size_prepended(data)
                .map_err(|e| CloudError::Compression(format!("LZ4 decompression failed: {}", e)))
        }
        CompressionMethod::Zstd => zstd::bulk::decompress(data, MAX_RECORD_SIZE)
            .map_err(|e| CloudError::Compression(format!("Zstd decompression failed: {}", e))),
    }
}

/// Compress if it pays off, returning the bytes and the method actually used
///
/// Payloads above the decompression bound are always stored uncompressed,
/// so every frame written can be read back.
pub fn compress_if_beneficial(
    data: &[u8],
    config: &CompressionConfig,
) -> Result<(Vec<u8>, CompressionMethod)> {
    compress_within(data, config, MAX_RECORD_SIZE)
}

fn compress_within(
    data: &[u8],
    config: &CompressionConfig,
    limit: usize,
) -> Result<(Vec<u8>, CompressionMethod)> {
    if data.len() < config.threshold
        || data.len() > limit
        || config.method == CompressionMethod::None
    {
        return Ok((data.to_vec(), CompressionMethod::None));
    }

    let compressed = compress(data, config.method)?;
    let ratio = compressed.len() as f32 / data.len() as f32;
    if ratio < config.min_ratio {
        Ok((compressed, config.method))
    } else {
        Ok((data.to_vec(), CompressionMethod::None))
    }
}

/// Frame a record payload for the container
pub fn encode_frame(payload: &[u8], config: &CompressionConfig) -> Result<Vec<u8>> {
    let checksum = crc32fast::hash(payload);
    let (data, method) = compress_if_beneficial(payload, config)?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + data.len());
    frame.push(method as u8);
    frame.extend_from_slice(&checksum.to_le_bytes());
    frame.extend_from_slice(&data);
    Ok(frame)
}

/// Unframe a record read from the container
///
/// `record` names the record in error messages.
pub fn decode_frame(frame: &[u8], verify: bool, record: &str) -> Result<Vec<u8>> {
    if frame.len() < FRAME_HEADER_SIZE {
        return Err(CloudError::UnexpectedEof {
            needed: FRAME_HEADER_SIZE,
            available: frame.len(),
        });
    }

    let method = CompressionMethod::from_u8(frame[0])
        .ok_or(CloudError::UnknownCompression(frame[0]))?;
    let expected = u32::from_le_bytes([frame[1], frame[2], frame[3], frame[4]]);
    let payload = decompress(&frame[FRAME_HEADER_SIZE..], method)?;

    if verify && crc32fast::hash(&payload) != expected {
        return Err(CloudError::ChecksumMismatch(record.to_string()));
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_method_conversion() {
        assert_eq!(CompressionMethod::from_u8(0), Some(CompressionMethod::None));
        assert_eq!(CompressionMethod::from_u8(1), Some(CompressionMethod::Lz4));
        assert_eq!(CompressionMethod::from_u8(2), Some(CompressionMethod::Zstd));
        assert_eq!(CompressionMethod::from_u8(99), None);
    }

    #[test]
    fn test_lz4_and_zstd() {
        let data = b"record payload ".repeat(100);
        for method in [CompressionMethod::Lz4, CompressionMethod::Zstd] {
            let compressed = compress(&data, method).unwrap();
            assert!(compressed.len() < data.len());
            assert_eq!(decompress(&compressed, method).unwrap(), data);
        }
    }

    #[test]
    fn test_compress_if_beneficial() {
        let config = CompressionConfig::lz4();

        let (result, method) = compress_if_beneficial(b"tiny", &config).unwrap();
        assert_eq!(method, CompressionMethod::None);
        assert_eq!(result, b"tiny");

        let large = b"X".repeat(2000);
        let (result, method) = compress_if_beneficial(&large, &config).unwrap();
        assert_eq!(method, CompressionMethod::Lz4);
        assert!(result.len() < large.len());
    }

    #[test]
    fn test_oversized_payload_stays_uncompressed() {
        let payload = vec![0u8; 4096];
        for config in [CompressionConfig::lz4(), CompressionConfig::zstd()] {
            let (data, method) = compress_within(&payload, &config, 1024).unwrap();
            assert_eq!(method, CompressionMethod::None);
            assert_eq!(data, payload);

            let (data, method) = compress_within(&payload, &config, 4096).unwrap();
            assert_eq!(method, config.method);
            assert_eq!(decompress(&data, method).unwrap(), payload);
        }

        // an uncompressed frame has no size bound on the way back
        let frame = encode_frame(&payload, &CompressionConfig::none()).unwrap();
        assert_eq!(decode_frame(&frame, true, "r").unwrap(), payload);
    }

    #[test]
    fn test_lz4_size_claim_over_bound_rejected() {
        let mut data = compress(b"abc", CompressionMethod::Lz4).unwrap();
        data[..4].copy_from_slice(&(MAX_RECORD_SIZE as u32 + 1).to_le_bytes());
        assert!(matches!(
            decompress(&data, CompressionMethod::Lz4),
            Err(CloudError::Compression(_))
        ));
    }

    #[test]
    fn test_frame_roundtrip() {
        let payload = vec![7u8; 4096];
        for config in [
            CompressionConfig::none(),
            CompressionConfig::lz4(),
            CompressionConfig::zstd(),
        ] {
            let frame = encode_frame(&payload, &config).unwrap();
            assert_eq!(frame[0], config.method as u8);
            assert_eq!(decode_frame(&frame, true, "r").unwrap(), payload);
        }
    }

    #[test]
    fn test_frame_checksum_mismatch() {
        let mut frame = encode_frame(b"abcdef", &CompressionConfig::none()).unwrap();
        frame[FRAME_HEADER_SIZE] ^= 0xFF;

        assert!(matches!(
            decode_frame(&frame, true, "r1"),
            Err(CloudError::ChecksumMismatch(ref r)) if r == "r1"
        ));
        // verification off lets the corrupted payload through
        assert!(decode_frame(&frame, false, "r1").is_ok());
    }

    #[test]
    fn test_frame_unknown_method() {
        let mut frame = encode_frame(b"abc", &CompressionConfig::none()).unwrap();
        frame[0] = 9;
        assert!(matches!(
            decode_frame(&frame, true, "r"),
            Err(CloudError::UnknownCompression(9))
        ));
    }

    #[test]
    fn test_frame_too_short() {
        assert!(matches!(
            decode_frame(&[0, 1], true, "r"),
            Err(CloudError::UnexpectedEof { needed: 5, available: 2 })
        ));
    }
}
