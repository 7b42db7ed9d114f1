//! Batch compression stages.
//!
//! Bedrock servers compress every batch with zlib. The lz4 and zstd stages are
//! alternatives for proxies and test harnesses that negotiate something else.
//! Every decompressor enforces an output limit before and while allocating.

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// Batches are sent as-is
    None,
    /// zlib, the Bedrock default
    #[default]
    Flate,
    Lz4,
    Zstd,
}

impl FromStr for CompressionKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionKind::None),
            "flate" | "zlib" => Ok(CompressionKind::Flate),
            "lz4" => Ok(CompressionKind::Lz4),
            "zstd" => Ok(CompressionKind::Zstd),
            other => Err(ProtocolError::ConfigError(format!(
                "Unknown compression: {other}"
            ))),
        }
    }
}

/// Compresses data using the specified compression algorithm
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], kind: &CompressionKind, level: i32) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::None => Ok(data.to_vec()),
        CompressionKind::Flate => {
            let level = flate2::Compression::new(level.clamp(0, 9) as u32);
            let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), level);
            encoder
                .write_all(data)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            encoder.finish().map_err(|_| ProtocolError::CompressionFailure)
        }
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Zstd => {
            let mut out = Vec::new();
            zstd::stream::copy_encode(data, &mut out, level)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            Ok(out)
        }
    }
}

/// Decompresses data that was compressed with the specified algorithm
///
/// Output larger than `limit` bytes is rejected (decompression bomb guard).
///
/// # Errors
/// Returns `ProtocolError::DecompressionFailure` if decompression fails or the
/// output exceeds `limit`
pub fn decompress(data: &[u8], kind: &CompressionKind, limit: usize) -> Result<Vec<u8>> {
    match *kind {
        CompressionKind::None => {
            if data.len() > limit {
                return Err(ProtocolError::OversizedPacket(data.len()));
            }
            Ok(data.to_vec())
        }
        CompressionKind::Flate => {
            read_bounded(flate2::read::ZlibDecoder::new(data), limit)
        }
        CompressionKind::Lz4 => {
            // lz4_flex prepends the uncompressed size as 4 bytes little-endian;
            // check it before lz4_flex allocates
            if data.len() < 4 {
                return Err(ProtocolError::DecompressionFailure);
            }
            let claimed_size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
            if claimed_size > limit {
                return Err(ProtocolError::DecompressionFailure);
            }

            let decompressed = lz4_flex::decompress_size_prepended(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;
            if decompressed.len() > limit {
                return Err(ProtocolError::DecompressionFailure);
            }
            Ok(decompressed)
        }
        CompressionKind::Zstd => {
            let reader = zstd::stream::Decoder::new(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;
            read_bounded(reader, limit)
        }
    }
}

/// Read a decompressing stream to the end, failing once more than `limit` bytes come out
fn read_bounded<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buffer[..n]);
                if out.len() > limit {
                    return Err(ProtocolError::DecompressionFailure);
                }
            }
            Err(_) => return Err(ProtocolError::DecompressionFailure),
        }
    }
    Ok(out)
}
