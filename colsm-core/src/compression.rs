//! Block compression framing
//!
//! A stored block is `payload | type:u8 | crc32:u32` where the checksum
//! (little-endian) covers the payload and the type byte. The payload is the
//! raw block or its LZ4 compression. After decompression the reader picks
//! the vertical reader when the trailer carries [`MAGIC`].

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::vblock::{BlockContents, VertBlock, MAGIC, TRAILER_SIZE};
use crate::{ColsmError, Result};

/// `type:u8` + `crc32:u32`
pub const FRAME_TRAILER_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionType {
    #[default]
    None = 0,
    Lz4 = 1,
}

impl TryFrom<u8> for CompressionType {
    type Error = ColsmError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionType::None),
            1 => Ok(CompressionType::Lz4),
            _ => Err(ColsmError::Compression(format!(
                "Unknown compression type: {}",
                value
            ))),
        }
    }
}

/// Compress `raw` and append the framing trailer.
pub fn compress_block(compression: CompressionType, raw: &[u8]) -> Bytes {
    let payload = match compression {
        CompressionType::None => None,
        CompressionType::Lz4 => Some(lz4_flex::compress_prepend_size(raw)),
    };
    let payload = payload.as_deref().unwrap_or(raw);

    let mut buf = BytesMut::with_capacity(payload.len() + FRAME_TRAILER_SIZE);
    buf.put_slice(payload);
    buf.put_u8(compression as u8);
    let checksum = crc32fast::hash(&buf);
    buf.put_u32_le(checksum);
    buf.freeze()
}

/// Verify the checksum of a framed block and inflate it.
pub fn decompress_block(framed: &[u8]) -> Result<BlockContents<'static>> {
    if framed.len() < FRAME_TRAILER_SIZE {
        return Err(ColsmError::truncated(
            "block frame",
            FRAME_TRAILER_SIZE,
            framed.len(),
        ));
    }
    let body_len = framed.len() - 4;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&framed[body_len..]);
    let expected = u32::from_le_bytes(raw);
    let actual = crc32fast::hash(&framed[..body_len]);
    if expected != actual {
        return Err(ColsmError::ChecksumMismatch { expected, actual });
    }

    let payload = &framed[..body_len - 1];
    let contents = match CompressionType::try_from(framed[body_len - 1])? {
        CompressionType::None => Bytes::copy_from_slice(payload),
        CompressionType::Lz4 => {
            let inflated = lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| ColsmError::Compression(e.to_string()))?;
            debug!(
                "Decompressed block: {} -> {} bytes",
                payload.len(),
                inflated.len()
            );
            Bytes::from(inflated)
        }
    };
    Ok(BlockContents::Owned(contents))
}

/// Whether `data` ends with the vertical block trailer.
pub fn is_vertical_block(data: &[u8]) -> bool {
    data.len() >= TRAILER_SIZE && data[data.len() - 4..] == MAGIC.to_ne_bytes()
}

/// Decompress a framed block and open it as a vertical block.
pub fn open_vertical_block(framed: &[u8]) -> Result<VertBlock<'static>> {
    let contents = decompress_block(framed)?;
    if !is_vertical_block(&contents) {
        return Err(ColsmError::InvalidFormat(
            "block does not carry the vertical trailer".into(),
        ));
    }
    VertBlock::new(contents)
}
