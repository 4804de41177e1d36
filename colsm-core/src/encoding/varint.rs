//! LEB128 varints and zig-zag mapping used by the run-length codecs

use bytes::BufMut;

use crate::{ColsmError, Result};

/// Zig-zag map a signed delta onto the unsigned range.
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

#[inline]
pub fn put_varint32<B: BufMut>(dest: &mut B, value: u32) {
    put_varint64(dest, value as u64)
}

#[inline]
pub fn put_varint64<B: BufMut>(dest: &mut B, mut value: u64) {
    while value >= 0x80 {
        dest.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    dest.put_u8(value as u8);
}

/// Number of bytes `put_varint64` emits for `value`.
pub fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

/// Decode a varint at `*pos`, advancing `*pos` past it.
pub fn read_varint64(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| ColsmError::Corruption("varint truncated".into()))?;
        *pos += 1;
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(ColsmError::Corruption("varint overflow".into()));
        }
    }
}

pub fn read_varint32(data: &[u8], pos: &mut usize) -> Result<u32> {
    let value = read_varint64(data, pos)?;
    u32::try_from(value).map_err(|_| ColsmError::Corruption("varint32 overflow".into()))
}
