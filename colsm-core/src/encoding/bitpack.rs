//! Bit-packed u32 columns
//!
//! Values are written as one little-endian bitstream, `width` bits each,
//! lowest bit first. Eight values take exactly `width` bytes, so group `g`
//! always starts at byte `g * width` and can be unpacked on its own.
//!
//! Column layout:
//!
//! ```text
//! width:u8 | packed groups (width * ceil(count / 8) bytes) | 32 zero bytes
//! ```
//!
//! The zero tail keeps a 256-bit load at the last group in bounds. Readers
//! here never rely on it; [`extract`] zero-fills past the end of its input.

use bytes::BufMut;

use super::{Decoder, Encoder};
use crate::{ColsmError, Result};

/// Values per independently decodable group
pub const GROUP_SIZE: usize = 8;

/// Zero bytes appended after the packed groups of a column
pub const BITPACK_PADDING: usize = 32;

/// Bits needed for `max`. Zero for zero.
#[inline]
pub fn bit_width(max: u32) -> u8 {
    (32 - max.leading_zeros()) as u8
}

/// Bytes taken by `count` values of `width` bits, rounded to whole groups.
#[inline]
pub fn packed_size(count: usize, width: u8) -> usize {
    width as usize * count.div_ceil(GROUP_SIZE)
}

/// Pack `values` into a bitstream of `ceil(len * width / 8)` bytes.
///
/// Every value must fit in `width` bits.
pub fn pack(values: &[u32], width: u8) -> Vec<u8> {
    let total_bits = values.len() * width as usize;
    let mut out = Vec::with_capacity(total_bits.div_ceil(8));
    if width == 0 {
        return out;
    }

    let mut acc = 0u64;
    let mut bits = 0u32;
    for &value in values {
        debug_assert!(width >= 32 || value >> width == 0);
        acc |= (value as u64) << bits;
        bits += width as u32;
        while bits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        out.push(acc as u8);
    }
    out
}

/// Read value `index` out of a bitstream produced by [`pack`].
///
/// Reads past the end of `packed` see zero bits.
#[inline]
pub fn extract(packed: &[u8], width: u8, index: usize) -> u32 {
    if width == 0 {
        return 0;
    }
    let bit = index * width as usize;
    let byte = bit / 8;
    let shift = bit % 8;

    let mut raw = [0u8; 8];
    if byte < packed.len() {
        let end = (byte + 5).min(packed.len());
        raw[..end - byte].copy_from_slice(&packed[byte..end]);
    }
    let word = u64::from_le_bytes(raw);
    let mask = (1u64 << width) - 1;
    ((word >> shift) & mask) as u32
}

/// Unpack the eight values of `group`.
///
/// Portable scalar path; a wide SIMD unpack would slot in behind the same
/// signature.
pub fn unpack8(packed: &[u8], width: u8, group: usize) -> [u32; GROUP_SIZE] {
    let mut out = [0u32; GROUP_SIZE];
    let base = group * GROUP_SIZE;
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = extract(packed, width, base + i);
    }
    out
}

/// Exact-match binary search over `count` strictly increasing packed values.
pub fn eq_packed(packed: &[u8], width: u8, count: usize, target: u32) -> Option<u32> {
    let (mut lo, mut hi) = (0usize, count);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let value = extract(packed, width, mid);
        if value == target {
            return Some(mid as u32);
        }
        if value < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    None
}

/// First index whose value is `>= target`, or `count` if there is none.
pub fn geq_packed(packed: &[u8], width: u8, count: usize, target: u32) -> u32 {
    let (mut lo, mut hi) = (0usize, count);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if extract(packed, width, mid) < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo as u32
}

/// Last index whose value is `<= target`. Returns 0 when every value is
/// larger or `count` is 0.
pub fn last_leq_packed(packed: &[u8], width: u8, count: usize, target: u32) -> u32 {
    let (mut lo, mut hi) = (0usize, count);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if extract(packed, width, mid) <= target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo.saturating_sub(1) as u32
}

#[derive(Debug, Default)]
pub struct BitpackEncoder {
    values: Vec<u32>,
    max: u32,
}

impl BitpackEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> u8 {
        bit_width(self.max)
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }
}

impl Encoder for BitpackEncoder {
    type Item = u32;

    fn open(&mut self) {
        self.values.clear();
        self.max = 0;
    }

    fn encode(&mut self, value: &u32) {
        self.max = self.max.max(*value);
        self.values.push(*value);
    }

    fn close(&mut self) {}

    fn estimate_size(&self) -> u32 {
        (1 + packed_size(self.values.len(), self.width()) + BITPACK_PADDING) as u32
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        let width = self.width();
        let mut packed = pack(&self.values, width);
        packed.resize(packed_size(self.values.len(), width) + BITPACK_PADDING, 0);
        dest.put_u8(width);
        dest.put_slice(&packed);
    }
}

/// Cursor over a bit-packed column. Unpacks one group at a time.
#[derive(Debug, Clone)]
pub struct BitpackDecoder<'a> {
    width: u8,
    packed: &'a [u8],
    index: usize,
    group: Option<usize>,
    cache: [u32; GROUP_SIZE],
}

impl<'a> BitpackDecoder<'a> {
    pub fn attach(data: &'a [u8]) -> Result<Self> {
        let width = *data
            .first()
            .ok_or_else(|| ColsmError::truncated("bitpack width", 1, 0))?;
        if width > 32 {
            return Err(ColsmError::Corruption(format!(
                "bitpack width {} exceeds 32",
                width
            )));
        }
        Ok(Self {
            width,
            packed: &data[1..],
            index: 0,
            group: None,
            cache: [0; GROUP_SIZE],
        })
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    /// Packed groups, without the width byte
    pub fn packed(&self) -> &'a [u8] {
        self.packed
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let needed = ((index + 1) * self.width as usize).div_ceil(8);
        if needed > self.packed.len() {
            return Err(ColsmError::truncated("bitpack value", needed, self.packed.len()));
        }
        Ok(())
    }
}

impl<'a> Decoder<'a> for BitpackDecoder<'a> {
    type Item = u32;

    fn skip(&mut self, n: u32) -> Result<()> {
        self.index += n as usize;
        Ok(())
    }

    fn decode(&mut self) -> Result<u32> {
        self.check_index(self.index)?;
        let group = self.index / GROUP_SIZE;
        if self.group != Some(group) {
            self.cache = unpack8(self.packed, self.width, group);
            self.group = Some(group);
        }
        let value = self.cache[self.index % GROUP_SIZE];
        self.index += 1;
        Ok(value)
    }
}
