//! Bit-packed u64 columns (frame of reference)
//!
//! Values are stored as offsets from the column minimum, so a run of close
//! sequence numbers packs into a few bits each whatever their magnitude.
//!
//! ```text
//! min:u64 | width:u8 | packed groups (width * ceil(count / 8) bytes) | 32 zero bytes
//! ```
//!
//! Offsets use the same lowest-bit-first group layout as the u32 column,
//! with widths up to 64.

use bytes::BufMut;

use super::bitpack::{packed_size, BITPACK_PADDING, GROUP_SIZE};
use super::{read_u64, Decoder, Encoder};
use crate::{ColsmError, Result};

/// `min:u64` plus `width:u8`
const HEADER_SIZE: usize = 9;

/// Bits needed for `max`. Zero for zero.
#[inline]
pub fn bit_width64(max: u64) -> u8 {
    (64 - max.leading_zeros()) as u8
}

/// Pack `values` into a bitstream of `ceil(len * width / 8)` bytes.
pub fn pack64(values: &[u64], width: u8) -> Vec<u8> {
    let total_bits = values.len() * width as usize;
    let mut out = Vec::with_capacity(total_bits.div_ceil(8));
    if width == 0 {
        return out;
    }

    let mut acc = 0u128;
    let mut bits = 0u32;
    for &value in values {
        debug_assert!(width >= 64 || value >> width == 0);
        acc |= (value as u128) << bits;
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

/// Read value `index` out of a bitstream produced by [`pack64`]. Reads past
/// the end see zero bits.
#[inline]
pub fn extract64(packed: &[u8], width: u8, index: usize) -> u64 {
    if width == 0 {
        return 0;
    }
    let bit = index * width as usize;
    let byte = bit / 8;
    let shift = bit % 8;

    let mut raw = [0u8; 16];
    if byte < packed.len() {
        let end = (byte + 9).min(packed.len());
        raw[..end - byte].copy_from_slice(&packed[byte..end]);
    }
    let word = u128::from_le_bytes(raw);
    let mask = (1u128 << width) - 1;
    ((word >> shift) & mask) as u64
}

pub fn unpack8_u64(packed: &[u8], width: u8, group: usize) -> [u64; GROUP_SIZE] {
    let mut out = [0u64; GROUP_SIZE];
    let base = group * GROUP_SIZE;
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = extract64(packed, width, base + i);
    }
    out
}

#[derive(Debug)]
pub struct Bitpack64Encoder {
    values: Vec<u64>,
    min: u64,
    max: u64,
}

impl Bitpack64Encoder {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            min: u64::MAX,
            max: 0,
        }
    }

    /// Column minimum, 0 for an empty column
    pub fn base(&self) -> u64 {
        if self.values.is_empty() {
            0
        } else {
            self.min
        }
    }

    pub fn width(&self) -> u8 {
        if self.values.is_empty() {
            0
        } else {
            bit_width64(self.max - self.min)
        }
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }
}

impl Default for Bitpack64Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for Bitpack64Encoder {
    type Item = u64;

    fn open(&mut self) {
        self.values.clear();
        self.min = u64::MAX;
        self.max = 0;
    }

    fn encode(&mut self, value: &u64) {
        self.min = self.min.min(*value);
        self.max = self.max.max(*value);
        self.values.push(*value);
    }

    fn close(&mut self) {}

    fn estimate_size(&self) -> u32 {
        (HEADER_SIZE + packed_size(self.values.len(), self.width()) + BITPACK_PADDING) as u32
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        let base = self.base();
        let width = self.width();
        let offsets: Vec<u64> = self.values.iter().map(|v| v - base).collect();
        let mut packed = pack64(&offsets, width);
        packed.resize(packed_size(offsets.len(), width) + BITPACK_PADDING, 0);
        dest.put_slice(&base.to_ne_bytes());
        dest.put_u8(width);
        dest.put_slice(&packed);
    }
}

#[derive(Debug, Clone)]
pub struct Bitpack64Decoder<'a> {
    base: u64,
    width: u8,
    packed: &'a [u8],
    index: usize,
    group: Option<usize>,
    cache: [u64; GROUP_SIZE],
}

impl<'a> Bitpack64Decoder<'a> {
    pub fn attach(data: &'a [u8]) -> Result<Self> {
        let base = read_u64(data, 0, "bitpack64 base")?;
        let width = *data
            .get(8)
            .ok_or_else(|| ColsmError::truncated("bitpack64 width", HEADER_SIZE, data.len()))?;
        if width > 64 {
            return Err(ColsmError::Corruption(format!(
                "bitpack64 width {} exceeds 64",
                width
            )));
        }
        Ok(Self {
            base,
            width,
            packed: &data[HEADER_SIZE..],
            index: 0,
            group: None,
            cache: [0; GROUP_SIZE],
        })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn width(&self) -> u8 {
        self.width
    }
}

impl<'a> Decoder<'a> for Bitpack64Decoder<'a> {
    type Item = u64;

    fn skip(&mut self, n: u32) -> Result<()> {
        self.index += n as usize;
        Ok(())
    }

    fn decode(&mut self) -> Result<u64> {
        let needed = ((self.index + 1) * self.width as usize).div_ceil(8);
        if needed > self.packed.len() {
            return Err(ColsmError::truncated("bitpack64 value", needed, self.packed.len()));
        }
        let group = self.index / GROUP_SIZE;
        if self.group != Some(group) {
            self.cache = unpack8_u64(self.packed, self.width, group);
            self.group = Some(group);
        }
        let offset = self.cache[self.index % GROUP_SIZE];
        self.index += 1;
        Ok(self.base.wrapping_add(offset))
    }
}
