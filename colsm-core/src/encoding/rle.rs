//! Run-length encodings for u8 columns
//!
//! [`RleEncoder`] writes one native-endian u32 word per run with the value in
//! the low byte and the run length in the upper 24 bits. Runs longer than
//! [`MAX_RUN`] are split. [`VarintRleEncoder`] writes `value:u8` followed by
//! a varint run length, which is smaller when runs are short.

use bytes::BufMut;

use super::varint::{put_varint32, read_varint32, varint_len};
use super::{read_u32, Decoder, Encoder};
use crate::{ColsmError, Result};

/// Longest run a single packed word can hold
pub const MAX_RUN: u32 = (1 << 24) - 1;

/// Largest encoding of one open run of a [`VarintRleEncoder`]: the value
/// byte and a 5-byte varint32 count
const OPEN_VARINT_RUN: usize = 6;

#[derive(Debug, Default)]
pub struct RleEncoder {
    words: Vec<u32>,
    value: u8,
    run: u32,
}

impl RleEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn flush(&mut self) {
        if self.run > 0 {
            self.words.push((self.run << 8) | self.value as u32);
            self.run = 0;
        }
    }
}

impl Encoder for RleEncoder {
    type Item = u8;

    fn open(&mut self) {
        self.words.clear();
        self.run = 0;
    }

    fn encode(&mut self, value: &u8) {
        if self.run > 0 && self.value == *value && self.run < MAX_RUN {
            self.run += 1;
            return;
        }
        self.flush();
        self.value = *value;
        self.run = 1;
    }

    fn close(&mut self) {
        self.flush();
    }

    fn estimate_size(&self) -> u32 {
        let open = usize::from(self.run > 0);
        (4 * (self.words.len() + open)) as u32
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        for word in &self.words {
            dest.put_slice(&word.to_ne_bytes());
        }
        if self.run > 0 {
            dest.put_slice(&((self.run << 8) | self.value as u32).to_ne_bytes());
        }
    }
}

#[derive(Debug, Clone)]
pub struct RleDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    value: u8,
    remaining: u32,
}

impl<'a> RleDecoder<'a> {
    pub fn attach(data: &'a [u8]) -> Result<Self> {
        Ok(Self {
            data,
            pos: 0,
            value: 0,
            remaining: 0,
        })
    }

    fn load_run(&mut self) -> Result<()> {
        let word = read_u32(self.data, self.pos, "run-length word")?;
        self.pos += 4;
        self.value = word as u8;
        self.remaining = word >> 8;
        if self.remaining == 0 {
            return Err(ColsmError::Corruption("zero-length run".into()));
        }
        Ok(())
    }
}

impl<'a> Decoder<'a> for RleDecoder<'a> {
    type Item = u8;

    fn skip(&mut self, mut n: u32) -> Result<()> {
        while n > 0 {
            if self.remaining == 0 {
                self.load_run()?;
            }
            let take = n.min(self.remaining);
            self.remaining -= take;
            n -= take;
        }
        Ok(())
    }

    fn decode(&mut self) -> Result<u8> {
        if self.remaining == 0 {
            self.load_run()?;
        }
        self.remaining -= 1;
        Ok(self.value)
    }
}

#[derive(Debug, Default)]
pub struct VarintRleEncoder {
    buffer: Vec<u8>,
    value: u8,
    run: u32,
}

impl VarintRleEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact size including the open run.
    pub fn exact_size(&self) -> usize {
        let open = if self.run > 0 {
            1 + varint_len(self.run as u64)
        } else {
            0
        };
        self.buffer.len() + open
    }

    fn flush(&mut self) {
        if self.run > 0 {
            self.buffer.put_u8(self.value);
            put_varint32(&mut self.buffer, self.run);
            self.run = 0;
        }
    }
}

impl Encoder for VarintRleEncoder {
    type Item = u8;

    fn open(&mut self) {
        self.buffer.clear();
        self.run = 0;
    }

    fn encode(&mut self, value: &u8) {
        if self.run > 0 && self.value == *value && self.run < u32::MAX {
            self.run += 1;
            return;
        }
        self.flush();
        self.value = *value;
        self.run = 1;
    }

    fn close(&mut self) {
        self.flush();
    }

    fn estimate_size(&self) -> u32 {
        let open = if self.run > 0 { OPEN_VARINT_RUN } else { 0 };
        (self.buffer.len() + open) as u32
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        dest.put_slice(&self.buffer);
        if self.run > 0 {
            dest.put_u8(self.value);
            put_varint32(dest, self.run);
        }
    }
}

#[derive(Debug, Clone)]
pub struct VarintRleDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    value: u8,
    remaining: u32,
}

impl<'a> VarintRleDecoder<'a> {
    pub fn attach(data: &'a [u8]) -> Result<Self> {
        Ok(Self {
            data,
            pos: 0,
            value: 0,
            remaining: 0,
        })
    }

    fn load_run(&mut self) -> Result<()> {
        self.value = *self
            .data
            .get(self.pos)
            .ok_or_else(|| ColsmError::truncated("varint run value", self.pos + 1, self.data.len()))?;
        self.pos += 1;
        self.remaining = read_varint32(self.data, &mut self.pos)?;
        if self.remaining == 0 {
            return Err(ColsmError::Corruption("zero-length run".into()));
        }
        Ok(())
    }
}

impl<'a> Decoder<'a> for VarintRleDecoder<'a> {
    type Item = u8;

    fn skip(&mut self, mut n: u32) -> Result<()> {
        while n > 0 {
            if self.remaining == 0 {
                self.load_run()?;
            }
            let take = n.min(self.remaining);
            self.remaining -= take;
            n -= take;
        }
        Ok(())
    }

    fn decode(&mut self) -> Result<u8> {
        if self.remaining == 0 {
            self.load_run()?;
        }
        self.remaining -= 1;
        Ok(self.value)
    }
}
