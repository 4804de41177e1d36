//! Delta + run-length hybrid for u64 columns
//!
//! Each value is stored as the zig-zag mapped difference from its
//! predecessor (the first from 0). Repeated deltas collapse into one
//! `(delta:varint64, count:varint32)` pair, so a strictly monotonic
//! sequence number column with step 1 costs a few bytes per section.

use bytes::BufMut;

use super::varint::{
    put_varint32, put_varint64, read_varint32, read_varint64, zigzag_decode, zigzag_encode,
};
use super::{Decoder, Encoder};
use crate::{ColsmError, Result};

/// Largest encoding of one run: a 10-byte varint64 delta and a 5-byte
/// varint32 count
const OPEN_RUN_RESERVE: usize = 15;

#[derive(Debug, Default)]
pub struct DeltaEncoder {
    buffer: Vec<u8>,
    prev: u64,
    delta: u64,
    run: u32,
}

impl DeltaEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn flush(&mut self) {
        if self.run > 0 {
            put_varint64(&mut self.buffer, self.delta);
            put_varint32(&mut self.buffer, self.run);
            self.run = 0;
        }
    }
}

impl Encoder for DeltaEncoder {
    type Item = u64;

    fn open(&mut self) {
        self.buffer.clear();
        self.prev = 0;
        self.run = 0;
    }

    fn encode(&mut self, value: &u64) {
        let delta = zigzag_encode(value.wrapping_sub(self.prev) as i64);
        self.prev = *value;
        if self.run > 0 && self.delta == delta && self.run < u32::MAX {
            self.run += 1;
            return;
        }
        self.flush();
        self.delta = delta;
        self.run = 1;
    }

    fn close(&mut self) {
        self.flush();
    }

    fn estimate_size(&self) -> u32 {
        let open = if self.run > 0 { OPEN_RUN_RESERVE } else { 0 };
        (self.buffer.len() + open) as u32
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        dest.put_slice(&self.buffer);
        if self.run > 0 {
            put_varint64(dest, self.delta);
            put_varint32(dest, self.run);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeltaDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
    delta: u64,
    remaining: u32,
}

impl<'a> DeltaDecoder<'a> {
    pub fn attach(data: &'a [u8]) -> Result<Self> {
        Ok(Self {
            data,
            pos: 0,
            base: 0,
            delta: 0,
            remaining: 0,
        })
    }

    fn load_run(&mut self) -> Result<()> {
        self.delta = zigzag_decode(read_varint64(self.data, &mut self.pos)?) as u64;
        self.remaining = read_varint32(self.data, &mut self.pos)?;
        if self.remaining == 0 {
            return Err(ColsmError::Corruption("zero-length delta run".into()));
        }
        Ok(())
    }
}

impl<'a> Decoder<'a> for DeltaDecoder<'a> {
    type Item = u64;

    fn skip(&mut self, mut n: u32) -> Result<()> {
        while n > 0 {
            if self.remaining == 0 {
                self.load_run()?;
            }
            let take = n.min(self.remaining);
            self.base = self
                .base
                .wrapping_add(self.delta.wrapping_mul(take as u64));
            self.remaining -= take;
            n -= take;
        }
        Ok(())
    }

    fn decode(&mut self) -> Result<u64> {
        if self.remaining == 0 {
            self.load_run()?;
        }
        self.base = self.base.wrapping_add(self.delta);
        self.remaining -= 1;
        Ok(self.base)
    }
}
