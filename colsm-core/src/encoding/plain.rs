//! Plain encodings: raw fixed-width numbers and length-prefixed byte strings

use std::marker::PhantomData;

use bytes::BufMut;

use super::{read_u32, Decoder, Encoder};
use crate::{ColsmError, Result};

/// Scalar stored at a fixed native-endian width
pub trait FixedWidth: Copy + std::fmt::Debug {
    const WIDTH: usize;

    fn put<B: BufMut>(self, dest: &mut B);

    /// Read from the first `WIDTH` bytes of `src`. Caller guarantees the length.
    fn read(src: &[u8]) -> Self;
}

impl FixedWidth for u8 {
    const WIDTH: usize = 1;

    fn put<B: BufMut>(self, dest: &mut B) {
        dest.put_u8(self);
    }

    fn read(src: &[u8]) -> Self {
        src[0]
    }
}

impl FixedWidth for u32 {
    const WIDTH: usize = 4;

    fn put<B: BufMut>(self, dest: &mut B) {
        dest.put_slice(&self.to_ne_bytes());
    }

    fn read(src: &[u8]) -> Self {
        u32::from_ne_bytes([src[0], src[1], src[2], src[3]])
    }
}

impl FixedWidth for u64 {
    const WIDTH: usize = 8;

    fn put<B: BufMut>(self, dest: &mut B) {
        dest.put_slice(&self.to_ne_bytes());
    }

    fn read(src: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&src[..8]);
        u64::from_ne_bytes(raw)
    }
}

/// Concatenated fixed-width values
#[derive(Debug)]
pub struct PlainEncoder<T: FixedWidth> {
    buffer: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: FixedWidth> PlainEncoder<T> {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn count(&self) -> usize {
        self.buffer.len() / T::WIDTH
    }
}

impl<T: FixedWidth> Default for PlainEncoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FixedWidth> Encoder for PlainEncoder<T> {
    type Item = T;

    fn open(&mut self) {
        self.buffer.clear();
    }

    fn encode(&mut self, value: &T) {
        T::put(*value, &mut self.buffer);
    }

    fn close(&mut self) {}

    fn estimate_size(&self) -> u32 {
        self.buffer.len() as u32
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        dest.put_slice(&self.buffer);
    }
}

#[derive(Debug, Clone)]
pub struct PlainDecoder<'a, T: FixedWidth> {
    data: &'a [u8],
    pos: usize,
    _marker: PhantomData<T>,
}

impl<'a, T: FixedWidth> PlainDecoder<'a, T> {
    pub fn attach(data: &'a [u8]) -> Result<Self> {
        Ok(Self {
            data,
            pos: 0,
            _marker: PhantomData,
        })
    }

    /// Entries left under the cursor
    pub fn remaining(&self) -> usize {
        (self.data.len() - self.pos) / T::WIDTH
    }
}

impl<'a, T: FixedWidth> Decoder<'a> for PlainDecoder<'a, T> {
    type Item = T;

    fn skip(&mut self, n: u32) -> Result<()> {
        let target = self.pos + n as usize * T::WIDTH;
        if target > self.data.len() {
            return Err(ColsmError::truncated("plain skip", target, self.data.len()));
        }
        self.pos = target;
        Ok(())
    }

    fn decode(&mut self) -> Result<T> {
        let end = self.pos + T::WIDTH;
        let src = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| ColsmError::truncated("plain value", end, self.data.len()))?;
        self.pos = end;
        Ok(T::read(src))
    }
}

/// `<len:u32><bytes>` per entry
#[derive(Debug, Default)]
pub struct PlainBytesEncoder {
    buffer: Vec<u8>,
}

impl PlainBytesEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for PlainBytesEncoder {
    type Item = [u8];

    fn open(&mut self) {
        self.buffer.clear();
    }

    fn encode(&mut self, value: &[u8]) {
        self.buffer.put_slice(&(value.len() as u32).to_ne_bytes());
        self.buffer.put_slice(value);
    }

    fn close(&mut self) {}

    fn estimate_size(&self) -> u32 {
        self.buffer.len() as u32
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        dest.put_slice(&self.buffer);
    }
}

#[derive(Debug, Clone)]
pub struct PlainBytesDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PlainBytesDecoder<'a> {
    pub fn attach(data: &'a [u8]) -> Result<Self> {
        Ok(Self { data, pos: 0 })
    }

    fn entry_len(&self) -> Result<usize> {
        Ok(read_u32(self.data, self.pos, "plain bytes length")? as usize)
    }
}

impl<'a> Decoder<'a> for PlainBytesDecoder<'a> {
    type Item = &'a [u8];

    fn skip(&mut self, n: u32) -> Result<()> {
        for _ in 0..n {
            let next = self.pos + 4 + self.entry_len()?;
            if next > self.data.len() {
                return Err(ColsmError::truncated("plain bytes skip", next, self.data.len()));
            }
            self.pos = next;
        }
        Ok(())
    }

    fn decode(&mut self) -> Result<&'a [u8]> {
        let len = self.entry_len()?;
        let start = self.pos + 4;
        let data = self.data;
        let value = data
            .get(start..start + len)
            .ok_or_else(|| ColsmError::truncated("plain bytes value", start + len, data.len()))?;
        self.pos = start + len;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_plain_u32_skip() {
        let mut encoder = PlainEncoder::<u32>::new();
        encoder.open();
        for i in 0..1000u32 {
            encoder.encode(&i);
        }
        encoder.close();
        assert_eq!(encoder.estimate_size(), 4000);
        assert_eq!(encoder.count(), 1000);

        let mut buf = Vec::new();
        encoder.dump(&mut buf);

        let mut rng = rand::thread_rng();
        let mut decoder = PlainDecoder::<u32>::attach(&buf).unwrap();
        let mut expected = 0u32;
        while expected < 1000 {
            let step = rng.gen_range(0..10u32);
            if expected + step >= 1000 {
                break;
            }
            decoder.skip(step).unwrap();
            expected += step;
            assert_eq!(decoder.decode().unwrap(), expected);
            expected += 1;
        }
    }

    #[test]
    fn test_plain_u64_truncated() {
        let buf = 7u64.to_ne_bytes();
        let mut decoder = PlainDecoder::<u64>::attach(&buf).unwrap();
        assert_eq!(decoder.remaining(), 1);
        assert_eq!(decoder.decode().unwrap(), 7);
        assert!(decoder.decode().unwrap_err().is_corruption());
        assert!(decoder.skip(1).is_err());
    }

    #[test]
    fn test_plain_bytes() {
        let values: Vec<Vec<u8>> = (0..100u32)
            .map(|i| vec![i as u8; (i % 7) as usize])
            .collect();

        let mut encoder = PlainBytesEncoder::new();
        encoder.open();
        for v in &values {
            encoder.encode(v);
        }
        encoder.close();

        let expected: usize = values.iter().map(|v| 4 + v.len()).sum();
        assert_eq!(encoder.estimate_size() as usize, expected);

        let mut buf = Vec::new();
        encoder.dump(&mut buf);
        assert_eq!(buf.len(), expected);

        let mut decoder = PlainBytesDecoder::attach(&buf).unwrap();
        decoder.skip(10).unwrap();
        assert_eq!(decoder.decode().unwrap(), values[10].as_slice());
        decoder.skip(50).unwrap();
        assert_eq!(decoder.decode().unwrap(), values[61].as_slice());
    }

    #[test]
    fn test_plain_reopen_clears() {
        let mut encoder = PlainEncoder::<u8>::new();
        encoder.open();
        encoder.encode(&1);
        encoder.encode(&2);
        encoder.open();
        assert_eq!(encoder.estimate_size(), 0);
    }
}
