//! Offset-table encoding for variable-length byte strings
//!
//! ```text
//! table_bytes:u32 | offset[0..=count]:u32 | payload
//! ```
//!
//! `table_bytes` is `4 * (count + 1)`. Offsets are cumulative payload
//! positions starting at 0, so entry `i` spans `offset[i]..offset[i + 1]`
//! and skipping is a cursor bump.

use bytes::BufMut;

use super::{read_u32, Decoder, Encoder};
use crate::{ColsmError, Result};

#[derive(Debug)]
pub struct LengthEncoder {
    offsets: Vec<u32>,
    payload: Vec<u8>,
}

impl LengthEncoder {
    pub fn new() -> Self {
        Self {
            offsets: vec![0],
            payload: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.offsets.len() - 1
    }
}

impl Default for LengthEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for LengthEncoder {
    type Item = [u8];

    fn open(&mut self) {
        self.offsets.clear();
        self.offsets.push(0);
        self.payload.clear();
    }

    fn encode(&mut self, value: &[u8]) {
        self.payload.extend_from_slice(value);
        self.offsets.push(self.payload.len() as u32);
    }

    fn close(&mut self) {}

    fn estimate_size(&self) -> u32 {
        (4 + 4 * self.offsets.len() + self.payload.len()) as u32
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        dest.put_slice(&((4 * self.offsets.len()) as u32).to_ne_bytes());
        for offset in &self.offsets {
            dest.put_slice(&offset.to_ne_bytes());
        }
        dest.put_slice(&self.payload);
    }
}

#[derive(Debug, Clone)]
pub struct LengthDecoder<'a> {
    offsets: &'a [u8],
    payload: &'a [u8],
    count: usize,
    index: usize,
}

impl<'a> LengthDecoder<'a> {
    pub fn attach(data: &'a [u8]) -> Result<Self> {
        let table_bytes = read_u32(data, 0, "length table header")? as usize;
        if table_bytes < 4 || table_bytes % 4 != 0 {
            return Err(ColsmError::Corruption(format!(
                "length table size {} is not a positive multiple of 4",
                table_bytes
            )));
        }
        let offsets = data
            .get(4..4 + table_bytes)
            .ok_or_else(|| ColsmError::truncated("length table", 4 + table_bytes, data.len()))?;
        Ok(Self {
            offsets,
            payload: &data[4 + table_bytes..],
            count: table_bytes / 4 - 1,
            index: 0,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn offset(&self, i: usize) -> Result<usize> {
        Ok(read_u32(self.offsets, i * 4, "length offset")? as usize)
    }
}

impl<'a> Decoder<'a> for LengthDecoder<'a> {
    type Item = &'a [u8];

    fn skip(&mut self, n: u32) -> Result<()> {
        let target = self.index + n as usize;
        if target > self.count {
            return Err(ColsmError::Corruption(format!(
                "length skip to entry {} past {} entries",
                target, self.count
            )));
        }
        self.index = target;
        Ok(())
    }

    fn decode(&mut self) -> Result<&'a [u8]> {
        if self.index >= self.count {
            return Err(ColsmError::Corruption(format!(
                "length decode past {} entries",
                self.count
            )));
        }
        let start = self.offset(self.index)?;
        let end = self.offset(self.index + 1)?;
        let payload = self.payload;
        let value = payload.get(start..end).ok_or_else(|| {
            ColsmError::Corruption(format!(
                "length entry {}..{} outside {} payload bytes",
                start,
                end,
                payload.len()
            ))
        })?;
        self.index += 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn encode_all(values: &[Vec<u8>]) -> (LengthEncoder, Vec<u8>) {
        let mut encoder = LengthEncoder::new();
        encoder.open();
        for v in values {
            encoder.encode(v);
        }
        encoder.close();
        let mut buf = Vec::new();
        encoder.dump(&mut buf);
        (encoder, buf)
    }

    #[test]
    fn test_length_size() {
        let values: Vec<Vec<u8>> = (0..1000u32).map(|i| i.to_ne_bytes().to_vec()).collect();
        let (encoder, buf) = encode_all(&values);

        assert_eq!(encoder.count(), 1000);
        assert_eq!(encoder.estimate_size(), 4 + 4 * 1001 + 4000);
        assert_eq!(buf.len(), encoder.estimate_size() as usize);
        assert_eq!(u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]), 4 * 1001);
    }

    #[test]
    fn test_length_random_skip() {
        let values: Vec<Vec<u8>> = (0..500u32)
            .map(|i| format!("value-{}", i * 31).into_bytes())
            .collect();
        let (_, buf) = encode_all(&values);

        let mut rng = rand::thread_rng();
        let mut decoder = LengthDecoder::attach(&buf).unwrap();
        assert_eq!(decoder.count(), 500);

        let mut index = 0usize;
        loop {
            let step = rng.gen_range(0..8usize);
            if index + step >= values.len() {
                break;
            }
            decoder.skip(step as u32).unwrap();
            index += step;
            assert_eq!(decoder.decode().unwrap(), values[index].as_slice());
            index += 1;
        }
    }

    #[test]
    fn test_length_empty_and_bounds() {
        let (encoder, buf) = encode_all(&[]);
        assert_eq!(encoder.estimate_size(), 8);

        let mut decoder = LengthDecoder::attach(&buf).unwrap();
        assert_eq!(decoder.count(), 0);
        assert!(decoder.decode().unwrap_err().is_corruption());
        assert!(decoder.skip(1).is_err());

        assert!(LengthDecoder::attach(&[8, 0]).is_err());
    }

    #[test]
    fn test_length_empty_values() {
        let values = vec![vec![], b"x".to_vec(), vec![]];
        let (_, buf) = encode_all(&values);
        let mut decoder = LengthDecoder::attach(&buf).unwrap();
        assert!(decoder.decode().unwrap().is_empty());
        assert_eq!(decoder.decode().unwrap(), b"x");
        assert!(decoder.decode().unwrap().is_empty());
    }
}
