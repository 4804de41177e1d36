//! Column encodings for the vertical block format
//!
//! Every column of a section is written by an [`Encoder`] and read back by a
//! [`Decoder`]. Decoders are cursors over a borrowed byte range and support
//! positional access through `skip`, which is how a seek lands on an
//! arbitrary entry without scanning the column from its start.
//!
//! The encoding of each column is recorded as a one byte [`Encoding`] tag in
//! the section header, so readers pick the matching decoder from the tag
//! alone. Per scalar type:
//!
//! | type  | encodings                                  |
//! |-------|--------------------------------------------|
//! | u8    | `Plain`, `RunLength`, `VarintRunLength`    |
//! | u32   | `Plain`, `Bitpack`                         |
//! | u64   | `Plain`, `Delta`, `Bitpack`                |
//! | bytes | `Plain`, `Length`                          |

mod bitpack;
mod bitpack64;
mod delta;
mod length;
mod plain;
mod rle;
mod varint;

pub use bitpack::{
    bit_width, eq_packed, extract, geq_packed, last_leq_packed, pack, packed_size, unpack8,
    BitpackDecoder, BitpackEncoder, BITPACK_PADDING, GROUP_SIZE,
};
pub use bitpack64::{
    bit_width64, extract64, pack64, unpack8_u64, Bitpack64Decoder, Bitpack64Encoder,
};
pub use delta::{DeltaDecoder, DeltaEncoder};
pub use length::{LengthDecoder, LengthEncoder};
pub use plain::{FixedWidth, PlainBytesDecoder, PlainBytesEncoder, PlainDecoder, PlainEncoder};
pub use rle::{RleDecoder, RleEncoder, VarintRleDecoder, VarintRleEncoder};
pub use varint::{
    put_varint32, put_varint64, read_varint32, read_varint64, varint_len, zigzag_decode,
    zigzag_encode,
};

use crate::{ColsmError, Result};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

/// Encoding tag stored next to every column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Encoding {
    /// Raw fixed-width values, or `<len:u32><bytes>` pairs for byte strings
    Plain = 0,
    /// Cumulative offset table followed by the concatenated payload
    Length = 1,
    /// Bit-packed integers in groups of eight; u64 columns store offsets
    /// from the column minimum
    Bitpack = 2,
    /// `(run_length << 8 | value)` words
    RunLength = 3,
    /// Zig-zag delta with run-length compressed repeats
    Delta = 4,
    /// `value:u8` followed by a varint run length
    VarintRunLength = 5,
}

impl Encoding {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Plain => "plain",
            Encoding::Length => "length",
            Encoding::Bitpack => "bitpack",
            Encoding::RunLength => "runlength",
            Encoding::Delta => "delta",
            Encoding::VarintRunLength => "varint-runlength",
        }
    }
}

impl TryFrom<u8> for Encoding {
    type Error = ColsmError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Encoding::Plain),
            1 => Ok(Encoding::Length),
            2 => Ok(Encoding::Bitpack),
            3 => Ok(Encoding::RunLength),
            4 => Ok(Encoding::Delta),
            5 => Ok(Encoding::VarintRunLength),
            _ => Err(ColsmError::InvalidFormat(format!(
                "Invalid encoding tag: {}",
                value
            ))),
        }
    }
}

/// Write side of a column codec.
///
/// Lifecycle: `open` → `encode`* → `close` → `dump`. After `close`,
/// `estimate_size` equals the number of bytes `dump` writes; the section
/// builder relies on this to lay out columns before writing them.
pub trait Encoder {
    type Item: ?Sized;

    /// Reset to an empty column.
    fn open(&mut self);

    fn encode(&mut self, value: &Self::Item);

    /// Flush any pending run. Idempotent.
    fn close(&mut self);

    fn estimate_size(&self) -> u32;

    fn dump<B: BufMut>(&self, dest: &mut B);
}

/// Read side of a column codec: a forward cursor over one encoded column.
pub trait Decoder<'a> {
    type Item;

    /// Move forward by `n` entries without materializing them.
    fn skip(&mut self, n: u32) -> Result<()>;

    /// Decode the entry under the cursor and advance past it.
    fn decode(&mut self) -> Result<Self::Item>;
}

fn unsupported(column: &str, encoding: Encoding) -> ColsmError {
    ColsmError::InvalidFormat(format!(
        "{} encoding is not available for {} columns",
        encoding.name(),
        column
    ))
}

pub(crate) fn read_u32(data: &[u8], pos: usize, what: &str) -> Result<u32> {
    let bytes = data
        .get(pos..pos + 4)
        .ok_or_else(|| ColsmError::truncated(what, pos + 4, data.len()))?;
    Ok(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn read_u64(data: &[u8], pos: usize, what: &str) -> Result<u64> {
    let bytes = data
        .get(pos..pos + 8)
        .ok_or_else(|| ColsmError::truncated(what, pos + 8, data.len()))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    Ok(u64::from_ne_bytes(raw))
}

// =============================================================================
// Per-type dispatch
// =============================================================================

/// Encoder for u8 columns (operation types)
#[derive(Debug)]
pub enum U8Encoder {
    Plain(PlainEncoder<u8>),
    RunLength(RleEncoder),
    VarintRunLength(VarintRleEncoder),
}

impl U8Encoder {
    pub fn new(encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::Plain => Ok(U8Encoder::Plain(PlainEncoder::new())),
            Encoding::RunLength => Ok(U8Encoder::RunLength(RleEncoder::new())),
            Encoding::VarintRunLength => Ok(U8Encoder::VarintRunLength(VarintRleEncoder::new())),
            other => Err(unsupported("u8", other)),
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            U8Encoder::Plain(_) => Encoding::Plain,
            U8Encoder::RunLength(_) => Encoding::RunLength,
            U8Encoder::VarintRunLength(_) => Encoding::VarintRunLength,
        }
    }
}

impl Encoder for U8Encoder {
    type Item = u8;

    fn open(&mut self) {
        match self {
            U8Encoder::Plain(e) => e.open(),
            U8Encoder::RunLength(e) => e.open(),
            U8Encoder::VarintRunLength(e) => e.open(),
        }
    }

    fn encode(&mut self, value: &u8) {
        match self {
            U8Encoder::Plain(e) => e.encode(value),
            U8Encoder::RunLength(e) => e.encode(value),
            U8Encoder::VarintRunLength(e) => e.encode(value),
        }
    }

    fn close(&mut self) {
        match self {
            U8Encoder::Plain(e) => e.close(),
            U8Encoder::RunLength(e) => e.close(),
            U8Encoder::VarintRunLength(e) => e.close(),
        }
    }

    fn estimate_size(&self) -> u32 {
        match self {
            U8Encoder::Plain(e) => e.estimate_size(),
            U8Encoder::RunLength(e) => e.estimate_size(),
            U8Encoder::VarintRunLength(e) => e.estimate_size(),
        }
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        match self {
            U8Encoder::Plain(e) => e.dump(dest),
            U8Encoder::RunLength(e) => e.dump(dest),
            U8Encoder::VarintRunLength(e) => e.dump(dest),
        }
    }
}

/// Decoder for u8 columns
#[derive(Debug, Clone)]
pub enum U8Decoder<'a> {
    Plain(PlainDecoder<'a, u8>),
    RunLength(RleDecoder<'a>),
    VarintRunLength(VarintRleDecoder<'a>),
}

impl<'a> U8Decoder<'a> {
    pub fn attach(encoding: Encoding, data: &'a [u8]) -> Result<Self> {
        match encoding {
            Encoding::Plain => Ok(U8Decoder::Plain(PlainDecoder::attach(data)?)),
            Encoding::RunLength => Ok(U8Decoder::RunLength(RleDecoder::attach(data)?)),
            Encoding::VarintRunLength => {
                Ok(U8Decoder::VarintRunLength(VarintRleDecoder::attach(data)?))
            }
            other => Err(unsupported("u8", other)),
        }
    }
}

impl<'a> Decoder<'a> for U8Decoder<'a> {
    type Item = u8;

    fn skip(&mut self, n: u32) -> Result<()> {
        match self {
            U8Decoder::Plain(d) => d.skip(n),
            U8Decoder::RunLength(d) => d.skip(n),
            U8Decoder::VarintRunLength(d) => d.skip(n),
        }
    }

    fn decode(&mut self) -> Result<u8> {
        match self {
            U8Decoder::Plain(d) => d.decode(),
            U8Decoder::RunLength(d) => d.decode(),
            U8Decoder::VarintRunLength(d) => d.decode(),
        }
    }
}

/// Encoder for u32 columns (user keys)
#[derive(Debug)]
pub enum U32Encoder {
    Plain(PlainEncoder<u32>),
    Bitpack(BitpackEncoder),
}

impl U32Encoder {
    pub fn new(encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::Plain => Ok(U32Encoder::Plain(PlainEncoder::new())),
            Encoding::Bitpack => Ok(U32Encoder::Bitpack(BitpackEncoder::new())),
            other => Err(unsupported("u32", other)),
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            U32Encoder::Plain(_) => Encoding::Plain,
            U32Encoder::Bitpack(_) => Encoding::Bitpack,
        }
    }
}

impl Encoder for U32Encoder {
    type Item = u32;

    fn open(&mut self) {
        match self {
            U32Encoder::Plain(e) => e.open(),
            U32Encoder::Bitpack(e) => e.open(),
        }
    }

    fn encode(&mut self, value: &u32) {
        match self {
            U32Encoder::Plain(e) => e.encode(value),
            U32Encoder::Bitpack(e) => e.encode(value),
        }
    }

    fn close(&mut self) {
        match self {
            U32Encoder::Plain(e) => e.close(),
            U32Encoder::Bitpack(e) => e.close(),
        }
    }

    fn estimate_size(&self) -> u32 {
        match self {
            U32Encoder::Plain(e) => e.estimate_size(),
            U32Encoder::Bitpack(e) => e.estimate_size(),
        }
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        match self {
            U32Encoder::Plain(e) => e.dump(dest),
            U32Encoder::Bitpack(e) => e.dump(dest),
        }
    }
}

/// Decoder for u32 columns
#[derive(Debug, Clone)]
pub enum U32Decoder<'a> {
    Plain(PlainDecoder<'a, u32>),
    Bitpack(BitpackDecoder<'a>),
}

impl<'a> U32Decoder<'a> {
    pub fn attach(encoding: Encoding, data: &'a [u8]) -> Result<Self> {
        match encoding {
            Encoding::Plain => Ok(U32Decoder::Plain(PlainDecoder::attach(data)?)),
            Encoding::Bitpack => Ok(U32Decoder::Bitpack(BitpackDecoder::attach(data)?)),
            other => Err(unsupported("u32", other)),
        }
    }
}

impl<'a> Decoder<'a> for U32Decoder<'a> {
    type Item = u32;

    fn skip(&mut self, n: u32) -> Result<()> {
        match self {
            U32Decoder::Plain(d) => d.skip(n),
            U32Decoder::Bitpack(d) => d.skip(n),
        }
    }

    fn decode(&mut self) -> Result<u32> {
        match self {
            U32Decoder::Plain(d) => d.decode(),
            U32Decoder::Bitpack(d) => d.decode(),
        }
    }
}

/// Encoder for u64 columns (sequence numbers)
#[derive(Debug)]
pub enum U64Encoder {
    Plain(PlainEncoder<u64>),
    Delta(DeltaEncoder),
    Bitpack(Bitpack64Encoder),
}

impl U64Encoder {
    pub fn new(encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::Plain => Ok(U64Encoder::Plain(PlainEncoder::new())),
            Encoding::Delta => Ok(U64Encoder::Delta(DeltaEncoder::new())),
            Encoding::Bitpack => Ok(U64Encoder::Bitpack(Bitpack64Encoder::new())),
            other => Err(unsupported("u64", other)),
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            U64Encoder::Plain(_) => Encoding::Plain,
            U64Encoder::Delta(_) => Encoding::Delta,
            U64Encoder::Bitpack(_) => Encoding::Bitpack,
        }
    }
}

impl Encoder for U64Encoder {
    type Item = u64;

    fn open(&mut self) {
        match self {
            U64Encoder::Plain(e) => e.open(),
            U64Encoder::Delta(e) => e.open(),
            U64Encoder::Bitpack(e) => e.open(),
        }
    }

    fn encode(&mut self, value: &u64) {
        match self {
            U64Encoder::Plain(e) => e.encode(value),
            U64Encoder::Delta(e) => e.encode(value),
            U64Encoder::Bitpack(e) => e.encode(value),
        }
    }

    fn close(&mut self) {
        match self {
            U64Encoder::Plain(e) => e.close(),
            U64Encoder::Delta(e) => e.close(),
            U64Encoder::Bitpack(e) => e.close(),
        }
    }

    fn estimate_size(&self) -> u32 {
        match self {
            U64Encoder::Plain(e) => e.estimate_size(),
            U64Encoder::Delta(e) => e.estimate_size(),
            U64Encoder::Bitpack(e) => e.estimate_size(),
        }
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        match self {
            U64Encoder::Plain(e) => e.dump(dest),
            U64Encoder::Delta(e) => e.dump(dest),
            U64Encoder::Bitpack(e) => e.dump(dest),
        }
    }
}

/// Decoder for u64 columns
#[derive(Debug, Clone)]
pub enum U64Decoder<'a> {
    Plain(PlainDecoder<'a, u64>),
    Delta(DeltaDecoder<'a>),
    Bitpack(Bitpack64Decoder<'a>),
}

impl<'a> U64Decoder<'a> {
    pub fn attach(encoding: Encoding, data: &'a [u8]) -> Result<Self> {
        match encoding {
            Encoding::Plain => Ok(U64Decoder::Plain(PlainDecoder::attach(data)?)),
            Encoding::Delta => Ok(U64Decoder::Delta(DeltaDecoder::attach(data)?)),
            Encoding::Bitpack => Ok(U64Decoder::Bitpack(Bitpack64Decoder::attach(data)?)),
            other => Err(unsupported("u64", other)),
        }
    }
}

impl<'a> Decoder<'a> for U64Decoder<'a> {
    type Item = u64;

    fn skip(&mut self, n: u32) -> Result<()> {
        match self {
            U64Decoder::Plain(d) => d.skip(n),
            U64Decoder::Delta(d) => d.skip(n),
            U64Decoder::Bitpack(d) => d.skip(n),
        }
    }

    fn decode(&mut self) -> Result<u64> {
        match self {
            U64Decoder::Plain(d) => d.decode(),
            U64Decoder::Delta(d) => d.decode(),
            U64Decoder::Bitpack(d) => d.decode(),
        }
    }
}

/// Encoder for byte-string columns (values)
#[derive(Debug)]
pub enum BytesEncoder {
    Plain(PlainBytesEncoder),
    Length(LengthEncoder),
}

impl BytesEncoder {
    pub fn new(encoding: Encoding) -> Result<Self> {
        match encoding {
            Encoding::Plain => Ok(BytesEncoder::Plain(PlainBytesEncoder::new())),
            Encoding::Length => Ok(BytesEncoder::Length(LengthEncoder::new())),
            other => Err(unsupported("bytes", other)),
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            BytesEncoder::Plain(_) => Encoding::Plain,
            BytesEncoder::Length(_) => Encoding::Length,
        }
    }
}

impl Encoder for BytesEncoder {
    type Item = [u8];

    fn open(&mut self) {
        match self {
            BytesEncoder::Plain(e) => e.open(),
            BytesEncoder::Length(e) => e.open(),
        }
    }

    fn encode(&mut self, value: &[u8]) {
        match self {
            BytesEncoder::Plain(e) => e.encode(value),
            BytesEncoder::Length(e) => e.encode(value),
        }
    }

    fn close(&mut self) {
        match self {
            BytesEncoder::Plain(e) => e.close(),
            BytesEncoder::Length(e) => e.close(),
        }
    }

    fn estimate_size(&self) -> u32 {
        match self {
            BytesEncoder::Plain(e) => e.estimate_size(),
            BytesEncoder::Length(e) => e.estimate_size(),
        }
    }

    fn dump<B: BufMut>(&self, dest: &mut B) {
        match self {
            BytesEncoder::Plain(e) => e.dump(dest),
            BytesEncoder::Length(e) => e.dump(dest),
        }
    }
}

/// Decoder for byte-string columns. Decoded slices borrow the block buffer.
#[derive(Debug, Clone)]
pub enum BytesDecoder<'a> {
    Plain(PlainBytesDecoder<'a>),
    Length(LengthDecoder<'a>),
}

impl<'a> BytesDecoder<'a> {
    pub fn attach(encoding: Encoding, data: &'a [u8]) -> Result<Self> {
        match encoding {
            Encoding::Plain => Ok(BytesDecoder::Plain(PlainBytesDecoder::attach(data)?)),
            Encoding::Length => Ok(BytesDecoder::Length(LengthDecoder::attach(data)?)),
            other => Err(unsupported("bytes", other)),
        }
    }
}

impl<'a> Decoder<'a> for BytesDecoder<'a> {
    type Item = &'a [u8];

    fn skip(&mut self, n: u32) -> Result<()> {
        match self {
            BytesDecoder::Plain(d) => d.skip(n),
            BytesDecoder::Length(d) => d.skip(n),
        }
    }

    fn decode(&mut self) -> Result<&'a [u8]> {
        match self {
            BytesDecoder::Plain(d) => d.decode(),
            BytesDecoder::Length(d) => d.decode(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_tags() {
        for encoding in [
            Encoding::Plain,
            Encoding::Length,
            Encoding::Bitpack,
            Encoding::RunLength,
            Encoding::Delta,
            Encoding::VarintRunLength,
        ] {
            assert_eq!(Encoding::try_from(encoding.tag()).unwrap(), encoding);
        }
        assert!(Encoding::try_from(6).is_err());
    }

    #[test]
    fn test_unsupported_combinations() {
        assert!(U8Encoder::new(Encoding::Bitpack).is_err());
        assert!(U32Encoder::new(Encoding::Length).is_err());
        assert!(U64Encoder::new(Encoding::RunLength).is_err());
        assert!(BytesEncoder::new(Encoding::Delta).is_err());
        assert!(BytesDecoder::attach(Encoding::Bitpack, &[]).is_err());
    }

    #[test]
    fn test_dispatch_reports_encoding() {
        assert_eq!(
            U8Encoder::new(Encoding::RunLength).unwrap().encoding(),
            Encoding::RunLength
        );
        assert_eq!(
            U32Encoder::new(Encoding::Bitpack).unwrap().encoding(),
            Encoding::Bitpack
        );
        assert_eq!(
            U64Encoder::new(Encoding::Delta).unwrap().encoding(),
            Encoding::Delta
        );
        assert_eq!(
            BytesEncoder::new(Encoding::Length).unwrap().encoding(),
            Encoding::Length
        );
    }

    #[test]
    fn test_dispatch_encode_decode_u64() {
        let mut encoder = U64Encoder::new(Encoding::Delta).unwrap();
        encoder.open();
        for seq in [100u64, 101, 102, 103, 50, 51] {
            encoder.encode(&seq);
        }
        encoder.close();

        let mut buf = Vec::new();
        encoder.dump(&mut buf);
        assert_eq!(buf.len() as u32, encoder.estimate_size());

        let mut decoder = U64Decoder::attach(Encoding::Delta, &buf).unwrap();
        decoder.skip(3).unwrap();
        assert_eq!(decoder.decode().unwrap(), 103);
        assert_eq!(decoder.decode().unwrap(), 50);
        assert_eq!(decoder.decode().unwrap(), 51);
    }

    #[test]
    fn test_dispatch_bitpack_u64() {
        let mut encoder = U64Encoder::new(Encoding::Bitpack).unwrap();
        assert_eq!(encoder.encoding(), Encoding::Bitpack);
        encoder.open();
        for seq in [900u64, 905, 903, 1000, 950] {
            encoder.encode(&seq);
        }
        encoder.close();
        // min 900, span 100 -> 7 bits, one group
        assert_eq!(encoder.estimate_size(), 9 + 7 + 32);

        let mut buf = Vec::new();
        encoder.dump(&mut buf);
        assert_eq!(buf.len() as u32, encoder.estimate_size());

        let mut decoder = U64Decoder::attach(Encoding::Bitpack, &buf).unwrap();
        decoder.skip(3).unwrap();
        assert_eq!(decoder.decode().unwrap(), 1000);
        assert_eq!(decoder.decode().unwrap(), 950);
    }
}
