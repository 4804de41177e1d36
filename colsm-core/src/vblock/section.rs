//! Sections: bounded runs of entries stored as four parallel columns

use bytes::BufMut;

use crate::encoding::{
    eq_packed, extract, geq_packed, packed_size, BitpackDecoder, BitpackEncoder, BytesDecoder,
    BytesEncoder, Decoder, Encoder, Encoding, U64Decoder, U64Encoder, U8Decoder, U8Encoder,
};
use crate::encoding::read_u32;
use crate::key::ValueType;
use crate::vblock::VertBlockOptions;
use crate::{ColsmError, Result};

/// `num_entry`, `start_value` and four `(size:u32, tag:u8)` descriptors
pub const SECTION_HEADER_SIZE: usize = 4 + 4 + 4 * 5;

/// Accumulates one section.
///
/// Keys are stored as deltas from `start_value`, which is fixed by
/// [`open`](Self::open). After [`close`](Self::close), `estimate_size`
/// is exactly the number of bytes [`dump`](Self::dump) writes.
#[derive(Debug)]
pub struct SectionBuilder {
    start_value: u32,
    num_entry: u32,
    last_key: Option<u32>,
    keys: BitpackEncoder,
    sequences: U64Encoder,
    types: U8Encoder,
    values: BytesEncoder,
}

impl SectionBuilder {
    pub fn new(options: &VertBlockOptions) -> Result<Self> {
        Ok(Self {
            start_value: 0,
            num_entry: 0,
            last_key: None,
            keys: BitpackEncoder::new(),
            sequences: U64Encoder::new(options.sequence_encoding)?,
            types: U8Encoder::new(options.type_encoding)?,
            values: BytesEncoder::new(options.value_encoding)?,
        })
    }

    /// Start an empty section whose keys are all `>= start_value`.
    pub fn open(&mut self, start_value: u32) {
        self.start_value = start_value;
        self.num_entry = 0;
        self.last_key = None;
        self.keys.open();
        self.sequences.open();
        self.types.open();
        self.values.open();
    }

    pub fn add(
        &mut self,
        key: u32,
        sequence: u64,
        value_type: ValueType,
        value: &[u8],
    ) -> Result<()> {
        if key < self.start_value {
            return Err(ColsmError::InvalidKey(format!(
                "key {} is below section start {}",
                key, self.start_value
            )));
        }
        if let Some(previous) = self.last_key {
            if key <= previous {
                return Err(ColsmError::KeyOrder { previous, key });
            }
        }

        self.keys.encode(&(key - self.start_value));
        self.sequences.encode(&sequence);
        self.types.encode(&(value_type as u8));
        self.values.encode(value);
        self.last_key = Some(key);
        self.num_entry += 1;
        Ok(())
    }

    /// Flush pending runs in every column.
    pub fn close(&mut self) {
        self.keys.close();
        self.sequences.close();
        self.types.close();
        self.values.close();
    }

    pub fn estimate_size(&self) -> u32 {
        SECTION_HEADER_SIZE as u32
            + self.keys.estimate_size()
            + self.sequences.estimate_size()
            + self.types.estimate_size()
            + self.values.estimate_size()
    }

    pub fn dump<B: BufMut>(&self, dest: &mut B) {
        dest.put_slice(&self.num_entry.to_ne_bytes());
        dest.put_slice(&self.start_value.to_ne_bytes());
        for (size, encoding) in [
            (self.keys.estimate_size(), Encoding::Bitpack),
            (self.sequences.estimate_size(), self.sequences.encoding()),
            (self.types.estimate_size(), self.types.encoding()),
            (self.values.estimate_size(), self.values.encoding()),
        ] {
            dest.put_slice(&size.to_ne_bytes());
            dest.put_u8(encoding.tag());
        }
        self.keys.dump(dest);
        self.sequences.dump(dest);
        self.types.dump(dest);
        self.values.dump(dest);
    }

    pub fn num_entry(&self) -> u32 {
        self.num_entry
    }

    pub fn start_value(&self) -> u32 {
        self.start_value
    }

    pub fn last_key(&self) -> Option<u32> {
        self.last_key
    }

    pub fn is_empty(&self) -> bool {
        self.num_entry == 0
    }
}

/// One decoded section entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntry<'a> {
    pub key: u32,
    pub sequence: u64,
    pub value_type: ValueType,
    pub value: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
struct Column<'a> {
    encoding: Encoding,
    data: &'a [u8],
}

/// Read-only view of a serialized section
#[derive(Debug, Clone, Copy)]
pub struct SectionReader<'a> {
    num_entry: u32,
    start_value: u32,
    key_width: u8,
    key_column: &'a [u8],
    key_packed: &'a [u8],
    sequences: Column<'a>,
    types: Column<'a>,
    values: Column<'a>,
    size: usize,
}

impl<'a> SectionReader<'a> {
    /// Parse the header at the start of `data` and locate the four columns.
    pub fn read(data: &'a [u8]) -> Result<Self> {
        if data.len() < SECTION_HEADER_SIZE {
            return Err(ColsmError::truncated(
                "section header",
                SECTION_HEADER_SIZE,
                data.len(),
            ));
        }
        let num_entry = read_u32(data, 0, "section num_entry")?;
        let start_value = read_u32(data, 4, "section start_value")?;

        let mut columns = [Column {
            encoding: Encoding::Plain,
            data: &[],
        }; 4];
        let mut offset = SECTION_HEADER_SIZE;
        for (i, column) in columns.iter_mut().enumerate() {
            let descriptor = 8 + i * 5;
            let size = read_u32(data, descriptor, "section column size")? as usize;
            let encoding = Encoding::try_from(data[descriptor + 4])?;
            let end = offset + size;
            let bytes = data
                .get(offset..end)
                .ok_or_else(|| ColsmError::truncated("section column", end, data.len()))?;
            *column = Column {
                encoding,
                data: bytes,
            };
            offset = end;
        }

        let [keys, sequences, types, values] = columns;
        if keys.encoding != Encoding::Bitpack {
            return Err(ColsmError::InvalidFormat(format!(
                "key column uses {} encoding, expected bitpack",
                keys.encoding.name()
            )));
        }
        let key_decoder = BitpackDecoder::attach(keys.data)?;
        let key_width = key_decoder.width();
        let key_packed = key_decoder.packed();
        let needed = packed_size(num_entry as usize, key_width);
        if key_packed.len() < needed {
            return Err(ColsmError::truncated("section keys", needed, key_packed.len()));
        }

        Ok(Self {
            num_entry,
            start_value,
            key_width,
            key_column: keys.data,
            key_packed,
            sequences,
            types,
            values,
            size: offset,
        })
    }

    pub fn num_entry(&self) -> u32 {
        self.num_entry
    }

    pub fn start_value(&self) -> u32 {
        self.start_value
    }

    /// Serialized size, header included
    pub fn size(&self) -> usize {
        self.size
    }

    /// Key at `index`, which must be below `num_entry`.
    pub fn key_at(&self, index: u32) -> Result<u32> {
        if index >= self.num_entry {
            return Err(ColsmError::Corruption(format!(
                "key index {} past {} entries",
                index, self.num_entry
            )));
        }
        let delta = extract(self.key_packed, self.key_width, index as usize);
        self.start_value
            .checked_add(delta)
            .ok_or_else(|| ColsmError::Corruption("key delta overflows u32".into()))
    }

    /// Index of the entry whose key is exactly `target`.
    pub fn find(&self, target: u32) -> Option<u32> {
        let delta = target.checked_sub(self.start_value)?;
        eq_packed(
            self.key_packed,
            self.key_width,
            self.num_entry as usize,
            delta,
        )
    }

    /// Index of the first entry whose key is `>= target`, or `num_entry`
    /// if every key is smaller.
    pub fn find_start(&self, target: u32) -> u32 {
        match target.checked_sub(self.start_value) {
            Some(delta) => geq_packed(
                self.key_packed,
                self.key_width,
                self.num_entry as usize,
                delta,
            ),
            None => 0,
        }
    }

    /// Cursor positioned at entry `index`. `index == num_entry` yields an
    /// exhausted cursor.
    pub fn cursor(&self, index: u32) -> Result<SectionCursor<'a>> {
        if index > self.num_entry {
            return Err(ColsmError::Corruption(format!(
                "cursor index {} past {} entries",
                index, self.num_entry
            )));
        }
        let mut cursor = SectionCursor {
            start_value: self.start_value,
            index: 0,
            num_entry: self.num_entry,
            keys: BitpackDecoder::attach(self.key_column)?,
            sequences: U64Decoder::attach(self.sequences.encoding, self.sequences.data)?,
            types: U8Decoder::attach(self.types.encoding, self.types.data)?,
            values: BytesDecoder::attach(self.values.encoding, self.values.data)?,
        };
        cursor.skip(index)?;
        Ok(cursor)
    }
}

/// Forward cursor over the four columns of one section
#[derive(Debug, Clone)]
pub struct SectionCursor<'a> {
    start_value: u32,
    index: u32,
    num_entry: u32,
    keys: BitpackDecoder<'a>,
    sequences: U64Decoder<'a>,
    types: U8Decoder<'a>,
    values: BytesDecoder<'a>,
}

impl<'a> SectionCursor<'a> {
    /// Index of the entry the next call to `next_entry` returns
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.num_entry
    }

    fn skip(&mut self, n: u32) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        self.keys.skip(n)?;
        self.sequences.skip(n)?;
        self.types.skip(n)?;
        self.values.skip(n)?;
        self.index += n;
        Ok(())
    }

    pub fn next_entry(&mut self) -> Result<SectionEntry<'a>> {
        if self.is_exhausted() {
            return Err(ColsmError::Corruption(format!(
                "section cursor past {} entries",
                self.num_entry
            )));
        }
        let key = self
            .start_value
            .checked_add(self.keys.decode()?)
            .ok_or_else(|| ColsmError::Corruption("key delta overflows u32".into()))?;
        let sequence = self.sequences.decode()?;
        let value_type = ValueType::try_from(self.types.decode()?)
            .map_err(|e| ColsmError::Corruption(e.to_string()))?;
        let value = self.values.decode()?;
        self.index += 1;
        Ok(SectionEntry {
            key,
            sequence,
            value_type,
            value,
        })
    }
}
