//! Block meta: section offsets and bit-packed section start keys

use bytes::BufMut;

use crate::encoding::{bit_width, extract, last_leq_packed, pack, read_u32, read_u64};
use crate::{ColsmError, Result};

/// `num_section:u32` + `start_min:u32` + `start_bitwidth:u8`
const META_FIXED_SIZE: usize = 9;

/// Packed starts are padded to whole 64-bit words.
fn starts_size(count: usize, width: u8) -> usize {
    ((width as usize * count + 63) >> 6) << 3
}

#[derive(Debug, Default)]
pub struct MetaBuilder {
    offsets: Vec<u64>,
    starts: Vec<u32>,
    start_min: u32,
    start_bitwidth: u8,
}

impl MetaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a section. Start values must be strictly increasing.
    pub fn add_section(&mut self, offset: u64, start_value: u32) -> Result<()> {
        if self.offsets.is_empty() {
            self.start_min = start_value;
        } else {
            let previous = self.start_min + self.starts[self.starts.len() - 1];
            if start_value <= previous {
                return Err(ColsmError::KeyOrder {
                    previous,
                    key: start_value,
                });
            }
        }
        self.offsets.push(offset);
        self.starts.push(start_value - self.start_min);
        Ok(())
    }

    /// Fix the bit width of the start column.
    pub fn finish(&mut self) {
        self.start_bitwidth = bit_width(self.max_delta());
    }

    fn max_delta(&self) -> u32 {
        self.starts.last().copied().unwrap_or(0)
    }

    pub fn estimate_size(&self) -> u32 {
        let width = bit_width(self.max_delta());
        (META_FIXED_SIZE + 8 * self.offsets.len() + starts_size(self.starts.len(), width)) as u32
    }

    pub fn write<B: BufMut>(&self, dest: &mut B) {
        let width = bit_width(self.max_delta());
        debug_assert_eq!(width, self.start_bitwidth, "meta written before finish");

        dest.put_slice(&(self.offsets.len() as u32).to_ne_bytes());
        for offset in &self.offsets {
            dest.put_slice(&offset.to_ne_bytes());
        }
        dest.put_slice(&self.start_min.to_ne_bytes());
        dest.put_u8(width);

        let mut packed = pack(&self.starts, width);
        packed.resize(starts_size(self.starts.len(), width), 0);
        dest.put_slice(&packed);
    }

    pub fn reset(&mut self) {
        self.offsets.clear();
        self.starts.clear();
        self.start_min = 0;
        self.start_bitwidth = 0;
    }

    pub fn num_sections(&self) -> usize {
        self.offsets.len()
    }

    pub fn start_bitwidth(&self) -> u8 {
        self.start_bitwidth
    }
}

/// Read-only view of a serialized meta block
#[derive(Debug, Clone, Copy)]
pub struct MetaReader<'a> {
    num_sections: u32,
    offsets: &'a [u8],
    start_min: u32,
    start_bitwidth: u8,
    starts: &'a [u8],
}

impl<'a> MetaReader<'a> {
    pub fn read(data: &'a [u8]) -> Result<Self> {
        let num_sections = read_u32(data, 0, "meta num_section")?;
        let offsets_end = 4 + 8 * num_sections as usize;
        let offsets = data
            .get(4..offsets_end)
            .ok_or_else(|| ColsmError::truncated("meta offsets", offsets_end, data.len()))?;
        let start_min = read_u32(data, offsets_end, "meta start_min")?;
        let start_bitwidth = *data
            .get(offsets_end + 4)
            .ok_or_else(|| ColsmError::truncated("meta start_bitwidth", offsets_end + 5, data.len()))?;
        if start_bitwidth > 32 {
            return Err(ColsmError::Corruption(format!(
                "meta start bitwidth {} exceeds 32",
                start_bitwidth
            )));
        }
        let starts_begin = offsets_end + 5;
        let starts_end = starts_begin + starts_size(num_sections as usize, start_bitwidth);
        let starts = data
            .get(starts_begin..starts_end)
            .ok_or_else(|| ColsmError::truncated("meta starts", starts_end, data.len()))?;

        Ok(Self {
            num_sections,
            offsets,
            start_min,
            start_bitwidth,
            starts,
        })
    }

    pub fn num_sections(&self) -> u32 {
        self.num_sections
    }

    pub fn start_min(&self) -> u32 {
        self.start_min
    }

    pub fn start_bitwidth(&self) -> u8 {
        self.start_bitwidth
    }

    pub fn section_offset(&self, index: u32) -> Result<u64> {
        if index >= self.num_sections {
            return Err(ColsmError::Corruption(format!(
                "section {} past {} sections",
                index, self.num_sections
            )));
        }
        read_u64(self.offsets, 8 * index as usize, "meta offset")
    }

    /// Start key of section `index`.
    pub fn section_start(&self, index: u32) -> Result<u32> {
        if index >= self.num_sections {
            return Err(ColsmError::Corruption(format!(
                "section {} past {} sections",
                index, self.num_sections
            )));
        }
        let delta = extract(self.starts, self.start_bitwidth, index as usize);
        self.start_min
            .checked_add(delta)
            .ok_or_else(|| ColsmError::Corruption("section start overflows u32".into()))
    }

    /// Index of the last section whose start is `<= value`.
    ///
    /// Values below the first section's start resolve to section 0, as does
    /// an empty meta.
    pub fn search(&self, value: u32) -> u32 {
        match value.checked_sub(self.start_min) {
            Some(target) => last_leq_packed(
                self.starts,
                self.start_bitwidth,
                self.num_sections as usize,
                target,
            ),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(builder: &mut MetaBuilder) -> Vec<u8> {
        builder.finish();
        let mut buf = Vec::new();
        builder.write(&mut buf);
        assert_eq!(buf.len(), builder.estimate_size() as usize);
        buf
    }

    #[test]
    fn test_meta_size() {
        let mut builder = MetaBuilder::new();
        for i in 0..100u32 {
            builder.add_section(2 * i as u64, i + 300).unwrap();
        }
        let buf = write(&mut builder);

        assert_eq!(buf.len(), 897);
        assert_eq!(builder.start_bitwidth(), 7);

        let reader = MetaReader::read(&buf).unwrap();
        assert_eq!(reader.num_sections(), 100);
        assert_eq!(reader.start_min(), 300);
        assert_eq!(reader.start_bitwidth(), 7);
        for i in 0..100u32 {
            assert_eq!(reader.section_offset(i).unwrap(), 2 * i as u64);
            assert_eq!(reader.section_start(i).unwrap(), i + 300);
        }
        assert!(reader.section_offset(100).is_err());
    }

    #[test]
    fn test_meta_search() {
        let mut builder = MetaBuilder::new();
        // starts 1000, 1010, ..., 1490
        for i in 0..50u32 {
            builder.add_section(i as u64 * 4096, 1000 + i * 10).unwrap();
        }
        let buf = write(&mut builder);
        let reader = MetaReader::read(&buf).unwrap();

        assert_eq!(reader.search(0), 0);
        assert_eq!(reader.search(999), 0);
        assert_eq!(reader.search(1000), 0);
        assert_eq!(reader.search(1009), 0);
        assert_eq!(reader.search(1010), 1);
        assert_eq!(reader.search(1255), 25);
        assert_eq!(reader.search(1490), 49);
        assert_eq!(reader.search(u32::MAX), 49);

        for v in 1000..1600u32 {
            let expected = ((v - 1000) / 10).min(49);
            assert_eq!(reader.search(v), expected, "value {}", v);
        }
    }

    #[test]
    fn test_meta_single_section() {
        let mut builder = MetaBuilder::new();
        builder.add_section(0, 77).unwrap();
        let buf = write(&mut builder);
        // no packed words at width 0
        assert_eq!(buf.len(), 9 + 8);
        assert_eq!(builder.start_bitwidth(), 0);

        let reader = MetaReader::read(&buf).unwrap();
        assert_eq!(reader.section_start(0).unwrap(), 77);
        assert_eq!(reader.search(5), 0);
        assert_eq!(reader.search(77), 0);
        assert_eq!(reader.search(u32::MAX), 0);
    }

    #[test]
    fn test_meta_near_max_start() {
        let mut builder = MetaBuilder::new();
        builder.add_section(0, u32::MAX - 20).unwrap();
        builder.add_section(100, u32::MAX - 10).unwrap();
        builder.add_section(200, u32::MAX).unwrap();
        let buf = write(&mut builder);
        let reader = MetaReader::read(&buf).unwrap();

        assert_eq!(reader.search(0), 0);
        assert_eq!(reader.search(u32::MAX - 11), 0);
        assert_eq!(reader.search(u32::MAX - 10), 1);
        assert_eq!(reader.search(u32::MAX), 2);
        assert_eq!(reader.section_start(2).unwrap(), u32::MAX);
    }

    #[test]
    fn test_meta_order_and_reset() {
        let mut builder = MetaBuilder::new();
        builder.add_section(0, 10).unwrap();
        let err = builder.add_section(50, 10).unwrap_err();
        assert!(matches!(err, ColsmError::KeyOrder { previous: 10, key: 10 }));

        builder.reset();
        assert_eq!(builder.num_sections(), 0);
        builder.add_section(0, 5).unwrap();
        assert_eq!(builder.num_sections(), 1);

        let empty_buf = write(&mut MetaBuilder::new());
        let empty = MetaReader::read(&empty_buf).unwrap();
        assert_eq!(empty.num_sections(), 0);
        assert_eq!(empty.search(42), 0);
    }

    #[test]
    fn test_meta_truncated() {
        let mut builder = MetaBuilder::new();
        for i in 0..10u32 {
            builder.add_section(i as u64, i * 1000).unwrap();
        }
        let buf = write(&mut builder);
        assert!(MetaReader::read(&buf[..buf.len() - 1])
            .unwrap_err()
            .is_corruption());
        assert!(MetaReader::read(&buf[..3]).is_err());
    }
}
