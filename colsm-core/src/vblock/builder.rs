//! Vertical block builder

use tracing::debug;

use super::meta::MetaBuilder;
use super::section::SectionBuilder;
use super::{VertBlockOptions, MAGIC, TRAILER_SIZE};
use crate::key::{parse_internal_key, user_key_to_u32, INTERNAL_KEY_SIZE, USER_KEY_SIZE};
use crate::{ColsmError, Result};

/// Headroom for the meta entry of a section that is still open
const OPEN_SECTION_META_RESERVE: usize = 16;

/// Builds one vertical block from entries added in increasing key order.
///
/// Sections are sealed as soon as they reach `section_limit` entries and
/// appended to the output buffer, so the buffer always holds every closed
/// section. [`finish`](Self::finish) seals the last partial section and
/// appends the meta block and trailer.
pub struct VertBlockBuilder {
    options: VertBlockOptions,
    section: SectionBuilder,
    meta: MetaBuilder,
    buffer: Vec<u8>,
    last_key: Option<u32>,
    num_entries: u64,
    finished: bool,
}

impl VertBlockBuilder {
    pub fn new(options: VertBlockOptions) -> Result<Self> {
        options.validate()?;
        let section = SectionBuilder::new(&options)?;
        Ok(Self {
            options,
            section,
            meta: MetaBuilder::new(),
            buffer: Vec::new(),
            last_key: None,
            num_entries: 0,
            finished: false,
        })
    }

    pub fn options(&self) -> &VertBlockOptions {
        &self.options
    }

    /// Add an entry. `key` is a 12-byte internal key: a 4-byte user key
    /// followed by the packed sequence and type.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.finished {
            return Err(ColsmError::NotSupported(
                "add after finish; reset the builder first".into(),
            ));
        }
        if key.len() != INTERNAL_KEY_SIZE {
            return Err(ColsmError::InvalidKey(format!(
                "internal key of {} bytes, need {} ({}-byte user key)",
                key.len(),
                INTERNAL_KEY_SIZE,
                USER_KEY_SIZE
            )));
        }
        let parsed = parse_internal_key(key)?;
        let user_key = user_key_to_u32(parsed.user_key)?;
        if let Some(previous) = self.last_key {
            if user_key <= previous {
                return Err(ColsmError::KeyOrder {
                    previous,
                    key: user_key,
                });
            }
        }

        if self.section.is_empty() {
            self.section.open(user_key);
        }
        self.section
            .add(user_key, parsed.sequence, parsed.value_type, value)?;
        self.last_key = Some(user_key);
        self.num_entries += 1;

        if self.section.num_entry() >= self.options.section_limit {
            self.seal_section()?;
        }
        Ok(())
    }

    fn seal_section(&mut self) -> Result<()> {
        self.section.close();
        let offset = self.buffer.len() as u64;
        self.meta.add_section(offset, self.section.start_value())?;
        self.section.dump(&mut self.buffer);
        debug!(
            "Sealed section {} ({} entries, {} bytes)",
            self.meta.num_sections() - 1,
            self.section.num_entry(),
            self.buffer.len() as u64 - offset
        );
        // the next add reopens it with its own start value
        self.section.open(0);
        Ok(())
    }

    /// Seal the open section and write meta and trailer. Calling it again
    /// before [`reset`](Self::reset) returns the same bytes.
    pub fn finish(&mut self) -> Result<&[u8]> {
        if !self.finished {
            if !self.section.is_empty() {
                self.seal_section()?;
            }
            self.meta.finish();
            let meta_size = self.meta.estimate_size();
            self.meta.write(&mut self.buffer);
            self.buffer.extend_from_slice(&meta_size.to_ne_bytes());
            self.buffer.extend_from_slice(&MAGIC.to_ne_bytes());
            self.finished = true;
            debug!(
                "Finished vertical block ({} sections, {} entries, {} bytes)",
                self.meta.num_sections(),
                self.num_entries,
                self.buffer.len()
            );
        }
        Ok(&self.buffer)
    }

    /// Drop all sections and meta and return to the empty state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.meta.reset();
        self.section.open(0);
        self.last_key = None;
        self.num_entries = 0;
        self.finished = false;
    }

    /// Advisory size of the block if it were finished now.
    pub fn current_size_estimate(&self) -> usize {
        let mut size = self.meta.estimate_size() as usize + self.buffer.len();
        if !self.section.is_empty() {
            size += self.section.estimate_size() as usize + OPEN_SECTION_META_RESERVE;
        }
        size + TRAILER_SIZE
    }

    pub fn empty(&self) -> bool {
        self.num_entries == 0
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoding;
    use crate::key::{InternalKey, ValueType};
    use crate::vblock::{MetaReader, SectionReader};

    fn add_keys(builder: &mut VertBlockBuilder, keys: impl IntoIterator<Item = u32>) {
        for k in keys {
            let key = InternalKey::from_u32(k, 1350, ValueType::Value);
            builder.add(key.encode(), key.encode()).unwrap();
        }
    }

    fn trailer(block: &[u8]) -> (u32, u32) {
        let n = block.len();
        let meta_size = u32::from_ne_bytes(block[n - 8..n - 4].try_into().unwrap());
        let magic = u32::from_ne_bytes(block[n - 4..].try_into().unwrap());
        (meta_size, magic)
    }

    #[test]
    fn test_build_length_values() {
        let mut builder = VertBlockBuilder::new(VertBlockOptions::default()).unwrap();
        assert!(builder.empty());
        add_keys(&mut builder, 0..1000);
        assert_eq!(builder.num_entries(), 1000);

        let block = builder.finish().unwrap().to_vec();
        assert_eq!(block.len(), 25556);

        let (meta_size, magic) = trailer(&block);
        assert_eq!(magic, MAGIC);
        assert_eq!(meta_size, 89);

        let meta_start = block.len() - 8 - meta_size as usize;
        let meta = MetaReader::read(&block[meta_start..block.len() - 8]).unwrap();
        assert_eq!(meta.num_sections(), 8);
        assert_eq!(meta.start_bitwidth(), 10);
        for i in 0..8u32 {
            assert_eq!(meta.section_offset(i).unwrap(), 3257 * i as u64);
            assert_eq!(meta.section_start(i).unwrap(), 128 * i);
        }

        let last = SectionReader::read(&block[3257 * 7..meta_start]).unwrap();
        assert_eq!(last.num_entry(), 104);
        assert_eq!(last.size(), 2660);
    }

    #[test]
    fn test_reset_is_repeatable() {
        let options = VertBlockOptions::default().with_value_encoding(Encoding::Plain);
        let mut builder = VertBlockBuilder::new(options).unwrap();

        let mut first: Option<Vec<u8>> = None;
        for _ in 0..5 {
            add_keys(&mut builder, 0..1000);
            let block = builder.finish().unwrap().to_vec();
            assert_eq!(block.len(), 25492);
            match &first {
                Some(expected) => assert_eq!(&block, expected),
                None => first = Some(block),
            }
            builder.reset();
            assert!(builder.empty());
            assert!(!builder.is_finished());
        }
    }

    #[test]
    fn test_finish_twice() {
        let mut builder = VertBlockBuilder::new(VertBlockOptions::default()).unwrap();
        add_keys(&mut builder, [1, 5, 9]);
        let first = builder.finish().unwrap().to_vec();
        let second = builder.finish().unwrap().to_vec();
        assert_eq!(first, second);

        let key = InternalKey::from_u32(20, 1, ValueType::Value);
        assert!(builder.add(key.encode(), b"v").unwrap_err().is_not_supported());
    }

    #[test]
    fn test_key_order_enforced() {
        let mut builder = VertBlockBuilder::new(VertBlockOptions::default()).unwrap();
        add_keys(&mut builder, [10, 20]);

        let key = InternalKey::from_u32(20, 2, ValueType::Deletion);
        let err = builder.add(key.encode(), b"").unwrap_err();
        assert!(matches!(err, ColsmError::KeyOrder { previous: 20, key: 20 }));

        let key = InternalKey::from_u32(3, 2, ValueType::Value);
        assert!(builder.add(key.encode(), b"").is_err());

        assert!(matches!(
            builder.add(b"short", b"").unwrap_err(),
            ColsmError::InvalidKey(_)
        ));
        assert_eq!(builder.num_entries(), 2);
    }

    #[test]
    fn test_user_key_width_enforced() {
        let mut builder = VertBlockBuilder::new(VertBlockOptions::default()).unwrap();
        let long = InternalKey::new(b"\x01\x00\x00\x00EXTRA", 7, ValueType::Value);
        assert!(matches!(
            builder.add(long.encode(), b"v").unwrap_err(),
            ColsmError::InvalidKey(_)
        ));
        let short = InternalKey::new(b"\x01\x00", 7, ValueType::Value);
        assert!(matches!(
            builder.add(short.encode(), b"v").unwrap_err(),
            ColsmError::InvalidKey(_)
        ));
        assert!(builder.empty());

        let exact = InternalKey::new(&1u32.to_ne_bytes(), 7, ValueType::Value);
        builder.add(exact.encode(), b"v").unwrap();
        assert_eq!(builder.num_entries(), 1);
    }

    #[test]
    fn test_order_across_sections() {
        let options = VertBlockOptions::default().with_section_limit(4);
        let mut builder = VertBlockBuilder::new(options).unwrap();
        add_keys(&mut builder, 0..4);
        // the section is sealed; the next key still has to be larger
        let key = InternalKey::from_u32(2, 1, ValueType::Value);
        assert!(builder.add(key.encode(), b"").is_err());
    }

    #[test]
    fn test_size_estimate() {
        let mut builder = VertBlockBuilder::new(VertBlockOptions::default()).unwrap();
        assert_eq!(builder.current_size_estimate(), 9 + 8);

        add_keys(&mut builder, 0..1000);
        let estimate = builder.current_size_estimate();
        let actual = builder.finish().unwrap().len();
        assert!(estimate >= actual, "{} < {}", estimate, actual);

        let mut previous = 0;
        builder.reset();
        for k in 0..300u32 {
            add_keys(&mut builder, [k]);
            let estimate = builder.current_size_estimate();
            assert!(estimate > previous);
            previous = estimate;
        }
    }

    #[test]
    fn test_invalid_options() {
        let options = VertBlockOptions::default().with_section_limit(0);
        assert!(VertBlockBuilder::new(options).is_err());
    }
}
