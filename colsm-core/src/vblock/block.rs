//! Vertical block reader and iterator

use std::ops::Deref;

use bytes::Bytes;
use tracing::trace;

use super::meta::MetaReader;
use super::section::{SectionCursor, SectionEntry, SectionReader};
use super::{MAGIC, TRAILER_SIZE};
use crate::encoding::read_u32;
use crate::iterator::{BlockIterator, Status};
use crate::key::user_key_to_u32;
use crate::{ColsmError, Result};

/// Backing buffer of a block, owned or borrowed from the caller
#[derive(Debug, Clone)]
pub enum BlockContents<'a> {
    Owned(Bytes),
    Borrowed(&'a [u8]),
}

impl<'a> BlockContents<'a> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            BlockContents::Owned(bytes) => &bytes[..],
            BlockContents::Borrowed(slice) => slice,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, BlockContents::Owned(_))
    }

    /// Detach from the borrowed buffer, copying if needed.
    pub fn into_owned(self) -> BlockContents<'static> {
        match self {
            BlockContents::Owned(bytes) => BlockContents::Owned(bytes),
            BlockContents::Borrowed(slice) => BlockContents::Owned(Bytes::copy_from_slice(slice)),
        }
    }
}

impl Deref for BlockContents<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Bytes> for BlockContents<'static> {
    fn from(bytes: Bytes) -> Self {
        BlockContents::Owned(bytes)
    }
}

impl From<Vec<u8>> for BlockContents<'static> {
    fn from(data: Vec<u8>) -> Self {
        BlockContents::Owned(Bytes::from(data))
    }
}

impl<'a> From<&'a [u8]> for BlockContents<'a> {
    fn from(slice: &'a [u8]) -> Self {
        BlockContents::Borrowed(slice)
    }
}

/// An immutable vertical block.
///
/// Construction checks the trailer, parses the meta and validates every
/// section header, so iterators only hit errors on damaged column data.
/// Any number of iterators may read one block at the same time.
#[derive(Debug, Clone)]
pub struct VertBlock<'a> {
    contents: BlockContents<'a>,
    meta_start: usize,
    num_sections: u32,
    num_entries: u64,
}

impl<'a> VertBlock<'a> {
    pub fn new(contents: BlockContents<'a>) -> Result<Self> {
        let data = contents.as_slice();
        if data.len() < TRAILER_SIZE {
            return Err(ColsmError::truncated("block trailer", TRAILER_SIZE, data.len()));
        }
        let magic = read_u32(data, data.len() - 4, "block magic")?;
        if magic != MAGIC {
            return Err(ColsmError::Corruption(format!(
                "bad vertical block magic {:#010x}",
                magic
            )));
        }
        let meta_end = data.len() - TRAILER_SIZE;
        let meta_size = read_u32(data, meta_end, "block meta_size")? as usize;
        let meta_start = meta_end.checked_sub(meta_size).ok_or_else(|| {
            ColsmError::Corruption(format!(
                "meta size {} exceeds block of {} bytes",
                meta_size,
                data.len()
            ))
        })?;

        let meta = MetaReader::read(&data[meta_start..meta_end])?;
        let num_sections = meta.num_sections();
        let mut num_entries = 0u64;
        for index in 0..num_sections {
            let section = section_at(data, &meta, meta_start, index)?;
            num_entries += section.num_entry() as u64;
        }

        Ok(Self {
            contents,
            meta_start,
            num_sections,
            num_entries,
        })
    }

    pub fn from_slice(data: &'a [u8]) -> Result<Self> {
        Self::new(BlockContents::Borrowed(data))
    }

    pub fn data(&self) -> &[u8] {
        self.contents.as_slice()
    }

    pub fn size(&self) -> usize {
        self.contents.len()
    }

    /// Whether the block owns its buffer
    pub fn is_owned(&self) -> bool {
        self.contents.is_owned()
    }

    pub fn num_sections(&self) -> u32 {
        self.num_sections
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn meta(&self) -> Result<MetaReader<'_>> {
        MetaReader::read(&self.data()[self.meta_start..self.size() - TRAILER_SIZE])
    }

    pub fn section(&self, index: u32) -> Result<SectionReader<'_>> {
        let meta = self.meta()?;
        section_at(self.data(), &meta, self.meta_start, index)
    }

    pub fn iter(&self) -> VertBlockIter<'_> {
        VertBlockIter::new(self)
    }
}

impl VertBlock<'static> {
    /// Block that owns `data`.
    pub fn from_bytes(data: impl Into<Bytes>) -> Result<Self> {
        Self::new(BlockContents::Owned(data.into()))
    }
}

fn section_at<'a>(
    data: &'a [u8],
    meta: &MetaReader<'a>,
    meta_start: usize,
    index: u32,
) -> Result<SectionReader<'a>> {
    let start = meta.section_offset(index)? as usize;
    let end = if index + 1 < meta.num_sections() {
        meta.section_offset(index + 1)? as usize
    } else {
        meta_start
    };
    if start > end || end > meta_start {
        return Err(ColsmError::Corruption(format!(
            "section {} spans {}..{} outside the {} section bytes",
            index, start, end, meta_start
        )));
    }
    SectionReader::read(&data[start..end])
}

/// Forward iterator over a [`VertBlock`].
///
/// Keys are 12-byte internal keys rebuilt from the key, sequence and type
/// columns. A new iterator is unpositioned; `next` on it moves to the
/// first entry. Backward iteration is not supported.
pub struct VertBlockIter<'b> {
    data: &'b [u8],
    meta: Option<MetaReader<'b>>,
    meta_start: usize,
    num_sections: u32,
    section_index: u32,
    section: Option<SectionReader<'b>>,
    cursor: Option<SectionCursor<'b>>,
    positioned: bool,
    valid: bool,
    key: Vec<u8>,
    value: &'b [u8],
    status: Status,
}

impl<'b> VertBlockIter<'b> {
    fn new(block: &'b VertBlock<'_>) -> Self {
        let (meta, status) = match block.meta() {
            Ok(meta) => (Some(meta), Status::Ok),
            Err(e) => (None, Status::from(e)),
        };
        Self {
            data: block.data(),
            meta,
            meta_start: block.meta_start,
            num_sections: block.num_sections,
            section_index: 0,
            section: None,
            cursor: None,
            positioned: false,
            valid: false,
            key: Vec::with_capacity(crate::key::INTERNAL_KEY_SIZE),
            value: &[],
            status,
        }
    }

    fn meta(&self) -> Result<MetaReader<'b>> {
        self.meta
            .ok_or_else(|| ColsmError::Corruption("block meta is unreadable".into()))
    }

    fn load_section(&mut self, index: u32) -> Result<SectionReader<'b>> {
        if let Some(section) = self.section {
            if self.section_index == index {
                return Ok(section);
            }
        }
        let meta = self.meta()?;
        let section = section_at(self.data, &meta, self.meta_start, index)?;
        trace!(
            "Loaded section {} ({} entries, start {})",
            index,
            section.num_entry(),
            section.start_value()
        );
        self.section = Some(section);
        self.section_index = index;
        Ok(section)
    }

    fn position(&mut self, index: u32, entry: u32) -> Result<()> {
        let section = self.load_section(index)?;
        self.cursor = Some(section.cursor(entry)?);
        self.read_entry()
    }

    fn read_entry(&mut self) -> Result<()> {
        let entry = match self.cursor.as_mut() {
            Some(cursor) => cursor.next_entry()?,
            None => return Err(ColsmError::Corruption("iterator has no section".into())),
        };
        self.set_current(entry);
        Ok(())
    }

    fn set_current(&mut self, entry: SectionEntry<'b>) {
        self.key.clear();
        self.key.extend_from_slice(&entry.key.to_ne_bytes());
        let tag = (entry.sequence << 8) | entry.value_type as u64;
        self.key.extend_from_slice(&tag.to_le_bytes());
        self.value = entry.value;
        self.valid = true;
    }

    fn advance(&mut self) -> Result<()> {
        let exhausted = self.cursor.as_ref().map_or(true, |c| c.is_exhausted());
        if !exhausted {
            return self.read_entry();
        }
        if self.section_index + 1 < self.num_sections {
            return self.position(self.section_index + 1, 0);
        }
        self.valid = false;
        Ok(())
    }

    fn seek_user_key(&mut self, target: u32) -> Result<()> {
        if self.num_sections == 0 {
            return Err(ColsmError::NotFound(format!("key {} in empty block", target)));
        }
        let index = self.meta()?.search(target);
        let section = self.load_section(index)?;
        let entry = section.find_start(target);
        if entry < section.num_entry() {
            self.position(index, entry)
        } else if index + 1 < self.num_sections {
            self.position(index + 1, 0)
        } else {
            Err(ColsmError::NotFound(format!(
                "key {} is past the last key of the block",
                target
            )))
        }
    }

    fn reset_position(&mut self) {
        self.positioned = true;
        self.valid = false;
        if self.meta.is_some() {
            self.status = Status::Ok;
        }
    }

    fn fail(&mut self, err: ColsmError) {
        self.valid = false;
        self.status = Status::from(err);
    }

    /// Index of the section holding the current entry
    pub fn section_index(&self) -> u32 {
        self.section_index
    }

    /// Index of the current entry within its section
    pub fn entry_index(&self) -> u32 {
        self.cursor
            .as_ref()
            .map_or(0, |c| c.index().saturating_sub(1))
    }
}

impl BlockIterator for VertBlockIter<'_> {
    fn valid(&self) -> bool {
        self.valid
    }

    fn seek_to_first(&mut self) {
        self.reset_position();
        if self.num_sections == 0 {
            return;
        }
        if let Err(e) = self.position(0, 0) {
            self.fail(e);
        }
    }

    fn seek_to_last(&mut self) {
        self.reset_position();
        if self.num_sections == 0 {
            return;
        }
        let last = self.num_sections - 1;
        let result = self.load_section(last).and_then(|section| {
            let entry = section
                .num_entry()
                .checked_sub(1)
                .ok_or_else(|| ColsmError::Corruption(format!("section {} is empty", last)))?;
            self.position(last, entry)
        });
        if let Err(e) = result {
            self.fail(e);
        }
    }

    /// `target` is a user key or internal key; its leading 4 bytes are
    /// the integer key searched for.
    fn seek(&mut self, target: &[u8]) {
        self.reset_position();
        let result = user_key_to_u32(target).and_then(|key| self.seek_user_key(key));
        if let Err(e) = result {
            self.fail(e);
        }
    }

    fn next(&mut self) {
        if !self.positioned {
            self.seek_to_first();
            return;
        }
        if !self.valid {
            return;
        }
        if let Err(e) = self.advance() {
            self.fail(e);
        }
    }

    fn prev(&mut self) {
        self.valid = false;
        self.status =
            Status::NotSupported("vertical blocks do not support backward iteration".into());
    }

    fn key(&self) -> &[u8] {
        if self.valid {
            &self.key
        } else {
            &[]
        }
    }

    fn value(&self) -> &[u8] {
        if self.valid {
            self.value
        } else {
            &[]
        }
    }

    fn status(&self) -> Status {
        self.status.clone()
    }
}
