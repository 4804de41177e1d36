//! Vertical (columnar) block format
//!
//! A block is a run of sections followed by a meta index and an 8-byte
//! trailer. All fixed-width integers are native-endian.
//!
//! ```text
//! Block   := Section{0..n-1} Meta meta_size:u32 MAGIC:u32
//! Section := num_entry:u32 start_value:u32
//!            key_size:u32   key_tag:u8     (Bitpack, delta from start_value)
//!            seq_size:u32   seq_tag:u8     (Plain | Delta | Bitpack)
//!            type_size:u32  type_tag:u8    (RunLength | VarintRunLength | Plain)
//!            value_size:u32 value_tag:u8   (Length | Plain)
//!            key_bytes seq_bytes type_bytes value_bytes
//! Meta    := num_section:u32 section_offset:u64{n}
//!            start_min:u32 start_bitwidth:u8 starts_bitpacked
//! ```
//!
//! Section offsets are relative to the start of the block. The meta block
//! starts `8 + meta_size` bytes before the end of the buffer.

mod block;
mod builder;
mod meta;
mod section;

pub use block::{BlockContents, VertBlock, VertBlockIter};
pub use builder::VertBlockBuilder;
pub use meta::{MetaBuilder, MetaReader};
pub use section::{SectionBuilder, SectionCursor, SectionEntry, SectionReader, SECTION_HEADER_SIZE};

use crate::encoding::Encoding;
use crate::{config, ColsmError, Result};
use serde::{Deserialize, Serialize};

/// Trailer magic of a vertical block
pub const MAGIC: u32 = 0xCAAE_DADE;

/// `meta_size:u32` plus `MAGIC:u32`
pub const TRAILER_SIZE: usize = 8;

/// Vertical block build options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VertBlockOptions {
    /// Entries per section
    pub section_limit: u32,
    /// Encoding of the value column
    pub value_encoding: Encoding,
    /// Encoding of the sequence number column
    pub sequence_encoding: Encoding,
    /// Encoding of the operation type column
    pub type_encoding: Encoding,
}

impl Default for VertBlockOptions {
    fn default() -> Self {
        Self {
            section_limit: config::SECTION_LIMIT,
            value_encoding: Encoding::Length,
            sequence_encoding: Encoding::Plain,
            type_encoding: Encoding::RunLength,
        }
    }
}

impl VertBlockOptions {
    pub fn with_value_encoding(mut self, encoding: Encoding) -> Self {
        self.value_encoding = encoding;
        self
    }

    pub fn with_section_limit(mut self, limit: u32) -> Self {
        self.section_limit = limit;
        self
    }

    /// Check every setting against the encodings its column supports.
    pub fn validate(&self) -> Result<()> {
        if self.section_limit == 0 {
            return Err(ColsmError::Config("section_limit must be at least 1".into()));
        }
        if !matches!(self.value_encoding, Encoding::Length | Encoding::Plain) {
            return Err(ColsmError::Config(format!(
                "value_encoding {} is not a byte-string encoding",
                self.value_encoding.name()
            )));
        }
        if !matches!(
            self.sequence_encoding,
            Encoding::Plain | Encoding::Delta | Encoding::Bitpack
        ) {
            return Err(ColsmError::Config(format!(
                "sequence_encoding {} is not a u64 encoding",
                self.sequence_encoding.name()
            )));
        }
        if !matches!(
            self.type_encoding,
            Encoding::RunLength | Encoding::VarintRunLength | Encoding::Plain
        ) {
            return Err(ColsmError::Config(format!(
                "type_encoding {} is not a u8 encoding",
                self.type_encoding.name()
            )));
        }
        Ok(())
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self =
            serde_json::from_str(json).map_err(|e| ColsmError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }
}
