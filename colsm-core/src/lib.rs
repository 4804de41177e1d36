//! COLSM Core - Columnar Block Format for LSM-Tree Storage Engines
//!
//! Stores a sorted run of key/value entries column by column instead of
//! row by row, so integer keys bit-pack, repeated operation types collapse
//! into runs, and lookups binary-search packed keys without decoding them.
//!
//! # Architecture
//!
//! - **Encoding**: per-column codecs (plain, length, bitpack, run-length,
//!   delta) with positional `skip`
//! - **Section**: up to `section_limit` entries stored as four columns
//! - **Meta**: section offsets and bit-packed section start keys
//! - **Vertical block**: sections + meta + trailer, with a seekable iterator
//! - **Sort-merge**: folds two sorted iterators into one during compaction
//!
//! # Example
//!
//! ```
//! use colsm_core::iterator::BlockIterator;
//! use colsm_core::key::{InternalKey, ValueType};
//! use colsm_core::vblock::{VertBlock, VertBlockBuilder, VertBlockOptions};
//!
//! let mut builder = VertBlockBuilder::new(VertBlockOptions::default())?;
//! for k in 0..1000u32 {
//!     let key = InternalKey::from_u32(k, 1, ValueType::Value);
//!     builder.add(key.encode(), format!("v{}", k).as_bytes())?;
//! }
//! let data = builder.finish()?.to_vec();
//!
//! let block = VertBlock::from_slice(&data)?;
//! let mut iter = block.iter();
//! iter.seek(&500u32.to_ne_bytes());
//! assert!(iter.valid());
//! assert_eq!(iter.value(), b"v500");
//! # Ok::<(), colsm_core::ColsmError>(())
//! ```

pub mod compression;
pub mod cost;
pub mod encoding;
pub mod iterator;
pub mod key;
pub mod vblock;

mod error;

pub use error::{ColsmError, Result};

/// COLSM version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod config {
    /// Entries per section
    pub const SECTION_LIMIT: u32 = 128;

    /// Levels assumed when no cost model file is available
    pub const DEFAULT_NUM_LEVELS: usize = 8;

    /// File name the cost model writes its level assignments to
    pub const COST_MODEL_FILE: &str = "colsm_model";
}
