//! Internal keys
//!
//! An internal key is the user key followed by an 8-byte little-endian tag
//! `(sequence << 8) | type`, the layout LSM engines in the LevelDB family
//! use. The vertical format only stores 4-byte user keys, read as a
//! native-endian u32.

use std::fmt;

use crate::{ColsmError, Result};

/// Bytes of the sequence/type tag at the end of an internal key
pub const TAG_SIZE: usize = 8;

/// Bytes of a user key in the vertical layout
pub const USER_KEY_SIZE: usize = 4;

/// Bytes of a full internal key in the vertical layout
pub const INTERNAL_KEY_SIZE: usize = USER_KEY_SIZE + TAG_SIZE;

/// Largest sequence number that fits next to the type byte
pub const MAX_SEQUENCE: u64 = (1 << 56) - 1;

/// Operation recorded by an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ValueType {
    Deletion = 0,
    Value = 1,
}

impl TryFrom<u8> for ValueType {
    type Error = ColsmError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ValueType::Deletion),
            1 => Ok(ValueType::Value),
            _ => Err(ColsmError::InvalidKey(format!("unknown value type {}", value))),
        }
    }
}

/// Borrowed view of an internal key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: u64,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn new(user_key: &'a [u8], sequence: u64, value_type: ValueType) -> Self {
        Self {
            user_key,
            sequence,
            value_type,
        }
    }

    /// The user key as the integer stored in the key column.
    pub fn user_key_u32(&self) -> Result<u32> {
        user_key_to_u32(self.user_key)
    }
}

#[inline]
pub fn pack_sequence_and_type(sequence: u64, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE);
    (sequence << 8) | value_type as u64
}

/// Split an internal key into user key, sequence and type.
pub fn parse_internal_key(key: &[u8]) -> Result<ParsedInternalKey<'_>> {
    if key.len() < TAG_SIZE {
        return Err(ColsmError::InvalidKey(format!(
            "internal key of {} bytes is shorter than its tag",
            key.len()
        )));
    }
    let split = key.len() - TAG_SIZE;
    let mut raw = [0u8; TAG_SIZE];
    raw.copy_from_slice(&key[split..]);
    let tag = u64::from_le_bytes(raw);
    Ok(ParsedInternalKey {
        user_key: &key[..split],
        sequence: tag >> 8,
        value_type: ValueType::try_from(tag as u8)?,
    })
}

pub fn append_internal_key(dest: &mut Vec<u8>, key: &ParsedInternalKey<'_>) {
    dest.extend_from_slice(key.user_key);
    dest.extend_from_slice(&pack_sequence_and_type(key.sequence, key.value_type).to_le_bytes());
}

/// First four bytes of `user_key` as a native-endian integer.
pub fn user_key_to_u32(user_key: &[u8]) -> Result<u32> {
    match user_key.get(..USER_KEY_SIZE) {
        Some(b) => Ok(u32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(ColsmError::InvalidKey(format!(
            "user key of {} bytes, need {}",
            user_key.len(),
            USER_KEY_SIZE
        ))),
    }
}

/// Owned internal key
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: u64, value_type: ValueType) -> Self {
        let mut rep = Vec::with_capacity(user_key.len() + TAG_SIZE);
        append_internal_key(&mut rep, &ParsedInternalKey::new(user_key, sequence, value_type));
        Self { rep }
    }

    /// Internal key for an integer user key in the vertical layout.
    pub fn from_u32(user_key: u32, sequence: u64, value_type: ValueType) -> Self {
        Self::new(&user_key.to_ne_bytes(), sequence, value_type)
    }

    pub fn encode(&self) -> &[u8] {
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        &self.rep[..self.rep.len().saturating_sub(TAG_SIZE)]
    }

    pub fn parse(&self) -> Result<ParsedInternalKey<'_>> {
        parse_internal_key(&self.rep)
    }
}

impl AsRef<[u8]> for InternalKey {
    fn as_ref(&self) -> &[u8] {
        &self.rep
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parse() {
            Ok(p) => write!(
                f,
                "InternalKey({:?} @ {} : {:?})",
                p.user_key, p.sequence, p.value_type
            ),
            Err(_) => write!(f, "InternalKey(bad {:?})", self.rep),
        }
    }
}
