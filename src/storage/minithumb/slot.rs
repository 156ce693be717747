//! Slot layout for the data and index files
//!
//! ```text
//! Data block (BLOCK_SIZE bytes, big-endian):
//! [status: 1][tag: 8][length: 4][payload: length][padding]
//!
//! Index entry (8 bytes, at id * 8):
//! [data offset: i64]
//! ```
//!
//! Block 0 of the data file is never used, so an all-zero index entry
//! (a hole below the highest written id) reads as absent.
//!
//! Pure encode/decode, no I/O.

use crate::error::{Error, Result};
use std::fmt;

/// Size of one data block in the data file
pub const BLOCK_SIZE: usize = 10_000;

/// status + tag + length
pub const HEADER_SIZE: usize = 1 + 8 + 4;

/// status + tag, enough to answer a tag query
pub const TAG_HEADER_SIZE: usize = 1 + 8;

/// Largest payload one block can hold
pub const MAX_PAYLOAD: usize = BLOCK_SIZE - HEADER_SIZE;

/// First offset a data block may occupy
pub const FIRST_BLOCK_OFFSET: u64 = BLOCK_SIZE as u64;

/// Size of one index entry in the index file
pub const INDEX_ENTRY_SIZE: usize = 8;

pub const STATUS_EMPTY: u8 = 0;
pub const STATUS_VALID: u8 = 1;

/// Address of a record's index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexSlot {
    pub id: u64,
    pub offset: u64,
}

impl IndexSlot {
    /// Index slot for `id`, or `None` when `id * 8` does not fit a file offset
    pub fn for_id(id: u64) -> Option<Self> {
        let offset = id.checked_mul(INDEX_ENTRY_SIZE as u64)?;
        // fcntl ranges are signed
        if offset > i64::MAX as u64 - INDEX_ENTRY_SIZE as u64 {
            return None;
        }
        Some(Self { id, offset })
    }
}

impl fmt::Display for IndexSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexSlot(id={}, offset={})", self.id, self.offset)
    }
}

/// A decoded, valid data block borrowing its payload from the read buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataBlock<'a> {
    pub tag: u64,
    pub payload: &'a [u8],
}

/// Encode a full block into `buf`, which is resized to `BLOCK_SIZE`
pub fn encode_data_block(buf: &mut Vec<u8>, tag: u64, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }

    buf.clear();
    buf.resize(BLOCK_SIZE, 0);
    buf[0] = STATUS_VALID;
    buf[1..9].copy_from_slice(&tag.to_be_bytes());
    buf[9..13].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    buf[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
    Ok(())
}

/// Decode the tag from the first bytes of a block.
///
/// Only the 9-byte status+tag header is inspected.
pub fn decode_tag(bytes: &[u8]) -> Option<u64> {
    if bytes.len() < TAG_HEADER_SIZE || bytes[0] != STATUS_VALID {
        return None;
    }
    let tag = u64::from_be_bytes(bytes[1..9].try_into().ok()?);
    (tag != 0).then_some(tag)
}

/// Decode a full block.
///
/// `bytes` is what was actually read; a short read that cuts off the
/// declared payload yields `None`, as do empty blocks, a zero tag, and a
/// zero length.
pub fn decode_data_block(bytes: &[u8]) -> Option<DataBlock<'_>> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let tag = decode_tag(bytes)?;

    let len = u32::from_be_bytes(bytes[9..13].try_into().ok()?) as usize;
    if len == 0 || len > MAX_PAYLOAD || bytes.len() < HEADER_SIZE + len {
        return None;
    }

    Some(DataBlock {
        tag,
        payload: &bytes[HEADER_SIZE..HEADER_SIZE + len],
    })
}

pub fn encode_index_entry(offset: i64) -> [u8; INDEX_ENTRY_SIZE] {
    offset.to_be_bytes()
}

/// Decode an index entry; short reads, zero and negative offsets are absent
pub fn decode_index_entry(bytes: &[u8]) -> Option<i64> {
    let raw: [u8; INDEX_ENTRY_SIZE] = bytes.get(..INDEX_ENTRY_SIZE)?.try_into().ok()?;
    let offset = i64::from_be_bytes(raw);
    (offset > 0).then_some(offset)
}
