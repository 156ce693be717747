//! Locked get/put engine over one data file and one index file
//!
//! # Protocol
//!
//! ```text
//! get(id):  index[id*8..+8]  (shared lock)  → offset
//!           data[offset..+BLOCK_SIZE] (shared lock) → block
//!
//! put(id):  data[eof..+BLOCK_SIZE] (exclusive lock) ← block   (append)
//!           index[id*8..+8] (exclusive lock) ← eof            (publish)
//! ```
//!
//! The block is written before its offset is published, so a reader never
//! follows a pointer to a block that is not fully written. Every put
//! appends; the previous block of the same id stays in the file unreachable.
//!
//! Threads sharing one store are serialized by the store mutex, which also
//! guards the scratch buffers. Separate stores on the same files, in this
//! process or another, are serialized per slot by the byte-range locks.

use super::files::{self, BackingFile, FileKind};
use super::lock::{LockKind, RangeLock};
use super::slot::{
    self, DataBlock, IndexSlot, BLOCK_SIZE, FIRST_BLOCK_OFFSET, INDEX_ENTRY_SIZE, MAX_PAYLOAD,
    STATUS_EMPTY, STATUS_VALID, TAG_HEADER_SIZE,
};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::metrics::{self, ReadResult, WriteResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// A thumbnail read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub tag: u64,
    pub payload: Vec<u8>,
}

/// File-level statistics for one store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub table: String,
    /// Both backing files are open
    pub active: bool,
    pub writable: bool,
    pub data_len: u64,
    pub index_len: u64,
    /// Blocks written to the data file, including unreachable ones
    pub data_blocks: u64,
    /// Addressable index entries (highest written id + 1)
    pub index_slots: u64,
}

/// Mini-thumbnail store for one table
pub struct MiniThumbStore {
    table: String,
    config: Arc<StoreConfig>,
    files: Mutex<StoreFiles>,
}

/// Handles and scratch buffers, only touched under the store mutex
struct StoreFiles {
    data: Option<BackingFile>,
    index: Option<BackingFile>,
    block_buf: Vec<u8>,
    index_buf: [u8; INDEX_ENTRY_SIZE],
}

fn lock_fault(what: &str, err: io::Error) -> Error {
    Error::LockIoFault(format!("{}: {}", what, err))
}

/// `true` when the index entry was published, `false` when the write was
/// dropped on a full disk or read-only mount
fn index_write_outcome(result: io::Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if files::is_exhausted(&e) => {
            debug!(error = %e, "Index entry not written");
            Ok(false)
        }
        Err(e) => Err(lock_fault("write index entry", e)),
    }
}

impl StoreFiles {
    fn new() -> Self {
        Self {
            data: None,
            index: None,
            block_buf: Vec::with_capacity(BLOCK_SIZE),
            index_buf: [0; INDEX_ENTRY_SIZE],
        }
    }

    /// Open whichever handle is missing; `false` while either is unavailable
    fn ensure_open(&mut self, config: &StoreConfig, table: &str) -> bool {
        if self.data.is_none() {
            self.data = files::open_backing_file(config, FileKind::Data, table);
        }
        if self.index.is_none() {
            self.index = files::open_backing_file(config, FileKind::Index, table);
        }
        self.data.is_some() && self.index.is_some()
    }

    fn is_open(&self) -> bool {
        self.data.is_some() || self.index.is_some()
    }

    fn writable(&self) -> bool {
        matches!((&self.data, &self.index), (Some(d), Some(i)) if d.writable && i.writable)
    }

    fn data_file(&self) -> Result<&BackingFile> {
        self.data
            .as_ref()
            .ok_or_else(|| Error::StorageUnavailable("data file is not open".to_string()))
    }

    /// Data offset published for `slot`
    fn lookup_offset(&mut self, slot: IndexSlot) -> Result<Option<u64>> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| Error::StorageUnavailable("index file is not open".to_string()))?;

        let _lock = RangeLock::acquire(
            &index.file,
            slot.offset,
            INDEX_ENTRY_SIZE as u64,
            LockKind::Shared,
        )
        .map_err(|e| lock_fault("lock index entry", e))?;

        let n = files::read_full_at(&index.file, &mut self.index_buf, slot.offset)
            .map_err(|e| lock_fault("read index entry", e))?;

        Ok(slot::decode_index_entry(&self.index_buf[..n]).map(|offset| offset as u64))
    }

    /// Read the first `len` bytes of the block at `offset` into the scratch buffer
    fn read_block(&mut self, offset: u64, len: usize) -> Result<&[u8]> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| Error::StorageUnavailable("data file is not open".to_string()))?;

        let _lock = RangeLock::acquire(&data.file, offset, BLOCK_SIZE as u64, LockKind::Shared)
            .map_err(|e| lock_fault("lock data block", e))?;

        self.block_buf.resize(BLOCK_SIZE, 0);
        let n = files::read_full_at(&data.file, &mut self.block_buf[..len], offset)
            .map_err(|e| lock_fault("read data block", e))?;

        Ok(&self.block_buf[..n])
    }

    fn read_tag(&mut self, slot: IndexSlot) -> Result<Option<u64>> {
        let Some(offset) = self.lookup_offset(slot)? else {
            return Ok(None);
        };
        let header = self.read_block(offset, TAG_HEADER_SIZE)?;
        Ok(slot::decode_tag(header))
    }

    fn read_data_block(&mut self, slot: IndexSlot) -> Result<Option<DataBlock<'_>>> {
        let Some(offset) = self.lookup_offset(slot)? else {
            return Ok(None);
        };
        let bytes = self.read_block(offset, BLOCK_SIZE)?;
        Ok(slot::decode_data_block(bytes))
    }

    /// Append the encoded block in the scratch buffer at end of file.
    ///
    /// The length is checked again once the range is locked; if another
    /// process appended in the meantime, retry at the new end.
    fn append_block(&self) -> Result<u64> {
        let data = self.data_file()?;

        loop {
            let len = data.len().map_err(|e| lock_fault("stat data file", e))?;
            let end = len.max(FIRST_BLOCK_OFFSET);
            let lock = RangeLock::acquire(&data.file, end, BLOCK_SIZE as u64, LockKind::Exclusive)
                .map_err(|e| lock_fault("lock data block", e))?;

            let current = data.len().map_err(|e| lock_fault("stat data file", e))?;
            if current != len {
                drop(lock);
                continue;
            }

            files::write_all_at(&data.file, &self.block_buf, end)
                .map_err(|e| lock_fault("write data block", e))?;
            return Ok(end);
        }
    }

    /// Point `slot` at `offset`; raw I/O error so the caller can classify it
    fn publish_offset(&self, slot: IndexSlot, offset: u64) -> io::Result<()> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "index file is not open"))?;

        let _lock = RangeLock::acquire(
            &index.file,
            slot.offset,
            INDEX_ENTRY_SIZE as u64,
            LockKind::Exclusive,
        )?;
        files::write_all_at(&index.file, &slot::encode_index_entry(offset as i64), slot.offset)
    }

    /// Mark the block behind `slot` empty; `false` when there was nothing to erase
    fn erase_block(&mut self, slot: IndexSlot) -> Result<bool> {
        let Some(offset) = self.lookup_offset(slot)? else {
            return Ok(false);
        };
        let data = self.data_file()?;

        let _lock = RangeLock::acquire(&data.file, offset, BLOCK_SIZE as u64, LockKind::Exclusive)
            .map_err(|e| lock_fault("lock data block", e))?;

        let mut status = [0u8; 1];
        let n = files::read_full_at(&data.file, &mut status, offset)
            .map_err(|e| lock_fault("read data block", e))?;
        if n == 0 || status[0] != STATUS_VALID {
            return Ok(false);
        }

        files::write_all_at(&data.file, &[STATUS_EMPTY], offset)
            .map_err(|e| lock_fault("write data block", e))?;
        Ok(true)
    }
}

impl MiniThumbStore {
    /// Create a store for `table`; files are opened on first access
    pub fn new(table: impl Into<String>, config: Arc<StoreConfig>) -> Self {
        Self {
            table: table.into(),
            config,
            files: Mutex::new(StoreFiles::new()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn data_path(&self) -> PathBuf {
        files::file_path(&self.config, FileKind::Data, &self.table)
    }

    pub fn index_path(&self) -> PathBuf {
        files::file_path(&self.config, FileKind::Index, &self.table)
    }

    /// Run a read under the store mutex; faults are logged and read as a miss
    fn read<T>(
        &self,
        id: u64,
        read: impl FnOnce(&mut StoreFiles, IndexSlot) -> Result<Option<T>>,
    ) -> Option<T> {
        let Some(slot) = IndexSlot::for_id(id) else {
            metrics::record_read(ReadResult::Miss);
            return None;
        };

        let mut files = self.files.lock();
        if !files.ensure_open(&self.config, &self.table) {
            metrics::record_read(ReadResult::Miss);
            return None;
        }

        match read(&mut *files, slot) {
            Ok(Some(value)) => {
                metrics::record_read(ReadResult::Hit);
                Some(value)
            }
            Ok(None) => {
                metrics::record_read(ReadResult::Miss);
                None
            }
            Err(e) => {
                warn!(table = %self.table, id, error = %e, "Thumbnail read failed");
                metrics::record_read(ReadResult::Fault);
                None
            }
        }
    }

    /// Tag stored for `id`, reading only the block header
    pub fn get_tag(&self, id: u64) -> Option<u64> {
        self.read(id, |files, slot| files.read_tag(slot))
    }

    /// Copy the payload for `id` into `dest` and return the filled prefix.
    ///
    /// A destination shorter than the stored payload reads as a miss.
    pub fn get_payload<'a>(&self, id: u64, dest: &'a mut [u8]) -> Option<&'a [u8]> {
        let len = self.read(id, |files, slot| {
            Ok(files.read_data_block(slot)?.and_then(|block| {
                let len = block.payload.len();
                if dest.len() < len {
                    return None;
                }
                dest[..len].copy_from_slice(block.payload);
                Some(len)
            }))
        })?;
        Some(&dest[..len])
    }

    /// Tag and payload for `id`
    pub fn get(&self, id: u64) -> Option<Thumbnail> {
        self.read(id, |files, slot| {
            Ok(files.read_data_block(slot)?.map(|block| Thumbnail {
                tag: block.tag,
                payload: block.payload.to_vec(),
            }))
        })
    }

    /// Store `payload` under `id` with `tag`.
    ///
    /// Empty and oversized payloads are rejected before any I/O. A full disk or
    /// read-only mount hit while publishing the index entry is logged and
    /// the write is dropped; other faults are returned.
    pub fn put(&self, id: u64, payload: &[u8], tag: u64) -> Result<()> {
        let slot = IndexSlot::for_id(id)
            .ok_or_else(|| Error::InvalidArgument(format!("record id {} out of range", id)))?;

        if payload.len() > MAX_PAYLOAD {
            metrics::record_write(WriteResult::Rejected);
            debug!(table = %self.table, id, len = payload.len(), "Thumbnail too large for a slot");
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        if payload.is_empty() {
            metrics::record_write(WriteResult::Rejected);
            return Err(Error::InvalidArgument("empty thumbnail payload".to_string()));
        }

        let mut files = self.files.lock();
        if !files.ensure_open(&self.config, &self.table) {
            metrics::record_write(WriteResult::Skipped);
            return Err(Error::StorageUnavailable(format!(
                "no backing files for table '{}'",
                self.table
            )));
        }
        if !files.writable() {
            metrics::record_write(WriteResult::Skipped);
            return Err(Error::StorageUnavailable(format!(
                "backing files for table '{}' are read-only",
                self.table
            )));
        }

        slot::encode_data_block(&mut files.block_buf, tag, payload)?;

        let offset = match files.append_block() {
            Ok(offset) => offset,
            Err(e) => {
                metrics::record_write(WriteResult::Fault);
                return Err(e);
            }
        };

        match index_write_outcome(files.publish_offset(slot, offset)) {
            Ok(true) => {}
            Ok(false) => {
                warn!(table = %self.table, id, "Index write aborted, storage full or read-only");
                metrics::record_write(WriteResult::Skipped);
                return Ok(());
            }
            Err(e) => {
                metrics::record_write(WriteResult::Fault);
                return Err(e);
            }
        }

        debug!(table = %self.table, id, offset, len = payload.len(), "Stored thumbnail");
        metrics::record_write(WriteResult::Stored);
        Ok(())
    }

    /// Mark the record for `id` empty. The index entry is kept.
    pub fn erase(&self, id: u64) -> Result<bool> {
        let Some(slot) = IndexSlot::for_id(id) else {
            return Ok(false);
        };

        let mut files = self.files.lock();
        if !files.ensure_open(&self.config, &self.table) || !files.writable() {
            return Err(Error::StorageUnavailable(format!(
                "cannot erase from table '{}'",
                self.table
            )));
        }

        let erased = files.erase_block(slot)?;
        debug!(table = %self.table, id, erased, "Erase thumbnail");
        Ok(erased)
    }

    /// Flush both files to disk
    pub fn sync(&self) -> Result<()> {
        let files = self.files.lock();
        for backing in [&files.data, &files.index].into_iter().flatten() {
            backing
                .file
                .sync_all()
                .map_err(|e| lock_fault("sync thumbnail file", e))?;
        }
        Ok(())
    }

    /// File-level statistics; opens the files if needed
    pub fn stats(&self) -> StoreStats {
        let mut files = self.files.lock();
        let active = files.ensure_open(&self.config, &self.table);
        let data_len = files.data.as_ref().and_then(|f| f.len().ok()).unwrap_or(0);
        let index_len = files.index.as_ref().and_then(|f| f.len().ok()).unwrap_or(0);

        StoreStats {
            table: self.table.clone(),
            active,
            writable: files.writable(),
            data_len,
            index_len,
            data_blocks: data_len.saturating_sub(FIRST_BLOCK_OFFSET) / BLOCK_SIZE as u64,
            index_slots: index_len / INDEX_ENTRY_SIZE as u64,
        }
    }

    /// Whether any backing file handle is currently held
    pub fn is_open(&self) -> bool {
        self.files.lock().is_open()
    }

    /// Close both handles. Idempotent; a later access reopens lazily.
    pub fn deactivate(&self) {
        let mut files = self.files.lock();
        if files.is_open() {
            files.data = None;
            files.index = None;
            debug!(table = %self.table, "Deactivated thumbnail store");
        }
    }
}

impl std::fmt::Debug for MiniThumbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniThumbStore")
            .field("table", &self.table)
            .field("base_dir", &self.config.base_dir)
            .finish()
    }
}
