//! Mini-thumbnail store
//!
//! A fixed-slot binary store on two flat files per table, keyed by a
//! numeric record id.
//!
//! # Architecture
//!
//! ```text
//! StoreRegistry
//!   ├─→ "images" → MiniThumbStore
//!   │               ├─→ .thumbindex1-<hash>   [offset(id=0)][offset(id=1)]...
//!   │               └─→ .thumbdata4-<hash>    [reserved][block][block]...
//!   └─→ "video"  → MiniThumbStore
//! ```
//!
//! An index entry at `id * 8` holds the byte offset of the record's
//! latest data block. Blocks are fixed at `BLOCK_SIZE` bytes and only ever
//! appended; rewriting an id leaves its previous block unreachable.
//!
//! Reads are best-effort: missing files, I/O faults and corrupt slots all
//! read as a miss.

pub mod files;
pub mod lock;
pub mod registry;
pub mod slot;
pub mod store;

pub use files::{table_hash, FileKind};
pub use lock::{LockKind, RangeLock};
pub use registry::{table_id_from_uri, StoreRegistry};
pub use slot::{BLOCK_SIZE, HEADER_SIZE, MAX_PAYLOAD};
pub use store::{MiniThumbStore, StoreStats, Thumbnail};
