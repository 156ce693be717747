//! Storage layer
//!
//! # Architecture
//!
//! Thumbnails are cached per table in a pair of flat files:
//!
//! ```text
//! StoreRegistry (table id → store)
//!   └─→ MiniThumbStore
//!        ├─→ index file (id → data offset)
//!        └─→ data file  (fixed-size blocks)
//! ```
//!
//! ## Implementation
//!
//! - **Fixed slots**: 8-byte index entries, 10000-byte data blocks
//! - **Byte-range locks** scoped to the slot being touched
//! - **Degraded mode**: unopenable files turn reads into misses

pub mod minithumb;

pub use minithumb::{MiniThumbStore, StoreRegistry, StoreStats, Thumbnail};
