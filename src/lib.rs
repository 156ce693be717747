// MiniThumb - Rust Implementation
// A fixed-slot, indexed thumbnail cache on top of two flat files

#![warn(rust_2018_idioms)]

pub mod config;
pub mod media;
pub mod metrics;
pub mod storage;

// Re-exports for convenience
pub use config::StoreConfig;
pub use media::{FrameSource, ThumbnailCache};
pub use storage::minithumb::{MiniThumbStore, StoreRegistry, StoreStats};

/// MiniThumb error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Storage unavailable: {0}")]
        StorageUnavailable(String),

        #[error("Payload too large: {len} bytes exceeds slot capacity of {max} bytes")]
        PayloadTooLarge { len: usize, max: usize },

        #[error("Lock I/O fault: {0}")]
        LockIoFault(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Internal error: {0}")]
        Internal(String),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
