//! Thumbnail consumer on top of the store
//!
//! Decoding a frame into a mini thumbnail is the job of a native decoder
//! that lives outside this crate; [`FrameSource`] is the seam it plugs into.
//! [`ThumbnailCache`] serves cached thumbnails whose tag still matches the
//! source and regenerates the rest.

use crate::error::Result;
use crate::storage::minithumb::{StoreRegistry, MAX_PAYLOAD};
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces encoded mini thumbnails from the original media
pub trait FrameSource: Send + Sync {
    /// Encoded thumbnail for `id` in `table`, or `None` when the source has none
    fn decode_thumbnail(&self, table: &str, id: u64) -> Result<Option<Vec<u8>>>;
}

impl<F> FrameSource for F
where
    F: Fn(&str, u64) -> Result<Option<Vec<u8>>> + Send + Sync,
{
    fn decode_thumbnail(&self, table: &str, id: u64) -> Result<Option<Vec<u8>>> {
        self(table, id)
    }
}

/// Regenerate-on-miss thumbnail cache
pub struct ThumbnailCache<S> {
    registry: Arc<StoreRegistry>,
    source: S,
}

impl<S: FrameSource> ThumbnailCache<S> {
    pub fn new(registry: Arc<StoreRegistry>, source: S) -> Self {
        Self { registry, source }
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    /// Thumbnail for `id`, valid for the source version identified by `tag`.
    ///
    /// A cached entry with a different tag is stale and gets regenerated.
    /// Storing the regenerated thumbnail is best-effort.
    pub fn get_or_generate(&self, table: &str, id: u64, tag: u64) -> Result<Option<Vec<u8>>> {
        let store = self.registry.instance(table);

        if let Some(cached) = store.get(id) {
            if cached.tag == tag {
                return Ok(Some(cached.payload));
            }
            debug!(table, id, cached_tag = cached.tag, tag, "Cached thumbnail is stale");
        }

        let Some(thumbnail) = self.source.decode_thumbnail(table, id)? else {
            return Ok(None);
        };

        if thumbnail.is_empty() || thumbnail.len() > MAX_PAYLOAD {
            debug!(table, id, len = thumbnail.len(), "Thumbnail not cacheable");
        } else if let Err(e) = store.put(id, &thumbnail, tag) {
            warn!(table, id, error = %e, "Failed to cache thumbnail");
        }

        Ok(Some(thumbnail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
    }

    impl FrameSource for CountingSource {
        fn decode_thumbnail(&self, table: &str, id: u64) -> Result<Option<Vec<u8>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if id == 404 {
                return Ok(None);
            }
            Ok(Some(format!("{}:{}:{}", table, id, call).into_bytes()))
        }
    }

    fn registry(name: &str) -> Arc<StoreRegistry> {
        let dir = std::env::temp_dir().join(format!("minithumb_media_{}_{}", name, std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        Arc::new(StoreRegistry::new(StoreConfig::with_base_dir(dir)).unwrap())
    }

    #[test]
    fn test_generates_once_then_serves_cache() -> Result<()> {
        let cache = ThumbnailCache::new(registry("once"), CountingSource { calls: AtomicUsize::new(0) });

        let first = cache.get_or_generate("images", 1, 100)?;
        let second = cache.get_or_generate("images", 1, 100)?;

        assert_eq!(first, Some(b"images:1:0".to_vec()));
        assert_eq!(second, first);
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);

        std::fs::remove_dir_all(&cache.registry().config().base_dir).ok();
        Ok(())
    }

    #[test]
    fn test_stale_tag_regenerates() -> Result<()> {
        let cache = ThumbnailCache::new(registry("stale"), CountingSource { calls: AtomicUsize::new(0) });

        cache.get_or_generate("images", 2, 100)?;
        let refreshed = cache.get_or_generate("images", 2, 101)?;

        assert_eq!(refreshed, Some(b"images:2:1".to_vec()));
        assert_eq!(cache.registry().instance("images").get_tag(2), Some(101));

        std::fs::remove_dir_all(&cache.registry().config().base_dir).ok();
        Ok(())
    }

    #[test]
    fn test_source_without_thumbnail() -> Result<()> {
        let cache = ThumbnailCache::new(registry("none"), CountingSource { calls: AtomicUsize::new(0) });

        assert_eq!(cache.get_or_generate("images", 404, 1)?, None);
        assert_eq!(cache.registry().instance("images").get_tag(404), None);

        std::fs::remove_dir_all(&cache.registry().config().base_dir).ok();
        Ok(())
    }

    #[test]
    fn test_source_errors_propagate() {
        let source = |_: &str, _: u64| -> Result<Option<Vec<u8>>> {
            Err(Error::Internal("decoder crashed".to_string()))
        };
        let cache = ThumbnailCache::new(registry("error"), source);

        assert!(cache.get_or_generate("video", 1, 1).is_err());

        std::fs::remove_dir_all(&cache.registry().config().base_dir).ok();
    }

    #[test]
    fn test_oversized_thumbnail_is_served_uncached() -> Result<()> {
        let source = |_: &str, _: u64| -> Result<Option<Vec<u8>>> { Ok(Some(vec![1u8; MAX_PAYLOAD + 10])) };
        let cache = ThumbnailCache::new(registry("oversized"), source);

        let thumb = cache.get_or_generate("images", 3, 3)?.expect("generated");
        assert_eq!(thumb.len(), MAX_PAYLOAD + 10);
        assert_eq!(cache.registry().instance("images").get_tag(3), None);

        std::fs::remove_dir_all(&cache.registry().config().base_dir).ok();
        Ok(())
    }

    #[test]
    fn test_empty_thumbnail_is_served_uncached() -> Result<()> {
        let source = |_: &str, _: u64| -> Result<Option<Vec<u8>>> { Ok(Some(Vec::new())) };
        let cache = ThumbnailCache::new(registry("empty"), source);

        assert_eq!(cache.get_or_generate("images", 4, 4)?, Some(Vec::new()));
        assert_eq!(cache.registry().instance("images").get_tag(4), None);
        assert_eq!(cache.registry().instance("images").stats().data_blocks, 0);

        std::fs::remove_dir_all(&cache.registry().config().base_dir).ok();
        Ok(())
    }
}
