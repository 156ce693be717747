//! End-to-end tests for the thumbnail store through the public API

use minithumb::error::Error;
use minithumb::storage::minithumb::{table_hash, BLOCK_SIZE, HEADER_SIZE, MAX_PAYLOAD};
use minithumb::{StoreConfig, StoreRegistry, ThumbnailCache};
use std::sync::Arc;

fn registry(name: &str) -> StoreRegistry {
    let dir = std::env::temp_dir().join(format!("minithumb_it_{}_{}", name, std::process::id()));
    std::fs::remove_dir_all(&dir).ok();
    StoreRegistry::new(StoreConfig::with_base_dir(dir)).expect("Failed to create registry")
}

#[test]
fn test_round_trip_and_on_disk_layout() {
    let registry = registry("layout");
    let store = registry.instance("images");

    store.put(3, b"JFIF....", 0xabcd).expect("put");

    // Files carry the versioned, hashed names
    let hash = table_hash("images");
    let base = &registry.config().base_dir;
    assert!(base.join(format!(".thumbdata4-{}", hash)).exists());
    assert!(base.join(format!(".thumbindex1-{}", hash)).exists());

    // Index entry for id 3 lives at byte 24 and points past the reserved block
    let index = std::fs::read(store.index_path()).unwrap();
    assert_eq!(index.len(), 32);
    let offset = i64::from_be_bytes(index[24..32].try_into().unwrap());
    assert_eq!(offset, BLOCK_SIZE as i64);

    let data = std::fs::read(store.data_path()).unwrap();
    let block = &data[offset as usize..offset as usize + BLOCK_SIZE];
    assert_eq!(block[0], 1);
    assert_eq!(u64::from_be_bytes(block[1..9].try_into().unwrap()), 0xabcd);
    assert_eq!(u32::from_be_bytes(block[9..13].try_into().unwrap()), 8);
    assert_eq!(&block[HEADER_SIZE..HEADER_SIZE + 8], b"JFIF....");

    let mut buf = vec![0u8; 64];
    assert_eq!(store.get_tag(3), Some(0xabcd));
    assert_eq!(store.get_payload(3, &mut buf), Some(&b"JFIF...."[..]));

    std::fs::remove_dir_all(base).ok();
}

#[test]
fn test_oversized_payload_never_reads_back_truncated() {
    let registry = registry("oversized");
    let store = registry.instance("video");

    let result = store.put(8, &vec![0xffu8; MAX_PAYLOAD + 1], 8);
    assert!(matches!(result, Err(Error::PayloadTooLarge { .. })));

    let mut buf = vec![0u8; BLOCK_SIZE];
    assert_eq!(store.get_tag(8), None);
    assert_eq!(store.get_payload(8, &mut buf), None);

    std::fs::remove_dir_all(&registry.config().base_dir).ok();
}

#[test]
fn test_legacy_files_removed_on_open() {
    let registry = registry("legacy");
    let base = registry.config().base_dir.clone();
    std::fs::create_dir_all(&base).unwrap();

    let hash = table_hash("images");
    let old_data = base.join(format!(".thumbdata3-{}", hash));
    let old_index = base.join(format!(".thumbindex0-{}", hash));
    std::fs::write(&old_data, vec![0u8; 100]).unwrap();
    std::fs::write(&old_index, vec![0u8; 100]).unwrap();

    assert_eq!(registry.instance("images").get_tag(0), None);
    assert!(!old_data.exists());
    assert!(!old_index.exists());

    std::fs::remove_dir_all(base).ok();
}

#[test]
fn test_cache_regenerates_after_erase() {
    let registry = Arc::new(registry("regen"));
    let cache = ThumbnailCache::new(
        registry.clone(),
        |table: &str, id: u64| -> minithumb::error::Result<Option<Vec<u8>>> {
            Ok(Some(format!("{}#{}", table, id).into_bytes()))
        },
    );

    assert_eq!(
        cache.get_or_generate("images", 5, 1).unwrap(),
        Some(b"images#5".to_vec())
    );
    assert!(registry.instance("images").erase(5).unwrap());
    assert_eq!(registry.instance("images").get_tag(5), None);

    assert_eq!(
        cache.get_or_generate("images", 5, 1).unwrap(),
        Some(b"images#5".to_vec())
    );
    assert_eq!(registry.instance("images").get_tag(5), Some(1));

    std::fs::remove_dir_all(&registry.config().base_dir).ok();
}
