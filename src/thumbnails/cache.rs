//! In-memory preview cache with strict LRU eviction.
//!
//! - Keyed by content identity: xxhash of (path + mtime + size), so a file
//!   overwritten with new content misses automatically.
//! - Bounded by entry count; every `put` evicts from the least-recently-used
//!   end until the bound holds again.
//! - Owned by the engine's event loop. It is never touched from a worker
//!   thread, so it carries no lock.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use lru::LruCache;
use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use crate::models::PreviewImage;

/// Bump when preview generation semantics change.
const PREVIEW_CACHE_VERSION: u8 = 1;

/// Marker mixed into keys whose metadata could not be read.
const PATH_ONLY_MARKER: u8 = 0xff;

/// Cache key for preview lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Hash of path + mtime + size (or path alone, see `path_only`).
    hash: u64,
    /// Set when the key degraded to path-only identity.
    path_only: bool,
    /// Original path for debugging.
    #[cfg(debug_assertions)]
    path: PathBuf,
}

impl CacheKey {
    /// Create a key from known file metadata.
    pub fn new(path: &Path, mtime: i64, size: u64) -> Self {
        let path_str = path.to_string_lossy();
        let mut data = Vec::with_capacity(path_str.len() + 17);
        data.push(PREVIEW_CACHE_VERSION);
        data.extend_from_slice(path_str.as_bytes());
        data.extend_from_slice(&mtime.to_le_bytes());
        data.extend_from_slice(&size.to_le_bytes());
        Self::from_parts(path, xxh3_64(&data), false)
    }

    /// Key carrying only the path. Content changes are invisible to it.
    pub fn path_only(path: &Path) -> Self {
        let path_str = path.to_string_lossy();
        let mut data = Vec::with_capacity(path_str.len() + 2);
        data.push(PREVIEW_CACHE_VERSION);
        data.push(PATH_ONLY_MARKER);
        data.extend_from_slice(path_str.as_bytes());
        Self::from_parts(path, xxh3_64(&data), true)
    }

    /// Stat the file and derive its content-identity key, degrading to a
    /// path-only key when metadata is unavailable.
    pub fn for_file(path: &Path) -> Self {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) => {
                trace!(?path, error = %e, "No metadata, using path-only cache key");
                return Self::path_only(path);
            }
        };

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);

        Self::new(path, mtime, metadata.len())
    }

    #[allow(unused_variables)]
    fn from_parts(path: &Path, hash: u64, path_only: bool) -> Self {
        Self {
            hash,
            path_only,
            #[cfg(debug_assertions)]
            path: path.to_path_buf(),
        }
    }

    pub fn is_path_only(&self) -> bool {
        self.path_only
    }
}

/// Bounded LRU store of decoded previews.
pub struct PreviewCache {
    entries: LruCache<CacheKey, PreviewImage>,
    max_entries: usize,
}

impl PreviewCache {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        debug!(max_entries = capacity.get(), "Initialized preview cache");
        Self {
            entries: LruCache::new(capacity),
            max_entries: capacity.get(),
        }
    }

    /// Look up a preview and promote it to most-recently-used.
    pub fn get(&mut self, key: &CacheKey) -> Option<PreviewImage> {
        self.entries.get(key).cloned()
    }

    /// Insert or replace a preview as most-recently-used, evicting from the
    /// least-recently-used end while over the bound. Returns whether another
    /// entry was evicted to make room.
    pub fn put(&mut self, key: CacheKey, preview: PreviewImage) -> bool {
        let evicted = match self.entries.push(key.clone(), preview) {
            Some((old_key, _old)) => old_key != key,
            None => false,
        };
        if evicted {
            trace!(entries = self.entries.len(), "Evicted preview from cache");
        }
        debug_assert!(self.entries.len() <= self.max_entries);
        evicted
    }

    /// Membership test that does not touch recency.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        debug!("Cleared preview cache");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn preview() -> PreviewImage {
        PreviewImage::new(RgbaImage::new(2, 2))
    }

    fn key(i: usize) -> CacheKey {
        CacheKey::new(Path::new(&format!("/test/{i}.jpg")), 1_700_000_000, 1024)
    }

    #[test]
    fn test_cache_key_hash() {
        let key1 = CacheKey::new(Path::new("/test/image.jpg"), 1234567890, 1024);
        let key2 = CacheKey::new(Path::new("/test/image.jpg"), 1234567890, 1024);
        let key3 = CacheKey::new(Path::new("/test/image.jpg"), 1234567891, 1024);
        let key4 = CacheKey::new(Path::new("/test/image.jpg"), 1234567890, 2048);

        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
        assert_ne!(key1, key4);
    }

    #[test]
    fn test_missing_file_degrades_to_path_only() {
        let path = Path::new("/definitely/not/here.png");
        let key = CacheKey::for_file(path);
        assert!(key.is_path_only());
        assert_eq!(key, CacheKey::path_only(path));
    }

    #[test]
    fn test_for_file_tracks_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"one").unwrap();
        let before = CacheKey::for_file(&path);
        assert!(!before.is_path_only());
        assert_eq!(before, CacheKey::for_file(&path));

        std::fs::write(&path, b"longer content").unwrap();
        assert_ne!(before, CacheKey::for_file(&path));
    }

    #[test]
    fn test_bound_holds_after_every_put() {
        let mut cache = PreviewCache::new(8);
        let mut evictions = 0;
        for i in 0..50 {
            if cache.put(key(i), preview()) {
                evictions += 1;
            }
            assert!(cache.len() <= 8);
        }
        assert_eq!(evictions, 42);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = PreviewCache::new(256);
        for i in 1..=256 {
            cache.put(key(i), preview());
        }
        cache.put(key(257), preview());

        assert_eq!(cache.len(), 256);
        assert!(!cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
        assert!(cache.contains(&key(257)));
    }

    #[test]
    fn test_get_promotes_entry() {
        let mut cache = PreviewCache::new(256);
        for i in 1..=256 {
            cache.put(key(i), preview());
        }
        assert!(cache.get(&key(1)).is_some());
        cache.put(key(257), preview());

        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
    }

    #[test]
    fn test_get_hands_out_shared_handle() {
        let mut cache = PreviewCache::new(4);
        assert!(cache.get(&key(1)).is_none());
        let stored = preview();
        cache.put(key(1), stored.clone());
        assert!(cache.get(&key(1)).unwrap().same_image(&stored));
    }

    #[test]
    fn test_replace_releases_old_handle() {
        let mut cache = PreviewCache::new(4);
        let old = preview();
        cache.put(key(1), old.clone());
        assert_eq!(old.holders(), 2);

        let new = preview();
        assert!(!cache.put(key(1), new.clone()));
        assert_eq!(old.holders(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(1)).unwrap().same_image(&new));
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut cache = PreviewCache::new(4);
        cache.put(key(1), preview());
        cache.put(key(2), preview());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamps_to_one() {
        let mut cache = PreviewCache::new(0);
        assert_eq!(cache.max_entries(), 1);
        cache.put(key(1), preview());
        cache.put(key(2), preview());
        assert_eq!(cache.len(), 1);
    }
}
