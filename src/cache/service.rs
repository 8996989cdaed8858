/// Derived cache of bucket metadata
///
/// The cache remembers, per bucket, what the store looked like the last time
/// it was read. Anything marked dirty is re-read from the store the next time
/// the feed is loaded. The index is a small JSON file next to the thumbnail
/// caches.
use crate::bucket::BucketId;
use crate::error::Result;
use crate::state::data::{MediaItem, Partition, SetSource};
use crate::state::feed::MediaFeed;
use crate::state::library::MediaStore;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of the bucket index inside the cache root
pub const INDEX_FILE: &str = "bucket-index.json";

/// The cache invalidation port used by the sync layer.
///
/// Implementations must tolerate concurrent dirty marking from the change
/// watcher and from batch operations.
pub trait CacheInvalidation: Send + Sync {
    /// Populate `feed` with one shell set per known bucket, returns how many were added
    fn load_media_sets(
        &self,
        feed: &mut MediaFeed,
        source: &SetSource,
        include_images: bool,
        include_videos: bool,
    ) -> Result<usize>;

    /// Load items `range` (newest first) of a set into the feed, returns how many were added
    fn load_media_items(
        &self,
        feed: &mut MediaFeed,
        set_id: BucketId,
        range: Range<usize>,
        include_images: bool,
        include_videos: bool,
    ) -> Result<usize>;

    /// Whether the store holds at least one row in this bucket
    fn store_has_items(&self, bucket_id: BucketId) -> Result<bool>;

    fn is_present_in_cache(&self, bucket_id: BucketId) -> bool;

    /// Everything cached is stale
    fn mark_dirty(&self);

    /// One bucket is stale
    fn mark_bucket_dirty(&self, bucket_id: BucketId);
}

/// What the cache knows about one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBucket {
    pub display_name: String,
    pub image_count: usize,
    pub video_count: usize,
    pub latest: i64,
}

impl CachedBucket {
    fn count(&self, include_images: bool, include_videos: bool) -> usize {
        let mut count = 0;
        if include_images {
            count += self.image_count;
        }
        if include_videos {
            count += self.video_count;
        }
        count
    }
}

/// On-disk form of the cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheIndex {
    /// Whole cache must be rebuilt
    pub all_dirty: bool,
    pub buckets: BTreeMap<BucketId, CachedBucket>,
    pub dirty: BTreeSet<BucketId>,
}

/// Cache service backed by the media store and a JSON index
pub struct CacheService {
    store: Arc<dyn MediaStore>,
    index_path: PathBuf,
    index: Mutex<CacheIndex>,
}

impl CacheService {
    /// Open the cache rooted at `root`, reading the index if one exists
    pub fn open(store: Arc<dyn MediaStore>, root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let index_path = root.join(INDEX_FILE);

        let index = if index_path.exists() {
            match serde_json::from_str(&std::fs::read_to_string(&index_path)?) {
                Ok(index) => index,
                Err(e) => {
                    // A corrupt index is just a cold cache
                    warn!("⚠️  Discarding unreadable cache index {}: {}", index_path.display(), e);
                    CacheIndex {
                        all_dirty: true,
                        ..CacheIndex::default()
                    }
                }
            }
        } else {
            CacheIndex {
                all_dirty: true,
                ..CacheIndex::default()
            }
        };

        Ok(Self {
            store,
            index_path,
            index: Mutex::new(index),
        })
    }

    /// Snapshot of the current index
    pub fn index(&self) -> CacheIndex {
        self.index.lock().clone()
    }

    fn save(&self, index: &CacheIndex) -> Result<()> {
        let json = serde_json::to_string_pretty(index)?;
        std::fs::write(&self.index_path, json)?;
        Ok(())
    }

    fn save_or_warn(&self, index: &CacheIndex) {
        if let Err(e) = self.save(index) {
            warn!("⚠️  Failed to persist cache index: {}", e);
        }
    }

    /// Re-read one bucket from the store, `None` when it is empty
    fn read_bucket(&self, bucket_id: BucketId) -> Result<Option<CachedBucket>> {
        let mut bucket: Option<CachedBucket> = None;
        for partition in Partition::ALL {
            let Some(summary) = self.store.bucket_summary(partition, bucket_id)? else {
                continue;
            };
            let entry = bucket.get_or_insert_with(|| CachedBucket {
                display_name: summary.display_name.clone(),
                image_count: 0,
                video_count: 0,
                latest: summary.latest,
            });
            entry.latest = entry.latest.max(summary.latest);
            match partition {
                Partition::Images => entry.image_count = summary.count,
                Partition::Videos => entry.video_count = summary.count,
            }
        }
        Ok(bucket)
    }

    /// Bring stale parts of the index up to date with the store
    pub fn rebuild_dirty(&self) -> Result<()> {
        let mut index = self.index.lock();

        if index.all_dirty {
            let mut buckets: BTreeMap<BucketId, CachedBucket> = BTreeMap::new();
            for partition in Partition::ALL {
                for summary in self.store.bucket_summaries(partition)? {
                    let entry = buckets.entry(summary.bucket_id).or_insert_with(|| CachedBucket {
                        display_name: summary.display_name.clone(),
                        image_count: 0,
                        video_count: 0,
                        latest: summary.latest,
                    });
                    entry.latest = entry.latest.max(summary.latest);
                    match partition {
                        Partition::Images => entry.image_count = summary.count,
                        Partition::Videos => entry.video_count = summary.count,
                    }
                }
            }
            info!("🔄 Rebuilt cache index: {} buckets", buckets.len());
            index.buckets = buckets;
            index.all_dirty = false;
            index.dirty.clear();
        } else {
            let dirty: Vec<BucketId> = index.dirty.iter().copied().collect();
            for bucket_id in dirty {
                match self.read_bucket(bucket_id)? {
                    Some(bucket) => index.buckets.insert(bucket_id, bucket),
                    None => index.buckets.remove(&bucket_id),
                };
                index.dirty.remove(&bucket_id);
            }
        }

        self.save(&index)
    }
}

impl CacheInvalidation for CacheService {
    fn load_media_sets(
        &self,
        feed: &mut MediaFeed,
        source: &SetSource,
        include_images: bool,
        include_videos: bool,
    ) -> Result<usize> {
        self.rebuild_dirty()?;
        let index = self.index.lock();

        let mut buckets: Vec<(&BucketId, &CachedBucket)> = index
            .buckets
            .iter()
            .filter(|(_, bucket)| bucket.count(include_images, include_videos) > 0)
            .collect();
        buckets.sort_by(|a, b| b.1.latest.cmp(&a.1.latest).then(a.0.cmp(b.0)));

        let mut added = 0;
        for (id, bucket) in buckets {
            if feed.contains(*id) {
                continue;
            }
            let set = feed.add_set(*id, source.clone());
            set.name = bucket.display_name.clone();
            set.set_num_expected_items(bucket.count(include_images, include_videos));
            set.generate_title(true);
            added += 1;
        }

        info!("📚 Loaded {} media sets", added);
        Ok(added)
    }

    fn load_media_items(
        &self,
        feed: &mut MediaFeed,
        set_id: BucketId,
        range: Range<usize>,
        include_images: bool,
        include_videos: bool,
    ) -> Result<usize> {
        if range.is_empty() || !feed.contains(set_id) {
            return Ok(0);
        }

        let mut rows = Vec::new();
        for partition in Partition::selected(include_images, include_videos) {
            rows.extend(self.store.query_by_bucket(partition, set_id)?);
        }
        rows.sort_by(|a, b| b.date_added.cmp(&a.date_added).then(b.id.cmp(&a.id)));
        let total = rows.len();

        let Some(set) = feed.get_mut(set_id) else {
            return Ok(0);
        };
        let mut added = 0;
        for row in rows.iter().skip(range.start).take(range.len()) {
            set.add_item(MediaItem::from_row(row));
            added += 1;
        }
        set.set_num_expected_items(total);

        debug!("Loaded {} items into bucket {}", added, set_id);
        Ok(added)
    }

    fn store_has_items(&self, bucket_id: BucketId) -> Result<bool> {
        for partition in Partition::ALL {
            if self.store.count_by_bucket(partition, bucket_id)? > 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn is_present_in_cache(&self, bucket_id: BucketId) -> bool {
        self.index.lock().buckets.contains_key(&bucket_id)
    }

    fn mark_dirty(&self) {
        let mut index = self.index.lock();
        index.all_dirty = true;
        debug!("Cache marked dirty");
        self.save_or_warn(&index);
    }

    fn mark_bucket_dirty(&self, bucket_id: BucketId) {
        let mut index = self.index.lock();
        index.dirty.insert(bucket_id);
        debug!("Cache marked dirty for bucket {}", bucket_id);
        self.save_or_warn(&index);
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("index_path", &self.index_path)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::bucket_id;
    use crate::state::data::MediaRow;
    use crate::state::library::SqliteStore;

    fn insert(store: &SqliteStore, partition: Partition, folder: &str, name: &str, date: i64) {
        store
            .insert(&MediaRow {
                id: 0,
                partition,
                bucket_id: bucket_id(folder),
                bucket_display_name: folder.rsplit('/').next().unwrap().to_string(),
                path: format!("{}/{}", folder, name),
                display_name: name.to_string(),
                mime_type: "image/jpeg".to_string(),
                orientation: 0,
                date_added: date,
            })
            .unwrap();
    }

    fn setup() -> (tempfile::TempDir, Arc<SqliteStore>, CacheService) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let cache = CacheService::open(store.clone(), dir.path()).unwrap();
        (dir, store, cache)
    }

    #[test]
    fn test_cold_cache_loads_sets_from_store() {
        let (_dir, store, cache) = setup();
        insert(&store, Partition::Images, "/sdcard/a", "1.jpg", 1);
        insert(&store, Partition::Videos, "/sdcard/b", "2.mp4", 5);
        insert(&store, Partition::Images, "/sdcard/b", "3.jpg", 4);

        let mut feed = MediaFeed::new();
        let added = cache.load_media_sets(&mut feed, &SetSource::Local, true, true).unwrap();
        assert_eq!(added, 2);
        // Newest bucket first
        assert_eq!(feed.ids()[0], bucket_id("/sdcard/b"));
        assert_eq!(feed.get(bucket_id("/sdcard/b")).unwrap().num_expected_items, 2);
        assert!(cache.is_present_in_cache(bucket_id("/sdcard/a")));
    }

    #[test]
    fn test_mime_filter_hides_video_only_buckets() {
        let (_dir, store, cache) = setup();
        insert(&store, Partition::Videos, "/sdcard/movies", "1.mp4", 1);

        let mut feed = MediaFeed::new();
        cache.load_media_sets(&mut feed, &SetSource::Local, true, false).unwrap();
        assert!(feed.is_empty());
    }

    #[test]
    fn test_dirty_bucket_is_reread() {
        let (_dir, store, cache) = setup();
        insert(&store, Partition::Images, "/sdcard/a", "1.jpg", 1);
        cache.rebuild_dirty().unwrap();
        assert_eq!(cache.index().buckets[&bucket_id("/sdcard/a")].image_count, 1);

        insert(&store, Partition::Images, "/sdcard/a", "2.jpg", 2);
        // Not dirty yet: the cache still has the old count
        cache.rebuild_dirty().unwrap();
        assert_eq!(cache.index().buckets[&bucket_id("/sdcard/a")].image_count, 1);

        cache.mark_bucket_dirty(bucket_id("/sdcard/a"));
        cache.rebuild_dirty().unwrap();
        assert_eq!(cache.index().buckets[&bucket_id("/sdcard/a")].image_count, 2);
        assert!(cache.index().dirty.is_empty());
    }

    #[test]
    fn test_emptied_bucket_leaves_the_index() {
        let (_dir, store, cache) = setup();
        insert(&store, Partition::Images, "/sdcard/a", "1.jpg", 1);
        cache.rebuild_dirty().unwrap();

        store.delete_by_bucket(Partition::Images, bucket_id("/sdcard/a")).unwrap();
        cache.mark_bucket_dirty(bucket_id("/sdcard/a"));
        cache.rebuild_dirty().unwrap();
        assert!(!cache.is_present_in_cache(bucket_id("/sdcard/a")));
    }

    #[test]
    fn test_index_survives_reopen() {
        let (dir, store, cache) = setup();
        insert(&store, Partition::Images, "/sdcard/a", "1.jpg", 1);
        cache.rebuild_dirty().unwrap();
        cache.mark_bucket_dirty(BucketId(77));

        let reopened = CacheService::open(store.clone(), dir.path()).unwrap();
        assert_eq!(reopened.index(), cache.index());
        assert!(reopened.index().dirty.contains(&BucketId(77)));
    }

    #[test]
    fn test_corrupt_index_is_a_cold_cache() {
        let (dir, store, _cache) = setup();
        std::fs::write(dir.path().join(INDEX_FILE), b"{ not json").unwrap();
        let cache = CacheService::open(store, dir.path()).unwrap();
        assert!(cache.index().all_dirty);
    }

    #[test]
    fn test_load_items_range() {
        let (_dir, store, cache) = setup();
        for i in 0..5 {
            insert(&store, Partition::Images, "/sdcard/a", &format!("{}.jpg", i), i);
        }
        let id = bucket_id("/sdcard/a");
        let mut feed = MediaFeed::new();
        cache.load_media_sets(&mut feed, &SetSource::Local, true, true).unwrap();

        assert_eq!(cache.load_media_items(&mut feed, id, 0..2, true, true).unwrap(), 2);
        let set = feed.get(id).unwrap();
        assert_eq!(set.items()[0].display_name, "4.jpg");
        assert_eq!(set.num_items_loaded, 2);
        assert_eq!(set.num_expected_items, 5);

        assert_eq!(cache.load_media_items(&mut feed, id, 3..3, true, true).unwrap(), 0);
        assert_eq!(cache.load_media_items(&mut feed, BucketId(1), 0..2, true, true).unwrap(), 0);
    }

    #[test]
    fn test_store_has_items() {
        let (_dir, store, cache) = setup();
        insert(&store, Partition::Videos, "/sdcard/v", "1.mp4", 1);
        assert!(cache.store_has_items(bucket_id("/sdcard/v")).unwrap());
        assert!(!cache.store_has_items(bucket_id("/sdcard/none")).unwrap());
    }
}
