//! Recording doubles for the store and the cache port, shared by unit tests.
use crate::bucket::{bucket_id, BucketId};
use crate::cache::service::CacheInvalidation;
use crate::error::{MediaError, Result};
use crate::state::data::{MediaItem, MediaRow, Partition, SetSource};
use crate::state::feed::MediaFeed;
use crate::state::library::{BucketSummary, MediaStore, SqliteStore, StoreChange};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::ops::Range;
use tokio::sync::broadcast;

/// Mutating store calls, in order
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    UpdateOrientation(String, i32),
    DeleteByBucket(Partition, BucketId),
    DeleteByLocator(String),
    CountByBucket(Partition, BucketId),
}

/// In-memory SQLite store that records mutating calls and can be told to fail
pub struct RecordingStore {
    inner: SqliteStore,
    pub calls: Mutex<Vec<StoreCall>>,
    failing_updates: Mutex<HashSet<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            calls: Mutex::new(Vec::new()),
            failing_updates: Mutex::new(HashSet::new()),
        }
    }

    /// Insert an image row into `folder` and return it as a feed item
    pub fn add(&self, partition: Partition, folder: &str, name: &str, orientation: i32) -> MediaItem {
        let mut row = MediaRow {
            id: 0,
            partition,
            bucket_id: bucket_id(folder),
            bucket_display_name: folder.rsplit('/').next().unwrap().to_string(),
            path: format!("{}/{}", folder, name),
            display_name: name.to_string(),
            mime_type: "image/jpeg".to_string(),
            orientation,
            date_added: 1,
        };
        row.id = self.inner.insert(&row).unwrap().unwrap();
        MediaItem::from_row(&row)
    }

    pub fn fail_updates_for(&self, locator: &str) {
        self.failing_updates.lock().insert(locator.to_string());
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }
}

impl MediaStore for RecordingStore {
    fn query_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<Vec<MediaRow>> {
        self.inner.query_by_bucket(partition, bucket_id)
    }

    fn query_by_row_id(&self, partition: Partition, id: i64) -> Result<Option<MediaRow>> {
        self.inner.query_by_row_id(partition, id)
    }

    fn query_by_path(
        &self,
        partition: Partition,
        bucket_id: BucketId,
        path: &str,
    ) -> Result<Option<MediaRow>> {
        self.inner.query_by_path(partition, bucket_id, path)
    }

    fn bucket_summaries(&self, partition: Partition) -> Result<Vec<BucketSummary>> {
        self.inner.bucket_summaries(partition)
    }

    fn bucket_summary(
        &self,
        partition: Partition,
        bucket_id: BucketId,
    ) -> Result<Option<BucketSummary>> {
        self.inner.bucket_summary(partition, bucket_id)
    }

    fn count_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<usize> {
        self.record(StoreCall::CountByBucket(partition, bucket_id));
        self.inner.count_by_bucket(partition, bucket_id)
    }

    fn insert(&self, row: &MediaRow) -> Result<Option<i64>> {
        self.inner.insert(row)
    }

    fn update_orientation(&self, locator: &str, degrees: i32) -> Result<()> {
        self.record(StoreCall::UpdateOrientation(locator.to_string(), degrees));
        if self.failing_updates.lock().contains(locator) {
            return Err(MediaError::StorePersistence {
                locator: locator.to_string(),
            });
        }
        self.inner.update_orientation(locator, degrees)
    }

    fn delete_by_bucket(&self, partition: Partition, bucket_id: BucketId) -> Result<usize> {
        self.record(StoreCall::DeleteByBucket(partition, bucket_id));
        self.inner.delete_by_bucket(partition, bucket_id)
    }

    fn delete_by_locator(&self, locator: &str) -> Result<usize> {
        self.record(StoreCall::DeleteByLocator(locator.to_string()));
        self.inner.delete_by_locator(locator)
    }

    fn is_scanning(&self) -> bool {
        self.inner.is_scanning()
    }

    fn set_scanning(&self, scanning: bool) {
        self.inner.set_scanning(scanning)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

/// Cache port calls, in order
#[derive(Debug, Clone, PartialEq)]
pub enum CacheCall {
    LoadSets,
    LoadItems(BucketId, Range<usize>),
    MarkDirty,
    MarkBucketDirty(BucketId),
}

/// Cache port double with scripted predicates
#[derive(Default)]
pub struct RecordingCache {
    pub calls: Mutex<Vec<CacheCall>>,
    pub has_items: Mutex<HashSet<BucketId>>,
    pub cached: Mutex<HashSet<BucketId>>,
    /// Make `store_has_items` fail
    pub unreachable: Mutex<bool>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(self, id: BucketId) -> Self {
        self.has_items.lock().insert(id);
        self
    }

    pub fn with_cached(self, id: BucketId) -> Self {
        self.cached.lock().insert(id);
        self
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        self.calls.lock().clone()
    }

    /// Only the dirty-marking calls
    pub fn dirty_calls(&self) -> Vec<CacheCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, CacheCall::MarkDirty | CacheCall::MarkBucketDirty(_)))
            .collect()
    }
}

impl CacheInvalidation for RecordingCache {
    fn load_media_sets(
        &self,
        feed: &mut MediaFeed,
        source: &SetSource,
        _include_images: bool,
        _include_videos: bool,
    ) -> Result<usize> {
        self.calls.lock().push(CacheCall::LoadSets);
        let ids: Vec<BucketId> = self.has_items.lock().iter().copied().collect();
        for id in &ids {
            feed.add_set(*id, source.clone());
        }
        Ok(ids.len())
    }

    fn load_media_items(
        &self,
        feed: &mut MediaFeed,
        set_id: BucketId,
        range: Range<usize>,
        _include_images: bool,
        _include_videos: bool,
    ) -> Result<usize> {
        self.calls.lock().push(CacheCall::LoadItems(set_id, range.clone()));
        let Some(set) = feed.get_mut(set_id) else {
            return Ok(0);
        };
        for id in range.clone() {
            let row = MediaRow {
                id: id as i64 + 1,
                partition: Partition::Images,
                bucket_id: set_id,
                bucket_display_name: String::new(),
                path: format!("/fake/{}.jpg", id),
                display_name: format!("{}.jpg", id),
                mime_type: "image/jpeg".to_string(),
                orientation: 0,
                date_added: 0,
            };
            set.add_item(MediaItem::from_row(&row));
        }
        Ok(range.len())
    }

    fn store_has_items(&self, bucket_id: BucketId) -> Result<bool> {
        if *self.unreachable.lock() {
            return Err(MediaError::Io(std::io::Error::other("store unreachable")));
        }
        Ok(self.has_items.lock().contains(&bucket_id))
    }

    fn is_present_in_cache(&self, bucket_id: BucketId) -> bool {
        self.cached.lock().contains(&bucket_id)
    }

    fn mark_dirty(&self) {
        self.calls.lock().push(CacheCall::MarkDirty);
    }

    fn mark_bucket_dirty(&self, bucket_id: BucketId) {
        self.calls.lock().push(CacheCall::MarkBucketDirty(bucket_id));
    }
}
