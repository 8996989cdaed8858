/// Local media source
///
/// Owns the lifecycle around a shared feed: the initial bulk load, paging
/// items into sets, the change watcher registration and batch operations.
use super::operations::{
    BatchOperation, BatchReport, OperationExecutor, OperationPayload, RotateConsistency,
};
use super::reconcile::{Reconciler, RefreshOutcome};
use super::watcher::{ChangeWatcher, ConsumerState};
use crate::bucket::{bucket_id_for_file, BucketId, WellKnownBuckets};
use crate::cache::service::CacheInvalidation;
use crate::error::{MediaError, Result};
use crate::media::thumbnail::{DiskCache, ThumbnailCaches};
use crate::state::data::{ContentLocator, MediaBucket, MediaItem, Partition, SetSource};
use crate::state::feed::SharedFeed;
use crate::state::library::MediaStore;
use std::ops::Range;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

pub struct LocalMediaSource {
    store: Arc<dyn MediaStore>,
    cache: Arc<dyn CacheInvalidation>,
    thumbnails: ThumbnailCaches,
    reconciler: Arc<Reconciler>,
    executor: OperationExecutor,
    watcher: ChangeWatcher,
    consumer_state: watch::Receiver<ConsumerState>,
    runtime: Handle,
    include_images: bool,
    include_videos: bool,
}

impl LocalMediaSource {
    /// Create a source. Nothing is loaded and no listener runs until
    /// `load_media_sets` is called.
    pub fn new(
        store: Arc<dyn MediaStore>,
        cache: Arc<dyn CacheInvalidation>,
        thumbnails: ThumbnailCaches,
        known: WellKnownBuckets,
        consumer_state: watch::Receiver<ConsumerState>,
        runtime: Handle,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(store.clone(), cache.clone(), known));
        let executor =
            OperationExecutor::new(store.clone(), cache.clone()).with_thumbnails(thumbnails.clone());

        Self {
            store,
            cache,
            thumbnails,
            reconciler,
            executor,
            watcher: ChangeWatcher::default(),
            consumer_state,
            runtime,
            include_images: true,
            include_videos: true,
        }
    }

    pub fn with_rotate_consistency(mut self, consistency: RotateConsistency) -> Self {
        self.executor = self.executor.with_rotate_consistency(consistency);
        self
    }

    pub fn known(&self) -> &WellKnownBuckets {
        self.reconciler.known()
    }

    /// Restrict which partitions later loads read from
    pub fn set_mime_filter(&mut self, disable_images: bool, disable_videos: bool) {
        self.include_images = !disable_images;
        self.include_videos = !disable_videos;
    }

    /// Start loading the feed: drop any previous listeners, bulk load the
    /// sets, then listen for store changes. Returns how many sets were added.
    pub fn load_media_sets(&mut self, feed: &SharedFeed) -> Result<usize> {
        self.stop();

        let added = {
            let mut feed = feed.lock();
            self.cache.load_media_sets(
                &mut feed,
                &SetSource::Local,
                self.include_images,
                self.include_videos,
            )?
        };

        self.watcher = ChangeWatcher::register(
            &self.runtime,
            self.store.as_ref(),
            self.reconciler.clone(),
            feed.clone(),
            self.consumer_state.clone(),
        );
        Ok(added)
    }

    /// Page items of one set into the feed.
    ///
    /// The camera bucket jumps to the front of the feed as soon as it has
    /// items loaded.
    pub fn load_items_for_set(
        &self,
        feed: &SharedFeed,
        set_id: BucketId,
        range: Range<usize>,
    ) -> Result<usize> {
        if range.is_empty() {
            return Ok(0);
        }

        let mut feed = feed.lock();
        let loaded = self.cache.load_media_items(
            &mut feed,
            set_id,
            range,
            self.include_images,
            self.include_videos,
        )?;

        let camera = self.known().camera;
        if set_id == camera && feed.get(camera).is_some_and(|set| set.num_items_loaded > 0) {
            feed.move_to_front(camera);
        }
        Ok(loaded)
    }

    pub fn perform_operation(
        &self,
        feed: &SharedFeed,
        operation: BatchOperation,
        buckets: &mut [MediaBucket],
    ) -> Result<BatchReport> {
        self.executor.perform(feed, operation, buckets)
    }

    pub fn perform_code(
        &self,
        feed: &SharedFeed,
        code: i32,
        payload: OperationPayload,
        buckets: &mut [MediaBucket],
    ) -> Result<BatchReport> {
        self.executor.perform_code(feed, code, payload, buckets)
    }

    /// Reconcile one bucket right away, whatever the consumer is doing
    pub fn refresh(&self, feed: &SharedFeed, bucket_id: BucketId) -> Result<RefreshOutcome> {
        self.reconciler.refresh(feed, bucket_id)
    }

    pub fn is_listening(&self) -> bool {
        self.watcher.is_registered()
    }

    /// Stop listening for store changes. Fine to call when never started.
    pub fn stop(&mut self) {
        self.watcher.unregister();
    }

    /// Tear down on exit. Listeners are only dropped here while the store is
    /// still scanning; otherwise they go away with the source.
    pub fn shutdown(&mut self) {
        if self.store.is_scanning() {
            info!("🛑 Store still scanning, stopping change listeners");
            self.stop();
        } else {
            debug!("Store idle at shutdown");
        }
    }

    /// Build an image item straight from its store row
    pub fn media_item_from_row_id(&self, id: i64) -> Result<Option<MediaItem>> {
        Ok(self
            .store
            .query_by_row_id(Partition::Images, id)?
            .map(|row| MediaItem::from_row(&row)))
    }

    /// Build an image item from a `file://` locator
    pub fn media_item_from_file_uri(&self, uri: &str) -> Result<Option<MediaItem>> {
        let path = match ContentLocator::parse(uri)? {
            ContentLocator::File(path) => path,
            ContentLocator::Content { .. } => {
                return Err(MediaError::invalid_locator(uri, "not a file locator"))
            }
        };

        let row = self.store.query_by_path(
            Partition::Images,
            bucket_id_for_file(&path),
            &path.to_string_lossy(),
        )?;
        Ok(row.map(|row| MediaItem::from_row(&row)))
    }

    /// Thumbnail cache for images
    pub fn thumbnail_cache(&self) -> &DiskCache {
        &self.thumbnails.image
    }
}

impl std::fmt::Debug for LocalMediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaSource")
            .field("include_images", &self.include_images)
            .field("include_videos", &self.include_videos)
            .field("listening", &self.is_listening())
            .finish()
    }
}
