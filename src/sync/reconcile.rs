/// Reconciliation of single buckets against the store
///
/// A refresh never removes a set. Unknown buckets are added when the store
/// has items for them, known buckets are swapped for a fresh set. Creating a
/// set the cache has never seen needs no invalidation; replacing a known set
/// always invalidates that bucket.
use crate::bucket::{BucketId, WellKnownBuckets};
use crate::cache::service::CacheInvalidation;
use crate::error::Result;
use crate::state::data::{Partition, SetSource};
use crate::state::feed::SharedFeed;
use crate::state::library::MediaStore;
use std::sync::Arc;
use tracing::{debug, info};

/// What a refresh did to the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Invalid id, or an unknown bucket with nothing in the store
    Skipped,
    Added,
    Replaced,
}

/// Brings one bucket of the feed back in line with the store
pub struct Reconciler {
    store: Arc<dyn MediaStore>,
    cache: Arc<dyn CacheInvalidation>,
    known: WellKnownBuckets,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MediaStore>,
        cache: Arc<dyn CacheInvalidation>,
        known: WellKnownBuckets,
    ) -> Self {
        Self {
            store,
            cache,
            known,
        }
    }

    pub fn known(&self) -> &WellKnownBuckets {
        &self.known
    }

    /// Reconcile `bucket_id`.
    ///
    /// The feed lock is held for the whole refresh. Every store and cache
    /// read happens before the feed is touched, so an error leaves the feed
    /// exactly as it was.
    pub fn refresh(&self, feed: &SharedFeed, bucket_id: BucketId) -> Result<RefreshOutcome> {
        if !bucket_id.is_valid() {
            return Ok(RefreshOutcome::Skipped);
        }

        let mut feed = feed.lock();
        info!("🔄 Refreshing local bucket {}", bucket_id);
        // Raised for any valid id, even when the bucket turns out to be empty
        feed.mark_needs_refresh();

        let existing_source = feed.get(bucket_id).map(|set| set.source.clone());
        let outcome = match existing_source {
            None => {
                if !self.cache.store_has_items(bucket_id)? {
                    debug!("Bucket {} has no items, not adding it", bucket_id);
                    return Ok(RefreshOutcome::Skipped);
                }
                let (name, count) = self.describe(bucket_id)?;

                let set = feed.add_set(bucket_id, SetSource::Local);
                set.name = name;
                set.set_num_expected_items(count);
                set.generate_title(true);

                if !self.cache.is_present_in_cache(bucket_id) {
                    self.cache.mark_bucket_dirty(bucket_id);
                }
                RefreshOutcome::Added
            }
            Some(source) => {
                let (name, count) = self.describe(bucket_id)?;

                let set = feed.replace_set(bucket_id, source);
                set.name = name;
                set.set_num_expected_items(count);
                set.generate_title(true);

                self.cache.mark_bucket_dirty(bucket_id);
                RefreshOutcome::Replaced
            }
        };

        Ok(outcome)
    }

    /// Display name and item count of a bucket as the store sees it.
    /// Well-known buckets always get their canonical name.
    fn describe(&self, bucket_id: BucketId) -> Result<(String, usize)> {
        let mut count = 0;
        let mut store_name = None;
        for partition in Partition::ALL {
            if let Some(summary) = self.store.bucket_summary(partition, bucket_id)? {
                count += summary.count;
                store_name.get_or_insert(summary.display_name);
            }
        }

        let name = match self.known.canonical_name(bucket_id) {
            Some(canonical) => canonical.to_string(),
            None => store_name.unwrap_or_default(),
        };
        Ok((name, count))
    }
}
