/// Batch operations on media buckets
///
/// Each operation kind has its own handler and its own payload:
/// - Delete: whole buckets or selected items, removed from the store,
///   the feed and the thumbnail caches
/// - Rotate: every selected item turned by the same angle, best effort per item
use crate::bucket::BucketId;
use crate::cache::service::CacheInvalidation;
use crate::error::{MediaError, Result};
use crate::media::orientation::{degrees_to_exif, normalize_degrees, write_orientation};
use crate::media::thumbnail::ThumbnailCaches;
use crate::state::data::{ContentLocator, MediaBucket, MediaItem, Partition};
use crate::state::feed::SharedFeed;
use crate::state::library::MediaStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Numeric code of the delete operation
pub const OPERATION_DELETE: i32 = 1;
/// Numeric code of the rotate operation
pub const OPERATION_ROTATE: i32 = 2;

/// Payload accompanying a numeric operation code
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperationPayload {
    None,
    Degrees(f32),
}

/// A batch operation with its typed payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchOperation {
    Delete,
    /// Rotate by this many degrees, applied to every listed item
    Rotate { degrees: f32 },
}

impl BatchOperation {
    /// Decode a numeric operation code.
    ///
    /// Unknown codes decode to `None`. A known code with the wrong payload
    /// is an `InvalidPayload` error.
    pub fn from_code(code: i32, payload: OperationPayload) -> Result<Option<Self>> {
        match code {
            OPERATION_DELETE => Ok(Some(BatchOperation::Delete)),
            OPERATION_ROTATE => match payload {
                OperationPayload::Degrees(degrees) => {
                    RotateHandler::validate(degrees)?;
                    Ok(Some(BatchOperation::Rotate { degrees }))
                }
                OperationPayload::None => Err(MediaError::InvalidPayload(
                    "rotate needs an angle in degrees".to_string(),
                )),
            },
            _ => Ok(None),
        }
    }
}

/// How the in-memory rotation follows the store when a rotate step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateConsistency {
    /// Any failure (store or orientation tag) leaves the item's rotation
    /// untouched, even when the store update already went through
    #[default]
    Compatible,
    /// Once the store accepted the new orientation the item follows it;
    /// a failed tag write is only reported
    StoreAuthoritative,
}

/// Which step of a rotate failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Store,
    OrientationTag,
}

/// One item that could not be fully rotated
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub item_id: i64,
    pub content_uri: String,
    pub stage: FailureStage,
    pub reason: String,
}

/// Outcome of a batch. Getting one back means the batch as a whole succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub deleted_rows: usize,
    pub rotated_items: usize,
    pub failures: Vec<ItemFailure>,
}

/// Shared collaborators of the handlers
struct OperationContext<'a> {
    store: &'a dyn MediaStore,
    cache: &'a dyn CacheInvalidation,
    thumbnails: Option<&'a ThumbnailCaches>,
}

impl OperationContext<'_> {
    fn drop_thumbnail(&self, item: &MediaItem) {
        if let Some(thumbnails) = self.thumbnails {
            if let Err(e) = thumbnails.for_partition(item.partition).remove(item.id) {
                debug!("Could not drop thumbnail of item {}: {}", item.id, e);
            }
        }
    }
}

/// One handler per operation kind
trait BatchHandler {
    fn apply(
        &self,
        ctx: &OperationContext<'_>,
        feed: &SharedFeed,
        buckets: &mut [MediaBucket],
    ) -> Result<BatchReport>;
}

struct DeleteHandler;

impl DeleteHandler {
    fn delete_bucket(
        &self,
        ctx: &OperationContext<'_>,
        feed: &SharedFeed,
        set_id: BucketId,
        report: &mut BatchReport,
    ) -> Result<()> {
        for partition in Partition::ALL {
            report.deleted_rows += ctx.store.delete_by_bucket(partition, set_id)?;
        }

        if let Some(removed) = feed.lock().remove_set(set_id) {
            for item in removed.items() {
                ctx.drop_thumbnail(item);
            }
        }

        // Which bucket went away is not kept, so everything is stale
        ctx.cache.mark_dirty();
        info!("🗑️  Deleted bucket {}", set_id);
        Ok(())
    }

    fn delete_items(
        &self,
        ctx: &OperationContext<'_>,
        feed: &SharedFeed,
        set_id: BucketId,
        items: &[MediaItem],
        report: &mut BatchReport,
    ) -> Result<()> {
        for item in items {
            report.deleted_rows += ctx.store.delete_by_locator(&item.content_uri)?;
            ctx.drop_thumbnail(item);
        }

        let mut expected = 0;
        for partition in Partition::ALL {
            expected += ctx.store.count_by_bucket(partition, set_id)?;
        }

        {
            let mut feed = feed.lock();
            if let Some(set) = feed.get_mut(set_id) {
                let ids: Vec<i64> = items.iter().map(|item| item.id).collect();
                set.remove_items(&ids);
                set.set_num_expected_items(expected);
                set.generate_title(true);
            }
        }

        ctx.cache.mark_bucket_dirty(set_id);
        info!("🗑️  Deleted {} items from bucket {}", items.len(), set_id);
        Ok(())
    }
}

impl BatchHandler for DeleteHandler {
    fn apply(
        &self,
        ctx: &OperationContext<'_>,
        feed: &SharedFeed,
        buckets: &mut [MediaBucket],
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for bucket in buckets.iter() {
            match &bucket.items {
                None => self.delete_bucket(ctx, feed, bucket.set, &mut report)?,
                Some(items) => self.delete_items(ctx, feed, bucket.set, items, &mut report)?,
            }
        }
        Ok(report)
    }
}

struct RotateHandler {
    degrees: f32,
    consistency: RotateConsistency,
}

impl RotateHandler {
    fn validate(degrees: f32) -> Result<()> {
        if degrees.is_finite() {
            Ok(())
        } else {
            Err(MediaError::InvalidPayload(format!(
                "rotation angle must be finite, got {}",
                degrees
            )))
        }
    }

    /// Rotate one item. On success returns the new rotation, which has already
    /// been written to `item`.
    fn rotate_item(
        &self,
        ctx: &OperationContext<'_>,
        item: &mut MediaItem,
    ) -> std::result::Result<f32, ItemFailure> {
        let failure = |stage, e: MediaError| ItemFailure {
            item_id: item.id,
            content_uri: item.content_uri.clone(),
            stage,
            reason: e.to_string(),
        };

        // Stored orientations are whole degrees
        let rotation = normalize_degrees(item.rotation.trunc() + self.degrees);

        ctx.store
            .update_orientation(&item.content_uri, rotation as i32)
            .map_err(|e| failure(FailureStage::Store, e))?;

        let tag_result = item.locator().and_then(|locator| match locator {
            ContentLocator::File(path) => write_orientation(&path, degrees_to_exif(rotation)),
            ContentLocator::Content { .. } => Ok(()),
        });
        let tag_failure = tag_result
            .err()
            .map(|e| failure(FailureStage::OrientationTag, e));

        match (tag_failure, self.consistency) {
            (Some(failure), RotateConsistency::Compatible) => Err(failure),
            (tag_failure, _) => {
                ctx.cache.mark_bucket_dirty(item.parent_set);
                ctx.drop_thumbnail(item);
                item.rotation = rotation;
                match tag_failure {
                    Some(failure) => Err(failure),
                    None => Ok(rotation),
                }
            }
        }
    }
}

impl BatchHandler for RotateHandler {
    fn apply(
        &self,
        ctx: &OperationContext<'_>,
        feed: &SharedFeed,
        buckets: &mut [MediaBucket],
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        if self.degrees == 0.0 {
            return Ok(report);
        }

        for bucket in buckets.iter_mut() {
            let Some(items) = bucket.items.as_mut() else {
                continue;
            };

            for item in items.iter_mut() {
                let before = item.rotation;
                match self.rotate_item(ctx, item) {
                    Ok(_) => report.rotated_items += 1,
                    Err(failure) => {
                        warn!(
                            "⚠️  Could not rotate item {} ({:?}): {}",
                            failure.item_id, failure.stage, failure.reason
                        );
                        report.failures.push(failure);
                    }
                }

                // Mirror whatever the item ended up with into the feed's copy
                if item.rotation != before {
                    let mut feed = feed.lock();
                    if let Some(shown) = feed
                        .get_mut(item.parent_set)
                        .and_then(|set| set.item_mut(item.id))
                    {
                        shown.rotation = item.rotation;
                    }
                }
            }
        }

        debug!(
            "Rotated {} items by {}°, {} failures",
            report.rotated_items,
            self.degrees,
            report.failures.len()
        );
        Ok(report)
    }
}

/// Applies batch operations to the store, the cache and the feed
pub struct OperationExecutor {
    store: Arc<dyn MediaStore>,
    cache: Arc<dyn CacheInvalidation>,
    thumbnails: Option<ThumbnailCaches>,
    consistency: RotateConsistency,
}

impl OperationExecutor {
    pub fn new(store: Arc<dyn MediaStore>, cache: Arc<dyn CacheInvalidation>) -> Self {
        Self {
            store,
            cache,
            thumbnails: None,
            consistency: RotateConsistency::default(),
        }
    }

    /// Also drop thumbnails of deleted and rotated items
    pub fn with_thumbnails(mut self, thumbnails: ThumbnailCaches) -> Self {
        self.thumbnails = Some(thumbnails);
        self
    }

    pub fn with_rotate_consistency(mut self, consistency: RotateConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Run `operation` over `buckets`, in order.
    ///
    /// Delete failures abort the batch with an error. Rotate failures are
    /// reported per item and never stop the batch. Items in `buckets` are
    /// updated in place.
    pub fn perform(
        &self,
        feed: &SharedFeed,
        operation: BatchOperation,
        buckets: &mut [MediaBucket],
    ) -> Result<BatchReport> {
        let ctx = OperationContext {
            store: self.store.as_ref(),
            cache: self.cache.as_ref(),
            thumbnails: self.thumbnails.as_ref(),
        };

        match operation {
            BatchOperation::Delete => DeleteHandler.apply(&ctx, feed, buckets),
            BatchOperation::Rotate { degrees } => {
                RotateHandler::validate(degrees)?;
                RotateHandler {
                    degrees,
                    consistency: self.consistency,
                }
                .apply(&ctx, feed, buckets)
            }
        }
    }

    /// Run an operation given by numeric code. Unknown codes do nothing and succeed.
    pub fn perform_code(
        &self,
        feed: &SharedFeed,
        code: i32,
        payload: OperationPayload,
        buckets: &mut [MediaBucket],
    ) -> Result<BatchReport> {
        match BatchOperation::from_code(code, payload)? {
            Some(operation) => self.perform(feed, operation, buckets),
            None => {
                debug!("Ignoring unknown operation code {}", code);
                Ok(BatchReport::default())
            }
        }
    }
}
