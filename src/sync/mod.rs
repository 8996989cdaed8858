/// Keeping the feed and the cache in line with the store
///
/// - Reconciling single buckets (reconcile.rs)
/// - Listening for store changes (watcher.rs)
/// - Batch delete and rotate (operations.rs)
/// - Lifecycle around a feed (source.rs)

pub mod operations;
pub mod reconcile;
pub mod source;
pub mod watcher;
