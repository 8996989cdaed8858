//! Media feed synchronization
//!
//! Keeps an in-memory feed of media buckets and its derived disk cache in
//! line with an authoritative media store: reconciling buckets when the
//! store changes and applying batch delete and rotate operations.

pub mod bucket;
pub mod cache;
pub mod config;
pub mod error;
pub mod media;
pub mod state;
pub mod sync;

#[cfg(test)]
mod testing;

pub use bucket::{bucket_id, BucketId, WellKnownBuckets};
pub use config::FeedConfig;
pub use error::{MediaError, Result};
pub use state::feed::{MediaFeed, SharedFeed};
pub use sync::operations::{BatchOperation, BatchReport, RotateConsistency};
pub use sync::source::LocalMediaSource;
pub use sync::watcher::ConsumerState;
