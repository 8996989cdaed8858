//! Store change watcher.
//!
//! Listens to the image and video change streams of the store and decides
//! which buckets to reconcile. While the consumer is actively browsing the
//! feed nothing is reconciled; the feed is only touched once the consumer
//! is paused.
//!
//! Events are handled one at a time per stream, in delivery order, with no
//! coalescing of bursts.
use super::reconcile::Reconciler;
use crate::bucket::{BucketId, WellKnownBuckets};
use crate::state::data::MediaSet;
use crate::state::feed::SharedFeed;
use crate::state::library::{MediaStore, StoreChange};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Whether the consumer can have its feed changed under it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerState {
    /// The user is looking at the feed; leave it alone
    #[default]
    Active,
    /// The consumer is paused or in the background; reconciling is safe
    Paused,
}

/// Buckets to reconcile for one change event.
///
/// Both streams refresh the camera and download buckets. Image changes also
/// refresh the set in view when it is local.
pub fn refresh_targets(
    change: StoreChange,
    state: ConsumerState,
    known: &WellKnownBuckets,
    current: Option<&MediaSet>,
) -> Vec<BucketId> {
    if state != ConsumerState::Paused {
        return Vec::new();
    }

    match change {
        StoreChange::Images => {
            let mut targets = vec![known.camera, known.download];
            if let Some(set) = current.filter(|set| set.is_local()) {
                targets.push(set.id);
            }
            targets
        }
        StoreChange::Videos => vec![known.camera, known.download],
    }
}

/// Everything a listener task needs
struct WatchContext {
    reconciler: Arc<Reconciler>,
    feed: SharedFeed,
    state: watch::Receiver<ConsumerState>,
}

/// Registration of the two change listeners.
///
/// Dropping the watcher unregisters it.
#[derive(Debug, Default)]
pub struct ChangeWatcher {
    tasks: Vec<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Subscribe to both change streams of `store`, spawning one listener per stream on `runtime`
    pub fn register(
        runtime: &Handle,
        store: &dyn MediaStore,
        reconciler: Arc<Reconciler>,
        feed: SharedFeed,
        state: watch::Receiver<ConsumerState>,
    ) -> Self {
        let context = Arc::new(WatchContext {
            reconciler,
            feed,
            state,
        });

        let tasks = [StoreChange::Images, StoreChange::Videos]
            .into_iter()
            .map(|stream| runtime.spawn(listen(stream, store.subscribe(), context.clone())))
            .collect();

        debug!("👀 Change watcher registered");
        Self { tasks }
    }

    pub fn is_registered(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Stop both listeners. Safe to call any number of times.
    pub fn unregister(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Change watcher unregistered");
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.unregister();
    }
}

async fn listen(
    stream: StoreChange,
    mut changes: broadcast::Receiver<StoreChange>,
    context: Arc<WatchContext>,
) {
    loop {
        match changes.recv().await {
            Ok(change) if change == stream => {}
            Ok(_) => continue,
            // Missed notifications still mean "something changed"
            Err(RecvError::Lagged(skipped)) => {
                debug!("{:?} listener lagged by {} notifications", stream, skipped);
            }
            Err(RecvError::Closed) => break,
        }

        let state = *context.state.borrow();
        let targets = {
            let feed = context.feed.lock();
            refresh_targets(
                stream,
                state,
                context.reconciler.known(),
                feed.current_set(),
            )
        };
        if targets.is_empty() {
            continue;
        }

        // Reconciliation blocks on the store
        let task_context = context.clone();
        let result = tokio::task::spawn_blocking(move || {
            for bucket_id in targets {
                if let Err(e) = task_context
                    .reconciler
                    .refresh(&task_context.feed, bucket_id)
                {
                    warn!("⚠️  Failed to refresh bucket {}: {}", bucket_id, e);
                }
            }
        })
        .await;

        if let Err(e) = result {
            warn!("⚠️  Refresh task failed: {}", e);
        }
    }
}
