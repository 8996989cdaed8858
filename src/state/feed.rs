/// In-memory feed of media sets
use super::data::{MediaSet, SetSource};
use crate::bucket::BucketId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Feed shared between the change watcher and batch operation callers.
/// Every read or write of the feed goes through this lock.
pub type SharedFeed = Arc<Mutex<MediaFeed>>;

/// Ordered collection of media sets plus the set currently in view.
///
/// Bucket ids are unique within a feed. Reordering (`move_to_front`)
/// only changes display order.
#[derive(Debug, Default)]
pub struct MediaFeed {
    order: Vec<BucketId>,
    sets: HashMap<BucketId, MediaSet>,
    current: Option<BucketId>,
    /// Raised when reconciliation changed the feed behind the consumer's back
    needs_refresh: bool,
}

impl MediaFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedFeed {
        Arc::new(Mutex::new(self))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: BucketId) -> bool {
        self.sets.contains_key(&id)
    }

    pub fn get(&self, id: BucketId) -> Option<&MediaSet> {
        self.sets.get(&id)
    }

    pub fn get_mut(&mut self, id: BucketId) -> Option<&mut MediaSet> {
        self.sets.get_mut(&id)
    }

    /// Sets in display order
    pub fn sets(&self) -> impl Iterator<Item = &MediaSet> {
        self.order.iter().filter_map(|id| self.sets.get(id))
    }

    pub fn ids(&self) -> &[BucketId] {
        &self.order
    }

    /// Append a new shell set. If the id is already known the existing set
    /// is returned untouched.
    pub fn add_set(&mut self, id: BucketId, source: SetSource) -> &mut MediaSet {
        if !self.sets.contains_key(&id) {
            self.order.push(id);
        }
        self.sets
            .entry(id)
            .or_insert_with(|| MediaSet::new(id, source))
    }

    /// Swap in a fresh shell set with the same id at the same position.
    /// Falls back to appending when the id is unknown.
    pub fn replace_set(&mut self, id: BucketId, source: SetSource) -> &mut MediaSet {
        if !self.sets.contains_key(&id) {
            self.order.push(id);
        }
        let slot = self
            .sets
            .entry(id)
            .or_insert_with(|| MediaSet::new(id, source.clone()));
        *slot = MediaSet::new(id, source);
        slot
    }

    pub fn remove_set(&mut self, id: BucketId) -> Option<MediaSet> {
        let removed = self.sets.remove(&id)?;
        self.order.retain(|other| *other != id);
        if self.current == Some(id) {
            self.current = None;
        }
        Some(removed)
    }

    pub fn move_to_front(&mut self, id: BucketId) {
        if let Some(pos) = self.order.iter().position(|other| *other == id) {
            let id = self.order.remove(pos);
            self.order.insert(0, id);
        }
    }

    pub fn mark_needs_refresh(&mut self) {
        self.needs_refresh = true;
    }

    /// Read and clear the refresh flag
    pub fn take_needs_refresh(&mut self) -> bool {
        std::mem::take(&mut self.needs_refresh)
    }

    pub fn current_set(&self) -> Option<&MediaSet> {
        self.current.and_then(|id| self.sets.get(&id))
    }

    /// Mark a set as the one in view. Unknown ids clear the selection.
    pub fn set_current(&mut self, id: Option<BucketId>) {
        self.current = id.filter(|id| self.sets.contains_key(id));
    }
}
