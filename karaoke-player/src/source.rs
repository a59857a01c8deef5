//! Track source: the queue collaborator consumed by the playback core
//!
//! The core never owns the queue. It reads the cursor and upcoming entries,
//! reports which track became Active, and asks the source to remember
//! session-unplayable tracks. Queue mutations are announced through
//! registered callbacks.
//!
//! `PlayQueue` is the in-memory implementation used by the runner and tests.

use karaoke_common::{MediaHandle, MediaId};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Callback invoked after every queue mutation
pub type QueueChangedCallback = Arc<dyn Fn() + Send + Sync>;

/// Queue interface consumed by the playback core
///
/// Implementations are shared between the core task and whatever edits the
/// queue, so every method takes `&self`.
pub trait TrackSource: Send + Sync {
    /// Track most recently committed as Active
    fn current_cursor(&self) -> Option<MediaId>;

    /// First entry after the cursor that is not in `excluding` and not unplayable
    fn peek_next(&self, excluding: &HashSet<MediaId>) -> Option<MediaHandle>;

    /// Snapshot of the full queue in play order
    fn entries(&self) -> Vec<MediaHandle>;

    /// Report that `id` became the Active track; moves the cursor
    fn commit(&self, id: MediaId);

    /// Remember `id` as unplayable for this session
    fn mark_unplayable(&self, id: MediaId);

    /// Register a callback for queue mutations
    fn on_queue_changed(&self, callback: QueueChangedCallback);
}

#[derive(Default)]
struct QueueInner {
    entries: Vec<MediaHandle>,

    /// Index where peeking starts (one past the committed entry)
    next_index: usize,

    current: Option<MediaId>,
    unplayable: HashSet<MediaId>,
}

impl QueueInner {
    fn position_of(&self, id: MediaId) -> Option<usize> {
        self.entries.iter().position(|h| h.id == id)
    }
}

/// In-memory play queue
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Default)]
pub struct PlayQueue {
    inner: Arc<Mutex<QueueInner>>,
    callbacks: Arc<Mutex<Vec<QueueChangedCallback>>>,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue pre-filled with `entries`
    pub fn with_entries(entries: impl IntoIterator<Item = MediaHandle>) -> Self {
        let queue = Self::default();
        queue.lock().entries.extend(entries);
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        let callbacks: Vec<QueueChangedCallback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback();
        }
    }

    /// Add a track to the end of the queue
    pub fn append(&self, handle: MediaHandle) {
        debug!("Queue append: {}", handle.display_name());
        self.lock().entries.push(handle);
        self.notify();
    }

    /// Insert a track at `index` (clamped to the queue length)
    pub fn insert(&self, index: usize, handle: MediaHandle) {
        {
            let mut inner = self.lock();
            let index = index.min(inner.entries.len());
            if index < inner.next_index {
                inner.next_index += 1;
            }
            inner.entries.insert(index, handle);
        }
        self.notify();
    }

    /// Remove a track; returns it if it was queued
    ///
    /// Removing the current track does not affect playback; it only leaves
    /// the queue.
    pub fn remove(&self, id: MediaId) -> Option<MediaHandle> {
        let removed = {
            let mut inner = self.lock();
            let index = inner.position_of(id)?;
            if index < inner.next_index {
                inner.next_index -= 1;
            }
            inner.entries.remove(index)
        };
        self.notify();
        Some(removed)
    }

    /// Drop every entry
    pub fn clear(&self) {
        {
            let mut inner = self.lock();
            inner.entries.clear();
            inner.next_index = 0;
        }
        self.notify();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Whether `id` was marked unplayable this session
    pub fn is_unplayable(&self, id: MediaId) -> bool {
        self.lock().unplayable.contains(&id)
    }
}

impl TrackSource for PlayQueue {
    fn current_cursor(&self) -> Option<MediaId> {
        self.lock().current
    }

    fn peek_next(&self, excluding: &HashSet<MediaId>) -> Option<MediaHandle> {
        let inner = self.lock();
        inner
            .entries
            .iter()
            .skip(inner.next_index)
            .find(|h| !excluding.contains(&h.id) && !inner.unplayable.contains(&h.id))
            .cloned()
    }

    fn entries(&self) -> Vec<MediaHandle> {
        self.lock().entries.clone()
    }

    fn commit(&self, id: MediaId) {
        let mut inner = self.lock();
        if let Some(index) = inner.position_of(id) {
            inner.next_index = index + 1;
        }
        inner.current = Some(id);
    }

    fn mark_unplayable(&self, id: MediaId) {
        self.lock().unplayable.insert(id);
    }

    fn on_queue_changed(&self, callback: QueueChangedCallback) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karaoke_common::MediaType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn track(name: &str) -> MediaHandle {
        MediaHandle::new(format!("/songs/{}.mp4", name), 180.0, MediaType::Video)
    }

    #[test]
    fn test_peek_follows_cursor() {
        let (a, b, c) = (track("a"), track("b"), track("c"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone(), c.clone()]);
        let none = HashSet::new();

        assert_eq!(queue.peek_next(&none), Some(a.clone()));

        queue.commit(a.id);
        assert_eq!(queue.current_cursor(), Some(a.id));
        assert_eq!(queue.peek_next(&none), Some(b.clone()));

        queue.commit(b.id);
        assert_eq!(queue.peek_next(&none), Some(c.clone()));

        queue.commit(c.id);
        assert_eq!(queue.peek_next(&none), None);
    }

    #[test]
    fn test_peek_skips_excluded_and_unplayable() {
        let (a, b, c) = (track("a"), track("b"), track("c"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone(), c.clone()]);

        queue.mark_unplayable(a.id);
        let excluding: HashSet<_> = [b.id].into_iter().collect();

        assert_eq!(queue.peek_next(&excluding), Some(c));
        assert!(queue.is_unplayable(a.id));
    }

    #[test]
    fn test_insert_before_cursor_keeps_position() {
        let (a, b, c) = (track("a"), track("b"), track("c"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone()]);
        queue.commit(a.id);

        queue.insert(0, c.clone());

        assert_eq!(queue.peek_next(&HashSet::new()), Some(b));
    }

    #[test]
    fn test_remove_current_keeps_next() {
        let (a, b) = (track("a"), track("b"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone()]);
        queue.commit(a.id);

        assert_eq!(queue.remove(a.id), Some(a.clone()));

        assert_eq!(queue.peek_next(&HashSet::new()), Some(b));
        assert_eq!(queue.current_cursor(), Some(a.id));
        assert_eq!(queue.remove(a.id), None);
    }

    #[test]
    fn test_mutations_notify_callbacks() {
        let queue = PlayQueue::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        queue.on_queue_changed(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let a = track("a");
        queue.append(a.clone());
        queue.insert(0, track("b"));
        queue.remove(a.id);
        queue.clear();

        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_commit_unqueued_track_moves_only_current() {
        let (a, b) = (track("a"), track("b"));
        let queue = PlayQueue::with_entries([a.clone()]);

        queue.commit(b.id);

        assert_eq!(queue.current_cursor(), Some(b.id));
        assert_eq!(queue.peek_next(&HashSet::new()), Some(a));
    }
}
