//! Advance controller: picks the next candidate
//!
//! Sequential mode asks the track source for the first entry after the
//! cursor. Shuffle mode draws at random from a remaining-unplayed pool that
//! is rebuilt when shuffle is switched on or the queue changes. Tracks that
//! failed this session are never offered again. A candidate named explicitly
//! through `preload_next` takes precedence over both.

use crate::config::PlaybackSettings;
use crate::source::TrackSource;
use karaoke_common::{MediaHandle, MediaId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::debug;

pub struct AdvanceController {
    /// Candidate most recently offered
    prediction: Option<MediaHandle>,

    /// Candidate requested explicitly; wins over queue order
    pinned: Option<MediaHandle>,

    /// Session-only failure marks
    unplayable: HashSet<MediaId>,

    /// Tracks that became Active this session
    played: HashSet<MediaId>,

    /// Remaining-unplayed pool for shuffle draws
    shuffle_pool: Vec<MediaHandle>,

    rng: StdRng,
}

impl AdvanceController {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic shuffle order
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            prediction: None,
            pinned: None,
            unplayable: HashSet::new(),
            played: HashSet::new(),
            shuffle_pool: Vec::new(),
            rng,
        }
    }

    pub fn prediction(&self) -> Option<&MediaHandle> {
        self.prediction.as_ref()
    }

    pub fn is_unplayable(&self, id: MediaId) -> bool {
        self.unplayable.contains(&id)
    }

    /// Shuffle pool contents (ids, draw order unspecified)
    pub fn shuffle_pool(&self) -> Vec<MediaId> {
        self.shuffle_pool.iter().map(|h| h.id).collect()
    }

    /// Name the next candidate explicitly
    pub fn pin(&mut self, handle: MediaHandle) {
        self.pinned = Some(handle);
    }

    /// Forget the current prediction so the next `predict` draws afresh
    pub fn clear_prediction(&mut self) {
        self.prediction = None;
    }

    /// Record that `id` became Active
    pub fn note_started(&mut self, id: MediaId) {
        self.played.insert(id);
        if self.prediction.as_ref().is_some_and(|h| h.id == id) {
            self.prediction = None;
        }
        if self.pinned.as_ref().is_some_and(|h| h.id == id) {
            self.pinned = None;
        }
        self.shuffle_pool.retain(|h| h.id != id);
    }

    /// Never offer `id` again this session
    pub fn mark_unplayable(&mut self, id: MediaId) {
        debug!("Marking {} unplayable for this session", id);
        self.unplayable.insert(id);
        if self.prediction.as_ref().is_some_and(|h| h.id == id) {
            self.prediction = None;
        }
        if self.pinned.as_ref().is_some_and(|h| h.id == id) {
            self.pinned = None;
        }
        self.shuffle_pool.retain(|h| h.id != id);
    }

    fn eligible(&self, handle: &MediaHandle, current: Option<MediaId>) -> bool {
        !self.played.contains(&handle.id)
            && Some(handle.id) != current
            && !self.unplayable.contains(&handle.id)
    }

    /// Rebuild the shuffle pool from the full queue
    pub fn refresh_pool(&mut self, source: &dyn TrackSource) {
        let current = source.current_cursor();
        self.shuffle_pool = source
            .entries()
            .into_iter()
            .filter(|h| self.eligible(h, current))
            .collect();
        debug!("Shuffle pool rebuilt: {} candidates", self.shuffle_pool.len());
    }

    /// Compute (and remember) the next candidate
    ///
    /// Returns `None` when the queue is exhausted.
    pub fn predict(
        &mut self,
        source: &dyn TrackSource,
        settings: &PlaybackSettings,
    ) -> Option<MediaHandle> {
        self.prediction = self.choose(source, settings);
        self.prediction.clone()
    }

    fn choose(
        &mut self,
        source: &dyn TrackSource,
        settings: &PlaybackSettings,
    ) -> Option<MediaHandle> {
        let current = source.current_cursor();
        if let Some(pinned) = &self.pinned {
            if !self.unplayable.contains(&pinned.id) && Some(pinned.id) != current {
                return Some(pinned.clone());
            }
        }

        if settings.shuffle_enabled {
            self.choose_shuffled(source, settings.repeat_enabled)
        } else {
            self.choose_sequential(source, settings.repeat_enabled)
        }
    }

    fn choose_shuffled(
        &mut self,
        source: &dyn TrackSource,
        repeat: bool,
    ) -> Option<MediaHandle> {
        if let Some(prediction) = &self.prediction {
            if self.shuffle_pool.iter().any(|h| h.id == prediction.id) {
                return Some(prediction.clone());
            }
        }

        if self.shuffle_pool.is_empty() && repeat {
            debug!("Shuffle pool exhausted, repeating");
            self.played.clear();
            self.refresh_pool(source);
        }

        self.shuffle_pool.choose(&mut self.rng).cloned()
    }

    fn choose_sequential(
        &mut self,
        source: &dyn TrackSource,
        repeat: bool,
    ) -> Option<MediaHandle> {
        let mut excluding = self.unplayable.clone();
        excluding.extend(source.current_cursor());

        if let Some(next) = source.peek_next(&excluding) {
            return Some(next);
        }
        if !repeat {
            return None;
        }

        debug!("Queue exhausted, wrapping to start");
        self.played.clear();
        let entries = source.entries();
        entries
            .iter()
            .find(|h| !excluding.contains(&h.id))
            .or_else(|| entries.iter().find(|h| !self.unplayable.contains(&h.id)))
            .cloned()
    }
}

impl Default for AdvanceController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PlayQueue;
    use karaoke_common::MediaType;

    fn track(name: &str) -> MediaHandle {
        MediaHandle::new(format!("/songs/{}.mp4", name), 180.0, MediaType::Video)
    }

    fn settings(shuffle: bool, repeat: bool) -> PlaybackSettings {
        PlaybackSettings {
            shuffle_enabled: shuffle,
            repeat_enabled: repeat,
            ..PlaybackSettings::default()
        }
    }

    /// Make `handle` current in both queue and controller
    fn start(queue: &PlayQueue, advance: &mut AdvanceController, handle: &MediaHandle) {
        queue.commit(handle.id);
        advance.note_started(handle.id);
    }

    #[test]
    fn test_sequential_order() {
        let (a, b, c) = (track("a"), track("b"), track("c"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone(), c.clone()]);
        let mut advance = AdvanceController::with_seed(1);
        let sequential = settings(false, false);

        start(&queue, &mut advance, &a);
        assert_eq!(advance.predict(&queue, &sequential), Some(b.clone()));
        start(&queue, &mut advance, &b);
        assert_eq!(advance.predict(&queue, &sequential), Some(c.clone()));
        start(&queue, &mut advance, &c);
        assert_eq!(advance.predict(&queue, &sequential), None);
    }

    #[test]
    fn test_unplayable_tracks_are_skipped() {
        let (a, b, c) = (track("a"), track("b"), track("c"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone(), c.clone()]);
        let mut advance = AdvanceController::with_seed(1);
        start(&queue, &mut advance, &a);

        advance.mark_unplayable(b.id);

        assert!(advance.is_unplayable(b.id));
        assert_eq!(advance.predict(&queue, &settings(false, false)), Some(c));
    }

    #[test]
    fn test_every_candidate_failing_exhausts_queue() {
        let (a, b, c) = (track("a"), track("b"), track("c"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone(), c.clone()]);
        let mut advance = AdvanceController::with_seed(1);
        let sequential = settings(false, false);
        start(&queue, &mut advance, &a);

        while let Some(candidate) = advance.predict(&queue, &sequential) {
            advance.mark_unplayable(candidate.id);
        }

        assert!(advance.is_unplayable(b.id));
        assert!(advance.is_unplayable(c.id));
    }

    #[test]
    fn test_shuffle_draws_remaining_without_repeats() {
        let (a, b, c, d) = (track("a"), track("b"), track("c"), track("d"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone(), c.clone(), d.clone()]);
        let mut advance = AdvanceController::with_seed(42);
        let shuffled = settings(true, false);
        start(&queue, &mut advance, &a);

        advance.refresh_pool(&queue);
        let mut pool = advance.shuffle_pool();
        pool.sort();
        let mut expected = vec![b.id, c.id, d.id];
        expected.sort();
        assert_eq!(pool, expected);

        let mut drawn = Vec::new();
        while let Some(next) = advance.predict(&queue, &shuffled) {
            assert!(expected.contains(&next.id));
            assert!(!drawn.contains(&next.id));
            drawn.push(next.id);
            start(&queue, &mut advance, &next);
        }
        assert_eq!(drawn.len(), 3);
    }

    #[test]
    fn test_shuffle_prediction_is_stable() {
        let tracks: Vec<_> = (0..8).map(|i| track(&format!("t{}", i))).collect();
        let queue = PlayQueue::with_entries(tracks.clone());
        let mut advance = AdvanceController::with_seed(7);
        let shuffled = settings(true, false);
        start(&queue, &mut advance, &tracks[0]);
        advance.refresh_pool(&queue);

        let first = advance.predict(&queue, &shuffled);
        for _ in 0..5 {
            assert_eq!(advance.predict(&queue, &shuffled), first);
        }
    }

    #[test]
    fn test_repeat_wraps_sequential() {
        let (a, b) = (track("a"), track("b"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone()]);
        let mut advance = AdvanceController::with_seed(1);
        start(&queue, &mut advance, &a);
        start(&queue, &mut advance, &b);

        assert_eq!(advance.predict(&queue, &settings(false, true)), Some(a));
    }

    #[test]
    fn test_repeat_refills_shuffle_pool() {
        let (a, b) = (track("a"), track("b"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone()]);
        let mut advance = AdvanceController::with_seed(3);
        start(&queue, &mut advance, &a);
        advance.refresh_pool(&queue);
        start(&queue, &mut advance, &b);

        assert_eq!(advance.predict(&queue, &settings(true, false)), None);
        assert_eq!(advance.predict(&queue, &settings(true, true)), Some(a));
    }

    #[test]
    fn test_pinned_candidate_wins() {
        let (a, b, c) = (track("a"), track("b"), track("c"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone()]);
        let mut advance = AdvanceController::with_seed(1);
        start(&queue, &mut advance, &a);

        advance.pin(c.clone());
        assert_eq!(advance.predict(&queue, &settings(false, false)), Some(c.clone()));

        start(&queue, &mut advance, &c);
        assert_eq!(advance.predict(&queue, &settings(false, false)), Some(b));
    }

    #[test]
    fn test_current_track_follows_source_cursor() {
        let (a, b, c) = (track("a"), track("b"), track("c"));
        let queue = PlayQueue::with_entries([a.clone(), b.clone(), c.clone()]);
        let mut advance = AdvanceController::with_seed(1);

        // Cursor moved by the queue owner, not through note_started
        queue.commit(b.id);
        advance.pin(b.clone());
        assert_eq!(advance.predict(&queue, &settings(false, false)), Some(c.clone()));

        advance.refresh_pool(&queue);
        let mut pool = advance.shuffle_pool();
        pool.sort();
        let mut expected = vec![a.id, c.id];
        expected.sort();
        assert_eq!(pool, expected);
    }
}
