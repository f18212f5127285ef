//! Bidirectional "who has been told about whom" tracker. `known[A]` contains every player A has
//! been told is visible and not yet told has left; `known_by[B]` is the inverse index used to
//! make disconnect cleanup O(K) instead of O(N). Game-thread only.

use crate::identity::PlayerId;
use hashbrown::{HashMap, HashSet};

/// Result of diffing a viewer's previously-known set against what is visible to them now.
pub struct VisibilityDiff {
    pub entered: Vec<PlayerId>,
    pub left: Vec<PlayerId>,
}

#[derive(Default)]
pub struct VisibilityTracker {
    known: HashMap<PlayerId, HashSet<PlayerId>>,
    known_by: HashMap<PlayerId, HashSet<PlayerId>>,
}

impl VisibilityTracker {
    pub fn new() -> VisibilityTracker {
        VisibilityTracker::default()
    }

    fn link(&mut self, viewer: PlayerId, subject: PlayerId) {
        self.known.entry(viewer).or_default().insert(subject);
        self.known_by.entry(subject).or_default().insert(viewer);
    }

    fn unlink(&mut self, viewer: PlayerId, subject: PlayerId) {
        if let Some(set) = self.known.get_mut(&viewer) {
            set.remove(&subject);
            if set.is_empty() {
                self.known.remove(&viewer);
            }
        }
        if let Some(set) = self.known_by.get_mut(&subject) {
            set.remove(&viewer);
            if set.is_empty() {
                self.known_by.remove(&subject);
            }
        }
    }

    /// Diffs `visible_now` against what `viewer` was previously told about, updating both maps
    /// to match the new truth and returning what entered/left so the caller can emit packets.
    pub fn update(&mut self, viewer: PlayerId, visible_now: &HashSet<PlayerId>) -> VisibilityDiff {
        let previously_known = self.known.get(&viewer).cloned().unwrap_or_default();

        let entered: Vec<PlayerId> = visible_now.difference(&previously_known).copied().collect();
        let left: Vec<PlayerId> = previously_known.difference(visible_now).copied().collect();

        for &subject in &entered {
            self.link(viewer, subject);
        }
        for &subject in &left {
            self.unlink(viewer, subject);
        }

        VisibilityDiff { entered, left }
    }

    /// Seeds `viewer`'s known set on login, after the initial snapshot covering `ids` has
    /// already been sent. Does not itself emit anything.
    pub fn initialize(&mut self, viewer: PlayerId, ids: impl IntoIterator<Item = PlayerId>) {
        for subject in ids {
            self.link(viewer, subject);
        }
    }

    pub fn add_known(&mut self, viewer: PlayerId, subject: PlayerId) {
        self.link(viewer, subject);
    }

    /// Counterpart to `add_known`: drops `subject` from `viewer`'s known set (and the reverse
    /// index), for when the caller has already determined the two are no longer in range of
    /// each other via some other edge (see `broadcast::broadcast_dirty`).
    pub fn remove_known(&mut self, viewer: PlayerId, subject: PlayerId) {
        self.unlink(viewer, subject);
    }

    pub fn knows(&self, viewer: PlayerId, subject: PlayerId) -> bool {
        self.known
            .get(&viewer)
            .map(|set| set.contains(&subject))
            .unwrap_or(false)
    }

    /// Purges `id` from both directions: everyone `id` knew about, and everyone who knew about
    /// `id`. O(K) where K is the number of peers that knew the leaver.
    pub fn remove_player(&mut self, id: PlayerId) {
        if let Some(known_subjects) = self.known.remove(&id) {
            for subject in known_subjects {
                if let Some(set) = self.known_by.get_mut(&subject) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.known_by.remove(&subject);
                    }
                }
            }
        }
        if let Some(observers) = self.known_by.remove(&id) {
            for observer in observers {
                if let Some(set) = self.known.get_mut(&observer) {
                    set.remove(&id);
                    if set.is_empty() {
                        self.known.remove(&observer);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_reports_entered_and_left_and_stays_symmetric() {
        let mut tracker = VisibilityTracker::new();
        let a = PlayerId::new(1);
        let b = PlayerId::new(2);

        let mut visible: HashSet<PlayerId> = HashSet::new();
        visible.insert(b);
        let diff = tracker.update(a, &visible);
        assert_eq!(diff.entered, vec![b]);
        assert!(diff.left.is_empty());
        assert!(tracker.knows(a, b));

        let empty: HashSet<PlayerId> = HashSet::new();
        let diff2 = tracker.update(a, &empty);
        assert_eq!(diff2.left, vec![b]);
        assert!(!tracker.knows(a, b));
    }

    #[test]
    fn remove_player_purges_both_directions() {
        let mut tracker = VisibilityTracker::new();
        let a = PlayerId::new(1);
        let b = PlayerId::new(2);
        tracker.add_known(a, b);
        assert!(tracker.knows(a, b));

        tracker.remove_player(b);
        assert!(!tracker.knows(a, b));
    }

    #[test]
    fn remove_known_drops_both_directions_of_the_single_edge() {
        let mut tracker = VisibilityTracker::new();
        let a = PlayerId::new(1);
        let b = PlayerId::new(2);
        tracker.add_known(a, b);
        assert!(tracker.knows(a, b));

        tracker.remove_known(a, b);
        assert!(!tracker.knows(a, b));
    }
}
