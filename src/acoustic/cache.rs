//! Ring-buffered per-frame senone score cache (spec.md §4.2 "Scoring
//! cache"): "kept in a ring of size `n_feat_frames` so the search can look
//! one or two frames back ... Advancing the current frame invalidates
//! scores older than the ring capacity."
use std::collections::VecDeque;

use crate::model::mdef::SenoneId;

/// One frame's worth of senone scores, normalized so the best active
/// senone is 0 (spec.md §4.2: "Returned scores are normalized to the best
/// senone of the frame").
#[derive(Clone, Debug)]
pub struct SenoneScores {
    pub frame_index: u32,
    /// Sparse: only active senones have an entry.
    scores: Vec<(SenoneId, i32)>,
    pub best_senone: Option<SenoneId>,
}

impl SenoneScores {
    pub fn new(frame_index: u32, mut scores: Vec<(SenoneId, i32)>) -> Self {
        let best_senone = scores.iter().max_by_key(|(_, s)| *s).map(|(id, _)| *id);
        // Normalize so the best is exactly 0.
        if let Some((_, best)) = scores.iter().max_by_key(|(_, s)| *s).copied() {
            for (_, s) in scores.iter_mut() {
                *s -= best;
            }
        }
        Self {
            frame_index,
            scores,
            best_senone,
        }
    }

    pub fn score(&self, senone: SenoneId) -> Option<i32> {
        self.scores.iter().find(|(id, _)| *id == senone).map(|(_, s)| *s)
    }

    pub fn active_senones(&self) -> impl Iterator<Item = SenoneId> + '_ {
        self.scores.iter().map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// A fixed-capacity ring of recent [`SenoneScores`], indexed by absolute
/// frame index.
pub struct ScoreCache {
    capacity: usize,
    ring: VecDeque<SenoneScores>,
}

impl ScoreCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }

    /// Push a new frame's scores, evicting the oldest if over capacity.
    pub fn push(&mut self, scores: SenoneScores) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(scores);
    }

    /// Look up a previously cached frame by absolute index, if still
    /// within the ring's retention window.
    pub fn get(&self, frame_index: u32) -> Option<&SenoneScores> {
        self.ring.iter().find(|s| s.frame_index == frame_index)
    }

    pub fn latest(&self) -> Option<&SenoneScores> {
        self.ring.back()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_score_in_frame_is_normalized_to_zero() {
        let scores = SenoneScores::new(0, vec![(SenoneId(0), -100), (SenoneId(1), -50), (SenoneId(2), -200)]);
        assert_eq!(scores.score(SenoneId(1)), Some(0));
        assert_eq!(scores.best_senone, Some(SenoneId(1)));
        assert!(scores.score(SenoneId(0)).unwrap() < 0);
    }

    #[test]
    fn ring_evicts_oldest_beyond_capacity() {
        let mut cache = ScoreCache::new(2);
        cache.push(SenoneScores::new(0, vec![(SenoneId(0), 0)]));
        cache.push(SenoneScores::new(1, vec![(SenoneId(0), 0)]));
        cache.push(SenoneScores::new(2, vec![(SenoneId(0), 0)]));
        assert!(cache.get(0).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(2).is_some());
    }
}
