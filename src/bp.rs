//! The backpointer table: the shared, append-only history structure every
//! search pass reads and writes (spec.md §3 "Backpointer entry", §4.4
//! "Backpointer table invariants"). It becomes the word lattice at
//! utterance end.
//!
//! Grounded on spec.md §9's redesign guidance verbatim: "Backpointer table
//! as append-only vector with per-frame index -> exactly that, kept
//! verbatim: `Vec<Bp>` plus `Vec<u32>` of 'first bp at frame f'."
use crate::model::dict::WordId;

/// A dense index into the backpointer table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BpIdx(pub u32);

/// One backpointer entry (spec.md §3 "Backpointer entry `B`").
#[derive(Clone, Debug)]
pub struct Bp {
    pub frame_index: u32,
    pub word: WordId,
    /// `None` only for the single `<s>` entry at frame 0.
    pub predecessor: Option<BpIdx>,
    /// Total path score up to and including this word (acoustic + LM +
    /// penalties).
    pub path_score: i32,
    pub acoustic_score: i32,
    pub lm_score: i32,
    /// Index into a per-entry right-context score stack, used by fwdtree
    /// to cache the best score for each plausible next-word left context
    /// (spec.md §4.4 "Right-context handling at word exits").
    pub right_context_stack: Option<usize>,
}

/// The append-only backpointer table plus its per-frame first-index index
/// for O(1) enumeration of word exits ending in a given frame.
#[derive(Default)]
pub struct BpTable {
    entries: Vec<Bp>,
    /// `first_at_frame[f]` is the index of the first Bp with `frame_index
    /// == f`, or `entries.len()` if no Bp exists yet for that frame. Built
    /// incrementally as frames advance strictly forward.
    first_at_frame: Vec<u32>,
}

impl BpTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.first_at_frame.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: BpIdx) -> &Bp {
        &self.entries[idx.0 as usize]
    }

    /// Append a new backpointer entry. Panics (a programmer error, not a
    /// runtime condition) if `predecessor` does not strictly precede the
    /// new entry, enforcing spec.md §4.4's table invariant at the single
    /// choke point where entries are created.
    pub fn push(&mut self, bp: Bp) -> BpIdx {
        if let Some(pred) = bp.predecessor {
            assert!(
                (pred.0 as usize) < self.entries.len(),
                "backpointer predecessor must strictly precede its successor"
            );
            assert!(
                self.entries[pred.0 as usize].frame_index < bp.frame_index,
                "predecessor frame must strictly precede successor frame"
            );
        }
        let frame = bp.frame_index as usize;
        while self.first_at_frame.len() <= frame {
            self.first_at_frame.push(self.entries.len() as u32);
        }
        let idx = BpIdx(self.entries.len() as u32);
        self.entries.push(bp);
        idx
    }

    /// All backpointers ending exactly at `frame`, for O(1)-amortized word
    /// exit enumeration within a frame (spec.md §3).
    pub fn entries_at_frame(&self, frame: u32) -> &[Bp] {
        let frame = frame as usize;
        let start = self.first_at_frame.get(frame).copied().unwrap_or(self.entries.len() as u32) as usize;
        let end = self
            .first_at_frame
            .get(frame + 1)
            .copied()
            .unwrap_or(self.entries.len() as u32) as usize;
        &self.entries[start..end.max(start)]
    }

    pub fn iter(&self) -> impl Iterator<Item = (BpIdx, &Bp)> {
        self.entries.iter().enumerate().map(|(i, b)| (BpIdx(i as u32), b))
    }

    /// Walk the predecessor chain from `from` back to `<s>`, returning word
    /// ids in chronological (left-to-right) order (spec.md §4.4
    /// "Hypothesis extraction: ... walk the predecessor chain to `<s>` and
    /// reverse").
    pub fn backtrace(&self, from: BpIdx) -> Vec<WordId> {
        let mut words = Vec::new();
        let mut cur = Some(from);
        while let Some(idx) = cur {
            let bp = self.get(idx);
            words.push(bp.word);
            cur = bp.predecessor;
        }
        words.reverse();
        words
    }

    /// Walk the predecessor chain collecting full entries, most recent
    /// first — used by fwdflat/bestpath to read off `w_{-1}`, `w_{-2}`
    /// trigram history without allocating the whole backtrace.
    pub fn history(&self, from: BpIdx, max_len: usize) -> Vec<WordId> {
        let mut words = Vec::with_capacity(max_len);
        let mut cur = Some(from);
        while let Some(idx) = cur {
            if words.len() >= max_len {
                break;
            }
            let bp = self.get(idx);
            words.push(bp.word);
            cur = bp.predecessor;
        }
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_at_frame_partitions_the_table() {
        let mut table = BpTable::new();
        let s = table.push(Bp {
            frame_index: 0,
            word: WordId(0),
            predecessor: None,
            path_score: 0,
            acoustic_score: 0,
            lm_score: 0,
            right_context_stack: None,
        });
        table.push(Bp {
            frame_index: 2,
            word: WordId(1),
            predecessor: Some(s),
            path_score: -1,
            acoustic_score: -1,
            lm_score: 0,
            right_context_stack: None,
        });
        table.push(Bp {
            frame_index: 2,
            word: WordId(2),
            predecessor: Some(s),
            path_score: -2,
            acoustic_score: -2,
            lm_score: 0,
            right_context_stack: None,
        });
        assert_eq!(table.entries_at_frame(0).len(), 1);
        assert_eq!(table.entries_at_frame(1).len(), 0);
        assert_eq!(table.entries_at_frame(2).len(), 2);
    }

    #[test]
    fn backtrace_terminates_at_start_and_reverses_order() {
        let mut table = BpTable::new();
        let s = table.push(Bp {
            frame_index: 0,
            word: WordId(0),
            predecessor: None,
            path_score: 0,
            acoustic_score: 0,
            lm_score: 0,
            right_context_stack: None,
        });
        let a = table.push(Bp {
            frame_index: 5,
            word: WordId(1),
            predecessor: Some(s),
            path_score: -1,
            acoustic_score: -1,
            lm_score: 0,
            right_context_stack: None,
        });
        let b = table.push(Bp {
            frame_index: 9,
            word: WordId(2),
            predecessor: Some(a),
            path_score: -2,
            acoustic_score: -1,
            lm_score: -1,
            right_context_stack: None,
        });
        assert_eq!(table.backtrace(b), vec![WordId(0), WordId(1), WordId(2)]);
    }
}
