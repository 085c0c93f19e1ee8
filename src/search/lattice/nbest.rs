//! A* N-best search over a lattice (spec.md §4.6 "N-best"): "priority
//! queue of partial paths keyed by (score-so-far + beta[frontier])...
//! duplicates are deduped by their word-id sequence."
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::model::dict::WordId;

use super::{Lattice, NodeIdx};

#[derive(Clone)]
struct PartialPath {
    node: NodeIdx,
    words: Vec<WordId>,
    score_so_far: i32,
    priority: i64,
}

impl PartialPath {
    fn key(&self) -> i64 {
        self.priority
    }
}

impl PartialEq for PartialPath {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for PartialPath {}
impl PartialOrd for PartialPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PartialPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// One N-best hypothesis.
#[derive(Clone, Debug)]
pub struct NBestHyp {
    pub words: Vec<WordId>,
    pub score: i32,
}

/// Expand up to `n` distinct-word-sequence hypotheses in non-increasing
/// score order, using `beta` (the lattice's backward-pass potentials, see
/// [`super::bestpath::backward`]) as the A* admissible heuristic.
pub fn search(lattice: &Lattice, beta: &[i32], n: usize) -> Vec<NBestHyp> {
    let (Some(initial), Some(final_node)) = (lattice.initial, lattice.final_node) else {
        return Vec::new();
    };

    let mut heap = BinaryHeap::new();
    heap.push(PartialPath {
        node: initial,
        words: vec![lattice.node(initial).word],
        score_so_far: 0,
        priority: beta[initial] as i64,
    });

    let mut results = Vec::new();
    let mut seen: HashSet<Vec<WordId>> = HashSet::new();

    while let Some(path) = heap.pop() {
        if results.len() >= n {
            break;
        }
        if path.node == final_node {
            if seen.insert(path.words.clone()) {
                results.push(NBestHyp {
                    words: path.words,
                    score: path.score_so_far,
                });
            }
            continue;
        }
        for link in lattice.out_links(path.node) {
            let mut words = path.words.clone();
            words.push(lattice.node(link.to).word);
            let score_so_far = path.score_so_far.saturating_add(link.acoustic_score);
            let priority = score_so_far as i64 + beta[link.to] as i64;
            heap.push(PartialPath {
                node: link.to,
                words,
                score_so_far,
                priority,
            });
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bp::{Bp, BpTable};
    use crate::logmath::LogMath;
    use crate::model::dict::Dictionary;
    use crate::model::ngram::UniformLm;

    #[test]
    fn single_path_lattice_yields_one_hypothesis() {
        let dict = Dictionary::new();
        let mut bp = BpTable::new();
        let s = bp.push(Bp {
            frame_index: 0,
            word: dict.start_word(),
            predecessor: None,
            path_score: 0,
            acoustic_score: 0,
            lm_score: 0,
            right_context_stack: None,
        });
        bp.push(Bp {
            frame_index: 1,
            word: dict.end_word(),
            predecessor: Some(s),
            path_score: -3,
            acoustic_score: -3,
            lm_score: 0,
            right_context_stack: None,
        });
        let lattice = Lattice::build(&bp, &dict);
        let logmath = LogMath::default();
        let lm = UniformLm { log_prob: -2.0 };
        let best = super::super::bestpath::forward(&lattice, &lm, &logmath, 1.0);
        let beta = super::super::bestpath::backward(&lattice, &lm, &logmath, 1.0, &best);
        let hyps = search(&lattice, &beta, 5);
        assert_eq!(hyps.len(), 1);
    }
}
