//! Best-path Viterbi-over-the-lattice and posterior backward pass
//! (spec.md §4.6 "Best path", "Posteriors").
use crate::logmath::LogMath;
use crate::model::ngram::NGramModel;

use super::{Lattice, NodeIdx};

/// Forward best-path potentials plus, for each node, the incoming link
/// that achieved them (so the best hypothesis can be read off by walking
/// backward from the final node).
pub struct BestPath {
    pub alpha: Vec<i32>,
    pub best_in_link: Vec<Option<usize>>,
}

/// Run the forward Viterbi-over-lattice pass of spec.md §4.6: nodes are
/// processed in start-frame order (a valid topological order since every
/// link goes strictly forward in time), and each node's LM history is the
/// word sequence of its own best-predecessor chain (so the LM query at a
/// node depends on the path being built, not a fixed global history).
pub fn forward(lattice: &Lattice, lm: &dyn NGramModel, logmath: &LogMath, language_weight: f32) -> BestPath {
    let n = lattice.n_nodes();
    let mut alpha = vec![logmath.zero(); n];
    let mut best_in_link: Vec<Option<usize>> = vec![None; n];

    let mut order: Vec<NodeIdx> = (0..n).collect();
    order.sort_by_key(|&i| lattice.node(i).start_frame);

    if let Some(initial) = lattice.initial {
        alpha[initial] = 0;
    }

    for &v in &order {
        if Some(v) == lattice.initial {
            continue;
        }
        let mut best = logmath.zero();
        let mut best_link = None;
        for (i, link) in lattice.in_links(v).enumerate() {
            if alpha[link.from] == logmath.zero() {
                continue;
            }
            let history = best_history(lattice, &best_in_link, link.from);
            let lm_log10 = lm.score(lattice.node(v).word, &history);
            let lm_term = logmath.ln_to_log(lm_log10 as f64 * std::f64::consts::LN_10);
            let scaled_lm = (lm_term as f64 * language_weight as f64) as i32;
            let candidate = alpha[link.from].saturating_add(link.acoustic_score).saturating_add(scaled_lm);
            if candidate > best {
                best = candidate;
                best_link = lattice.in_link_index(v, i);
            }
        }
        alpha[v] = best;
        best_in_link[v] = best_link;
    }

    BestPath { alpha, best_in_link }
}

/// Walk the best-predecessor chain backward from `node`, most-recent
/// first, collecting word ids (used both to seed each node's LM query and
/// to read off the final hypothesis).
fn best_history(lattice: &Lattice, best_in_link: &[Option<usize>], mut node: NodeIdx) -> Vec<crate::model::dict::WordId> {
    let mut words = Vec::new();
    loop {
        words.push(lattice.node(node).word);
        match best_in_link[node] {
            Some(link_idx) => node = lattice.links()[link_idx].from,
            None => break,
        }
        if words.len() > lattice.n_nodes() {
            break; // defensive: a cycle would indicate a construction bug.
        }
    }
    words
}

/// Read off the best hypothesis's word sequence (chronological order) and
/// its total score, given a completed forward pass.
pub fn backtrace(lattice: &Lattice, best: &BestPath) -> Option<(Vec<crate::model::dict::WordId>, i32)> {
    let final_node = lattice.final_node?;
    let mut words = best_history(lattice, &best.best_in_link, final_node);
    words.reverse();
    Some((words, best.alpha[final_node]))
}

/// Backward pass computing `beta` per node via log-add over outgoing
/// links (spec.md §4.6 "Posteriors").
pub fn backward(lattice: &Lattice, lm: &dyn NGramModel, logmath: &LogMath, language_weight: f32, best: &BestPath) -> Vec<i32> {
    let n = lattice.n_nodes();
    let mut beta = vec![logmath.zero(); n];
    let mut order: Vec<NodeIdx> = (0..n).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(lattice.node(i).start_frame));

    if let Some(final_node) = lattice.final_node {
        beta[final_node] = 0;
    }

    for &u in &order {
        if Some(u) == lattice.final_node {
            continue;
        }
        let mut acc = logmath.zero();
        for link in lattice.out_links(u) {
            if beta[link.to] == logmath.zero() {
                continue;
            }
            let history = best_history(lattice, &best.best_in_link, u);
            let lm_log10 = lm.score(lattice.node(link.to).word, &history);
            let lm_term = logmath.ln_to_log(lm_log10 as f64 * std::f64::consts::LN_10);
            let scaled_lm = (lm_term as f64 * language_weight as f64) as i32;
            let term = beta[link.to].saturating_add(link.acoustic_score).saturating_add(scaled_lm);
            acc = logmath.add(acc, term);
        }
        beta[u] = acc;
    }

    beta
}

/// Per-link posterior: `alpha[u] + acoustic + lm - alpha[</s>] + beta[v]`
/// (spec.md §4.6), one entry per link in [`Lattice::links`] order.
pub fn link_posteriors(
    lattice: &Lattice,
    lm: &dyn NGramModel,
    logmath: &LogMath,
    language_weight: f32,
    best: &BestPath,
    beta: &[i32],
) -> Vec<i32> {
    let Some(final_node) = lattice.final_node else {
        return vec![logmath.zero(); lattice.links().len()];
    };
    let normalizer = best.alpha[final_node];
    lattice
        .links()
        .iter()
        .map(|link| {
            let history = best_history(lattice, &best.best_in_link, link.from);
            let lm_log10 = lm.score(lattice.node(link.to).word, &history);
            let lm_term = logmath.ln_to_log(lm_log10 as f64 * std::f64::consts::LN_10);
            let scaled_lm = (lm_term as f64 * language_weight as f64) as i32;
            best.alpha[link.from]
                .saturating_add(link.acoustic_score)
                .saturating_add(scaled_lm)
                .saturating_add(beta[link.to])
                .saturating_sub(normalizer)
        })
        .collect()
}
