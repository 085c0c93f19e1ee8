//! The word lattice (spec.md §4.6), built from a finished [`crate::bp::BpTable`].
//! Grounded on `examples/original_source/include/ps_lattice.h` field names
//! (`ps_latnode_t`/`ps_latlink_t`, `ps_lattice_bypass_fillers`) reimplemented
//! as an arena of nodes plus adjacency link lists rather than translated
//! pointer code, per spec.md §9's cyclic-graph redesign note.
pub mod bestpath;
pub mod nbest;
pub mod text;

use std::collections::{HashMap, VecDeque};

use crate::bp::{Bp, BpTable};
use crate::model::dict::{Dictionary, WordId};

pub type NodeIdx = usize;

/// One merged lattice node: all backpointer entries sharing
/// `(word_id, start_frame)` collapse into a single node (spec.md §4.6
/// "Construction").
#[derive(Clone, Debug)]
pub struct LatticeNode {
    pub word: WordId,
    pub start_frame: u32,
    pub end_frame_min: u32,
    pub end_frame_max: u32,
    pub is_filler: bool,
}

/// A directed edge between two lattice nodes.
#[derive(Clone, Copy, Debug)]
pub struct LatticeLink {
    pub from: NodeIdx,
    pub to: NodeIdx,
    pub acoustic_score: i32,
    pub end_frame: u32,
    /// `true` for filler-bypass links synthesized by
    /// [`Lattice::bypass_fillers`] rather than built directly from a
    /// backpointer entry.
    pub is_bypass: bool,
}

/// The lattice: an arena of nodes plus forward/backward adjacency lists of
/// link indices, as spec.md §9 prescribes in place of the original's
/// cyclic pointer graph.
#[derive(Clone, Debug, Default)]
pub struct Lattice {
    nodes: Vec<LatticeNode>,
    links: Vec<LatticeLink>,
    out_links: Vec<Vec<usize>>,
    in_links: Vec<Vec<usize>>,
    pub initial: Option<NodeIdx>,
    pub final_node: Option<NodeIdx>,
}

impl Lattice {
    /// Build a lattice from a finished backpointer table (spec.md §4.6
    /// "Construction", "Reachability"). `start_word`/`end_word` identify
    /// `<s>`/`</s>` so the initial/final nodes can be located.
    pub fn build(bp: &BpTable, dict: &Dictionary) -> Self {
        let mut lattice = Lattice::default();
        // key (word, start_frame) -> node index
        let mut node_of: HashMap<(WordId, u32), NodeIdx> = HashMap::new();
        // bp index -> node index, so links can be built in a second pass.
        let mut node_for_bp: Vec<NodeIdx> = Vec::with_capacity(bp.len());

        for (_, entry) in bp.iter() {
            let start_frame = entry.predecessor.map(|p| bp.get(p).frame_index + 1).unwrap_or(0);
            let key = (entry.word, start_frame);
            let idx = *node_of.entry(key).or_insert_with(|| {
                lattice.nodes.push(LatticeNode {
                    word: entry.word,
                    start_frame,
                    end_frame_min: entry.frame_index,
                    end_frame_max: entry.frame_index,
                    is_filler: dict.is_filler(entry.word),
                });
                lattice.out_links.push(Vec::new());
                lattice.in_links.push(Vec::new());
                lattice.nodes.len() - 1
            });
            let node = &mut lattice.nodes[idx];
            node.end_frame_min = node.end_frame_min.min(entry.frame_index);
            node.end_frame_max = node.end_frame_max.max(entry.frame_index);
            node_for_bp.push(idx);
        }

        for (bp_idx, entry) in bp.iter() {
            if let Some(pred) = entry.predecessor {
                let from = node_for_bp[pred.0 as usize];
                let to = node_for_bp[bp_idx.0 as usize];
                lattice.add_link(from, to, entry.acoustic_score, entry.frame_index, false);
            } else {
                lattice.initial = Some(node_for_bp[bp_idx.0 as usize]);
            }
        }

        lattice.final_node = node_of
            .iter()
            .filter(|((w, _), _)| *w == dict.end_word())
            .map(|(_, idx)| *idx)
            .max_by_key(|idx| lattice.nodes[*idx].start_frame);

        lattice.bypass_fillers(dict);
        lattice.prune_unreachable();
        lattice
    }

    fn add_link(&mut self, from: NodeIdx, to: NodeIdx, acoustic_score: i32, end_frame: u32, is_bypass: bool) {
        let idx = self.links.len();
        self.links.push(LatticeLink {
            from,
            to,
            acoustic_score,
            end_frame,
            is_bypass,
        });
        self.out_links[from].push(idx);
        self.in_links[to].push(idx);
    }

    /// For every pair of non-filler nodes connected only through filler
    /// nodes, add a direct bypass link (spec.md §4.6 "Filler bypass").
    /// Original filler links are kept.
    fn bypass_fillers(&mut self, dict: &Dictionary) {
        let filler_penalty_ln = -8.0_f64; // combined with per-hop acoustic sum below
        let _ = dict;
        let n = self.nodes.len();
        let mut new_links = Vec::new();
        for start in 0..n {
            if self.nodes[start].is_filler {
                continue;
            }
            // BFS through filler-only intermediate nodes.
            let mut queue: VecDeque<(NodeIdx, i32)> = VecDeque::new();
            for &link_idx in &self.out_links[start] {
                let link = self.links[link_idx];
                queue.push_back((link.to, link.acoustic_score));
            }
            let mut visited = vec![false; n];
            while let Some((node, acc_score)) = queue.pop_front() {
                if visited[node] {
                    continue;
                }
                visited[node] = true;
                if !self.nodes[node].is_filler {
                    new_links.push((start, node, acc_score));
                    continue;
                }
                for &link_idx in &self.out_links[node] {
                    let link = self.links[link_idx];
                    queue.push_back((link.to, acc_score.saturating_add(link.acoustic_score)));
                }
            }
        }
        for (from, to, acc_score) in new_links {
            let end_frame = self.nodes[to].end_frame_max;
            self.add_link(from, to, acc_score + filler_penalty_ln as i32, end_frame, true);
        }
    }

    /// Mark-and-sweep reachability from `<s>` forward and `</s>` backward
    /// (spec.md §4.6 "Reachability").
    fn prune_unreachable(&mut self) {
        let Some(initial) = self.initial else { return };
        let Some(final_node) = self.final_node else { return };
        let n = self.nodes.len();

        let mut forward_reachable = vec![false; n];
        let mut queue = VecDeque::from([initial]);
        forward_reachable[initial] = true;
        while let Some(node) = queue.pop_front() {
            for &link_idx in &self.out_links[node] {
                let to = self.links[link_idx].to;
                if !forward_reachable[to] {
                    forward_reachable[to] = true;
                    queue.push_back(to);
                }
            }
        }

        let mut backward_reachable = vec![false; n];
        let mut queue = VecDeque::from([final_node]);
        backward_reachable[final_node] = true;
        while let Some(node) = queue.pop_front() {
            for &link_idx in &self.in_links[node] {
                let from = self.links[link_idx].from;
                if !backward_reachable[from] {
                    backward_reachable[from] = true;
                    queue.push_back(from);
                }
            }
        }

        let keep: Vec<bool> = (0..n).map(|i| forward_reachable[i] && backward_reachable[i]).collect();
        let mut remap = vec![usize::MAX; n];
        let mut new_nodes = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if keep[i] {
                remap[i] = new_nodes.len();
                new_nodes.push(node.clone());
            }
        }
        let mut new_links = Vec::new();
        for link in &self.links {
            if keep[link.from] && keep[link.to] {
                new_links.push(LatticeLink {
                    from: remap[link.from],
                    to: remap[link.to],
                    ..*link
                });
            }
        }
        let new_n = new_nodes.len();
        let mut out_links = vec![Vec::new(); new_n];
        let mut in_links = vec![Vec::new(); new_n];
        for (i, link) in new_links.iter().enumerate() {
            out_links[link.from].push(i);
            in_links[link.to].push(i);
        }
        self.nodes = new_nodes;
        self.links = new_links;
        self.out_links = out_links;
        self.in_links = in_links;
        self.initial = if keep[initial] { Some(remap[initial]) } else { None };
        self.final_node = if keep[final_node] { Some(remap[final_node]) } else { None };
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, idx: NodeIdx) -> &LatticeNode {
        &self.nodes[idx]
    }

    pub fn links(&self) -> &[LatticeLink] {
        &self.links
    }

    pub fn out_links(&self, node: NodeIdx) -> impl Iterator<Item = &LatticeLink> + '_ {
        self.out_links[node].iter().map(move |&i| &self.links[i])
    }

    pub fn in_links(&self, node: NodeIdx) -> impl Iterator<Item = &LatticeLink> + '_ {
        self.in_links[node].iter().map(move |&i| &self.links[i])
    }

    /// Global link index of the `i`-th incoming link of `node`, matching
    /// the enumeration order [`Lattice::in_links`] yields.
    pub fn in_link_index(&self, node: NodeIdx, i: usize) -> Option<usize> {
        self.in_links[node].get(i).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bp::{Bp, BpIdx};
    use crate::model::dict::Dictionary;

    fn simple_table(dict: &Dictionary) -> BpTable {
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
        let e = bp.push(Bp {
            frame_index: 1,
            word: dict.end_word(),
            predecessor: Some(s),
            path_score: -5,
            acoustic_score: -5,
            lm_score: 0,
            right_context_stack: None,
        });
        let _ = e;
        bp
    }

    #[test]
    fn build_connects_start_to_end() {
        let dict = Dictionary::new();
        let bp = simple_table(&dict);
        let lattice = Lattice::build(&bp, &dict);
        assert!(lattice.initial.is_some());
        assert!(lattice.final_node.is_some());
        assert!(!lattice.is_empty());
    }
}
