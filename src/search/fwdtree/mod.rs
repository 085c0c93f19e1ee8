//! Lexicon-tree forward search (spec.md §4.4): the primary first pass,
//! built once per utterance over the shared [`lextree::LexTree`].
pub mod lextree;
pub mod root;

use std::collections::HashMap;
use std::sync::Arc;

use crate::acoustic::cache::SenoneScores;
use crate::bp::{Bp, BpIdx, BpTable};
use crate::config::SearchConfig;
use crate::error::Result;
use crate::logmath::LogMath;
use crate::model::dict::{Dictionary, WordId};
use crate::model::mdef::{ModelDefinition, SenoneId};
use crate::model::ngram::NGramModel;
use crate::model::phone::CiPhone;

use self::lextree::{ActiveNode, LexTree, NodeIdx};
use self::root::{RootKey, RootLayer};
use super::viterbi::{step_hmm, HmmInstance};
use super::{Hypothesis, Lattice, Search};

/// A single active "single-phone word" instance: modelled like a root,
/// but its own exit directly completes a word rather than feeding a body
/// tree (spec.md §4.4 "Single-phone words live in a parallel structure").
struct SingleWordInstance {
    hmm: HmmInstance,
    predecessor: BpIdx,
}

pub struct FwdTreeSearch {
    dict: Arc<Dictionary>,
    mdef: Arc<ModelDefinition>,
    lm: Arc<dyn NGramModel>,
    logmath: Arc<LogMath>,
    config: SearchConfig,
    tree: LexTree,

    roots: RootLayer,
    active_nodes: HashMap<NodeIdx, ActiveNode>,
    single_active: HashMap<RootKey, SingleWordInstance>,

    bp: BpTable,
    frame: u32,
    finished: bool,
    phone_filter: Option<std::collections::HashSet<CiPhone>>,

    beam: i32,
    phone_exit_beam: i32,
    word_exit_beam: i32,
}

impl FwdTreeSearch {
    pub fn new(
        dict: Arc<Dictionary>,
        mdef: Arc<ModelDefinition>,
        lm: Arc<dyn NGramModel>,
        logmath: Arc<LogMath>,
        config: SearchConfig,
    ) -> Self {
        let tree = LexTree::build(&dict, &mdef);
        let beam = logmath.log(config.beam);
        let phone_exit_beam = logmath.log(config.phone_exit_beam);
        let word_exit_beam = logmath.log(config.word_exit_beam);
        Self {
            dict,
            mdef,
            lm,
            logmath,
            config,
            tree,
            roots: RootLayer::default(),
            active_nodes: HashMap::new(),
            single_active: HashMap::new(),
            bp: BpTable::new(),
            frame: 0,
            finished: false,
            phone_filter: None,
            beam,
            phone_exit_beam,
            word_exit_beam,
        }
    }

    /// Restrict which base phones may be newly activated, per the
    /// phoneme-loop prefilter (spec.md §4.3). `None` disables filtering.
    pub fn set_phone_filter(&mut self, allowed: Option<std::collections::HashSet<CiPhone>>) {
        self.phone_filter = allowed;
    }

    fn phone_allowed(&self, phone: CiPhone) -> bool {
        self.phone_filter.as_ref().map(|set| set.contains(&phone)).unwrap_or(true)
    }

    fn best_active_score(&self) -> i32 {
        let root_best = self.roots.iter().map(|(_, i)| i.hmm.best_score()).max();
        let node_best = self.active_nodes.values().map(|n| n.hmm.best_score()).max();
        let single_best = self.single_active.values().map(|s| s.hmm.best_score()).max();
        [root_best, node_best, single_best]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(self.logmath.zero())
    }

    /// Score a word's completion: append its backpointer and seed every
    /// possible next root/single instance (spec.md §4.4 step 5, applying
    /// the LM term at the completing word's own transition rather than
    /// speculatively at every possible successor, which is an equivalent
    /// reordering of the same sum — see DESIGN.md).
    fn complete_word(&mut self, word: WordId, exit_score: i32, predecessor: BpIdx, frame: u32) {
        let history = self.bp.history(predecessor, 1);
        let lm_log10 = self.lm.score(word, &history);
        let lm_ln = lm_log10 as f64 * std::f64::consts::LN_10;
        let lm_term = (self.logmath.ln_to_log(lm_ln) as f64 * self.config.language_weight as f64) as i32;
        let wip_term = self.logmath.ln_to_log(self.config.word_insertion_penalty as f64);
        let path_score = exit_score.saturating_add(lm_term).saturating_add(wip_term);

        let bp_idx = self.bp.push(Bp {
            frame_index: frame,
            word,
            predecessor: Some(predecessor),
            path_score,
            acoustic_score: exit_score,
            lm_score: lm_term,
            right_context_stack: None,
        });

        let last_phone = self.dict.entry(word).pronunciation.last().copied();
        self.seed_all_roots(last_phone, path_score, bp_idx, frame + 1);
    }

    fn seed_all_roots(&mut self, left_context: Option<CiPhone>, entry_score: i32, predecessor: BpIdx, frame: u32) {
        let n_state = self.mdef.n_state_per_hmm();
        let first_phones: Vec<CiPhone> = self
            .tree
            .roots_by_first_phone
            .keys()
            .copied()
            .chain(self.tree.single_phone_words.keys().copied())
            .filter(|p| self.phone_allowed(*p))
            .collect();
        for phone in first_phones {
            let Some(ssid) = self.mdef.ssid_for_ciphone(phone) else { continue };
            let key = RootKey {
                first_phone: phone,
                left_context,
            };
            if self.tree.roots_by_first_phone.contains_key(&phone) {
                let hmm = HmmInstance::enter(ssid, entry_score, n_state, &self.logmath, frame);
                self.roots.seed(key, hmm, predecessor);
            }
            if self.tree.single_phone_words.contains_key(&phone) {
                let hmm = HmmInstance::enter(ssid, entry_score, n_state, &self.logmath, frame);
                match self.single_active.get(&key) {
                    Some(existing) if existing.hmm.state_scores[0] >= hmm.state_scores[0] => {}
                    _ => {
                        self.single_active.insert(key, SingleWordInstance { hmm, predecessor });
                    }
                }
            }
        }
    }
}

impl Search for FwdTreeSearch {
    fn start_utt(&mut self) -> Result<()> {
        self.roots.clear();
        self.active_nodes.clear();
        self.single_active.clear();
        self.bp.clear();
        self.finished = false;
        self.frame = 0;

        let start_bp = self.bp.push(Bp {
            frame_index: 0,
            word: self.dict.start_word(),
            predecessor: None,
            path_score: 0,
            acoustic_score: 0,
            lm_score: 0,
            right_context_stack: None,
        });
        self.seed_all_roots(None, 0, start_bp, 0);
        Ok(())
    }

    fn active_senones(&self) -> Vec<SenoneId> {
        let mut senones = Vec::new();
        for (_, inst) in self.roots.iter() {
            senones.extend(self.mdef.senones(inst.hmm.ssid).iter().copied());
        }
        for node in self.active_nodes.values() {
            senones.extend(self.mdef.senones(node.hmm.ssid).iter().copied());
        }
        for single in self.single_active.values() {
            senones.extend(self.mdef.senones(single.hmm.ssid).iter().copied());
        }
        senones
    }

    fn step(&mut self, frame_idx: u32, scores: &SenoneScores) -> Result<()> {
        self.frame = frame_idx;

        for (_, inst) in self.roots.iter_mut() {
            step_hmm(&mut inst.hmm, &self.mdef, scores, &self.logmath);
        }
        for node in self.active_nodes.values_mut() {
            step_hmm(&mut node.hmm, &self.mdef, scores, &self.logmath);
        }
        for single in self.single_active.values_mut() {
            step_hmm(&mut single.hmm, &self.mdef, scores, &self.logmath);
        }

        let best = self.best_active_score();
        let prune_threshold = best.saturating_add(self.beam);
        self.roots.retain(|_, inst| inst.hmm.best_score() >= prune_threshold);
        self.active_nodes.retain(|_, node| node.hmm.best_score() >= prune_threshold);
        self.single_active.retain(|_, s| s.hmm.best_score() >= prune_threshold);

        if self.active_nodes.len() > self.config.max_hmms_per_frame {
            let mut scored: Vec<(NodeIdx, i32)> = self.active_nodes.iter().map(|(&idx, n)| (idx, n.hmm.best_score())).collect();
            scored.sort_by_key(|(_, s)| std::cmp::Reverse(*s));
            scored.truncate(self.config.max_hmms_per_frame);
            let keep: std::collections::HashSet<NodeIdx> = scored.into_iter().map(|(idx, _)| idx).collect();
            self.active_nodes.retain(|idx, _| keep.contains(idx));
        }

        let phone_exit_threshold = best.saturating_add(self.phone_exit_beam);
        let word_exit_threshold = best.saturating_add(self.word_exit_beam);

        // Root exits: propagate into the body tree's dispatch nodes.
        let root_exits: Vec<(RootKey, i32, BpIdx)> = self
            .roots
            .iter()
            .filter(|(_, inst)| inst.hmm.exit_score() >= phone_exit_threshold)
            .map(|(key, inst)| (*key, inst.hmm.exit_score(), inst.predecessor))
            .collect();
        for (key, exit_score, predecessor) in root_exits {
            if let Some(&dispatch) = self.tree.roots_by_first_phone.get(&key.first_phone) {
                let children: Vec<NodeIdx> = self.tree.node(dispatch).children.values().copied().collect();
                for child_idx in children {
                    self.spawn_or_merge_node(child_idx, exit_score, predecessor, frame_idx + 1);
                }
            }
        }

        // Body-tree internal propagation + word completions.
        let mut completions = Vec::new();
        let mut propagations = Vec::new();
        for (&idx, node) in self.active_nodes.iter() {
            if node.hmm.exit_score() < phone_exit_threshold {
                continue;
            }
            for (&_phone, &child_idx) in self.tree.node(idx).children.iter() {
                propagations.push((child_idx, node.hmm.exit_score(), node.predecessor));
            }
            if node.hmm.exit_score() >= word_exit_threshold {
                for &word in &self.tree.node(idx).words_ending_here {
                    completions.push((word, node.hmm.exit_score(), node.predecessor));
                }
            }
        }
        for (child_idx, score, pred) in propagations {
            self.spawn_or_merge_node(child_idx, score, pred, frame_idx + 1);
        }

        // Single-phone word completions.
        let mut single_completions = Vec::new();
        for (key, single) in self.single_active.iter() {
            if single.hmm.exit_score() >= word_exit_threshold {
                if let Some(words) = self.tree.single_phone_words.get(&key.first_phone) {
                    for &word in words {
                        single_completions.push((word, single.hmm.exit_score(), single.predecessor));
                    }
                }
            }
        }

        let mut completions_all = completions;
        completions_all.extend(single_completions);
        if completions_all.len() > self.config.max_words_per_frame {
            completions_all.sort_by_key(|(_, score, _)| std::cmp::Reverse(*score));
            completions_all.truncate(self.config.max_words_per_frame);
        }
        for (word, score, pred) in completions_all {
            self.complete_word(word, score, pred, frame_idx);
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    /// Hypothesis extraction (spec.md §4.4): the best-scoring `</s>`
    /// backpointer if one was reached, else the best backpointer of the
    /// last frame *with the language-end penalty applied*, so its score is
    /// comparable to a true `</s>` exit rather than missing that term.
    fn hypothesis(&self) -> Option<Hypothesis> {
        let end_word = self.dict.end_word();
        if let Some((bp_idx, bp)) = self.bp.iter().filter(|(_, b)| b.word == end_word).max_by_key(|(_, b)| b.path_score) {
            return Some(Hypothesis {
                words: self.bp.backtrace(bp_idx),
                score: bp.path_score,
            });
        }
        let (bp_idx, bp) = self.bp.iter().filter(|(_, b)| b.frame_index == self.frame).max_by_key(|(_, b)| b.path_score)?;
        let history = self.bp.history(bp_idx, 1);
        let lm_log10 = self.lm.score(end_word, &history);
        let lm_ln = lm_log10 as f64 * std::f64::consts::LN_10;
        let lm_term = (self.logmath.ln_to_log(lm_ln) as f64 * self.config.language_weight as f64) as i32;
        Some(Hypothesis {
            words: self.bp.backtrace(bp_idx),
            score: bp.path_score.saturating_add(lm_term),
        })
    }

    fn lattice(&self) -> Option<&Lattice> {
        None
    }
}

impl FwdTreeSearch {
    fn spawn_or_merge_node(&mut self, child_idx: NodeIdx, entry_score: i32, predecessor: BpIdx, frame: u32) {
        let phone = self.tree.node(child_idx).phone;
        if !self.phone_allowed(phone) {
            return;
        }
        let ssid = self.tree.node(child_idx).ssid;
        let n_state = self.mdef.n_state_per_hmm();
        match self.active_nodes.get(&child_idx) {
            Some(existing) if existing.hmm.state_scores[0] >= entry_score => {}
            _ => {
                let hmm = HmmInstance::enter(ssid, entry_score, n_state, &self.logmath, frame);
                self.active_nodes.insert(
                    child_idx,
                    ActiveNode {
                        node: child_idx,
                        hmm,
                        predecessor,
                    },
                );
            }
        }
    }

    /// The finished utterance's backpointer table, consumed by fwdflat to
    /// build its rolling word set (spec.md §4.5).
    pub fn bp_table(&self) -> &BpTable {
        &self.bp
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dict::Dictionary;
    use crate::model::ngram::UniformLm;

    fn tiny_search() -> FwdTreeSearch {
        let mut dict = Dictionary::new();
        dict.add_word("GO", vec![CiPhone::G, CiPhone::Ow]);
        let dict = Arc::new(dict);
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let lm: Arc<dyn NGramModel> = Arc::new(UniformLm { log_prob: -1.0 });
        let logmath = Arc::new(LogMath::default());
        FwdTreeSearch::new(dict, mdef, lm, logmath, SearchConfig::default())
    }

    #[test]
    fn start_utt_seeds_at_least_one_root_or_single_instance() {
        let mut search = tiny_search();
        search.start_utt().unwrap();
        assert!(!search.roots.is_empty() || !search.single_active.is_empty());
    }

    #[test]
    fn active_senones_nonempty_after_start() {
        let mut search = tiny_search();
        search.start_utt().unwrap();
        assert!(!search.active_senones().is_empty());
    }
}
