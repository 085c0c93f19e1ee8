//! Flat-lexicon rescoring pass (spec.md §4.5): "the set of words to
//! consider is the union of words seen exiting within a rolling window
//! around each frame ... for each such word and each plausible left
//! context a fresh HMM chain of that word's pronunciation is instantiated;
//! no tree sharing." The critical difference from fwdtree is the
//! trigram LM query at word transitions.
use std::collections::{HashMap, HashSet};
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

use super::viterbi::{step_hmm, HmmInstance};
use super::{Hypothesis, Lattice, Search};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct ChainKey {
    word: WordId,
    left_context: Option<CiPhone>,
}

struct ChainInstance {
    word: WordId,
    phones: Vec<CiPhone>,
    phone_idx: usize,
    hmm: HmmInstance,
    predecessor: BpIdx,
}

pub struct FwdFlatSearch {
    dict: Arc<Dictionary>,
    mdef: Arc<ModelDefinition>,
    lm: Arc<dyn NGramModel>,
    logmath: Arc<LogMath>,
    config: SearchConfig,

    /// The rolling candidate word set, precomputed once from the seeding
    /// fwdtree pass's backpointer table (spec.md §4.5's "rolling window"
    /// collapsed to one static set per utterance; see DESIGN.md).
    candidate_words: Vec<WordId>,

    active: HashMap<ChainKey, ChainInstance>,
    bp: BpTable,
    frame: u32,

    beam: i32,
    word_exit_beam: i32,
}

impl FwdFlatSearch {
    /// Build a fwdflat pass from the fwdtree backpointer table (spec.md
    /// §4.5 "Built from the fwdtree backpointer table at utterance end").
    pub fn from_fwdtree(
        dict: Arc<Dictionary>,
        mdef: Arc<ModelDefinition>,
        lm: Arc<dyn NGramModel>,
        logmath: Arc<LogMath>,
        config: SearchConfig,
        seed_bp: &BpTable,
    ) -> Self {
        let mut words: HashSet<WordId> = HashSet::new();
        for (_, entry) in seed_bp.iter() {
            if !dict.is_filler(entry.word) {
                words.insert(entry.word);
            }
        }
        let beam = logmath.log(config.fwdflat_beam);
        let word_exit_beam = logmath.log(config.fwdflat_word_beam);
        Self {
            dict,
            mdef,
            lm,
            logmath,
            config,
            candidate_words: words.into_iter().collect(),
            active: HashMap::new(),
            bp: BpTable::new(),
            frame: 0,
            beam,
            word_exit_beam,
        }
    }

    fn best_active_score(&self) -> i32 {
        self.active.values().map(|c| c.hmm.best_score()).max().unwrap_or(self.logmath.zero())
    }

    fn seed_all(&mut self, left_context: Option<CiPhone>, entry_score: i32, predecessor: BpIdx, frame: u32) {
        let n_state = self.mdef.n_state_per_hmm();
        for &word in &self.candidate_words.clone() {
            let phones = self.dict.entry(word).pronunciation.clone();
            let Some(&first) = phones.first() else { continue };
            let Some(ssid) = self.mdef.ssid_for_ciphone(first) else { continue };
            let key = ChainKey { word, left_context };
            let hmm = HmmInstance::enter(ssid, entry_score, n_state, &self.logmath, frame);
            match self.active.get(&key) {
                Some(existing) if existing.hmm.state_scores[0] >= hmm.state_scores[0] => {}
                _ => {
                    self.active.insert(
                        key,
                        ChainInstance {
                            word,
                            phones,
                            phone_idx: 0,
                            hmm,
                            predecessor,
                        },
                    );
                }
            }
        }
    }

    fn complete_word(&mut self, word: WordId, exit_score: i32, predecessor: BpIdx, frame: u32) {
        let history = self.bp.history(predecessor, 2);
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
        self.seed_all(last_phone, path_score, bp_idx, frame + 1);
    }
}

impl Search for FwdFlatSearch {
    fn start_utt(&mut self) -> Result<()> {
        self.active.clear();
        self.bp.clear();
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
        self.seed_all(None, 0, start_bp, 0);
        Ok(())
    }

    fn active_senones(&self) -> Vec<SenoneId> {
        self.active
            .values()
            .flat_map(|c| self.mdef.senones(c.hmm.ssid).iter().copied())
            .collect()
    }

    fn step(&mut self, frame_idx: u32, scores: &SenoneScores) -> Result<()> {
        self.frame = frame_idx;
        for chain in self.active.values_mut() {
            step_hmm(&mut chain.hmm, &self.mdef, scores, &self.logmath);
        }

        let best = self.best_active_score();
        let prune_threshold = best.saturating_add(self.beam);
        self.active.retain(|_, c| c.hmm.best_score() >= prune_threshold);

        let word_exit_threshold = best.saturating_add(self.word_exit_beam);

        let mut advances = Vec::new();
        let mut completions = Vec::new();
        for (key, chain) in self.active.iter() {
            if chain.hmm.exit_score() < prune_threshold {
                continue;
            }
            if chain.phone_idx + 1 < chain.phones.len() {
                advances.push((*key, chain.hmm.exit_score()));
            } else if chain.hmm.exit_score() >= word_exit_threshold {
                completions.push((chain.word, chain.hmm.exit_score(), chain.predecessor));
            }
        }

        for (key, exit_score) in advances {
            if let Some(chain) = self.active.get_mut(&key) {
                chain.phone_idx += 1;
                let phone = chain.phones[chain.phone_idx];
                let ssid = self.mdef.ssid_for_ciphone(phone).unwrap_or(chain.hmm.ssid);
                chain.hmm = HmmInstance::enter(ssid, exit_score, self.mdef.n_state_per_hmm(), &self.logmath, frame_idx + 1);
            }
        }

        for (word, score, pred) in completions {
            self.complete_word(word, score, pred, frame_idx);
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn hypothesis(&self) -> Option<Hypothesis> {
        let end_word = self.dict.end_word();
        let (bp_idx, bp) = self
            .bp
            .iter()
            .filter(|(_, b)| b.word == end_word)
            .max_by_key(|(_, b)| b.path_score)
            .or_else(|| self.bp.iter().filter(|(_, b)| b.frame_index == self.frame).max_by_key(|(_, b)| b.path_score))?;
        Some(Hypothesis {
            words: self.bp.backtrace(bp_idx),
            score: bp.path_score,
        })
    }

    fn lattice(&self) -> Option<&Lattice> {
        None
    }
}

impl FwdFlatSearch {
    pub fn bp_table(&self) -> &BpTable {
        &self.bp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ngram::UniformLm;

    #[test]
    fn candidate_set_is_drawn_from_seed_table() {
        let mut dict = Dictionary::new();
        let go = dict.add_word("GO", vec![CiPhone::G, CiPhone::Ow]);
        let dict = Arc::new(dict);
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let lm: Arc<dyn NGramModel> = Arc::new(UniformLm { log_prob: -1.0 });
        let logmath = Arc::new(LogMath::default());

        let mut seed = BpTable::new();
        let s = seed.push(Bp {
            frame_index: 0,
            word: dict.start_word(),
            predecessor: None,
            path_score: 0,
            acoustic_score: 0,
            lm_score: 0,
            right_context_stack: None,
        });
        seed.push(Bp {
            frame_index: 5,
            word: go,
            predecessor: Some(s),
            path_score: -1,
            acoustic_score: -1,
            lm_score: 0,
            right_context_stack: None,
        });

        let search = FwdFlatSearch::from_fwdtree(dict, mdef, lm, logmath, SearchConfig::default(), &seed);
        assert!(search.candidate_words.contains(&go));
    }
}
