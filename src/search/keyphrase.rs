//! Keyword spotting (spec.md §9's `keyphrase` search variant): one or more
//! fixed keyphrase HMM chains run in parallel with a background phone loop;
//! a detection fires wherever a keyphrase chain's score pulls ahead of the
//! background by more than a configured margin at the instant it completes.
use std::collections::HashMap;
use std::sync::Arc;

use crate::acoustic::cache::SenoneScores;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::logmath::LogMath;
use crate::model::dict::{Dictionary, WordId};
use crate::model::mdef::{ModelDefinition, SenoneId};
use crate::model::phone::CiPhone;

use super::phone_loop::PhoneLoopSearch;
use super::viterbi::{step_hmm, HmmInstance};
use super::{Hypothesis, Lattice, Search};

/// One detected keyphrase instance: which phrase, and the frame range it
/// spanned.
#[derive(Clone, Debug)]
pub struct Detection {
    pub word: WordId,
    pub start_frame: u32,
    pub end_frame: u32,
    pub score: i32,
}

struct KeywordChain {
    word: WordId,
    phones: Vec<CiPhone>,
    phone_idx: usize,
    hmm: HmmInstance,
    start_frame: u32,
}

pub struct KeyphraseSearch {
    dict: Arc<Dictionary>,
    mdef: Arc<ModelDefinition>,
    logmath: Arc<LogMath>,
    keywords: Vec<WordId>,
    /// Linear log-domain margin a keyphrase chain's exit score must clear
    /// over the background phone loop's best score to count as a
    /// detection.
    threshold: i32,

    background: PhoneLoopSearch,
    active: HashMap<WordId, KeywordChain>,
    detections: Vec<Detection>,
    frame: u32,
}

impl KeyphraseSearch {
    pub fn new(
        dict: Arc<Dictionary>,
        mdef: Arc<ModelDefinition>,
        logmath: Arc<LogMath>,
        config: &SearchConfig,
        keywords: Vec<WordId>,
        threshold_linear: f64,
    ) -> Self {
        let background = PhoneLoopSearch::new(
            mdef.clone(),
            logmath.clone(),
            config.phone_loop_beam,
            config.phone_loop_window,
        );
        let threshold = logmath.log(threshold_linear);
        Self {
            dict,
            mdef,
            logmath,
            keywords,
            threshold,
            background,
            active: HashMap::new(),
            detections: Vec::new(),
            frame: 0,
        }
    }

    fn spawn(&mut self, word: WordId, frame: u32) {
        let phones = self.dict.entry(word).pronunciation.clone();
        let Some(&first) = phones.first() else { return };
        let Some(ssid) = self.mdef.ssid_for_ciphone(first) else { return };
        let hmm = HmmInstance::enter(ssid, 0, self.mdef.n_state_per_hmm(), &self.logmath, frame);
        self.active.entry(word).or_insert(KeywordChain {
            word,
            phones,
            phone_idx: 0,
            hmm,
            start_frame: frame,
        });
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }
}

impl Search for KeyphraseSearch {
    fn start_utt(&mut self) -> Result<()> {
        self.background.start_utt();
        self.active.clear();
        self.detections.clear();
        self.frame = 0;
        let keywords = self.keywords.clone();
        for word in keywords {
            self.spawn(word, 0);
        }
        Ok(())
    }

    fn active_senones(&self) -> Vec<SenoneId> {
        let mut senones: Vec<SenoneId> = self
            .active
            .values()
            .flat_map(|c| self.mdef.senones(c.hmm.ssid).iter().copied())
            .collect();
        for phone in self.background.active_phones_in_window() {
            if let Some(ssid) = self.mdef.ssid_for_ciphone(phone) {
                senones.extend(self.mdef.senones(ssid).iter().copied());
            }
        }
        senones
    }

    fn step(&mut self, frame_idx: u32, scores: &SenoneScores) -> Result<()> {
        self.frame = frame_idx;
        self.background.step(frame_idx, scores);
        let background_best = self.background.best_exit_score();

        let mut completed = Vec::new();
        for chain in self.active.values_mut() {
            step_hmm(&mut chain.hmm, &self.mdef, scores, &self.logmath);
            if chain.phone_idx + 1 < chain.phones.len() {
                if chain.hmm.exit_score() > self.logmath.zero() {
                    chain.phone_idx += 1;
                    let phone = chain.phones[chain.phone_idx];
                    if let Some(ssid) = self.mdef.ssid_for_ciphone(phone) {
                        chain.hmm = HmmInstance::enter(
                            ssid,
                            chain.hmm.exit_score(),
                            self.mdef.n_state_per_hmm(),
                            &self.logmath,
                            frame_idx + 1,
                        );
                    }
                }
            } else if chain.hmm.exit_score().saturating_sub(background_best) > self.threshold {
                completed.push((chain.word, chain.start_frame, chain.hmm.exit_score()));
            }
        }

        for (word, start_frame, score) in completed {
            self.detections.push(Detection {
                word,
                start_frame,
                end_frame: frame_idx,
                score,
            });
            self.active.remove(&word);
            self.spawn(word, frame_idx + 1);
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn hypothesis(&self) -> Option<Hypothesis> {
        let best = self.detections.iter().max_by_key(|d| d.score)?;
        Some(Hypothesis {
            words: vec![best.word],
            score: best.score,
        })
    }

    fn lattice(&self) -> Option<&Lattice> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_utt_spawns_every_keyword_chain() {
        let mut dict = Dictionary::new();
        let go = dict.add_word("GO", vec![CiPhone::G, CiPhone::Ow]);
        let dict = Arc::new(dict);
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let logmath = Arc::new(LogMath::default());
        let mut search = KeyphraseSearch::new(dict, mdef, logmath, &SearchConfig::default(), vec![go], 1e-5);
        search.start_utt().unwrap();
        assert!(search.active.contains_key(&go));
    }
}
