//! Forced alignment (spec.md §9's `align` search variant): the word
//! sequence is already known, so the search degenerates to a single linear
//! HMM chain covering the whole sentence's pronunciation with no branching
//! and no language model, producing per-word (and per-phone) frame
//! boundaries instead of a hypothesis to discover.
use std::sync::Arc;

use crate::acoustic::cache::SenoneScores;
use crate::error::Result;
use crate::logmath::LogMath;
use crate::model::dict::{Dictionary, WordId};
use crate::model::mdef::{ModelDefinition, SenoneId};
use crate::model::phone::CiPhone;

use super::viterbi::{step_hmm, HmmInstance};
use super::{Hypothesis, Lattice, Search};

/// One aligned segment: a word and the phone within it, with the frame
/// range the Viterbi path assigned it.
#[derive(Clone, Debug)]
pub struct AlignedSegment {
    pub word: WordId,
    pub phone: CiPhone,
    pub start_frame: u32,
    pub end_frame: u32,
}

struct PhoneSlot {
    word_idx: usize,
    phone: CiPhone,
    ssid: crate::model::mdef::Ssid,
}

pub struct AlignSearch {
    dict: Arc<Dictionary>,
    mdef: Arc<ModelDefinition>,
    logmath: Arc<LogMath>,

    words: Vec<WordId>,
    slots: Vec<PhoneSlot>,
    /// Index of the slot currently active; forced alignment never branches.
    cursor: usize,
    hmm: HmmInstance,
    segments: Vec<AlignedSegment>,
    current_start: u32,
    frame: u32,
    finished: bool,
}

impl AlignSearch {
    /// Build an alignment search for `words`, concatenating each word's
    /// dictionary pronunciation into one flat phone sequence.
    pub fn new(dict: Arc<Dictionary>, mdef: Arc<ModelDefinition>, logmath: Arc<LogMath>, words: Vec<WordId>) -> Self {
        let mut slots = Vec::new();
        for (word_idx, &word) in words.iter().enumerate() {
            for &phone in &dict.entry(word).pronunciation {
                if let Some(ssid) = mdef.ssid_for_ciphone(phone) {
                    slots.push(PhoneSlot { word_idx, phone, ssid });
                }
            }
        }
        let n_state = mdef.n_state_per_hmm();
        let hmm = if let Some(first) = slots.first() {
            HmmInstance::enter(first.ssid, 0, n_state, &logmath, 0)
        } else {
            HmmInstance::enter(crate::model::mdef::Ssid(0), logmath.zero(), n_state, &logmath, 0)
        };
        Self {
            dict,
            mdef,
            logmath,
            words,
            slots,
            cursor: 0,
            hmm,
            segments: Vec::new(),
            current_start: 0,
            frame: 0,
            finished: false,
        }
    }

    pub fn segments(&self) -> &[AlignedSegment] {
        &self.segments
    }
}

impl Search for AlignSearch {
    fn start_utt(&mut self) -> Result<()> {
        self.cursor = 0;
        self.segments.clear();
        self.current_start = 0;
        self.frame = 0;
        self.finished = false;
        if let Some(first) = self.slots.first() {
            self.hmm = HmmInstance::enter(first.ssid, 0, self.mdef.n_state_per_hmm(), &self.logmath, 0);
        }
        Ok(())
    }

    fn active_senones(&self) -> Vec<SenoneId> {
        self.slots
            .get(self.cursor)
            .map(|slot| self.mdef.senones(slot.ssid).to_vec())
            .unwrap_or_default()
    }

    fn step(&mut self, frame_idx: u32, scores: &SenoneScores) -> Result<()> {
        self.frame = frame_idx;
        if self.finished || self.cursor >= self.slots.len() {
            return Ok(());
        }
        step_hmm(&mut self.hmm, &self.mdef, scores, &self.logmath);

        // Advance to the next phone once this one's exit state is the
        // best-scoring state (standard forced-alignment duration rule: stay
        // until the path no longer prefers staying).
        let exit = self.hmm.exit_score();
        if exit >= self.hmm.best_score() && exit > self.logmath.zero() {
            let slot = &self.slots[self.cursor];
            self.segments.push(AlignedSegment {
                word: self.words[slot.word_idx],
                phone: slot.phone,
                start_frame: self.current_start,
                end_frame: frame_idx,
            });
            self.cursor += 1;
            self.current_start = frame_idx + 1;
            if let Some(next) = self.slots.get(self.cursor) {
                self.hmm = HmmInstance::enter(next.ssid, exit, self.mdef.n_state_per_hmm(), &self.logmath, frame_idx + 1);
            } else {
                self.finished = true;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if !self.finished && self.cursor < self.slots.len() {
            let slot = &self.slots[self.cursor];
            self.segments.push(AlignedSegment {
                word: self.words[slot.word_idx],
                phone: slot.phone,
                start_frame: self.current_start,
                end_frame: self.frame,
            });
        }
        self.finished = true;
        Ok(())
    }

    fn hypothesis(&self) -> Option<Hypothesis> {
        if self.words.is_empty() {
            return None;
        }
        Some(Hypothesis {
            words: self.words.clone(),
            score: self.hmm.best_score(),
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
    fn flattens_word_pronunciations_into_one_slot_sequence() {
        let mut dict = Dictionary::new();
        let go = dict.add_word("GO", vec![CiPhone::G, CiPhone::Ow]);
        let dict = Arc::new(dict);
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let logmath = Arc::new(LogMath::default());
        let search = AlignSearch::new(dict, mdef, logmath, vec![go]);
        assert_eq!(search.slots.len(), 2);
    }

    #[test]
    fn hypothesis_reports_the_supplied_word_sequence() {
        let mut dict = Dictionary::new();
        let go = dict.add_word("GO", vec![CiPhone::G, CiPhone::Ow]);
        let dict = Arc::new(dict);
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let logmath = Arc::new(LogMath::default());
        let mut search = AlignSearch::new(dict, mdef, logmath, vec![go]);
        search.start_utt().unwrap();
        assert_eq!(search.hypothesis().unwrap().words, vec![go]);
    }
}
