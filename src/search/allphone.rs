//! Phone-level recognition (spec.md §9's `allphone` search variant): the
//! phone loop of [`super::phone_loop`] promoted from a prefilter to a full
//! pass whose backpointers are phone identities rather than words, useful
//! for pronunciation research and phone-level forced decoding without a
//! dictionary.
use std::collections::HashMap;
use std::sync::Arc;

use crate::acoustic::cache::SenoneScores;
use crate::config::SearchConfig;
use crate::error::Result;
use crate::logmath::LogMath;
use crate::model::mdef::{ModelDefinition, SenoneId};
use crate::model::phone::CiPhone;

use super::viterbi::{step_hmm, HmmInstance};
use super::{Hypothesis, Lattice, Search};

/// A phone-level backpointer: which CI phone exited, when, and who preceded
/// it. Kept separate from [`crate::bp::BpTable`] since that table is keyed
/// by [`WordId`] and phones have no dictionary entry here.
#[derive(Clone, Debug)]
pub struct PhoneBp {
    pub phone: CiPhone,
    pub frame_index: u32,
    pub predecessor: Option<usize>,
    pub path_score: i32,
}

pub struct AllphoneSearch {
    mdef: Arc<ModelDefinition>,
    logmath: Arc<LogMath>,
    beam: i32,

    active: HashMap<CiPhone, (HmmInstance, usize)>,
    bp: Vec<PhoneBp>,
    frame: u32,
}

impl AllphoneSearch {
    pub fn new(mdef: Arc<ModelDefinition>, logmath: Arc<LogMath>, config: &SearchConfig) -> Self {
        let beam = logmath.log(config.phone_loop_beam);
        Self {
            mdef,
            logmath,
            beam,
            active: HashMap::new(),
            bp: Vec::new(),
            frame: 0,
        }
    }

    fn seed_all(&mut self, entry_score: i32, predecessor: usize, frame: u32) {
        let n_state = self.mdef.n_state_per_hmm();
        for &phone in CiPhone::ALL {
            let Some(ssid) = self.mdef.ssid_for_ciphone(phone) else { continue };
            let hmm = HmmInstance::enter(ssid, entry_score, n_state, &self.logmath, frame);
            let insert = match self.active.get(&phone) {
                Some((existing, _)) => hmm.state_scores[0] > existing.state_scores[0],
                None => true,
            };
            if insert {
                self.active.insert(phone, (hmm, predecessor));
            }
        }
    }

    pub fn phone_backtrace(&self, from: usize) -> Vec<CiPhone> {
        let mut out = Vec::new();
        let mut cur = Some(from);
        while let Some(idx) = cur {
            let entry = &self.bp[idx];
            out.push(entry.phone);
            cur = entry.predecessor;
        }
        out.reverse();
        out
    }
}

impl Search for AllphoneSearch {
    fn start_utt(&mut self) -> Result<()> {
        self.active.clear();
        self.bp.clear();
        self.frame = 0;
        self.bp.push(PhoneBp {
            phone: CiPhone::Sil,
            frame_index: 0,
            predecessor: None,
            path_score: 0,
        });
        self.seed_all(0, 0, 0);
        Ok(())
    }

    fn active_senones(&self) -> Vec<SenoneId> {
        self.active
            .values()
            .flat_map(|(hmm, _)| self.mdef.senones(hmm.ssid).iter().copied())
            .collect()
    }

    fn step(&mut self, frame_idx: u32, scores: &SenoneScores) -> Result<()> {
        self.frame = frame_idx;
        for (hmm, _) in self.active.values_mut() {
            step_hmm(hmm, &self.mdef, scores, &self.logmath);
        }

        let best = self
            .active
            .values()
            .map(|(hmm, _)| hmm.best_score())
            .max()
            .unwrap_or(self.logmath.zero());
        let threshold = best.saturating_add(self.beam);
        self.active.retain(|_, (hmm, _)| hmm.best_score() >= threshold);

        let mut exits: Vec<(CiPhone, i32, usize)> = self
            .active
            .iter()
            .filter(|(_, (hmm, _))| hmm.exit_score() >= threshold)
            .map(|(&phone, &(ref hmm, pred))| (phone, hmm.exit_score(), pred))
            .collect();
        exits.sort_by_key(|(_, score, _)| -*score);

        for (phone, score, predecessor) in exits {
            let idx = self.bp.len();
            self.bp.push(PhoneBp {
                phone,
                frame_index: frame_idx,
                predecessor: Some(predecessor),
                path_score: score,
            });
            self.seed_all(score, idx, frame_idx + 1);
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn hypothesis(&self) -> Option<Hypothesis> {
        // Phone-level hypotheses have no WordId identity; allphone callers
        // should use `phone_backtrace` directly. Report an empty word
        // hypothesis carrying only the best path's score so `Search`
        // remains uniformly callable across passes.
        let entry = self
            .bp
            .iter()
            .filter(|e| e.frame_index == self.frame)
            .max_by_key(|e| e.path_score)?;
        Some(Hypothesis {
            words: Vec::new(),
            score: entry.path_score,
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
    fn start_utt_seeds_every_ci_phone() {
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let logmath = Arc::new(LogMath::default());
        let mut search = AllphoneSearch::new(mdef, logmath, &SearchConfig::default());
        search.start_utt().unwrap();
        assert_eq!(search.active.len(), CiPhone::ALL.len());
    }

    #[test]
    fn phone_backtrace_reverses_predecessor_chain() {
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let logmath = Arc::new(LogMath::default());
        let mut search = AllphoneSearch::new(mdef, logmath, &SearchConfig::default());
        search.start_utt().unwrap();
        let one = search.bp.len();
        search.bp.push(PhoneBp {
            phone: CiPhone::Aa,
            frame_index: 1,
            predecessor: Some(0),
            path_score: -1,
        });
        let path = search.phone_backtrace(one);
        assert_eq!(path, vec![CiPhone::Sil, CiPhone::Aa]);
    }
}
