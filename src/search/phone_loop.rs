//! Phoneme-loop prefilter (spec.md §4.3): "a separate search instance
//! running a fully connected loop over CI phones ... to produce, for every
//! frame within the past `window` frames, the set of CI phones whose
//! cumulative loop score stays within a per-frame beam of the best."
//!
//! Grounded on `examples/original_source/include/pocketsphinx/...` phone-
//! loop prefilter description and on the shared [`crate::search::viterbi`]
//! HMM step. Purely a pruner (spec.md §4.3 "Semantics"): fwdtree consults
//! [`PhoneLoopSearch::active_phones_in_window`] to skip HMMs whose base
//! phone never scored competitively in the lookahead window.
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::acoustic::cache::SenoneScores;
use crate::logmath::LogMath;
use crate::model::mdef::ModelDefinition;
use crate::model::phone::CiPhone;

use super::viterbi::{step_hmm, HmmInstance};

/// The always-on, fully connected CI-phone loop.
pub struct PhoneLoopSearch {
    mdef: Arc<ModelDefinition>,
    logmath: Arc<LogMath>,
    beam: i32,
    window: usize,
    /// One instance per `CiPhone::ALL` slot; always populated once
    /// `start_utt` has run (the loop is fully connected, every phone is
    /// always reachable).
    instances: Vec<HmmInstance>,
    /// Per-frame record of which phones were within `beam` of that
    /// frame's best exit score, most recent last.
    history: VecDeque<HashSet<CiPhone>>,
}

impl PhoneLoopSearch {
    pub fn new(mdef: Arc<ModelDefinition>, logmath: Arc<LogMath>, beam: f64, window: u32) -> Self {
        Self {
            mdef,
            logmath: logmath.clone(),
            beam: logmath.log(beam),
            window: window.max(1) as usize,
            instances: Vec::new(),
            history: VecDeque::new(),
        }
    }

    pub fn start_utt(&mut self) {
        self.history.clear();
        self.instances = CiPhone::ALL
            .into_iter()
            .filter_map(|p| self.mdef.ssid_for_ciphone(p))
            .map(|ssid| HmmInstance::enter(ssid, 0, self.mdef.n_state_per_hmm(), &self.logmath, 0))
            .collect();
    }

    /// Step the loop by one frame and record which phones were
    /// competitive.
    pub fn step(&mut self, frame_idx: u32, scores: &SenoneScores) {
        for hmm in self.instances.iter_mut() {
            step_hmm(hmm, &self.mdef, scores, &self.logmath);
        }
        let best_exit = self.instances.iter().map(|h| h.exit_score()).max().unwrap_or(self.logmath.zero());

        let mut competitive = HashSet::new();
        for (phone, hmm) in CiPhone::ALL.into_iter().zip(self.instances.iter()) {
            if hmm.exit_score() >= best_exit.saturating_add(self.beam) {
                competitive.insert(phone);
            }
        }
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(competitive);

        // Fully connected: every phone's exit feeds every phone's entry
        // for the next frame, at the best available incoming score.
        let entry_score = best_exit;
        for hmm in self.instances.iter_mut() {
            let restart = HmmInstance::enter(hmm.ssid, entry_score, hmm.state_scores.len(), &self.logmath, frame_idx + 1);
            if restart.state_scores[0] > hmm.state_scores[0] {
                *hmm = restart;
            }
        }
    }

    /// The union of competitive phones across the retained window,
    /// consulted by fwdtree before activating an HMM (spec.md §4.3).
    pub fn active_phones_in_window(&self) -> HashSet<CiPhone> {
        let mut union = HashSet::new();
        for set in &self.history {
            union.extend(set.iter().copied());
        }
        union
    }

    /// The loop's best exit score as of the last [`PhoneLoopSearch::step`]
    /// call, used by keyphrase search as the "background" score a keyword
    /// chain must pull ahead of to count as a detection.
    pub fn best_exit_score(&self) -> i32 {
        self.instances.iter().map(|h| h.exit_score()).max().unwrap_or(self.logmath.zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phone_starts_competitive_on_uniform_scores() {
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let logmath = Arc::new(LogMath::default());
        let mut pl = PhoneLoopSearch::new(mdef.clone(), logmath.clone(), 1e-10, 5);
        pl.start_utt();
        let all_senones: Vec<_> = (0..mdef.n_senone() as u32).map(crate::model::mdef::SenoneId).collect();
        let scores = SenoneScores::new(0, all_senones.into_iter().map(|s| (s, 0)).collect());
        pl.step(0, &scores);
        let active = pl.active_phones_in_window();
        assert_eq!(active.len(), CiPhone::ALL.len());
    }

    #[test]
    fn window_forgets_frames_older_than_its_capacity() {
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let logmath = Arc::new(LogMath::default());
        let mut pl = PhoneLoopSearch::new(mdef.clone(), logmath.clone(), 1e-10, 2);
        pl.start_utt();
        for f in 0..5u32 {
            let scores = SenoneScores::new(f, vec![]);
            pl.step(f, &scores);
        }
        assert!(pl.history.len() <= 2);
    }
}
