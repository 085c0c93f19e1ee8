//! The HMM instance and per-frame Viterbi step shared by every search pass
//! (phone-loop prefilter, fwdtree, fwdflat): spec.md §4.4 step 2, "standard
//! 3-state Viterbi step with the model's transition matrix."
//!
//! One [`HmmInstance`] is a single active copy of some ssid's HMM, scored
//! state-by-state each frame. Passes differ in what they do with an HMM's
//! *exit score* (word completion, phone propagation, prefilter pruning);
//! the state update itself is identical everywhere, so it lives here once.
use crate::acoustic::cache::SenoneScores;
use crate::logmath::LogMath;
use crate::model::mdef::{ModelDefinition, Ssid};

/// A live HMM instance: per-state accumulated path scores plus enough
/// identity to resolve its senones and transition probabilities.
#[derive(Clone, Debug)]
pub struct HmmInstance {
    pub ssid: Ssid,
    /// Per-emitting-state path score, log domain (quantized via LogMath).
    pub state_scores: Vec<i32>,
    /// Frame this instance was entered (for duration bookkeeping/alignment).
    pub entry_frame: u32,
}

impl HmmInstance {
    pub fn enter(ssid: Ssid, entry_score: i32, n_state: usize, logmath: &LogMath, entry_frame: u32) -> Self {
        let mut state_scores = vec![logmath.zero(); n_state];
        state_scores[0] = entry_score;
        Self {
            ssid,
            state_scores,
            entry_frame,
        }
    }

    /// The instance's best active state score (used for phone-exit
    /// comparisons before the exit state's own score is known).
    pub fn best_score(&self) -> i32 {
        self.state_scores.iter().copied().max().unwrap_or(i32::MIN)
    }

    /// The last (exit) state's score, propagated onward at a phone or
    /// word boundary once the phone-exit beam clears it.
    pub fn exit_score(&self) -> i32 {
        *self.state_scores.last().unwrap_or(&i32::MIN)
    }
}

/// Advance every state of one HMM instance by one frame: self-loop,
/// forward advance (no skip transitions in the default topology,
/// per [`ModelDefinition::tmat_ln_probs`]), plus this frame's incoming
/// acoustic score per state's senone.
///
/// Returns `false` if every state fell to `logmath.zero()` (the instance
/// is acoustically dead and should be dropped without waiting for the
/// pruning beam).
pub fn step_hmm(hmm: &mut HmmInstance, mdef: &ModelDefinition, scores: &SenoneScores, logmath: &LogMath) -> bool {
    let senones = mdef.senones(hmm.ssid);
    let tmat = mdef.tmat(hmm.ssid);
    let (self_loop_ln, advance_ln) = mdef.tmat_ln_probs(tmat);
    let self_loop = logmath.ln_to_log(self_loop_ln as f64);
    let advance = logmath.ln_to_log(advance_ln as f64);

    let n = hmm.state_scores.len();
    let prev = hmm.state_scores.clone();
    let mut any_alive = false;
    for i in 0..n {
        let from_self = prev[i].saturating_add(self_loop);
        let from_prev = if i > 0 {
            prev[i - 1].saturating_add(advance)
        } else {
            logmath.zero()
        };
        let incoming = from_self.max(from_prev);
        let acoustic = senones.get(i).and_then(|s| scores.score(*s)).unwrap_or(logmath.zero());
        let new_score = incoming.saturating_add(acoustic);
        hmm.state_scores[i] = new_score;
        if new_score > logmath.zero() {
            any_alive = true;
        }
    }
    any_alive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::phone::CiPhone;

    #[test]
    fn dead_hmm_is_reported_as_not_alive() {
        let mdef = ModelDefinition::synthetic_ci(3);
        let logmath = LogMath::default();
        let ssid = mdef.ssid_for_ciphone(CiPhone::Aa).unwrap();
        let mut hmm = HmmInstance::enter(ssid, logmath.zero(), 3, &logmath, 0);
        let scores = SenoneScores::new(0, vec![]);
        let alive = step_hmm(&mut hmm, &mdef, &scores, &logmath);
        assert!(!alive);
    }

    #[test]
    fn live_hmm_accumulates_score_from_self_loop() {
        let mdef = ModelDefinition::synthetic_ci(3);
        let logmath = LogMath::default();
        let ssid = mdef.ssid_for_ciphone(CiPhone::Aa).unwrap();
        let senones = mdef.senones(ssid).to_vec();
        let mut hmm = HmmInstance::enter(ssid, 0, 3, &logmath, 0);
        let scores = SenoneScores::new(0, senones.iter().map(|s| (*s, 0)).collect());
        let alive = step_hmm(&mut hmm, &mdef, &scores, &logmath);
        assert!(alive);
        assert!(hmm.state_scores[0] <= 0);
    }
}
