//! The root HMM layer of spec.md §4.4: "one HMM per (first-phone,
//! last-phone-of-previous-word) pair, modelling the cross-word left
//! context."
use std::collections::HashMap;

use crate::bp::BpIdx;
use crate::model::phone::CiPhone;

use super::super::viterbi::HmmInstance;

/// Key identifying one root instance: the word's first phone plus the
/// phone the previous word exited on (its left-context donor).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RootKey {
    pub first_phone: CiPhone,
    pub left_context: Option<CiPhone>,
}

/// One active root instance: its HMM plus the backpointer its word,
/// once complete, will chain from.
pub struct RootInstance {
    pub hmm: HmmInstance,
    pub predecessor: BpIdx,
}

/// The root layer: active root instances keyed by [`RootKey`], merged
/// (keeping the higher-scoring instance) when two predecessors seed the
/// same key in the same frame.
#[derive(Default)]
pub struct RootLayer {
    active: HashMap<RootKey, RootInstance>,
}

impl RootLayer {
    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Seed (or improve) the root instance for `key`. Spec.md §4.4 step 5:
    /// "seed the corresponding root HMM at frame t+1" — only the better
    /// of any existing seed and the new one survives.
    pub fn seed(&mut self, key: RootKey, hmm: HmmInstance, predecessor: BpIdx) {
        match self.active.get(&key) {
            Some(existing) if existing.hmm.state_scores[0] >= hmm.state_scores[0] => {}
            _ => {
                self.active.insert(key, RootInstance { hmm, predecessor });
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RootKey, &RootInstance)> {
        self.active.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&RootKey, &mut RootInstance)> {
        self.active.iter_mut()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&RootKey, &RootInstance) -> bool) {
        self.active.retain(|k, v| keep(k, v));
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logmath::LogMath;
    use crate::model::mdef::Ssid;

    #[test]
    fn seeding_the_same_key_twice_keeps_the_better_score() {
        let logmath = LogMath::default();
        let mut layer = RootLayer::default();
        let key = RootKey {
            first_phone: CiPhone::K,
            left_context: None,
        };
        let weak = HmmInstance::enter(Ssid(0), -100, 3, &logmath, 0);
        let strong = HmmInstance::enter(Ssid(0), -10, 3, &logmath, 0);
        layer.seed(key, weak, BpIdx(0));
        layer.seed(key, strong, BpIdx(0));
        assert_eq!(layer.len(), 1);
        let (_, inst) = layer.iter().next().unwrap();
        assert_eq!(inst.hmm.state_scores[0], -10);
    }
}
