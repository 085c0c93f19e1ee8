//! The shared body layer of the lexicon tree (spec.md §4.4 "Body layer: a
//! shared tree keyed by (phone, left-context)").
//!
//! Simplification recorded in DESIGN.md: nodes are keyed by the phone
//! *sequence* from the word's second phone onward (not additionally by
//! left context); left-context is carried only in the score each active
//! instance enters with. This keeps prefix sharing (the actual point of
//! the structure: two words with a common phone sequence after the first
//! phone score identically until they diverge) while avoiding a
//! combinatorial per-context node blowup spec.md doesn't require us to
//! reproduce bit-for-bit.
use std::collections::HashMap;

use crate::model::dict::{Dictionary, WordId};
use crate::model::mdef::{ModelDefinition, Ssid};
use crate::model::phone::CiPhone;

use super::super::viterbi::HmmInstance;

pub type NodeIdx = usize;

/// One body-tree node: the phone at this position, its resolved ssid
/// (context-independent; see module doc), its children keyed by the next
/// phone, and any words whose pronunciation ends exactly here.
#[derive(Debug)]
pub struct TreeNode {
    pub phone: CiPhone,
    pub ssid: Ssid,
    pub children: HashMap<CiPhone, NodeIdx>,
    pub words_ending_here: Vec<WordId>,
}

/// The arena-backed lexicon tree plus the parallel single-phone-word
/// table spec.md §4.4 calls out separately.
pub struct LexTree {
    nodes: Vec<TreeNode>,
    /// Root node indices keyed by the word's first phone (spec.md "Root
    /// layer: one HMM per first-phone"; left-context fan-out is applied
    /// by the caller when seeding a root instance, not encoded here).
    pub roots_by_first_phone: HashMap<CiPhone, NodeIdx>,
    /// Words whose pronunciation is a single phone: evaluated directly at
    /// word-exit time rather than through the tree (spec.md §4.4).
    pub single_phone_words: HashMap<CiPhone, Vec<WordId>>,
}

impl LexTree {
    /// Build the tree from every non-filler dictionary entry. `<s>`,
    /// `</s>`, and filler words are excluded; callers wire filler/silence
    /// transitions separately (they always transition to/from any word,
    /// modelled in the search loop rather than the tree).
    pub fn build(dict: &Dictionary, mdef: &ModelDefinition) -> Self {
        let mut nodes: Vec<TreeNode> = Vec::new();
        let mut roots_by_first_phone: HashMap<CiPhone, NodeIdx> = HashMap::new();
        let mut single_phone_words: HashMap<CiPhone, Vec<WordId>> = HashMap::new();

        for (wid, entry) in dict.iter() {
            if entry.is_filler {
                continue;
            }
            let pron = &entry.pronunciation;
            if pron.is_empty() {
                continue;
            }
            if pron.len() == 1 {
                single_phone_words.entry(pron[0]).or_default().push(wid);
                continue;
            }
            // Body tree covers phones[1..]; phones[0] is the root layer's
            // concern and is not represented as a tree node at all.
            let mut cur = *roots_by_first_phone.entry(pron[0]).or_insert_with(|| {
                let idx = nodes.len();
                nodes.push(TreeNode {
                    phone: pron[0],
                    ssid: mdef.ssid_for_ciphone(pron[0]).unwrap_or(Ssid(0)),
                    children: HashMap::new(),
                    words_ending_here: Vec::new(),
                });
                idx
            });
            for &phone in &pron[1..] {
                let next = *nodes[cur].children.entry(phone).or_insert_with(|| {
                    let idx = nodes.len();
                    nodes.push(TreeNode {
                        phone,
                        ssid: mdef.ssid_for_ciphone(phone).unwrap_or(Ssid(0)),
                        children: HashMap::new(),
                        words_ending_here: Vec::new(),
                    });
                    idx
                });
                cur = next;
            }
            nodes[cur].words_ending_here.push(wid);
        }

        Self {
            nodes,
            roots_by_first_phone,
            single_phone_words,
        }
    }

    pub fn node(&self, idx: NodeIdx) -> &TreeNode {
        &self.nodes[idx]
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// One active instance within the body tree: which node it occupies plus
/// its HMM state scores, and the backpointer its path currently descends
/// from (needed so a completed word's backpointer predecessor is correct).
pub struct ActiveNode {
    pub node: NodeIdx,
    pub hmm: HmmInstance,
    pub predecessor: crate::bp::BpIdx,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::dict::Dictionary;

    fn dict_with(words: &[(&str, &[CiPhone])]) -> Dictionary {
        let mut dict = Dictionary::new();
        for (w, pron) in words {
            dict.add_word(w, pron.to_vec());
        }
        dict
    }

    #[test]
    fn shared_prefix_collapses_into_one_path() {
        let dict = dict_with(&[
            ("cat", &[CiPhone::K, CiPhone::Ae, CiPhone::T]),
            ("cab", &[CiPhone::K, CiPhone::Ae, CiPhone::B]),
        ]);
        let mdef = ModelDefinition::synthetic_ci(3);
        let tree = LexTree::build(&dict, &mdef);
        let root = tree.roots_by_first_phone[&CiPhone::K];
        let ae_node = tree.node(root).children[&CiPhone::Ae];
        assert_eq!(tree.node(ae_node).children.len(), 2);
    }

    #[test]
    fn single_phone_words_bypass_the_tree() {
        let dict = dict_with(&[("a", &[CiPhone::Ah])]);
        let mdef = ModelDefinition::synthetic_ci(3);
        let tree = LexTree::build(&dict, &mdef);
        assert!(tree.single_phone_words.contains_key(&CiPhone::Ah));
        assert!(tree.roots_by_first_phone.is_empty());
    }
}
