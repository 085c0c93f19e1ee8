//! The multi-pass Viterbi search of spec.md §4.3–§4.6, behind the
//! capability trait spec.md §9 calls for: "a capability trait/interface
//! `Search { start_utt; step(frame_index, scores) -> (); finish;
//! hypothesis; lattice }` with variants fwdtree, fwdflat, fsg, allphone,
//! keyphrase, alignment."
pub mod align;
pub mod allphone;
pub mod fsg;
pub mod fwdflat;
pub mod fwdtree;
pub mod keyphrase;
pub mod lattice;
pub mod phone_loop;
pub mod viterbi;

use crate::acoustic::cache::SenoneScores;
use crate::error::Result;
use crate::model::dict::{Dictionary, WordId};
use crate::model::mdef::SenoneId;

pub use lattice::Lattice;

/// A completed word hypothesis: the recognized word sequence (including
/// `<s>`/`</s>`) and its total path score.
#[derive(Clone, Debug)]
pub struct Hypothesis {
    pub words: Vec<WordId>,
    pub score: i32,
}

impl Hypothesis {
    /// Render the hypothesis as whitespace-joined text, dropping `<s>`,
    /// `</s>`, and filler words (spec.md §8 scenario 1 compares against
    /// exactly this rendering).
    pub fn text(&self, dict: &Dictionary) -> String {
        self.words
            .iter()
            .filter(|w| {
                **w != dict.start_word() && **w != dict.end_word() && !dict.is_filler(**w)
            })
            .map(|w| dict.entry(*w).word.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// The shared search capability every pass implements (spec.md §9).
///
/// Extends the documented signature with [`Search::active_senones`],
/// realizing spec.md §4.2's "search passes declare senones active per
/// frame": the driver calls it *before* scoring a frame so the acoustic
/// model knows which senones to evaluate, then calls [`Search::step`]
/// with the resulting scores.
pub trait Search {
    fn start_utt(&mut self) -> Result<()>;
    /// Senones this pass's currently active HMMs need scored for the
    /// frame about to be evaluated.
    fn active_senones(&self) -> Vec<SenoneId>;
    fn step(&mut self, frame_idx: u32, scores: &SenoneScores) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
    fn hypothesis(&self) -> Option<Hypothesis>;
    fn lattice(&self) -> Option<&Lattice>;
}
