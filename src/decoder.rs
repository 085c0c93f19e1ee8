//! The top-level streaming decoder (spec.md §5): wires the front end, the
//! acoustic scorer, the phoneme-loop prefilter, one active [`Search`] pass,
//! and the backpointer-derived lattice into the single object callers drive
//! frame-by-frame. Mirrors spec.md §6/§7's external entry points:
//! `start_utt`/`process_raw`/`end_utt`/`get_hyp`/`get_lattice`/`get_prob`.
use std::rc::Rc;
use std::sync::Arc;

use crate::acoustic::{ActiveSenoneSet, AcousticModel};
use crate::config::DecoderConfig;
use crate::error::{InputError, LatticeError, Result};
use crate::frontend::{FeatureFrame, FrontEnd};
use crate::logmath::LogMath;
use crate::model::dict::{Dictionary, WordId};
use crate::model::mdef::ModelDefinition;
use crate::model::ngram::NGramModel;
use crate::model::phone::CiPhone;
use crate::search::align::AlignSearch;
use crate::search::allphone::AllphoneSearch;
use crate::search::fsg::{Fsg, FsgSearch};
use crate::search::fwdflat::FwdFlatSearch;
use crate::search::fwdtree::FwdTreeSearch;
use crate::search::keyphrase::KeyphraseSearch;
use crate::search::lattice::Lattice;
use crate::search::phone_loop::PhoneLoopSearch;
use crate::search::{Hypothesis, Search};

/// Which recognition mode to build a [`Decoder`] for (spec.md §9: "either
/// an FSG search or an n-gram search", extended with the other four
/// variants the same REDESIGN FLAGS note keeps as pluggable modes rather
/// than dropping).
pub enum SearchSpec {
    /// Dictionary + n-gram language model, the default continuous mode.
    NGram { lm: Arc<dyn NGramModel> },
    /// A small finite-state grammar supplied by the caller (spec.md §6's
    /// on-disk artifact list has no FSG/JSGF file format of its own; the
    /// caller builds the [`Fsg`] value, e.g. from a JSGF compiler living
    /// outside this crate).
    Fsg { fsg: Fsg },
    /// Keyword spotting against a fixed phrase list.
    Keyphrase {
        keywords: Vec<WordId>,
        /// Linear detection margin over the background phone loop.
        threshold: f64,
    },
    /// Phone-level recognition with no dictionary.
    Allphone,
    /// Forced alignment of a known word sequence.
    Align { words: Vec<WordId> },
}

/// The input convention a [`Decoder`] instance was built to accept
/// (spec.md §7: "Raw PCM was given to a decoder configured for cepstral
/// input, or vice versa" is a hard input error, not a silent coercion).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputMode {
    RawPcm,
    Cepstral,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum UttState {
    Idle,
    Active,
    Finished,
}

/// The live search pass. Kept as a closed enum rather than a bare
/// `Box<dyn Search>` because the n-gram mode's phoneme-loop prefilter must
/// call [`FwdTreeSearch::set_phone_filter`] every frame, a method the
/// shared [`Search`] trait deliberately omits (it is a fwdtree-specific
/// optimization hook, not a capability every pass has); see DESIGN.md.
enum SearchImpl {
    NGram(Box<FwdTreeSearch>),
    Other(Box<dyn Search>),
}

impl SearchImpl {
    fn as_search_mut(&mut self) -> &mut dyn Search {
        match self {
            SearchImpl::NGram(s) => s.as_mut(),
            SearchImpl::Other(s) => s.as_mut(),
        }
    }

    fn as_search(&self) -> &dyn Search {
        match self {
            SearchImpl::NGram(s) => s.as_ref(),
            SearchImpl::Other(s) => s.as_ref(),
        }
    }
}

/// The streaming recognizer (spec.md §2's top-level object, `!Sync` per
/// spec.md §5: "holds Rc, not Arc, for per-decoder mutable arenas" — the
/// retained lattice handle is the one piece of state a caller may clone
/// and keep past the next `start_utt`, so it is the `Rc`).
pub struct Decoder {
    logmath: Arc<LogMath>,
    dict: Arc<Dictionary>,
    mdef: Arc<ModelDefinition>,
    config: DecoderConfig,
    input_mode: InputMode,

    frontend: FrontEnd,
    acoustic: AcousticModel,
    phone_loop: Option<PhoneLoopSearch>,
    search: SearchImpl,
    /// Retained only in n-gram mode, to build the rescoring fwdflat pass
    /// at `end_utt` (spec.md §4.5: "Built from the fwdtree backpointer
    /// table at utterance end").
    lm: Option<Arc<dyn NGramModel>>,

    state: UttState,
    frame: u32,
    /// Every feature frame seen this utterance, kept so the fwdflat
    /// rescoring pass (a full second pass over the same audio, not an
    /// incremental continuation) can replay them.
    utt_frames: Vec<FeatureFrame>,

    hypothesis: Option<Hypothesis>,
    lattice: Option<Rc<Lattice>>,
    lattice_was_empty: bool,
}

impl Decoder {
    pub fn new(
        config: DecoderConfig,
        logmath: Arc<LogMath>,
        dict: Arc<Dictionary>,
        mdef: Arc<ModelDefinition>,
        acoustic: AcousticModel,
        spec: SearchSpec,
        input_mode: InputMode,
    ) -> Result<Self> {
        config.validate()?;
        let frontend = FrontEnd::new(config.frontend.clone())?;

        let (search, lm, phone_loop) = match spec {
            SearchSpec::NGram { lm } => {
                let fts = FwdTreeSearch::new(dict.clone(), mdef.clone(), lm.clone(), logmath.clone(), config.search.clone());
                let pl = PhoneLoopSearch::new(
                    mdef.clone(),
                    logmath.clone(),
                    config.search.phone_loop_beam,
                    config.search.phone_loop_window,
                );
                (SearchImpl::NGram(Box::new(fts)), Some(lm), Some(pl))
            }
            SearchSpec::Fsg { fsg } => {
                let fs = FsgSearch::new(dict.clone(), mdef.clone(), logmath.clone(), config.search.clone(), fsg);
                (SearchImpl::Other(Box::new(fs)), None, None)
            }
            SearchSpec::Keyphrase { keywords, threshold } => {
                let ks = KeyphraseSearch::new(dict.clone(), mdef.clone(), logmath.clone(), &config.search, keywords, threshold);
                (SearchImpl::Other(Box::new(ks)), None, None)
            }
            SearchSpec::Allphone => {
                let als = AllphoneSearch::new(mdef.clone(), logmath.clone(), &config.search);
                (SearchImpl::Other(Box::new(als)), None, None)
            }
            SearchSpec::Align { words } => {
                let al = AlignSearch::new(dict.clone(), mdef.clone(), logmath.clone(), words);
                (SearchImpl::Other(Box::new(al)), None, None)
            }
        };

        Ok(Self {
            logmath,
            dict,
            mdef,
            config,
            input_mode,
            frontend,
            acoustic,
            phone_loop,
            search,
            lm,
            state: UttState::Idle,
            frame: 0,
            utt_frames: Vec::new(),
            hypothesis: None,
            lattice: None,
            lattice_was_empty: false,
        })
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    /// Begin a new utterance (spec.md §7: calling this twice without an
    /// intervening `end_utt` is a hard error).
    pub fn start_utt(&mut self) -> Result<()> {
        if self.state == UttState::Active {
            return Err(InputError::UtteranceAlreadyStarted.into());
        }
        self.frontend.start_utt();
        self.acoustic.start_utt();
        if let Some(pl) = self.phone_loop.as_mut() {
            pl.start_utt();
        }
        self.search.as_search_mut().start_utt()?;
        self.frame = 0;
        self.utt_frames.clear();
        self.hypothesis = None;
        self.lattice = None;
        self.lattice_was_empty = false;
        self.state = UttState::Active;
        Ok(())
    }

    /// Feed raw 16-bit PCM samples (spec.md §7: zero-length input and
    /// input arriving before `start_utt` are both soft errors that leave
    /// state unchanged).
    pub fn process_raw(&mut self, pcm: &[i16]) -> Result<usize> {
        if self.input_mode != InputMode::RawPcm {
            return Err(InputError::ModeMismatch {
                expected: "raw PCM",
                actual: "cepstral features",
            }
            .into());
        }
        if self.state != UttState::Active {
            return Err(InputError::UtteranceNotStarted.into());
        }
        if pcm.is_empty() {
            return Err(InputError::EmptyInput.into());
        }
        let samples: Vec<f32> = pcm.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
        let (frames, _leftover) = self.frontend.process(&samples);
        let n = frames.len();
        for frame in frames {
            self.step_frame(frame)?;
        }
        Ok(n)
    }

    /// Feed pre-computed cepstral feature frames, bypassing the front end
    /// (spec.md §3's "scores-in"/cepstral-input mode).
    pub fn process_cep(&mut self, frames: &[FeatureFrame]) -> Result<usize> {
        if self.input_mode != InputMode::Cepstral {
            return Err(InputError::ModeMismatch {
                expected: "cepstral features",
                actual: "raw PCM",
            }
            .into());
        }
        if self.state != UttState::Active {
            return Err(InputError::UtteranceNotStarted.into());
        }
        if frames.is_empty() {
            return Err(InputError::EmptyInput.into());
        }
        let n = frames.len();
        for frame in frames {
            self.step_frame(frame.clone())?;
        }
        Ok(n)
    }

    fn step_frame(&mut self, frame: FeatureFrame) -> Result<()> {
        self.utt_frames.push(frame.clone());

        let mut active = ActiveSenoneSet::default();
        active.activate_all(self.search.as_search().active_senones());
        if self.phone_loop.is_some() {
            for phone in CiPhone::ALL {
                if let Some(ssid) = self.mdef.ssid_for_ciphone(phone) {
                    active.activate_all(self.mdef.senones(ssid).iter().copied());
                }
            }
        }

        let scores = self.acoustic.score(&frame, &active).clone();

        if let Some(pl) = self.phone_loop.as_mut() {
            pl.step(frame.frame_index, &scores);
            if let SearchImpl::NGram(fts) = &mut self.search {
                fts.set_phone_filter(Some(pl.active_phones_in_window()));
            }
        }

        self.search.as_search_mut().step(frame.frame_index, &scores)?;
        self.frame = frame.frame_index;
        Ok(())
    }

    /// Finish the utterance: drain the front end's tail, run the fwdflat
    /// rescoring pass if enabled, and compute the hypothesis/lattice
    /// (spec.md §4.5/§4.6).
    pub fn end_utt(&mut self) -> Result<()> {
        if self.state != UttState::Active {
            return Err(InputError::UtteranceNotStarted.into());
        }
        for frame in self.frontend.end_utt() {
            self.step_frame(frame)?;
        }
        self.search.as_search_mut().finish()?;

        match &self.search {
            SearchImpl::NGram(fts) => {
                if self.config.search.fwdflat {
                    let lm = self.lm.clone().expect("n-gram mode always carries a language model");
                    let mut ff = FwdFlatSearch::from_fwdtree(
                        self.dict.clone(),
                        self.mdef.clone(),
                        lm,
                        self.logmath.clone(),
                        self.config.search.clone(),
                        fts.bp_table(),
                    );
                    ff.start_utt()?;
                    for frame in self.utt_frames.clone() {
                        let mut active = ActiveSenoneSet::default();
                        active.activate_all(ff.active_senones());
                        let scores = match self.acoustic.cached(frame.frame_index) {
                            Some(s) => s.clone(),
                            None => self.acoustic.score(&frame, &active).clone(),
                        };
                        ff.step(frame.frame_index, &scores)?;
                    }
                    ff.finish()?;
                    self.hypothesis = ff.hypothesis();
                    self.build_lattice(ff.bp_table());
                } else {
                    self.hypothesis = fts.hypothesis();
                    self.build_lattice(fts.bp_table());
                }
            }
            SearchImpl::Other(s) => {
                self.hypothesis = s.hypothesis();
            }
        }

        self.state = UttState::Finished;
        Ok(())
    }

    fn build_lattice(&mut self, bp: &crate::bp::BpTable) {
        if !self.config.search.bestpath {
            return;
        }
        let lattice = Lattice::build(bp, &self.dict);
        if lattice.is_empty() {
            self.lattice_was_empty = true;
        } else {
            self.lattice = Some(Rc::new(lattice));
        }
    }

    /// The current best hypothesis, or `None` if the search produced none
    /// (spec.md §7: "get_hyp returns null and a zero score").
    pub fn hypothesis(&self) -> Option<Hypothesis> {
        self.hypothesis.clone()
    }

    /// The best hypothesis's path score, or logmath zero if there is none
    /// (spec.md §7: "get_prob returns the logmath zero"; spec.md §8's
    /// invariant that this equals the lattice best-path score holds
    /// trivially since both are read off the same backpointer path).
    pub fn probability(&self) -> i32 {
        self.hypothesis.as_ref().map(|h| h.score).unwrap_or_else(|| self.logmath.zero())
    }

    /// The retained lattice, if the utterance finished and bestpath
    /// construction produced a non-empty one (spec.md §7's lattice error
    /// taxonomy).
    pub fn lattice(&self) -> Result<Rc<Lattice>> {
        if self.state != UttState::Finished {
            return Err(LatticeError::UtteranceNotFinished.into());
        }
        if self.lattice_was_empty {
            return Err(LatticeError::Empty.into());
        }
        self.lattice.clone().ok_or_else(|| LatticeError::NotRetained.into())
    }

    pub fn logmath(&self) -> &LogMath {
        &self.logmath
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustic::cache::SenoneScores;
    use crate::config::{DecoderConfig, EndpointerConfig, FrontendConfig, SearchConfig};
    use crate::model::means::{Codebook, MixtureWeights};
    use crate::model::ngram::UniformLm;
    use crate::search::fwdtree::FwdTreeSearch;
    use crate::acoustic::StreamModel;

    fn stub_acoustic(mdef: &ModelDefinition, logmath: Arc<LogMath>) -> AcousticModel {
        let n_senone = mdef.n_senone();
        let mut means = Vec::new();
        let mut vars = Vec::new();
        for i in 0..n_senone {
            means.push(i as f32 * 10.0);
            vars.push(1.0);
        }
        let codebook = Codebook::new(means, vars, n_senone.max(1), 1);
        let log_probs: Vec<f32> = (0..n_senone * n_senone)
            .map(|i| if i % (n_senone + 1) == 0 { 0.0 } else { -50.0 })
            .collect();
        let mixture_weights = MixtureWeights::from_log_probs(&log_probs, n_senone.max(1), n_senone.max(1));
        let stream = StreamModel {
            codebook,
            mixture_weights,
            bbi: None,
        };
        AcousticModel::new(logmath, vec![stream], 2, n_senone, 8)
    }

    fn tiny_decoder() -> Decoder {
        let logmath = Arc::new(LogMath::default());
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let mut dict = Dictionary::new();
        dict.add_word("GO", vec![CiPhone::G, CiPhone::Ow]);
        let dict = Arc::new(dict);
        let lm: Arc<dyn NGramModel> = Arc::new(UniformLm { log_prob: -1.0 });
        let acoustic = stub_acoustic(&mdef, logmath.clone());

        let config = DecoderConfig {
            hmm_dir: None,
            dict_path: None,
            lm_path: None,
            fsg_path: None,
            jsgf_path: None,
            keyphrase: None,
            align_text: None,
            frontend: FrontendConfig::default(),
            search: SearchConfig::default(),
            endpointer: EndpointerConfig::default(),
            mllr_path: None,
            log_base: LogMath::DEFAULT_BASE,
        };

        Decoder::new(config, logmath, dict, mdef, acoustic, SearchSpec::NGram { lm }, InputMode::RawPcm).unwrap()
    }

    #[test]
    fn start_utt_twice_is_a_hard_error() {
        let mut decoder = tiny_decoder();
        decoder.start_utt().unwrap();
        assert!(decoder.start_utt().is_err());
    }

    #[test]
    fn process_before_start_is_an_error() {
        let mut decoder = tiny_decoder();
        assert!(decoder.process_raw(&[0i16; 320]).is_err());
    }

    #[test]
    fn empty_input_is_a_soft_error_leaving_state_active() {
        let mut decoder = tiny_decoder();
        decoder.start_utt().unwrap();
        assert!(decoder.process_raw(&[]).is_err());
        // state remains active: a following call with real data still works.
        assert!(decoder.process_raw(&[100i16; 3200]).is_ok());
    }

    #[test]
    fn lattice_before_finish_is_an_error() {
        let mut decoder = tiny_decoder();
        decoder.start_utt().unwrap();
        assert!(decoder.lattice().is_err());
    }

    #[test]
    fn full_utterance_produces_a_hypothesis() {
        let mut decoder = tiny_decoder();
        decoder.start_utt().unwrap();
        let pcm = vec![500i16; 16_000];
        decoder.process_raw(&pcm).unwrap();
        decoder.end_utt().unwrap();
        assert!(decoder.hypothesis().is_some());
        assert_eq!(decoder.probability(), decoder.hypothesis().unwrap().score);
    }

    #[test]
    fn phone_filter_is_applied_only_in_ngram_mode() {
        let logmath = Arc::new(LogMath::default());
        let mdef = Arc::new(ModelDefinition::synthetic_ci(3));
        let dict = Arc::new(Dictionary::new());
        let lm: Arc<dyn NGramModel> = Arc::new(UniformLm { log_prob: -1.0 });
        let mut fts = FwdTreeSearch::new(dict, mdef.clone(), lm, logmath.clone(), SearchConfig::default());
        fts.set_phone_filter(Some(std::iter::once(CiPhone::Aa).collect()));
        fts.start_utt().unwrap();
        let scores = SenoneScores::new(0, vec![]);
        assert!(fts.step(0, &scores).is_ok());
    }
}
