//! Front-end: PCM -> cepstral feature frames (spec.md §4.1).
//!
//! Grounded on `examples/original_source/src/fe/fe_interface.c` /
//! `src/libpocketsphinx/fe_sigproc.c` for the per-frame pipeline shape
//! (framing -> pre-emphasis -> dither -> window -> FFT -> mel -> log ->
//! DCT), reimplemented idiomatically rather than translated.
pub mod cmn;
pub mod melfb;
pub mod noise;
pub mod warp;
pub mod window;

use crate::config::FrontendConfig;
use crate::error::{ConfigError, DecoderError};

use cmn::RunningCmn;
use melfb::MelFilterbank;
use noise::NoiseRemoval;
use window::{hamming_window, DitherRng, PreEmphasis};

/// Number of cepstral coefficients kept after dynamic-feature computation
/// expands `ncep` static cepstra into static + delta + delta-delta.
pub const DYNAMIC_FEATURE_MULTIPLIER: usize = 3;

/// One immutable feature frame: `ncep` static cepstra plus first and
/// second time derivatives, carrying its frame index (spec.md §3 "Feature
/// frame").
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureFrame {
    pub frame_index: u32,
    /// static || delta || delta-delta, length `3 * ncep`.
    pub values: Vec<f32>,
}

impl FeatureFrame {
    pub fn ncep(&self) -> usize {
        self.values.len() / DYNAMIC_FEATURE_MULTIPLIER
    }

    pub fn static_cepstra(&self) -> &[f32] {
        &self.values[..self.ncep()]
    }
}

/// The stateful front end: maintains the overflow buffer, pre-emphasis
/// history, dither seed, running CMN, and dynamic-feature delay line
/// across `process` calls within one utterance.
pub struct FrontEnd {
    cfg: FrontendConfig,
    filterbank: MelFilterbank,
    pre_emphasis: PreEmphasis,
    dither: DitherRng,
    window: Vec<f32>,
    noise: Option<NoiseRemoval>,
    cmn: Option<RunningCmn>,
    /// Samples carried over from the previous `process` call that didn't
    /// complete a full frame shift.
    overflow: Vec<f32>,
    /// Static cepstra produced so far this utterance, kept around so
    /// dynamic features (deltas) can be computed with a 2-frame lookahead
    /// and emitted with a matching delay.
    static_history: Vec<Vec<f32>>,
    next_frame_index: u32,
    utt_started: bool,
}

/// Window half-width (in frames) used for delta/delta-delta computation,
/// matching the conventional Sphinx `+-2` frame context.
const DELTA_WINDOW: usize = 2;

impl FrontEnd {
    pub fn new(cfg: FrontendConfig) -> Result<Self, DecoderError> {
        cfg.validate()?;
        let window = hamming_window(cfg.frame_size());
        let filterbank = MelFilterbank::new(&cfg);
        let noise = cfg.remove_noise.then(|| NoiseRemoval::new(cfg.nfilt));
        let cmn = cfg.cmn.then(|| RunningCmn::new(cfg.ncep, cmn::DEFAULT_FORGET_FACTOR));
        let dither = DitherRng::new(cfg.seed);
        Ok(Self {
            pre_emphasis: PreEmphasis::new(cfg.alpha),
            dither,
            window,
            filterbank,
            noise,
            cmn,
            overflow: Vec::new(),
            static_history: Vec::new(),
            next_frame_index: 0,
            utt_started: false,
            cfg,
        })
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.cfg
    }

    /// Reset overflow, pre-emphasis history, and the dither seed (spec.md
    /// §4.1: "`start_utt()` resets overflow, pre-emphasis history, and the
    /// dither seed"). Per spec.md §5, the running CMN mean is the one
    /// piece of state the caller may choose to carry across utterances —
    /// it is *not* reset here; use [`FrontEnd::reset_cmn`] explicitly.
    pub fn start_utt(&mut self) {
        self.overflow.clear();
        self.pre_emphasis.reset();
        self.dither = DitherRng::new(self.cfg.seed);
        if let Some(nr) = &mut self.noise {
            nr.reset();
        }
        self.static_history.clear();
        self.next_frame_index = 0;
        self.utt_started = true;
    }

    pub fn reset_cmn(&mut self) {
        if let Some(cmn) = &mut self.cmn {
            cmn.reset();
        }
    }

    pub fn current_cmn_mean(&self) -> Option<Vec<f32>> {
        self.cmn.as_ref().map(|c| c.current_mean())
    }

    fn frame_size(&self) -> usize {
        self.cfg.frame_size()
    }

    fn frame_shift(&self) -> usize {
        self.cfg.frame_shift()
    }

    /// Compute one static-cepstra frame's worth of features from raw
    /// samples (already the right length: `frame_size()`).
    fn compute_static_frame(&mut self, raw: &[f32]) -> Vec<f32> {
        let mut samples = raw.to_vec();
        self.pre_emphasis.apply(&mut samples);
        if self.cfg.dither {
            for s in samples.iter_mut() {
                *s += self.dither.next_dither();
            }
        }
        for (s, w) in samples.iter_mut().zip(self.window.iter()) {
            *s *= w;
        }
        let power = self.filterbank.power_spectrum(&samples);
        let mut mel = self.filterbank.mel_energies(&power);
        if let Some(nr) = &mut self.noise {
            nr.process(&mut mel);
        }
        self.filterbank.log_and_dct(&mel)
    }

    /// Process a chunk of raw 16-bit PCM samples (as `f32` to keep the
    /// front end numeric-type agnostic; callers convert once at the
    /// boundary). Returns the feature frames completed by this call and
    /// the number of input samples consumed.
    ///
    /// Framing/overflow contract (spec.md §4.1, tested by
    /// `tests/frontend_framing.rs`): splitting one logical input across
    /// multiple `process` calls produces exactly the same feature sequence
    /// as one call with the concatenated input, because the overflow
    /// buffer carries unconsumed samples byte-for-byte across calls.
    pub fn process(&mut self, samples: &[f32]) -> (Vec<FeatureFrame>, usize) {
        if samples.is_empty() {
            return (Vec::new(), 0);
        }
        let frame_size = self.frame_size();
        let frame_shift = self.frame_shift();

        let mut buffer: Vec<f32> = Vec::with_capacity(self.overflow.len() + samples.len());
        buffer.extend_from_slice(&self.overflow);
        buffer.extend_from_slice(samples);

        let mut statics = Vec::new();
        let mut pos = 0usize;
        while pos + frame_size <= buffer.len() {
            let frame = self.compute_static_frame(&buffer[pos..pos + frame_size]);
            statics.push(frame);
            pos += frame_shift;
        }
        self.overflow = buffer[pos.min(buffer.len())..].to_vec();

        self.static_history.extend(statics);
        let consumed = samples.len();
        let frames = self.drain_ready_dynamic_frames(false);
        (frames, consumed)
    }

    /// Flush any remaining buffered samples at utterance end, zero-padding
    /// a final partial frame if at least one shift's worth of overflow
    /// remains (spec.md §4.1). Returns the final frames (if any) and
    /// whether a frame was emitted (0 or 1, matching the C contract's
    /// shape even though Rust returns a `Vec`).
    pub fn end_utt(&mut self) -> Vec<FeatureFrame> {
        let frame_size = self.frame_size();
        let frame_shift = self.frame_shift();
        if self.overflow.len() >= frame_shift {
            let mut padded = self.overflow.clone();
            padded.resize(frame_size, 0.0);
            let frame = self.compute_static_frame(&padded);
            self.static_history.push(frame);
        }
        self.overflow.clear();
        self.drain_ready_dynamic_frames(true)
    }

    /// Emit `FeatureFrame`s for every static frame that now has enough
    /// context on both sides to compute deltas, given `DELTA_WINDOW`. When
    /// `flush` is true (utterance end), emit everything remaining using
    /// edge-clamped context.
    fn drain_ready_dynamic_frames(&mut self, flush: bool) -> Vec<FeatureFrame> {
        let mut out = Vec::new();
        let ncep = self.cfg.ncep;
        let len = self.static_history.len();
        // Frame `next_frame_index` is ready once we have DELTA_WINDOW
        // frames of lookahead, or we're flushing (clamp at edges).
        loop {
            let idx = self.next_frame_index as usize;
            if idx >= len {
                break;
            }
            if !flush && idx + DELTA_WINDOW >= len {
                break;
            }
            let get = |i: isize| -> &[f32] {
                let clamped = i.clamp(0, len as isize - 1) as usize;
                &self.static_history[clamped]
            };
            let mut delta = vec![0.0f32; ncep];
            let mut delta2 = vec![0.0f32; ncep];
            for k in 0..ncep {
                let plus1 = get(idx as isize + 1)[k];
                let minus1 = get(idx as isize - 1)[k];
                delta[k] = (plus1 - minus1) / 2.0;
                let plus2 = get(idx as isize + 2)[k];
                let minus2 = get(idx as isize - 2)[k];
                delta2[k] = (plus2 + minus2 - 2.0 * get(idx as isize)[k]) / 4.0 + (plus1 + minus1 - 2.0 * get(idx as isize)[k]) / 4.0;
            }
            let mut cep = self.static_history[idx].clone();
            if let Some(cmn) = &mut self.cmn {
                cmn.apply(&mut cep);
            }
            let mut values = Vec::with_capacity(ncep * DYNAMIC_FEATURE_MULTIPLIER);
            values.extend_from_slice(&cep);
            values.extend_from_slice(&delta);
            values.extend_from_slice(&delta2);
            out.push(FeatureFrame {
                frame_index: self.next_frame_index,
                values,
            });
            self.next_frame_index += 1;
        }
        out
    }
}

/// Validate a frame size / FFT relationship outside of a full config,
/// used by callers that build a `FrontendConfig` programmatically and want
/// an early, specific error (spec.md §7: "Frame size larger than FFT size
/// ... initialization fails").
pub fn validate_fft_relationship(frame_size: usize, nfft: usize) -> Result<(), ConfigError> {
    if !nfft.is_power_of_two() || nfft < frame_size {
        return Err(ConfigError::InvalidFftSize { nfft, frame_size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fe() -> FrontEnd {
        let cfg = FrontendConfig {
            sample_rate: 16_000,
            frame_rate: 100,
            ..FrontendConfig::default()
        };
        FrontEnd::new(cfg).unwrap()
    }

    #[test]
    fn short_input_produces_zero_frames() {
        let mut fe = make_fe();
        fe.start_utt();
        let (frames, consumed) = fe.process(&[0.0; 10]);
        assert!(frames.is_empty());
        assert_eq!(consumed, 10);
    }

    #[test]
    fn feature_frame_has_39_values_by_default() {
        let mut fe = make_fe();
        fe.start_utt();
        let samples: Vec<f32> = (0..16_000).map(|i| (i as f32 * 0.01).sin() * 1000.0).collect();
        let (mut frames, _) = fe.process(&samples);
        frames.extend(fe.end_utt());
        assert!(!frames.is_empty());
        for f in &frames {
            assert_eq!(f.values.len(), 39);
        }
    }

    #[test]
    fn framing_is_idempotent_under_splitting() {
        let samples: Vec<f32> = (0..8000).map(|i| (i as f32 * 0.02).sin() * 500.0).collect();

        let mut fe_whole = make_fe();
        fe_whole.start_utt();
        let (mut whole, _) = fe_whole.process(&samples);
        whole.extend(fe_whole.end_utt());

        let mut fe_split = make_fe();
        fe_split.start_utt();
        let mut split = Vec::new();
        for chunk in samples.chunks(777) {
            let (frames, _) = fe_split.process(chunk);
            split.extend(frames);
        }
        split.extend(fe_split.end_utt());

        assert_eq!(whole.len(), split.len());
        for (a, b) in whole.iter().zip(split.iter()) {
            for (x, y) in a.values.iter().zip(b.values.iter()) {
                assert!((x - y).abs() < 1e-3, "{x} vs {y}");
            }
        }
    }

    #[test]
    fn frame_indices_are_monotone_from_zero() {
        let mut fe = make_fe();
        fe.start_utt();
        let samples: Vec<f32> = (0..16_000).map(|i| (i as f32 * 0.01).sin() * 1000.0).collect();
        let (mut frames, _) = fe.process(&samples);
        frames.extend(fe.end_utt());
        for (i, f) in frames.iter().enumerate() {
            assert_eq!(f.frame_index, i as u32);
        }
    }
}
