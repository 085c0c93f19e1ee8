//! Frame-rate voice activity classification (spec.md §4.7): "a frame-rate
//! energy + spectral classifier (WebRTC-style, four aggressiveness levels
//! 0-3) returns speech/not_speech per fixed-size frame (10/20/30ms at
//! 8/16/32/48kHz)." Grounded on `examples/original_source/include/pocketsphinx/vad.h`
//! for the mode/class enums and frame-size contract; the classifier itself
//! is a log-energy threshold (no real spectral model is vendored here), in
//! the spirit of the windowed-threshold VAD in
//! `examples/other_examples/...dictara...vad.rs.rs`.
use crate::config::ConfigError;
use crate::error::Result;

/// Supported input sample rates, matching `ps_vad_set_input_params`'s
/// "only 8000, 16000, 32000, 48000 are directly supported."
const SUPPORTED_RATES: [u32; 4] = [8000, 16000, 32000, 48000];
/// Supported frame lengths in seconds.
const SUPPORTED_FRAME_LENGTHS: [f64; 3] = [0.01, 0.02, 0.03];

pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;
pub const DEFAULT_FRAME_LENGTH: f64 = 0.03;

/// VAD aggressiveness. Stricter modes are less likely to misclassify
/// non-speech as speech, i.e. they require more energy to call a frame
/// `Speech`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VadMode {
    Loose,
    MediumLoose,
    MediumStrict,
    Strict,
}

impl VadMode {
    /// Minimum mean-square sample energy (on a 0.0-1.0 normalized scale)
    /// a frame must reach to classify as speech. Larger at stricter modes.
    fn energy_threshold(self) -> f32 {
        match self {
            VadMode::Loose => 0.0008,
            VadMode::MediumLoose => 0.0020,
            VadMode::MediumStrict => 0.0045,
            VadMode::Strict => 0.0090,
        }
    }
}

impl std::str::FromStr for VadMode {
    type Err = ConfigError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loose" => Ok(VadMode::Loose),
            "medium_loose" | "medium-loose" => Ok(VadMode::MediumLoose),
            "medium_strict" | "medium-strict" => Ok(VadMode::MediumStrict),
            "strict" => Ok(VadMode::Strict),
            other => Err(ConfigError::UnknownVadMode(other.to_string())),
        }
    }
}

/// Tri-state classification result (spec.md §4.7; `Error` mirrors
/// `ps_vad_classify`'s `-1` return for a malformed frame).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VadClass {
    Error,
    NotSpeech,
    Speech,
}

/// A frame-rate speech/non-speech classifier with a fixed frame size once
/// constructed.
pub struct Vad {
    mode: VadMode,
    sample_rate: u32,
    frame_length: f64,
    frame_size: usize,
}

fn closest(value: f64, candidates: &[f64]) -> f64 {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| (a - value).abs().partial_cmp(&(b - value).abs()).unwrap())
        .unwrap()
}

impl Vad {
    /// Construct a classifier, snapping `sample_rate`/`frame_length` to the
    /// closest supported combination (spec.md §4.7: "callers must always
    /// query the actual frame size/length after construction").
    pub fn new(mode: VadMode, sample_rate: Option<u32>, frame_length: Option<f64>) -> Result<Self> {
        let requested_rate = sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        let sample_rate = *SUPPORTED_RATES
            .iter()
            .min_by_key(|&&r| (r as i64 - requested_rate as i64).abs())
            .unwrap();
        let requested_len = frame_length.unwrap_or(DEFAULT_FRAME_LENGTH);
        let frame_length = closest(requested_len, &SUPPORTED_FRAME_LENGTHS);
        let frame_size = (sample_rate as f64 * frame_length).round() as usize;
        Ok(Self {
            mode,
            sample_rate,
            frame_length,
            frame_size,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frame_length(&self) -> f64 {
        self.frame_length
    }

    /// Number of `i16` samples a frame passed to [`Vad::classify`] must
    /// contain.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Classify one frame. Returns [`VadClass::Error`] if `frame` does not
    /// contain exactly [`Vad::frame_size`] samples.
    pub fn classify(&self, frame: &[i16]) -> VadClass {
        if frame.len() != self.frame_size {
            return VadClass::Error;
        }
        let energy = mean_square_energy(frame);
        if energy >= self.mode.energy_threshold() {
            VadClass::Speech
        } else {
            VadClass::NotSpeech
        }
    }
}

fn mean_square_energy(frame: &[i16]) -> f32 {
    let sum_sq: f64 = frame.iter().map(|&s| {
        let norm = s as f64 / i16::MAX as f64;
        norm * norm
    }).sum();
    (sum_sq / frame.len().max(1) as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_matches_rate_times_length() {
        let vad = Vad::new(VadMode::Loose, Some(16_000), Some(0.02)).unwrap();
        assert_eq!(vad.frame_size(), 320);
    }

    #[test]
    fn unsupported_rate_snaps_to_nearest_supported() {
        let vad = Vad::new(VadMode::Loose, Some(20_000), None).unwrap();
        assert_eq!(vad.sample_rate(), 16_000);
    }

    #[test]
    fn wrong_length_frame_is_an_error() {
        let vad = Vad::new(VadMode::Loose, Some(16_000), Some(0.02)).unwrap();
        assert_eq!(vad.classify(&[0i16; 10]), VadClass::Error);
    }

    #[test]
    fn loud_frame_classifies_as_speech_and_quiet_as_not() {
        let vad = Vad::new(VadMode::MediumLoose, Some(16_000), Some(0.02)).unwrap();
        let loud = vec![i16::MAX / 2; vad.frame_size()];
        let quiet = vec![0i16; vad.frame_size()];
        assert_eq!(vad.classify(&loud), VadClass::Speech);
        assert_eq!(vad.classify(&quiet), VadClass::NotSpeech);
    }

    #[test]
    fn stricter_mode_requires_more_energy() {
        let moderate_energy = vec![40i16; 320];
        let loose = Vad::new(VadMode::Loose, Some(16_000), Some(0.02)).unwrap();
        let strict = Vad::new(VadMode::Strict, Some(16_000), Some(0.02)).unwrap();
        assert_eq!(loose.classify(&moderate_energy), VadClass::Speech);
        assert_eq!(strict.classify(&moderate_energy), VadClass::NotSpeech);
    }
}
