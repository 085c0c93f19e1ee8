//! Sliding-window speech/non-speech segmentation on top of [`super::vad::Vad`]
//! (spec.md §4.7): "a sliding window of `W` frames (default 30 ≈ 300ms),
//! ratio-based hysteresis." Grounded on
//! `examples/original_source/include/pocketsphinx/endpointer.h`'s
//! `ps_endpointer_process`/`ps_endpointer_end_stream`/`ps_endpointer_in_speech`/
//! `ps_endpointer_speech_start`/`ps_endpointer_speech_end` contract, and on
//! the pluggable-clock pattern in
//! `examples/original_source/examples/endpointer_timestamp_example.c`'s
//! `ps_endpointer_set_timestamp_func`.
use std::collections::VecDeque;

use crate::error::Result;

use super::vad::{Vad, VadClass, VadMode};

/// Default window, in seconds of audio, used for the speech start/end
/// decision (`PS_ENDPOINTER_DEFAULT_WINDOW`).
pub const DEFAULT_WINDOW: f64 = 0.3;
/// Default ratio of frames in the window needed to trigger a start/end
/// decision (`PS_ENDPOINTER_DEFAULT_RATIO`).
pub const DEFAULT_RATIO: f64 = 0.9;

/// A user-supplied clock, consulted instead of frame-count-based timing
/// when set (spec.md §4.7: "via a pluggable user-supplied clock
/// callback"). Mirrors `ps_endpointer_set_timestamp_func`'s ability to
/// revert to audio-based timestamps by passing `None`.
type TimestampFn = Box<dyn FnMut() -> f64>;

/// Sliding-window VAD endpointer.
pub struct Endpointer {
    vad: Vad,
    window: usize,
    ratio: f64,

    history: VecDeque<(Vec<i16>, bool)>,
    speech_count: usize,
    in_speech: bool,
    frames_processed: u64,

    speech_start_time: Option<f64>,
    speech_end_time: Option<f64>,
    clock: Option<TimestampFn>,

    /// Buffer holding whatever this call's [`Endpointer::process`] (or
    /// [`Endpointer::end_stream`]) emitted; `process` returns a borrow of
    /// it, valid until the next call, mirroring the C API's "valid until
    /// next call" pointer contract.
    pending: Vec<i16>,
}

impl Endpointer {
    /// Build an endpointer. `window`/`ratio` of `0.0` fall back to the
    /// spec defaults (`ps_endpointer_init`'s "0 to use the default"
    /// convention).
    pub fn new(
        window: f64,
        ratio: f64,
        mode: VadMode,
        sample_rate: Option<u32>,
        frame_length: Option<f64>,
    ) -> Result<Self> {
        let vad = Vad::new(mode, sample_rate, frame_length)?;
        let window_secs = if window > 0.0 { window } else { DEFAULT_WINDOW };
        let ratio = if ratio > 0.0 { ratio } else { DEFAULT_RATIO };
        let window_frames = (window_secs / vad.frame_length()).round().max(1.0) as usize;
        Ok(Self {
            vad,
            window: window_frames,
            ratio,
            history: VecDeque::with_capacity(window_frames),
            speech_count: 0,
            in_speech: false,
            frames_processed: 0,
            speech_start_time: None,
            speech_end_time: None,
            clock: None,
            pending: Vec::new(),
        })
    }

    /// The voice activity detector backing this endpointer
    /// (`ps_endpointer_vad`).
    pub fn vad(&self) -> &Vad {
        &self.vad
    }

    pub fn frame_size(&self) -> usize {
        self.vad.frame_size()
    }

    pub fn frame_length(&self) -> f64 {
        self.vad.frame_length()
    }

    /// Install a callback consulted for speech start/end timestamps
    /// instead of the frame-count-derived clock. Passing `None` reverts
    /// to audio-based timestamps (`ps_endpointer_set_timestamp_func`).
    pub fn set_timestamp_func(&mut self, f: Option<TimestampFn>) {
        self.clock = f;
    }

    fn timestamp_now(&mut self) -> f64 {
        match self.clock.as_mut() {
            Some(f) => f(),
            None => self.frames_processed as f64 * self.vad.frame_length(),
        }
    }

    /// Process one frame of exactly [`Endpointer::frame_size`] samples.
    /// Returns the audio released this call, if any.
    pub fn process(&mut self, frame: &[i16]) -> Option<&[i16]> {
        self.pending.clear();
        let is_speech = self.vad.classify(frame) == VadClass::Speech;
        self.frames_processed += 1;

        if self.history.len() == self.window {
            if let Some((_, was_speech)) = self.history.pop_front() {
                if was_speech {
                    self.speech_count -= 1;
                }
            }
        }
        self.history.push_back((frame.to_vec(), is_speech));
        if is_speech {
            self.speech_count += 1;
        }

        let threshold = (self.ratio * self.window as f64).ceil() as usize;

        if !self.in_speech {
            if self.speech_count >= threshold {
                self.in_speech = true;
                let start = self.timestamp_now();
                self.speech_start_time = Some(start);
                for (samples, _) in self.history.iter() {
                    self.pending.extend_from_slice(samples);
                }
            }
        } else {
            self.pending.extend_from_slice(frame);
            if self.speech_count < threshold {
                self.in_speech = false;
                let end = self.timestamp_now();
                self.speech_end_time = Some(end);
            }
        }

        if self.pending.is_empty() {
            None
        } else {
            Some(&self.pending)
        }
    }

    /// Process whatever audio remains at the end of a stream (spec.md
    /// §4.7 "Cancellation/flushing"): `frame[..nsamp]` is zero-padded to a
    /// full frame and processed, then any still-open speech segment is
    /// closed.
    pub fn end_stream(&mut self, frame: &[i16], nsamp: usize) -> Option<&[i16]> {
        let mut collected = Vec::new();
        if nsamp > 0 {
            let mut padded = vec![0i16; self.frame_size()];
            let n = nsamp.min(frame.len()).min(padded.len());
            padded[..n].copy_from_slice(&frame[..n]);
            if let Some(out) = self.process(&padded) {
                collected.extend_from_slice(out);
            }
        }
        if self.in_speech {
            self.in_speech = false;
            let end = self.timestamp_now();
            self.speech_end_time = Some(end);
        }
        self.pending = collected;
        if self.pending.is_empty() {
            None
        } else {
            Some(&self.pending)
        }
    }

    /// Whether the endpointer is currently inside a speech segment
    /// (`ps_endpointer_in_speech`).
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    /// Start time, in seconds, of the most recent speech segment
    /// (`ps_endpointer_speech_start`).
    pub fn speech_start(&self) -> Option<f64> {
        self.speech_start_time
    }

    /// End time, in seconds, of the most recent speech segment
    /// (`ps_endpointer_speech_end`).
    pub fn speech_end(&self) -> Option<f64> {
        self.speech_end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame(ep: &Endpointer) -> Vec<i16> {
        vec![i16::MAX / 2; ep.frame_size()]
    }

    fn quiet_frame(ep: &Endpointer) -> Vec<i16> {
        vec![0i16; ep.frame_size()]
    }

    #[test]
    fn stays_idle_below_the_speech_ratio() {
        let mut ep = Endpointer::new(0.1, 0.9, VadMode::MediumLoose, Some(16_000), Some(0.02)).unwrap();
        let quiet = quiet_frame(&ep);
        for _ in 0..10 {
            assert!(ep.process(&quiet).is_none());
        }
        assert!(!ep.in_speech());
    }

    #[test]
    fn transitions_to_speech_once_window_ratio_is_met() {
        let mut ep = Endpointer::new(0.06, 0.9, VadMode::MediumLoose, Some(16_000), Some(0.02)).unwrap();
        let loud = loud_frame(&ep);
        let mut emitted = false;
        for _ in 0..5 {
            if ep.process(&loud).is_some() {
                emitted = true;
            }
        }
        assert!(emitted);
        assert!(ep.in_speech());
        assert!(ep.speech_start().is_some());
    }

    #[test]
    fn end_stream_closes_an_open_segment() {
        let mut ep = Endpointer::new(0.06, 0.9, VadMode::MediumLoose, Some(16_000), Some(0.02)).unwrap();
        let loud = loud_frame(&ep);
        for _ in 0..5 {
            ep.process(&loud);
        }
        assert!(ep.in_speech());
        ep.end_stream(&[], 0);
        assert!(!ep.in_speech());
        assert!(ep.speech_end().is_some());
    }

    #[test]
    fn pluggable_clock_overrides_frame_based_timestamps() {
        let mut ep = Endpointer::new(0.06, 0.9, VadMode::MediumLoose, Some(16_000), Some(0.02)).unwrap();
        ep.set_timestamp_func(Some(Box::new(|| 42.0)));
        let loud = loud_frame(&ep);
        for _ in 0..5 {
            ep.process(&loud);
        }
        assert_eq!(ep.speech_start(), Some(42.0));
    }
}
